//! GPUI console dialog.
//!
//! [`ConsoleView`] drives a [`ConsoleController`] from the GPUI side:
//!
//! ```text
//! ┌ header ─────────────────────────────────────────────────────┐
//! │ VM label · terminal title      ● status  [Reconnect] [⛶] [×] │
//! ├──────────────────────────────────────────────────────────────┤
//! │ canvas: measure bounds + cell ─→ controller ─→ paint grid     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transport events arrive on a background thread and are pushed through a
//! `flume` channel; an async task awaits that channel and applies the events
//! on the main thread, so output is painted as soon as it arrives.
//!
//! # Example
//!
//! ```ignore
//! let controller = ConsoleController::mount(descriptor, credentials, connector, options, container)?;
//! cx.open_window(options, |window, cx| {
//!     cx.new(|cx| ConsoleView::new(controller, &config, window, cx).with_close_callback(|_, cx| cx.quit()))
//! })?;
//! ```

use crate::colors::ColorPalette;
use crate::config::ConsoleConfig;
use crate::console::{ConsoleController, ResizeWatch};
use crate::input::{key_chunk, paste_chunk};
use crate::render::ConsoleRenderer;
use crate::session::ConnectionState;
use crate::surface::ContainerSize;
use gpui::{
    App, AsyncApp, ClickEvent, Context, FocusHandle, Hsla, InteractiveElement, IntoElement,
    KeyDownEvent, MouseButton, MouseDownEvent, ParentElement, Pixels, Render, SharedString,
    StatefulInteractiveElement, Styled, Subscription, Task, WeakEntity, Window, canvas, div, px,
    rgb,
};
use std::time::Duration;
use tracing::debug;

/// Called after the console has been torn down by its close button.
pub type CloseCallback = Box<dyn Fn(&mut Window, &mut App)>;

const HEADER_BG: u32 = 0x252526;
const HEADER_FG: u32 = 0xcccccc;
const MUTED_FG: u32 = 0x8a8a8a;
const BUTTON_BG: u32 = 0x3a3d41;
const BUTTON_HOVER_BG: u32 = 0x45494e;

/// The window-bounds subscription; dropping it stops the notifications.
struct BoundsWatch(Subscription);

impl ResizeWatch for BoundsWatch {
    fn remove(self: Box<Self>) {
        drop(self.0);
    }
}

fn status_color(state: &ConnectionState) -> Hsla {
    let packed = match state {
        ConnectionState::Connecting => 0xe5c07b,
        ConnectionState::Connected(_) => 0x98c379,
        ConnectionState::Error(_) => 0xe06c75,
        ConnectionState::Closed(_) => 0x7f848e,
    };
    rgb(packed).into()
}

pub struct ConsoleView {
    controller: ConsoleController,
    renderer: ConsoleRenderer,
    padding: Pixels,
    layout_settle: Duration,
    focus_handle: FocusHandle,
    close_callback: Option<CloseCallback>,
    _event_task: Task<()>,
    _settle_task: Option<Task<()>>,
}

impl ConsoleView {
    pub fn new(
        mut controller: ConsoleController,
        config: &ConsoleConfig,
        window: &mut Window,
        cx: &mut Context<Self>,
    ) -> Self {
        let renderer = ConsoleRenderer::new(
            config.font_family.clone(),
            px(config.font_size),
            config.line_height_multiplier,
            ColorPalette::from_config(&config.colors),
        );

        let events = controller.events();
        let event_task = cx.spawn(async move |this: WeakEntity<Self>, cx: &mut AsyncApp| {
            while let Ok(envelope) = events.recv_async().await {
                let result = this.update(cx, |view: &mut Self, cx: &mut Context<Self>| {
                    let mut changed = view.controller.handle(envelope);
                    changed |= view.controller.pump();
                    if changed {
                        cx.notify();
                    }
                });
                if result.is_err() {
                    break;
                }
            }
        });

        let subscription = cx.observe_window_bounds(window, |_view, _window, cx| cx.notify());
        controller.set_resize_watch(Box::new(BoundsWatch(subscription)));

        let focus_handle = cx.focus_handle();
        window.focus(&focus_handle);

        Self {
            controller,
            renderer,
            padding: px(config.padding),
            layout_settle: config.layout_settle(),
            focus_handle,
            close_callback: None,
            _event_task: event_task,
            _settle_task: None,
        }
    }

    pub fn with_close_callback(mut self, callback: impl Fn(&mut Window, &mut App) + 'static) -> Self {
        self.close_callback = Some(Box::new(callback));
        self
    }

    pub fn controller(&self) -> &ConsoleController {
        &self.controller
    }

    pub fn focus_handle(&self) -> &FocusHandle {
        &self.focus_handle
    }

    fn on_key_down(&mut self, event: &KeyDownEvent, _window: &mut Window, cx: &mut Context<Self>) {
        let keystroke = &event.keystroke;
        let modifiers = &keystroke.modifiers;
        let paste = keystroke.key.eq_ignore_ascii_case("v")
            && ((modifiers.control && modifiers.shift) || modifiers.platform);
        if paste {
            self.paste(cx);
            cx.stop_propagation();
            return;
        }

        if let Some(chunk) = key_chunk(keystroke, self.controller.surface().mode()) {
            self.controller.input(&chunk);
            cx.stop_propagation();
        }
    }

    fn paste(&mut self, cx: &mut Context<Self>) {
        let Some(text) = cx.read_from_clipboard().and_then(|item| item.text()) else {
            return;
        };
        let chunk = paste_chunk(&text, self.controller.surface().mode());
        self.controller.input(&chunk);
    }

    fn on_mouse_down(&mut self, _event: &MouseDownEvent, window: &mut Window, cx: &mut Context<Self>) {
        window.focus(&self.focus_handle);
        cx.notify();
    }

    fn reconnect(&mut self, _event: &ClickEvent, window: &mut Window, cx: &mut Context<Self>) {
        if self.controller.reconnect() {
            window.focus(&self.focus_handle);
            cx.notify();
        }
    }

    /// Toggles fullscreen and refits once the window has settled.
    fn toggle_fullscreen(&mut self, _event: &ClickEvent, window: &mut Window, cx: &mut Context<Self>) {
        self.controller.begin_layout_transition();
        window.toggle_fullscreen();

        let settle = self.layout_settle;
        self._settle_task = Some(cx.spawn(async move |this: WeakEntity<Self>, cx: &mut AsyncApp| {
            cx.background_executor().timer(settle).await;
            let _ = this.update(cx, |view: &mut Self, cx: &mut Context<Self>| {
                view.controller.finish_layout_transition();
                cx.notify();
            });
        }));
    }

    fn close(&mut self, _event: &ClickEvent, window: &mut Window, cx: &mut Context<Self>) {
        let report = self.controller.close();
        if !report.is_clean() {
            debug!(failures = report.failures.len(), "console closed with failures");
        }
        if let Some(callback) = &self.close_callback {
            callback(window, cx);
        }
        cx.notify();
    }

    fn button(id: &'static str, label: impl Into<SharedString>) -> gpui::Stateful<gpui::Div> {
        div()
            .id(id)
            .px_2()
            .py_0p5()
            .rounded_sm()
            .cursor_pointer()
            .bg(rgb(BUTTON_BG))
            .hover(|style| style.bg(rgb(BUTTON_HOVER_BG)))
            .child(label.into())
    }

    fn render_header(&self, cx: &mut Context<Self>) -> impl IntoElement {
        let state = self.controller.state();
        let mut label = div()
            .flex()
            .flex_row()
            .items_center()
            .gap_2()
            .child(self.controller.descriptor().label());
        if let ConnectionState::Connected(peer) = state
            && let Some(ip) = &peer.vm_ip
        {
            label = label.child(div().text_color(rgb(MUTED_FG)).child(ip.clone()));
        }
        if let Some(title) = self.controller.title() {
            label = label.child(div().text_color(rgb(MUTED_FG)).child(format!("· {title}")));
        }

        let mut controls = div()
            .flex()
            .flex_row()
            .items_center()
            .gap_2()
            .child(div().size(px(8.0)).rounded_full().bg(status_color(state)))
            .child(state.status_label());
        if self.controller.can_reconnect() {
            controls = controls
                .child(Self::button("reconnect", "Reconnect").on_click(cx.listener(Self::reconnect)));
        }
        controls = controls
            .child(Self::button("fullscreen", "⛶").on_click(cx.listener(Self::toggle_fullscreen)))
            .child(Self::button("close", "×").on_click(cx.listener(Self::close)));

        div()
            .flex()
            .flex_row()
            .items_center()
            .justify_between()
            .px_3()
            .py_1()
            .text_sm()
            .bg(rgb(HEADER_BG))
            .text_color(rgb(HEADER_FG))
            .child(label)
            .child(controls)
    }
}

impl Render for ConsoleView {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let view = cx.entity().downgrade();
        let term = self.controller.surface().term_arc();
        let visible = self.controller.buffer_visible() && !self.controller.is_closed();
        let notice = self.controller.error_notice();
        let error_color = status_color(self.controller.state());
        let mut renderer = self.renderer.clone();
        let padding = self.padding;

        div()
            .size_full()
            .flex()
            .flex_col()
            .track_focus(&self.focus_handle)
            .on_key_down(cx.listener(Self::on_key_down))
            .on_mouse_down(MouseButton::Left, cx.listener(Self::on_mouse_down))
            .child(self.render_header(cx))
            .child(
                div().flex_1().child(
                    canvas(
                        move |bounds, _window, _cx| bounds,
                        move |bounds, _, window, cx| {
                            let cell = renderer.measure_cell(window);
                            let container =
                                ContainerSize::new(bounds.size.width.into(), bounds.size.height.into());
                            let _ = view.update(cx, |view: &mut Self, cx: &mut Context<Self>| {
                                let before = view.controller.surface().grid_size();
                                view.controller.set_cell_size(cell);
                                view.controller.container_resized(container);
                                if view.controller.surface().grid_size() != before {
                                    cx.notify();
                                }
                            });

                            if visible {
                                let term = term.lock();
                                renderer.paint(bounds, padding, &term, window, cx);
                            } else {
                                let notice = notice.as_deref().unwrap_or_default();
                                renderer.paint_notice(bounds, padding, notice, error_color, window, cx);
                            }
                        },
                    )
                    .size_full(),
                ),
            )
    }
}
