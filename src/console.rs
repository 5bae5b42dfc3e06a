//! Lifecycle and reconnection controller.
//!
//! [`ConsoleController`] ties one [`TerminalSurface`] and at most one
//! [`TransportSession`] to the lifetime of a console dialog. It is headless:
//! the GPUI view feeds it measurements, keystrokes and transport events, and
//! reads back the surface, the connection state and the terminal title.
//!
//! # Data Flow
//!
//! ```text
//! keystroke ─→ surface.feed_input ─→ on_data ─→ input queue ─→ session.send
//! transport ─→ EventSink ─→ flume ─→ handle ─→ session.handle ─→ surface.write
//! container ─→ surface.fit ─→ (grid changed, connected) ─→ session.resize
//! ```
//!
//! # Teardown
//!
//! [`ConsoleController::close`] runs four steps in a fixed order: request
//! `close` from the remote shell, disconnect the transport, dispose the
//! surface, remove the resize watch. A failing step is logged and recorded
//! in the [`TeardownReport`]; later steps still run.

use crate::auth::CredentialSource;
use crate::event::SurfaceEvent;
use crate::session::{ConnectionState, Notice, SessionError, SurfaceWrite, TransportSession};
use crate::surface::{CellSize, ContainerSize, GridSize, SurfaceError, SurfaceOptions, TerminalSurface};
use crate::transport::{
    Connector, EventSink, SessionDescriptor, SessionEnvelope, TransportError, TransportEvent,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Registration that keeps container-resize notifications flowing.
///
/// Removing it is the last teardown step.
pub trait ResizeWatch {
    fn remove(self: Box<Self>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    RequestClose,
    Disconnect,
    DisposeSurface,
    RemoveResizeWatch,
}

/// Outcome of [`ConsoleController::close`].
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Steps that ran, in order. Empty when the console was already closed.
    pub steps: Vec<TeardownStep>,
    pub failures: Vec<(TeardownStep, TransportError)>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LayoutPhase {
    Settled,
    /// Measurements are recorded but not fitted until the layout settles.
    Transitioning,
}

enum Attachment {
    Session(TransportSession),
    /// Opening failed before any network activity.
    Refused(ConnectionState),
}

pub struct ConsoleController {
    descriptor: SessionDescriptor,
    credentials: Arc<dyn CredentialSource>,
    connector: Arc<dyn Connector>,
    surface: TerminalSurface,
    attachment: Attachment,
    generation: u64,
    events_tx: flume::Sender<SessionEnvelope>,
    events_rx: flume::Receiver<SessionEnvelope>,
    input_rx: flume::Receiver<String>,
    /// Last grid sent to the remote shell on the current session.
    remote_grid: Option<GridSize>,
    layout: LayoutPhase,
    resize_watch: Option<Box<dyn ResizeWatch>>,
    title: Option<String>,
    torn_down: bool,
}

impl ConsoleController {
    /// Creates the surface, fits it and opens the first session.
    ///
    /// A missing token does not fail the mount: the console shows an error
    /// notice and waits for a manual reconnect.
    pub fn mount(
        descriptor: SessionDescriptor,
        credentials: Arc<dyn CredentialSource>,
        connector: Arc<dyn Connector>,
        options: SurfaceOptions,
        container: Option<ContainerSize>,
    ) -> Result<Self, SurfaceError> {
        let mut surface = TerminalSurface::create(container, options)?;
        surface.fit();

        let (input_tx, input_rx) = flume::unbounded();
        surface.on_data(move |chunk| {
            let _ = input_tx.send(chunk.to_string());
        });

        let (events_tx, events_rx) = flume::unbounded();
        let mut console = Self {
            descriptor,
            credentials,
            connector,
            surface,
            attachment: Attachment::Refused(ConnectionState::Connecting),
            generation: 0,
            events_tx,
            events_rx,
            input_rx,
            remote_grid: None,
            layout: LayoutPhase::Settled,
            resize_watch: None,
            title: None,
            torn_down: false,
        };
        console.attach();
        Ok(console)
    }

    /// Opens a new session with the token as it is right now.
    fn attach(&mut self) {
        self.generation += 1;
        self.remote_grid = None;

        let token = self.credentials.token();
        let sink = EventSink::new(self.generation, self.events_tx.clone());
        let opened = TransportSession::open(
            self.descriptor.clone(),
            token.as_deref(),
            self.connector.as_ref(),
            sink,
        );

        self.attachment = match opened {
            Ok(session) => Attachment::Session(session),
            Err(err) => {
                let message = match &err {
                    SessionError::MissingCredential => "Not authenticated".to_string(),
                    SessionError::Connect(err) => format!("Failed to connect: {err}"),
                };
                warn!(vm_id = %self.descriptor.vm_id, %err, "console session not opened");
                self.surface.write_line(&Notice::Error(message.clone()).render());
                Attachment::Refused(ConnectionState::Error(message))
            }
        };
    }

    pub fn descriptor(&self) -> &SessionDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> &ConnectionState {
        match &self.attachment {
            Attachment::Session(session) => session.state(),
            Attachment::Refused(state) => state,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn surface(&self) -> &TerminalSurface {
        &self.surface
    }

    /// Title set by the remote program, if any.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref().filter(|title| !title.is_empty())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Receiver the view awaits to learn that events are pending.
    pub fn events(&self) -> flume::Receiver<SessionEnvelope> {
        self.events_rx.clone()
    }

    /// Output stays in the emulator while hidden.
    pub fn buffer_visible(&self) -> bool {
        !matches!(self.state(), ConnectionState::Error(_))
    }

    /// Line shown in place of the hidden buffer.
    pub fn error_notice(&self) -> Option<String> {
        match self.state() {
            ConnectionState::Error(message) => Some(format!("Error: {message}")),
            _ => None,
        }
    }

    pub fn can_reconnect(&self) -> bool {
        !self.torn_down && !self.is_connected()
    }

    /// Applies every queued transport event. Returns whether anything changed.
    pub fn pump(&mut self) -> bool {
        let mut changed = false;
        while let Ok(envelope) = self.events_rx.try_recv() {
            changed |= self.handle(envelope);
        }
        changed
    }

    /// Applies one transport event. Events from replaced sessions are dropped.
    pub fn handle(&mut self, envelope: SessionEnvelope) -> bool {
        if self.torn_down || envelope.generation != self.generation {
            debug!(
                generation = envelope.generation,
                current = self.generation,
                "dropping stale transport event"
            );
            return false;
        }
        let Attachment::Session(session) = &mut self.attachment else {
            return false;
        };

        let was_connected = session.is_connected();
        let writes = session.handle(envelope.event);
        let now_connected = session.is_connected();

        for write in writes {
            match write {
                SurfaceWrite::Bytes(data) => self.surface.write(data.as_bytes()),
                SurfaceWrite::Line(line) => self.surface.write_line(&line),
            }
        }
        self.process_surface_events();

        if now_connected && !was_connected {
            self.sync_remote_size();
        }
        true
    }

    /// Forwards one input chunk from the keyboard or a paste.
    pub fn input(&mut self, chunk: &str) {
        self.surface.feed_input(chunk);
        self.flush_input();
    }

    fn flush_input(&mut self) {
        while let Ok(chunk) = self.input_rx.try_recv() {
            if let Attachment::Session(session) = &mut self.attachment {
                session.send(&chunk);
            }
        }
    }

    fn process_surface_events(&mut self) {
        for event in self.surface.drain_events() {
            match event {
                SurfaceEvent::Title(title) => self.title = Some(title),
                SurfaceEvent::Reply(reply) => {
                    if let Attachment::Session(session) = &mut self.attachment {
                        session.send(&reply);
                    }
                }
                SurfaceEvent::Bell => debug!("bell"),
            }
        }
    }

    /// The container was measured at a new size.
    pub fn container_resized(&mut self, size: ContainerSize) {
        if size == self.surface.container() {
            return;
        }
        self.surface.set_container(size);
        if self.layout == LayoutPhase::Settled {
            self.refit();
        }
    }

    /// The font cell was (re)measured.
    pub fn set_cell_size(&mut self, cell: CellSize) {
        if cell == self.surface.cell_size() {
            return;
        }
        self.surface.set_cell_size(cell);
        if self.layout == LayoutPhase::Settled {
            self.refit();
        }
    }

    /// A layout change (fullscreen toggle) has started animating.
    pub fn begin_layout_transition(&mut self) {
        self.layout = LayoutPhase::Transitioning;
    }

    /// The layout has settled: fit against the final size.
    pub fn finish_layout_transition(&mut self) {
        if self.layout == LayoutPhase::Transitioning {
            self.layout = LayoutPhase::Settled;
            self.refit();
        }
    }

    pub fn is_layout_settled(&self) -> bool {
        self.layout == LayoutPhase::Settled
    }

    fn refit(&mut self) {
        if self.torn_down {
            return;
        }
        let grid = self.surface.fit();
        debug!(rows = grid.rows, cols = grid.cols, "surface fitted");
        self.sync_remote_size();
    }

    fn sync_remote_size(&mut self) {
        let grid = self.surface.grid_size();
        if self.remote_grid == Some(grid) {
            return;
        }
        if let Attachment::Session(session) = &mut self.attachment
            && session.resize(grid)
        {
            self.remote_grid = Some(grid);
        }
    }

    /// Starts over with a fresh session. Ignored while connected or closed.
    pub fn reconnect(&mut self) -> bool {
        if !self.can_reconnect() {
            return false;
        }
        info!(vm_id = %self.descriptor.vm_id, "reconnecting console");

        if let Attachment::Session(session) = &mut self.attachment
            && let Err(err) = session.disconnect()
        {
            warn!(%err, "failed to disconnect previous session");
        }
        self.surface.clear();
        self.surface.drain_events();
        self.title = None;
        self.attach();
        true
    }

    pub fn set_resize_watch(&mut self, watch: Box<dyn ResizeWatch>) {
        if self.torn_down {
            watch.remove();
            return;
        }
        if let Some(previous) = self.resize_watch.replace(watch) {
            previous.remove();
        }
    }

    /// Tears the console down. Later calls do nothing.
    pub fn close(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        if self.torn_down {
            return report;
        }
        self.torn_down = true;

        report.steps.push(TeardownStep::RequestClose);
        if let Attachment::Session(session) = &mut self.attachment
            && let Err(err) = session.request_close()
        {
            warn!(%err, "teardown: close request failed");
            report.failures.push((TeardownStep::RequestClose, err));
        }

        report.steps.push(TeardownStep::Disconnect);
        if let Attachment::Session(session) = &mut self.attachment
            && let Err(err) = session.disconnect()
        {
            warn!(%err, "teardown: disconnect failed");
            report.failures.push((TeardownStep::Disconnect, err));
        }

        report.steps.push(TeardownStep::DisposeSurface);
        self.surface.dispose();

        report.steps.push(TeardownStep::RemoveResizeWatch);
        if let Some(watch) = self.resize_watch.take() {
            watch.remove();
        }

        info!(vm_id = %self.descriptor.vm_id, "console closed");
        report
    }

    pub fn is_closed(&self) -> bool {
        self.torn_down
    }
}

impl Drop for ConsoleController {
    fn drop(&mut self) {
        self.close();
    }
}
