//! Event bridge between the emulator and the console.
//!
//! [`SurfaceEventProxy`] implements alacritty's [`EventListener`] trait and
//! forwards the events the console cares about through a channel.
//!
//! # Supported Events
//!
//! | Alacritty Event | SurfaceEvent | Description |
//! |-----------------|--------------|-------------|
//! | `Event::Title(_)` | `Title(String)` | Title escape sequence (OSC 0/2) |
//! | `Event::ResetTitle` | `Title("")` | Reset to empty title |
//! | `Event::Bell` | `Bell` | BEL character received |
//! | `Event::PtyWrite(_)` | `Reply(String)` | Emulator answer to a query (DA, DSR) |
//!
//! Replies are what a local PTY would have received on stdin. For a remote
//! shell they travel back over the transport like keyboard input.
//!
//! [`EventListener`]: alacritty_terminal::event::EventListener

use alacritty_terminal::event::{Event, EventListener};
use std::sync::mpsc::Sender;

/// Events emitted by the emulator that the console reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// The terminal title has changed.
    Title(String),

    /// The terminal bell was triggered.
    Bell,

    /// Bytes the emulator wants to send back to the shell.
    Reply(String),
}

/// Forwards relevant emulator events to a channel drained by the controller.
pub struct SurfaceEventProxy {
    tx: Sender<SurfaceEvent>,
}

impl SurfaceEventProxy {
    pub fn new(tx: Sender<SurfaceEvent>) -> Self {
        Self { tx }
    }

    /// Sends an event, silently dropping it if the receiver is gone.
    fn send(&self, event: SurfaceEvent) {
        let _ = self.tx.send(event);
    }
}

impl EventListener for SurfaceEventProxy {
    fn send_event(&self, event: Event) {
        match event {
            Event::Title(title) => self.send(SurfaceEvent::Title(title)),
            Event::ResetTitle => self.send(SurfaceEvent::Title(String::new())),
            Event::Bell => self.send(SurfaceEvent::Bell),
            Event::PtyWrite(text) => self.send(SurfaceEvent::Reply(text)),
            // Redraws are driven by the view, clipboard and color queries are
            // not supported over the remote link.
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn test_title_event() {
        let (tx, rx) = channel();
        let proxy = SurfaceEventProxy::new(tx);

        proxy.send_event(Event::Title("vim - notes.txt".to_string()));

        assert_eq!(
            rx.recv().unwrap(),
            SurfaceEvent::Title("vim - notes.txt".to_string())
        );
    }

    #[test]
    fn test_reset_title_event() {
        let (tx, rx) = channel();
        let proxy = SurfaceEventProxy::new(tx);

        proxy.send_event(Event::ResetTitle);

        assert_eq!(rx.recv().unwrap(), SurfaceEvent::Title(String::new()));
    }

    #[test]
    fn test_pty_write_becomes_reply() {
        let (tx, rx) = channel();
        let proxy = SurfaceEventProxy::new(tx);

        proxy.send_event(Event::PtyWrite("\x1b[1;1R".to_string()));

        assert_eq!(
            rx.recv().unwrap(),
            SurfaceEvent::Reply("\x1b[1;1R".to_string())
        );
    }

    #[test]
    fn test_ignored_events() {
        let (tx, rx) = channel();
        let proxy = SurfaceEventProxy::new(tx);

        proxy.send_event(Event::Wakeup);
        proxy.send_event(Event::MouseCursorDirty);
        proxy.send_event(Event::CursorBlinkingChange);

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disconnected_channel() {
        let (tx, rx) = channel();
        let proxy = SurfaceEventProxy::new(tx);
        drop(rx);

        proxy.send_event(Event::Bell);
    }
}
