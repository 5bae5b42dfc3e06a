//! Transport seam between a console session and the remote shell endpoint.
//!
//! A [`Connector`] opens a [`Transport`] for one session without blocking on
//! the network. Everything that happens afterwards (handshake completion,
//! inbound frames, disconnects) arrives as [`TransportEvent`]s through the
//! [`EventSink`] handed to `connect`, in the order the stream produced them.
//!
//! ```text
//! Connector::connect ─→ Box<dyn Transport>   (outbound: emit, disconnect)
//!         │
//!         └─ EventSink ─→ flume channel ─→ controller   (inbound, FIFO)
//! ```
//!
//! Each sink is tagged with the generation of the session that created it,
//! so events still in flight from a replaced session can be recognised and
//! dropped after a reconnect.

use crate::protocol::{ClientMessage, ProtocolError, ServerMessage, VmId};
use thiserror::Error;

/// Immutable description of which remote target a console attaches to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescriptor {
    pub vm_id: VmId,
    pub vm_name: Option<String>,
}

impl SessionDescriptor {
    pub fn new(vm_id: impl Into<VmId>) -> Self {
        Self {
            vm_id: vm_id.into(),
            vm_name: None,
        }
    }

    pub fn with_name(mut self, vm_name: impl Into<String>) -> Self {
        self.vm_name = Some(vm_name.into());
        self
    }

    /// Label shown to the user: the VM name if known, the id otherwise.
    pub fn label(&self) -> String {
        match &self.vm_name {
            Some(name) => name.clone(),
            None => format!("VM {}", self.vm_id),
        }
    }
}

/// What the underlying connection reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The transport's own handshake completed.
    Connected,

    /// The handshake failed; nothing was ever connected.
    ConnectFailed(String),

    /// A decoded frame from the remote peer.
    Message(ServerMessage),

    /// The connection dropped without a local `disconnect`.
    Disconnected(String),
}

/// A [`TransportEvent`] stamped with the session generation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEnvelope {
    pub generation: u64,
    pub event: TransportEvent,
}

/// Sending half handed to a connector for one session.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: flume::Sender<SessionEnvelope>,
}

impl EventSink {
    pub fn new(generation: u64, tx: flume::Sender<SessionEnvelope>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Delivers an event. Returns `false` once the console has gone away.
    pub fn send(&self, event: TransportEvent) -> bool {
        self.tx
            .send(SessionEnvelope {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint: {0}")]
    Endpoint(String),

    #[error("transport is closed")]
    Closed,

    #[error("credential cannot be sent as a header value")]
    Credential,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("websocket: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound half of one live connection.
pub trait Transport {
    /// Queues a message for the remote peer.
    fn emit(&mut self, message: ClientMessage) -> Result<(), TransportError>;

    /// Tears the connection down. Calling it again is a no-op.
    fn disconnect(&mut self) -> Result<(), TransportError>;
}

/// Opens transports. Implementations must return before any network I/O.
pub trait Connector {
    fn connect(
        &self,
        target: &SessionDescriptor,
        token: &str,
        sink: EventSink,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_label() {
        let named = SessionDescriptor::new("42").with_name("web-vm-42");
        let unnamed = SessionDescriptor::new(7u64);

        assert_eq!(named.label(), "web-vm-42");
        assert_eq!(unnamed.label(), "VM 7");
    }

    #[test]
    fn test_sink_stamps_generation() {
        let (tx, rx) = flume::unbounded();
        let sink = EventSink::new(3, tx);

        assert!(sink.send(TransportEvent::Connected));
        assert_eq!(
            rx.recv().unwrap(),
            SessionEnvelope {
                generation: 3,
                event: TransportEvent::Connected
            }
        );
    }

    #[test]
    fn test_sink_reports_dropped_receiver() {
        let (tx, rx) = flume::unbounded();
        let sink = EventSink::new(1, tx);
        drop(rx);

        assert!(!sink.send(TransportEvent::Disconnected("gone".into())));
    }
}
