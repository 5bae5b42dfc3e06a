//! Transport session: one logical remote-shell connection.
//!
//! All protocol handling goes through a single table, [`transition`], which
//! maps the current [`ConnectionState`] and an incoming [`TransportEvent`] to
//! the next state plus a list of [`Effect`]s. [`TransportSession`] owns the
//! state variable and the outbound [`Transport`], applies the effects, and
//! hands back whatever must be written to the terminal surface.
//!
//! # State Machine
//!
//! ```text
//!              Connected (link up, emit start)
//!             ┌───────┐
//!             ▼       │
//!        Connecting ──┘── ready ──→ Connected(peer)
//!             │                        │
//!             ├── connect failed ──┐   ├── error ──→ Error(message)
//!             ├── error ───────────┤   ├── closed ─→ Closed(Graceful)
//!             ├── closed ──────────┤   └── drop ───→ Closed(Dropped)
//!             └── drop ────────────┘
//! ```
//!
//! `Error` and `Closed` are terminal for a session. Leaving them requires a
//! new session, opened by the console's manual reconnect.

use crate::auth::usable_token;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::surface::GridSize;
use crate::transport::{Connector, EventSink, SessionDescriptor, Transport, TransportError, TransportEvent};
use thiserror::Error;
use tracing::{debug, info, warn};

/// What the remote end told us about itself in `ready`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PeerInfo {
    pub vm_name: Option<String>,
    pub vm_ip: Option<String>,
}

/// How a session ended without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseKind {
    /// The remote peer closed the shell (`closed` event).
    Graceful(String),

    /// The underlying connection dropped.
    Dropped(String),
}

impl CloseKind {
    pub fn reason(&self) -> &str {
        match self {
            CloseKind::Graceful(reason) | CloseKind::Dropped(reason) => reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected(PeerInfo),
    Error(String),
    Closed(CloseKind),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }

    /// Status text shown next to the indicator dot.
    pub fn status_label(&self) -> String {
        match self {
            ConnectionState::Connecting => "Connecting...".to_string(),
            ConnectionState::Connected(_) => "Connected".to_string(),
            ConnectionState::Error(message) => format!("Error: {message}"),
            ConnectionState::Closed(kind) => format!("Disconnected: {}", kind.reason()),
        }
    }
}

/// One-time status line written into the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Connected { label: String, address: Option<String> },
    Error(String),
    Closed(String),
    Disconnected(String),
}

impl Notice {
    /// The line to pass to `write_line`, with its ANSI colors.
    pub fn render(&self) -> String {
        match self {
            Notice::Connected {
                label,
                address: Some(address),
            } => format!("\x1b[1;32mConnected to {label} ({address})\x1b[0m"),
            Notice::Connected { label, address: None } => {
                format!("\x1b[1;32mConnected to {label}\x1b[0m")
            }
            Notice::Error(message) => format!("\r\n\x1b[1;31mError: {message}\x1b[0m"),
            Notice::Closed(reason) => format!("\r\n\x1b[33mConnection closed: {reason}\x1b[0m"),
            Notice::Disconnected(reason) => format!("\r\n\x1b[33mDisconnected: {reason}\x1b[0m"),
        }
    }
}

/// A side effect requested by [`transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// The underlying link is usable for outbound messages.
    LinkUp,
    /// The underlying link is gone, nothing more can be sent.
    LinkDown,
    /// Send `start` for the session's VM.
    EmitStart,
    /// Write peer output to the surface, verbatim.
    WritePeer(String),
    Notice(Notice),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: ConnectionState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn stay(state: &ConnectionState) -> Self {
        Self {
            next: state.clone(),
            effects: Vec::new(),
        }
    }

    fn to(next: ConnectionState, effects: Vec<Effect>) -> Self {
        Self { next, effects }
    }
}

const DEFAULT_CLOSE_REASON: &str = "session ended";

/// The `(state, event) -> (next state, effects)` table.
pub fn transition(
    state: &ConnectionState,
    event: &TransportEvent,
    descriptor: &SessionDescriptor,
) -> Transition {
    use ConnectionState::*;

    match (state, event) {
        (Connecting, TransportEvent::Connected) => {
            Transition::to(Connecting, vec![Effect::LinkUp, Effect::EmitStart])
        }

        (Connecting, TransportEvent::Message(ServerMessage::Ready { vm_name, vm_ip })) => {
            let peer = PeerInfo {
                vm_name: vm_name.clone(),
                vm_ip: vm_ip.clone(),
            };
            let label = vm_name.clone().unwrap_or_else(|| descriptor.label());
            Transition::to(
                Connected(peer),
                vec![Effect::Notice(Notice::Connected {
                    label,
                    address: vm_ip.clone(),
                })],
            )
        }

        (Connected(_), TransportEvent::Message(ServerMessage::Data(data))) => {
            Transition::to(state.clone(), vec![Effect::WritePeer(data.clone())])
        }

        (Connecting | Connected(_), TransportEvent::Message(ServerMessage::Error { message })) => {
            Transition::to(
                Error(message.clone()),
                vec![Effect::Notice(Notice::Error(message.clone()))],
            )
        }

        (Connecting, TransportEvent::ConnectFailed(reason)) => {
            let message = format!("Failed to connect: {reason}");
            Transition::to(
                Error(message.clone()),
                vec![Effect::LinkDown, Effect::Notice(Notice::Error(message))],
            )
        }

        (Connecting | Connected(_), TransportEvent::Message(ServerMessage::Closed { reason })) => {
            let reason = reason.clone().unwrap_or_else(|| DEFAULT_CLOSE_REASON.to_string());
            Transition::to(
                Closed(CloseKind::Graceful(reason.clone())),
                vec![Effect::Notice(Notice::Closed(reason))],
            )
        }

        (Connecting | Connected(_), TransportEvent::Disconnected(reason)) => Transition::to(
            Closed(CloseKind::Dropped(reason.clone())),
            vec![Effect::LinkDown, Effect::Notice(Notice::Disconnected(reason.clone()))],
        ),

        // Terminal states keep their banner, only the link bookkeeping moves.
        (Error(_) | Closed(_), TransportEvent::Disconnected(_) | TransportEvent::ConnectFailed(_)) => {
            Transition::to(state.clone(), vec![Effect::LinkDown])
        }

        _ => Transition::stay(state),
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no credential token available")]
    MissingCredential,

    #[error("could not open transport: {0}")]
    Connect(#[from] TransportError),
}

/// What the console must write to the surface after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceWrite {
    /// Peer output, through `write`.
    Bytes(String),
    /// A notice, through `write_line`.
    Line(String),
}

/// Exactly one remote-shell connection for one descriptor.
pub struct TransportSession {
    descriptor: SessionDescriptor,
    generation: u64,
    state: ConnectionState,
    transport: Option<Box<dyn Transport>>,
    link_up: bool,
    close_sent: bool,
}

impl TransportSession {
    /// Opens a session. Returns before any network activity.
    ///
    /// # Errors
    ///
    /// [`SessionError::MissingCredential`] for an absent or blank token, in
    /// which case the connector is never invoked.
    pub fn open(
        descriptor: SessionDescriptor,
        token: Option<&str>,
        connector: &dyn Connector,
        sink: EventSink,
    ) -> Result<Self, SessionError> {
        let token = usable_token(token).ok_or(SessionError::MissingCredential)?;
        let generation = sink.generation();

        info!(vm_id = %descriptor.vm_id, generation, "opening console session");
        let transport = connector.connect(&descriptor, token, sink)?;

        Ok(Self {
            descriptor,
            generation,
            state: ConnectionState::Connecting,
            transport: Some(transport),
            link_up: false,
            close_sent: false,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn descriptor(&self) -> &SessionDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Applies one transport event and returns the surface writes it causes.
    pub fn handle(&mut self, event: TransportEvent) -> Vec<SurfaceWrite> {
        let Transition { next, effects } = transition(&self.state, &event, &self.descriptor);
        if next != self.state {
            debug!(from = ?self.state, to = ?next, "session transition");
        } else if effects.is_empty() {
            debug!(state = ?self.state, ?event, "event ignored");
        }
        self.state = next;

        let mut writes = Vec::new();
        for effect in effects {
            match effect {
                Effect::LinkUp => self.link_up = true,
                Effect::LinkDown => self.link_up = false,
                Effect::EmitStart => {
                    let start = ClientMessage::Start {
                        vm_id: self.descriptor.vm_id.clone(),
                    };
                    if let Err(err) = self.emit(start) {
                        warn!(%err, "failed to send start");
                    }
                }
                Effect::WritePeer(data) => writes.push(SurfaceWrite::Bytes(data)),
                Effect::Notice(notice) => {
                    if let Notice::Connected { label, address } = &notice {
                        info!(%label, address = address.as_deref().unwrap_or("-"), "console connected");
                    }
                    writes.push(SurfaceWrite::Line(notice.render()));
                }
            }
        }
        writes
    }

    /// Forwards input to the shell. Dropped unless connected.
    pub fn send(&mut self, data: &str) -> bool {
        if !self.is_connected() {
            debug!(len = data.len(), "input dropped, session not connected");
            return false;
        }
        match self.emit(ClientMessage::Data(data.to_string())) {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "failed to send input");
                false
            }
        }
    }

    /// Tells the shell about new dimensions. Dropped unless connected.
    pub fn resize(&mut self, grid: GridSize) -> bool {
        if !self.is_connected() {
            return false;
        }
        let message = ClientMessage::Resize {
            rows: grid.rows,
            cols: grid.cols,
        };
        match self.emit(message) {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "failed to send resize");
                false
            }
        }
    }

    /// Asks the remote end to end the shell. Sent at most once, and only
    /// while the link is up.
    pub fn request_close(&mut self) -> Result<(), TransportError> {
        if self.close_sent || !self.link_up {
            return Ok(());
        }
        self.close_sent = true;
        self.emit(ClientMessage::Close)
    }

    /// Tears the underlying transport down. Safe to repeat.
    pub fn disconnect(&mut self) -> Result<(), TransportError> {
        self.link_up = false;
        match self.transport.take() {
            Some(mut transport) => {
                debug!(generation = self.generation, "disconnecting transport");
                transport.disconnect()
            }
            None => Ok(()),
        }
    }

    fn emit(&mut self, message: ClientMessage) -> Result<(), TransportError> {
        let transport = self.transport.as_mut().ok_or(TransportError::Closed)?;
        debug!(event = message.name(), "emit");
        transport.emit(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, RecordingConnector};

    fn descriptor() -> SessionDescriptor {
        SessionDescriptor::new("42").with_name("web-vm-42")
    }

    fn ready(ip: &str) -> TransportEvent {
        TransportEvent::Message(ServerMessage::Ready {
            vm_name: Some("web-vm-42".into()),
            vm_ip: Some(ip.into()),
        })
    }

    fn open(connector: &RecordingConnector) -> TransportSession {
        let (tx, _rx) = flume::unbounded();
        TransportSession::open(descriptor(), Some("token"), connector, EventSink::new(1, tx)).unwrap()
    }

    fn connected(connector: &RecordingConnector) -> TransportSession {
        let mut session = open(connector);
        session.handle(TransportEvent::Connected);
        session.handle(ready("10.0.0.5"));
        session
    }

    #[test]
    fn test_start_waits_for_handshake() {
        let table = transition(&ConnectionState::Connecting, &TransportEvent::Connected, &descriptor());
        assert_eq!(table.next, ConnectionState::Connecting);
        assert_eq!(table.effects, vec![Effect::LinkUp, Effect::EmitStart]);
    }

    #[test]
    fn test_ready_connects_with_banner() {
        let table = transition(&ConnectionState::Connecting, &ready("10.0.0.5"), &descriptor());

        assert!(table.next.is_connected());
        let [Effect::Notice(notice)] = table.effects.as_slice() else {
            panic!("unexpected effects: {:?}", table.effects);
        };
        assert!(notice.render().contains("10.0.0.5"));
    }

    #[test]
    fn test_ready_banner_falls_back_to_descriptor() {
        let event = TransportEvent::Message(ServerMessage::Ready {
            vm_name: None,
            vm_ip: None,
        });
        let table = transition(&ConnectionState::Connecting, &event, &SessionDescriptor::new(7u64));
        assert_eq!(
            table.effects,
            vec![Effect::Notice(Notice::Connected {
                label: "VM 7".into(),
                address: None
            })]
        );
    }

    #[test]
    fn test_data_only_written_when_connected() {
        let data = TransportEvent::Message(ServerMessage::Data("hi".into()));
        let connected = ConnectionState::Connected(PeerInfo::default());

        for state in [
            ConnectionState::Connecting,
            ConnectionState::Error("x".into()),
            ConnectionState::Closed(CloseKind::Dropped("x".into())),
        ] {
            assert!(transition(&state, &data, &descriptor()).effects.is_empty());
        }
        assert_eq!(
            transition(&connected, &data, &descriptor()).effects,
            vec![Effect::WritePeer("hi".into())]
        );
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        let error = ConnectionState::Error("shell exited".into());
        for event in [
            TransportEvent::Connected,
            ready("10.0.0.5"),
            TransportEvent::Message(ServerMessage::Closed { reason: None }),
            TransportEvent::Disconnected("io".into()),
        ] {
            assert_eq!(transition(&error, &event, &descriptor()).next, error);
        }
    }

    #[test]
    fn test_close_and_drop_are_distinct() {
        let connected = ConnectionState::Connected(PeerInfo::default());
        let graceful = transition(
            &connected,
            &TransportEvent::Message(ServerMessage::Closed { reason: None }),
            &descriptor(),
        );
        let dropped = transition(&connected, &TransportEvent::Disconnected("transport close".into()), &descriptor());

        assert_eq!(
            graceful.next,
            ConnectionState::Closed(CloseKind::Graceful(DEFAULT_CLOSE_REASON.into()))
        );
        assert_eq!(
            dropped.next,
            ConnectionState::Closed(CloseKind::Dropped("transport close".into()))
        );
        assert_eq!(dropped.next.status_label(), "Disconnected: transport close");
    }

    #[test]
    fn test_connect_failure_is_an_error() {
        let table = transition(
            &ConnectionState::Connecting,
            &TransportEvent::ConnectFailed("refused".into()),
            &descriptor(),
        );
        assert_eq!(table.next, ConnectionState::Error("Failed to connect: refused".into()));
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(ConnectionState::Connecting.status_label(), "Connecting...");
        assert_eq!(
            ConnectionState::Connected(PeerInfo::default()).status_label(),
            "Connected"
        );
        assert_eq!(ConnectionState::Error("boom".into()).status_label(), "Error: boom");
    }

    #[test]
    fn test_open_rejects_blank_tokens() {
        let connector = RecordingConnector::new();
        for token in [None, Some(""), Some("   "), Some("\t\n")] {
            let (tx, _rx) = flume::unbounded();
            let result = TransportSession::open(descriptor(), token, &connector, EventSink::new(1, tx));
            assert!(matches!(result, Err(SessionError::MissingCredential)));
        }
        assert!(connector.log().calls().is_empty());
    }

    #[test]
    fn test_open_does_not_emit() {
        let connector = RecordingConnector::new();
        let _session = open(&connector);
        assert_eq!(
            connector.log().calls(),
            vec![Call::Connect {
                vm_id: "42".into(),
                token: "token".into()
            }]
        );
    }

    #[test]
    fn test_start_sent_after_handshake() {
        let connector = RecordingConnector::new();
        let mut session = open(&connector);
        session.handle(TransportEvent::Connected);

        assert_eq!(
            connector.log().emitted(),
            vec![ClientMessage::Start { vm_id: "42".into() }]
        );
    }

    #[test]
    fn test_send_and_resize_need_connected() {
        let connector = RecordingConnector::new();
        let mut session = open(&connector);
        session.handle(TransportEvent::Connected);

        assert!(!session.send("ls\n"));
        assert!(!session.send(""));
        assert!(!session.resize(GridSize::new(30, 100)));
        assert!(!session.send(&"x".repeat(4 * 1024 * 1024)));

        session.handle(ready("10.0.0.5"));
        assert!(session.send("ls\n"));
        assert!(session.resize(GridSize::new(30, 100)));

        assert_eq!(
            connector.log().emitted(),
            vec![
                ClientMessage::Start { vm_id: "42".into() },
                ClientMessage::Data("ls\n".into()),
                ClientMessage::Resize { rows: 30, cols: 100 },
            ]
        );
    }

    #[test]
    fn test_error_stops_input() {
        let connector = RecordingConnector::new();
        let mut session = connected(&connector);

        let writes = session.handle(TransportEvent::Message(ServerMessage::Error {
            message: "shell exited".into(),
        }));

        assert_eq!(session.state(), &ConnectionState::Error("shell exited".into()));
        assert!(matches!(&writes[..], [SurfaceWrite::Line(line)] if line.contains("shell exited")));
        assert!(!session.send("ls\n"));
        assert!(!connector.log().emitted().contains(&ClientMessage::Data("ls\n".into())));
    }

    #[test]
    fn test_data_passes_through_in_order() {
        let connector = RecordingConnector::new();
        let mut session = connected(&connector);

        let mut written = Vec::new();
        for chunk in ["a\r", "\nb", "\x1b[3", "1mc"] {
            written.extend(session.handle(TransportEvent::Message(ServerMessage::Data(chunk.into()))));
        }
        assert_eq!(
            written,
            vec![
                SurfaceWrite::Bytes("a\r".into()),
                SurfaceWrite::Bytes("\nb".into()),
                SurfaceWrite::Bytes("\x1b[3".into()),
                SurfaceWrite::Bytes("1mc".into()),
            ]
        );
    }

    #[test]
    fn test_request_close_once_while_link_up() {
        let connector = RecordingConnector::new();
        let mut session = connected(&connector);

        session.request_close().unwrap();
        session.request_close().unwrap();
        session.disconnect().unwrap();
        session.disconnect().unwrap();

        let log = connector.log();
        let closes = log.emitted().iter().filter(|m| **m == ClientMessage::Close).count();
        assert_eq!(closes, 1);
        assert_eq!(log.calls().iter().filter(|c| **c == Call::Disconnect).count(), 1);
    }

    #[test]
    fn test_request_close_skipped_before_handshake() {
        let connector = RecordingConnector::new();
        let mut session = open(&connector);

        session.request_close().unwrap();
        assert!(connector.log().emitted().is_empty());
    }

    #[test]
    fn test_request_close_skipped_after_drop() {
        let connector = RecordingConnector::new();
        let mut session = connected(&connector);
        session.handle(TransportEvent::Disconnected("reset".into()));

        session.request_close().unwrap();
        assert!(!connector.log().emitted().contains(&ClientMessage::Close));
    }
}
