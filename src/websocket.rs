//! WebSocket implementation of the transport seam.
//!
//! Each session gets one background thread that owns the socket:
//!
//! ```text
//!             ┌──────────────── session thread ────────────────┐
//! emit ─→ flume ─→ drain outbound ─→ socket.send                │
//!             │                                                  │
//!             │   socket.read (short timeout) ─→ decode ─→ EventSink ─→ console
//!             └──────────────────────────────────────────────────┘
//! ```
//!
//! The read timeout keeps the loop responsive to outbound messages without a
//! second thread. Frames are pushed to the sink in the order they were read.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::transport::{
    Connector, EventSink, SessionDescriptor, Transport, TransportError, TransportEvent,
};
use std::io;
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tungstenite::client::IntoClientRequest;
use tungstenite::http::HeaderValue;
use tungstenite::http::header::AUTHORIZATION;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Error as WsError, Message, WebSocket};
use url::Url;

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// How long a read may block before outbound messages are checked again.
const POLL_INTERVAL: Duration = Duration::from_millis(15);

/// Upper bound on waiting for the peer to acknowledge a local close.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Opens console sessions against `<endpoint>?vmId=<id>`.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    endpoint: Url,
}

impl WebSocketConnector {
    /// # Errors
    ///
    /// Fails if `endpoint` is not a `ws://` or `wss://` URL.
    pub fn new(endpoint: &str) -> Result<Self, TransportError> {
        let endpoint =
            Url::parse(endpoint).map_err(|err| TransportError::Endpoint(format!("{endpoint}: {err}")))?;
        match endpoint.scheme() {
            "ws" | "wss" => Ok(Self { endpoint }),
            scheme => Err(TransportError::Endpoint(format!(
                "unsupported scheme `{scheme}`, expected ws or wss"
            ))),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The URL a session for `target` connects to.
    pub fn session_url(&self, target: &SessionDescriptor) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("vmId", target.vm_id.as_str());
        url
    }
}

impl Connector for WebSocketConnector {
    fn connect(
        &self,
        target: &SessionDescriptor,
        token: &str,
        sink: EventSink,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let url = self.session_url(target);
        let mut request = url.as_str().into_client_request()?;
        let bearer =
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| TransportError::Credential)?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (outbound_tx, outbound_rx) = flume::unbounded();
        thread::Builder::new()
            .name(format!("vm-console-{}", target.vm_id))
            .spawn(move || run_session(request, sink, outbound_rx))?;

        Ok(Box::new(WebSocketTransport {
            outbound: outbound_tx,
            closed: false,
        }))
    }
}

enum Outbound {
    Message(ClientMessage),
    Disconnect,
}

/// Handle held by the session; the socket itself lives on the session thread.
struct WebSocketTransport {
    outbound: flume::Sender<Outbound>,
    closed: bool,
}

impl Transport for WebSocketTransport {
    fn emit(&mut self, message: ClientMessage) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(Outbound::Message(message))
            .map_err(|_| TransportError::Closed)
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // The thread may already have exited after a remote close.
        let _ = self.outbound.send(Outbound::Disconnect);
        Ok(())
    }
}

/// Why the pump loop stopped.
enum Exit {
    /// Local disconnect, or nobody is listening anymore.
    Local,
    /// The remote end went away.
    Remote(String),
}

fn run_session(
    request: tungstenite::handshake::client::Request,
    sink: EventSink,
    outbound: flume::Receiver<Outbound>,
) {
    let generation = sink.generation();
    let mut socket = match tungstenite::connect(request) {
        Ok((socket, _response)) => socket,
        Err(err) => {
            warn!(generation, %err, "console handshake failed");
            sink.send(TransportEvent::ConnectFailed(err.to_string()));
            return;
        }
    };
    if let Err(err) = set_read_timeout(&socket, Some(POLL_INTERVAL)) {
        warn!(%err, "could not set read timeout");
    }

    info!(generation, "console transport connected");
    if !sink.send(TransportEvent::Connected) {
        shutdown(&mut socket);
        return;
    }

    match pump(&mut socket, &sink, &outbound) {
        Ok(Exit::Local) => {
            debug!(generation, "closing console transport");
            shutdown(&mut socket);
        }
        Ok(Exit::Remote(reason)) => {
            info!(generation, %reason, "console transport closed by peer");
            sink.send(TransportEvent::Disconnected(reason));
        }
        Err(err) => {
            warn!(generation, %err, "console transport failed");
            sink.send(TransportEvent::Disconnected(err.to_string()));
        }
    }
}

fn pump(
    socket: &mut Socket,
    sink: &EventSink,
    outbound: &flume::Receiver<Outbound>,
) -> Result<Exit, TransportError> {
    loop {
        loop {
            match outbound.try_recv() {
                Ok(Outbound::Message(message)) => {
                    socket.send(Message::text(message.encode()?))?;
                }
                Ok(Outbound::Disconnect) | Err(flume::TryRecvError::Disconnected) => {
                    return Ok(Exit::Local);
                }
                Err(flume::TryRecvError::Empty) => break,
            }
        }

        match socket.read() {
            Ok(Message::Text(text)) => match ServerMessage::decode(text.as_str()) {
                Ok(Some(message)) => {
                    if !sink.send(TransportEvent::Message(message)) {
                        return Ok(Exit::Local);
                    }
                }
                Ok(None) => debug!(frame = text.as_str(), "ignoring unknown event"),
                Err(err) => warn!(%err, "ignoring malformed frame"),
            },
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|frame| frame.reason.to_string())
                    .filter(|reason| !reason.is_empty())
                    .unwrap_or_else(|| "server closed the connection".to_string());
                return Ok(Exit::Remote(reason));
            }
            // Pongs are queued by tungstenite and flushed on the next read or send.
            Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Err(WsError::Io(err)) if is_idle(&err) => {}
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                return Ok(Exit::Remote("connection closed".to_string()));
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Sends a close frame and waits briefly for the peer to acknowledge it.
fn shutdown(socket: &mut Socket) {
    if let Err(err) = socket.close(None) {
        debug!(%err, "close frame not sent");
        return;
    }
    let deadline = Instant::now() + CLOSE_GRACE;
    while Instant::now() < deadline {
        match socket.read() {
            Ok(_) => {}
            Err(WsError::Io(err)) if is_idle(&err) => {}
            Err(_) => break,
        }
    }
}

fn is_idle(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

fn set_read_timeout(socket: &Socket, timeout: Option<Duration>) -> io::Result<()> {
    match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(timeout),
        MaybeTlsStream::Rustls(stream) => stream.get_ref().set_read_timeout(timeout),
        _ => Ok(()),
    }
}
