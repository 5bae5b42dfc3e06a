//! Recording test doubles for the transport seam.

use crate::console::ResizeWatch;
use crate::protocol::ClientMessage;
use crate::transport::{Connector, EventSink, SessionDescriptor, Transport, TransportError, TransportEvent};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect { vm_id: String, token: String },
    Emit(ClientMessage),
    Disconnect,
    RemoveWatch,
}

/// Shared, ordered log of every call made on the doubles.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().clone()
    }

    pub fn emitted(&self) -> Vec<ClientMessage> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Emit(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn resizes(&self) -> Vec<(u16, u16)> {
        self.emitted()
            .into_iter()
            .filter_map(|message| match message {
                ClientMessage::Resize { rows, cols } => Some((rows, cols)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    pub emit: bool,
    pub disconnect: bool,
}

/// Connector that records calls and keeps every sink it was handed.
#[derive(Default)]
pub struct RecordingConnector {
    log: CallLog,
    sinks: Mutex<Vec<EventSink>>,
    faults: Faults,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(log: CallLog, faults: Faults) -> Self {
        Self {
            log,
            faults,
            ..Self::default()
        }
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    pub fn connects(&self) -> usize {
        self.sinks.lock().len()
    }

    /// Delivers an event through the sink of the `index`-th connect.
    pub fn deliver(&self, index: usize, event: TransportEvent) {
        let sinks = self.sinks.lock();
        assert!(sinks[index].send(event), "console receiver dropped");
    }

    /// Delivers an event through the most recent sink.
    pub fn deliver_latest(&self, event: TransportEvent) {
        let index = self.connects() - 1;
        self.deliver(index, event);
    }
}

impl Connector for RecordingConnector {
    fn connect(
        &self,
        target: &SessionDescriptor,
        token: &str,
        sink: EventSink,
    ) -> Result<Box<dyn Transport>, TransportError> {
        self.log.push(Call::Connect {
            vm_id: target.vm_id.to_string(),
            token: token.to_string(),
        });
        self.sinks.lock().push(sink);
        Ok(Box::new(RecordingTransport {
            log: self.log.clone(),
            faults: self.faults,
        }))
    }
}

pub struct RecordingTransport {
    log: CallLog,
    faults: Faults,
}

impl Transport for RecordingTransport {
    fn emit(&mut self, message: ClientMessage) -> Result<(), TransportError> {
        self.log.push(Call::Emit(message));
        if self.faults.emit {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.log.push(Call::Disconnect);
        if self.faults.disconnect {
            return Err(TransportError::Io(std::io::Error::other("socket already gone")));
        }
        Ok(())
    }
}

pub struct RecordingWatch {
    pub log: CallLog,
}

impl ResizeWatch for RecordingWatch {
    fn remove(self: Box<Self>) {
        self.log.push(Call::RemoveWatch);
    }
}
