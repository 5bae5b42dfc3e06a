//! Wire format of the remote shell endpoint.
//!
//! Every WebSocket text frame carries one event:
//!
//! ```text
//! {"event": "<name>", "data": <payload>}
//! ```
//!
//! | Direction | Event | Payload |
//! |-----------|-------|---------|
//! | out | `start` | `{"vmId": "42"}` |
//! | out | `data` | raw input string |
//! | out | `resize` | `{"rows": 30, "cols": 100}` |
//! | out | `close` | none |
//! | in | `ready` | `{"vmName": "...", "vmIp": "..."}` |
//! | in | `data` | raw output string |
//! | in | `error` | `{"message": "..."}` or a bare string |
//! | in | `closed` / `close` | `{"reason": "..."}`, optional |
//!
//! Inbound frames are decoded leniently: optional fields may be missing and
//! unknown event names decode to `Ok(None)`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Identifier of the VM a console attaches to.
///
/// Callers may hold either a numeric or a string id; it is always sent as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VmId(String);

impl VmId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VmId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for VmId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for VmId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Messages sent to the remote shell endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ClientMessage {
    Start {
        #[serde(rename = "vmId")]
        vm_id: VmId,
    },
    Data(String),
    Resize {
        rows: u16,
        cols: u16,
    },
    Close,
}

impl ClientMessage {
    /// The event name, for logs and test assertions.
    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::Start { .. } => "start",
            ClientMessage::Data(_) => "data",
            ClientMessage::Resize { .. } => "resize",
            ClientMessage::Close => "close",
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Messages received from the remote shell endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Ready {
        vm_name: Option<String>,
        vm_ip: Option<String>,
    },
    Data(String),
    Error {
        message: String,
    },
    Closed {
        reason: Option<String>,
    },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("`{event}` frame has an invalid payload")]
    Payload { event: String },
}

#[derive(Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ReadyPayload {
    vm_name: Option<String>,
    vm_ip: Option<String>,
}

#[derive(Deserialize, Default)]
struct ClosedPayload {
    reason: Option<String>,
}

const UNKNOWN_ERROR: &str = "Unknown error";

impl ServerMessage {
    /// Decodes one text frame. Unknown event names yield `Ok(None)`.
    pub fn decode(text: &str) -> Result<Option<Self>, ProtocolError> {
        let frame: Frame = serde_json::from_str(text)?;
        let message = match frame.event.as_str() {
            "ready" => {
                let payload: ReadyPayload = optional_payload(&frame)?;
                ServerMessage::Ready {
                    vm_name: payload.vm_name,
                    vm_ip: payload.vm_ip,
                }
            }
            "data" => match frame.data {
                Value::String(data) => ServerMessage::Data(data),
                _ => {
                    return Err(ProtocolError::Payload {
                        event: frame.event.clone(),
                    });
                }
            },
            "error" => ServerMessage::Error {
                message: error_message(&frame.data),
            },
            "closed" | "close" => {
                let payload: ClosedPayload = optional_payload(&frame)?;
                ServerMessage::Closed {
                    reason: payload.reason,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(message))
    }
}

fn optional_payload<T>(frame: &Frame) -> Result<T, ProtocolError>
where
    T: for<'de> Deserialize<'de> + Default,
{
    if frame.data.is_null() {
        return Ok(T::default());
    }
    T::deserialize(&frame.data).map_err(|_| ProtocolError::Payload {
        event: frame.event.clone(),
    })
}

fn error_message(data: &Value) -> String {
    match data {
        Value::String(message) => message.clone(),
        Value::Object(fields) => fields
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_ERROR)
            .to_string(),
        _ => UNKNOWN_ERROR.to_string(),
    }
}
