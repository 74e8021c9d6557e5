use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Discriminates the two message kinds carried on the stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// A call initiated by the sender.
    Request,
    /// The answer to a call initiated by the receiver.
    Response,
    /// Any other `type` value, or none at all. Decodes cleanly so the reader
    /// can skip it.
    #[default]
    #[serde(other)]
    Unknown,
}

/// Failure description attached to a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    #[serde(default)]
    pub message: String,
}

/// The only unit ever written to or read from the stream.
#[derive(Debug, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Box<RawValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl WireMessage {
    /// Build an outbound request.
    pub fn request(id: u64, payload: Box<RawValue>) -> Self {
        Self {
            kind: MessageKind::Request,
            id,
            payload: Some(payload),
            error: None,
        }
    }

    /// Build a successful response to request `id`.
    pub fn success(id: u64, payload: Box<RawValue>) -> Self {
        Self {
            kind: MessageKind::Response,
            id,
            payload: Some(payload),
            error: None,
        }
    }

    /// Build a failed response to request `id`.
    pub fn failure(id: u64, message: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Response,
            id,
            payload: None,
            error: Some(WireError {
                message: message.into(),
            }),
        }
    }

    /// Take the payload, substituting JSON `null` when it is absent.
    pub fn take_payload(&mut self) -> Box<RawValue> {
        self.payload.take().unwrap_or_else(null_payload)
    }
}

/// Serialize a value into a raw payload.
///
/// A value that is already a [`RawValue`] is passed through verbatim.
pub fn encode_payload<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Box<RawValue>> {
    serde_json::value::to_raw_value(value)
}

/// The canonical "no value" payload.
pub fn null_payload() -> Box<RawValue> {
    RawValue::NULL.to_owned()
}
