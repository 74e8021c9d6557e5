//! Wire messages and stream framing for pipecall.
//!
//! Every message on the stream is one JSON object:
//! - `type`: `"request"` or `"response"`
//! - `id`: the caller-assigned correlation id
//! - `payload`: opaque JSON, carried verbatim
//! - `error`: `{ "message": ... }` on failed responses only
//!
//! Messages are written newline-delimited. The decoder accepts any
//! whitespace-separated sequence of objects, so a message split across reads
//! or several messages in one read are both fine.

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{FrameConfig, WireCodec, DEFAULT_MAX_MESSAGE_SIZE};
pub use error::{FrameError, Result};
pub use message::{encode_payload, null_payload, MessageKind, WireError, WireMessage};
