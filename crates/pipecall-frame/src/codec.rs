use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{FrameError, Result};
use crate::message::WireMessage;

/// Default maximum encoded message size: 16 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Configuration for the wire codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum encoded size of a single message in bytes. Default: 16 MiB.
    pub max_message_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Codec turning a byte stream into [`WireMessage`]s and back.
///
/// Wire format:
/// ```text
/// {"type":"request","id":1,"payload":{...}}\n
/// {"type":"response","id":1,"payload":{...}}\n
/// {"type":"response","id":2,"error":{"message":"..."}}\n
/// ```
///
/// Encoding always emits one compact object per line. Decoding only requires
/// whitespace between objects.
#[derive(Debug, Clone, Default)]
pub struct WireCodec {
    config: FrameConfig,
    // Bytes of the buffered partial message already searched for a newline.
    scanned: usize,
}

impl WireCodec {
    /// Create a codec with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self { config, scanned: 0 }
    }

    /// Current codec configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Whether `src` may hold a complete object yet.
    ///
    /// A parse is attempted when new bytes contain a newline, or when the
    /// buffer ends in `}` for peers that separate objects with other
    /// whitespace.
    fn may_be_complete(&self, src: &[u8]) -> bool {
        let unscanned = &src[self.scanned.min(src.len())..];
        unscanned.contains(&b'\n')
            || src.iter().rev().find(|b| !b.is_ascii_whitespace()) == Some(&b'}')
    }

    fn check_partial_size(&self, buffered: usize) -> Result<()> {
        if buffered > self.config.max_message_size {
            tracing::debug!(
                buffered,
                max = self.config.max_message_size,
                "incomplete message exceeds size limit"
            );
            return Err(FrameError::MessageTooLarge {
                size: buffered,
                max: self.config.max_message_size,
            });
        }
        Ok(())
    }
}

impl Decoder for WireCodec {
    type Item = WireMessage;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<WireMessage>> {
        match src.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(start) => {
                src.advance(start);
                self.scanned = self.scanned.saturating_sub(start);
            }
            None => {
                src.clear();
                self.scanned = 0;
                return Ok(None); // Need more data
            }
        }

        if !self.may_be_complete(src) {
            self.scanned = src.len();
            self.check_partial_size(src.len())?;
            return Ok(None); // Need more data
        }

        let (decoded, consumed) = {
            let mut stream =
                serde_json::Deserializer::from_slice(&src[..]).into_iter::<WireMessage>();
            let decoded = stream.next();
            (decoded, stream.byte_offset())
        };

        match decoded {
            Some(Ok(msg)) => {
                src.advance(consumed);
                self.scanned = 0;
                Ok(Some(msg))
            }
            Some(Err(err)) if err.is_eof() => {
                self.scanned = src.len();
                self.check_partial_size(src.len())?;
                Ok(None) // Need more data
            }
            Some(Err(err)) => {
                tracing::trace!(error = %err, "rejecting malformed message");
                Err(FrameError::Json(err))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<WireMessage> for WireCodec {
    type Error = FrameError;

    fn encode(&mut self, msg: WireMessage, dst: &mut BytesMut) -> Result<()> {
        let encoded = serde_json::to_vec(&msg)?;
        if encoded.len() > self.config.max_message_size {
            return Err(FrameError::MessageTooLarge {
                size: encoded.len(),
                max: self.config.max_message_size,
            });
        }
        tracing::trace!(id = msg.id, size = encoded.len(), "encoded message");
        dst.reserve(encoded.len() + 1);
        dst.put_slice(&encoded);
        dst.put_u8(b'\n');
        Ok(())
    }
}
