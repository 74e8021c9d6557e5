use std::time::Duration;

/// Errors that can occur in endpoint operations.
///
/// Each call failure names which side failed: the peer's handler
/// ([`RpcError::Remote`]), the caller's own deadline or cancellation, the
/// endpoint lifecycle, or local encoding.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Frame-level error while writing to the stream.
    #[error("frame error: {0}")]
    Frame(#[from] pipecall_frame::FrameError),

    /// Local JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The peer's handler reported a failure.
    #[error("remote error: {0}")]
    Remote(String),

    /// The endpoint was closed before the call completed.
    #[error("endpoint closed")]
    Closed,

    /// The call deadline elapsed.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the call.
    #[error("call cancelled")]
    Cancelled,

    /// Failed to start, wire, or reap a child process.
    #[error("child process error: {0}")]
    Process(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RpcError>;
