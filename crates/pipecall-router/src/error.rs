/// Errors produced while registering or dispatching routes.
///
/// Dispatch errors are returned to the remote caller as the failure text of
/// its request.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// The method name was empty.
    #[error("request type is empty")]
    EmptyMethod,

    /// The request payload was not a routed envelope.
    #[error("invalid routed request: {0}")]
    Envelope(#[source] serde_json::Error),

    /// The inner payload could not be serialized or decoded.
    #[error("invalid payload: {0}")]
    Payload(#[source] serde_json::Error),

    /// No route matched and no fallback is installed.
    #[error("unknown route {0:?}")]
    UnknownRoute(String),
}

pub type Result<T> = std::result::Result<T, RouterError>;
