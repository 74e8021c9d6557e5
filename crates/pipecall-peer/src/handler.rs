use std::future::Future;
use std::pin::Pin;

use pipecall_frame::encode_payload;
use serde::Serialize;
use serde_json::value::RawValue;
use tokio_util::sync::CancellationToken;

/// Failure text sent back when an endpoint has no handler installed.
pub const NO_HANDLER_MESSAGE: &str = "no handler";

/// Error type returned by handlers. Only its `Display` text crosses the wire.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result of answering one inbound request.
pub type HandlerResult = std::result::Result<Box<RawValue>, BoxError>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-request information handed to a [`Handler`].
#[derive(Debug, Clone)]
pub struct RequestContext {
    id: u64,
    closed: CancellationToken,
}

impl RequestContext {
    /// Create a context for the request `id`.
    ///
    /// `closed` fires when the serving endpoint closes.
    pub fn new(id: u64, closed: CancellationToken) -> Self {
        Self { id, closed }
    }

    /// The id the peer assigned to this request.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the serving endpoint has closed.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the serving endpoint has closed.
    ///
    /// Handlers are never interrupted; long-running ones may select on this
    /// to stop early.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}

/// Answers inbound requests for an endpoint.
pub trait Handler: Send + Sync + 'static {
    /// Handle a request carrying the raw `payload`.
    fn handle(&self, ctx: RequestContext, payload: Box<RawValue>)
        -> BoxFuture<'static, HandlerResult>;
}

/// A [`Handler`] built from an async closure. See [`handler_fn`].
#[derive(Clone)]
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as a [`Handler`].
///
/// The closure may return any serializable value and any error convertible
/// into [`BoxError`] (`String`, `&str`, or any `std::error::Error`).
pub fn handler_fn<F, Fut, R, E>(f: F) -> FnHandler<F>
where
    F: Fn(RequestContext, Box<RawValue>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    R: Serialize + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    FnHandler { f }
}

impl<F, Fut, R, E> Handler for FnHandler<F>
where
    F: Fn(RequestContext, Box<RawValue>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    R: Serialize + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    fn handle(
        &self,
        ctx: RequestContext,
        payload: Box<RawValue>,
    ) -> BoxFuture<'static, HandlerResult> {
        let fut = (self.f)(ctx, payload);
        Box::pin(async move {
            let value = fut.await.map_err(Into::<BoxError>::into)?;
            Ok::<_, BoxError>(encode_payload(&value)?)
        })
    }
}
