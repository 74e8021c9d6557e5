use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::{FutureExt, SinkExt, StreamExt};
use pipecall_frame::{encode_payload, MessageKind, WireCodec, WireMessage};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::value::RawValue;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::config::EndpointConfig;
use crate::error::{Result, RpcError};
use crate::handler::{Handler, RequestContext, NO_HANDLER_MESSAGE};
use crate::registry::{CallRegistry, PendingGuard};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Lifecycle state of an [`Endpoint`]. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// Constructed, reader not started.
    Idle,
    /// Reader task running.
    Running,
    /// Closed; terminal.
    Closed,
}

/// Snapshot of endpoint counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointStats {
    /// Outbound calls sent.
    pub calls_issued: u64,
    /// Inbound requests answered (successfully written or not).
    pub requests_served: u64,
    /// Responses that arrived with no pending call, e.g. after a timeout.
    pub late_responses: u64,
    /// Responses to peer requests that could not be written.
    pub response_write_failures: u64,
}

#[derive(Default)]
struct StatsCounters {
    calls_issued: AtomicU64,
    requests_served: AtomicU64,
    late_responses: AtomicU64,
    response_write_failures: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> EndpointStats {
        EndpointStats {
            calls_issued: self.calls_issued.load(Ordering::Relaxed),
            requests_served: self.requests_served.load(Ordering::Relaxed),
            late_responses: self.late_responses.load(Ordering::Relaxed),
            response_write_failures: self.response_write_failures.load(Ordering::Relaxed),
        }
    }
}

/// Request/response multiplexer over one duplex stream pair.
///
/// Cloning is cheap; every clone drives the same endpoint.
///
/// ```ignore
/// let endpoint = Endpoint::new(reader, writer, Some(Arc::new(router)));
/// endpoint.start();
/// let pong: Pong = endpoint.call_timeout(Duration::from_secs(2), &request).await?;
/// endpoint.shutdown().await;
/// ```
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<Inner>,
}

struct Inner {
    state: AtomicU8,
    reader: Mutex<Option<FramedRead<BoxedReader, WireCodec>>>,
    writer: tokio::sync::Mutex<Option<FramedWrite<BoxedWriter, WireCodec>>>,
    handler: Option<Arc<dyn Handler>>,
    registry: CallRegistry,
    next_id: AtomicU64,
    done: CancellationToken,
    config: EndpointConfig,
    stats: StatsCounters,
}

impl Endpoint {
    /// Create an endpoint with default configuration.
    ///
    /// With no handler, every inbound request is answered with a
    /// "no handler" failure.
    pub fn new<R, W>(reader: R, writer: W, handler: Option<Arc<dyn Handler>>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_config(reader, writer, handler, EndpointConfig::default())
    }

    /// Create an endpoint with explicit configuration.
    pub fn with_config<R, W>(
        reader: R,
        writer: W,
        handler: Option<Arc<dyn Handler>>,
        config: EndpointConfig,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let reader: BoxedReader = Box::new(reader);
        let writer: BoxedWriter = Box::new(writer);
        let codec = WireCodec::with_config(config.frame.clone());

        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(STATE_IDLE),
                reader: Mutex::new(Some(FramedRead::new(reader, codec.clone()))),
                writer: tokio::sync::Mutex::new(Some(FramedWrite::new(writer, codec))),
                handler,
                registry: CallRegistry::new(),
                next_id: AtomicU64::new(0),
                done: CancellationToken::new(),
                config,
                stats: StatsCounters::default(),
            }),
        }
    }

    /// Create an endpoint over this process's stdin and stdout.
    ///
    /// Nothing else may write to stdout while the endpoint is in use.
    pub fn stdio(handler: Option<Arc<dyn Handler>>) -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout(), handler)
    }

    /// Start the reader task on the current tokio runtime.
    ///
    /// Returns `true` only for the call that actually started it; later
    /// calls, and calls after close, do nothing.
    pub fn start(&self) -> bool {
        if self
            .inner
            .state
            .compare_exchange(
                STATE_IDLE,
                STATE_RUNNING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }

        let reader = self
            .inner
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(reader) = reader else {
            return false;
        };

        tracing::debug!("endpoint reader starting");
        tokio::spawn(read_loop(Arc::clone(&self.inner), reader));
        true
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EndpointState {
        match self.inner.state.load(Ordering::Acquire) {
            STATE_IDLE => EndpointState::Idle,
            STATE_RUNNING => EndpointState::Running,
            _ => EndpointState::Closed,
        }
    }

    /// Whether the endpoint has closed.
    pub fn is_closed(&self) -> bool {
        self.state() == EndpointState::Closed
    }

    /// Close the endpoint. Idempotent and callable from any context.
    ///
    /// Raises the done signal, stops the reader and fails every pending call
    /// with [`RpcError::Closed`].
    pub fn close(&self) {
        self.inner.close();
    }

    /// Resolves once the endpoint has closed, for whatever reason.
    pub async fn done(&self) {
        self.inner.done.cancelled().await
    }

    /// Close the endpoint and release the write half so the peer sees
    /// end-of-stream.
    pub async fn shutdown(&self) {
        self.close();
        let writer = self.inner.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(err) = writer.close().await {
                tracing::debug!(error = %err, "flush on shutdown failed");
            }
        }
    }

    /// Send `req` and decode the response into `Resp`.
    ///
    /// Use `Box<RawValue>` as `Resp` to receive the payload verbatim, or
    /// [`serde::de::IgnoredAny`] to discard it. Applies
    /// [`EndpointConfig::call_timeout`] when set.
    pub async fn call<Req, Resp>(&self, req: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let raw = self.call_raw(req).await?;
        decode_response(&raw)
    }

    /// Send `req` and return the response payload verbatim.
    pub async fn call_raw<Req>(&self, req: &Req) -> Result<Box<RawValue>>
    where
        Req: Serialize + ?Sized,
    {
        match self.inner.config.call_timeout {
            Some(timeout) => self.exchange_with_deadline(timeout, req).await,
            None => self.exchange(req).await,
        }
    }

    /// Like [`call`](Self::call) with an explicit deadline.
    ///
    /// A response arriving after the deadline is discarded.
    pub async fn call_timeout<Req, Resp>(&self, timeout: Duration, req: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let raw = self.exchange_with_deadline(timeout, req).await?;
        decode_response(&raw)
    }

    /// Like [`call`](Self::call), abandoned when `cancel` fires.
    ///
    /// An already-cancelled token fails without sending anything.
    pub async fn call_with_cancel<Req, Resp>(
        &self,
        cancel: &CancellationToken,
        req: &Req,
    ) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RpcError::Cancelled),
            result = self.exchange(req) => result?,
        };
        decode_response(&raw)
    }

    /// Counters for this endpoint.
    pub fn stats(&self) -> EndpointStats {
        self.inner.stats.snapshot()
    }

    /// Number of outbound calls awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.inner.registry.len()
    }

    async fn exchange_with_deadline<Req>(&self, timeout: Duration, req: &Req) -> Result<Box<RawValue>>
    where
        Req: Serialize + ?Sized,
    {
        match tokio::time::timeout(timeout, self.exchange(req)).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Timeout(timeout)),
        }
    }

    async fn exchange<Req>(&self, req: &Req) -> Result<Box<RawValue>>
    where
        Req: Serialize + ?Sized,
    {
        let inner = &*self.inner;
        if self.is_closed() {
            return Err(RpcError::Closed);
        }

        let payload = encode_payload(req)?;
        let id = inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let outcome = inner.registry.register(id)?;
        let _pending = PendingGuard::new(&inner.registry, id);

        inner.stats.calls_issued.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(id, "sending request");
        inner.send(WireMessage::request(id, payload)).await?;

        tokio::select! {
            biased;
            result = outcome => result.unwrap_or(Err(RpcError::Closed)),
            _ = inner.done.cancelled() => Err(RpcError::Closed),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("state", &self.state())
            .field("pending_calls", &self.pending_calls())
            .field("has_handler", &self.inner.handler.is_some())
            .finish()
    }
}

impl Inner {
    fn close(&self) {
        if self.state.swap(STATE_CLOSED, Ordering::AcqRel) == STATE_CLOSED {
            return;
        }
        self.done.cancel();
        let failed = self.registry.close();
        // Release the read half if the reader never started.
        drop(
            self.reader
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        tracing::debug!(failed_calls = failed, "endpoint closed");
    }

    async fn send(&self, msg: WireMessage) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(RpcError::Closed)?;
        writer.send(msg).await?;
        Ok(())
    }

    fn dispatch(self: &Arc<Self>, msg: WireMessage) {
        match msg.kind {
            MessageKind::Response => self.resolve(msg),
            MessageKind::Request => {
                tokio::spawn(Arc::clone(self).serve(msg));
            }
            MessageKind::Unknown => {
                tracing::debug!(id = msg.id, "ignoring message of unknown type");
            }
        }
    }

    fn resolve(&self, mut msg: WireMessage) {
        let outcome = match msg.error.take() {
            Some(err) => Err(RpcError::Remote(err.message)),
            None => Ok(msg.take_payload()),
        };
        if !self.registry.resolve(msg.id, outcome) {
            self.stats.late_responses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(id = msg.id, "discarding response with no pending call");
        }
    }

    async fn serve(self: Arc<Self>, mut msg: WireMessage) {
        let id = msg.id;
        let reply = match &self.handler {
            None => WireMessage::failure(id, NO_HANDLER_MESSAGE),
            Some(handler) => {
                let ctx = RequestContext::new(id, self.done.child_token());
                // Adapters may run user code before returning the future.
                let handled = match std::panic::catch_unwind(AssertUnwindSafe(|| {
                    handler.handle(ctx, msg.take_payload())
                })) {
                    Ok(fut) => AssertUnwindSafe(fut).catch_unwind().await,
                    Err(panic) => Err(panic),
                };
                match handled {
                    Ok(Ok(payload)) => WireMessage::success(id, payload),
                    Ok(Err(err)) => {
                        tracing::debug!(id, error = %err, "handler returned failure");
                        WireMessage::failure(id, err.to_string())
                    }
                    Err(_) => {
                        tracing::error!(id, "handler panicked");
                        WireMessage::failure(id, "handler panicked")
                    }
                }
            }
        };

        self.stats.requests_served.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = self.send(reply).await {
            self.stats
                .response_write_failures
                .fetch_add(1, Ordering::Relaxed);
            tracing::warn!(id, error = %err, "failed to write response");
        }
    }
}

async fn read_loop(inner: Arc<Inner>, mut frames: FramedRead<BoxedReader, WireCodec>) {
    loop {
        let next = tokio::select! {
            biased;
            _ = inner.done.cancelled() => break,
            next = frames.next() => next,
        };

        match next {
            Some(Ok(msg)) => inner.dispatch(msg),
            Some(Err(err)) => {
                tracing::debug!(error = %err, "stream decode failed");
                break;
            }
            None => {
                tracing::debug!("stream ended");
                break;
            }
        }
    }
    inner.close();
}

fn decode_response<Resp: DeserializeOwned>(raw: &RawValue) -> Result<Resp> {
    Ok(serde_json::from_str(raw.get())?)
}
