use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use pipecall_peer::{
    encode_payload, handler_fn, BoxError, BoxFuture, Handler, HandlerResult, RawValue,
    RequestContext,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, RouterError};
use crate::request::RoutedRequest;

type FallbackFn = dyn Fn(RequestContext, String, Box<RawValue>) -> BoxFuture<'static, HandlerResult>
    + Send
    + Sync;

#[derive(Default)]
struct RouteTable {
    routes: HashMap<String, Arc<dyn Handler>>,
    fallback: Option<Arc<FallbackFn>>,
}

/// A [`Handler`] that dispatches [`RoutedRequest`]s by method name.
///
/// Routes may be registered at any time, including while requests are being
/// served; dispatch only takes the read lock.
#[derive(Default)]
pub struct Router {
    table: RwLock<RouteTable>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RouteTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RouteTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` for `method`, replacing any previous route.
    pub fn route<H: Handler>(&self, method: &str, handler: H) -> Result<()> {
        if method.is_empty() {
            return Err(RouterError::EmptyMethod);
        }
        let replaced = self
            .write()
            .routes
            .insert(method.to_string(), Arc::new(handler))
            .is_some();
        tracing::debug!(method, replaced, "route registered");
        Ok(())
    }

    /// Register a route that receives the raw inner payload.
    ///
    /// An absent payload arrives as JSON `null`.
    pub fn handle<F, Fut, R, E>(&self, method: &str, f: F) -> Result<()>
    where
        F: Fn(RequestContext, Box<RawValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
        R: Serialize + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        self.route(method, handler_fn(f))
    }

    /// Register a route whose payload is decoded into `T` first.
    ///
    /// An absent or `null` payload yields `T::default()`. A payload that does
    /// not decode fails the request without invoking `f`.
    pub fn handle_typed<T, F, Fut, R, E>(&self, method: &str, f: F) -> Result<()>
    where
        T: DeserializeOwned + Default + Send + 'static,
        F: Fn(RequestContext, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
        R: Serialize + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        self.route(method, TypedHandler::new(f))
    }

    /// Install the catch-all invoked for methods with no route.
    pub fn set_fallback<F, Fut, R, E>(&self, f: F)
    where
        F: Fn(RequestContext, String, Box<RawValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
        R: Serialize + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let fallback: Arc<FallbackFn> = Arc::new(
            move |ctx: RequestContext,
                  method: String,
                  payload: Box<RawValue>|
                  -> BoxFuture<'static, HandlerResult> {
                let fut = f(ctx, method, payload);
                Box::pin(async move {
                    let value = fut.await.map_err(Into::<BoxError>::into)?;
                    Ok::<_, BoxError>(encode_payload(&value)?)
                })
            },
        );
        self.write().fallback = Some(fallback);
    }

    /// Registered method names, sorted.
    pub fn routes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().routes.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Handler for Router {
    fn handle(
        &self,
        ctx: RequestContext,
        payload: Box<RawValue>,
    ) -> BoxFuture<'static, HandlerResult> {
        let request: RoutedRequest = match serde_json::from_str(payload.get()) {
            Ok(request) => request,
            Err(err) => return rejected(RouterError::Envelope(err)),
        };
        if request.method.is_empty() {
            return rejected(RouterError::EmptyMethod);
        }
        let inner = request
            .payload
            .unwrap_or_else(|| RawValue::NULL.to_owned());

        let (route, fallback) = {
            let table = self.read();
            (
                table.routes.get(&request.method).cloned(),
                table.fallback.clone(),
            )
        };

        if let Some(route) = route {
            return route.handle(ctx, inner);
        }
        if let Some(fallback) = fallback {
            return fallback(ctx, request.method, inner);
        }
        tracing::debug!(method = %request.method, "no route for request");
        rejected(RouterError::UnknownRoute(request.method))
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes())
            .field("has_fallback", &self.read().fallback.is_some())
            .finish()
    }
}

fn rejected(err: RouterError) -> BoxFuture<'static, HandlerResult> {
    let result: HandlerResult = Err(err.into());
    Box::pin(std::future::ready(result))
}

/// A [`Handler`] that decodes its payload into `T` before calling `f`.
pub struct TypedHandler<F, T> {
    f: F,
    _marker: PhantomData<fn(T)>,
}

impl<F, T> TypedHandler<F, T> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<F, T, Fut, R, E> Handler for TypedHandler<F, T>
where
    T: DeserializeOwned + Default + Send + 'static,
    F: Fn(RequestContext, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    R: Serialize + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    fn handle(
        &self,
        ctx: RequestContext,
        payload: Box<RawValue>,
    ) -> BoxFuture<'static, HandlerResult> {
        let value = match decode_typed::<T>(&payload) {
            Ok(value) => value,
            Err(err) => return rejected(err),
        };
        let fut = (self.f)(ctx, value);
        Box::pin(async move {
            let value = fut.await.map_err(Into::<BoxError>::into)?;
            Ok::<_, BoxError>(encode_payload(&value)?)
        })
    }
}

fn decode_typed<T: DeserializeOwned + Default>(payload: &RawValue) -> Result<T> {
    let text = payload.get().trim();
    if text.is_empty() || text == "null" {
        return Ok(T::default());
    }
    serde_json::from_str(text).map_err(RouterError::Payload)
}
