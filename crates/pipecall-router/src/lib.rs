//! Dispatch by method name on top of a pipecall [`Endpoint`](pipecall_peer::Endpoint).
//!
//! A [`Router`] is a single [`Handler`](pipecall_peer::Handler). Callers wrap
//! their payload in a [`RoutedRequest`] (`{"type": <method>, "payload": ...}`)
//! and the router hands the inner payload to whichever route is registered
//! for that method.
//!
//! ```ignore
//! let router = Router::new();
//! router.handle_typed("ping", |_ctx, ping: Ping| async move {
//!     Ok::<_, BoxError>(Pong { text: format!("child got: {}", ping.text) })
//! })?;
//! let endpoint = Endpoint::stdio(Some(Arc::new(router)));
//! ```

pub mod error;
pub mod request;
pub mod router;

pub use error::{Result, RouterError};
pub use request::{new_request, RoutedRequest};
pub use router::{Router, TypedHandler};
