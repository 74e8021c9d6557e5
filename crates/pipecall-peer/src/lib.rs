//! Duplex request/response endpoint over a single byte stream pair.
//!
//! Either side of the stream may call the other at any time. Outbound calls
//! are correlated to their responses by id; inbound requests are answered by
//! a user [`Handler`], each on its own task.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod handler;
pub mod process;
mod registry;

pub use config::EndpointConfig;
pub use endpoint::{Endpoint, EndpointState, EndpointStats};
pub use error::{Result, RpcError};
pub use handler::{
    handler_fn, BoxError, BoxFuture, FnHandler, Handler, HandlerResult, RequestContext,
    NO_HANDLER_MESSAGE,
};
pub use pipecall_frame::{encode_payload, FrameConfig};
pub use process::{spawn_command, spawn_command_with_config, ChildEndpoint};
pub use serde_json::value::RawValue;
