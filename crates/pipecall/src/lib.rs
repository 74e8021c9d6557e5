//! Bidirectional JSON request/response calls over a pair of byte streams.
//!
//! Two processes joined by pipes (typically a parent and the child it
//! spawned) can each call the other at any time. Every message is one JSON
//! object on the stream; calls are matched to responses by id.
//!
//! # Crate Structure
//!
//! - [`frame`]: wire message types and the newline-delimited JSON codec
//! - [`peer`]: the duplex [`Endpoint`](peer::Endpoint), handler contract and
//!   child-process wiring
//! - [`router`]: method-name dispatch on top of an endpoint (behind the
//!   `router` feature)

/// Re-export frame types.
pub mod frame {
    pub use pipecall_frame::*;
}

/// Re-export endpoint types.
pub mod peer {
    pub use pipecall_peer::*;
}

/// Re-export router types (requires `router` feature).
#[cfg(feature = "router")]
pub mod router {
    pub use pipecall_router::*;
}
