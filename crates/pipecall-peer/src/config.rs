use std::time::Duration;

use pipecall_frame::FrameConfig;

/// Configuration for an [`Endpoint`](crate::Endpoint).
#[derive(Debug, Clone, Default)]
pub struct EndpointConfig {
    /// Codec limits applied to both directions.
    pub frame: FrameConfig,
    /// Deadline applied by [`Endpoint::call`](crate::Endpoint::call) and
    /// [`Endpoint::call_raw`](crate::Endpoint::call_raw). `None` waits until
    /// the response arrives or the endpoint closes.
    pub call_timeout: Option<Duration>,
}
