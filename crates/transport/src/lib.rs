//! # ToolRelay Transport
//!
//! Everything that crosses the network:
//! - [`JsonRpcClient`]: `tools/list` / `tools/call` against remote providers
//! - [`HttpJsonClient`]: JSON POST with timeout, cancellation and retry,
//!   shared with the model-endpoint adapters
//! - [`SseFrameParser`]: pull-based event-stream framing
//! - [`EndpointPolicy`]: which tool URLs may be contacted

pub mod client;
pub mod http;
pub mod policy;
pub mod retry;
pub mod sse;

pub use client::{DEFAULT_TOOL_TIMEOUT, JsonRpcClient, SendOptions};
pub use http::{HttpJsonClient, JsonRequest};
pub use policy::EndpointPolicy;
pub use retry::{RetryPolicy, with_retry};
pub use sse::{SseFrame, SseFrameParser};
