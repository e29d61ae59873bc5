//! Protocol adapters for ToolRelay.
//!
//! All adapters implement `toolrelay_core::ProtocolAdapter`. [`adapter_for`]
//! is the only place that branches on protocol identity.

pub mod chat_completions;
pub mod endpoint;
pub mod messages;
pub mod responses;

use std::sync::Arc;

use toolrelay_core::protocol::{Protocol, ProtocolAdapter};
use toolrelay_transport::HttpJsonClient;

pub use chat_completions::ChatCompletionsAdapter;
pub use endpoint::{DEFAULT_MODEL_TIMEOUT, ModelEndpoint};
pub use messages::MessagesAdapter;
pub use responses::ResponsesAdapter;

/// Build the adapter for `protocol`.
pub fn adapter_for(protocol: Protocol, endpoint: ModelEndpoint, http: HttpJsonClient) -> Arc<dyn ProtocolAdapter> {
    match protocol {
        Protocol::ChatCompletions => Arc::new(ChatCompletionsAdapter::new(endpoint, http)),
        Protocol::Responses => Arc::new(ResponsesAdapter::new(endpoint, http)),
        Protocol::Messages => Arc::new(MessagesAdapter::new(endpoint, http)),
    }
}
