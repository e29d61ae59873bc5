//! Model endpoint settings shared by every adapter.

use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use toolrelay_core::error::TransportError;
use toolrelay_core::protocol::{FailureReason, TurnOutcome};
use toolrelay_transport::{HttpJsonClient, JsonRequest};
use tracing::warn;

pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct ModelEndpoint {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_response_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl std::fmt::Debug for ModelEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelEndpoint")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("max_response_tokens", &self.max_response_tokens)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ModelEndpoint {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            model: model.into(),
            max_response_tokens: 1024,
            temperature: 0.7,
            timeout: DEFAULT_MODEL_TIMEOUT,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into()).filter(|k: &String| !k.is_empty());
        self
    }

    pub fn with_max_response_tokens(mut self, tokens: u32) -> Self {
        self.max_response_tokens = tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `{base}/{path}` without doubled slashes.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub(crate) fn request(&self, path: &str, body: Value) -> JsonRequest {
        JsonRequest::new(self.url(path), body, self.timeout)
    }
}

/// POST one turn. HTTP status and body-shape failures become
/// `Ok(Err(TurnOutcome::Failed))`; network, timeout and cancellation stay
/// `Err`.
pub(crate) async fn send_turn(
    http: &HttpJsonClient,
    request: &JsonRequest,
    cancel: &CancellationToken,
) -> Result<Result<Value, TurnOutcome>, TransportError> {
    match http.post_json(request, cancel).await {
        Ok(body) => Ok(Ok(body)),
        Err(e @ (TransportError::HttpStatus { .. } | TransportError::MalformedResponse(_))) => {
            warn!(url = %request.url, error = %e, "Model turn failed");
            Ok(Err(TurnOutcome::failed(FailureReason::TurnFailed, e.to_string())))
        }
        Err(e) => Err(e),
    }
}
