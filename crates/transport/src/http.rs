//! JSON-over-HTTP POST with timeout, cancellation and retry.
//!
//! Serves both remote tool providers (JSON or event-stream bodies) and model
//! endpoints (JSON bodies).

use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use toolrelay_core::error::TransportError;
use tracing::debug;

use crate::retry::{RetryPolicy, with_retry};
use crate::sse::{EnvelopeSelector, SseFrameParser};

/// Error bodies are cut to this many characters before surfacing.
const MAX_ERROR_BODY_CHARS: usize = 2_000;

/// One POST, described independently of any attempt.
#[derive(Debug, Clone)]
pub struct JsonRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
    pub timeout: Duration,
    /// Accept `text/event-stream` and select the last JSON-RPC envelope
    pub accept_event_stream: bool,
}

impl JsonRequest {
    pub fn new(url: impl Into<String>, body: Value, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body,
            timeout,
            accept_event_stream: false,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer(self, key: Option<&str>) -> Self {
        match key.filter(|k| !k.is_empty()) {
            Some(key) => self.header("Authorization", format!("Bearer {key}")),
            None => self,
        }
    }

    pub fn event_stream(mut self) -> Self {
        self.accept_event_stream = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpJsonClient {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpJsonClient {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            retry,
        }
    }

    pub fn with_client(client: reqwest::Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// POST with retries. Returns the parsed JSON body (or the selected
    /// envelope of an event stream).
    pub async fn post_json(&self, request: &JsonRequest, cancel: &CancellationToken) -> Result<Value, TransportError> {
        with_retry(&self.retry, cancel, &request.url, |attempt| {
            debug!(url = %request.url, attempt, "POST");
            self.post_once(request, cancel)
        })
        .await
    }

    /// One attempt, raced against its timeout and the caller's token.
    pub async fn post_once(&self, request: &JsonRequest, cancel: &CancellationToken) -> Result<Value, TransportError> {
        let timeout_ms = request.timeout.as_millis() as u64;
        tokio::select! {
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            outcome = tokio::time::timeout(request.timeout, self.send(request)) => match outcome {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout { timeout_ms }),
            },
        }
    }

    async fn send(&self, request: &JsonRequest) -> Result<Value, TransportError> {
        let accept = if request.accept_event_stream {
            "application/json, text/event-stream"
        } else {
            "application/json"
        };
        let mut builder = self
            .client
            .post(&request.url)
            .header("Content-Type", "application/json")
            .header("Accept", accept)
            .json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let is_event_stream = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/event-stream"));

        if is_event_stream {
            return read_event_stream(response).await;
        }

        let text = response.text().await.map_err(map_reqwest_error)?;
        serde_json::from_str(&text)
            .map_err(|e| TransportError::MalformedResponse(format!("invalid JSON body: {e}")))
    }
}

impl Default for HttpJsonClient {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

/// Feed the byte stream through the frame parser as it arrives.
async fn read_event_stream(response: reqwest::Response) -> Result<Value, TransportError> {
    let mut stream = response.bytes_stream();
    let mut parser = SseFrameParser::new();
    let mut selector = EnvelopeSelector::default();
    let mut pending: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(map_reqwest_error)?;
        pending.extend_from_slice(&chunk);
        let text = take_valid_utf8(&mut pending);
        parser.push(&text);
        while let Some(frame) = parser.next_frame() {
            selector.observe(&frame);
        }
    }

    if !pending.is_empty() {
        parser.push(&String::from_utf8_lossy(&pending));
    }
    while let Some(frame) = parser.next_frame() {
        selector.observe(&frame);
    }
    if let Some(frame) = parser.finish() {
        selector.observe(&frame);
    }
    selector.finish()
}

/// Decode everything decodable, leaving a trailing split code point behind.
/// Invalid bytes become U+FFFD one sequence at a time.
fn take_valid_utf8(pending: &mut Vec<u8>) -> String {
    let mut text = String::with_capacity(pending.len());
    let mut rest: &[u8] = pending;

    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                text.push_str(valid);
                rest = &[];
                break;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                // valid_up_to() marks a checked UTF-8 boundary
                text.push_str(std::str::from_utf8(valid).unwrap_or_default());
                match e.error_len() {
                    Some(len) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        rest = &after[len..];
                    }
                    None => {
                        rest = after;
                        break;
                    }
                }
            }
        }
    }

    let consumed = pending.len() - rest.len();
    pending.drain(..consumed);
    text
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout { timeout_ms: 0 }
    } else if e.is_decode() {
        TransportError::MalformedResponse(e.to_string())
    } else {
        TransportError::Network(e.to_string())
    }
}
