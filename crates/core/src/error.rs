//! Error types for the ToolRelay domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all ToolRelay operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Transport errors ---
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl Error {
    /// Whether this error was caused by the caller's cancellation token.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Error::Transport(TransportError::Cancelled)
                | Error::Tool(ToolError::Transport(TransportError::Cancelled))
        )
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP statuses that are worth another attempt.
pub const RETRYABLE_STATUSES: [u16; 7] = [408, 425, 429, 500, 502, 503, 504];

// --- Bounded context errors ---

/// Failures of a single network call (tool provider or model endpoint).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Insecure endpoint rejected: {0}")]
    InsecureEndpoint(String),
}

impl TransportError {
    /// Transient failures are retried by the transport layer; everything
    /// else propagates on the first occurrence.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::HttpStatus { status, .. } => RETRYABLE_STATUSES.contains(status),
            TransportError::Network(_) | TransportError::Timeout { .. } => true,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool alias: {0}")]
    UnknownAlias(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}
