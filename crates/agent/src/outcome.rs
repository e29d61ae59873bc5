//! Loop outcomes and the caller's decision whether to trust them.

use serde::{Deserialize, Serialize};
use toolrelay_core::event::{EventStatus, ToolEvent};
use toolrelay_core::protocol::FailureReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopStatus {
    Succeeded,
    Failed,
}

impl LoopStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopStatus::Succeeded => "succeeded",
            LoopStatus::Failed => "failed",
        }
    }
}

impl From<LoopStatus> for EventStatus {
    fn from(status: LoopStatus) -> Self {
        match status {
            LoopStatus::Succeeded => EventStatus::Succeeded,
            LoopStatus::Failed => EventStatus::Failed,
        }
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    MaxTurnsExceeded,
    NoProgressLimitExceeded,
    NoToolsAvailable,
    TurnFailed,
    MissingMessage,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Completed => "completed",
            StopReason::MaxTurnsExceeded => "max_turns_exceeded",
            StopReason::NoProgressLimitExceeded => "no_progress_limit_exceeded",
            StopReason::NoToolsAvailable => "no_tools_available",
            StopReason::TurnFailed => "turn_failed",
            StopReason::MissingMessage => "missing_message",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<FailureReason> for StopReason {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::TurnFailed => StopReason::TurnFailed,
            FailureReason::MissingMessage => StopReason::MissingMessage,
        }
    }
}

/// Terminal result of one loop invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopResult {
    pub status: LoopStatus,
    pub reason: StopReason,

    /// Final answer text. Empty unless the model produced one.
    pub answer: String,

    /// Whether at least one tool call was dispatched
    pub used_tools: bool,

    /// Listing, call and loop events produced by this invocation
    pub events: Vec<ToolEvent>,

    /// Model turns sent
    pub turns: usize,
}

impl LoopResult {
    pub fn is_success(&self) -> bool {
        self.status == LoopStatus::Succeeded
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShortCircuitOptions {
    /// Only accept results where a tool was actually used
    pub require_tool_use: bool,
    /// Accept a successful result with a blank answer
    pub allow_empty_answer: bool,
}

/// Whether the caller can return the loop's answer instead of falling back
/// to a plain completion.
pub fn should_short_circuit_with_tool_loop(result: Option<&LoopResult>, options: ShortCircuitOptions) -> bool {
    let Some(result) = result else {
        return false;
    };
    if !result.is_success() {
        return false;
    }
    if !options.allow_empty_answer && result.answer.trim().is_empty() {
        return false;
    }
    !options.require_tool_use || result.used_tools
}
