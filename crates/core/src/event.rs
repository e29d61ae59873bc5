//! Tool events: a bounded diagnostic trail of listings, calls and loop
//! outcomes.
//!
//! Events are produced by the catalog builder, the dispatcher and the loop,
//! then folded into the session's [`ToolEventLog`], which keeps only the most
//! recent entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::tool::ToolCall;

/// Default number of events a log retains.
pub const DEFAULT_EVENT_LOG_MAX: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolEventKind {
    /// One `tools/list` attempt (or builtin synthesis) for a provider
    McpToolsListed,
    /// One dispatched tool call
    McpToolCall,
    /// One terminal loop outcome
    McpToolLoop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Succeeded,
    Failed,
}

impl EventStatus {
    pub fn from_success(ok: bool) -> Self {
        if ok { EventStatus::Succeeded } else { EventStatus::Failed }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEvent {
    pub kind: ToolEventKind,
    pub status: EventStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,

    /// Argument text as the model sent it, when it arrived as text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_arguments: Option<String>,

    /// Stop reason (loop events) or a short outcome label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Tool count for listings, turn count for loop outcomes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,

    pub timestamp: DateTime<Utc>,
}

impl ToolEvent {
    fn new(kind: ToolEventKind, status: EventStatus) -> Self {
        Self {
            kind,
            status,
            provider_id: None,
            tool_name: None,
            arguments: None,
            raw_arguments: None,
            reason: None,
            error: None,
            count: None,
            timestamp: Utc::now(),
        }
    }

    pub fn tools_listed(provider_id: impl Into<String>, result: Result<usize, String>) -> Self {
        let mut event = Self::new(ToolEventKind::McpToolsListed, EventStatus::from_success(result.is_ok()));
        event.provider_id = Some(provider_id.into());
        match result {
            Ok(count) => event.count = Some(count),
            Err(error) => event.error = Some(error),
        }
        event
    }

    /// One dispatched call. `provider_id` is `None` when the alias did not
    /// resolve.
    pub fn tool_call(
        provider_id: Option<&str>,
        tool_name: impl Into<String>,
        call: &ToolCall,
        error: Option<String>,
    ) -> Self {
        let mut event = Self::new(ToolEventKind::McpToolCall, EventStatus::from_success(error.is_none()));
        event.provider_id = provider_id.map(str::to_string);
        event.tool_name = Some(tool_name.into());
        event.arguments = Some(call.arguments.clone());
        event.raw_arguments = call.raw_arguments.clone();
        event.error = error;
        event
    }

    pub fn tool_loop(status: EventStatus, reason: impl Into<String>, turns: usize) -> Self {
        let mut event = Self::new(ToolEventKind::McpToolLoop, status);
        event.reason = Some(reason.into());
        event.count = Some(turns);
        event
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Capped, ordered event log. The oldest entries fall off first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEventLog {
    events: VecDeque<ToolEvent>,
    max_entries: usize,
}

impl ToolEventLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            events: VecDeque::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn push(&mut self, event: ToolEvent) {
        self.events.push_back(event);
        self.trim();
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = ToolEvent>) {
        self.events.extend(events);
        self.trim();
    }

    /// Change the cap and trim immediately.
    pub fn set_max_entries(&mut self, max_entries: usize) {
        self.max_entries = max_entries.max(1);
        self.trim();
    }

    fn trim(&mut self) {
        while self.events.len() > self.max_entries {
            self.events.pop_front();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn last(&self) -> Option<&ToolEvent> {
        self.events.back()
    }
}

impl Default for ToolEventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_LOG_MAX)
    }
}
