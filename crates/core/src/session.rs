//! Caller-owned session state.

use serde::{Deserialize, Serialize};

use crate::event::{DEFAULT_EVENT_LOG_MAX, ToolEvent, ToolEventLog};
use crate::memory::{AgentMemory, DEFAULT_MEMORY_MAX_STEPS};

/// Mutable state carried between loop invocations of one user session.
///
/// The loop takes it by `&mut`, so a session has exactly one writer at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<AgentMemory>,

    pub events: ToolEventLog,

    memory_max_steps: usize,
}

impl AgentSession {
    pub fn new() -> Self {
        Self::with_caps(DEFAULT_MEMORY_MAX_STEPS, DEFAULT_EVENT_LOG_MAX)
    }

    pub fn with_caps(memory_max_steps: usize, event_log_max: usize) -> Self {
        Self {
            memory: None,
            events: ToolEventLog::new(event_log_max),
            memory_max_steps: memory_max_steps.max(1),
        }
    }

    /// The only mutation path for memory: creates it on first use and
    /// re-applies the step cap afterwards.
    pub fn update_memory<R>(&mut self, f: impl FnOnce(&mut AgentMemory) -> R) -> R {
        let max_steps = self.memory_max_steps;
        let memory = self.memory.get_or_insert_with(AgentMemory::default);
        let out = f(memory);
        memory.trim(max_steps);
        out
    }

    pub fn record_events(&mut self, events: impl IntoIterator<Item = ToolEvent>) {
        self.events.extend(events);
    }

    pub fn memory_max_steps(&self) -> usize {
        self.memory_max_steps
    }
}

impl Default for AgentSession {
    fn default() -> Self {
        Self::new()
    }
}
