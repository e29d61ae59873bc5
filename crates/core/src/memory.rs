//! Agent memory: a bounded plan/act/evaluate trace kept across calls.
//!
//! Memory belongs to the caller's session. The loop mutates it only through
//! `AgentSession::update_memory`, which re-applies the step cap after every
//! change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of steps retained.
pub const DEFAULT_MEMORY_MAX_STEPS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepPhase {
    Plan,
    Act,
    Evaluate,
}

impl StepPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepPhase::Plan => "plan",
            StepPhase::Act => "act",
            StepPhase::Evaluate => "evaluate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Succeeded,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
        }
    }
}

/// A single entry in the trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub phase: StepPhase,
    pub status: StepStatus,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl Step {
    pub fn new(phase: StepPhase, status: StepStatus, detail: impl Into<String>) -> Self {
        Self {
            phase,
            status,
            detail: detail.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMemory {
    /// Snapshot of the last user ask
    #[serde(default)]
    pub objective: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_stop_reason: Option<String>,

    /// `"done"` or `"fallback_to_standard_completion"` after a terminal outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<String>,

    #[serde(default)]
    pub no_progress_count: u32,

    #[serde(default)]
    pub steps: Vec<Step>,
}

impl AgentMemory {
    pub fn record(&mut self, phase: StepPhase, status: StepStatus, detail: impl Into<String>) {
        self.steps.push(Step::new(phase, status, detail));
    }

    /// Drop the oldest steps until at most `max_steps` remain.
    pub fn trim(&mut self, max_steps: usize) {
        if self.steps.len() > max_steps {
            let excess = self.steps.len() - max_steps;
            self.steps.drain(..excess);
        }
    }

    /// Whether the previous run ended in anything but success.
    pub fn last_run_failed(&self) -> bool {
        self.next_action.as_deref() == Some("fallback_to_standard_completion")
    }

    /// Short text section describing the previous run, for the system prompt.
    pub fn render_summary(&self, max_steps: usize) -> String {
        let mut out = String::from("## Previous tool run\n");
        if !self.objective.is_empty() {
            out.push_str(&format!("Objective: {}\n", self.objective));
        }
        if let Some(reason) = &self.last_stop_reason {
            out.push_str(&format!("Stopped: {reason}\n"));
        }
        if let Some(action) = &self.next_action {
            out.push_str(&format!("Next action: {action}\n"));
        }
        let skip = self.steps.len().saturating_sub(max_steps);
        for step in self.steps.iter().skip(skip) {
            out.push_str(&format!(
                "- [{}/{}] {}\n",
                step.phase.as_str(),
                step.status.as_str(),
                step.detail
            ));
        }
        out
    }
}
