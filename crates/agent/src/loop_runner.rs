//! The agent tool loop implementation.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use toolrelay_core::error::Error;
use toolrelay_core::event::ToolEvent;
use toolrelay_core::memory::{StepPhase, StepStatus};
use toolrelay_core::message::{ConversationMessage, last_user_text};
use toolrelay_core::protocol::{ProtocolAdapter, TurnOutcome};
use toolrelay_core::session::AgentSession;
use toolrelay_tools::{Catalog, ToolDispatcher};
use tracing::{debug, info, warn};

use crate::outcome::{LoopResult, LoopStatus, StopReason};

/// Memory value of `next_action` after a successful run.
pub const NEXT_ACTION_DONE: &str = "done";

/// Memory value of `next_action` after any failed run.
pub const NEXT_ACTION_FALLBACK: &str = "fallback_to_standard_completion";

/// Termination caps for one loop invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopLimits {
    /// Model turns before `max_turns_exceeded`
    pub max_turns: usize,

    /// Consecutive empty turns before `no_progress_limit_exceeded`
    pub no_progress_limit: u32,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            max_turns: 6,
            no_progress_limit: 2,
        }
    }
}

/// Drives turns against one protocol adapter until a terminal outcome.
pub struct AgentToolLoop {
    /// The model wire protocol
    adapter: Arc<dyn ProtocolAdapter>,

    dispatcher: ToolDispatcher,

    limits: LoopLimits,
}

/// Running tallies for one invocation.
#[derive(Default)]
struct Progress {
    turns: usize,
    used_tools: bool,
    answer: String,
    events: Vec<ToolEvent>,
}

impl AgentToolLoop {
    pub fn new(adapter: Arc<dyn ProtocolAdapter>) -> Self {
        Self {
            adapter,
            dispatcher: ToolDispatcher::new(),
            limits: LoopLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: LoopLimits) -> Self {
        self.limits = LoopLimits {
            max_turns: limits.max_turns.max(1),
            no_progress_limit: limits.no_progress_limit.max(1),
        };
        self
    }

    pub fn limits(&self) -> LoopLimits {
        self.limits
    }

    /// Run the loop over an already built catalog.
    ///
    /// Policy and protocol failures come back as a failed [`LoopResult`].
    /// `Err` means the model endpoint was unreachable after retries, or the
    /// caller cancelled.
    pub async fn run(
        &self,
        messages: &[ConversationMessage],
        system_prompt: Option<&str>,
        catalog: Catalog,
        session: &mut AgentSession,
        cancel: &CancellationToken,
    ) -> Result<LoopResult, Error> {
        let system_prompt = with_memory_summary(system_prompt, session);
        let objective = last_user_text(messages).unwrap_or_default();

        info!(
            protocol = %self.adapter.protocol(),
            tools = catalog.len(),
            max_turns = self.limits.max_turns,
            "Starting tool loop"
        );

        let mut progress = Progress {
            events: catalog.events.clone(),
            ..Default::default()
        };

        session.update_memory(|memory| {
            memory.objective = objective;
            memory.no_progress_count = 0;
            memory.last_stop_reason = None;
            memory.next_action = None;
            memory.record(
                StepPhase::Plan,
                StepStatus::Succeeded,
                format!("{} tools available", catalog.len()),
            );
        });

        if catalog.is_empty() {
            return Ok(self.finish(session, progress, LoopStatus::Failed, StopReason::NoToolsAvailable, None));
        }

        let definitions = catalog.definitions();
        let mut state = self.adapter.initial_state(messages, system_prompt.as_deref());
        let mut no_progress = 0_u32;

        loop {
            if progress.turns >= self.limits.max_turns {
                warn!(turns = progress.turns, "Turn cap reached");
                return Ok(self.finish(session, progress, LoopStatus::Failed, StopReason::MaxTurnsExceeded, None));
            }
            progress.turns += 1;
            debug!(turn = progress.turns, "Requesting model turn");

            let outcome = match self.adapter.run_turn(&state, &definitions, cancel).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(turn = progress.turns, error = %e, "Model turn could not be completed");
                    self.abort(session, progress, &e.to_string());
                    return Err(e.into());
                }
            };

            let reply = match outcome {
                TurnOutcome::Reply(reply) => reply,
                TurnOutcome::Failed { reason, detail } => {
                    warn!(turn = progress.turns, reason = reason.as_str(), detail = %detail, "Model turn failed");
                    return Ok(self.finish(session, progress, LoopStatus::Failed, reason.into(), Some(detail)));
                }
            };

            if reply.has_answer() {
                progress.answer = reply.answer.clone();
            }

            if reply.tool_calls.is_empty() {
                if reply.has_answer() {
                    return Ok(self.finish(session, progress, LoopStatus::Succeeded, StopReason::Completed, None));
                }

                no_progress += 1;
                session.update_memory(|memory| memory.no_progress_count = no_progress);
                debug!(turn = progress.turns, no_progress, "Turn had neither answer nor tool calls");
                if no_progress >= self.limits.no_progress_limit {
                    return Ok(self.finish(
                        session,
                        progress,
                        LoopStatus::Failed,
                        StopReason::NoProgressLimitExceeded,
                        None,
                    ));
                }
                continue;
            }

            debug!(turn = progress.turns, calls = reply.tool_calls.len(), "Dispatching tool calls");
            let dispatch = match self.dispatcher.execute(&reply.tool_calls, &catalog, cancel).await {
                Ok(dispatch) => dispatch,
                Err(e) => {
                    self.abort(session, progress, &e.to_string());
                    return Err(e);
                }
            };

            session.update_memory(|memory| {
                memory.no_progress_count = 0;
                for result in &dispatch.results {
                    let status = if result.is_success() {
                        StepStatus::Succeeded
                    } else {
                        StepStatus::Failed
                    };
                    let detail = if result.meta.provider_id.is_empty() {
                        result.meta.tool_name.clone()
                    } else {
                        format!("{}/{}", result.meta.provider_id, result.meta.tool_name)
                    };
                    memory.record(StepPhase::Act, status, detail);
                }
            });

            self.adapter.append_tool_results(&mut state, &reply, &dispatch.results);
            progress.events.extend(dispatch.events);
            progress.used_tools = true;
            no_progress = 0;
        }
    }

    fn finish(
        &self,
        session: &mut AgentSession,
        mut progress: Progress,
        status: LoopStatus,
        reason: StopReason,
        detail: Option<String>,
    ) -> LoopResult {
        let mut event = ToolEvent::tool_loop(status.into(), reason.as_str(), progress.turns);
        if let Some(detail) = &detail {
            event = event.with_error(detail.clone());
        }
        progress.events.push(event);

        let next_action = match status {
            LoopStatus::Succeeded => NEXT_ACTION_DONE,
            LoopStatus::Failed => NEXT_ACTION_FALLBACK,
        };
        session.update_memory(|memory| {
            memory.last_stop_reason = Some(reason.as_str().to_string());
            memory.next_action = Some(next_action.to_string());
            let step_status = match status {
                LoopStatus::Succeeded => StepStatus::Succeeded,
                LoopStatus::Failed => StepStatus::Failed,
            };
            memory.record(StepPhase::Evaluate, step_status, reason.as_str());
        });
        session.record_events(progress.events.iter().cloned());

        info!(
            status = status.as_str(),
            reason = reason.as_str(),
            turns = progress.turns,
            used_tools = progress.used_tools,
            "Tool loop finished"
        );

        LoopResult {
            status,
            reason,
            answer: match status {
                LoopStatus::Succeeded => progress.answer,
                LoopStatus::Failed => String::new(),
            },
            used_tools: progress.used_tools,
            events: progress.events,
            turns: progress.turns,
        }
    }

    /// Record an error exit in the session before it propagates.
    fn abort(&self, session: &mut AgentSession, progress: Progress, error: &str) {
        session.update_memory(|memory| {
            memory.last_stop_reason = Some("error".into());
            memory.next_action = Some(NEXT_ACTION_FALLBACK.into());
            memory.record(StepPhase::Evaluate, StepStatus::Failed, error);
        });
        session.record_events(progress.events);
    }
}

/// Append the previous run's summary when that run failed.
fn with_memory_summary(system_prompt: Option<&str>, session: &AgentSession) -> Option<String> {
    let summary = session
        .memory
        .as_ref()
        .filter(|memory| memory.last_run_failed())
        .map(|memory| memory.render_summary(session.memory_max_steps()));

    match (system_prompt.filter(|s| !s.trim().is_empty()), summary) {
        (Some(prompt), Some(summary)) => Some(format!("{prompt}\n\n{summary}")),
        (Some(prompt), None) => Some(prompt.to_string()),
        (None, summary) => summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use serde_json::json;
    use toolrelay_core::event::{EventStatus, ToolEventKind};
    use toolrelay_core::protocol::FailureReason;
    use toolrelay_core::tool::ToolCall;

    fn search_call(id: &str) -> ToolCall {
        ToolCall::new(id, "search__search_1", json!({"q": "x"}))
    }

    #[tokio::test]
    async fn tool_call_then_answer_completes() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![
            tool_call_reply(vec![search_call("call_1")]),
            answer_reply("Result is x"),
        ]));
        let catalog = search_catalog().await;
        let mut session = AgentSession::new();

        let result = AgentToolLoop::new(adapter.clone())
            .run(&[ConversationMessage::user("find x")], None, catalog, &mut session, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.status, LoopStatus::Succeeded);
        assert_eq!(result.reason, StopReason::Completed);
        assert_eq!(result.answer, "Result is x");
        assert!(result.used_tools);
        assert_eq!(result.turns, 2);
        assert_eq!(adapter.call_count(), 2);
        assert_eq!(adapter.appended_results(), vec![vec!["call_1".to_string()]]);

        let kinds: Vec<ToolEventKind> = result.events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![ToolEventKind::McpToolsListed, ToolEventKind::McpToolCall, ToolEventKind::McpToolLoop]
        );

        let memory = session.memory.as_ref().unwrap();
        assert_eq!(memory.objective, "find x");
        assert_eq!(memory.next_action.as_deref(), Some(NEXT_ACTION_DONE));
        assert_eq!(memory.last_stop_reason.as_deref(), Some("completed"));
        let phases: Vec<StepPhase> = memory.steps.iter().map(|s| s.phase).collect();
        assert_eq!(phases, vec![StepPhase::Plan, StepPhase::Act, StepPhase::Evaluate]);
        assert_eq!(session.events.len(), 3);
    }

    #[tokio::test]
    async fn act_steps_name_the_tool_that_ran() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![
            tool_call_reply(vec![search_call("c1"), ToolCall::new("c2", "nope_1", json!({}))]),
            answer_reply("done"),
        ]));
        let mut session = AgentSession::new();

        let catalog = search_catalog().await;
        AgentToolLoop::new(adapter)
            .run(&[ConversationMessage::user("find x")], None, catalog, &mut session, &CancellationToken::new())
            .await
            .unwrap();

        let acts: Vec<(&str, StepStatus)> = session
            .memory
            .as_ref()
            .unwrap()
            .steps
            .iter()
            .filter(|s| s.phase == StepPhase::Act)
            .map(|s| (s.detail.as_str(), s.status))
            .collect();
        assert_eq!(acts, vec![("search/search", StepStatus::Succeeded), ("nope_1", StepStatus::Failed)]);
    }

    #[tokio::test]
    async fn turn_cap_terminates() {
        let replies = (0..10).map(|i| tool_call_reply(vec![search_call(&format!("c{i}"))])).collect();
        let adapter = Arc::new(ScriptedAdapter::new(replies));
        let mut session = AgentSession::new();

        let result = AgentToolLoop::new(adapter.clone())
            .with_limits(LoopLimits {
                max_turns: 3,
                no_progress_limit: 2,
            })
            .run(
                &[ConversationMessage::user("loop")],
                None,
                search_catalog().await,
                &mut session,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.status, LoopStatus::Failed);
        assert_eq!(result.reason, StopReason::MaxTurnsExceeded);
        assert_eq!(result.turns, 3);
        assert_eq!(adapter.call_count(), 3);
        assert!(result.used_tools);
        assert!(result.answer.is_empty());
        assert_eq!(
            session.memory.as_ref().unwrap().next_action.as_deref(),
            Some(NEXT_ACTION_FALLBACK)
        );
    }

    #[tokio::test]
    async fn empty_turns_hit_the_no_progress_limit() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![empty_reply(), empty_reply(), answer_reply("late")]));
        let mut session = AgentSession::new();

        let result = AgentToolLoop::new(adapter.clone())
            .run(
                &[ConversationMessage::user("hello")],
                None,
                search_catalog().await,
                &mut session,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.reason, StopReason::NoProgressLimitExceeded);
        assert_eq!(result.turns, 2);
        assert!(!result.used_tools);
        assert_eq!(session.memory.as_ref().unwrap().no_progress_count, 2);
    }

    #[tokio::test]
    async fn tool_calls_reset_no_progress() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![
            empty_reply(),
            tool_call_reply(vec![search_call("c1")]),
            empty_reply(),
            answer_reply("done"),
        ]));
        let mut session = AgentSession::new();

        let result = AgentToolLoop::new(adapter)
            .run(
                &[ConversationMessage::user("hello")],
                None,
                search_catalog().await,
                &mut session,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.reason, StopReason::Completed);
        assert_eq!(result.turns, 4);
    }

    #[tokio::test]
    async fn empty_catalog_fails_without_calling_the_model() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![]));
        let mut session = AgentSession::new();

        let result = AgentToolLoop::new(adapter.clone())
            .run(
                &[ConversationMessage::user("hello")],
                None,
                Catalog::default(),
                &mut session,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.status, LoopStatus::Failed);
        assert_eq!(result.reason, StopReason::NoToolsAvailable);
        assert_eq!(result.turns, 0);
        assert_eq!(adapter.call_count(), 0);
    }

    #[tokio::test]
    async fn adapter_failure_is_not_retried() {
        let adapter = Arc::new(ScriptedAdapter::from_outcomes(vec![
            Ok(TurnOutcome::failed(FailureReason::MissingMessage, "no output")),
            Ok(answer_reply("never")),
        ]));
        let mut session = AgentSession::new();

        let result = AgentToolLoop::new(adapter.clone())
            .run(
                &[ConversationMessage::user("hello")],
                None,
                search_catalog().await,
                &mut session,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.reason, StopReason::MissingMessage);
        assert_eq!(adapter.call_count(), 1);
        let last = result.events.last().unwrap();
        assert_eq!(last.kind, ToolEventKind::McpToolLoop);
        assert_eq!(last.status, EventStatus::Failed);
        assert_eq!(last.error.as_deref(), Some("no output"));
    }

    #[tokio::test]
    async fn transport_errors_propagate_and_mark_fallback() {
        let adapter = Arc::new(ScriptedAdapter::from_outcomes(vec![Err(
            toolrelay_core::error::TransportError::Timeout { timeout_ms: 120_000 },
        )]));
        let mut session = AgentSession::new();

        let err = AgentToolLoop::new(adapter)
            .run(
                &[ConversationMessage::user("hello")],
                None,
                search_catalog().await,
                &mut session,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transport(_)));
        assert!(session.memory.as_ref().unwrap().last_run_failed());
    }

    #[tokio::test]
    async fn previous_failure_is_summarized_into_the_system_prompt() {
        let mut session = AgentSession::new();
        let failing = Arc::new(ScriptedAdapter::new(vec![empty_reply(), empty_reply()]));
        AgentToolLoop::new(failing)
            .run(
                &[ConversationMessage::user("first ask")],
                Some("Be brief."),
                search_catalog().await,
                &mut session,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let adapter = Arc::new(ScriptedAdapter::new(vec![answer_reply("ok")]));
        AgentToolLoop::new(adapter.clone())
            .run(
                &[ConversationMessage::user("second ask")],
                Some("Be brief."),
                search_catalog().await,
                &mut session,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let system = adapter.system_prompts().remove(0).unwrap();
        assert!(system.starts_with("Be brief."));
        assert!(system.contains("## Previous tool run"));
        assert!(system.contains("Objective: first ask"));
        assert!(system.contains("no_progress_limit_exceeded"));

        // A successful run does not carry a summary forward.
        let after = Arc::new(ScriptedAdapter::new(vec![answer_reply("ok")]));
        AgentToolLoop::new(after.clone())
            .run(
                &[ConversationMessage::user("third ask")],
                Some("Be brief."),
                search_catalog().await,
                &mut session,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(after.system_prompts().remove(0).as_deref(), Some("Be brief."));
    }
}
