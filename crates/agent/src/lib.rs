//! The agent tool loop: the heart of ToolRelay.
//!
//! The loop follows a **Plan → Act → Evaluate** cycle:
//!
//! 1. **Build** the aliased tool catalog from the configured providers
//! 2. **Send a turn** to the model through the protocol adapter
//! 3. **If tool calls**: dispatch them, fold the results back, loop to step 2
//! 4. **If an answer**: stop with `succeeded / completed`
//!
//! The loop also stops on the turn cap, on repeated empty turns, or when the
//! adapter reports a structural failure. Every stop is recorded in the
//! caller's [`AgentSession`](toolrelay_core::AgentSession).

pub mod loop_runner;
pub mod outcome;
pub mod runner;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use loop_runner::{AgentToolLoop, LoopLimits, NEXT_ACTION_DONE, NEXT_ACTION_FALLBACK};
pub use outcome::{LoopResult, LoopStatus, ShortCircuitOptions, StopReason, should_short_circuit_with_tool_loop};
pub use runner::{LoopBackends, LoopOptions, retry_policy, run_agent_tool_loop, run_agent_tool_loop_with};
