//! # ToolRelay Core
//!
//! Domain types, traits, and error definitions for the ToolRelay tool-use
//! engine. Nothing in here performs I/O: the crate defines the model that
//! the transport, provider, tool and agent crates implement against.
//!
//! ## Seams
//!
//! - [`ProtocolAdapter`]: one model wire protocol
//! - [`ToolTransport`]: remote tool access (`tools/list`, `tools/call`)
//!
//! Both are traits so the loop can be driven by scripted mocks in tests.

pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod page;
pub mod protocol;
pub mod provider;
pub mod session;
pub mod skill;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result, ToolError, TransportError};
pub use event::{EventStatus, ToolEvent, ToolEventKind, ToolEventLog};
pub use memory::{AgentMemory, Step, StepPhase, StepStatus};
pub use message::{ConversationMessage, MessageContent, Role};
pub use page::PageContext;
pub use protocol::{AssistantReply, FailureReason, Protocol, ProtocolAdapter, TurnOutcome, TurnState};
pub use provider::{BuiltinToolset, ProviderTransport, ToolProviderDescriptor};
pub use session::AgentSession;
pub use skill::{Skill, SkillResource};
pub use tool::{
    ToolCall, ToolCatalogEntry, ToolDefinition, ToolKind, ToolResult, ToolResultMeta, ToolStatus,
    ToolTransport,
};
