pub mod audit;
pub mod blueprint;
pub mod compiler;
pub mod config;
pub mod conversation;
pub mod domain;
pub mod errors;
pub mod steps;

pub use blueprint::{summarize, validate, Blueprint, BlueprintSummary, ValidationReport};
pub use compiler::{normalize_model, plan, CompileError, CompilePlan, CompileTarget, PlannedEntity};
pub use conversation::{RunEvent, RunState, RunStatus};
pub use domain::agent::{Agent, AgentDraft, AgentId, AgentPatch};
pub use domain::assistant::{Assistant, AssistantDraft, AssistantId, AssistantPatch, ToolRef};
pub use domain::conversation::{Conversation, ConversationId, ConversationMessage};
pub use domain::execution::{
    Execution, ExecutionId, ExecutionSource, ExecutionStatus, StepStatus, StepTrace,
};
pub use domain::tool::{Tool, ToolDraft, ToolId, ToolRunStatus, BUILTIN_TOOLS};
pub use domain::workflow::{StepKind, Workflow, WorkflowDraft, WorkflowId, WorkflowPatch, WorkflowStep};
pub use errors::{ApplicationError, DomainError, InterfaceError};
