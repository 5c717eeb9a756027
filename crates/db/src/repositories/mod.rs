use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use agentforge_core::domain::agent::{Agent, AgentId};
use agentforge_core::domain::assistant::{Assistant, AssistantId};
use agentforge_core::domain::conversation::{Conversation, ConversationMessage};
use agentforge_core::domain::execution::{Execution, ExecutionId};
use agentforge_core::domain::tool::{Tool, ToolId, ToolRunStatus};
use agentforge_core::domain::workflow::{Workflow, WorkflowId};
use agentforge_core::errors::ApplicationError;
use agentforge_core::steps::ActionPlan;

pub mod action;
pub mod agent;
pub mod assistant;
pub mod conversation;
pub mod execution;
pub mod memory;
pub mod platform;
mod rows;
pub mod tool;
pub mod workflow;

pub use action::SqlActionWriter;
pub use agent::SqlAgentRepository;
pub use assistant::SqlAssistantRepository;
pub use conversation::SqlConversationRepository;
pub use execution::SqlExecutionRepository;
pub use memory::{
    InMemoryAgentRepository, InMemoryAssistantRepository, InMemoryConversationRepository,
    InMemoryExecutionRepository, InMemoryToolRepository, InMemoryWorkflowRepository,
};
pub use platform::SqlPlatformDataRepository;
pub use tool::SqlToolRepository;
pub use workflow::SqlWorkflowRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("rejected: {0}")]
    Rejected(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Conflict(message) | RepositoryError::Rejected(message) => {
                ApplicationError::validation(message)
            }
            other => ApplicationError::Persistence(other.to_string()),
        }
    }
}

#[async_trait]
pub trait ToolRepository: Send + Sync {
    async fn find_by_id(&self, id: &ToolId) -> Result<Option<Tool>, RepositoryError>;
    async fn find_by_function_name(
        &self,
        function_name: &str,
    ) -> Result<Option<Tool>, RepositoryError>;
    /// Whole catalog ordered by category, then name.
    async fn list(&self) -> Result<Vec<Tool>, RepositoryError>;
    /// Fails with [`RepositoryError::Conflict`] when the function name is taken.
    async fn insert(&self, tool: Tool) -> Result<(), RepositoryError>;
    /// Inserts or refreshes a built-in by function name. Usage statistics,
    /// the id and `created_at` of an existing row are kept.
    async fn upsert_builtin(&self, tool: Tool) -> Result<Tool, RepositoryError>;
    /// Returns false when no tool matched `id`.
    async fn record_execution(
        &self,
        id: &ToolId,
        status: ToolRunStatus,
        duration_ms: u64,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait AssistantRepository: Send + Sync {
    async fn find_by_id(&self, id: &AssistantId) -> Result<Option<Assistant>, RepositoryError>;
    async fn list(&self) -> Result<Vec<Assistant>, RepositoryError>;
    async fn save(&self, assistant: Assistant) -> Result<(), RepositoryError>;
    async fn delete(&self, id: &AssistantId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn find_by_id(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError>;
    async fn list(&self) -> Result<Vec<Agent>, RepositoryError>;
    async fn save(&self, agent: Agent) -> Result<(), RepositoryError>;
    async fn delete(&self, id: &AgentId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<Workflow>, RepositoryError>;
    async fn list(&self) -> Result<Vec<Workflow>, RepositoryError>;
    async fn list_active_by_trigger(
        &self,
        trigger_event: &str,
    ) -> Result<Vec<Workflow>, RepositoryError>;
    async fn save(&self, workflow: Workflow) -> Result<(), RepositoryError>;
    async fn delete(&self, id: &WorkflowId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    async fn find_by_id(&self, id: &ExecutionId) -> Result<Option<Execution>, RepositoryError>;
    /// Newest first.
    async fn list_for_workflow(
        &self,
        workflow_id: &WorkflowId,
        limit: u32,
    ) -> Result<Vec<Execution>, RepositoryError>;
    async fn insert(&self, execution: Execution) -> Result<(), RepositoryError>;
    /// Writes `execution` only if the stored row is in one of the statuses
    /// allowed to precede `execution.status`. Returns whether a row changed.
    async fn update_guarded(&self, execution: &Execution) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn find_by_thread(
        &self,
        external_thread_id: &str,
    ) -> Result<Option<Conversation>, RepositoryError>;
    async fn insert(&self, conversation: Conversation) -> Result<(), RepositoryError>;
    async fn replace_messages(
        &self,
        external_thread_id: &str,
        messages: Vec<ConversationMessage>,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

/// Read-only lookups over platform tables, answered as JSON.
#[async_trait]
pub trait PlatformDataRepository: Send + Sync {
    async fn vessel_by_imo(&self, imo: &str) -> Result<Option<Value>, RepositoryError>;
    async fn vessel_by_mmsi(&self, mmsi: &str) -> Result<Option<Value>, RepositoryError>;
    async fn ports_by_name(&self, name: &str) -> Result<Vec<Value>, RepositoryError>;
    async fn subscriber_by_user(&self, user_id: &str) -> Result<Option<Value>, RepositoryError>;
    async fn active_plans(&self) -> Result<Vec<Value>, RepositoryError>;
    async fn platform_stats(&self) -> Result<Value, RepositoryError>;
}

/// Applies a validated workflow action. Returns affected row count.
#[async_trait]
pub trait ActionWriter: Send + Sync {
    async fn apply(&self, plan: &ActionPlan) -> Result<u64, RepositoryError>;
}
