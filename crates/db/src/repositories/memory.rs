use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use agentforge_core::domain::agent::{Agent, AgentId};
use agentforge_core::domain::assistant::{Assistant, AssistantId};
use agentforge_core::domain::conversation::{Conversation, ConversationMessage};
use agentforge_core::domain::execution::{Execution, ExecutionId};
use agentforge_core::domain::tool::{Tool, ToolId, ToolRunStatus};
use agentforge_core::domain::workflow::{Workflow, WorkflowId};

use super::{
    AgentRepository, AssistantRepository, ConversationRepository, ExecutionRepository,
    RepositoryError, ToolRepository, WorkflowRepository,
};

#[derive(Default)]
pub struct InMemoryToolRepository {
    tools: RwLock<HashMap<String, Tool>>,
}

#[async_trait::async_trait]
impl ToolRepository for InMemoryToolRepository {
    async fn find_by_id(&self, id: &ToolId) -> Result<Option<Tool>, RepositoryError> {
        let tools = self.tools.read().await;
        Ok(tools.get(&id.0).cloned())
    }

    async fn find_by_function_name(
        &self,
        function_name: &str,
    ) -> Result<Option<Tool>, RepositoryError> {
        let tools = self.tools.read().await;
        Ok(tools.values().find(|tool| tool.function_name == function_name).cloned())
    }

    async fn list(&self) -> Result<Vec<Tool>, RepositoryError> {
        let tools = self.tools.read().await;
        let mut listed: Vec<Tool> = tools.values().cloned().collect();
        listed.sort_by(|a, b| (&a.category, &a.name).cmp(&(&b.category, &b.name)));
        Ok(listed)
    }

    async fn insert(&self, tool: Tool) -> Result<(), RepositoryError> {
        let mut tools = self.tools.write().await;
        if tools.values().any(|existing| existing.function_name == tool.function_name) {
            return Err(RepositoryError::Conflict(format!(
                "Tool with function_name `{}` already exists",
                tool.function_name
            )));
        }
        tools.insert(tool.id.0.clone(), tool);
        Ok(())
    }

    async fn upsert_builtin(&self, tool: Tool) -> Result<Tool, RepositoryError> {
        let mut tools = self.tools.write().await;
        let existing =
            tools.values_mut().find(|existing| existing.function_name == tool.function_name);
        let stored = match existing {
            Some(existing) => {
                existing.name = tool.name;
                existing.description = tool.description;
                existing.category = tool.category;
                existing.parameters = tool.parameters;
                existing.endpoint_path = tool.endpoint_path;
                existing.is_active = true;
                existing.is_system = true;
                existing.updated_at = tool.updated_at;
                existing.clone()
            }
            None => {
                let mut fresh = tool;
                fresh.is_active = true;
                fresh.is_system = true;
                tools.insert(fresh.id.0.clone(), fresh.clone());
                fresh
            }
        };
        Ok(stored)
    }

    async fn record_execution(
        &self,
        id: &ToolId,
        status: ToolRunStatus,
        duration_ms: u64,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut tools = self.tools.write().await;
        let Some(tool) = tools.get_mut(&id.0) else {
            return Ok(false);
        };
        let count = tool.execution_count as f64;
        tool.avg_execution_time_ms =
            (tool.avg_execution_time_ms * count + duration_ms as f64) / (count + 1.0);
        tool.execution_count += 1;
        tool.last_executed_at = Some(at);
        tool.last_execution_status = Some(status);
        tool.updated_at = at;
        Ok(true)
    }
}

#[derive(Default)]
pub struct InMemoryAssistantRepository {
    assistants: RwLock<HashMap<String, Assistant>>,
}

#[async_trait::async_trait]
impl AssistantRepository for InMemoryAssistantRepository {
    async fn find_by_id(&self, id: &AssistantId) -> Result<Option<Assistant>, RepositoryError> {
        let assistants = self.assistants.read().await;
        Ok(assistants.get(&id.0).cloned())
    }

    async fn list(&self) -> Result<Vec<Assistant>, RepositoryError> {
        let assistants = self.assistants.read().await;
        let mut listed: Vec<Assistant> = assistants.values().cloned().collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(listed)
    }

    async fn save(&self, assistant: Assistant) -> Result<(), RepositoryError> {
        let mut assistants = self.assistants.write().await;
        assistants.insert(assistant.id.0.clone(), assistant);
        Ok(())
    }

    async fn delete(&self, id: &AssistantId) -> Result<bool, RepositoryError> {
        let mut assistants = self.assistants.write().await;
        Ok(assistants.remove(&id.0).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryAgentRepository {
    agents: RwLock<HashMap<String, Agent>>,
}

#[async_trait::async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn find_by_id(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError> {
        let agents = self.agents.read().await;
        Ok(agents.get(&id.0).cloned())
    }

    async fn list(&self) -> Result<Vec<Agent>, RepositoryError> {
        let agents = self.agents.read().await;
        let mut listed: Vec<Agent> = agents.values().cloned().collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(listed)
    }

    async fn save(&self, agent: Agent) -> Result<(), RepositoryError> {
        let mut agents = self.agents.write().await;
        agents.insert(agent.id.0.clone(), agent);
        Ok(())
    }

    async fn delete(&self, id: &AgentId) -> Result<bool, RepositoryError> {
        let mut agents = self.agents.write().await;
        Ok(agents.remove(&id.0).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryWorkflowRepository {
    workflows: RwLock<HashMap<String, Workflow>>,
}

#[async_trait::async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<Workflow>, RepositoryError> {
        let workflows = self.workflows.read().await;
        Ok(workflows.get(&id.0).cloned())
    }

    async fn list(&self) -> Result<Vec<Workflow>, RepositoryError> {
        let workflows = self.workflows.read().await;
        let mut listed: Vec<Workflow> = workflows.values().cloned().collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(listed)
    }

    async fn list_active_by_trigger(
        &self,
        trigger_event: &str,
    ) -> Result<Vec<Workflow>, RepositoryError> {
        let workflows = self.workflows.read().await;
        let mut matched: Vec<Workflow> = workflows
            .values()
            .filter(|workflow| workflow.is_active && workflow.trigger_event == trigger_event)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(matched)
    }

    async fn save(&self, workflow: Workflow) -> Result<(), RepositoryError> {
        let mut workflows = self.workflows.write().await;
        workflows.insert(workflow.id.0.clone(), workflow);
        Ok(())
    }

    async fn delete(&self, id: &WorkflowId) -> Result<bool, RepositoryError> {
        let mut workflows = self.workflows.write().await;
        Ok(workflows.remove(&id.0).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryExecutionRepository {
    executions: RwLock<HashMap<String, Execution>>,
}

#[async_trait::async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn find_by_id(&self, id: &ExecutionId) -> Result<Option<Execution>, RepositoryError> {
        let executions = self.executions.read().await;
        Ok(executions.get(&id.0).cloned())
    }

    async fn list_for_workflow(
        &self,
        workflow_id: &WorkflowId,
        limit: u32,
    ) -> Result<Vec<Execution>, RepositoryError> {
        let executions = self.executions.read().await;
        let mut listed: Vec<Execution> = executions
            .values()
            .filter(|execution| execution.workflow_id.as_ref() == Some(workflow_id))
            .cloned()
            .collect();
        listed.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        listed.truncate(limit as usize);
        Ok(listed)
    }

    async fn insert(&self, execution: Execution) -> Result<(), RepositoryError> {
        let mut executions = self.executions.write().await;
        if executions.contains_key(&execution.id.0) {
            return Err(RepositoryError::Conflict(format!(
                "execution `{}` already exists",
                execution.id.0
            )));
        }
        executions.insert(execution.id.0.clone(), execution);
        Ok(())
    }

    async fn update_guarded(&self, execution: &Execution) -> Result<bool, RepositoryError> {
        let mut executions = self.executions.write().await;
        let Some(stored) = executions.get_mut(&execution.id.0) else {
            return Ok(false);
        };
        if !execution.status.predecessors().contains(&stored.status) {
            return Ok(false);
        }
        *stored = execution.clone();
        Ok(true)
    }
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    conversations: RwLock<HashMap<String, Conversation>>,
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn find_by_thread(
        &self,
        external_thread_id: &str,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(external_thread_id).cloned())
    }

    async fn insert(&self, conversation: Conversation) -> Result<(), RepositoryError> {
        let mut conversations = self.conversations.write().await;
        if conversations.contains_key(&conversation.external_thread_id) {
            return Err(RepositoryError::Conflict(format!(
                "thread `{}` already has a conversation",
                conversation.external_thread_id
            )));
        }
        conversations.insert(conversation.external_thread_id.clone(), conversation);
        Ok(())
    }

    async fn replace_messages(
        &self,
        external_thread_id: &str,
        messages: Vec<ConversationMessage>,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut conversations = self.conversations.write().await;
        let Some(conversation) = conversations.get_mut(external_thread_id) else {
            return Ok(false);
        };
        conversation.messages = messages;
        conversation.updated_at = at;
        Ok(true)
    }
}
