use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use agentforge_core::audit::{AuditEvent, AuditSink};
use agentforge_core::config::AppConfig;
use agentforge_db::repositories::{
    SqlActionWriter, SqlAgentRepository, SqlAssistantRepository, SqlConversationRepository,
    SqlExecutionRepository, SqlPlatformDataRepository, SqlToolRepository, SqlWorkflowRepository,
};
use agentforge_db::DbPool;

use crate::backend::{AssistantBackend, BackendError, OpenAiClient};
use crate::commands::{Dispatcher, Provisioned};
use crate::compiler::Compiler;
use crate::conversation::ConversationRunner;
use crate::entities::EntityService;
use crate::events::ExecutionEvents;
use crate::executor::{ToolExecutor, WorkflowExecutor};
use crate::functions::{FunctionInvoker, HttpFunctionInvoker};
use crate::llm::ChatModel;
use crate::platform::PlatformData;
use crate::registry::ToolRegistry;
use crate::workflow::WorkflowService;

/// Writes audit events to the structured log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            event_name = "audit",
            audit_event_id = %event.event_id,
            audit_event_type = %event.event_type,
            category = ?event.category,
            outcome = ?event.outcome,
            entity_id = event.entity_id.as_deref().unwrap_or(""),
            correlation_id = %event.correlation_id,
            actor = %event.actor,
            "audit event"
        );
    }
}

/// Every service wired over one SQLite pool.
#[derive(Clone)]
pub struct AgentRuntime {
    dispatcher: Dispatcher,
    events: ExecutionEvents,
    registry: ToolRegistry,
}

impl AgentRuntime {
    /// Missing credentials leave the matching client unset; the commands
    /// that need it then fail with a configuration error.
    pub fn from_pool(pool: DbPool, config: &AppConfig) -> Result<Self, BackendError> {
        let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);

        let openai = OpenAiClient::from_config(&config.assistants)?.map(Arc::new);
        let backend = openai.clone().map(|client| client as Arc<dyn AssistantBackend>);
        let chat = openai.map(|client| client as Arc<dyn ChatModel>);
        let invoker = HttpFunctionInvoker::from_config(&config.functions)?
            .map(|invoker| Arc::new(invoker) as Arc<dyn FunctionInvoker>);
        if backend.is_none() {
            warn!("assistants.api_key not set; hosted assistant commands are disabled");
        }
        if invoker.is_none() {
            warn!("functions credentials not set; tool invocation is disabled");
        }
        let provisioned =
            Provisioned { assistant_backend: backend.is_some(), function_host: invoker.is_some() };

        let assistants = Arc::new(SqlAssistantRepository::new(pool.clone()));
        let executions = Arc::new(SqlExecutionRepository::new(pool.clone()));
        let workflows = Arc::new(SqlWorkflowRepository::new(pool.clone()));

        let registry = ToolRegistry::new(Arc::new(SqlToolRepository::new(pool.clone())), audit.clone());
        let tools =
            ToolExecutor::new(registry.clone(), executions.clone(), invoker.clone(), audit.clone());
        let entities = EntityService::new(
            assistants.clone(),
            Arc::new(SqlAgentRepository::new(pool.clone())),
            backend.clone(),
            audit.clone(),
            config.assistants.default_model.clone(),
        );
        let platform = PlatformData::new(Arc::new(SqlPlatformDataRepository::new(pool.clone())));
        let conversations = ConversationRunner::new(
            assistants,
            Arc::new(SqlConversationRepository::new(pool.clone())),
            backend,
            tools.clone(),
            platform.clone(),
            Duration::from_millis(config.assistants.poll_interval_ms.max(1)),
            Duration::from_secs(config.assistants.run_deadline_secs.max(1)),
        );

        let events = ExecutionEvents::default();
        let executor = WorkflowExecutor::new(
            workflows.clone(),
            executions.clone(),
            Arc::new(SqlActionWriter::new(pool)),
            invoker,
            chat.clone(),
            events.clone(),
            config.workflows.action_tables.clone(),
            config.workflows.ai_model.clone(),
        );
        let workflow_service =
            WorkflowService::new(workflows, executions, executor, events.clone(), audit);

        let dispatcher = Dispatcher::new(
            tools,
            Compiler::new(entities.clone(), chat),
            entities,
            conversations,
            workflow_service,
            platform,
            provisioned,
        );
        Ok(Self { dispatcher, events, registry })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn events(&self) -> &ExecutionEvents {
        &self.events
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}
