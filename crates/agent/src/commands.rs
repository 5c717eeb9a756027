//! Typed action surface shared by the HTTP and CLI front ends.

use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use agentforge_core::blueprint::{summarize, validate};
use agentforge_core::compiler::CompileTarget;
use agentforge_core::domain::agent::{AgentDraft, AgentId, AgentPatch};
use agentforge_core::domain::assistant::{AssistantDraft, AssistantId, AssistantPatch};
use agentforge_core::domain::execution::ExecutionId;
use agentforge_core::domain::tool::{ToolDraft, ToolId};
use agentforge_core::domain::workflow::{WorkflowDraft, WorkflowId, WorkflowPatch};
use agentforge_core::errors::ApplicationError;

use crate::compiler::Compiler;
use crate::conversation::{ChatTurn, ConversationRunner};
use crate::entities::EntityService;
use crate::executor::ToolExecutor;
use crate::platform::{PlatformData, PlatformQuery};
use crate::workflow::WorkflowService;

fn empty_object() -> Value {
    json!({})
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    DiscoverTools,
    AddTool(ToolDraft),
    TestTool {
        tool_id: ToolId,
        #[serde(default = "empty_object")]
        parameters: Value,
    },
    ListTools,
    ValidateBlueprint {
        blueprint: Value,
    },
    CompileBlueprint {
        blueprint: Value,
        target: CompileTarget,
        #[serde(default)]
        target_index: usize,
        #[serde(default)]
        created_by: Option<String>,
    },
    PromptToBlueprint {
        prompt: String,
    },
    CreateAssistant(AssistantDraft),
    UpdateAssistant {
        assistant_id: AssistantId,
        #[serde(flatten)]
        patch: AssistantPatch,
    },
    DeleteAssistant {
        assistant_id: AssistantId,
    },
    ListAssistants,
    ChatWithAssistant(ChatTurn),
    CreateAgent(AgentDraft),
    UpdateAgent {
        agent_id: AgentId,
        #[serde(flatten)]
        patch: AgentPatch,
    },
    DeleteAgent {
        agent_id: AgentId,
    },
    ListAgents,
    CompileToAssistant {
        agent_id: AgentId,
    },
    CreateWorkflow(WorkflowDraft),
    UpdateWorkflow {
        workflow_id: WorkflowId,
        #[serde(flatten)]
        patch: WorkflowPatch,
    },
    DeleteWorkflow {
        workflow_id: WorkflowId,
    },
    TriggerWorkflow {
        workflow_id: WorkflowId,
        #[serde(default)]
        trigger_event: Option<String>,
        #[serde(default = "empty_object")]
        trigger_data: Value,
    },
    DispatchEvent {
        event: String,
        #[serde(default = "empty_object")]
        data: Value,
    },
    GetExecution {
        execution_id: ExecutionId,
    },
    ListExecutions {
        workflow_id: WorkflowId,
        #[serde(default)]
        limit: Option<u32>,
    },
    GetEventRegistry,
    GetPlatformData {
        query_type: String,
        #[serde(default = "empty_object")]
        query_params: Value,
    },
}

/// External credential a command cannot run without.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Credential {
    AssistantBackend,
    FunctionHost,
}

impl Command {
    pub fn parse(body: Value) -> Result<Self, ApplicationError> {
        serde_json::from_value(body)
            .map_err(|error| ApplicationError::validation(format!("invalid command: {error}")))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::DiscoverTools => "discover_tools",
            Self::AddTool(_) => "add_tool",
            Self::TestTool { .. } => "test_tool",
            Self::ListTools => "list_tools",
            Self::ValidateBlueprint { .. } => "validate_blueprint",
            Self::CompileBlueprint { .. } => "compile_blueprint",
            Self::PromptToBlueprint { .. } => "prompt_to_blueprint",
            Self::CreateAssistant(_) => "create_assistant",
            Self::UpdateAssistant { .. } => "update_assistant",
            Self::DeleteAssistant { .. } => "delete_assistant",
            Self::ListAssistants => "list_assistants",
            Self::ChatWithAssistant(_) => "chat_with_assistant",
            Self::CreateAgent(_) => "create_agent",
            Self::UpdateAgent { .. } => "update_agent",
            Self::DeleteAgent { .. } => "delete_agent",
            Self::ListAgents => "list_agents",
            Self::CompileToAssistant { .. } => "compile_to_assistant",
            Self::CreateWorkflow(_) => "create_workflow",
            Self::UpdateWorkflow { .. } => "update_workflow",
            Self::DeleteWorkflow { .. } => "delete_workflow",
            Self::TriggerWorkflow { .. } => "trigger_workflow",
            Self::DispatchEvent { .. } => "dispatch_event",
            Self::GetExecution { .. } => "get_execution",
            Self::ListExecutions { .. } => "list_executions",
            Self::GetEventRegistry => "get_event_registry",
            Self::GetPlatformData { .. } => "get_platform_data",
        }
    }

    pub fn required_credential(&self) -> Option<Credential> {
        match self {
            Self::TestTool { .. } => Some(Credential::FunctionHost),
            Self::PromptToBlueprint { .. }
            | Self::CreateAssistant(_)
            | Self::UpdateAssistant { .. }
            | Self::DeleteAssistant { .. }
            | Self::ChatWithAssistant(_)
            | Self::CompileToAssistant { .. }
            | Self::CompileBlueprint { target: CompileTarget::Assistant, .. } => {
                Some(Credential::AssistantBackend)
            }
            _ => None,
        }
    }
}

/// Which credentials were provisioned at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Provisioned {
    pub assistant_backend: bool,
    pub function_host: bool,
}

impl Provisioned {
    fn check(&self, credential: Credential) -> Result<(), ApplicationError> {
        let (present, setting) = match credential {
            Credential::AssistantBackend => (self.assistant_backend, "assistants.api_key"),
            Credential::FunctionHost => {
                (self.function_host, "functions.base_url and functions.service_key")
            }
        };
        if present {
            Ok(())
        } else {
            Err(ApplicationError::Configuration(format!("{setting} is not configured")))
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    tools: ToolExecutor,
    compiler: Compiler,
    entities: EntityService,
    conversations: ConversationRunner,
    workflows: WorkflowService,
    platform: PlatformData,
    provisioned: Provisioned,
}

impl Dispatcher {
    pub fn new(
        tools: ToolExecutor,
        compiler: Compiler,
        entities: EntityService,
        conversations: ConversationRunner,
        workflows: WorkflowService,
        platform: PlatformData,
        provisioned: Provisioned,
    ) -> Self {
        Self { tools, compiler, entities, conversations, workflows, platform, provisioned }
    }

    pub fn workflows(&self) -> &WorkflowService {
        &self.workflows
    }

    pub fn provisioned(&self) -> Provisioned {
        self.provisioned
    }

    /// Runs one command. Front ends wrap the payload with `success: true`
    /// unless it carries its own flag, as `test_tool` does.
    pub async fn dispatch(
        &self,
        command: Command,
        cancel: CancellationToken,
    ) -> Result<Value, ApplicationError> {
        let action = command.name();
        if let Some(credential) = command.required_credential() {
            self.provisioned.check(credential)?;
        }
        info!(event_name = "agent.command.received", action, "dispatching command");

        let registry = self.tools.registry();
        let result = match command {
            Command::DiscoverTools => {
                let discovery = registry.discover().await?;
                json!({"tools": discovery.tools, "discovered": discovery.discovered})
            }
            Command::AddTool(draft) => json!({"tool": registry.add(draft).await?}),
            Command::TestTool { tool_id, parameters } => {
                let run = self.tools.execute(&tool_id, parameters).await?;
                serde_json::to_value(run).map_err(|error| {
                    ApplicationError::ExecutionFailure(format!("tool result could not be encoded: {error}"))
                })?
            }
            Command::ListTools => json!({"tools": registry.list().await?}),
            Command::ValidateBlueprint { blueprint } => {
                let report = validate(&blueprint);
                json!({"valid": report.valid, "errors": report.errors, "summary": summarize(&blueprint)})
            }
            Command::CompileBlueprint { blueprint, target, target_index, created_by } => {
                let outcome = self.compiler.compile(&blueprint, target, target_index, created_by).await?;
                json!({"results": [outcome.into_result()]})
            }
            Command::PromptToBlueprint { prompt } => {
                let generated = self.compiler.prompt_to_blueprint(&prompt).await?;
                json!({
                    "config": generated.config,
                    "validation": generated.validation,
                    "raw_response": generated.raw_response,
                })
            }
            Command::CreateAssistant(draft) => {
                json!({"assistant": self.entities.create_assistant(draft).await?})
            }
            Command::UpdateAssistant { assistant_id, patch } => {
                json!({"assistant": self.entities.update_assistant(&assistant_id, patch).await?})
            }
            Command::DeleteAssistant { assistant_id } => {
                self.entities.delete_assistant(&assistant_id).await?;
                json!({"deleted": assistant_id.0})
            }
            Command::ListAssistants => json!({"assistants": self.entities.list_assistants().await?}),
            Command::ChatWithAssistant(turn) => {
                let reply = self.conversations.chat(turn, cancel).await?;
                json!({
                    "thread_id": reply.thread_id,
                    "message": reply.message,
                    "run_status": reply.run_status,
                })
            }
            Command::CreateAgent(draft) => json!({"agent": self.entities.create_agent(draft).await?}),
            Command::UpdateAgent { agent_id, patch } => {
                json!({"agent": self.entities.update_agent(&agent_id, patch).await?})
            }
            Command::DeleteAgent { agent_id } => {
                self.entities.delete_agent(&agent_id).await?;
                json!({"deleted": agent_id.0})
            }
            Command::ListAgents => json!({"agents": self.entities.list_agents().await?}),
            Command::CompileToAssistant { agent_id } => {
                json!({"assistant": self.entities.compile_to_assistant(&agent_id).await?})
            }
            Command::CreateWorkflow(draft) => {
                json!({"workflow": self.workflows.create_workflow(draft).await?})
            }
            Command::UpdateWorkflow { workflow_id, patch } => {
                json!({"workflow": self.workflows.update_workflow(&workflow_id, patch).await?})
            }
            Command::DeleteWorkflow { workflow_id } => {
                self.workflows.delete_workflow(&workflow_id).await?;
                json!({"deleted": workflow_id.0})
            }
            Command::TriggerWorkflow { workflow_id, trigger_event, trigger_data } => {
                let execution = self
                    .workflows
                    .trigger(&workflow_id, trigger_event.as_deref(), trigger_data)
                    .await?;
                json!({"execution": execution})
            }
            Command::DispatchEvent { event, data } => {
                let summary = self.workflows.dispatch_event(&event, data).await?;
                json!({
                    "workflows_triggered": summary.workflows_triggered,
                    "execution_ids": summary.execution_ids,
                })
            }
            Command::GetExecution { execution_id } => {
                json!({"execution": self.workflows.get_execution(&execution_id).await?})
            }
            Command::ListExecutions { workflow_id, limit } => {
                json!({"executions": self.workflows.list_executions(&workflow_id, limit).await?})
            }
            Command::GetEventRegistry => json!({"events": self.workflows.event_registry()}),
            Command::GetPlatformData { query_type, query_params } => {
                let query = PlatformQuery::from_arguments(
                    &json!({"query_type": query_type, "query_params": query_params}),
                )?;
                self.platform.query(&query).await?
            }
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use agentforge_core::audit::NoopAuditSink;
    use agentforge_core::domain::tool::BUILTIN_TOOLS;
    use agentforge_core::errors::ApplicationError;
    use agentforge_db::repositories::{
        InMemoryAgentRepository, InMemoryAssistantRepository, InMemoryConversationRepository,
        InMemoryExecutionRepository, InMemoryToolRepository, InMemoryWorkflowRepository,
    };

    use super::{Command, Credential, Dispatcher, Provisioned};
    use crate::compiler::Compiler;
    use crate::conversation::ConversationRunner;
    use crate::entities::EntityService;
    use crate::events::ExecutionEvents;
    use crate::executor::{ToolExecutor, WorkflowExecutor};
    use crate::functions::FunctionInvoker;
    use crate::platform::PlatformData;
    use crate::registry::ToolRegistry;
    use crate::testing::{RecordingActionWriter, ScriptedInvoker, StaticPlatform};
    use crate::workflow::WorkflowService;

    /// Wires every service over in-memory repositories with no assistant
    /// backend; the function host is provisioned only when asked.
    fn dispatcher(function_host: bool) -> Dispatcher {
        let audit = Arc::new(NoopAuditSink);
        let executions = Arc::new(InMemoryExecutionRepository::default());
        let workflows = Arc::new(InMemoryWorkflowRepository::default());
        let assistants = Arc::new(InMemoryAssistantRepository::default());
        let invoker = function_host
            .then(|| Arc::new(ScriptedInvoker::default()) as Arc<dyn FunctionInvoker>);

        let registry = ToolRegistry::new(Arc::new(InMemoryToolRepository::default()), audit.clone());
        let tools = ToolExecutor::new(registry, executions.clone(), invoker.clone(), audit.clone());
        let entities = EntityService::new(
            assistants.clone(),
            Arc::new(InMemoryAgentRepository::default()),
            None,
            audit.clone(),
            "gpt-4o",
        );
        let platform = PlatformData::new(Arc::new(StaticPlatform));
        let conversations = ConversationRunner::new(
            assistants,
            Arc::new(InMemoryConversationRepository::default()),
            None,
            tools.clone(),
            platform.clone(),
            std::time::Duration::from_millis(10),
            std::time::Duration::from_secs(5),
        );
        let events = ExecutionEvents::default();
        let executor = WorkflowExecutor::new(
            workflows.clone(),
            executions.clone(),
            Arc::new(RecordingActionWriter::default()),
            invoker,
            None,
            events.clone(),
            vec!["notifications".to_string()],
            "gpt-4o-mini",
        );
        let workflow_service = WorkflowService::new(workflows, executions, executor, events, audit);

        Dispatcher::new(
            tools,
            Compiler::new(entities.clone(), None),
            entities,
            conversations,
            workflow_service,
            platform,
            Provisioned { assistant_backend: false, function_host },
        )
    }

    #[test]
    fn commands_parse_from_tagged_json() {
        let command = Command::parse(json!({
            "action": "trigger_workflow",
            "workflow_id": "wf-1",
            "trigger_event": "manual"
        }))
        .expect("parse");
        assert_eq!(command.name(), "trigger_workflow");

        let update = Command::parse(json!({
            "action": "update_workflow",
            "workflow_id": "wf-1",
            "name": "Renamed"
        }))
        .expect("parse flattened patch");
        match update {
            Command::UpdateWorkflow { patch, .. } => assert_eq!(patch.name.as_deref(), Some("Renamed")),
            other => panic!("unexpected command {other:?}"),
        }

        let unknown = Command::parse(json!({"action": "launch_rocket"})).expect_err("unknown");
        assert_eq!(unknown.error_class(), "validation");
    }

    #[test]
    fn hosted_targets_need_the_assistant_backend() {
        let assistant = Command::parse(json!({
            "action": "compile_blueprint",
            "blueprint": {},
            "target": "assistant"
        }))
        .expect("parse");
        let agent = Command::parse(json!({
            "action": "compile_blueprint",
            "blueprint": {},
            "target": "sdk_agent"
        }))
        .expect("parse");

        assert_eq!(assistant.required_credential(), Some(Credential::AssistantBackend));
        assert_eq!(agent.required_credential(), None);
    }

    #[tokio::test]
    async fn missing_credential_fails_before_any_work() {
        let dispatcher = dispatcher(false);
        let chat = Command::parse(json!({
            "action": "chat_with_assistant",
            "assistant_id": "missing",
            "message": "hello"
        }))
        .expect("parse");

        let error = dispatcher.dispatch(chat, CancellationToken::new()).await.expect_err("no key");
        assert!(matches!(error, ApplicationError::Configuration(_)));

        let test_tool = Command::parse(json!({"action": "test_tool", "tool_id": "missing"}))
            .expect("parse");
        let error =
            dispatcher.dispatch(test_tool, CancellationToken::new()).await.expect_err("no host");
        assert!(matches!(error, ApplicationError::Configuration(_)));
    }

    #[tokio::test]
    async fn validate_blueprint_reports_scenario_a_summary() {
        let dispatcher = dispatcher(false);
        let command = Command::parse(json!({
            "action": "validate_blueprint",
            "blueprint": {
                "assistants": [],
                "sdk_agents": [{
                    "name": "Agent1",
                    "responsibility": "Send order confirmations.",
                    "triggers": ["order_created"],
                    "tools": ["Send Email"]
                }],
                "tools": [{"name": "Send Email", "type": "email", "function_name": "send-automated-email", "used_by": ["Agent1"]}],
                "workflows": []
            }
        }))
        .expect("parse");

        let result = dispatcher.dispatch(command, CancellationToken::new()).await.expect("validate");
        assert_eq!(result["valid"], json!(true));
        assert_eq!(result["errors"], json!([]));
        assert_eq!(
            result["summary"],
            json!({"assistants": 0, "sdk_agents": 1, "tools": 1, "workflows": 0})
        );
    }

    #[tokio::test]
    async fn trigger_workflow_returns_pending_execution() {
        let dispatcher = dispatcher(true);
        let created = dispatcher
            .dispatch(
                Command::parse(json!({
                    "action": "create_workflow",
                    "name": "Manual check",
                    "trigger_event": "manual",
                    "steps": []
                }))
                .expect("parse"),
                CancellationToken::new(),
            )
            .await
            .expect("create");
        let workflow_id = created["workflow"]["id"].clone();

        let result = dispatcher
            .dispatch(
                Command::parse(json!({
                    "action": "trigger_workflow",
                    "workflow_id": workflow_id,
                    "trigger_event": "manual",
                    "trigger_data": {}
                }))
                .expect("parse"),
                CancellationToken::new(),
            )
            .await
            .expect("trigger");

        assert_eq!(result["execution"]["status"], json!("pending"));
        assert_eq!(result["execution"]["steps_completed"], json!([]));
    }

    #[tokio::test]
    async fn listings_reflect_stored_entities() {
        let dispatcher = dispatcher(true);
        let run = |body: serde_json::Value| {
            let dispatcher = dispatcher.clone();
            async move {
                dispatcher
                    .dispatch(Command::parse(body).expect("parse"), CancellationToken::new())
                    .await
                    .expect("dispatch")
            }
        };

        let assistants = run(json!({"action": "list_assistants"})).await;
        assert_eq!(assistants["assistants"], json!([]));

        run(json!({
            "action": "create_agent",
            "name": "Agent1",
            "system_prompt": "Confirm new orders.",
            "triggers": ["order_created"]
        }))
        .await;
        let agents = run(json!({"action": "list_agents"})).await;
        assert_eq!(agents["agents"].as_array().map(Vec::len), Some(1));
        assert_eq!(agents["agents"][0]["name"], json!("Agent1"));

        let created = run(json!({
            "action": "create_workflow",
            "name": "Manual check",
            "trigger_event": "manual",
            "steps": []
        }))
        .await;
        let workflow_id = created["workflow"]["id"].clone();
        for _ in 0..2 {
            run(json!({"action": "trigger_workflow", "workflow_id": workflow_id})).await;
        }

        let all = run(json!({"action": "list_executions", "workflow_id": workflow_id})).await;
        assert_eq!(all["executions"].as_array().map(Vec::len), Some(2));
        let page =
            run(json!({"action": "list_executions", "workflow_id": workflow_id, "limit": 1})).await;
        assert_eq!(page["executions"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn discover_then_test_tool() {
        let dispatcher = dispatcher(true);
        let discovered = dispatcher
            .dispatch(Command::DiscoverTools, CancellationToken::new())
            .await
            .expect("discover");
        assert_eq!(discovered["discovered"], json!(BUILTIN_TOOLS.len()));

        let tool_id = discovered["tools"][0]["id"].clone();
        let result = dispatcher
            .dispatch(
                Command::parse(json!({"action": "test_tool", "tool_id": tool_id, "parameters": {}}))
                    .expect("parse"),
                CancellationToken::new(),
            )
            .await
            .expect("test tool");
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["result"], json!({"ok": true}));
    }

    #[tokio::test]
    async fn platform_data_answers_stats() {
        let dispatcher = dispatcher(false);
        let result = dispatcher
            .dispatch(
                Command::parse(json!({"action": "get_platform_data", "query_type": "platform_stats"}))
                    .expect("parse"),
                CancellationToken::new(),
            )
            .await
            .expect("stats");
        assert_eq!(result["data"]["total_vessels"], json!(1));
    }
}
