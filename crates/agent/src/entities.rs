//! Assistants and agents: local records, plus the hosted counterpart of
//! every assistant.
//!
//! Creating an assistant is two-phase. The remote assistant is created
//! first; if the local write then fails the remote one is deleted again.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use agentforge_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use agentforge_core::domain::agent::{Agent, AgentDraft, AgentId, AgentPatch};
use agentforge_core::domain::assistant::{Assistant, AssistantDraft, AssistantId, AssistantPatch};
use agentforge_core::errors::ApplicationError;
use agentforge_db::repositories::{AgentRepository, AssistantRepository};

use crate::backend::{AssistantBackend, RemoteAssistantSpec};

#[derive(Clone)]
pub struct EntityService {
    assistants: Arc<dyn AssistantRepository>,
    agents: Arc<dyn AgentRepository>,
    backend: Option<Arc<dyn AssistantBackend>>,
    audit: Arc<dyn AuditSink>,
    default_model: String,
}

impl EntityService {
    pub fn new(
        assistants: Arc<dyn AssistantRepository>,
        agents: Arc<dyn AgentRepository>,
        backend: Option<Arc<dyn AssistantBackend>>,
        audit: Arc<dyn AuditSink>,
        default_model: impl Into<String>,
    ) -> Self {
        Self { assistants, agents, backend, audit, default_model: default_model.into() }
    }

    pub(crate) fn backend(&self) -> Result<&Arc<dyn AssistantBackend>, ApplicationError> {
        self.backend.as_ref().ok_or_else(|| {
            ApplicationError::Configuration("assistants.api_key is not configured".to_string())
        })
    }

    pub async fn get_assistant(&self, id: &AssistantId) -> Result<Assistant, ApplicationError> {
        self.assistants
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("assistant {}", id.0)))
    }

    pub async fn list_assistants(&self) -> Result<Vec<Assistant>, ApplicationError> {
        Ok(self.assistants.list().await?)
    }

    pub async fn create_assistant(
        &self,
        draft: AssistantDraft,
    ) -> Result<Assistant, ApplicationError> {
        let missing = draft.missing_fields();
        if !missing.is_empty() {
            return Err(ApplicationError::Validation { errors: missing });
        }
        let backend = self.backend()?;

        let model = draft.model.clone().unwrap_or_else(|| self.default_model.clone());
        let spec = RemoteAssistantSpec::new(
            &draft.name,
            draft.description.as_deref(),
            &draft.instructions,
            &model,
            &draft.tools,
            draft.file_search,
            draft.code_interpreter,
        );
        let remote_id = backend.create_assistant(&spec).await?;

        let assistant = draft.into_assistant(
            AssistantId(Uuid::new_v4().to_string()),
            Some(remote_id.clone()),
            &self.default_model,
            Utc::now(),
        );
        if let Err(error) = self.assistants.save(assistant.clone()).await {
            match backend.delete_assistant(&remote_id).await {
                Ok(()) => info!(
                    event_name = "agent.assistant.compensated",
                    remote_id = %remote_id,
                    "remote assistant removed after local write failed"
                ),
                Err(cleanup) => warn!(
                    event_name = "agent.assistant.orphaned",
                    remote_id = %remote_id,
                    error = %cleanup,
                    "remote assistant left behind after local write failed"
                ),
            }
            self.emit(&assistant.id.0, "assistant.create", AuditOutcome::Failed);
            return Err(error.into());
        }

        info!(
            event_name = "agent.assistant.created",
            assistant_id = %assistant.id.0,
            remote_id = %remote_id,
            "assistant created"
        );
        self.emit(&assistant.id.0, "assistant.create", AuditOutcome::Success);
        Ok(assistant)
    }

    /// The local write always happens; a rejected remote update is logged.
    pub async fn update_assistant(
        &self,
        id: &AssistantId,
        patch: AssistantPatch,
    ) -> Result<Assistant, ApplicationError> {
        let backend = self.backend()?;
        let assistant = patch.apply(self.get_assistant(id).await?);

        if let Some(remote_id) = &assistant.external_reference_id {
            let spec = RemoteAssistantSpec::new(
                &assistant.name,
                assistant.description.as_deref(),
                &assistant.instructions,
                &assistant.model,
                &assistant.tools,
                assistant.file_search,
                assistant.code_interpreter,
            );
            if let Err(error) = backend.update_assistant(remote_id, &spec).await {
                warn!(
                    event_name = "agent.assistant.remote_update_failed",
                    assistant_id = %assistant.id.0,
                    remote_id = %remote_id,
                    error = %error,
                    "remote assistant update rejected"
                );
            }
        }

        self.assistants.save(assistant.clone()).await?;
        self.emit(&assistant.id.0, "assistant.update", AuditOutcome::Success);
        Ok(assistant)
    }

    /// Remote first, then local. The local row goes even if the remote
    /// delete fails.
    pub async fn delete_assistant(&self, id: &AssistantId) -> Result<(), ApplicationError> {
        let backend = self.backend()?;
        let assistant = self.get_assistant(id).await?;

        if let Some(remote_id) = &assistant.external_reference_id {
            if let Err(error) = backend.delete_assistant(remote_id).await {
                warn!(
                    event_name = "agent.assistant.remote_delete_failed",
                    assistant_id = %assistant.id.0,
                    remote_id = %remote_id,
                    error = %error,
                    "remote assistant delete failed; deleting local record anyway"
                );
            }
        }

        self.assistants.delete(id).await?;
        self.emit(&assistant.id.0, "assistant.delete", AuditOutcome::Success);
        Ok(())
    }

    pub async fn get_agent(&self, id: &AgentId) -> Result<Agent, ApplicationError> {
        self.agents
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("agent {}", id.0)))
    }

    pub async fn list_agents(&self) -> Result<Vec<Agent>, ApplicationError> {
        Ok(self.agents.list().await?)
    }

    pub async fn create_agent(&self, draft: AgentDraft) -> Result<Agent, ApplicationError> {
        let missing = draft.missing_fields();
        if !missing.is_empty() {
            return Err(ApplicationError::Validation { errors: missing });
        }
        let agent =
            draft.into_agent(AgentId(Uuid::new_v4().to_string()), &self.default_model, Utc::now());
        self.agents.save(agent.clone()).await?;
        info!(event_name = "agent.agent.created", agent_id = %agent.id.0, "agent created");
        self.emit(&agent.id.0, "agent.create", AuditOutcome::Success);
        Ok(agent)
    }

    pub async fn update_agent(
        &self,
        id: &AgentId,
        patch: AgentPatch,
    ) -> Result<Agent, ApplicationError> {
        let agent = patch.apply(self.get_agent(id).await?);
        self.agents.save(agent.clone()).await?;
        self.emit(&agent.id.0, "agent.update", AuditOutcome::Success);
        Ok(agent)
    }

    pub async fn delete_agent(&self, id: &AgentId) -> Result<(), ApplicationError> {
        if !self.agents.delete(id).await? {
            return Err(ApplicationError::NotFound(format!("agent {}", id.0)));
        }
        self.emit(&id.0, "agent.delete", AuditOutcome::Success);
        Ok(())
    }

    /// Promotes a stored agent into a hosted assistant and links the two.
    pub async fn compile_to_assistant(&self, id: &AgentId) -> Result<Assistant, ApplicationError> {
        self.backend()?;
        let mut agent = self.get_agent(id).await?;

        let assistant = self
            .create_assistant(AssistantDraft {
                name: agent.name.clone(),
                description: agent.description.clone(),
                instructions: agent.system_prompt.clone(),
                model: Some(agent.model.clone()),
                tools: agent.tools.clone(),
                file_search: false,
                code_interpreter: false,
                created_by: agent.created_by.clone(),
            })
            .await?;

        agent.linked_assistant_id = Some(assistant.id.clone());
        self.agents.save(agent).await?;
        info!(
            event_name = "agent.agent.linked",
            agent_id = %id.0,
            assistant_id = %assistant.id.0,
            "agent promoted to assistant"
        );
        Ok(assistant)
    }

    fn emit(&self, entity_id: &str, event_type: &str, outcome: AuditOutcome) {
        self.audit.emit(AuditEvent::new(
            Some(entity_id.to_string()),
            entity_id,
            event_type,
            AuditCategory::Remote,
            "system",
            outcome,
        ));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use agentforge_core::audit::NoopAuditSink;
    use agentforge_core::domain::agent::{AgentDraft, AgentId};
    use agentforge_core::domain::assistant::{
        Assistant, AssistantDraft, AssistantId, AssistantPatch, ToolRef,
    };
    use agentforge_core::errors::ApplicationError;
    use agentforge_db::repositories::{
        AssistantRepository, InMemoryAgentRepository, InMemoryAssistantRepository,
        RepositoryError,
    };

    use super::EntityService;
    use crate::testing::ScriptedBackend;

    struct ReadOnlyAssistants;

    #[async_trait]
    impl AssistantRepository for ReadOnlyAssistants {
        async fn find_by_id(&self, _id: &AssistantId) -> Result<Option<Assistant>, RepositoryError> {
            Ok(None)
        }
        async fn list(&self) -> Result<Vec<Assistant>, RepositoryError> {
            Ok(Vec::new())
        }
        async fn save(&self, _assistant: Assistant) -> Result<(), RepositoryError> {
            Err(RepositoryError::Decode("database is read-only".to_string()))
        }
        async fn delete(&self, _id: &AssistantId) -> Result<bool, RepositoryError> {
            Ok(false)
        }
    }

    fn service_with(
        assistants: Arc<dyn AssistantRepository>,
        backend: Option<Arc<ScriptedBackend>>,
    ) -> EntityService {
        EntityService::new(
            assistants,
            Arc::new(InMemoryAgentRepository::default()),
            backend.map(|backend| backend as Arc<dyn crate::backend::AssistantBackend>),
            Arc::new(NoopAuditSink),
            "gpt-4o",
        )
    }

    fn draft() -> AssistantDraft {
        AssistantDraft {
            name: "Market Analyst".to_string(),
            instructions: "Answer freight market questions.".to_string(),
            tools: vec![ToolRef::stub("fetch-oil-prices")],
            ..AssistantDraft::default()
        }
    }

    #[tokio::test]
    async fn create_assistant_stores_remote_reference() {
        let backend = Arc::new(ScriptedBackend::default());
        let service =
            service_with(Arc::new(InMemoryAssistantRepository::default()), Some(backend.clone()));

        let assistant = service.create_assistant(draft()).await.expect("create");

        assert_eq!(assistant.external_reference_id.as_deref(), Some("asst_1"));
        assert_eq!(assistant.model, "gpt-4o");
        let created = backend.created.lock().expect("lock").clone();
        let names: Vec<String> = created[0]
            .tools
            .iter()
            .filter_map(|tool| tool["function"]["name"].as_str().map(str::to_string))
            .collect();
        assert_eq!(names, vec!["fetch_oil_prices".to_string(), "query_platform_data".to_string()]);
    }

    #[tokio::test]
    async fn failed_local_write_deletes_remote_assistant() {
        let backend = Arc::new(ScriptedBackend::default());
        let service = service_with(Arc::new(ReadOnlyAssistants), Some(backend.clone()));

        let error = service.create_assistant(draft()).await.expect_err("local write fails");

        assert_eq!(error.error_class(), "persistence");
        assert_eq!(backend.deleted(), vec!["asst_1".to_string()]);
    }

    #[tokio::test]
    async fn rejected_remote_create_stores_nothing() {
        let backend = Arc::new(ScriptedBackend { fail_create_assistant: true, ..Default::default() });
        let assistants = Arc::new(InMemoryAssistantRepository::default());
        let service = service_with(assistants.clone(), Some(backend));

        let error = service.create_assistant(draft()).await.expect_err("remote rejects");

        assert!(matches!(error, ApplicationError::ExternalService { status: 500, .. }));
        assert!(assistants.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn missing_api_key_is_a_configuration_error() {
        let service = service_with(Arc::new(InMemoryAssistantRepository::default()), None);
        let error = service.create_assistant(draft()).await.expect_err("no backend");
        assert!(matches!(error, ApplicationError::Configuration(_)));
    }

    #[tokio::test]
    async fn delete_proceeds_locally_when_remote_delete_fails() {
        let backend = Arc::new(ScriptedBackend { fail_delete_assistant: true, ..Default::default() });
        let assistants = Arc::new(InMemoryAssistantRepository::default());
        let service = service_with(assistants.clone(), Some(backend.clone()));
        let assistant = service.create_assistant(draft()).await.expect("create");

        service.delete_assistant(&assistant.id).await.expect("delete");

        assert_eq!(backend.deleted(), vec!["asst_1".to_string()]);
        assert!(assistants.find_by_id(&assistant.id).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn update_saves_locally_when_remote_update_fails() {
        let backend = Arc::new(ScriptedBackend { fail_update_assistant: true, ..Default::default() });
        let service =
            service_with(Arc::new(InMemoryAssistantRepository::default()), Some(backend));
        let assistant = service.create_assistant(draft()).await.expect("create");

        let updated = service
            .update_assistant(
                &assistant.id,
                AssistantPatch { name: Some("Tanker Analyst".to_string()), ..Default::default() },
            )
            .await
            .expect("update");

        assert_eq!(updated.name, "Tanker Analyst");
        assert_eq!(service.get_assistant(&assistant.id).await.expect("get").name, "Tanker Analyst");
    }

    #[tokio::test]
    async fn compile_to_assistant_links_the_agent() {
        let backend = Arc::new(ScriptedBackend::default());
        let service =
            service_with(Arc::new(InMemoryAssistantRepository::default()), Some(backend));
        let agent = service
            .create_agent(AgentDraft {
                name: "Arrival Notifier".to_string(),
                system_prompt: "Notify brokers when vessels arrive.".to_string(),
                triggers: vec!["vessel_arrived".to_string()],
                ..AgentDraft::default()
            })
            .await
            .expect("create agent");

        let assistant = service.compile_to_assistant(&agent.id).await.expect("compile");

        assert_eq!(assistant.instructions, "Notify brokers when vessels arrive.");
        let linked = service.get_agent(&agent.id).await.expect("agent");
        assert_eq!(linked.linked_assistant_id, Some(assistant.id));
    }

    #[tokio::test]
    async fn agent_validation_and_missing_rows() {
        let service = service_with(Arc::new(InMemoryAssistantRepository::default()), None);

        let invalid = service.create_agent(AgentDraft::default()).await.expect_err("invalid");
        assert_eq!(invalid.itemized().len(), 2);

        let missing = service.delete_agent(&AgentId("ghost".to_string())).await;
        assert!(matches!(missing, Err(ApplicationError::NotFound(_))));
    }
}
