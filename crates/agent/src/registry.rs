use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use agentforge_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use agentforge_core::domain::tool::{Tool, ToolDraft, ToolId, ToolRunStatus, BUILTIN_TOOLS};
use agentforge_core::errors::ApplicationError;
use agentforge_db::repositories::ToolRepository;

#[derive(Clone, Debug, Serialize)]
pub struct Discovery {
    pub tools: Vec<Tool>,
    pub discovered: usize,
}

/// Catalog of invocable tools.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<dyn ToolRepository>,
    audit: Arc<dyn AuditSink>,
}

impl ToolRegistry {
    pub fn new(tools: Arc<dyn ToolRepository>, audit: Arc<dyn AuditSink>) -> Self {
        Self { tools, audit }
    }

    /// Upserts every built-in function and returns the whole catalog.
    /// Running it again refreshes metadata without duplicating rows.
    pub async fn discover(&self) -> Result<Discovery, ApplicationError> {
        let now = Utc::now();
        for builtin in BUILTIN_TOOLS {
            let tool = builtin.draft().into_tool(new_tool_id(), true, now);
            self.tools.upsert_builtin(tool).await?;
        }

        let tools = self.tools.list().await?;
        info!(
            event_name = "agent.registry.discovered",
            builtin = BUILTIN_TOOLS.len(),
            catalog = tools.len(),
            "built-in tools discovered"
        );
        self.audit.emit(
            AuditEvent::new(
                None,
                "registry",
                "registry.discover",
                AuditCategory::Registry,
                "system",
                AuditOutcome::Success,
            )
            .with_metadata("discovered", BUILTIN_TOOLS.len().to_string()),
        );
        Ok(Discovery { tools, discovered: BUILTIN_TOOLS.len() })
    }

    pub async fn add(&self, draft: ToolDraft) -> Result<Tool, ApplicationError> {
        let missing = draft.missing_fields();
        if !missing.is_empty() {
            return Err(ApplicationError::Validation { errors: missing });
        }

        let tool = draft.into_tool(new_tool_id(), false, Utc::now());
        self.tools.insert(tool.clone()).await?;
        info!(
            event_name = "agent.registry.tool_added",
            tool_id = %tool.id.0,
            function_name = %tool.function_name,
            "custom tool registered"
        );
        Ok(tool)
    }

    pub async fn get(&self, id: &ToolId) -> Result<Tool, ApplicationError> {
        self.tools
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("tool {}", id.0)))
    }

    pub async fn list(&self) -> Result<Vec<Tool>, ApplicationError> {
        Ok(self.tools.list().await?)
    }

    /// Looks a tool up by the name a hosted assistant calls it by.
    pub async fn find_by_remote_name(&self, name: &str) -> Result<Option<Tool>, ApplicationError> {
        if let Some(tool) = self.tools.find_by_function_name(name).await? {
            return Ok(Some(tool));
        }
        let tools = self.tools.list().await?;
        Ok(tools.into_iter().find(|tool| tool.remote_function_name() == name))
    }

    pub async fn record_execution(
        &self,
        id: &ToolId,
        status: ToolRunStatus,
        duration_ms: u64,
    ) -> Result<(), ApplicationError> {
        let matched = self.tools.record_execution(id, status, duration_ms, Utc::now()).await?;
        if !matched {
            return Err(ApplicationError::NotFound(format!("tool {}", id.0)));
        }
        Ok(())
    }
}

fn new_tool_id() -> ToolId {
    ToolId(Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agentforge_core::audit::{InMemoryAuditSink, NoopAuditSink};
    use agentforge_core::domain::tool::{ToolDraft, ToolId, ToolRunStatus, BUILTIN_TOOLS};
    use agentforge_core::errors::ApplicationError;
    use agentforge_db::repositories::InMemoryToolRepository;

    use super::ToolRegistry;

    fn registry() -> ToolRegistry {
        ToolRegistry::new(Arc::new(InMemoryToolRepository::default()), Arc::new(NoopAuditSink))
    }

    fn draft(name: &str, function_name: &str) -> ToolDraft {
        ToolDraft {
            name: name.to_string(),
            function_name: function_name.to_string(),
            ..ToolDraft::default()
        }
    }

    #[tokio::test]
    async fn discover_twice_keeps_catalog_size() {
        let audit = InMemoryAuditSink::default();
        let registry =
            ToolRegistry::new(Arc::new(InMemoryToolRepository::default()), Arc::new(audit.clone()));

        let first = registry.discover().await.expect("first discover");
        let second = registry.discover().await.expect("second discover");

        assert_eq!(first.tools.len(), BUILTIN_TOOLS.len());
        assert_eq!(second.tools.len(), first.tools.len());
        assert_eq!(second.discovered, BUILTIN_TOOLS.len());
        assert_eq!(first.tools[0].id, second.tools[0].id);
        assert_eq!(audit.events().len(), 2);
    }

    #[tokio::test]
    async fn add_defaults_category_and_endpoint() {
        let registry = registry();
        let tool = registry.add(draft("Port Congestion", "port-congestion")).await.expect("add");

        assert_eq!(tool.category, "custom");
        assert_eq!(tool.endpoint_path, "/functions/v1/port-congestion");
        assert!(!tool.is_system);
        assert_eq!(registry.get(&tool.id).await.expect("get").name, "Port Congestion");
    }

    #[tokio::test]
    async fn add_rejects_blank_fields_and_duplicates() {
        let registry = registry();

        let blank = registry.add(draft(" ", "")).await.expect_err("blank draft");
        assert_eq!(blank.itemized().len(), 2);

        registry.add(draft("Port Congestion", "port-congestion")).await.expect("first add");
        let duplicate =
            registry.add(draft("Congestion Copy", "port-congestion")).await.expect_err("duplicate");
        assert_eq!(duplicate.error_class(), "validation");
    }

    #[tokio::test]
    async fn running_mean_over_three_recordings() {
        let registry = registry();
        let tool = registry.add(draft("Route Planner", "route-planner")).await.expect("add");

        for duration in [100, 200, 300] {
            registry
                .record_execution(&tool.id, ToolRunStatus::Success, duration)
                .await
                .expect("record");
        }

        let stored = registry.get(&tool.id).await.expect("get");
        assert_eq!(stored.execution_count, 3);
        assert!((stored.avg_execution_time_ms - 200.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let registry = registry();
        let missing = ToolId("missing".to_string());

        assert!(matches!(registry.get(&missing).await, Err(ApplicationError::NotFound(_))));
        assert!(matches!(
            registry.record_execution(&missing, ToolRunStatus::Error, 5).await,
            Err(ApplicationError::NotFound(_))
        ));
    }
}
