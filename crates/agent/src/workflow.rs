use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use agentforge_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use agentforge_core::domain::events::{self, TriggerEvent, MANUAL_EVENT};
use agentforge_core::domain::execution::{Execution, ExecutionId, ExecutionSource};
use agentforge_core::domain::workflow::{Workflow, WorkflowDraft, WorkflowId, WorkflowPatch};
use agentforge_core::errors::ApplicationError;
use agentforge_db::repositories::{ExecutionRepository, WorkflowRepository};

use crate::events::ExecutionEvents;
use crate::executor::WorkflowExecutor;

const DEFAULT_EXECUTION_PAGE: u32 = 20;
const MAX_EXECUTION_PAGE: u32 = 100;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DispatchSummary {
    pub workflows_triggered: usize,
    pub execution_ids: Vec<String>,
}

/// Workflow definitions plus the trigger side of their executions.
#[derive(Clone)]
pub struct WorkflowService {
    workflows: Arc<dyn WorkflowRepository>,
    executions: Arc<dyn ExecutionRepository>,
    executor: WorkflowExecutor,
    events: ExecutionEvents,
    audit: Arc<dyn AuditSink>,
}

impl WorkflowService {
    pub fn new(
        workflows: Arc<dyn WorkflowRepository>,
        executions: Arc<dyn ExecutionRepository>,
        executor: WorkflowExecutor,
        events: ExecutionEvents,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { workflows, executions, executor, events, audit }
    }

    pub fn events(&self) -> &ExecutionEvents {
        &self.events
    }

    pub async fn create_workflow(&self, draft: WorkflowDraft) -> Result<Workflow, ApplicationError> {
        let missing = draft.missing_fields();
        if !missing.is_empty() {
            return Err(ApplicationError::Validation { errors: missing });
        }

        let workflow = draft.into_workflow(WorkflowId(Uuid::new_v4().to_string()), Utc::now());
        self.workflows.save(workflow.clone()).await?;
        info!(
            event_name = "agent.workflow.created",
            workflow_id = %workflow.id.0,
            trigger_event = %workflow.trigger_event,
            steps = workflow.steps.len(),
            "workflow created"
        );
        self.emit(&workflow.id, "workflow.created");
        Ok(workflow)
    }

    pub async fn update_workflow(
        &self,
        id: &WorkflowId,
        patch: WorkflowPatch,
    ) -> Result<Workflow, ApplicationError> {
        let stored = self.get_workflow(id).await?;
        let workflow = patch.apply(stored, Utc::now());
        if workflow.name.trim().is_empty() || workflow.trigger_event.trim().is_empty() {
            return Err(ApplicationError::validation("workflow name and trigger_event cannot be blank"));
        }
        self.workflows.save(workflow.clone()).await?;
        info!(
            event_name = "agent.workflow.updated",
            workflow_id = %workflow.id.0,
            version = workflow.version,
            "workflow updated"
        );
        self.emit(&workflow.id, "workflow.updated");
        Ok(workflow)
    }

    pub async fn delete_workflow(&self, id: &WorkflowId) -> Result<(), ApplicationError> {
        if !self.workflows.delete(id).await? {
            return Err(ApplicationError::NotFound(format!("workflow {}", id.0)));
        }
        info!(event_name = "agent.workflow.deleted", workflow_id = %id.0, "workflow deleted");
        self.emit(id, "workflow.deleted");
        Ok(())
    }

    pub async fn get_workflow(&self, id: &WorkflowId) -> Result<Workflow, ApplicationError> {
        self.workflows
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("workflow {}", id.0)))
    }

    /// Records a pending execution and hands it to the executor in the
    /// background. The returned row is always `pending` with no steps.
    pub async fn trigger(
        &self,
        workflow_id: &WorkflowId,
        event: Option<&str>,
        data: Value,
    ) -> Result<Execution, ApplicationError> {
        let workflow = self.get_workflow(workflow_id).await?;
        self.start(&workflow, event.unwrap_or(MANUAL_EVENT), data, ExecutionSource::Workflow).await
    }

    /// Webhook entry: fans an event out to every active workflow listening
    /// for it. Unknown events trigger nothing.
    pub async fn dispatch_event(
        &self,
        event: &str,
        data: Value,
    ) -> Result<DispatchSummary, ApplicationError> {
        if !events::is_dispatchable(event) {
            info!(event_name = "agent.workflow.event_ignored", event = %event, "event is not registered");
            return Ok(DispatchSummary::default());
        }

        let listeners = self.workflows.list_active_by_trigger(event).await?;
        let mut summary = DispatchSummary::default();
        for workflow in &listeners {
            match self.start(workflow, event, data.clone(), ExecutionSource::Event).await {
                Ok(execution) => {
                    summary.workflows_triggered += 1;
                    summary.execution_ids.push(execution.id.0);
                }
                Err(error) => warn!(
                    event_name = "agent.workflow.dispatch_skipped",
                    workflow_id = %workflow.id.0,
                    error = %error,
                    "workflow could not be triggered"
                ),
            }
        }
        info!(
            event_name = "agent.workflow.event_dispatched",
            event = %event,
            listeners = listeners.len(),
            triggered = summary.workflows_triggered,
            "event dispatched"
        );
        Ok(summary)
    }

    pub async fn get_execution(&self, id: &ExecutionId) -> Result<Execution, ApplicationError> {
        self.executions
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("execution {}", id.0)))
    }

    pub async fn list_executions(
        &self,
        workflow_id: &WorkflowId,
        limit: Option<u32>,
    ) -> Result<Vec<Execution>, ApplicationError> {
        let limit = limit.unwrap_or(DEFAULT_EXECUTION_PAGE).clamp(1, MAX_EXECUTION_PAGE);
        Ok(self.executions.list_for_workflow(workflow_id, limit).await?)
    }

    pub fn event_registry(&self) -> Vec<TriggerEvent> {
        events::registry()
    }

    async fn start(
        &self,
        workflow: &Workflow,
        event: &str,
        data: Value,
        source: ExecutionSource,
    ) -> Result<Execution, ApplicationError> {
        let execution = Execution::pending(
            ExecutionId(Uuid::new_v4().to_string()),
            Some(workflow.id.clone()),
            source,
            event,
            data,
            Utc::now(),
        );
        self.executions.insert(execution.clone()).await?;
        self.events.publish(&execution);
        info!(
            event_name = "agent.workflow.triggered",
            workflow_id = %workflow.id.0,
            execution_id = %execution.id.0,
            trigger_event = %event,
            "workflow execution queued"
        );

        let executor = self.executor.clone();
        let execution_id = execution.id.clone();
        tokio::spawn(async move {
            if let Err(error) = executor.run(&execution_id).await {
                warn!(
                    event_name = "agent.workflow.execution_aborted",
                    execution_id = %execution_id.0,
                    error_class = error.error_class(),
                    error = %error,
                    "background execution did not finish"
                );
            }
        });

        Ok(execution)
    }

    fn emit(&self, workflow_id: &WorkflowId, event_type: &str) {
        self.audit.emit(AuditEvent::new(
            Some(workflow_id.0.clone()),
            "workflow",
            event_type,
            AuditCategory::Workflow,
            "system",
            AuditOutcome::Success,
        ));
    }
}
