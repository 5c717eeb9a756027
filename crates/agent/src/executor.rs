//! Tool invocation and workflow step execution.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tera::{Context, Tera};
use tracing::{info, warn};
use uuid::Uuid;

use agentforge_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use agentforge_core::domain::execution::{
    Execution, ExecutionId, ExecutionSource, ExecutionStatus, StepStatus, StepTrace,
};
use agentforge_core::domain::tool::{Tool, ToolId, ToolRunStatus};
use agentforge_core::domain::workflow::{StepKind, WorkflowStep};
use agentforge_core::errors::{ApplicationError, DomainError};
use agentforge_core::steps::{evaluate_condition, merge_parameters, plan_action, ActionDecision, ActionKind};
use agentforge_db::repositories::{ActionWriter, ExecutionRepository, WorkflowRepository};

use crate::backend::BackendError;
use crate::events::ExecutionEvents;
use crate::functions::FunctionInvoker;
use crate::llm::{ChatModel, ChatRequest};
use crate::registry::ToolRegistry;

pub const TOOL_TEST_EVENT: &str = "tool_test";
const DEFAULT_AI_PROMPT: &str = "Analyze the provided data and suggest next steps.";
const AI_STEP_SYSTEM_PROMPT: &str =
    "You are an AI agent executing a workflow step. Analyze the context and provide a structured response.";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolRunResult {
    pub success: bool,
    pub tool_name: String,
    pub function_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

impl ToolRunResult {
    /// Payload handed back to a hosted assistant for one tool call.
    pub fn into_output(self) -> Value {
        match (self.success, self.result, self.error) {
            (true, Some(result), _) => result,
            (true, None, _) => Value::Null,
            (false, _, error) => json!({"error": error.unwrap_or_default()}),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Invokes a registered tool once, updates its statistics and leaves an
/// audit execution behind. Never retries.
#[derive(Clone)]
pub struct ToolExecutor {
    registry: ToolRegistry,
    executions: Arc<dyn ExecutionRepository>,
    invoker: Option<Arc<dyn FunctionInvoker>>,
    audit: Arc<dyn AuditSink>,
}

impl ToolExecutor {
    pub fn new(
        registry: ToolRegistry,
        executions: Arc<dyn ExecutionRepository>,
        invoker: Option<Arc<dyn FunctionInvoker>>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { registry, executions, invoker, audit }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    fn invoker(&self) -> Result<&Arc<dyn FunctionInvoker>, ApplicationError> {
        self.invoker.as_ref().ok_or_else(|| {
            ApplicationError::Configuration(
                "functions.base_url and functions.service_key are not configured".to_string(),
            )
        })
    }

    pub async fn execute(
        &self,
        tool_id: &ToolId,
        parameters: Value,
    ) -> Result<ToolRunResult, ApplicationError> {
        self.invoker()?;
        let tool = self.registry.get(tool_id).await?;
        self.execute_tool(tool, parameters).await
    }

    pub async fn execute_tool(
        &self,
        tool: Tool,
        parameters: Value,
    ) -> Result<ToolRunResult, ApplicationError> {
        let invoker = self.invoker()?;
        let started_at = Utc::now();
        let clock = Instant::now();
        let outcome = invoker.invoke(&tool.function_name, &parameters).await;
        let execution_time_ms = elapsed_ms(clock);

        let (status, result, error) = match outcome {
            Ok(result) => (ToolRunStatus::Success, Some(result), None),
            Err(BackendError::Status { body, .. }) => (ToolRunStatus::Error, None, Some(body)),
            Err(other) => (ToolRunStatus::Error, None, Some(other.to_string())),
        };

        self.registry.record_execution(&tool.id, status, execution_time_ms).await?;
        self.record_audit(
            &tool,
            &parameters,
            started_at,
            execution_time_ms,
            result.as_ref(),
            error.as_deref(),
        )
        .await;

        info!(
            event_name = "agent.tool.executed",
            tool_id = %tool.id.0,
            function_name = %tool.function_name,
            status = status.as_str(),
            duration_ms = execution_time_ms,
            "tool executed"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(tool.id.0.clone()),
                tool.id.0.clone(),
                "tool.executed",
                AuditCategory::Registry,
                "system",
                if error.is_none() { AuditOutcome::Success } else { AuditOutcome::Failed },
            )
            .with_metadata("function_name", tool.function_name.clone())
            .with_metadata("duration_ms", execution_time_ms.to_string()),
        );

        Ok(ToolRunResult {
            success: error.is_none(),
            tool_name: tool.name,
            function_name: tool.function_name,
            result,
            error,
            execution_time_ms,
        })
    }

    async fn record_audit(
        &self,
        tool: &Tool,
        parameters: &Value,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        result: Option<&Value>,
        error: Option<&str>,
    ) {
        let mut execution = Execution::pending(
            ExecutionId(Uuid::new_v4().to_string()),
            None,
            ExecutionSource::ToolTest,
            TOOL_TEST_EVENT,
            json!({"tool_id": tool.id.0, "parameters": parameters}),
            started_at,
        );
        let now = Utc::now();
        let trace = StepTrace {
            step: 1,
            node_type: StepKind::Tool,
            label: tool.name.clone(),
            status: if error.is_none() { StepStatus::Completed } else { StepStatus::Failed },
            duration_ms,
            error: error.map(str::to_string),
            result: Some(
                result.cloned().unwrap_or_else(|| json!({"error": error.unwrap_or_default()})),
            ),
            completed_at: now,
        };

        let transitioned = execution.start().and_then(|()| execution.record_step(trace)).and_then(
            |()| match error {
                None => execution.complete(now),
                Some(message) => execution.fail(message, now),
            },
        );
        if let Err(error) = transitioned {
            warn!(tool_id = %tool.id.0, error = %error, "tool audit execution could not be built");
            return;
        }
        if let Err(error) = self.executions.insert(execution).await {
            warn!(tool_id = %tool.id.0, error = %error, "tool audit execution was not stored");
        }
    }
}

/// Runs the steps of one claimed workflow execution.
#[derive(Clone)]
pub struct WorkflowExecutor {
    workflows: Arc<dyn WorkflowRepository>,
    executions: Arc<dyn ExecutionRepository>,
    actions: Arc<dyn ActionWriter>,
    invoker: Option<Arc<dyn FunctionInvoker>>,
    chat: Option<Arc<dyn ChatModel>>,
    events: ExecutionEvents,
    action_tables: Vec<String>,
    ai_model: String,
}

impl WorkflowExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workflows: Arc<dyn WorkflowRepository>,
        executions: Arc<dyn ExecutionRepository>,
        actions: Arc<dyn ActionWriter>,
        invoker: Option<Arc<dyn FunctionInvoker>>,
        chat: Option<Arc<dyn ChatModel>>,
        events: ExecutionEvents,
        action_tables: Vec<String>,
        ai_model: impl Into<String>,
    ) -> Self {
        Self {
            workflows,
            executions,
            actions,
            invoker,
            chat,
            events,
            action_tables,
            ai_model: ai_model.into(),
        }
    }

    /// Claims a pending execution and runs it to a terminal status. A failing
    /// step fails the execution; steps recorded before it are kept. Any other
    /// error that stops the run early still leaves the stored row failed.
    pub async fn run(&self, execution_id: &ExecutionId) -> Result<Execution, ApplicationError> {
        match self.drive(execution_id).await {
            Ok(execution) => Ok(execution),
            Err(error) => {
                self.abandon(execution_id, &error).await;
                Err(error)
            }
        }
    }

    async fn abandon(&self, execution_id: &ExecutionId, cause: &ApplicationError) {
        let mut execution = match self.executions.find_by_id(execution_id).await {
            Ok(Some(execution)) if !execution.status.is_terminal() => execution,
            Ok(_) => return,
            Err(error) => {
                warn!(execution_id = %execution_id.0, error = %error, "execution reload failed");
                return;
            }
        };

        if execution.status == ExecutionStatus::Pending {
            if let Err(error) = self.advance(&mut execution, |execution| execution.start()).await {
                warn!(execution_id = %execution_id.0, error = %error, "could not claim abandoned execution");
                return;
            }
        }
        let message = cause.to_string();
        let failed = self
            .advance(&mut execution, |execution| execution.fail(message.clone(), Utc::now()))
            .await;
        match failed {
            Ok(()) => warn!(
                event_name = "agent.workflow.execution_failed",
                execution_id = %execution_id.0,
                error_class = cause.error_class(),
                error = %message,
                "workflow execution abandoned"
            ),
            Err(error) => {
                warn!(execution_id = %execution_id.0, error = %error, "could not mark execution failed")
            }
        }
    }

    async fn advance(
        &self,
        execution: &mut Execution,
        transition: impl FnOnce(&mut Execution) -> Result<(), DomainError>,
    ) -> Result<(), ApplicationError> {
        transition(execution)?;
        self.persist(execution).await
    }

    async fn drive(&self, execution_id: &ExecutionId) -> Result<Execution, ApplicationError> {
        let mut execution = self
            .executions
            .find_by_id(execution_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("execution {}", execution_id.0)))?;
        let workflow_id = execution.workflow_id.clone().ok_or_else(|| {
            ApplicationError::validation(format!("execution {} has no workflow", execution_id.0))
        })?;
        let workflow = self
            .workflows
            .find_by_id(&workflow_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("workflow {}", workflow_id.0)))?;

        execution.start()?;
        self.persist(&execution).await?;
        info!(
            event_name = "agent.workflow.execution_started",
            execution_id = %execution.id.0,
            workflow_id = %workflow.id.0,
            steps = workflow.steps.len(),
            "workflow execution started"
        );

        for step in workflow.ordered_steps() {
            let clock = Instant::now();
            let outcome = self.run_step(&step, &execution).await;
            let duration_ms = elapsed_ms(clock);
            let now = Utc::now();

            match outcome {
                Ok(result) => {
                    execution.record_step(StepTrace {
                        step: step.step,
                        node_type: step.kind,
                        label: step.label(),
                        status: StepStatus::Completed,
                        duration_ms,
                        error: None,
                        result: Some(result),
                        completed_at: now,
                    })?;
                    self.persist(&execution).await?;
                }
                Err(message) => {
                    execution.record_step(StepTrace {
                        step: step.step,
                        node_type: step.kind,
                        label: step.label(),
                        status: StepStatus::Failed,
                        duration_ms,
                        error: Some(message.clone()),
                        result: None,
                        completed_at: now,
                    })?;
                    execution.fail(message.clone(), now)?;
                    self.persist(&execution).await?;
                    warn!(
                        event_name = "agent.workflow.execution_failed",
                        execution_id = %execution.id.0,
                        step = step.step,
                        error = %message,
                        "workflow step failed"
                    );
                    return Ok(execution);
                }
            }
        }

        execution.complete(Utc::now())?;
        self.persist(&execution).await?;
        info!(
            event_name = "agent.workflow.execution_completed",
            execution_id = %execution.id.0,
            duration_ms = execution.execution_time_ms.unwrap_or_default(),
            "workflow execution completed"
        );
        Ok(execution)
    }

    async fn persist(&self, execution: &Execution) -> Result<(), ApplicationError> {
        if !self.executions.update_guarded(execution).await? {
            return Err(ApplicationError::ExecutionFailure(format!(
                "execution {} cannot move to {}",
                execution.id.0,
                execution.status.as_str()
            )));
        }
        self.events.publish(execution);
        Ok(())
    }

    async fn run_step(&self, step: &WorkflowStep, execution: &Execution) -> Result<Value, String> {
        let trigger_data = &execution.trigger_data;
        match step.kind {
            StepKind::Tool => self.run_tool(&step.config, trigger_data).await,
            StepKind::Condition => Ok(evaluate_condition(
                step.config.get("condition").and_then(Value::as_str),
                trigger_data,
            )),
            StepKind::Ai => self.run_ai(&step.config, execution).await,
            StepKind::Action => self.run_action(&step.config, trigger_data).await,
        }
    }

    async fn run_tool(&self, config: &Value, trigger_data: &Value) -> Result<Value, String> {
        let function_name = config
            .get("function_name")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| "No function_name specified for tool step".to_string())?;
        let invoker = self
            .invoker
            .as_ref()
            .ok_or_else(|| "function host credentials are not configured".to_string())?;

        let payload = merge_parameters(config.get("parameters"), trigger_data);
        invoker.invoke(function_name, &payload).await.map_err(|error| match error {
            BackendError::Status { body, .. } => format!("Tool {function_name} failed: {body}"),
            other => format!("Tool {function_name} failed: {other}"),
        })
    }

    async fn run_ai(&self, config: &Value, execution: &Execution) -> Result<Value, String> {
        let chat = self
            .chat
            .as_ref()
            .ok_or_else(|| "assistants.api_key is not configured".to_string())?;

        let template = config.get("prompt").and_then(Value::as_str).unwrap_or(DEFAULT_AI_PROMPT);
        let prompt = render_prompt(template, &execution.trigger_data)?;
        let previous_steps: Vec<Value> = execution
            .steps_completed
            .iter()
            .map(|trace| json!({"label": trace.label, "result": trace.result}))
            .collect();
        let context = json!({
            "trigger_data": execution.trigger_data,
            "previous_steps": previous_steps,
        });
        let pretty = serde_json::to_string_pretty(&context).map_err(|error| error.to_string())?;

        let model = config
            .get("model")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.ai_model.clone());
        let completion = chat
            .complete(ChatRequest {
                model,
                system: AI_STEP_SYSTEM_PROMPT.to_string(),
                user: format!("{prompt}\n\nContext:\n{pretty}"),
                json_object: false,
            })
            .await
            .map_err(|error| error.to_string())?;

        Ok(json!({
            "response": completion.content,
            "model": completion.model,
            "usage": completion.usage,
        }))
    }

    async fn run_action(&self, config: &Value, trigger_data: &Value) -> Result<Value, String> {
        let plan = match plan_action(config, trigger_data, &self.action_tables)? {
            ActionDecision::Skip { action } => {
                return Ok(json!({"action": action, "skipped": true, "reason": "Unknown action type"}))
            }
            ActionDecision::Run(plan) => plan,
        };
        let affected = self.actions.apply(&plan).await.map_err(|error| error.to_string())?;
        let mut result = json!({"action": plan.kind.as_str(), "table": plan.table, "affected": affected});
        if plan.kind == ActionKind::Delete {
            result["success"] = json!(true);
        }
        Ok(result)
    }
}

/// Prompts containing template syntax are rendered against the trigger data.
fn render_prompt(template: &str, trigger_data: &Value) -> Result<String, String> {
    if !template.contains("{{") && !template.contains("{%") {
        return Ok(template.to_string());
    }
    let context = match trigger_data {
        Value::Object(_) => Context::from_value(trigger_data.clone()).map_err(|error| error.to_string())?,
        _ => Context::new(),
    };
    Tera::one_off(template, &context, false)
        .map_err(|error| format!("prompt template could not be rendered: {error}"))
}
