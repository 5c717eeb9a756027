use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::agent::AgentId;
use crate::domain::workflow::{StepKind, WorkflowId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Statuses only move forward: pending -> running -> completed | failed.
    /// A running execution may be re-written as running to append trace entries.
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }

    /// Statuses a row may be in for `self` to be written over it.
    pub fn predecessors(&self) -> &'static [ExecutionStatus] {
        match self {
            Self::Pending => &[],
            Self::Running => &[Self::Pending, Self::Running],
            Self::Completed | Self::Failed => &[Self::Running],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionSource {
    Workflow,
    ToolTest,
    Event,
}

impl ExecutionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Workflow => "workflow",
            Self::ToolTest => "tool_test",
            Self::Event => "event",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "workflow" => Some(Self::Workflow),
            "tool_test" => Some(Self::ToolTest),
            "event" => Some(Self::Event),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
}

/// One entry of an execution's ordered step trace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepTrace {
    pub step: u32,
    pub node_type: StepKind,
    pub label: String,
    pub status: StepStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub workflow_id: Option<WorkflowId>,
    pub agent_id: Option<AgentId>,
    pub source: ExecutionSource,
    pub trigger_event: String,
    pub trigger_data: Value,
    pub status: ExecutionStatus,
    pub steps_completed: Vec<StepTrace>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub execution_time_ms: Option<u64>,
}

impl Execution {
    pub fn pending(
        id: ExecutionId,
        workflow_id: Option<WorkflowId>,
        source: ExecutionSource,
        trigger_event: impl Into<String>,
        trigger_data: Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            workflow_id,
            agent_id: None,
            source,
            trigger_event: trigger_event.into(),
            trigger_data,
            status: ExecutionStatus::Pending,
            steps_completed: Vec::new(),
            error_message: None,
            started_at: now,
            completed_at: None,
            execution_time_ms: None,
        }
    }

    fn transition(&mut self, next: ExecutionStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidExecutionTransition { from: self.status, to: next });
        }
        self.status = next;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), DomainError> {
        self.transition(ExecutionStatus::Running)
    }

    pub fn record_step(&mut self, trace: StepTrace) -> Result<(), DomainError> {
        if self.status != ExecutionStatus::Running {
            return Err(DomainError::InvariantViolation(format!(
                "cannot record step on {} execution",
                self.status.as_str()
            )));
        }
        self.steps_completed.push(trace);
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(ExecutionStatus::Completed)?;
        self.stamp_completion(now);
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(ExecutionStatus::Failed)?;
        self.error_message = Some(message.into());
        self.stamp_completion(now);
        Ok(())
    }

    fn stamp_completion(&mut self, now: DateTime<Utc>) {
        let elapsed = (now - self.started_at).num_milliseconds().max(0);
        self.completed_at = Some(now);
        self.execution_time_ms = Some(elapsed.unsigned_abs());
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;

    use super::{
        Execution, ExecutionId, ExecutionSource, ExecutionStatus, StepStatus, StepTrace,
    };
    use crate::domain::workflow::StepKind;
    use crate::errors::DomainError;

    const ALL: [ExecutionStatus; 4] = [
        ExecutionStatus::Pending,
        ExecutionStatus::Running,
        ExecutionStatus::Completed,
        ExecutionStatus::Failed,
    ];

    #[test]
    fn terminal_statuses_never_transition() {
        for terminal in [ExecutionStatus::Completed, ExecutionStatus::Failed] {
            for next in ALL {
                assert!(!terminal.can_transition_to(next), "{terminal:?} -> {next:?}");
            }
        }
    }

    #[test]
    fn nothing_moves_back_to_pending() {
        for from in ALL {
            assert!(!from.can_transition_to(ExecutionStatus::Pending));
        }
    }

    #[test]
    fn predecessors_agree_with_transition_table() {
        for to in ALL {
            for from in ALL {
                assert_eq!(
                    to.predecessors().contains(&from),
                    from.can_transition_to(to),
                    "{from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn lifecycle_stamps_completion_and_keeps_trace() {
        let started = Utc::now() - Duration::milliseconds(250);
        let mut execution = Execution::pending(
            ExecutionId("exec-1".into()),
            None,
            ExecutionSource::Workflow,
            "manual",
            json!({}),
            started,
        );

        execution.start().expect("pending -> running");
        execution
            .record_step(StepTrace {
                step: 1,
                node_type: StepKind::Tool,
                label: "lookup".into(),
                status: StepStatus::Completed,
                duration_ms: 12,
                error: None,
                result: Some(json!({"ok": true})),
                completed_at: Utc::now(),
            })
            .expect("record step");
        execution.fail("step 2 failed", Utc::now()).expect("running -> failed");

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.steps_completed.len(), 1);
        assert!(execution.execution_time_ms.unwrap_or_default() >= 250);

        let error = execution.start().expect_err("failed -> running rejected");
        assert_eq!(
            error,
            DomainError::InvalidExecutionTransition {
                from: ExecutionStatus::Failed,
                to: ExecutionStatus::Running
            }
        );
    }

    #[test]
    fn status_round_trips_from_storage_encoding() {
        for status in ALL {
            assert_eq!(ExecutionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ExecutionSource::parse("tool_test"), Some(ExecutionSource::ToolTest));
    }
}
