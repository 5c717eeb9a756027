use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Tool,
    Condition,
    Ai,
    Action,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Condition => "condition",
            Self::Ai => "ai",
            Self::Action => "action",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tool" => Some(Self::Tool),
            "condition" => Some(Self::Condition),
            "ai" => Some(Self::Ai),
            "action" => Some(Self::Action),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub step: u32,
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub config: Value,
}

impl WorkflowStep {
    pub fn label(&self) -> String {
        self.label
            .clone()
            .or_else(|| self.config.get("label").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| format!("{} step {}", self.kind.as_str(), self.step))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub description: Option<String>,
    pub trigger_event: String,
    pub steps: Vec<WorkflowStep>,
    pub is_active: bool,
    pub version: u32,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Steps in execution order.
    pub fn ordered_steps(&self) -> Vec<WorkflowStep> {
        let mut steps = self.steps.clone();
        steps.sort_by_key(|step| step.step);
        steps
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub trigger_event: String,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl WorkflowDraft {
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push("Workflow missing required field: name".to_string());
        }
        if self.trigger_event.trim().is_empty() {
            missing.push("Workflow missing required field: trigger_event".to_string());
        }
        missing
    }

    pub fn into_workflow(self, id: WorkflowId, now: DateTime<Utc>) -> Workflow {
        Workflow {
            id,
            name: self.name,
            description: self.description,
            trigger_event: self.trigger_event,
            steps: self.steps,
            is_active: true,
            version: 1,
            created_by: self.created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update; absent fields keep their stored value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub trigger_event: Option<String>,
    #[serde(default)]
    pub steps: Option<Vec<WorkflowStep>>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl WorkflowPatch {
    pub fn apply(self, mut workflow: Workflow, now: DateTime<Utc>) -> Workflow {
        if let Some(name) = self.name {
            workflow.name = name;
        }
        if let Some(description) = self.description {
            workflow.description = Some(description);
        }
        if let Some(trigger_event) = self.trigger_event {
            workflow.trigger_event = trigger_event;
        }
        if let Some(steps) = self.steps {
            workflow.steps = steps;
        }
        if let Some(is_active) = self.is_active {
            workflow.is_active = is_active;
        }
        workflow.version += 1;
        workflow.updated_at = now;
        workflow
    }
}
