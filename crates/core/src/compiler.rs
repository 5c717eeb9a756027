//! Compile planning: turns one Blueprint entry into a runtime entity draft.
//!
//! Planning is pure. It always re-validates the document it is given, so a
//! Blueprint edited after an earlier validation is judged on its current
//! content.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::blueprint::{find_tool, validate, AgentSpec, AssistantSpec, Blueprint};
use crate::domain::agent::AgentDraft;
use crate::domain::assistant::{AssistantDraft, ToolRef};
use crate::errors::ApplicationError;

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const KNOWN_MODELS: [&str; 5] = ["gpt-4o", "gpt-4o-mini", "gpt-4-turbo", "gpt-4", "gpt-3.5-turbo"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileTarget {
    Assistant,
    SdkAgent,
}

impl CompileTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assistant => "assistant",
            Self::SdkAgent => "sdk_agent",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Assistant => "Assistant",
            Self::SdkAgent => "SDK Agent",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PlannedEntity {
    Assistant(AssistantDraft),
    Agent(AgentDraft),
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompilePlan {
    pub target: CompileTarget,
    pub entity: PlannedEntity,
    /// Agent tool references that matched no declared tool and were stubbed.
    pub unresolved_tools: Vec<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("blueprint is invalid: {}", .0.join("; "))]
    Invalid(Vec<String>),
    #[error("{target} at index {index} not found")]
    IndexOutOfRange { target: &'static str, index: usize },
    #[error("blueprint could not be decoded: {0}")]
    Malformed(String),
}

impl From<CompileError> for ApplicationError {
    fn from(error: CompileError) -> Self {
        match error {
            CompileError::Invalid(errors) => ApplicationError::Validation { errors },
            CompileError::IndexOutOfRange { .. } => ApplicationError::NotFound(error.to_string()),
            CompileError::Malformed(_) => ApplicationError::validation(error.to_string()),
        }
    }
}

/// Maps a requested model name onto one the hosted backend accepts.
/// Unrecognized names degrade to [`DEFAULT_MODEL`] instead of failing.
pub fn normalize_model(model: Option<&str>) -> String {
    let Some(model) = model else {
        return DEFAULT_MODEL.to_string();
    };
    let normalized = model.trim().to_ascii_lowercase();
    if KNOWN_MODELS.contains(&normalized.as_str()) {
        return normalized;
    }
    if normalized.contains("gpt-4") && normalized.contains("mini") {
        return "gpt-4o-mini".to_string();
    }
    if normalized.contains("gpt-4") {
        return "gpt-4o".to_string();
    }
    if normalized.contains("gpt-3") {
        return "gpt-3.5-turbo".to_string();
    }
    DEFAULT_MODEL.to_string()
}

pub fn plan(
    blueprint: &Value,
    target: CompileTarget,
    index: usize,
) -> Result<CompilePlan, CompileError> {
    let report = validate(blueprint);
    if !report.valid {
        return Err(CompileError::Invalid(report.errors));
    }

    let missing = CompileError::IndexOutOfRange { target: target.label(), index };
    let malformed = |error: serde_json::Error| CompileError::Malformed(error.to_string());

    match target {
        CompileTarget::Assistant => {
            let spec: AssistantSpec =
                Blueprint::entry(blueprint, "assistants", index).ok_or(missing)?.map_err(malformed)?;
            let draft = AssistantDraft {
                name: spec.name,
                description: spec.description,
                instructions: spec.instructions,
                model: Some(normalize_model(spec.model.as_deref())),
                tools: spec.platform_tools,
                file_search: spec.file_search,
                code_interpreter: spec.code_interpreter,
                created_by: None,
            };
            Ok(CompilePlan { target, entity: PlannedEntity::Assistant(draft), unresolved_tools: Vec::new() })
        }
        CompileTarget::SdkAgent => {
            let spec: AgentSpec =
                Blueprint::entry(blueprint, "sdk_agents", index).ok_or(missing)?.map_err(malformed)?;
            let declared = Blueprint::declared_tools(blueprint);
            let mut unresolved_tools = Vec::new();
            let tools = spec
                .tools
                .iter()
                .map(|reference| match find_tool(&declared, reference) {
                    Some(tool) => tool.to_ref(),
                    None => {
                        unresolved_tools.push(reference.clone());
                        ToolRef::stub(reference.clone())
                    }
                })
                .collect();
            let draft = AgentDraft {
                name: spec.name,
                description: spec.description,
                system_prompt: spec.responsibility,
                model: Some(normalize_model(spec.model.as_deref())),
                tools,
                triggers: spec.triggers,
                behaviors: spec.behaviors,
                created_by: None,
            };
            Ok(CompilePlan { target, entity: PlannedEntity::Agent(draft), unresolved_tools })
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{normalize_model, plan, CompileError, CompileTarget, PlannedEntity};

    fn blueprint() -> Value {
        json!({
            "assistants": [{"name": "Analyst", "instructions": "Help.", "model": "GPT-4.0 mini"}],
            "sdk_agents": [{
                "name": "Agent1",
                "responsibility": "Send confirmations.",
                "triggers": ["order_created"],
                "tools": ["Send Email", "Ghost Tool"]
            }],
            "tools": [{"name": "Send Email", "type": "email", "function_name": "send-automated-email", "used_by": ["Agent1"]}],
            "workflows": []
        })
    }

    #[test]
    fn model_names_degrade_to_known_values() {
        assert_eq!(normalize_model(None), "gpt-4o");
        assert_eq!(normalize_model(Some(" GPT-4o ")), "gpt-4o");
        assert_eq!(normalize_model(Some("gpt-4.0-mini")), "gpt-4o-mini");
        assert_eq!(normalize_model(Some("gpt-4.1")), "gpt-4o");
        assert_eq!(normalize_model(Some("gpt-3.5")), "gpt-3.5-turbo");
        assert_eq!(normalize_model(Some("claude")), "gpt-4o");
    }

    #[test]
    fn agent_tools_resolve_and_unknown_names_are_stubbed() {
        let plan = plan(&blueprint(), CompileTarget::SdkAgent, 0).expect("plan agent");

        let PlannedEntity::Agent(draft) = plan.entity else {
            panic!("expected agent draft");
        };
        assert_eq!(draft.system_prompt, "Send confirmations.");
        assert_eq!(draft.tools[0].function_name, "send-automated-email");
        assert_eq!(draft.tools[1].function_name, "Ghost Tool");
        assert_eq!(plan.unresolved_tools, vec!["Ghost Tool".to_string()]);
    }

    #[test]
    fn assistant_model_is_normalized() {
        let plan = plan(&blueprint(), CompileTarget::Assistant, 0).expect("plan assistant");
        let PlannedEntity::Assistant(draft) = plan.entity else {
            panic!("expected assistant draft");
        };
        assert_eq!(draft.model.as_deref(), Some("gpt-4o-mini"));
    }

    #[test]
    fn out_of_range_index_is_not_found() {
        let error = plan(&blueprint(), CompileTarget::SdkAgent, 3).expect_err("index 3 missing");
        assert_eq!(error, CompileError::IndexOutOfRange { target: "SDK Agent", index: 3 });
        assert_eq!(error.to_string(), "SDK Agent at index 3 not found");
    }

    #[test]
    fn planning_revalidates_mutated_blueprint() {
        let mut document = blueprint();
        assert!(crate::blueprint::validate(&document).valid);

        document["sdk_agents"][0]["triggers"] = json!([]);

        let error = plan(&document, CompileTarget::SdkAgent, 0).expect_err("now invalid");
        assert_eq!(
            error,
            CompileError::Invalid(vec![
                "SDK Agent[0] must have at least one trigger (event-driven)".to_string()
            ])
        );
    }

    #[test]
    fn any_blueprint_the_validator_accepts_plans() {
        let mut document = blueprint();
        document["assistants"][0]["file_search"] = Value::Null;
        document["sdk_agents"][0]["triggers"] = json!([{"event": "order_created"}]);
        document["workflows"] =
            json!([{"name": "Follow-up", "trigger": {"event": "order_created"}, "steps": [{"step": 1}]}]);
        assert!(crate::blueprint::validate(&document).valid);

        let assistant = plan(&document, CompileTarget::Assistant, 0).expect("assistant plans");
        let PlannedEntity::Assistant(draft) = assistant.entity else {
            panic!("expected assistant draft");
        };
        assert!(!draft.file_search);

        let agent = plan(&document, CompileTarget::SdkAgent, 0).expect("agent plans");
        let PlannedEntity::Agent(draft) = agent.entity else {
            panic!("expected agent draft");
        };
        assert_eq!(draft.triggers, vec!["order_created".to_string()]);
    }
}
