use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const SECTIONS: [&str; 4] = ["assistants", "sdk_agents", "tools", "workflows"];

const ASSISTANT_REQUIRED: [&str; 2] = ["name", "instructions"];
// `triggers` is reported by the event-driven check below, never twice.
const AGENT_REQUIRED: [&str; 3] = ["name", "responsibility", "tools"];
const TOOL_REQUIRED: [&str; 3] = ["name", "type", "function_name"];
// `steps` is reported by the at-least-one-step check below.
const WORKFLOW_REQUIRED: [&str; 2] = ["name", "trigger"];

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self { valid: errors.is_empty(), errors }
    }
}

/// Checks a Blueprint document and reports every violation found.
///
/// Order: section presence and array-typedness, then per-entity required
/// fields, then the cross-cutting rules for each entity kind.
pub fn validate(blueprint: &Value) -> ValidationReport {
    let mut errors = Vec::new();

    for section in SECTIONS {
        let value = blueprint.get(section);
        if is_missing(value) {
            errors.push(format!("Missing required field: {section}"));
        } else if !value.is_some_and(Value::is_array) {
            errors.push(format!("Field {section} must be an array"));
        }
    }

    for (index, assistant) in entries(blueprint, "assistants") {
        require(&mut errors, "Assistant", index, assistant, &ASSISTANT_REQUIRED);
        if length_of(assistant.and_then(|entry| entry.get("triggers"))) > 0 {
            errors.push(format!("Assistant[{index}] must not have triggers (chat/analysis only)"));
        }
    }

    for (index, agent) in entries(blueprint, "sdk_agents") {
        require(&mut errors, "SDK Agent", index, agent, &AGENT_REQUIRED);
        if length_of(agent.and_then(|entry| entry.get("triggers"))) == 0 {
            errors.push(format!("SDK Agent[{index}] must have at least one trigger (event-driven)"));
        }
    }

    for (index, tool) in entries(blueprint, "tools") {
        require(&mut errors, "Tool", index, tool, &TOOL_REQUIRED);
        if length_of(tool.and_then(|entry| entry.get("used_by"))) == 0 {
            errors.push(format!("Tool[{index}] must specify which agents use it (used_by)"));
        }
    }

    for (index, workflow) in entries(blueprint, "workflows") {
        require(&mut errors, "Workflow", index, workflow, &WORKFLOW_REQUIRED);
        if length_of(workflow.and_then(|entry| entry.get("steps"))) == 0 {
            errors.push(format!("Workflow[{index}] must have at least one step"));
        }
    }

    ValidationReport::from_errors(errors)
}

/// Entries of an array section. Non-object entries yield `None` so every
/// field on them reads as missing.
fn entries<'a>(
    blueprint: &'a Value,
    section: &str,
) -> impl Iterator<Item = (usize, Option<&'a Map<String, Value>>)> {
    blueprint
        .get(section)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(Value::as_object)
        .enumerate()
}

fn require(
    errors: &mut Vec<String>,
    kind: &str,
    index: usize,
    entry: Option<&Map<String, Value>>,
    fields: &[&str],
) {
    for field in fields {
        if is_missing(entry.and_then(|entry| entry.get(*field))) {
            errors.push(format!("{kind}[{index}] missing required field: {field}"));
        }
    }
}

/// Absent, null, false, zero and the empty string all count as missing.
/// Empty arrays and objects are present.
fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Bool(flag)) => !flag,
        Some(Value::String(text)) => text.is_empty(),
        Some(Value::Number(number)) => number.as_f64() == Some(0.0),
        Some(Value::Array(_)) | Some(Value::Object(_)) => false,
    }
}

fn length_of(value: Option<&Value>) -> usize {
    match value {
        Some(Value::Array(items)) => items.len(),
        Some(Value::String(text)) => text.chars().count(),
        _ => 0,
    }
}
