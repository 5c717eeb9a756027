//! Pure pieces of workflow step execution: parameter merging, condition
//! evaluation and action planning. Everything that touches the network or
//! the database lives in the agent crate.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Step parameters overlaid with trigger data; trigger keys win.
pub fn merge_parameters(parameters: Option<&Value>, trigger_data: &Value) -> Value {
    let mut merged = parameters.and_then(Value::as_object).cloned().unwrap_or_default();
    if let Some(trigger) = trigger_data.as_object() {
        for (key, value) in trigger {
            merged.insert(key.clone(), value.clone());
        }
    }
    Value::Object(merged)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
}

impl Comparison {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
        }
    }

    // Two-character operators first so `>=` never reads as `>`.
    const ALL: [Comparison; 6] = [Self::Ge, Self::Le, Self::Eq, Self::Ne, Self::Gt, Self::Lt];
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Condition {
    pub field: String,
    pub comparison: Comparison,
    pub value: String,
}

impl Condition {
    /// Parses `<field> <op> <value>`; quotes around the value are dropped.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let field_end = input
            .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
            .unwrap_or(input.len());
        if field_end == 0 {
            return None;
        }
        let (field, rest) = input.split_at(field_end);
        let rest = rest.trim_start();
        let comparison =
            Comparison::ALL.into_iter().find(|comparison| rest.starts_with(comparison.as_str()))?;
        let value = rest[comparison.as_str().len()..]
            .trim()
            .trim_matches(|ch| ch == '"' || ch == '\'')
            .to_string();
        if value.is_empty() {
            return None;
        }
        Some(Self { field: field.to_string(), comparison, value })
    }

    pub fn evaluate(&self, trigger_data: &Value) -> bool {
        let actual = trigger_data.get(&self.field);
        match self.comparison {
            Comparison::Eq => display(actual) == self.value,
            Comparison::Ne => display(actual) != self.value,
            ordered => {
                let (Some(left), Ok(right)) = (numeric(actual), self.value.trim().parse::<f64>())
                else {
                    return false;
                };
                match ordered {
                    Comparison::Gt => left > right,
                    Comparison::Lt => left < right,
                    Comparison::Ge => left >= right,
                    Comparison::Le => left <= right,
                    Comparison::Eq | Comparison::Ne => false,
                }
            }
        }
    }
}

fn display(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

fn numeric(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::String(text) if text.trim().is_empty() => Some(0.0),
        Value::String(text) => text.trim().parse().ok(),
        Value::Null => Some(0.0),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Result payload of a condition step. Absent or unparseable conditions pass.
pub fn evaluate_condition(condition: Option<&str>, trigger_data: &Value) -> Value {
    let Some(raw) = condition.filter(|raw| !raw.trim().is_empty()) else {
        return json!({"result": true, "reason": "No condition specified, defaulting to true"});
    };
    let Some(parsed) = Condition::parse(raw) else {
        return json!({"result": true, "reason": "Invalid condition format"});
    };
    json!({
        "result": parsed.evaluate(trigger_data),
        "field": parsed.field,
        "operator": parsed.comparison.as_str(),
        "value": parsed.value,
        "field_value": trigger_data.get(&parsed.field).cloned().unwrap_or(Value::Null),
    })
}

/// Replaces `{{field}}` string values with the matching trigger value.
pub fn substitute_placeholders(data: &Map<String, Value>, trigger_data: &Value) -> Map<String, Value> {
    data.iter()
        .map(|(key, value)| {
            let resolved = match value.as_str().and_then(placeholder_field) {
                Some(field) => trigger_data.get(field).cloned().unwrap_or(Value::Null),
                None => value.clone(),
            };
            (key.clone(), resolved)
        })
        .collect()
}

fn placeholder_field(value: &str) -> Option<&str> {
    value.strip_prefix("{{")?.strip_suffix("}}").map(str::trim)
}

pub fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Insert,
    Update,
    Delete,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// A validated write against an allow-listed table.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionPlan {
    pub kind: ActionKind,
    pub table: String,
    /// Column values after placeholder substitution. Empty for deletes.
    pub data: Map<String, Value>,
    pub match_field: String,
    pub match_value: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ActionDecision {
    Run(ActionPlan),
    /// Unknown action type; the step records a skip instead of failing.
    Skip { action: String },
}

pub fn plan_action(
    config: &Value,
    trigger_data: &Value,
    allowed_tables: &[String],
) -> Result<ActionDecision, String> {
    let action = config.get("action_type").and_then(Value::as_str).unwrap_or_default();
    let Some(kind) = ActionKind::parse(action) else {
        return Ok(ActionDecision::Skip { action: action.to_string() });
    };

    let table = config.get("table").and_then(Value::as_str).unwrap_or_default();
    if !is_identifier(table) {
        return Err(format!("action table `{table}` is not a valid identifier"));
    }
    if !allowed_tables.iter().any(|allowed| allowed == table) {
        return Err(format!("action table `{table}` is not in the allowed list"));
    }

    let match_field = config.get("match_field").and_then(Value::as_str).unwrap_or("id");
    if !is_identifier(match_field) {
        return Err(format!("match field `{match_field}` is not a valid identifier"));
    }

    let data = match kind {
        ActionKind::Delete => Map::new(),
        ActionKind::Insert | ActionKind::Update => {
            let raw = config.get("data").and_then(Value::as_object).cloned().unwrap_or_default();
            let data = substitute_placeholders(&raw, trigger_data);
            if let Some(column) = data.keys().find(|column| !is_identifier(column)) {
                return Err(format!("column `{column}` is not a valid identifier"));
            }
            if data.is_empty() {
                return Err(format!("{} action on `{table}` has no data", kind.as_str()));
            }
            data
        }
    };

    Ok(ActionDecision::Run(ActionPlan {
        kind,
        table: table.to_string(),
        data,
        match_field: match_field.to_string(),
        match_value: trigger_data.get(match_field).cloned().unwrap_or(Value::Null),
    }))
}
