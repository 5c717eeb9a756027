//! Blueprint documents.
//!
//! A Blueprint declares assistants, event-driven agents, tools and workflows
//! in one JSON document. Structural checks run on the raw value in
//! [`validator`]; the typed model below is decoded only after a document
//! passes validation and is deliberately lenient about optional fields.

pub mod prompt;
pub mod validator;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::assistant::ToolRef;

pub use validator::{validate, ValidationReport};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    #[serde(default)]
    pub assistants: Vec<AssistantSpec>,
    #[serde(default)]
    pub sdk_agents: Vec<AgentSpec>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    #[serde(default)]
    pub workflows: Vec<WorkflowSpec>,
    #[serde(default)]
    pub global_rules: Option<GlobalRules>,
}

impl Blueprint {
    pub fn decode(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    /// Decodes the entry at `index` of `section` on its own, so an odd entry
    /// elsewhere in the document cannot affect it. `None` when out of range.
    pub fn entry<T>(value: &Value, section: &str, index: usize) -> Option<Result<T, serde_json::Error>>
    where
        T: for<'de> Deserialize<'de>,
    {
        let raw = value.get(section)?.as_array()?.get(index)?;
        Some(T::deserialize(raw))
    }

    /// Every declared tool that decodes; others are left out.
    pub fn declared_tools(value: &Value) -> Vec<ToolSpec> {
        value
            .get("tools")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|tool| ToolSpec::deserialize(tool).ok())
            .collect()
    }

    /// Finds a declared tool by display name or function name.
    pub fn find_tool(&self, reference: &str) -> Option<&ToolSpec> {
        find_tool(&self.tools, reference)
    }
}

pub fn find_tool<'a>(tools: &'a [ToolSpec], reference: &str) -> Option<&'a ToolSpec> {
    tools.iter().find(|tool| tool.name == reference || tool.function_name == reference)
}

/// Chat/analysis-only entity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantSpec {
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub instructions: String,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient::tool_refs")]
    pub platform_tools: Vec<ToolRef>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub file_search: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub code_interpreter: bool,
    #[serde(default)]
    pub triggers: Value,
}

/// Event-driven entity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub responsibility: String,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient::labels")]
    pub triggers: Vec<String>,
    #[serde(default, deserialize_with = "lenient::labels")]
    pub tools: Vec<String>,
    #[serde(default)]
    pub behaviors: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(rename = "type", default, deserialize_with = "lenient::text")]
    pub tool_type: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub function_name: String,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<Value>,
    #[serde(default, deserialize_with = "lenient::labels")]
    pub used_by: Vec<String>,
}

impl ToolSpec {
    pub fn to_ref(&self) -> ToolRef {
        ToolRef {
            name: self.name.clone(),
            function_name: self.function_name.clone(),
            tool_type: Some(self.tool_type.clone()),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::label")]
    pub trigger: String,
    #[serde(default)]
    pub steps: Vec<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalRules {
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub escalation_policy: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub error_handling: Option<String>,
}

/// Field decoders that accept any JSON shape the validator lets through.
/// Truthiness follows [`validator`]: null, false, 0 and "" are unset.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use crate::domain::assistant::ToolRef;

    fn render(value: Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::String(text) => Some(text),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            other => Some(other.to_string()),
        }
    }

    /// Objects such as `{"event": "order_created"}` name themselves by
    /// their `event` or `name` field.
    fn render_label(value: Value) -> Option<String> {
        if let Value::Object(fields) = &value {
            for key in ["event", "name", "function_name"] {
                if let Some(Value::String(text)) = fields.get(key) {
                    return Some(text.clone());
                }
            }
        }
        render(value)
    }

    pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(render(Value::deserialize(deserializer)?).unwrap_or_default())
    }

    pub fn optional_text<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        Ok(render(Value::deserialize(deserializer)?).filter(|text| !text.is_empty()))
    }

    pub fn label<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(render_label(Value::deserialize(deserializer)?).unwrap_or_default())
    }

    pub fn labels<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let labels = match Value::deserialize(deserializer)? {
            Value::Array(items) => items.into_iter().filter_map(render_label).collect(),
            Value::String(text) if !text.is_empty() => vec![text],
            _ => Vec::new(),
        };
        Ok(labels)
    }

    pub fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let flag = match Value::deserialize(deserializer)? {
            Value::Null => false,
            Value::Bool(flag) => flag,
            Value::Number(number) => number.as_f64() != Some(0.0),
            Value::String(text) => !text.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        };
        Ok(flag)
    }

    pub fn tool_refs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<ToolRef>, D::Error> {
        let Value::Array(items) = Value::deserialize(deserializer)? else {
            return Ok(Vec::new());
        };
        Ok(items
            .into_iter()
            .filter_map(|item| {
                ToolRef::deserialize(&item).ok().or_else(|| render_label(item).map(ToolRef::stub))
            })
            .collect())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlueprintSummary {
    pub assistants: usize,
    pub sdk_agents: usize,
    pub tools: usize,
    pub workflows: usize,
}

/// Counts each top-level array; missing or non-array fields count as zero.
pub fn summarize(blueprint: &Value) -> BlueprintSummary {
    let count = |field: &str| blueprint.get(field).and_then(Value::as_array).map_or(0, Vec::len);
    BlueprintSummary {
        assistants: count("assistants"),
        sdk_agents: count("sdk_agents"),
        tools: count("tools"),
        workflows: count("workflows"),
    }
}
