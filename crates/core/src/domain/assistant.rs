use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::tool::remote_function_name;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssistantId(pub String);

/// Reference to a tool as declared on an assistant or agent.
///
/// Accepts either a bare name (`"Send Email"`) or an object. A bare name
/// doubles as its own function name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "ToolRefRepr")]
pub struct ToolRef {
    pub name: String,
    pub function_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ToolRefRepr {
    Name(String),
    Full {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        function_name: Option<String>,
        #[serde(default, alias = "type")]
        tool_type: Option<String>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        parameters: Option<Value>,
    },
}

impl From<ToolRefRepr> for ToolRef {
    fn from(value: ToolRefRepr) -> Self {
        match value {
            ToolRefRepr::Name(name) => Self::stub(name),
            ToolRefRepr::Full { name, function_name, tool_type, description, parameters } => {
                let name = name.or_else(|| function_name.clone()).unwrap_or_default();
                let function_name = function_name.unwrap_or_else(|| name.clone());
                Self { name, function_name, tool_type, description, parameters }
            }
        }
    }
}

impl ToolRef {
    /// Minimal reference for a name that could not be resolved to a declared tool.
    pub fn stub(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            function_name: name.clone(),
            name,
            tool_type: None,
            description: None,
            parameters: None,
        }
    }

    pub fn remote_function_name(&self) -> String {
        remote_function_name(&self.function_name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Assistant {
    pub id: AssistantId,
    pub name: String,
    pub description: Option<String>,
    pub instructions: String,
    pub model: String,
    pub tools: Vec<ToolRef>,
    pub file_search: bool,
    pub code_interpreter: bool,
    pub external_reference_id: Option<String>,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tools: Vec<ToolRef>,
    #[serde(default)]
    pub file_search: bool,
    #[serde(default)]
    pub code_interpreter: bool,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl AssistantDraft {
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push("Assistant missing required field: name".to_string());
        }
        if self.instructions.trim().is_empty() {
            missing.push("Assistant missing required field: instructions".to_string());
        }
        missing
    }

    pub fn into_assistant(
        self,
        id: AssistantId,
        external_reference_id: Option<String>,
        default_model: &str,
        now: DateTime<Utc>,
    ) -> Assistant {
        Assistant {
            id,
            name: self.name,
            description: self.description,
            instructions: self.instructions,
            model: self.model.unwrap_or_else(|| default_model.to_string()),
            tools: self.tools,
            file_search: self.file_search,
            code_interpreter: self.code_interpreter,
            external_reference_id,
            is_active: true,
            created_by: self.created_by,
            created_at: now,
        }
    }
}

/// Partial update; absent fields keep their stored value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tools: Option<Vec<ToolRef>>,
    #[serde(default)]
    pub file_search: Option<bool>,
    #[serde(default)]
    pub code_interpreter: Option<bool>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl AssistantPatch {
    pub fn apply(self, mut assistant: Assistant) -> Assistant {
        if let Some(name) = self.name {
            assistant.name = name;
        }
        if let Some(description) = self.description {
            assistant.description = Some(description);
        }
        if let Some(instructions) = self.instructions {
            assistant.instructions = instructions;
        }
        if let Some(model) = self.model {
            assistant.model = model;
        }
        if let Some(tools) = self.tools {
            assistant.tools = tools;
        }
        if let Some(file_search) = self.file_search {
            assistant.file_search = file_search;
        }
        if let Some(code_interpreter) = self.code_interpreter {
            assistant.code_interpreter = code_interpreter;
        }
        if let Some(is_active) = self.is_active {
            assistant.is_active = is_active;
        }
        assistant
    }
}
