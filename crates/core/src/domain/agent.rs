use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::assistant::{AssistantId, ToolRef};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

/// Event-driven runtime entity. Always carries at least one trigger when
/// produced by the compiler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub description: Option<String>,
    pub system_prompt: String,
    pub model: String,
    pub tools: Vec<ToolRef>,
    pub triggers: Vec<String>,
    pub behaviors: Value,
    pub linked_assistant_id: Option<AssistantId>,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tools: Vec<ToolRef>,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub behaviors: Option<Value>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl AgentDraft {
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push("Agent missing required field: name".to_string());
        }
        if self.system_prompt.trim().is_empty() {
            missing.push("Agent missing required field: system_prompt".to_string());
        }
        missing
    }

    pub fn into_agent(self, id: AgentId, default_model: &str, now: DateTime<Utc>) -> Agent {
        Agent {
            id,
            name: self.name,
            description: self.description,
            system_prompt: self.system_prompt,
            model: self.model.unwrap_or_else(|| default_model.to_string()),
            tools: self.tools,
            triggers: self.triggers,
            behaviors: self.behaviors.unwrap_or_else(|| Value::Object(Default::default())),
            linked_assistant_id: None,
            is_active: true,
            created_by: self.created_by,
            created_at: now,
        }
    }
}

/// Partial update; absent fields keep their stored value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tools: Option<Vec<ToolRef>>,
    #[serde(default)]
    pub triggers: Option<Vec<String>>,
    #[serde(default)]
    pub behaviors: Option<Value>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl AgentPatch {
    pub fn apply(self, mut agent: Agent) -> Agent {
        if let Some(name) = self.name {
            agent.name = name;
        }
        if let Some(description) = self.description {
            agent.description = Some(description);
        }
        if let Some(system_prompt) = self.system_prompt {
            agent.system_prompt = system_prompt;
        }
        if let Some(model) = self.model {
            agent.model = model;
        }
        if let Some(tools) = self.tools {
            agent.tools = tools;
        }
        if let Some(triggers) = self.triggers {
            agent.triggers = triggers;
        }
        if let Some(behaviors) = self.behaviors {
            agent.behaviors = behaviors;
        }
        if let Some(is_active) = self.is_active {
            agent.is_active = is_active;
        }
        agent
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::{AgentDraft, AgentId, AgentPatch};

    #[test]
    fn patch_keeps_unspecified_fields() {
        let agent = AgentDraft {
            name: "Arrival Notifier".to_string(),
            system_prompt: "Notify brokers on arrival.".to_string(),
            triggers: vec!["vessel_arrived".to_string()],
            ..AgentDraft::default()
        }
        .into_agent(AgentId("agent-1".to_string()), "gpt-4o", Utc::now());

        let patched = AgentPatch {
            triggers: Some(vec!["vessel_departed".to_string()]),
            behaviors: Some(json!({"tone": "brief"})),
            ..AgentPatch::default()
        }
        .apply(agent);

        assert_eq!(patched.name, "Arrival Notifier");
        assert_eq!(patched.triggers, vec!["vessel_departed".to_string()]);
        assert_eq!(patched.behaviors, json!({"tone": "brief"}));
        assert_eq!(patched.model, "gpt-4o");
    }
}
