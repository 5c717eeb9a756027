use serde_json::Value;

use crate::domain::events::TRIGGER_EVENTS;
use crate::domain::tool::BUILTIN_TOOLS;

const RULES: &str = r#"You generate Blueprint documents. Output ONLY one JSON object, no prose, no markdown.

Shape:
{"assistants": [], "sdk_agents": [], "tools": [], "workflows": [], "global_rules": {}}

Rules:
1. assistants are chat/analysis only and never have triggers.
   Required: name, instructions, model. Optional: description, platform_tools (tool names).
2. sdk_agents are event-driven and must have triggers.
   Required: name, responsibility (the full system prompt), triggers (array), tools (array of tool names).
   Optional: description, model, behaviors.
3. tools are atomic actions.
   Required: name, type, function_name, used_by (names of the agents that use the tool).
   Types: vessel, port, email, subscription, billing, broker, market, custom.
4. workflows only orchestrate.
   Required: name, trigger (event name), steps.
   Step: {"step": number, "type": "tool" | "condition" | "ai" | "action", "config": {}}.
5. global_rules: {"escalation_policy": string, "error_handling": string}."#;

/// System prompt for turning a plain-language description into a Blueprint.
pub fn system_prompt() -> String {
    let events: Vec<&str> = TRIGGER_EVENTS.iter().map(|event| event.name).collect();
    let functions: Vec<&str> = BUILTIN_TOOLS.iter().map(|tool| tool.function_name).collect();
    format!(
        "{RULES}\n\nTrigger events: {}\n\nTool function names: {}",
        events.join(", "),
        functions.join(", ")
    )
}

/// Parses a model reply, tolerating a surrounding markdown fence.
pub fn parse_generated(content: &str) -> Result<Value, serde_json::Error> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|body| body.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(unfenced.trim())
}

#[cfg(test)]
mod tests {
    use super::{parse_generated, system_prompt};

    #[test]
    fn prompt_lists_events_and_functions() {
        let prompt = system_prompt();
        assert!(prompt.contains("vessel_arrived"));
        assert!(prompt.contains("fetch-oil-prices"));
    }

    #[test]
    fn fenced_reply_is_accepted() {
        let value = parse_generated("```json\n{\"assistants\": []}\n```").expect("parse reply");
        assert!(value["assistants"].is_array());
        assert!(parse_generated("here you go: {}").is_err());
    }
}
