use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use agentforge_core::blueprint::{prompt, validate, ValidationReport};
use agentforge_core::compiler::{plan, CompileTarget, PlannedEntity};
use agentforge_core::errors::ApplicationError;

use crate::entities::EntityService;
use crate::llm::{ChatModel, ChatRequest};

const BLUEPRINT_MODEL: &str = "gpt-4o";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompileOutcome {
    #[serde(rename = "type")]
    pub kind: CompileTarget,
    pub entity: Value,
    pub unresolved_tools: Vec<String>,
}

impl CompileOutcome {
    /// Flattens into `{type, ...entity}`, adding `unresolved_tools` when any
    /// reference fell back to a stub.
    pub fn into_result(self) -> Value {
        let mut result = match self.entity {
            Value::Object(fields) => fields,
            other => {
                let mut fields = serde_json::Map::new();
                fields.insert("entity".to_string(), other);
                fields
            }
        };
        result.insert("type".to_string(), json!(self.kind.as_str()));
        if !self.unresolved_tools.is_empty() {
            result.insert("unresolved_tools".to_string(), json!(self.unresolved_tools));
        }
        Value::Object(result)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GeneratedBlueprint {
    pub config: Value,
    pub validation: ValidationReport,
    pub raw_response: String,
}

#[derive(Clone)]
pub struct Compiler {
    entities: EntityService,
    chat: Option<Arc<dyn ChatModel>>,
}

impl Compiler {
    pub fn new(entities: EntityService, chat: Option<Arc<dyn ChatModel>>) -> Self {
        Self { entities, chat }
    }

    /// Validates `blueprint` again and materializes one entry. Nothing is
    /// written when the document is invalid.
    pub async fn compile(
        &self,
        blueprint: &Value,
        target: CompileTarget,
        index: usize,
        created_by: Option<String>,
    ) -> Result<CompileOutcome, ApplicationError> {
        let plan = plan(blueprint, target, index)?;
        if !plan.unresolved_tools.is_empty() {
            warn!(
                event_name = "agent.compile.unresolved_tools",
                target = target.as_str(),
                index,
                tools = %plan.unresolved_tools.join(", "),
                "tool references not declared in blueprint; stubs used"
            );
        }

        let entity = match plan.entity {
            PlannedEntity::Assistant(mut draft) => {
                draft.created_by = created_by;
                encode(&self.entities.create_assistant(draft).await?)?
            }
            PlannedEntity::Agent(mut draft) => {
                draft.created_by = created_by;
                encode(&self.entities.create_agent(draft).await?)?
            }
        };

        info!(event_name = "agent.compile.completed", target = target.as_str(), index, "blueprint entry compiled");
        Ok(CompileOutcome { kind: target, entity, unresolved_tools: plan.unresolved_tools })
    }

    /// Asks the chat model for a Blueprint and validates what comes back.
    /// An invalid Blueprint is returned with its report, not rejected.
    pub async fn prompt_to_blueprint(
        &self,
        description: &str,
    ) -> Result<GeneratedBlueprint, ApplicationError> {
        if description.trim().is_empty() {
            return Err(ApplicationError::validation("prompt is required"));
        }
        let chat = self.chat.as_ref().ok_or_else(|| {
            ApplicationError::Configuration("assistants.api_key is not configured".to_string())
        })?;

        let completion = chat
            .complete(ChatRequest {
                model: BLUEPRINT_MODEL.to_string(),
                system: prompt::system_prompt(),
                user: description.to_string(),
                json_object: true,
            })
            .await?;
        let config = prompt::parse_generated(&completion.content).map_err(|error| {
            ApplicationError::ExecutionFailure(format!("generated blueprint is not valid JSON: {error}"))
        })?;

        Ok(GeneratedBlueprint { validation: validate(&config), config, raw_response: completion.content })
    }
}

fn encode<T: Serialize>(entity: &T) -> Result<Value, ApplicationError> {
    serde_json::to_value(entity).map_err(|error| {
        ApplicationError::ExecutionFailure(format!("compiled entity could not be encoded: {error}"))
    })
}
