use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::backend::{BackendError, OpenAiClient};

const SERVICE: &str = "chat completions";

#[derive(Clone, Debug, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    /// Ask the model for a single JSON object.
    pub json_object: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatCompletion {
    pub content: String,
    pub model: String,
    pub usage: Value,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, BackendError>;
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Value>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, BackendError> {
        let mut body = json!({
            "model": request.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
        });
        if request.json_object {
            body["response_format"] = json!({"type": "json_object"});
        }

        let url = format!("{}/chat/completions", self.base_url);
        let raw = self.send(SERVICE, self.authorized(self.client.post(url)).json(&body)).await?;
        parse_completion(raw, &request.model)
    }
}

fn parse_completion(raw: Value, requested_model: &str) -> Result<ChatCompletion, BackendError> {
    let parsed: ChatResponse = serde_json::from_value(raw)
        .map_err(|error| BackendError::Decode { service: SERVICE, message: error.to_string() })?;
    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| BackendError::Decode {
            service: SERVICE,
            message: "response has no message content".to_string(),
        })?;
    Ok(ChatCompletion {
        content,
        model: parsed.model.unwrap_or_else(|| requested_model.to_string()),
        usage: parsed.usage.unwrap_or(Value::Null),
    })
}
