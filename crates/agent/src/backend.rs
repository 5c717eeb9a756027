//! Hosted assistant backend: remote assistants, threads and runs.
//!
//! The wire format is the Assistants v2 API. Everything above this module
//! talks to the [`AssistantBackend`] trait so tests can swap in a fake.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use agentforge_core::config::AssistantsConfig;
use agentforge_core::conversation::RunStatus;
use agentforge_core::domain::assistant::ToolRef;
use agentforge_core::domain::conversation::ConversationMessage;
use agentforge_core::errors::ApplicationError;

pub const PLATFORM_QUERY_FUNCTION: &str = "query_platform_data";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("{service} request failed: {message}")]
    Transport { service: &'static str, message: String },
    #[error("{service} returned {status}: {body}")]
    Status { service: &'static str, status: u16, body: String },
    #[error("{service} response could not be decoded: {message}")]
    Decode { service: &'static str, message: String },
    #[error("{service} did not answer within {seconds}s")]
    Timeout { service: &'static str, seconds: u64 },
}

impl From<BackendError> for ApplicationError {
    fn from(error: BackendError) -> Self {
        match error {
            BackendError::Status { service, status, body } => {
                ApplicationError::external(service, status, body)
            }
            BackendError::Timeout { service, .. } => {
                ApplicationError::external(service, 504, error.to_string())
            }
            BackendError::Transport { service, .. } | BackendError::Decode { service, .. } => {
                ApplicationError::external(service, 502, error.to_string())
            }
        }
    }
}

/// Definition sent when creating or updating a remote assistant.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RemoteAssistantSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub instructions: String,
    pub model: String,
    pub tools: Vec<Value>,
}

impl RemoteAssistantSpec {
    pub fn new(
        name: &str,
        description: Option<&str>,
        instructions: &str,
        model: &str,
        tools: &[ToolRef],
        file_search: bool,
        code_interpreter: bool,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.map(str::to_string),
            instructions: instructions.to_string(),
            model: model.to_string(),
            tools: remote_tool_definitions(tools, file_search, code_interpreter),
        }
    }
}

/// Tool list for a remote assistant. The platform query function is always
/// appended so every assistant can read platform data.
pub fn remote_tool_definitions(
    tools: &[ToolRef],
    file_search: bool,
    code_interpreter: bool,
) -> Vec<Value> {
    let mut definitions = Vec::with_capacity(tools.len() + 3);
    if file_search {
        definitions.push(json!({"type": "file_search"}));
    }
    if code_interpreter {
        definitions.push(json!({"type": "code_interpreter"}));
    }
    for tool in tools {
        let name = tool.remote_function_name();
        definitions.push(json!({
            "type": "function",
            "function": {
                "name": name,
                "description": tool
                    .description
                    .clone()
                    .unwrap_or_else(|| format!("Execute {}", tool.name)),
                "parameters": tool
                    .parameters
                    .clone()
                    .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
            }
        }));
    }
    definitions.push(platform_query_definition());
    definitions
}

fn platform_query_definition() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": PLATFORM_QUERY_FUNCTION,
            "description": "Query read-only platform data: vessels, ports, subscriptions and platform statistics",
            "parameters": {
                "type": "object",
                "properties": {
                    "query_type": {
                        "type": "string",
                        "enum": [
                            "vessel_by_imo",
                            "vessel_by_mmsi",
                            "port_by_name",
                            "subscription_info",
                            "subscription_plans",
                            "platform_stats"
                        ]
                    },
                    "query_params": {"type": "object"}
                },
                "required": ["query_type"]
            }
        }
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded argument object, as sent by the backend.
    pub arguments: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteRun {
    pub id: String,
    pub status: RunStatus,
    /// Pending calls; only populated while the run requires action.
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

#[async_trait]
pub trait AssistantBackend: Send + Sync {
    /// Returns the remote assistant id.
    async fn create_assistant(&self, spec: &RemoteAssistantSpec) -> Result<String, BackendError>;
    async fn update_assistant(
        &self,
        remote_id: &str,
        spec: &RemoteAssistantSpec,
    ) -> Result<(), BackendError>;
    async fn delete_assistant(&self, remote_id: &str) -> Result<(), BackendError>;
    async fn create_thread(&self) -> Result<String, BackendError>;
    async fn post_message(&self, thread_id: &str, content: &str) -> Result<(), BackendError>;
    async fn create_run(&self, thread_id: &str, assistant_id: &str)
        -> Result<RemoteRun, BackendError>;
    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RemoteRun, BackendError>;
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RemoteRun, BackendError>;
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<(), BackendError>;
    /// Newest first, as the backend lists them.
    async fn list_messages(&self, thread_id: &str)
        -> Result<Vec<ConversationMessage>, BackendError>;
}

const SERVICE: &str = "assistant backend";

/// Assistants v2 client. Also serves chat completions, see [`crate::llm`].
pub struct OpenAiClient {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    api_key: SecretString,
    pub(crate) timeout_secs: u64,
}

impl OpenAiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        timeout_secs: u64,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|error| BackendError::Transport { service: SERVICE, message: error.to_string() })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout_secs,
        })
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &AssistantsConfig) -> Result<Option<Self>, BackendError> {
        let Some(api_key) = config.credential() else {
            return Ok(None);
        };
        Self::new(config.base_url.clone(), api_key.clone(), config.timeout_secs).map(Some)
    }

    pub(crate) fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(self.api_key.expose_secret())
    }

    fn beta(&self, builder: RequestBuilder) -> RequestBuilder {
        self.authorized(builder).header("OpenAI-Beta", "assistants=v2")
    }

    pub(crate) async fn send(
        &self,
        service: &'static str,
        builder: RequestBuilder,
    ) -> Result<Value, BackendError> {
        let response = builder.send().await.map_err(|error| {
            if error.is_timeout() {
                BackendError::Timeout { service, seconds: self.timeout_secs }
            } else {
                BackendError::Transport { service, message: error.to_string() }
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| BackendError::Transport { service, message: error.to_string() })?;
        if !status.is_success() {
            return Err(BackendError::Status { service, status: status.as_u16(), body });
        }
        serde_json::from_str(&body)
            .map_err(|error| BackendError::Decode { service, message: error.to_string() })
    }

    async fn beta_send(&self, builder: RequestBuilder) -> Result<Value, BackendError> {
        self.send(SERVICE, self.beta(builder)).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl AssistantBackend for OpenAiClient {
    async fn create_assistant(&self, spec: &RemoteAssistantSpec) -> Result<String, BackendError> {
        let body = self.beta_send(self.client.post(self.url("/assistants")).json(spec)).await?;
        required_str(&body, "id")
    }

    async fn update_assistant(
        &self,
        remote_id: &str,
        spec: &RemoteAssistantSpec,
    ) -> Result<(), BackendError> {
        self.beta_send(self.client.post(self.url(&format!("/assistants/{remote_id}"))).json(spec))
            .await
            .map(|_| ())
    }

    async fn delete_assistant(&self, remote_id: &str) -> Result<(), BackendError> {
        self.beta_send(self.client.delete(self.url(&format!("/assistants/{remote_id}"))))
            .await
            .map(|_| ())
    }

    async fn create_thread(&self) -> Result<String, BackendError> {
        let body = self.beta_send(self.client.post(self.url("/threads")).json(&json!({}))).await?;
        required_str(&body, "id")
    }

    async fn post_message(&self, thread_id: &str, content: &str) -> Result<(), BackendError> {
        self.beta_send(
            self.client
                .post(self.url(&format!("/threads/{thread_id}/messages")))
                .json(&json!({"role": "user", "content": content})),
        )
        .await
        .map(|_| ())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<RemoteRun, BackendError> {
        let body = self
            .beta_send(
                self.client
                    .post(self.url(&format!("/threads/{thread_id}/runs")))
                    .json(&json!({"assistant_id": assistant_id})),
            )
            .await?;
        decode_run(&body)
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RemoteRun, BackendError> {
        let body = self
            .beta_send(self.client.get(self.url(&format!("/threads/{thread_id}/runs/{run_id}"))))
            .await?;
        decode_run(&body)
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RemoteRun, BackendError> {
        let body = self
            .beta_send(
                self.client
                    .post(self.url(&format!(
                        "/threads/{thread_id}/runs/{run_id}/submit_tool_outputs"
                    )))
                    .json(&json!({"tool_outputs": outputs})),
            )
            .await?;
        decode_run(&body)
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<(), BackendError> {
        self.beta_send(
            self.client.post(self.url(&format!("/threads/{thread_id}/runs/{run_id}/cancel"))),
        )
        .await
        .map(|_| ())
    }

    async fn list_messages(
        &self,
        thread_id: &str,
    ) -> Result<Vec<ConversationMessage>, BackendError> {
        let body = self
            .beta_send(self.client.get(self.url(&format!("/threads/{thread_id}/messages"))))
            .await?;
        let data = body.get("data").and_then(Value::as_array).ok_or_else(|| {
            BackendError::Decode { service: SERVICE, message: "messages list has no data".into() }
        })?;
        Ok(data.iter().map(decode_message).collect())
    }
}

fn required_str(body: &Value, field: &str) -> Result<String, BackendError> {
    body.get(field).and_then(Value::as_str).map(str::to_string).ok_or_else(|| {
        BackendError::Decode { service: SERVICE, message: format!("response has no `{field}`") }
    })
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

pub(crate) fn decode_run(body: &Value) -> Result<RemoteRun, BackendError> {
    let id = required_str(body, "id")?;
    let raw_status = required_str(body, "status")?;
    let status = RunStatus::parse(&raw_status).ok_or_else(|| BackendError::Decode {
        service: SERVICE,
        message: format!("unknown run status `{raw_status}`"),
    })?;
    let tool_calls = match body.pointer("/required_action/submit_tool_outputs/tool_calls") {
        Some(calls) => serde_json::from_value::<Vec<WireToolCall>>(calls.clone())
            .map_err(|error| BackendError::Decode { service: SERVICE, message: error.to_string() })?
            .into_iter()
            .map(|call| ToolCall { id: call.id, name: call.function.name, arguments: call.function.arguments })
            .collect(),
        None => Vec::new(),
    };
    Ok(RemoteRun { id, status, tool_calls })
}

pub(crate) fn decode_message(raw: &Value) -> ConversationMessage {
    let text = |path: &str| raw.pointer(path).and_then(Value::as_str).unwrap_or_default().to_string();
    ConversationMessage {
        id: text("/id"),
        role: text("/role"),
        content: text("/content/0/text/value"),
        created_at: raw.get("created_at").and_then(Value::as_i64),
        raw: raw.clone(),
    }
}
