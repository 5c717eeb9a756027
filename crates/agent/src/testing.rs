//! Scripted fakes for the network seams.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use agentforge_core::conversation::RunStatus;
use agentforge_core::domain::conversation::ConversationMessage;
use agentforge_core::steps::ActionPlan;
use agentforge_db::repositories::{ActionWriter, PlatformDataRepository, RepositoryError};

use crate::backend::{
    AssistantBackend, BackendError, RemoteAssistantSpec, RemoteRun, ToolCall, ToolOutput,
};
use crate::functions::FunctionInvoker;
use crate::llm::{ChatCompletion, ChatModel, ChatRequest};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Default)]
pub struct ScriptedInvoker {
    responses: Mutex<HashMap<String, Result<Value, BackendError>>>,
    latency: Option<Duration>,
    pub calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedInvoker {
    pub fn slow(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn respond(self, function_name: &str, response: Result<Value, BackendError>) -> Self {
        lock(&self.responses).insert(function_name.to_string(), response);
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl FunctionInvoker for ScriptedInvoker {
    async fn invoke(&self, function_name: &str, arguments: &Value) -> Result<Value, BackendError> {
        lock(&self.calls).push((function_name.to_string(), arguments.clone()));
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        lock(&self.responses)
            .get(function_name)
            .cloned()
            .unwrap_or_else(|| Ok(json!({"ok": true})))
    }
}

#[derive(Default)]
pub struct ScriptedChat {
    pub requests: Mutex<Vec<ChatRequest>>,
    pub reply: Mutex<Option<String>>,
}

impl ScriptedChat {
    pub fn replying(content: &str) -> Self {
        Self { requests: Mutex::default(), reply: Mutex::new(Some(content.to_string())) }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, BackendError> {
        let model = request.model.clone();
        lock(&self.requests).push(request);
        let content = lock(&self.reply).clone().unwrap_or_default();
        Ok(ChatCompletion {
            content,
            model,
            usage: json!({"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}),
        })
    }
}

#[derive(Default)]
pub struct RecordingActionWriter {
    pub applied: Mutex<Vec<ActionPlan>>,
}

#[async_trait]
impl ActionWriter for RecordingActionWriter {
    async fn apply(&self, plan: &ActionPlan) -> Result<u64, RepositoryError> {
        lock(&self.applied).push(plan.clone());
        Ok(1)
    }
}

/// Platform tables with one vessel and fixed counts.
pub struct StaticPlatform;

#[async_trait]
impl PlatformDataRepository for StaticPlatform {
    async fn vessel_by_imo(&self, imo: &str) -> Result<Option<Value>, RepositoryError> {
        Ok((imo == "9321483").then(|| json!({"name": "Nordic Star", "imo": imo})))
    }

    async fn vessel_by_mmsi(&self, _mmsi: &str) -> Result<Option<Value>, RepositoryError> {
        Ok(None)
    }

    async fn ports_by_name(&self, _name: &str) -> Result<Vec<Value>, RepositoryError> {
        Ok(Vec::new())
    }

    async fn subscriber_by_user(&self, _user_id: &str) -> Result<Option<Value>, RepositoryError> {
        Ok(None)
    }

    async fn active_plans(&self) -> Result<Vec<Value>, RepositoryError> {
        Ok(Vec::new())
    }

    async fn platform_stats(&self) -> Result<Value, RepositoryError> {
        Ok(json!({"total_vessels": 1, "total_ports": 0, "total_companies": 0, "total_brokers": 0}))
    }
}

/// Hosted backend that replays a fixed sequence of run statuses.
#[derive(Default)]
pub struct ScriptedBackend {
    pub fail_create_assistant: bool,
    pub fail_delete_assistant: bool,
    pub fail_update_assistant: bool,
    /// Statuses handed out by `get_run`, in order. Once drained the run completes.
    pub polls: Mutex<VecDeque<RemoteRun>>,
    pub created: Mutex<Vec<RemoteAssistantSpec>>,
    pub deleted: Mutex<Vec<String>>,
    pub updated: Mutex<Vec<String>>,
    pub threads_created: Mutex<u32>,
    pub posted: Mutex<Vec<(String, String)>>,
    pub submitted: Mutex<Vec<Vec<ToolOutput>>>,
    pub cancelled: Mutex<Vec<String>>,
    pub messages: Mutex<Vec<ConversationMessage>>,
}

impl ScriptedBackend {
    pub fn with_polls(polls: Vec<RemoteRun>) -> Self {
        Self { polls: Mutex::new(polls.into()), ..Self::default() }
    }

    pub fn with_messages(self, messages: Vec<ConversationMessage>) -> Self {
        *lock(&self.messages) = messages;
        self
    }

    pub fn submitted(&self) -> Vec<Vec<ToolOutput>> {
        lock(&self.submitted).clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        lock(&self.deleted).clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        lock(&self.cancelled).clone()
    }
}

pub fn run(status: RunStatus) -> RemoteRun {
    RemoteRun { id: "run_1".to_string(), status, tool_calls: Vec::new() }
}

pub fn run_requiring(calls: Vec<(&str, &str, Value)>) -> RemoteRun {
    RemoteRun {
        id: "run_1".to_string(),
        status: RunStatus::RequiresAction,
        tool_calls: calls
            .into_iter()
            .map(|(id, name, arguments)| ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: arguments.to_string(),
            })
            .collect(),
    }
}

pub fn message(id: &str, role: &str, content: &str, created_at: i64) -> ConversationMessage {
    ConversationMessage {
        id: id.to_string(),
        role: role.to_string(),
        content: content.to_string(),
        created_at: Some(created_at),
        raw: json!({"id": id, "role": role}),
    }
}

fn rejected() -> BackendError {
    BackendError::Status {
        service: "assistant backend",
        status: 500,
        body: "{\"error\":\"backend unavailable\"}".to_string(),
    }
}

#[async_trait]
impl AssistantBackend for ScriptedBackend {
    async fn create_assistant(&self, spec: &RemoteAssistantSpec) -> Result<String, BackendError> {
        if self.fail_create_assistant {
            return Err(rejected());
        }
        let mut created = lock(&self.created);
        created.push(spec.clone());
        Ok(format!("asst_{}", created.len()))
    }

    async fn update_assistant(
        &self,
        remote_id: &str,
        _spec: &RemoteAssistantSpec,
    ) -> Result<(), BackendError> {
        if self.fail_update_assistant {
            return Err(rejected());
        }
        lock(&self.updated).push(remote_id.to_string());
        Ok(())
    }

    async fn delete_assistant(&self, remote_id: &str) -> Result<(), BackendError> {
        lock(&self.deleted).push(remote_id.to_string());
        if self.fail_delete_assistant {
            return Err(rejected());
        }
        Ok(())
    }

    async fn create_thread(&self) -> Result<String, BackendError> {
        let mut created = lock(&self.threads_created);
        *created += 1;
        Ok(format!("thread_{}", *created))
    }

    async fn post_message(&self, thread_id: &str, content: &str) -> Result<(), BackendError> {
        lock(&self.posted).push((thread_id.to_string(), content.to_string()));
        Ok(())
    }

    async fn create_run(
        &self,
        _thread_id: &str,
        _assistant_id: &str,
    ) -> Result<RemoteRun, BackendError> {
        Ok(run(RunStatus::Queued))
    }

    async fn get_run(&self, _thread_id: &str, _run_id: &str) -> Result<RemoteRun, BackendError> {
        Ok(lock(&self.polls).pop_front().unwrap_or_else(|| run(RunStatus::Completed)))
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        _run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RemoteRun, BackendError> {
        lock(&self.submitted).push(outputs.to_vec());
        Ok(run(RunStatus::Queued))
    }

    async fn cancel_run(&self, _thread_id: &str, run_id: &str) -> Result<(), BackendError> {
        lock(&self.cancelled).push(run_id.to_string());
        Ok(())
    }

    async fn list_messages(
        &self,
        _thread_id: &str,
    ) -> Result<Vec<ConversationMessage>, BackendError> {
        Ok(lock(&self.messages).clone())
    }
}
