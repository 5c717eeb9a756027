//! Drives one user message through a hosted assistant run.
//!
//! A turn walks [`RunState`] from `NoThread` to a terminal state. Tool calls
//! requested by the run are answered locally and submitted back as one
//! batch. The whole turn is bounded by a deadline and a cancellation token;
//! either one stops the loop and cancels the remote run.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use agentforge_core::conversation::{RunEvent, RunState, RunStatus};
use agentforge_core::domain::assistant::AssistantId;
use agentforge_core::domain::conversation::{Conversation, ConversationId, ConversationMessage};
use agentforge_core::errors::ApplicationError;
use agentforge_db::repositories::{AssistantRepository, ConversationRepository};

use crate::backend::{
    AssistantBackend, BackendError, RemoteRun, ToolCall, ToolOutput, PLATFORM_QUERY_FUNCTION,
};
use crate::executor::ToolExecutor;
use crate::platform::{PlatformData, PlatformQuery};

const CANCEL_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ChatTurn {
    pub assistant_id: AssistantId,
    pub message: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatReply {
    pub thread_id: String,
    pub message: String,
    pub run_status: RunStatus,
}

#[derive(Clone)]
pub struct ConversationRunner {
    assistants: Arc<dyn AssistantRepository>,
    conversations: Arc<dyn ConversationRepository>,
    backend: Option<Arc<dyn AssistantBackend>>,
    tools: ToolExecutor,
    platform: PlatformData,
    poll_interval: Duration,
    deadline: Duration,
}

impl ConversationRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        assistants: Arc<dyn AssistantRepository>,
        conversations: Arc<dyn ConversationRepository>,
        backend: Option<Arc<dyn AssistantBackend>>,
        tools: ToolExecutor,
        platform: PlatformData,
        poll_interval: Duration,
        deadline: Duration,
    ) -> Self {
        Self { assistants, conversations, backend, tools, platform, poll_interval, deadline }
    }

    pub async fn chat(
        &self,
        turn: ChatTurn,
        cancel: CancellationToken,
    ) -> Result<ChatReply, ApplicationError> {
        let backend = self.backend.clone().ok_or_else(|| {
            ApplicationError::Configuration("assistants.api_key is not configured".to_string())
        })?;
        if turn.message.trim().is_empty() {
            return Err(ApplicationError::validation("message is required"));
        }

        let assistant = self
            .assistants
            .find_by_id(&turn.assistant_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("assistant {}", turn.assistant_id.0)))?;
        let remote_assistant = assistant.external_reference_id.clone().ok_or_else(|| {
            ApplicationError::validation(format!(
                "assistant {} has no hosted counterpart",
                assistant.id.0
            ))
        })?;

        let deadline = Instant::now() + self.deadline;
        let mut state = RunState::NoThread;

        let thread_id = match turn.thread_id.clone().filter(|id| !id.trim().is_empty()) {
            Some(thread_id) => {
                state = state.advance(RunEvent::ThreadReused)?;
                thread_id
            }
            None => {
                let thread_id = self.bounded(deadline, &cancel, backend.create_thread()).await?;
                let now = Utc::now();
                self.conversations
                    .insert(Conversation {
                        id: ConversationId(Uuid::new_v4().to_string()),
                        assistant_id: assistant.id.clone(),
                        user_id: turn.user_id.clone(),
                        external_thread_id: thread_id.clone(),
                        messages: Vec::new(),
                        created_at: now,
                        updated_at: now,
                    })
                    .await?;
                state = state.advance(RunEvent::ThreadCreated)?;
                thread_id
            }
        };

        self.bounded(deadline, &cancel, backend.post_message(&thread_id, &turn.message)).await?;
        state = state.advance(RunEvent::MessagePosted)?;

        let run = self
            .bounded(deadline, &cancel, backend.create_run(&thread_id, &remote_assistant))
            .await?;
        state = state.advance(RunEvent::Status(run.status))?;
        let run_id = run.id.clone();
        info!(
            event_name = "agent.conversation.run_started",
            assistant_id = %assistant.id.0,
            thread_id = %thread_id,
            run_id = %run_id,
            "assistant run started"
        );

        let status = match self.drive(backend.as_ref(), &thread_id, run, state, deadline, &cancel).await
        {
            Ok(status) => status,
            Err(error) => {
                if matches!(
                    error,
                    ApplicationError::Cancelled(_) | ApplicationError::ExternalService { status: 504, .. }
                ) {
                    cancel_quietly(backend.as_ref(), &thread_id, &run_id).await;
                }
                return Err(error);
            }
        };

        let newest_first = self.bounded(deadline, &cancel, backend.list_messages(&thread_id)).await?;
        let message = newest_first
            .iter()
            .find(|message| message.role == "assistant")
            .map(|message| message.content.clone())
            .unwrap_or_default();
        let mut messages = newest_first;
        messages.reverse();
        self.store_transcript(&assistant.id, turn.user_id, &thread_id, messages).await?;

        info!(
            event_name = "agent.conversation.run_finished",
            thread_id = %thread_id,
            run_id = %run_id,
            run_status = status.as_str(),
            "assistant run finished"
        );
        Ok(ChatReply { thread_id, message, run_status: status })
    }

    async fn drive(
        &self,
        backend: &dyn AssistantBackend,
        thread_id: &str,
        mut run: RemoteRun,
        mut state: RunState,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<RunStatus, ApplicationError> {
        while state.is_polling() {
            if state == RunState::RunRequiresAction {
                let calls = &run.tool_calls;
                let outputs = self
                    .bounded(deadline, cancel, async move {
                        Ok::<_, BackendError>(self.answer_tool_calls(calls).await)
                    })
                    .await?;
                run = self
                    .bounded(deadline, cancel, backend.submit_tool_outputs(thread_id, &run.id, &outputs))
                    .await?;
                state = state.advance(RunEvent::Status(run.status))?;
                continue;
            }

            let pause = self.poll_interval;
            self.bounded(deadline, cancel, async move {
                tokio::time::sleep(pause).await;
                Ok::<(), BackendError>(())
            })
            .await?;
            run = self.bounded(deadline, cancel, backend.get_run(thread_id, &run.id)).await?;
            debug!(run_id = %run.id, status = run.status.as_str(), "run polled");
            state = state.advance(RunEvent::Status(run.status))?;
        }
        Ok(run.status)
    }

    /// Every call gets an output, failures included, so the run can resume.
    async fn answer_tool_calls(&self, calls: &[ToolCall]) -> Vec<ToolOutput> {
        let mut outputs = Vec::with_capacity(calls.len());
        for call in calls {
            let output = match serde_json::from_str::<Value>(&call.arguments) {
                Ok(arguments) => match self.answer(&call.name, arguments).await {
                    Ok(output) => output,
                    Err(error) => {
                        warn!(
                            event_name = "agent.conversation.tool_call_failed",
                            function = %call.name,
                            error_class = error.error_class(),
                            "tool call failed"
                        );
                        json!({"error": error.to_string()})
                    }
                },
                Err(error) => json!({"error": format!("arguments are not valid JSON: {error}")}),
            };
            outputs.push(ToolOutput { tool_call_id: call.id.clone(), output: output.to_string() });
        }
        outputs
    }

    async fn answer(&self, function: &str, arguments: Value) -> Result<Value, ApplicationError> {
        if function == PLATFORM_QUERY_FUNCTION {
            let query = PlatformQuery::from_arguments(&arguments)?;
            return self.platform.query(&query).await;
        }

        match self.tools.registry().find_by_remote_name(function).await? {
            Some(tool) => Ok(self.tools.execute_tool(tool, arguments).await?.into_output()),
            None => Ok(json!({"error": format!("Unknown function: {function}")})),
        }
    }

    async fn store_transcript(
        &self,
        assistant_id: &AssistantId,
        user_id: Option<String>,
        thread_id: &str,
        messages: Vec<ConversationMessage>,
    ) -> Result<(), ApplicationError> {
        let now = Utc::now();
        if self.conversations.replace_messages(thread_id, messages.clone(), now).await? {
            return Ok(());
        }
        self.conversations
            .insert(Conversation {
                id: ConversationId(Uuid::new_v4().to_string()),
                assistant_id: assistant_id.clone(),
                user_id,
                external_thread_id: thread_id.to_string(),
                messages,
                created_at: now,
                updated_at: now,
            })
            .await?;
        Ok(())
    }

    /// Runs one backend call under the turn deadline and the cancel token.
    async fn bounded<T, F>(
        &self,
        deadline: Instant,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<T, ApplicationError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                Err(ApplicationError::Cancelled("conversation run cancelled".to_string()))
            }
            outcome = tokio::time::timeout_at(deadline, call) => match outcome {
                Ok(result) => result.map_err(ApplicationError::from),
                Err(_) => Err(ApplicationError::external(
                    "assistant backend",
                    504,
                    format!("run did not finish within {}s", self.deadline.as_secs_f64()),
                )),
            },
        }
    }
}

async fn cancel_quietly(backend: &dyn AssistantBackend, thread_id: &str, run_id: &str) {
    match tokio::time::timeout(CANCEL_GRACE, backend.cancel_run(thread_id, run_id)).await {
        Ok(Ok(())) => {
            info!(event_name = "agent.conversation.run_cancelled", run_id = %run_id, "remote run cancelled")
        }
        Ok(Err(error)) => warn!(run_id = %run_id, error = %error, "remote run cancel failed"),
        Err(_) => warn!(run_id = %run_id, "remote run cancel timed out"),
    }
}
