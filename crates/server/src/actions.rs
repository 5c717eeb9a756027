//! JSON action surface and live execution updates.
//!
//! - `POST /actions`                 - run one command, body `{action, ...}`
//! - `POST /events`                  - webhook, body `{event, data}`
//! - `GET  /executions/{id}/events`  - server-sent execution snapshots

use std::convert::Infallible;

use agentforge_agent::commands::Command;
use agentforge_agent::AgentRuntime;
use agentforge_core::domain::execution::{Execution, ExecutionId};
use agentforge_core::errors::{ApplicationError, InterfaceError};
use async_stream::stream;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ActionState {
    runtime: AgentRuntime,
    shutdown: CancellationToken,
}

pub fn router(runtime: AgentRuntime, shutdown: CancellationToken) -> Router {
    Router::new()
        .route("/actions", post(run_action))
        .route("/events", post(receive_event))
        .route("/executions/{id}/events", get(execution_events))
        .with_state(ActionState { runtime, shutdown })
}

#[derive(Debug, Serialize)]
pub struct ActionFailure {
    pub success: bool,
    pub error_class: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub correlation_id: String,
}

/// An application error paired with the request it belongs to.
pub struct ActionError {
    error: ApplicationError,
    correlation_id: String,
}

impl IntoResponse for ActionError {
    fn into_response(self) -> Response {
        let error_class = self.error.error_class();
        let message = self.error.to_string();
        let interface = self.error.into_interface(self.correlation_id.clone());
        let (status, errors) = match &interface {
            InterfaceError::BadRequest { errors, .. } => (StatusCode::BAD_REQUEST, errors.clone()),
            InterfaceError::NotFound { .. } => (StatusCode::NOT_FOUND, Vec::new()),
            InterfaceError::Upstream { .. } => (StatusCode::BAD_GATEWAY, Vec::new()),
            InterfaceError::ServiceUnavailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, Vec::new()),
            InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()),
        };
        if status.is_server_error() {
            warn!(
                event_name = "server.action.failed",
                correlation_id = %self.correlation_id,
                error_class,
                error = %message,
                "action failed"
            );
        }
        let body = ActionFailure {
            success: false,
            error_class,
            message,
            errors,
            correlation_id: self.correlation_id,
        };
        (status, Json(body)).into_response()
    }
}

/// Adds `success: true` unless the payload already carries a flag.
fn success_body(payload: Value) -> Value {
    let mut body = match payload {
        Value::Object(fields) => fields,
        other => {
            let mut fields = Map::new();
            fields.insert("data".to_string(), other);
            fields
        }
    };
    body.entry("success").or_insert(Value::Bool(true));
    Value::Object(body)
}

pub async fn run_action(
    State(state): State<ActionState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ActionError> {
    let correlation_id = Uuid::new_v4().to_string();
    let fail = |error| ActionError { error, correlation_id: correlation_id.clone() };

    let command = Command::parse(body).map_err(fail)?;
    let action = command.name();
    let payload = state
        .runtime
        .dispatcher()
        .dispatch(command, state.shutdown.child_token())
        .await
        .map_err(fail)?;
    info!(event_name = "server.action.completed", correlation_id = %correlation_id, action, "action completed");
    Ok(Json(success_body(payload)))
}

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

pub async fn receive_event(
    State(state): State<ActionState>,
    Json(request): Json<EventRequest>,
) -> Result<Json<Value>, ActionError> {
    let correlation_id = Uuid::new_v4().to_string();
    let event = request.event.filter(|event| !event.trim().is_empty()).ok_or_else(|| ActionError {
        error: ApplicationError::validation("event is required"),
        correlation_id: correlation_id.clone(),
    })?;

    let summary = state
        .runtime
        .dispatcher()
        .workflows()
        .dispatch_event(&event, request.data.unwrap_or_else(|| Value::Object(Map::new())))
        .await
        .map_err(|error| ActionError { error, correlation_id: correlation_id.clone() })?;
    info!(
        event_name = "server.event.received",
        correlation_id = %correlation_id,
        event = %event,
        triggered = summary.workflows_triggered,
        "webhook event handled"
    );
    Ok(Json(serde_json::json!({
        "success": true,
        "workflows_triggered": summary.workflows_triggered,
        "execution_ids": summary.execution_ids,
    })))
}

/// Streams the current row, then every later write to it, and ends once the
/// execution is terminal.
pub async fn execution_events(
    State(state): State<ActionState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ActionError> {
    let id = ExecutionId(id);
    let workflows = state.runtime.dispatcher().workflows().clone();
    let mut updates = state.runtime.events().subscribe();
    let current = workflows.get_execution(&id).await.map_err(|error| ActionError {
        error,
        correlation_id: Uuid::new_v4().to_string(),
    })?;
    let shutdown = state.shutdown.clone();

    let events = stream! {
        let finished = current.status.is_terminal();
        yield Ok(snapshot(&current));
        if finished {
            return;
        }

        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = updates.recv() => received,
            };
            match received {
                Ok(execution) if execution.id == id => {
                    let finished = execution.status.is_terminal();
                    yield Ok(snapshot(&execution));
                    if finished {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(execution_id = %id.0, skipped, "execution stream lagged; reloading");
                    match workflows.get_execution(&id).await {
                        Ok(execution) => {
                            let finished = execution.status.is_terminal();
                            yield Ok(snapshot(&execution));
                            if finished {
                                break;
                            }
                        }
                        Err(error) => {
                            warn!(execution_id = %id.0, error = %error, "execution reload failed");
                            break;
                        }
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn snapshot(execution: &Execution) -> Event {
    let event = Event::default().id(execution.id.0.clone());
    match serde_json::to_string(execution) {
        Ok(data) => event.event("execution").data(data),
        Err(error) => event.event("error").data(error.to_string()),
    }
}
