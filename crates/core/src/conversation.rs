//! State machine for one conversation run against a hosted backend.
//!
//! The run loop threads a [`RunState`] through every network step so the
//! allowed sequence can be checked without any I/O.

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Run status as reported by the hosted backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Completed => "completed",
            Self::Incomplete => "incomplete",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "in_progress" => Some(Self::InProgress),
            "requires_action" => Some(Self::RequiresAction),
            "cancelling" => Some(Self::Cancelling),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            "completed" => Some(Self::Completed),
            "incomplete" => Some(Self::Incomplete),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NoThread,
    ThreadCreated,
    MessagePosted,
    RunQueued,
    RunInProgress,
    RunRequiresAction,
    RunCompleted,
    RunFailed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunEvent {
    ThreadCreated,
    /// Caller supplied an existing thread id.
    ThreadReused,
    MessagePosted,
    /// Run created or polled; carries the status the backend reported.
    Status(RunStatus),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunCompleted | Self::RunFailed)
    }

    /// States in which the loop keeps polling the backend.
    pub fn is_polling(&self) -> bool {
        matches!(self, Self::RunQueued | Self::RunInProgress | Self::RunRequiresAction)
    }

    pub fn on_status(status: RunStatus) -> Self {
        match status {
            RunStatus::Queued => Self::RunQueued,
            RunStatus::InProgress | RunStatus::Cancelling => Self::RunInProgress,
            RunStatus::RequiresAction => Self::RunRequiresAction,
            RunStatus::Completed => Self::RunCompleted,
            RunStatus::Cancelled
            | RunStatus::Failed
            | RunStatus::Incomplete
            | RunStatus::Expired => Self::RunFailed,
        }
    }

    pub fn advance(self, event: RunEvent) -> Result<Self, DomainError> {
        let next = match (self, event) {
            (Self::NoThread, RunEvent::ThreadCreated | RunEvent::ThreadReused) => {
                Self::ThreadCreated
            }
            (Self::ThreadCreated, RunEvent::MessagePosted) => Self::MessagePosted,
            (Self::MessagePosted, RunEvent::Status(status)) => Self::on_status(status),
            (state, RunEvent::Status(status)) if state.is_polling() => Self::on_status(status),
            (state, event) => {
                return Err(DomainError::InvariantViolation(format!(
                    "conversation run cannot apply {event:?} in state {state:?}"
                )))
            }
        };
        Ok(next)
    }
}
