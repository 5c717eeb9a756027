use thiserror::Error;

use crate::domain::execution::ExecutionStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid execution transition from {from:?} to {to:?}")]
    InvalidExecutionTransition { from: ExecutionStatus, to: ExecutionStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("validation failed: {}", errors.join("; "))]
    Validation { errors: Vec<String> },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("{service} returned {status}: {body}")]
    ExternalService { service: String, status: u16, body: String },
    #[error("execution failure: {0}")]
    ExecutionFailure(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("cancelled: {0}")]
    Cancelled(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl ApplicationError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { errors: vec![message.into()] }
    }

    pub fn external(service: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::ExternalService { service: service.into(), status, body: body.into() }
    }

    /// Stable machine-readable class, surfaced to callers as `error_class`.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound(_) => "not_found",
            Self::Configuration(_) => "configuration",
            Self::ExternalService { .. } => "external_service",
            Self::ExecutionFailure(_) => "execution_failure",
            Self::Persistence(_) => "persistence",
            Self::Cancelled(_) => "cancelled",
            Self::Domain(_) => "domain",
        }
    }

    /// Itemized validation errors; empty for every other class.
    pub fn itemized(&self) -> &[String] {
        match self {
            Self::Validation { errors } => errors,
            _ => &[],
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, errors: Vec<String>, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("upstream failure: {message}")]
    Upstream { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The referenced resource does not exist.",
            Self::Upstream { .. } => "An external service rejected the request.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Upstream { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Upstream { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Validation { errors } => Self::BadRequest {
                message: "validation failed".to_owned(),
                errors,
                correlation_id: unassigned(),
            },
            ApplicationError::Domain(error) => Self::BadRequest {
                message: error.to_string(),
                errors: Vec::new(),
                correlation_id: unassigned(),
            },
            ApplicationError::NotFound(message) => {
                Self::NotFound { message, correlation_id: unassigned() }
            }
            error @ ApplicationError::ExternalService { .. } => {
                Self::Upstream { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Persistence(message) | ApplicationError::Cancelled(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Configuration(message)
            | ApplicationError::ExecutionFailure(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, InterfaceError};

    #[test]
    fn validation_error_maps_to_bad_request_with_itemized_errors() {
        let interface = ApplicationError::Validation {
            errors: vec![
                "Assistant[0] missing required field: name".to_owned(),
                "Tool[1] must specify which agents use it (used_by)".to_owned(),
            ],
        }
        .into_interface("req-1");

        match interface {
            InterfaceError::BadRequest { errors, correlation_id, .. } => {
                assert_eq!(errors.len(), 2);
                assert_eq!(correlation_id, "req-1");
            }
            other => panic!("expected bad request, got {other:?}"),
        }
    }

    #[test]
    fn external_service_error_keeps_raw_body() {
        let error = ApplicationError::external("function host", 502, "{\"error\":\"bad gateway\"}");
        assert!(error.to_string().contains("bad gateway"));

        let interface = error.into_interface("req-2");
        assert!(matches!(interface, InterfaceError::Upstream { .. }));
        assert_eq!(interface.user_message(), "An external service rejected the request.");
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface = ApplicationError::Configuration("assistants.api_key is not configured".into())
            .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.correlation_id(), "req-3");
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }

    #[test]
    fn error_class_is_stable_per_variant() {
        assert_eq!(ApplicationError::NotFound("tool t-1".into()).error_class(), "not_found");
        assert_eq!(ApplicationError::validation("x").itemized(), ["x".to_owned()]);
        assert!(ApplicationError::Persistence("locked".into()).itemized().is_empty());
    }
}
