pub mod config;
pub mod discover;
pub mod migrate;
pub mod validate;

use agentforge_core::config::{AppConfig, LoadOptions};
use agentforge_db::{connect_with_settings, migrations, DbPool};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with(command, message, None)
    }

    pub fn success_with(command: &str, message: impl Into<String>, details: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            details,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::failure_with(command, error_class, message, exit_code, None)
    }

    pub fn failure_with(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
        details: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            details,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Failure raised while preparing a command, mapped to a class and exit code.
pub(crate) struct Preflight {
    pub error_class: &'static str,
    pub message: String,
    pub exit_code: u8,
}

impl Preflight {
    pub(crate) fn into_result(self, command: &str) -> CommandResult {
        CommandResult::failure(command, self.error_class, self.message, self.exit_code)
    }
}

pub(crate) fn load_config() -> Result<AppConfig, Preflight> {
    AppConfig::load(LoadOptions::default()).map_err(|error| Preflight {
        error_class: "config_validation",
        message: format!("configuration issue: {error}"),
        exit_code: 2,
    })
}

pub(crate) fn current_thread_runtime() -> Result<tokio::runtime::Runtime, Preflight> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| Preflight {
        error_class: "runtime_init",
        message: format!("failed to initialize async runtime: {error}"),
        exit_code: 3,
    })
}

/// Connects and applies pending migrations.
pub(crate) async fn migrated_pool(config: &AppConfig) -> Result<DbPool, Preflight> {
    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(|error| Preflight {
        error_class: "db_connectivity",
        message: error.to_string(),
        exit_code: 4,
    })?;
    migrations::run_pending(&pool).await.map_err(|error| Preflight {
        error_class: "migration",
        message: error.to_string(),
        exit_code: 5,
    })?;
    Ok(pool)
}
