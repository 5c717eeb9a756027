use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use agentforge_core::config::AppConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use toml::Value;

use crate::commands::{load_config, CommandResult};

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

pub fn run() -> CommandResult {
    let config = match load_config() {
        Ok(config) => config,
        Err(preflight) => return preflight.into_result("config"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let entries: Vec<ConfigEntry> = effective_values(&config)
        .into_iter()
        .map(|(key, env_keys, value)| ConfigEntry {
            key,
            value,
            source: field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref()),
        })
        .collect();

    match serde_json::to_value(&entries) {
        Ok(details) => CommandResult::success_with(
            "config",
            "effective config (source precedence: env > file > default)",
            Some(details),
        ),
        Err(error) => CommandResult::failure("config", "serialization", error.to_string(), 1),
    }
}

type Row = (&'static str, &'static [&'static str], String);

fn row(key: &'static str, env_keys: &'static [&'static str], value: String) -> Row {
    (key, env_keys, value)
}

fn effective_values(config: &AppConfig) -> Vec<Row> {
    vec![
        row("database.url", &["AGENTFORGE_DATABASE_URL"], config.database.url.clone()),
        row(
            "database.max_connections",
            &["AGENTFORGE_DATABASE_MAX_CONNECTIONS"],
            config.database.max_connections.to_string(),
        ),
        row(
            "database.timeout_secs",
            &["AGENTFORGE_DATABASE_TIMEOUT_SECS"],
            config.database.timeout_secs.to_string(),
        ),
        row(
            "assistants.api_key",
            &["AGENTFORGE_ASSISTANTS_API_KEY", "OPENAI_API_KEY"],
            redact_secret(config.assistants.api_key.as_ref()),
        ),
        row("assistants.base_url", &["AGENTFORGE_ASSISTANTS_BASE_URL"], config.assistants.base_url.clone()),
        row(
            "assistants.default_model",
            &["AGENTFORGE_ASSISTANTS_DEFAULT_MODEL"],
            config.assistants.default_model.clone(),
        ),
        row(
            "assistants.poll_interval_ms",
            &["AGENTFORGE_ASSISTANTS_POLL_INTERVAL_MS"],
            config.assistants.poll_interval_ms.to_string(),
        ),
        row(
            "assistants.run_deadline_secs",
            &["AGENTFORGE_ASSISTANTS_RUN_DEADLINE_SECS"],
            config.assistants.run_deadline_secs.to_string(),
        ),
        row(
            "functions.base_url",
            &["AGENTFORGE_FUNCTIONS_BASE_URL"],
            config.functions.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        row(
            "functions.service_key",
            &["AGENTFORGE_FUNCTIONS_SERVICE_KEY"],
            redact_secret(config.functions.service_key.as_ref()),
        ),
        row(
            "workflows.action_tables",
            &["AGENTFORGE_WORKFLOWS_ACTION_TABLES"],
            config.workflows.action_tables.join(","),
        ),
        row("workflows.ai_model", &["AGENTFORGE_WORKFLOWS_AI_MODEL"], config.workflows.ai_model.clone()),
        row("server.bind_address", &["AGENTFORGE_SERVER_BIND_ADDRESS"], config.server.bind_address.clone()),
        row("server.port", &["AGENTFORGE_SERVER_PORT"], config.server.port.to_string()),
        row(
            "logging.level",
            &["AGENTFORGE_LOGGING_LEVEL", "AGENTFORGE_LOG_LEVEL"],
            config.logging.level.clone(),
        ),
        row(
            "logging.format",
            &["AGENTFORGE_LOGGING_FORMAT", "AGENTFORGE_LOG_FORMAT"],
            format!("{:?}", config.logging.format).to_lowercase(),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["agentforge.toml", "config/agentforge.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keeps a short prefix such as `sk-` so operators can tell keys apart.
fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once('-') {
        Some((prefix, _)) if prefix.len() <= 8 => format!("{prefix}-***"),
        _ => "<redacted>".to_string(),
    }
}
