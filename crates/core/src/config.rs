use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::steps::is_identifier;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub assistants: AssistantsConfig,
    pub functions: FunctionsConfig,
    pub workflows: WorkflowsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Hosted conversational backend (assistants, threads, runs, chat completions).
#[derive(Clone, Debug)]
pub struct AssistantsConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub default_model: String,
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub run_deadline_secs: u64,
}

/// Function host that backs registered tools.
#[derive(Clone, Debug)]
pub struct FunctionsConfig {
    pub base_url: Option<String>,
    pub service_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WorkflowsConfig {
    /// Tables that `action` steps may write to.
    pub action_tables: Vec<String>,
    pub ai_model: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub assistants_api_key: Option<String>,
    pub assistants_base_url: Option<String>,
    pub functions_base_url: Option<String>,
    pub functions_service_key: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_ACTION_TABLES: [&str; 2] = ["notifications", "agent_notes"];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://agentforge.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            assistants: AssistantsConfig {
                api_key: None,
                base_url: "https://api.openai.com/v1".to_string(),
                default_model: "gpt-4o".to_string(),
                timeout_secs: 60,
                poll_interval_ms: 1000,
                run_deadline_secs: 120,
            },
            functions: FunctionsConfig { base_url: None, service_key: None, timeout_secs: 60 },
            workflows: WorkflowsConfig {
                action_tables: DEFAULT_ACTION_TABLES.iter().map(|table| table.to_string()).collect(),
                ai_model: "gpt-4o-mini".to_string(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

fn present(secret: Option<&SecretString>) -> Option<&SecretString> {
    secret.filter(|value| !value.expose_secret().trim().is_empty())
}

impl AssistantsConfig {
    /// API key, when one is provisioned and non-blank.
    pub fn credential(&self) -> Option<&SecretString> {
        present(self.api_key.as_ref())
    }
}

impl FunctionsConfig {
    /// Base URL and service key, when both are provisioned.
    pub fn credential(&self) -> Option<(&str, &SecretString)> {
        let base_url = self.base_url.as_deref().filter(|url| !url.trim().is_empty())?;
        let key = present(self.service_key.as_ref())?;
        Some((base_url, key))
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("agentforge.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(assistants) = patch.assistants {
            if let Some(api_key_value) = assistants.api_key {
                self.assistants.api_key = Some(secret_value(api_key_value));
            }
            if let Some(base_url) = assistants.base_url {
                self.assistants.base_url = base_url;
            }
            if let Some(default_model) = assistants.default_model {
                self.assistants.default_model = default_model;
            }
            if let Some(timeout_secs) = assistants.timeout_secs {
                self.assistants.timeout_secs = timeout_secs;
            }
            if let Some(poll_interval_ms) = assistants.poll_interval_ms {
                self.assistants.poll_interval_ms = poll_interval_ms;
            }
            if let Some(run_deadline_secs) = assistants.run_deadline_secs {
                self.assistants.run_deadline_secs = run_deadline_secs;
            }
        }

        if let Some(functions) = patch.functions {
            if let Some(base_url) = functions.base_url {
                self.functions.base_url = Some(base_url);
            }
            if let Some(service_key_value) = functions.service_key {
                self.functions.service_key = Some(secret_value(service_key_value));
            }
            if let Some(timeout_secs) = functions.timeout_secs {
                self.functions.timeout_secs = timeout_secs;
            }
        }

        if let Some(workflows) = patch.workflows {
            if let Some(action_tables) = workflows.action_tables {
                self.workflows.action_tables = action_tables;
            }
            if let Some(ai_model) = workflows.ai_model {
                self.workflows.ai_model = ai_model;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("AGENTFORGE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("AGENTFORGE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("AGENTFORGE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("AGENTFORGE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("AGENTFORGE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        let api_key = read_env("AGENTFORGE_ASSISTANTS_API_KEY").or_else(|| read_env("OPENAI_API_KEY"));
        if let Some(value) = api_key {
            self.assistants.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("AGENTFORGE_ASSISTANTS_BASE_URL") {
            self.assistants.base_url = value;
        }
        if let Some(value) = read_env("AGENTFORGE_ASSISTANTS_DEFAULT_MODEL") {
            self.assistants.default_model = value;
        }
        if let Some(value) = read_env("AGENTFORGE_ASSISTANTS_TIMEOUT_SECS") {
            self.assistants.timeout_secs = parse_u64("AGENTFORGE_ASSISTANTS_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("AGENTFORGE_ASSISTANTS_POLL_INTERVAL_MS") {
            self.assistants.poll_interval_ms =
                parse_u64("AGENTFORGE_ASSISTANTS_POLL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = read_env("AGENTFORGE_ASSISTANTS_RUN_DEADLINE_SECS") {
            self.assistants.run_deadline_secs =
                parse_u64("AGENTFORGE_ASSISTANTS_RUN_DEADLINE_SECS", &value)?;
        }

        if let Some(value) = read_env("AGENTFORGE_FUNCTIONS_BASE_URL") {
            self.functions.base_url = Some(value);
        }
        if let Some(value) = read_env("AGENTFORGE_FUNCTIONS_SERVICE_KEY") {
            self.functions.service_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("AGENTFORGE_FUNCTIONS_TIMEOUT_SECS") {
            self.functions.timeout_secs = parse_u64("AGENTFORGE_FUNCTIONS_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("AGENTFORGE_WORKFLOWS_ACTION_TABLES") {
            self.workflows.action_tables = value
                .split(',')
                .map(str::trim)
                .filter(|table| !table.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = read_env("AGENTFORGE_WORKFLOWS_AI_MODEL") {
            self.workflows.ai_model = value;
        }

        if let Some(value) = read_env("AGENTFORGE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("AGENTFORGE_SERVER_PORT") {
            self.server.port = parse_u16("AGENTFORGE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("AGENTFORGE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("AGENTFORGE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("AGENTFORGE_LOGGING_LEVEL").or_else(|| read_env("AGENTFORGE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("AGENTFORGE_LOGGING_FORMAT").or_else(|| read_env("AGENTFORGE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(api_key) = overrides.assistants_api_key {
            self.assistants.api_key = Some(secret_value(api_key));
        }
        if let Some(base_url) = overrides.assistants_base_url {
            self.assistants.base_url = base_url;
        }
        if let Some(base_url) = overrides.functions_base_url {
            self.functions.base_url = Some(base_url);
        }
        if let Some(service_key) = overrides.functions_service_key {
            self.functions.service_key = Some(secret_value(service_key));
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_assistants(&self.assistants)?;
        validate_functions(&self.functions)?;
        validate_workflows(&self.workflows)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("agentforge.toml"), PathBuf::from("config/agentforge.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_http_url(field: &str, url: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

fn validate_assistants(assistants: &AssistantsConfig) -> Result<(), ConfigError> {
    validate_http_url("assistants.base_url", &assistants.base_url)?;

    if assistants.default_model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "assistants.default_model must not be empty".to_string(),
        ));
    }

    if assistants.timeout_secs == 0 || assistants.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "assistants.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if assistants.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "assistants.poll_interval_ms must be greater than zero".to_string(),
        ));
    }

    if assistants.run_deadline_secs == 0 || assistants.run_deadline_secs > 600 {
        return Err(ConfigError::Validation(
            "assistants.run_deadline_secs must be in range 1..=600".to_string(),
        ));
    }

    Ok(())
}

fn validate_functions(functions: &FunctionsConfig) -> Result<(), ConfigError> {
    if let Some(base_url) = &functions.base_url {
        validate_http_url("functions.base_url", base_url)?;
    }

    if functions.timeout_secs == 0 || functions.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "functions.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_workflows(workflows: &WorkflowsConfig) -> Result<(), ConfigError> {
    if let Some(table) = workflows.action_tables.iter().find(|table| !is_identifier(table)) {
        return Err(ConfigError::Validation(format!(
            "workflows.action_tables entry `{table}` is not a valid table name"
        )));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    assistants: Option<AssistantsPatch>,
    functions: Option<FunctionsPatch>,
    workflows: Option<WorkflowsPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AssistantsPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    default_model: Option<String>,
    timeout_secs: Option<u64>,
    poll_interval_ms: Option<u64>,
    run_deadline_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionsPatch {
    base_url: Option<String>,
    service_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowsPatch {
    action_tables: Option<Vec<String>>,
    ai_model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
