use agentforge_agent::backend::BackendError;
use agentforge_agent::AgentRuntime;
use agentforge_core::config::{AppConfig, ConfigError, LoadOptions};
use agentforge_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: AgentRuntime,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("external client setup failed: {0}")]
    Client(#[from] BackendError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let runtime = AgentRuntime::from_pool(db_pool.clone(), &config)?;
    let discovery = runtime.registry().discover().await;
    match discovery {
        Ok(discovery) => info!(
            event_name = "system.bootstrap.tools_discovered",
            correlation_id = "bootstrap",
            discovered = discovery.discovered,
            "built-in tools registered"
        ),
        Err(error) => warn!(
            event_name = "system.bootstrap.tools_discovery_failed",
            correlation_id = "bootstrap",
            error = %error,
            "built-in tools could not be registered"
        ),
    }

    Ok(Application { config, db_pool, runtime })
}
