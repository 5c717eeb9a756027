use agentforge_agent::AgentRuntime;
use serde_json::json;

use crate::commands::{current_thread_runtime, load_config, migrated_pool, CommandResult, Preflight};

/// Upserts the built-in tools. Safe to repeat; usage statistics survive.
pub fn run() -> CommandResult {
    let config = match load_config() {
        Ok(config) => config,
        Err(preflight) => return preflight.into_result("discover"),
    };
    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(preflight) => return preflight.into_result("discover"),
    };

    let result = runtime.block_on(async {
        let pool = migrated_pool(&config).await?;
        let agents = AgentRuntime::from_pool(pool.clone(), &config).map_err(|error| Preflight {
            error_class: "client_setup",
            message: error.to_string(),
            exit_code: 6,
        })?;
        let discovery = agents.registry().discover().await.map_err(|error| Preflight {
            error_class: error.error_class(),
            message: error.to_string(),
            exit_code: 7,
        })?;
        pool.close().await;
        Ok::<_, Preflight>(discovery)
    });

    match result {
        Ok(discovery) => {
            let names: Vec<&str> =
                discovery.tools.iter().map(|tool| tool.function_name.as_str()).collect();
            CommandResult::success_with(
                "discover",
                format!("registered {} built-in tools", discovery.discovered),
                Some(json!({"discovered": discovery.discovered, "tools": names})),
            )
        }
        Err(preflight) => preflight.into_result("discover"),
    }
}
