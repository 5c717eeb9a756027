use crate::commands::{current_thread_runtime, load_config, migrated_pool, CommandResult, Preflight};

pub fn run() -> CommandResult {
    let config = match load_config() {
        Ok(config) => config,
        Err(preflight) => return preflight.into_result("migrate"),
    };
    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(preflight) => return preflight.into_result("migrate"),
    };

    let result = runtime.block_on(async {
        let pool = migrated_pool(&config).await?;
        pool.close().await;
        Ok::<(), Preflight>(())
    });

    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(preflight) => preflight.into_result("migrate"),
    }
}
