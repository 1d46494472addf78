use partsage_agent::oracle_from_config;
use partsage_db::ping;

use crate::commands::{async_runtime, load_config, open_database, CommandResult, StepFailure};

/// Preflight for `partsage-server`: config, database, migrations and oracle
/// client construction. Serving itself is done by the server binary.
pub fn run() -> CommandResult {
    let config = match load_config("start") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime("start") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result: Result<(), StepFailure> = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let reachable = ping(&pool).await.map_err(|error| ("db_connectivity", error.to_string(), 4u8));
        pool.close().await;
        reachable?;
        oracle_from_config(&config.llm)
            .map(|_| ())
            .map_err(|error| ("llm_setup", error.to_string(), 6u8))
    });

    match result {
        Ok(()) => CommandResult::success(
            "start",
            format!(
                "startup preflight passed; run `partsage-server` to serve on {}:{} (llm: {} {})",
                config.server.bind_address,
                config.server.port,
                config.llm.provider.as_str(),
                config.llm.model
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("start", error_class, message, exit_code)
        }
    }
}
