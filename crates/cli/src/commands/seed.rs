use partsage_db::{seed_demo_catalog, SeedResult, SqlCatalogRepository};

use crate::commands::{async_runtime, load_config, open_database, CommandResult, StepFailure};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result: Result<SeedResult, StepFailure> = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let repository = SqlCatalogRepository::new(pool.clone());
        let seeded = seed_demo_catalog(&repository)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 6u8));
        pool.close().await;
        seeded
    });

    match result {
        Ok(seeded) => CommandResult::success_with_data(
            "seed",
            summary(&seeded),
            serde_json::to_value(&seeded).ok(),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn summary(seeded: &SeedResult) -> String {
    format!(
        "demo catalog loaded: {} items, {} models, {} compatibility edges",
        seeded.items, seeded.models, seeded.edges
    )
}

#[cfg(test)]
mod tests {
    use partsage_db::SeedResult;

    use super::summary;

    #[test]
    fn summary_counts_every_table() {
        let message = summary(&SeedResult { items: 7, models: 4, edges: 9 });
        assert_eq!(message, "demo catalog loaded: 7 items, 4 models, 9 compatibility edges");
    }
}
