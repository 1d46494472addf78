use std::sync::Arc;

use partsage_agent::{
    oracle_from_config, AgentRuntime, CancellationToken, ChatRequest, HttpQueryEmbedder,
    TracingAuditSink,
};
use partsage_core::errors::ApplicationError;
use partsage_db::{SqlCatalogRepository, SqlContentIndex};

use crate::commands::{async_runtime, load_config, open_database, CommandResult, StepFailure};

/// One question through the full runtime, printed as a JSON reply.
pub fn run(message: &str) -> CommandResult {
    let config = match load_config("ask") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime("ask") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result: Result<_, StepFailure> = runtime.block_on(async {
        let oracle =
            oracle_from_config(&config.llm).map_err(|error| ("llm_setup", error.to_string(), 6u8))?;
        let embedder = HttpQueryEmbedder::from_config(&config.embedding)
            .map_err(|error| ("embedding_setup", error.to_string(), 6u8))?;
        let pool = open_database(&config).await?;

        let agent = AgentRuntime::from_config(
            &config,
            Arc::new(SqlCatalogRepository::new(pool.clone())),
            Arc::new(SqlContentIndex::new(pool.clone(), Arc::new(embedder))),
            oracle,
            Arc::new(TracingAuditSink),
        );
        let reply = agent.handle_message(ChatRequest::new(message), &CancellationToken::new()).await;
        pool.close().await;

        reply.map_err(|error| match error {
            ApplicationError::InvalidRequest(detail) => ("invalid_request", detail, 7u8),
            other => ("agent_failure", other.to_string(), 6u8),
        })
    });

    match result {
        Ok(reply) => CommandResult::success_with_data(
            "ask",
            reply.reply.clone(),
            serde_json::to_value(&reply.metadata).ok(),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("ask", error_class, message, exit_code)
        }
    }
}
