use std::sync::Arc;

use partsage_agent::{oracle_from_config, AgentRuntime, HttpQueryEmbedder, OracleError, TracingAuditSink};
use partsage_core::config::{AppConfig, ConfigError};
use partsage_db::{
    connect_with_settings, migrations, CatalogRepository, ContentIndex, DbPool, EmbeddingError,
    SqlCatalogRepository, SqlContentIndex,
};
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub catalog: Arc<dyn CatalogRepository>,
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("embedding client setup failed: {0}")]
    Embedding(#[source] EmbeddingError),
    #[error("reasoning oracle setup failed: {0}")]
    Oracle(#[source] OracleError),
}

#[cfg(test)]
pub async fn bootstrap(options: partsage_core::config::LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        llm_provider = config.llm.provider.as_str(),
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

    let embedder =
        HttpQueryEmbedder::from_config(&config.embedding).map_err(BootstrapError::Embedding)?;
    let index = Arc::new(SqlContentIndex::new(db_pool.clone(), Arc::new(embedder)));
    match index.chunk_count().await {
        Ok(0) => warn!(
            event_name = "system.bootstrap.index_empty",
            correlation_id = "bootstrap",
            "content index has no chunks; run `partsage import-chunks` to load guides and policies"
        ),
        Ok(chunks) => info!(
            event_name = "system.bootstrap.index_ready",
            correlation_id = "bootstrap",
            chunks,
            "content index ready"
        ),
        Err(error) => warn!(
            event_name = "system.bootstrap.index_unreadable",
            correlation_id = "bootstrap",
            error = %error,
            "could not count content index chunks"
        ),
    }

    let oracle = oracle_from_config(&config.llm).map_err(BootstrapError::Oracle)?;
    let catalog: Arc<dyn CatalogRepository> = Arc::new(SqlCatalogRepository::new(db_pool.clone()));
    let runtime = AgentRuntime::from_config(
        &config,
        Arc::clone(&catalog),
        index,
        oracle,
        Arc::new(TracingAuditSink),
    );

    Ok(Application { config, db_pool, catalog, runtime: Arc::new(runtime) })
}
