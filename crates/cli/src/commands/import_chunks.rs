use std::fs;
use std::path::Path;
use std::sync::Arc;

use partsage_agent::HttpQueryEmbedder;
use partsage_db::{ContentIndex, EmbeddedChunk, SqlContentIndex};
use serde_json::json;

use crate::commands::{async_runtime, load_config, open_database, CommandResult, StepFailure};

/// Loads a JSONL file where every non-blank line is one chunk with its
/// pre-computed embedding. Re-importing a chunk id replaces it.
pub fn run(path: &Path) -> CommandResult {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "import-chunks",
                "input_read",
                format!("could not read `{}`: {error}", path.display()),
                7,
            );
        }
    };
    let records = match parse_records(&raw) {
        Ok(records) => records,
        Err(message) => return CommandResult::failure("import-chunks", "input_parse", message, 7),
    };

    let config = match load_config("import-chunks") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime("import-chunks") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result: Result<u64, StepFailure> = runtime.block_on(async {
        let embedder = HttpQueryEmbedder::from_config(&config.embedding)
            .map_err(|error| ("embedding_setup", error.to_string(), 6u8))?;
        let pool = open_database(&config).await?;
        let index = SqlContentIndex::new(pool.clone(), Arc::new(embedder));

        let imported = import(&index, &records).await;
        let total = index.chunk_count().await;
        pool.close().await;

        imported?;
        total.map_err(|error| ("import_execution", error.to_string(), 6u8))
    });

    match result {
        Ok(total) => CommandResult::success_with_data(
            "import-chunks",
            format!("imported {} chunks from {}", records.len(), path.display()),
            Some(json!({ "imported": records.len(), "index_size": total })),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("import-chunks", error_class, message, exit_code)
        }
    }
}

/// Checks every line against the index dimension, then writes the whole file
/// in one transaction.
async fn import(index: &SqlContentIndex, records: &[Record]) -> Result<(), StepFailure> {
    let expected = index
        .embedding_dimension()
        .await
        .map_err(|error| ("import_execution", error.to_string(), 6u8))?;
    check_dimensions(records, expected).map_err(|message| ("input_dimension", message, 7u8))?;

    let chunks = records.iter().map(|record| record.chunk.clone()).collect::<Vec<_>>();
    index
        .import_all(&chunks)
        .await
        .map_err(|error| ("import_execution", format!("nothing imported: {error}"), 6u8))
}

/// One parsed chunk and the 1-based line it came from.
#[derive(Debug)]
struct Record {
    line: usize,
    chunk: EmbeddedChunk,
}

fn parse_records(raw: &str) -> Result<Vec<Record>, String> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str::<EmbeddedChunk>(line)
                .map(|chunk| Record { line: index + 1, chunk })
                .map_err(|error| format!("line {}: {error}", index + 1))
        })
        .collect()
}

fn check_dimensions(records: &[Record], indexed: Option<usize>) -> Result<(), String> {
    let first = records.first().map(|record| record.chunk.embedding.len());
    let Some(expected) = indexed.or(first) else {
        return Ok(());
    };
    match records.iter().find(|record| record.chunk.embedding.len() != expected) {
        Some(record) => Err(format!(
            "line {}: chunk `{}` has {} embedding dimensions, index expects {expected}",
            record.line,
            record.chunk.chunk.chunk_id,
            record.chunk.embedding.len()
        )),
        None => Ok(()),
    }
}
