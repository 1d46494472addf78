use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use partsage_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use serde::Serialize;
use toml::Value;

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let entries = effective_values(&config)
        .into_iter()
        .map(|(key, value)| ConfigEntry {
            key,
            value,
            source: field_source(key, config_file_doc.as_ref(), config_file_path.as_deref()),
        })
        .collect::<Vec<_>>();

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(entries.iter().map(render_line));

    CommandResult::success_with_data("config", lines.join("\n"), serde_json::to_value(&entries).ok())
}

fn effective_values(config: &AppConfig) -> Vec<(&'static str, String)> {
    vec![
        ("database.url", config.database.url.clone()),
        ("database.max_connections", config.database.max_connections.to_string()),
        ("database.timeout_secs", config.database.timeout_secs.to_string()),
        ("llm.provider", config.llm.provider.as_str().to_string()),
        ("llm.model", config.llm.model.clone()),
        ("llm.base_url", config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string())),
        (
            "llm.api_key",
            if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" }.to_string(),
        ),
        ("llm.timeout_secs", config.llm.timeout_secs.to_string()),
        ("llm.max_retries", config.llm.max_retries.to_string()),
        ("embedding.base_url", config.embedding.base_url.clone()),
        ("embedding.model", config.embedding.model.clone()),
        ("agent.max_iterations", config.agent.max_iterations.to_string()),
        ("agent.default_result_cap", config.agent.default_result_cap.to_string()),
        ("agent.max_result_cap", config.agent.max_result_cap.to_string()),
        ("agent.default_top_k", config.agent.default_top_k.to_string()),
        ("agent.max_top_k", config.agent.max_top_k.to_string()),
        ("agent.display_cap", config.agent.display_cap.to_string()),
        ("agent.history_window", config.agent.history_window.to_string()),
        ("agent.tool_timeout_secs", config.agent.tool_timeout_secs.to_string()),
        ("server.bind_address", config.server.bind_address.clone()),
        ("server.port", config.server.port.to_string()),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", format!("{:?}", config.logging.format).to_ascii_lowercase()),
    ]
}

/// `agent.max_top_k` -> `PARTSAGE_AGENT_MAX_TOP_K`.
fn env_key(key_path: &str) -> String {
    format!("PARTSAGE_{}", key_path.replace('.', "_").to_ascii_uppercase())
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    let env_key = env_key(key_path);
    if env::var_os(&env_key).is_some() {
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

fn render_line(entry: &ConfigEntry) -> String {
    format!("- {} = {} (source: {})", entry.key, entry.value, entry.source)
}
