use std::sync::Arc;

use partsage_agent::HttpQueryEmbedder;
use partsage_core::config::{AppConfig, LlmProvider, LoadOptions};
use partsage_db::{connect_with_settings, migrations, ContentIndex, SqlContentIndex};
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_llm_credentials(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["llm_credentials", "database_connectivity", "catalog_seeded", "content_index"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_credentials(config: &AppConfig) -> DoctorCheck {
    let llm = &config.llm;
    let (status, details) = match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let present = llm
                .api_key
                .as_ref()
                .is_some_and(|key| !key.expose_secret().trim().is_empty());
            if present {
                (CheckStatus::Pass, format!("{} api key present", llm.provider.as_str()))
            } else {
                (CheckStatus::Fail, format!("{} requires llm.api_key", llm.provider.as_str()))
            }
        }
        LlmProvider::Ollama => match llm.base_url.as_deref() {
            Some(base_url) if !base_url.trim().is_empty() => {
                (CheckStatus::Pass, format!("ollama endpoint `{base_url}`"))
            }
            _ => (CheckStatus::Fail, "ollama requires llm.base_url".to_string()),
        },
    };
    DoctorCheck { name: "llm_credentials", status, details }
}

/// Connectivity first; the catalog and index checks need a migrated schema.
fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            }];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: format!("failed to connect to database: {error}"),
                    },
                    skipped_after_connect("catalog_seeded"),
                    skipped_after_connect("content_index"),
                ];
            }
        };

        let mut checks = vec![DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        }];

        if let Err(error) = migrations::run_pending(&pool).await {
            checks.push(DoctorCheck {
                name: "catalog_seeded",
                status: CheckStatus::Fail,
                details: format!("migrations failed: {error}"),
            });
            checks.push(skipped_after_connect("content_index"));
            pool.close().await;
            return checks;
        }

        let parts = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM part").fetch_one(&pool).await;
        checks.push(match parts {
            Ok(0) => DoctorCheck {
                name: "catalog_seeded",
                status: CheckStatus::Fail,
                details: "catalog is empty; run `partsage seed`".to_string(),
            },
            Ok(count) => DoctorCheck {
                name: "catalog_seeded",
                status: CheckStatus::Pass,
                details: format!("{count} parts in catalog"),
            },
            Err(error) => DoctorCheck {
                name: "catalog_seeded",
                status: CheckStatus::Fail,
                details: format!("could not count parts: {error}"),
            },
        });

        checks.push(match HttpQueryEmbedder::from_config(&config.embedding) {
            Ok(embedder) => {
                let index = SqlContentIndex::new(pool.clone(), Arc::new(embedder));
                match index.chunk_count().await {
                    Ok(0) => DoctorCheck {
                        name: "content_index",
                        status: CheckStatus::Fail,
                        details: "content index is empty; run `partsage import-chunks <file>`"
                            .to_string(),
                    },
                    Ok(count) => DoctorCheck {
                        name: "content_index",
                        status: CheckStatus::Pass,
                        details: format!("{count} chunks indexed"),
                    },
                    Err(error) => DoctorCheck {
                        name: "content_index",
                        status: CheckStatus::Fail,
                        details: format!("could not read content index: {error}"),
                    },
                }
            }
            Err(error) => DoctorCheck {
                name: "content_index",
                status: CheckStatus::Fail,
                details: format!("embedding client setup failed: {error}"),
            },
        });

        pool.close().await;
        checks
    })
}

fn skipped_after_connect(name: &'static str) -> DoctorCheck {
    DoctorCheck {
        name,
        status: CheckStatus::Skipped,
        details: "skipped because the database is unavailable".to_string(),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
