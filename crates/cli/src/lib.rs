pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "partsage",
    about = "PartSage operator CLI",
    long_about = "Operate PartSage readiness, migrations, demo data, content import, and single questions.",
    after_help = "Examples:\n  partsage doctor --json\n  partsage seed\n  partsage import-chunks data/chunks.jsonl\n  partsage ask \"Is PS11752778 in stock?\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run startup preflight checks and return structured status output")]
    Start,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo catalog: parts, appliance models, and compatibility edges")]
    Seed,
    #[command(about = "Import content chunks with pre-computed embeddings from a JSONL file")]
    ImportChunks {
        #[arg(help = "Path to a JSONL file, one chunk per line")]
        path: PathBuf,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, LLM credentials, DB connectivity, catalog, and index")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Answer one question through the full assistant runtime")]
    Ask {
        #[arg(help = "The customer message")]
        message: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Start => commands::start::run(),
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::ImportChunks { path } => commands::import_chunks::run(&path),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Ask { message } => commands::ask::run(&message),
    };

    tracing::debug!(
        event_name = "cli.command.completed",
        correlation_id = "cli",
        exit_code = result.exit_code,
        "command completed"
    );
    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
