//! CaseClaw CLI — the main entry point.
//!
//! Commands:
//! - `ask`     — One question, streamed answer
//! - `chat`    — Interactive session over one report
//! - `reports` — List ingested reports
//! - `index`   — Embed a report's rows for semantic search
//! - `config`  — Create or print the configuration

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod render;
mod runtime;

#[derive(Parser)]
#[command(
    name = "caseclaw",
    about = "CaseClaw — ask questions about LEAPP forensic reports",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask one question and stream the answer
    Ask {
        /// The question
        prompt: String,

        /// Keep history under this session id
        #[arg(short, long)]
        session: Option<String>,

        /// Report (job name) the question is about
        #[arg(short, long, env = "CASECLAW_DATASET")]
        dataset: Option<String>,

        /// Print the raw event stream as newline-delimited JSON
        #[arg(long)]
        raw: bool,
    },

    /// Interactive chat with history
    Chat {
        /// Report (job name) the questions are about
        #[arg(short, long, env = "CASECLAW_DATASET")]
        dataset: Option<String>,
    },

    /// List ingested reports
    Reports,

    /// Embed a report's rows so semanticSearch can find them
    Index {
        /// Report job name
        job_name: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file if none exists
    Init,
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries answers and event streams
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    match cli.command {
        Commands::Ask {
            prompt,
            session,
            dataset,
            raw,
        } => commands::ask::run(prompt, session, dataset, raw).await?,
        Commands::Chat { dataset } => commands::chat::run(dataset).await?,
        Commands::Reports => commands::reports::run().await?,
        Commands::Index { job_name } => commands::index::run(&job_name).await?,
        Commands::Config { action } => match action {
            ConfigAction::Init => commands::config_cmd::init()?,
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Path => commands::config_cmd::path(),
        },
    }

    Ok(())
}
