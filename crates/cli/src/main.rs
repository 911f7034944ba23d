//! Iris CLI, the main entry point.
//!
//! Commands:
//! - `serve`     Start the HTTP API Artemis talks to
//! - `config`    Show, validate or locate the configuration
//! - `variants`  List the variants a feature can run with

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "iris", about = "Iris: LLM agent pipelines for Artemis", version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true, env = "IRIS_JSON_LOGS")]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Record status updates instead of sending them to Artemis
        #[arg(long)]
        dry_run: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// List the variants of a feature that the configured models can serve
    Variants {
        /// PROGRAMMING_EXERCISE_CHAT or PROMPT_USER
        feature: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration with secrets redacted
    Show {
        /// Print the built-in defaults instead
        #[arg(long)]
        defaults: bool,
    },
    /// Load and validate the configuration
    Validate,
    /// Print the path of the configuration file
    Path,
}

fn init_tracing(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    match cli.command {
        Commands::Serve { port, dry_run } => commands::serve::run(port, dry_run).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show { defaults } => commands::config_cmd::show(defaults)?,
            ConfigAction::Validate => commands::config_cmd::validate()?,
            ConfigAction::Path => commands::config_cmd::path(),
        },
        Commands::Variants { feature } => commands::variants::run(&feature)?,
    }

    Ok(())
}
