//! kgagent CLI: the main entry point.
//!
//! Commands:
//! - `chat`   - Interactive chat or single-message mode
//! - `memory` - Print one of the agent's persisted stores
//! - `config` - Show the resolved configuration

use clap::{Parser, Subcommand};

mod commands;

use commands::memory::StoreKind;

#[derive(Parser)]
#[command(
    name = "kgagent",
    about = "kgagent: a knowledge-graph backed conversational agent",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Also print the entities a knowledge-graph hit surfaced
        #[arg(short, long)]
        entities: bool,
    },

    /// Print a persisted store of the configured agent
    Memory {
        #[arg(value_enum, default_value_t = StoreKind::History)]
        kind: StoreKind,

        /// Only show the last N records
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show the resolved configuration (secrets redacted)
    Config {
        /// Print the default configuration as TOML instead
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat { message, entities } => commands::chat::run(message, entities).await?,
        Commands::Memory { kind, limit } => commands::memory::run(kind, limit)?,
        Commands::Config { default } => commands::config_cmd::run(default)?,
    }

    Ok(())
}
