//! # Docsight CLI (`docsight`)
//!
//! ## Usage
//!
//! ```bash
//! docsight --config ./config/docsight.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docsight init` | Create the chat history database |
//! | `docsight index` | Load every document and report chunks and images per role |
//! | `docsight ask "<q>" --user U --role R` | Answer one question and print the JSON response |
//! | `docsight history --user U` | Print a user's recent questions and answers |
//! | `docsight serve` | Start the HTTP server |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `docsight=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docsight::{ask, config, history, index_cmd, migrate, server};

/// Docsight: role-scoped question answering over technical PDFs.
#[derive(Parser)]
#[command(
    name = "docsight",
    about = "Docsight: role-scoped question answering over technical PDFs",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docsight.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the chat history database. Idempotent.
    Init,

    /// Load the document directory and print what was indexed.
    ///
    /// Extracts page text and images, embeds every chunk, and prints
    /// per-document and per-role counts. Fails when nothing can be loaded.
    Index,

    /// Ask one question through the full pipeline.
    Ask {
        /// The question.
        question: String,

        /// Username the turn is recorded under.
        #[arg(long)]
        user: String,

        /// The asking user's role.
        #[arg(long)]
        role: String,

        /// Query on behalf of another role (privileged roles only).
        #[arg(long)]
        as_role: Option<String>,

        /// Analyze this extracted image instead of querying documents.
        #[arg(long)]
        last_image: Option<String>,
    },

    /// Print a user's recent chat history, oldest first.
    History {
        #[arg(long)]
        user: String,

        #[arg(long, default_value_t = history::DEFAULT_HISTORY_LIMIT)]
        limit: usize,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docsight=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Index => {
            index_cmd::run_index(&cfg).await?;
        }
        Commands::Ask {
            question,
            user,
            role,
            as_role,
            last_image,
        } => {
            ask::run_ask(&cfg, &user, &role, as_role.as_deref(), &question, last_image).await?;
        }
        Commands::History { user, limit } => {
            history::run_history(&cfg, &user, limit).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
