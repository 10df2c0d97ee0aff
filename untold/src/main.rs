//! Untold: co-write a story with Gemini from the terminal.
//!
//! ```bash
//! cargo run -p untold -- --mood dark
//! ```
//!
//! Logs go to stderr; set `RUST_LOG=untold_core=debug` to follow each request.

mod headless;

use clap::Parser;
use headless::{run_headless, Headless};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use untold_core::{Config, FileCredentialStore, GeminiGenerator, Mood, SessionController};

/// Co-write a story with Gemini, one word at a time.
#[derive(Debug, Parser)]
#[command(name = "untold", version, about)]
struct Cli {
    /// Model id (overrides UNTOLD_MODEL).
    #[arg(long)]
    model: Option<String>,

    /// API root (overrides UNTOLD_API_BASE).
    #[arg(long)]
    api_base: Option<String>,

    /// File holding your API key (overrides UNTOLD_CREDENTIAL_FILE).
    #[arg(long)]
    credential_file: Option<PathBuf>,

    /// Mood for the first word: dreamy, dark or motivational.
    #[arg(long, default_value_t = Mood::Dreamy)]
    mood: Mood,
}

impl Cli {
    /// Layer command-line flags over environment configuration.
    fn apply(&self, mut config: Config) -> Config {
        if let Some(model) = &self.model {
            config = config.with_model(model);
        }
        if let Some(api_base) = &self.api_base {
            config = config.with_api_base(api_base);
        }
        if let Some(path) = &self.credential_file {
            config = config.with_credential_file(path);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.apply(Config::from_env()?);
    tracing::debug!(?config, "configuration loaded");

    let store = match &config.credential_file {
        Some(path) => FileCredentialStore::with_path(path),
        None => FileCredentialStore::new()?,
    };
    tracing::info!(path = %store.path().display(), "using credential file");

    let session = SessionController::new(
        Arc::new(GeminiGenerator::from_config(&config)),
        Arc::new(store),
    );

    run_headless(Headless::new(session, cli.mood)).await
}
