//! medbill server and CLI
//!
//! ## Server mode
//! ```bash
//! medbill-server serve --port 8000 --config medbill.toml
//! ```
//!
//! ## CLI mode
//! ```bash
//! medbill-server extract request.json --config medbill.toml
//! ```

mod cli;
mod server;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use medbill_extract::ExtractionConfig;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "medbill-server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Line-item extraction for medical bills via HTTP or CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0", env = "MEDBILL_HOST")]
        host: String,

        /// Port to listen on
        #[arg(long, short, default_value = "8000", env = "MEDBILL_PORT")]
        port: u16,

        /// Extraction settings (TOML)
        #[arg(long, env = "MEDBILL_CONFIG")]
        config: Option<PathBuf>,

        /// Largest accepted request body, in bytes
        #[arg(long = "body-limit", default_value_t = server::DEFAULT_BODY_LIMIT, env = "MEDBILL_BODY_LIMIT")]
        body_limit: usize,
    },
    /// Extract line items from a request body stored in a JSON file
    Extract {
        /// File holding `{"document": ..., "pages": [...]}`
        input: PathBuf,

        /// Extraction settings (TOML)
        #[arg(long, env = "MEDBILL_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            config,
            body_limit,
        } => {
            init_json_tracing();
            let config = server::ServerConfig {
                host,
                port,
                body_limit,
                extraction: load_config(config.as_deref())?,
            };
            info!("Starting server on {}:{}", config.host, config.port);
            server::run_server(config).await?;
        }
        Commands::Extract { input, config } => {
            init_cli_tracing();
            let config = load_config(config.as_deref())?;
            cli::process_file(&input, config).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ExtractionConfig> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "loading extraction config");
            ExtractionConfig::load(path).with_context(|| format!("failed to load config from {}", path.display()))
        }
        None => Ok(ExtractionConfig::default()),
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Bunyan JSON lines on stdout, for log shipping.
fn init_json_tracing() {
    use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};

    tracing_subscriber::registry()
        .with(env_filter())
        .with(JsonStorageLayer)
        .with(BunyanFormattingLayer::new("medbill-server".into(), std::io::stdout))
        .init();
}

/// Plain text on stderr so stdout carries only the result.
fn init_cli_tracing() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
