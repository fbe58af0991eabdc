//! Document Extraction Server - Entry point
//!
//! An MCP server extracting text from PDFs and images with per-page OCR fallback.

use file_extraction::{run_server_with_config, ExtractionConfig, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the environment may already be set.
    let dotenv = dotenvy::dotenv();

    // Initialize logging (stdout carries the MCP transport)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "file_extraction=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded environment file");
    }

    tracing::info!("Starting document extraction server");

    let config = ServerConfig::from_env()?;
    let defaults = ExtractionConfig::from_env()?;
    run_server_with_config(config, defaults).await
}
