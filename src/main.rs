use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use coursework_market::config::{Config, ConfigError};
use coursework_market::db::Database;
use coursework_market::s3::S3Client;
use coursework_market::web::{self, AppState};

/// Exit status for unusable configuration (`EX_CONFIG`).
const EXIT_CONFIG: i32 = 78;

#[tokio::main]
async fn main() {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    if let Err(e) = init_tracing() {
        eprintln!("{e:#}");
        std::process::exit(1);
    }

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {e}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    if let Err(e) = run(config).await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

fn load_config() -> Result<Config, ConfigError> {
    let config = Config::from_env()?;
    config.validate()?;
    Ok(config)
}

async fn run(config: Config) -> Result<()> {
    info!(
        database = %config.database_path.display(),
        bucket = %config.s3_bucket,
        preview_mode = ?config.preview_mode,
        folder_parse_mode = config.folder_parse_mode.as_str(),
        "Starting coursework-market"
    );

    if let Some(parent) = config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }
    }

    let db = Database::new(&config.database_path).await?;
    let s3 = S3Client::new(&config).context("Failed to create S3 client")?;
    info!(bucket = %s3.bucket_name(), "S3 client ready");

    let state = AppState::new(config, db.clone(), Arc::new(s3))?;
    web::serve(state).await?;

    db.close().await;
    info!("Shutdown complete");

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,coursework_market=debug"));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}
