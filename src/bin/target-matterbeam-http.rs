use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use target_matterbeam_http::logging::init_tracing;
use target_matterbeam_http::{SinkConfig, Target};
use tokio::io::BufReader;

#[derive(Parser)]
#[command(name = "target-matterbeam-http")]
#[command(about = "Deliver pipeline records to the Matterbeam HTTP API")]
#[command(version)]
struct Cli {
    /// JSON (or .toml) config file. Falls back to TARGET_MATTERBEAM_HTTP_* variables
    #[arg(long)]
    config: Option<PathBuf>,

    /// Read messages from this file instead of stdin
    #[arg(long)]
    input: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, env = "TARGET_MATTERBEAM_HTTP_LOG_JSON")]
    log_json: bool,
}

fn load_config(path: Option<&PathBuf>) -> Result<SinkConfig> {
    match path {
        Some(path) => SinkConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => SinkConfig::from_env()
            .context("No --config given and TARGET_MATTERBEAM_HTTP_* variables are incomplete"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = load_config(cli.config.as_ref())?;
    tracing::debug!(?config, "configuration loaded");

    let target = Target::new(config);
    let summary = match cli.input {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            target.run(BufReader::new(file)).await?
        }
        None => target.run(BufReader::new(tokio::io::stdin())).await?,
    };

    for (stream, stats) in &summary.streams {
        tracing::info!(stream = %stream, records = stats.records, requests = stats.requests, "stream complete");
    }
    Ok(())
}
