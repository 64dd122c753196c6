mod cli;

use crate::cli::{Command, LogFormat, CLI};
use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use snip_shortener::{BatchRequestItem, ConfigSource, ShortCode, Shortener, ShortenerService};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CLI::parse();
    init_tracing(cli.log_format);

    let file_source = match &cli.config {
        Some(path) => ConfigSource::from_file(path)?,
        None => ConfigSource::default(),
    };
    let config = cli.config_source().or(file_source).resolve()?;

    info!(
        base_url = %config.base_url,
        storage = %config.storage,
        code_bytes = config.code_bytes,
        "starting snip"
    );

    let service = ShortenerService::open(&config)
        .await
        .context("failed to open storage")?;

    let outcome = run(&service, cli.command).await;
    service.close().await?;
    outcome
}

fn init_tracing(format: LogFormat) {
    // stdout carries command output
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(service: &ShortenerService, command: Command) -> Result<()> {
    match command {
        Command::Shorten { url, user } => {
            let short_url = service.shorten(&url, &user).await?;
            print_json(&serde_json::json!({ "result": short_url }))
        }
        Command::Batch { file, user } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("cannot read batch file {}", file.display()))?;
            let items: Vec<BatchRequestItem> = serde_json::from_slice(&bytes)
                .with_context(|| format!("cannot parse batch file {}", file.display()))?;
            let responses = service.shorten_batch(items, &user).await?;
            print_json(&responses)
        }
        Command::Resolve { code } => {
            let url = service.resolve_raw(&code).await?;
            print_json(&serde_json::json!({ "short_code": code, "original_url": url }))
        }
        Command::List { user } => {
            let records = service.user_urls(&user).await?;
            print_json(&records)
        }
        Command::Delete { user, codes } => {
            let codes = codes
                .iter()
                .map(|code| code.parse())
                .collect::<Result<Vec<ShortCode>, _>>()?;
            let requested = codes.len();
            service.delete_user_urls(codes, &user).await?;
            print_json(&serde_json::json!({ "requested": requested }))
        }
        Command::Stats => {
            let stats = service.stats().await?;
            print_json(&stats)
        }
        Command::Ping => {
            service.ping().await?;
            print_json(&serde_json::json!({ "status": "ok" }))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
