//! CLI entry point for the bulkget tool.

use std::io::{self, IsTerminal, Read};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use bulkget_core::config::resolve_default_config_path;
use bulkget_core::{
    DownloadEngine, HttpClient, Settings, dedup_locators, extract_locators, load_locators,
};
use clap::Parser;
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.default_log_level()));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(urls = args.urls.len(), input = ?args.input, config = ?args.config, "CLI arguments parsed");

    let settings = args.apply_to(load_settings(&args)?);
    settings.validate().context("Invalid settings")?;
    debug!(?settings, "settings resolved");

    let locators = collect_locators(&args)?;
    if locators.is_empty() {
        info!("No input provided. Pass URLs as arguments, use --input, or pipe text via stdin.");
        info!("Example: echo 'https://example.com/file.pdf' | bulkget");
        return Ok(());
    }
    info!(urls = locators.len(), "Parsed input");

    let requests = settings.requests_for(locators, &args.request_options());

    let client = HttpClient::with_timeouts(settings.connect_timeout_secs, settings.read_timeout_secs)
        .context("Failed to build HTTP client")?;
    let engine = DownloadEngine::new(settings.concurrency, Arc::new(client))?
        .with_failure_policy(settings.failure_policy)
        .with_rename_strategy(settings.rename_strategy)
        .with_retry_delay(settings.retry_delay());

    let report = engine.run_all(requests).await;

    for outcome in report.outcomes() {
        match &outcome.result {
            Ok(download) => match &download.archive {
                Some(archive) => info!(url = %outcome.url, path = %archive.display(), "saved"),
                None => info!(url = %outcome.url, path = %download.path.display(), "saved"),
            },
            Err(e) => warn!(url = %outcome.url, error = %e, "not saved"),
        }
    }

    info!(
        completed = report.completed(),
        failed = report.failed(),
        cancelled = report.cancelled(),
        retried = report.retried(),
        total = report.total(),
        "Download complete"
    );

    if !report.is_success() {
        bail!(
            "{} of {} downloads did not complete",
            report.total() - report.completed(),
            report.total()
        );
    }
    Ok(())
}

/// Loads settings from `--config`, else the default path if it exists, else defaults.
fn load_settings(args: &Args) -> Result<Settings> {
    if let Some(path) = &args.config {
        return Settings::load(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()));
    }
    if let Some(path) = resolve_default_config_path()
        && path.exists()
    {
        debug!(path = %path.display(), "using default config file");
        return Settings::load(&path)
            .with_context(|| format!("Failed to load config '{}'", path.display()));
    }
    Ok(Settings::default())
}

/// Gathers locators from positional args, `--input`, or piped stdin.
///
/// Positional and file locators are merged and deduplicated, first
/// occurrence wins.
fn collect_locators(args: &Args) -> Result<Vec<String>> {
    let mut locators = args.urls.clone();

    if let Some(path) = &args.input {
        let found = load_locators(path)?;
        info!(path = %path.display(), found = found.len(), "Scanned input file");
        locators.extend(found);
    }

    if args.urls.is_empty() && args.input.is_none() && !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read stdin")?;
        locators = extract_locators(&buffer);
    }

    let total = locators.len();
    let locators = dedup_locators(locators);
    if locators.len() < total {
        debug!(dropped = total - locators.len(), "dropped duplicate locators");
    }
    Ok(locators)
}
