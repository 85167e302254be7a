use std::process::ExitCode;
use anyhow::{Context, Result};
use chrono::Utc;
use tracing_subscriber::{fmt, EnvFilter};

use tender_watch::config::Settings;
use tender_watch::keywords::load_keywords;
use tender_watch::pipeline;
use tender_watch::scrapers::{build_adapters, PageFetcher};
use tender_watch::storage::{load_sources, FileBackend};

fn run() -> Result<()> {
    let settings = Settings::from_env().context("Invalid configuration")?;
    settings.ensure_root()?;

    let sources = load_sources(&settings.sources_path())?;
    let keywords = load_keywords(&settings.keywords_path())?;
    let fetcher = PageFetcher::new(&settings.fetch_options())
        .context("Failed to build HTTP client")?;
    let adapters = build_adapters(&sources.sources, &fetcher);
    let notifier = settings.notifier()?;
    let store = FileBackend::new(settings.state_path());

    tracing::info!(
        sources = adapters.len(),
        keywords = keywords.len(),
        channels = notifier.len(),
        "starting run"
    );

    let summary = pipeline::run(
        &adapters,
        &keywords,
        &store,
        &notifier,
        &settings.run_options(),
        Utc::now(),
    )?;

    for item in &summary.new_items {
        tracing::info!(source = %item.record.source_id, score = item.score, title = %item.record.title, "new tender");
    }

    Ok(())
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("run failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
