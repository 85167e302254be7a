//! Source Validation Binary
//!
//! Validates config/sources.yml and config/keywords.txt:
//! - Checks scraper types are supported and selectors compile
//! - Checks ids are unique and URLs are http(s)
//! - Reports configuration issues before the watcher runs

use std::collections::HashSet;
use std::fs;
use std::time::Duration;
use anyhow::{Result, Context};

use tender_watch::config::Settings;
use tender_watch::keywords::KeywordSet;
use tender_watch::scrapers::{adapter_from_config, FetchOptions, PageFetcher};
use tender_watch::storage::load_sources;

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let settings = Settings::from_env().context("Invalid configuration")?;

    println!("=== Source Configuration Validator ===");

    let sources = load_sources(&settings.sources_path())
        .context("Failed to load sources.yml")?;

    // Adapters are only built, never fetched
    let fetcher = PageFetcher::new(&FetchOptions {
        user_agent: settings.user_agent.clone(),
        timeout: Duration::from_secs(1),
        respect_robots: false,
    })?;

    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut ids = HashSet::new();

    for source in &sources.sources {
        if source.id.trim().is_empty() {
            errors.push(format!("Source '{}' has empty id", source.name));
        } else if !ids.insert(source.id.as_str()) {
            errors.push(format!("Duplicate source id '{}'", source.id));
        }

        if !source.url.starts_with("http://") && !source.url.starts_with("https://") {
            warnings.push(format!(
                "Source '{}' has URL without http/https scheme: {}",
                source.id, source.url
            ));
        }

        if let Err(e) = adapter_from_config(source, &fetcher) {
            errors.push(e.to_string());
        }

        if !source.enabled {
            warnings.push(format!("Source '{}' is disabled", source.id));
        }
    }

    let keywords_path = settings.keywords_path();
    if keywords_path.exists() {
        let content = fs::read_to_string(&keywords_path)
            .with_context(|| format!("Failed to read {:?}", keywords_path))?;
        match KeywordSet::parse(&content) {
            Ok(set) if set.is_empty() => warnings.push("keywords.txt has no keywords".to_string()),
            Ok(set) => println!("✓ {} keywords", set.len()),
            Err(e) => errors.push(format!("keywords.txt {}", e)),
        }
    } else {
        warnings.push("keywords.txt not found; built-in list will be used".to_string());
    }

    if errors.is_empty() && warnings.is_empty() {
        println!("✓ All {} sources are valid", sources.sources.len());
        return Ok(());
    }

    if !errors.is_empty() {
        println!("\n❌ ERRORS (must fix):");
        for error in &errors {
            println!("  - {}", error);
        }
    }

    if !warnings.is_empty() {
        println!("\n⚠️  WARNINGS:");
        for warning in &warnings {
            println!("  - {}", warning);
        }
    }

    if !errors.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}
