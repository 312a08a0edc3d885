//! Resonance Scanner — Binary Entrypoint
//! Wires the store, scoring service, taxonomy, and snapshot feed together
//! and runs one full scan, printing the ranked candidate list.
//!
//! External schedulers (cron etc.) trigger repeated scans; this binary does
//! exactly one.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use resonance_scanner::config::ScanConfig;
use resonance_scanner::harvest::{HttpSettings, SnapshotFeed};
use resonance_scanner::scoring::{DeepSeekScorer, MockScorer, ScoringService, TitleAnalysis};
use resonance_scanner::store::{IntelStore, MemoryStore};
use resonance_scanner::taxonomy::FileTaxonomy;
use resonance_scanner::types::format_candidates;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("resonance_scanner=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op elsewhere.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = ScanConfig::load()?;
    let store = MemoryStore::new();
    let taxonomy = FileTaxonomy::new("data/industry_map.json", "data/concept_map.json");
    let feed = SnapshotFeed::new("data");

    // Real scorer when an API key is present; deterministic neutral mock
    // otherwise so offline runs still exercise the full pipeline.
    let deepseek = DeepSeekScorer::from_env(&HttpSettings::default())?;
    let scorer: Box<dyn ScoringService> = if deepseek.is_configured() {
        Box::new(deepseek)
    } else {
        tracing::warn!("DEEPSEEK_API_KEY not set; using mock scorer");
        Box::new(MockScorer::new().with_fallback(TitleAnalysis::default()))
    };

    let candidates =
        resonance_scanner::scan::run_scan(&store, scorer.as_ref(), &taxonomy, &feed, &cfg).await?;

    println!("{}", format_candidates(&candidates));
    let hits = store.strategy_hits()?;
    if !hits.is_empty() {
        println!("strategy hits this run: {}", hits.len());
    }
    Ok(())
}
