// src/scan/mod.rs
pub mod pool;
pub mod resonance;

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::config::ScanConfig;
use crate::harvest::MarketFeed;
use crate::scoring::{IncrementalScoringCoordinator, ScoringService};
use crate::store::IntelStore;
use crate::taxonomy::{SectorResolver, TaxonomySource};
use crate::types::{Candidate, SourceKind};

/// One-time metrics registration so all scan series are described.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("scoring_titles_scored_total", "Titles scored by the external service.");
        describe_counter!("scoring_chunks_failed_total", "Scoring chunks that failed and stay pending.");
        describe_counter!("strategy_hits_total", "Records crossing the strategy-hit threshold.");
        describe_counter!("feed_errors_total", "Feed fetch errors absorbed at the scan boundary.");
        describe_counter!("popularity_rows_dropped_total", "Popularity entries without a valid code.");
        describe_gauge!("scan_pool_sectors", "Sectors in the catalyst pool of the last scan.");
        describe_gauge!("scan_candidates", "Candidates emitted by the last scan.");
        describe_gauge!("scan_last_run_ts", "Unix ts when the scan pipeline last ran.");
    });
}

/// Run one full scan to completion: sync and score both feed kinds, build
/// the decayed catalyst pool, and cross-match it against the live
/// popularity ranking.
///
/// Collaborator failures at the feed boundary degrade to empty inputs; the
/// worst outcome of a scan is an empty candidate list, never a crash.
pub async fn run_scan(
    store: &dyn IntelStore,
    scorer: &dyn ScoringService,
    taxonomy: &dyn TaxonomySource,
    feed: &dyn MarketFeed,
    cfg: &ScanConfig,
) -> Result<Vec<Candidate>> {
    ensure_metrics_described();

    // 1) Ingest + incremental scoring, one source kind at a time.
    let coordinator = IncrementalScoringCoordinator::new(store, scorer, cfg);
    for kind in [SourceKind::Policy, SourceKind::Flash] {
        let items = match feed.fetch_news(kind).await {
            Ok(items) => items,
            Err(e) => {
                warn!(feed = feed.name(), kind = %kind, error = %e, "feed error; continuing with empty batch");
                counter!("feed_errors_total").increment(1);
                Vec::new()
            }
        };
        let summary = coordinator.sync_and_score(&items, kind).await?;
        info!(
            kind = %kind,
            inserted = summary.inserted,
            scored = summary.scored,
            failed_chunks = summary.failed_chunks,
            "scoring pass done"
        );
    }

    // 2) Taxonomy freshness gate before any resolution is trusted.
    if taxonomy.is_stale(cfg.taxonomy_fresh_days) {
        warn!(fresh_days = cfg.taxonomy_fresh_days, "taxonomy tables stale; requesting refresh");
        taxonomy.refresh()?;
    }
    let tables = taxonomy.load()?;

    // 3) Active catalyst pool.
    let active = store.get_active_intelligence(
        cfg.policy_active_days,
        cfg.flash_active_hours,
        cfg.policy_min_score,
        cfg.flash_min_score,
    )?;
    let pool = pool::build_pool(&active, cfg);
    gauge!("scan_pool_sectors").set(pool.len() as f64);

    // 4) Live popularity snapshot; empty means "no candidates", not an error.
    let popularity = match feed.fetch_popularity().await {
        Ok(p) => p,
        Err(e) => {
            warn!(feed = feed.name(), error = %e, "popularity fetch failed; scan yields no candidates");
            counter!("feed_errors_total").increment(1);
            Vec::new()
        }
    };

    // 5) Cross-resonance match.
    let resolver = SectorResolver::new(&tables);
    let candidates = resonance::match_candidates(&pool, &popularity, &resolver, cfg);

    gauge!("scan_candidates").set(candidates.len() as f64);
    gauge!("scan_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
    info!(
        active_records = active.len(),
        pool_sectors = pool.len(),
        popularity = popularity.len(),
        candidates = candidates.len(),
        "scan complete"
    );

    Ok(candidates)
}
