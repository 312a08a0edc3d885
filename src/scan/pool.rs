// src/scan/pool.rs
//! Catalyst pool: decay-weighted aggregation of scored news into a live
//! sector → cumulative bullish weight structure.
//!
//! Input rows are already filtered to the active window by the store query;
//! this module only applies decay against the age each row carries.

use std::collections::HashMap;

use tracing::warn;

use crate::config::ScanConfig;
use crate::types::ActiveIntel;

/// Aggregated catalyst weight for one sector. Derived fresh on every scan;
/// never persisted.
#[derive(Debug, Clone, Default)]
pub struct CatalystPoolEntry {
    /// Sum of decayed, weight-apportioned contributions.
    pub total_score: f64,
    /// Largest single contribution; drives the confidence tag downstream.
    pub peak_score: f64,
    /// Provenance strings, one per contributing record.
    pub reasons: Vec<String>,
}

/// Exponential time decay: equals `score` at age 0 and approaches 0 as age
/// grows.
pub fn decayed_score(score: f64, lambda: f64, age_hours: f64) -> f64 {
    score * (-lambda * age_hours).exp()
}

/// Build the pool from active intelligence rows. A record with an
/// unparsable sector payload is skipped (the rest of the batch survives);
/// a record with no sector weights contributes to nothing, silently.
pub fn build_pool(records: &[ActiveIntel], cfg: &ScanConfig) -> HashMap<String, CatalystPoolEntry> {
    let mut pool: HashMap<String, CatalystPoolEntry> = HashMap::new();

    for record in records {
        let weights: HashMap<String, f64> = match serde_json::from_str(&record.sectors_json) {
            Ok(w) => w,
            Err(e) => {
                warn!(title = %record.title, error = %e, "unparsable sector weights; record skipped");
                continue;
            }
        };

        let decayed = decayed_score(record.score, cfg.lambda_for(record.source), record.age_hours);
        for (sector, weight) in weights {
            let weight = weight.clamp(0.0, 100.0);
            let contribution = decayed * (weight / 100.0);
            let entry = pool.entry(sector).or_default();
            entry.total_score += contribution;
            if contribution > entry.peak_score {
                entry.peak_score = contribution;
            }
            entry.reasons.push(format!(
                "[{}] {}",
                record.source,
                truncate_chars(&record.title, 30)
            ));
        }
    }

    pool
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push('…');
        out
    }
}
