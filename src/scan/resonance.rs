// src/scan/resonance.rs
//! Cross-resonance matching: map catalyst pool sectors to concrete
//! instruments via the resolver, score them against the live popularity
//! ranking, and emit a deduplicated, ranked candidate list.

use std::collections::HashMap;

use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use tracing::debug;

use crate::config::ScanConfig;
use crate::scan::pool::CatalystPoolEntry;
use crate::taxonomy::SectorResolver;
use crate::types::{Candidate, Confidence, PopularityEntry};

/// Extract the canonical 6-digit instrument code from a raw identifier
/// (e.g. "SZ000063", "1.000063", "000063"). Takes the last 6-digit run so
/// exchange prefixes never win. Returns `None` when no valid code exists.
pub fn normalize_code(raw: &str) -> Option<String> {
    static RE_CODE: OnceCell<Regex> = OnceCell::new();
    let re = RE_CODE.get_or_init(|| Regex::new(r"[0-9]{6}").expect("code regex"));
    re.find_iter(raw).last().map(|m| m.as_str().to_string())
}

/// Cross-reference the catalyst pool with the popularity ranking.
///
/// Composite score is `pool total + (K - rank_index)`: a hotter rank
/// (smaller index) earns a larger bonus; entries beyond the window earn a
/// non-positive one. An instrument reachable via several sectors keeps only
/// its highest-composite candidate (the loser's rationale is discarded).
/// Empty pool or empty popularity input yields an empty list by design.
pub fn match_candidates(
    pool: &HashMap<String, CatalystPoolEntry>,
    popularity: &[PopularityEntry],
    resolver: &SectorResolver<'_>,
    cfg: &ScanConfig,
) -> Vec<Candidate> {
    if pool.is_empty() || popularity.is_empty() {
        return Vec::new();
    }

    // Normalize the ranking once; rows without an extractable code are
    // skipped, not fatal. First occurrence of a code keeps its (better) rank.
    let mut live: HashMap<String, (&str, usize)> = HashMap::new();
    let mut dropped = 0usize;
    for entry in popularity {
        match normalize_code(&entry.code) {
            Some(code) => {
                live.entry(code).or_insert((entry.name.as_str(), entry.rank_index));
            }
            None => {
                debug!(code = %entry.code, "popularity entry without a valid code; skipped");
                dropped += 1;
            }
        }
    }
    if dropped > 0 {
        counter!("popularity_rows_dropped_total").increment(dropped as u64);
    }

    // Deterministic sector order: strongest catalyst first, name as the
    // secondary key. The pool map itself carries no order.
    let mut sectors: Vec<(&String, &CatalystPoolEntry)> = pool.iter().collect();
    sectors.sort_by(|a, b| {
        b.1.total_score
            .partial_cmp(&a.1.total_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });

    let mut candidates: Vec<Candidate> = Vec::new();
    let mut by_code: HashMap<String, usize> = HashMap::new();

    for (sector, entry) in sectors {
        let members = resolver.resolve(sector);
        if members.is_empty() {
            // Resolution miss: a valid "zero candidates from this sector".
            debug!(sector = %sector, "sector did not resolve to any instruments");
            continue;
        }
        for code in members {
            let Some(&(name, rank_index)) = live.get(&code) else {
                continue;
            };
            let hot_bonus = cfg.popularity_window as f64 - rank_index as f64;
            let composite = entry.total_score + hot_bonus;
            let confidence = if entry.peak_score > cfg.sustained_peak {
                Confidence::Sustained
            } else {
                Confidence::ShortTermPulse
            };
            let candidate = Candidate {
                code: code.clone(),
                name: name.to_string(),
                sector: sector.clone(),
                composite_score: composite,
                rationale: format!(
                    "catalyst pool {:.1} + popularity rank #{}",
                    entry.total_score,
                    rank_index + 1
                ),
                confidence,
            };
            match by_code.get(&code) {
                Some(&idx) => {
                    // Highest composite wins; ties keep the earlier entry.
                    if composite > candidates[idx].composite_score {
                        candidates[idx] = candidate;
                    }
                }
                None => {
                    by_code.insert(code, candidates.len());
                    candidates.push(candidate);
                }
            }
        }
    }

    // Stable sort: equal composites keep insertion order.
    candidates.sort_by(|a, b| {
        b.composite_score
            .partial_cmp(&a.composite_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates
}
