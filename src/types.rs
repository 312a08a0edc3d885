// src/types.rs
//! Canonical record types shared across the scan pipeline.
//!
//! Raw feeds arrive as loosely-typed tabular rows with inconsistent column
//! names; `harvest` adapts them once at the boundary so everything below
//! only ever sees these structs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a news item came from. Policy announcements stay relevant for
/// weeks; flash news is priced in within hours, so the two kinds carry
/// different decay rates and active windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Policy,
    Flash,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Policy => "policy",
            SourceKind::Flash => "flash",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored news item. `title` is the unique key: re-ingesting a seen title
/// is a no-op. `score == 0.0` is the "not yet scored" sentinel; a scored
/// record always has score in (0, 100].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsRecord {
    pub title: String,
    /// Publication date as reported by the feed (free-form, e.g. "2026-08-21").
    pub pub_date: String,
    /// When we first stored the record; drives active-window eligibility.
    pub created_at: DateTime<Utc>,
    pub source: SourceKind,
    /// Secondary fingerprint of the title (hex sha256 prefix).
    pub content_hash: String,
    /// 0.0 = unscored sentinel; otherwise (0, 100].
    pub score: f64,
    /// Raw JSON payload `{"sector": weight, ...}` from the scoring service.
    /// Kept as a string so one malformed payload can be skipped per record
    /// when the pool is built, instead of failing the whole batch.
    pub sectors_json: String,
}

/// A raw item as delivered by a feed, before storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawNewsItem {
    pub title: String,
    pub pub_date: String,
}

/// One row of the active-intelligence query: a scored record still inside
/// its source kind's active window, with its age precomputed.
#[derive(Debug, Clone)]
pub struct ActiveIntel {
    pub title: String,
    pub score: f64,
    pub sectors_json: String,
    pub pub_date: String,
    pub source: SourceKind,
    pub age_hours: f64,
}

/// One entry of the live popularity ranking, already normalized.
/// `rank_index` is 0-based: smaller means hotter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopularityEntry {
    pub code: String,
    pub name: String,
    pub rank_index: usize,
}

/// Confidence tag for a candidate: a sustained catalyst (strong peak
/// contribution in the pool) versus a short-lived attention spike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Sustained catalyst plus live attention.
    Sustained,
    /// Live attention without a strong standing catalyst.
    ShortTermPulse,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::Sustained => f.write_str("sustained + live"),
            Confidence::ShortTermPulse => f.write_str("short-term pulse"),
        }
    }
}

/// Final scan output: one candidate per instrument, driven by the sector
/// that produced its highest composite score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub code: String,
    pub name: String,
    pub sector: String,
    pub composite_score: f64,
    pub rationale: String,
    pub confidence: Confidence,
}

/// Append-only audit event: a scored item crossed the strategy-hit
/// threshold. Distinct from the mutable news table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyHit {
    pub title: String,
    pub sectors_json: String,
    pub recorded_at: DateTime<Utc>,
}

/// Render a candidate list as a plain-text table for logs or reports.
pub fn format_candidates(candidates: &[Candidate]) -> String {
    if candidates.is_empty() {
        return "no resonance candidates".to_string();
    }
    let mut out = String::new();
    for (i, c) in candidates.iter().enumerate() {
        out.push_str(&format!(
            "{:>2}. {} {} [{}] score {:.1} ({}) - {}\n",
            i + 1,
            c.code,
            c.name,
            c.sector,
            c.composite_score,
            c.confidence,
            c.rationale
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&SourceKind::Policy).unwrap(), "\"policy\"");
        let k: SourceKind = serde_json::from_str("\"flash\"").unwrap();
        assert_eq!(k, SourceKind::Flash);
    }

    #[test]
    fn confidence_display_matches_report_wording() {
        assert_eq!(Confidence::Sustained.to_string(), "sustained + live");
        assert_eq!(Confidence::ShortTermPulse.to_string(), "short-term pulse");
    }

    #[test]
    fn format_candidates_handles_empty() {
        assert_eq!(format_candidates(&[]), "no resonance candidates");
    }
}
