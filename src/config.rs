// src/config.rs
//! Scan configuration: decay rates, active windows, thresholds, batching.
//!
//! Loaded from `config/scanner.toml` (override via `SCANNER_CONFIG_PATH`);
//! every field has a compiled-in default so the engine runs without a file.

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "config/scanner.toml";
pub const ENV_CONFIG_PATH: &str = "SCANNER_CONFIG_PATH";

/// Exponential decay rate per hour for policy records.
/// Half-life ~= 14.4 days: policy catalysts have multi-week relevance.
pub const DEFAULT_LAMBDA_POLICY: f64 = 0.002;
/// Decay rate per hour for flash records. Half-life ~= 1.4 days.
pub const DEFAULT_LAMBDA_FLASH: f64 = 0.02;

/// Active-window lookback for policy records, in days.
pub const DEFAULT_POLICY_ACTIVE_DAYS: i64 = 14;
/// Active-window lookback for flash records, in hours.
pub const DEFAULT_FLASH_ACTIVE_HOURS: i64 = 24;
/// Score floor for a policy record to count as an active catalyst.
pub const DEFAULT_POLICY_MIN_SCORE: f64 = 60.0;
/// Score floor for a flash record; higher because only strong, fresh
/// flashes are worth reacting to.
pub const DEFAULT_FLASH_MIN_SCORE: f64 = 80.0;

/// How many titles go into one scoring-service call.
pub const DEFAULT_SCORING_CHUNK_SIZE: usize = 15;
/// Lookback (days) for re-surfacing still-unscored records.
pub const DEFAULT_PENDING_LOOKBACK_DAYS: i64 = 30;
/// A resulting score at or above this is recorded as a strategy hit.
pub const DEFAULT_STRATEGY_HIT_SCORE: f64 = 85.0;

/// Popularity window constant K: rank bonus is `K - rank_index`.
pub const DEFAULT_POPULARITY_WINDOW: usize = 100;
/// Pool peak contribution above this tags a candidate as sustained.
pub const DEFAULT_SUSTAINED_PEAK: f64 = 50.0;

/// Taxonomy tables older than this many days should be refreshed before a
/// scan trusts resolution results.
pub const DEFAULT_TAXONOMY_FRESH_DAYS: i64 = 7;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub lambda_policy: f64,
    pub lambda_flash: f64,
    pub policy_active_days: i64,
    pub flash_active_hours: i64,
    pub policy_min_score: f64,
    pub flash_min_score: f64,
    pub scoring_chunk_size: usize,
    pub pending_lookback_days: i64,
    pub strategy_hit_score: f64,
    pub popularity_window: usize,
    pub sustained_peak: f64,
    pub taxonomy_fresh_days: i64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            lambda_policy: DEFAULT_LAMBDA_POLICY,
            lambda_flash: DEFAULT_LAMBDA_FLASH,
            policy_active_days: DEFAULT_POLICY_ACTIVE_DAYS,
            flash_active_hours: DEFAULT_FLASH_ACTIVE_HOURS,
            policy_min_score: DEFAULT_POLICY_MIN_SCORE,
            flash_min_score: DEFAULT_FLASH_MIN_SCORE,
            scoring_chunk_size: DEFAULT_SCORING_CHUNK_SIZE,
            pending_lookback_days: DEFAULT_PENDING_LOOKBACK_DAYS,
            strategy_hit_score: DEFAULT_STRATEGY_HIT_SCORE,
            popularity_window: DEFAULT_POPULARITY_WINDOW,
            sustained_peak: DEFAULT_SUSTAINED_PEAK,
            taxonomy_fresh_days: DEFAULT_TAXONOMY_FRESH_DAYS,
        }
    }
}

impl ScanConfig {
    /// Load from the default path (or `SCANNER_CONFIG_PATH`). A missing file
    /// yields the compiled-in defaults; a malformed file is an error.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("reading scanner config at {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let cfg: ScanConfig = toml::from_str(s).context("parsing scanner config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.lambda_policy > 0.0 && self.lambda_flash > 0.0,
            "decay rates must be positive"
        );
        anyhow::ensure!(self.scoring_chunk_size > 0, "chunk size must be positive");
        Ok(())
    }

    /// Decay rate per hour for a given source kind.
    pub fn lambda_for(&self, kind: crate::types::SourceKind) -> f64 {
        match kind {
            crate::types::SourceKind::Policy => self.lambda_policy,
            crate::types::SourceKind::Flash => self.lambda_flash,
        }
    }
}
