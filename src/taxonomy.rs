// src/taxonomy.rs
//! Sector taxonomy tables and the fuzzy name resolver.
//!
//! Two independent name → instrument-code tables (industry classification
//! and concept boards) are refreshed by an external sync process; this
//! module only checks freshness and resolves free-text sector names against
//! the loaded tables.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use tracing::{debug, info};

/// Generic suffixes stripped during tier-3 normalization: "concept",
/// "board/sector", "industry".
const GENERIC_SUFFIXES: [&str; 3] = ["概念", "板块", "行业"];

pub type SectorMap = HashMap<String, Vec<String>>;

/// The two taxonomy tables, loaded into memory for one scan.
#[derive(Debug, Clone, Default)]
pub struct TaxonomyTables {
    pub industry: SectorMap,
    pub concept: SectorMap,
}

impl TaxonomyTables {
    pub fn new(industry: SectorMap, concept: SectorMap) -> Self {
        Self { industry, concept }
    }

    pub fn is_empty(&self) -> bool {
        self.industry.is_empty() && self.concept.is_empty()
    }
}

/// External taxonomy sync collaborator, specified at its boundary only.
pub trait TaxonomySource: Send + Sync {
    fn load(&self) -> Result<TaxonomyTables>;
    /// True when the backing tables are older than the freshness window.
    fn is_stale(&self, fresh_days: i64) -> bool;
    /// Force a refresh of the backing tables.
    fn refresh(&self) -> Result<()>;
}

/// Taxonomy backed by two JSON files (`{"sector name": ["000063", ...]}`),
/// with mtime-based freshness. Refresh is delegated to whatever process
/// rewrites the files; `refresh()` here only logs the request, since real
/// synchronization is outside this crate.
pub struct FileTaxonomy {
    industry_path: PathBuf,
    concept_path: PathBuf,
}

impl FileTaxonomy {
    pub fn new(industry_path: impl Into<PathBuf>, concept_path: impl Into<PathBuf>) -> Self {
        Self {
            industry_path: industry_path.into(),
            concept_path: concept_path.into(),
        }
    }

    fn load_map(path: &Path) -> Result<SectorMap> {
        if !path.exists() {
            return Ok(SectorMap::new());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading taxonomy file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing taxonomy file {}", path.display()))
    }

    fn mtime_age_days(path: &Path) -> Option<i64> {
        let mtime = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
        let age = SystemTime::now().duration_since(mtime).ok()?;
        Some((age.as_secs() / 86_400) as i64)
    }
}

impl TaxonomySource for FileTaxonomy {
    fn load(&self) -> Result<TaxonomyTables> {
        let industry = Self::load_map(&self.industry_path)?;
        let concept = Self::load_map(&self.concept_path)?;
        debug!(
            industries = industry.len(),
            concepts = concept.len(),
            "taxonomy tables loaded"
        );
        Ok(TaxonomyTables::new(industry, concept))
    }

    fn is_stale(&self, fresh_days: i64) -> bool {
        match Self::mtime_age_days(&self.industry_path) {
            Some(age) => age > fresh_days,
            None => true, // missing file counts as stale
        }
    }

    fn refresh(&self) -> Result<()> {
        info!(
            industry = %self.industry_path.display(),
            concept = %self.concept_path.display(),
            "taxonomy refresh requested; waiting on external sync"
        );
        Ok(())
    }
}

/// Fuzzy lookup from a free-text sector name to instrument codes.
///
/// Resolution runs three strictly ordered tiers and stops at the first
/// non-empty result; a total miss returns the empty set and is a valid
/// outcome (zero candidates from that sector), never an error.
pub struct SectorResolver<'a> {
    tables: &'a TaxonomyTables,
}

impl<'a> SectorResolver<'a> {
    pub fn new(tables: &'a TaxonomyTables) -> Self {
        Self { tables }
    }

    pub fn resolve(&self, name: &str) -> BTreeSet<String> {
        if name.is_empty() {
            return BTreeSet::new();
        }

        // Tier 1: exact key in either table, merged when both have it.
        let exact = self.exact(name);
        if !exact.is_empty() {
            return exact;
        }

        // Tier 2: bidirectional substring over all keys of both tables.
        let fuzzy = self.substring(name);
        if !fuzzy.is_empty() {
            return fuzzy;
        }

        // Tier 3: strip generic suffixes and retry the substring tier.
        let normalized = strip_generic_suffixes(name);
        if normalized != name && !normalized.is_empty() {
            let fallback = self.substring(&normalized);
            if !fallback.is_empty() {
                debug!(query = name, normalized, "sector resolved via suffix normalization");
                return fallback;
            }
        }

        BTreeSet::new()
    }

    fn exact(&self, name: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        if let Some(codes) = self.tables.industry.get(name) {
            out.extend(codes.iter().cloned());
        }
        if let Some(codes) = self.tables.concept.get(name) {
            out.extend(codes.iter().cloned());
        }
        out
    }

    fn substring(&self, name: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for map in [&self.tables.industry, &self.tables.concept] {
            for (key, codes) in map {
                if key.contains(name) || name.contains(key.as_str()) {
                    out.extend(codes.iter().cloned());
                }
            }
        }
        out
    }
}

/// Remove any generic classification suffix tokens from the name.
fn strip_generic_suffixes(name: &str) -> String {
    let mut out = name.to_string();
    for suffix in GENERIC_SUFFIXES {
        out = out.replace(suffix, "");
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> TaxonomyTables {
        let mut industry = SectorMap::new();
        industry.insert(
            "半导体行业".to_string(),
            vec!["000063".to_string(), "000001".to_string()],
        );
        industry.insert("电力设备".to_string(), vec!["300750".to_string()]);
        let mut concept = SectorMap::new();
        concept.insert(
            "人工智能概念".to_string(),
            vec!["002230".to_string(), "300308".to_string()],
        );
        concept.insert("半导体行业".to_string(), vec!["688981".to_string()]);
        TaxonomyTables::new(industry, concept)
    }

    #[test]
    fn exact_match_merges_both_tables() {
        let t = tables();
        let r = SectorResolver::new(&t);
        let hits = r.resolve("半导体行业");
        assert!(hits.contains("000063"));
        assert!(hits.contains("688981"), "ambiguous key merges concept members too");
    }

    #[test]
    fn substring_tier_finds_partial_query() {
        let t = tables();
        let r = SectorResolver::new(&t);
        // "半导体" is contained in the key "半导体行业".
        let hits = r.resolve("半导体");
        assert!(hits.contains("000063") && hits.contains("000001"));
    }

    #[test]
    fn substring_tier_is_bidirectional() {
        let t = tables();
        let r = SectorResolver::new(&t);
        // The key "电力设备" is contained in the longer query.
        let hits = r.resolve("电力设备制造");
        assert!(hits.contains("300750"));
    }

    #[test]
    fn suffixed_query_still_resolves() {
        let t = tables();
        let r = SectorResolver::new(&t);
        let hits = r.resolve("人工智能概念股");
        assert!(
            hits.contains("002230"),
            "query carrying a generic suffix must still resolve"
        );
    }

    #[test]
    fn suffix_normalization_rescues_tier_three() {
        let mut t = tables();
        t.concept.insert("新能源车".to_string(), vec!["002594".to_string()]);
        let r = SectorResolver::new(&t);
        // Tier 2 misses: neither "新能源板块" nor "新能源车" contains the other.
        // Stripping "板块" leaves "新能源", which the key contains.
        let hits = r.resolve("新能源板块");
        assert!(hits.contains("002594"));
    }

    #[test]
    fn exact_tier_wins_over_substring() {
        let mut t = tables();
        t.concept.insert("半导体".to_string(), vec!["999999".to_string()]);
        let r = SectorResolver::new(&t);
        let hits = r.resolve("半导体");
        assert_eq!(hits.len(), 1, "exact tier stops resolution before substring union");
        assert!(hits.contains("999999"));
    }

    #[test]
    fn total_miss_is_empty_not_error() {
        let t = tables();
        let r = SectorResolver::new(&t);
        assert!(r.resolve("量子生物").is_empty());
        assert!(r.resolve("").is_empty());
    }
}
