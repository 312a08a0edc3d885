// src/store.rs
//! Persistence boundary for the intelligence pool.
//!
//! The engine only depends on the `IntelStore` contract; `MemoryStore` is
//! the process-local implementation. Writes are serialized behind one
//! mutex, and title uniqueness is enforced here (insert-if-absent), not by
//! callers.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use chrono::{Duration, Utc};

use crate::types::{ActiveIntel, NewsRecord, RawNewsItem, SourceKind, StrategyHit};

/// Query contract consumed by the scan pipeline.
pub trait IntelStore: Send + Sync {
    /// Store a batch of raw items with the sentinel score. Re-inserting an
    /// already-seen title is a no-op. Returns how many were actually inserted.
    fn save_news_batch(&self, items: &[RawNewsItem], kind: SourceKind) -> Result<usize>;

    /// Records of the given kind still at the sentinel score, created within
    /// the lookback window. Every call must re-surface everything still
    /// unscored so no record is permanently stranded.
    fn get_pending_news(&self, lookback_days: i64, kind: SourceKind) -> Result<Vec<NewsRecord>>;

    /// The active catalyst pool input: scored records inside their source
    /// kind's recency window and at or above its score floor, with age
    /// precomputed. Ordered by score, highest first.
    fn get_active_intelligence(
        &self,
        policy_days: i64,
        flash_hours: i64,
        policy_min_score: f64,
        flash_min_score: f64,
    ) -> Result<Vec<ActiveIntel>>;

    /// Write a scoring result back. A score of 0 is coerced to 1 so
    /// "unscored" and "scored-but-neutral" stay distinguishable; values are
    /// clamped to 100. Unknown titles are ignored.
    fn update_news_score(&self, title: &str, score: f64, sectors_json: &str) -> Result<()>;

    /// Append a strategy-hit audit event.
    fn record_strategy_hit(&self, title: &str, sectors_json: &str) -> Result<()>;

    /// Read side of the audit trail.
    fn strategy_hits(&self) -> Result<Vec<StrategyHit>>;
}

/// Hex sha256 prefix used as a secondary content fingerprint.
pub fn content_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[derive(Default)]
struct Inner {
    /// Insertion-ordered records plus a title index for O(1) dedup.
    records: Vec<NewsRecord>,
    by_title: HashMap<String, usize>,
    hits: Vec<StrategyHit>,
}

/// In-memory store. One mutex serializes all access; the scan pipeline is
/// batch-oriented so contention is not a concern.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a fully-formed record, e.g. from a snapshot or a test fixture
    /// that needs a backdated `created_at`. Title dedup still applies.
    pub fn insert_record(&self, record: NewsRecord) -> bool {
        let mut g = self.inner.lock().expect("store mutex poisoned");
        if g.by_title.contains_key(&record.title) {
            return false;
        }
        let idx = g.records.len();
        g.by_title.insert(record.title.clone(), idx);
        g.records.push(record);
        true
    }

    /// Total number of stored records (all kinds, scored or not).
    pub fn len(&self) -> usize {
        self.inner.lock().expect("store mutex poisoned").records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch one record by title, mostly for tests and diagnostics.
    pub fn get(&self, title: &str) -> Option<NewsRecord> {
        let g = self.inner.lock().expect("store mutex poisoned");
        g.by_title.get(title).map(|&i| g.records[i].clone())
    }
}

impl IntelStore for MemoryStore {
    fn save_news_batch(&self, items: &[RawNewsItem], kind: SourceKind) -> Result<usize> {
        let now = Utc::now();
        let mut g = self.inner.lock().expect("store mutex poisoned");
        let mut inserted = 0usize;
        for item in items {
            if item.title.is_empty() || g.by_title.contains_key(&item.title) {
                continue;
            }
            let record = NewsRecord {
                title: item.title.clone(),
                pub_date: item.pub_date.clone(),
                created_at: now,
                source: kind,
                content_hash: content_hash(&item.title),
                score: 0.0,
                sectors_json: "{}".to_string(),
            };
            let idx = g.records.len();
            g.by_title.insert(record.title.clone(), idx);
            g.records.push(record);
            inserted += 1;
        }
        Ok(inserted)
    }

    fn get_pending_news(&self, lookback_days: i64, kind: SourceKind) -> Result<Vec<NewsRecord>> {
        let cutoff = Utc::now() - Duration::days(lookback_days);
        let g = self.inner.lock().expect("store mutex poisoned");
        Ok(g.records
            .iter()
            .filter(|r| r.source == kind && r.score == 0.0 && r.created_at >= cutoff)
            .cloned()
            .collect())
    }

    fn get_active_intelligence(
        &self,
        policy_days: i64,
        flash_hours: i64,
        policy_min_score: f64,
        flash_min_score: f64,
    ) -> Result<Vec<ActiveIntel>> {
        let now = Utc::now();
        let policy_cutoff = now - Duration::days(policy_days);
        let flash_cutoff = now - Duration::hours(flash_hours);

        let g = self.inner.lock().expect("store mutex poisoned");
        let mut rows: Vec<ActiveIntel> = g
            .records
            .iter()
            .filter(|r| match r.source {
                SourceKind::Policy => r.score >= policy_min_score && r.created_at > policy_cutoff,
                SourceKind::Flash => r.score >= flash_min_score && r.created_at > flash_cutoff,
            })
            .map(|r| ActiveIntel {
                title: r.title.clone(),
                score: r.score,
                sectors_json: r.sectors_json.clone(),
                pub_date: r.pub_date.clone(),
                source: r.source,
                age_hours: (now - r.created_at).num_seconds().max(0) as f64 / 3600.0,
            })
            .collect();
        rows.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(rows)
    }

    fn update_news_score(&self, title: &str, score: f64, sectors_json: &str) -> Result<()> {
        // Sentinel invariant: a processed record never stays at 0.
        let score = if score <= 0.0 { 1.0 } else { score.min(100.0) };
        let mut g = self.inner.lock().expect("store mutex poisoned");
        if let Some(&idx) = g.by_title.get(title) {
            let rec = &mut g.records[idx];
            rec.score = score;
            rec.sectors_json = sectors_json.to_string();
        }
        Ok(())
    }

    fn record_strategy_hit(&self, title: &str, sectors_json: &str) -> Result<()> {
        let mut g = self.inner.lock().expect("store mutex poisoned");
        g.hits.push(StrategyHit {
            title: title.to_string(),
            sectors_json: sectors_json.to_string(),
            recorded_at: Utc::now(),
        });
        Ok(())
    }

    fn strategy_hits(&self) -> Result<Vec<StrategyHit>> {
        let g = self.inner.lock().expect("store mutex poisoned");
        Ok(g.hits.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(title: &str) -> RawNewsItem {
        RawNewsItem {
            title: title.to_string(),
            pub_date: "2026-08-21".to_string(),
        }
    }

    #[test]
    fn duplicate_titles_insert_once() {
        let store = MemoryStore::new();
        let n = store
            .save_news_batch(&[raw("国务院发布半导体产业扶持政策")], SourceKind::Policy)
            .unwrap();
        assert_eq!(n, 1);
        let n = store
            .save_news_batch(&[raw("国务院发布半导体产业扶持政策")], SourceKind::Policy)
            .unwrap();
        assert_eq!(n, 0, "second insert of the same title must be a no-op");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn pending_resurfaces_until_scored() {
        let store = MemoryStore::new();
        store
            .save_news_batch(&[raw("a"), raw("b")], SourceKind::Flash)
            .unwrap();

        let pending = store.get_pending_news(30, SourceKind::Flash).unwrap();
        assert_eq!(pending.len(), 2);

        store.update_news_score("a", 70.0, r#"{"半导体": 80}"#).unwrap();
        let pending = store.get_pending_news(30, SourceKind::Flash).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].title, "b");
    }

    #[test]
    fn zero_score_update_is_coerced_to_one() {
        let store = MemoryStore::new();
        store.save_news_batch(&[raw("neutral")], SourceKind::Flash).unwrap();
        store.update_news_score("neutral", 0.0, "{}").unwrap();
        let rec = store.get("neutral").unwrap();
        assert_eq!(rec.score, 1.0, "0 must become the minimum positive sentinel");
        // ...and it no longer counts as pending.
        assert!(store.get_pending_news(30, SourceKind::Flash).unwrap().is_empty());
    }

    #[test]
    fn active_query_applies_kind_specific_floors() {
        let store = MemoryStore::new();
        store
            .save_news_batch(&[raw("p-strong"), raw("p-weak")], SourceKind::Policy)
            .unwrap();
        store
            .save_news_batch(&[raw("f-strong"), raw("f-weak")], SourceKind::Flash)
            .unwrap();
        store.update_news_score("p-strong", 65.0, "{}").unwrap();
        store.update_news_score("p-weak", 55.0, "{}").unwrap();
        store.update_news_score("f-strong", 85.0, "{}").unwrap();
        store.update_news_score("f-weak", 70.0, "{}").unwrap();

        let rows = store.get_active_intelligence(14, 24, 60.0, 80.0).unwrap();
        let titles: Vec<&str> = rows.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["f-strong", "p-strong"], "sorted by score desc");
    }

    #[test]
    fn stale_records_drop_out_of_active_window_but_stay_stored() {
        let store = MemoryStore::new();
        store.insert_record(NewsRecord {
            title: "old flash".into(),
            pub_date: "2026-08-01".into(),
            created_at: Utc::now() - Duration::hours(48),
            source: SourceKind::Flash,
            content_hash: content_hash("old flash"),
            score: 95.0,
            sectors_json: "{}".into(),
        });
        let rows = store.get_active_intelligence(14, 24, 60.0, 80.0).unwrap();
        assert!(rows.is_empty(), "48h-old flash is outside the 24h window");
        assert_eq!(store.len(), 1, "excluded records are never deleted");
    }

    #[test]
    fn age_hours_reflects_created_at() {
        let store = MemoryStore::new();
        store.insert_record(NewsRecord {
            title: "aged policy".into(),
            pub_date: "2026-08-18".into(),
            created_at: Utc::now() - Duration::hours(72),
            source: SourceKind::Policy,
            content_hash: content_hash("aged policy"),
            score: 90.0,
            sectors_json: "{}".into(),
        });
        let rows = store.get_active_intelligence(14, 24, 60.0, 80.0).unwrap();
        assert_eq!(rows.len(), 1);
        assert!((rows[0].age_hours - 72.0).abs() < 0.1);
    }

    #[test]
    fn strategy_hits_are_append_only() {
        let store = MemoryStore::new();
        store.record_strategy_hit("t1", "{}").unwrap();
        store.record_strategy_hit("t1", "{}").unwrap();
        assert_eq!(store.strategy_hits().unwrap().len(), 2);
    }
}
