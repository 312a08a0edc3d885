// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod config;
pub mod harvest;
pub mod scan;
pub mod scoring;
pub mod store;
pub mod taxonomy;
pub mod types;

// ---- Re-exports for stable public API ----
pub use config::ScanConfig;
pub use scan::pool::{build_pool, decayed_score, CatalystPoolEntry};
pub use scan::resonance::{match_candidates, normalize_code};
pub use scan::run_scan;
pub use scoring::{IncrementalScoringCoordinator, MockScorer, ScoringService, TitleAnalysis};
pub use store::{IntelStore, MemoryStore};
pub use taxonomy::{SectorResolver, TaxonomySource, TaxonomyTables};
pub use types::{Candidate, Confidence, NewsRecord, PopularityEntry, RawNewsItem, SourceKind};
