// src/scoring.rs
//! External scoring service boundary and the incremental scoring
//! coordinator.
//!
//! The coordinator guarantees that every stored record eventually carries a
//! score: unscored records (sentinel 0) are re-surfaced on every run and
//! sent to the service in fixed-size chunks; one failed chunk never aborts
//! the rest.

use std::collections::HashMap;

use anyhow::{Context, Result};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ScanConfig;
use crate::harvest::HttpSettings;
use crate::store::IntelStore;
use crate::types::{RawNewsItem, SourceKind};

/// One title's analysis as returned by the scoring service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TitleAnalysis {
    /// Bullish strength 0–100. 0 means "unrelated to the market".
    pub score: f64,
    /// Sector name → relevance weight (0–100), the 1–3 most affected sectors.
    #[serde(default)]
    pub sectors: HashMap<String, f64>,
}

/// Opaque batch classifier: titles in, per-title analysis out. Tolerates up
/// to ~15 titles per call; a failed call leaves the whole batch pending.
#[async_trait::async_trait]
pub trait ScoringService: Send + Sync {
    async fn batch_analyze(&self, titles: &[String]) -> Result<HashMap<String, TitleAnalysis>>;
    fn name(&self) -> &'static str;
}

/// Outcome counters for one `sync_and_score` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoringSummary {
    pub inserted: usize,
    pub scored: usize,
    pub failed_chunks: usize,
    pub strategy_hits: usize,
}

/// Tracks which news already carries a score, batches the rest to the
/// scoring service, writes results back, and flags high-confidence hits.
pub struct IncrementalScoringCoordinator<'a> {
    store: &'a dyn IntelStore,
    scorer: &'a dyn ScoringService,
    cfg: &'a ScanConfig,
}

impl<'a> IncrementalScoringCoordinator<'a> {
    pub fn new(store: &'a dyn IntelStore, scorer: &'a dyn ScoringService, cfg: &'a ScanConfig) -> Self {
        Self { store, scorer, cfg }
    }

    /// Ingest a raw batch (idempotent by title), then score everything of
    /// this kind still at the sentinel — including leftovers from earlier
    /// runs, so no unscored record is permanently stranded.
    pub async fn sync_and_score(
        &self,
        batch: &[RawNewsItem],
        kind: SourceKind,
    ) -> Result<ScoringSummary> {
        let mut summary = ScoringSummary {
            inserted: self.store.save_news_batch(batch, kind)?,
            ..Default::default()
        };
        if summary.inserted > 0 {
            info!(kind = %kind, inserted = summary.inserted, "new items stored");
        }

        let pending = self
            .store
            .get_pending_news(self.cfg.pending_lookback_days, kind)?;
        if pending.is_empty() {
            debug!(kind = %kind, "nothing pending to score");
            return Ok(summary);
        }
        info!(kind = %kind, pending = pending.len(), "scoring pending items");

        let titles: Vec<String> = pending.into_iter().map(|r| r.title).collect();
        for chunk in titles.chunks(self.cfg.scoring_chunk_size) {
            match self.scorer.batch_analyze(chunk).await {
                Ok(results) => {
                    for title in chunk {
                        // Titles the service skipped stay pending for the
                        // next run.
                        let Some(analysis) = results.get(title) else {
                            continue;
                        };
                        let sectors_json = serde_json::to_string(&analysis.sectors)
                            .unwrap_or_else(|_| "{}".to_string());
                        self.store
                            .update_news_score(title, analysis.score, &sectors_json)?;
                        summary.scored += 1;
                        if analysis.score >= self.cfg.strategy_hit_score {
                            self.store.record_strategy_hit(title, &sectors_json)?;
                            summary.strategy_hits += 1;
                            info!(title = %title, score = analysis.score, "strategy hit recorded");
                        }
                    }
                }
                Err(e) => {
                    // Per-chunk isolation: these titles remain at the
                    // sentinel and are retried on the next run.
                    warn!(kind = %kind, chunk_len = chunk.len(), error = %e, "scoring chunk failed");
                    counter!("scoring_chunks_failed_total").increment(1);
                    summary.failed_chunks += 1;
                }
            }
        }

        counter!("scoring_titles_scored_total").increment(summary.scored as u64);
        counter!("strategy_hits_total").increment(summary.strategy_hits as u64);
        Ok(summary)
    }
}

// ------------------------------------------------------------
// Providers
// ------------------------------------------------------------

/// DeepSeek-compatible chat-completions scorer (JSON mode). Requires
/// `DEEPSEEK_API_KEY`; base URL and model can be overridden.
pub struct DeepSeekScorer {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl DeepSeekScorer {
    pub fn from_env(settings: &HttpSettings) -> Result<Self> {
        let api_key = std::env::var("DEEPSEEK_API_KEY").unwrap_or_default();
        Ok(Self {
            http: settings.build_client()?,
            api_key,
            base_url: std::env::var("DEEPSEEK_BASE_URL")
                .unwrap_or_else(|_| "https://api.deepseek.com".to_string()),
            model: std::env::var("DEEPSEEK_MODEL").unwrap_or_else(|_| "deepseek-chat".to_string()),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn build_prompt(titles: &[String]) -> String {
        let list = serde_json::to_string(titles).unwrap_or_else(|_| "[]".to_string());
        format!(
            "You are a senior equity strategy analyst. Assess how bullish each \
             news title below is for stock-market sectors.\n\
             Titles: {list}\n\
             Return STRICT JSON only, shaped as:\n\
             {{\"<title>\": {{\"score\": <integer 0-100>, \
             \"sectors\": {{\"<sector name>\": <integer 0-100>}}}}}}\n\
             Use the market's native sector vocabulary for sector names \
             (1-3 most affected sectors per title). If a title is unrelated \
             to the market, give score 0 and an empty sectors object."
        )
    }
}

#[async_trait::async_trait]
impl ScoringService for DeepSeekScorer {
    async fn batch_analyze(&self, titles: &[String]) -> Result<HashMap<String, TitleAnalysis>> {
        anyhow::ensure!(self.is_configured(), "DEEPSEEK_API_KEY is not set");
        if titles.is_empty() {
            return Ok(HashMap::new());
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            response_format: serde_json::Value,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let prompt = Self::build_prompt(titles);
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: "You are a data interface that outputs JSON only.",
                },
                Msg {
                    role: "user",
                    content: &prompt,
                },
            ],
            response_format: serde_json::json!({"type": "json_object"}),
            temperature: 0.1,
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("scoring service request failed")?;
        anyhow::ensure!(
            resp.status().is_success(),
            "scoring service returned {}",
            resp.status()
        );
        let body: Resp = resp.json().await.context("decoding scoring response")?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("");
        parse_analysis_payload(content)
    }

    fn name(&self) -> &'static str {
        "deepseek"
    }
}

/// Extract the analysis map from the model output, tolerating code fences
/// and leading prose around the JSON object.
pub fn parse_analysis_payload(content: &str) -> Result<HashMap<String, TitleAnalysis>> {
    let trimmed = content.trim();
    let json_slice = if trimmed.starts_with('{') {
        trimmed
    } else {
        let start = trimmed.find('{').context("no JSON object in scoring response")?;
        let end = trimmed.rfind('}').context("unterminated JSON in scoring response")?;
        &trimmed[start..=end]
    };
    serde_json::from_str(json_slice).context("parsing scoring response payload")
}

/// Deterministic scorer for tests and offline runs: returns canned results
/// by title, or a fixed fallback for everything else.
#[derive(Default)]
pub struct MockScorer {
    canned: HashMap<String, TitleAnalysis>,
    fallback: Option<TitleAnalysis>,
}

impl MockScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, title: &str, analysis: TitleAnalysis) -> Self {
        self.canned.insert(title.to_string(), analysis);
        self
    }

    pub fn with_fallback(mut self, analysis: TitleAnalysis) -> Self {
        self.fallback = Some(analysis);
        self
    }
}

#[async_trait::async_trait]
impl ScoringService for MockScorer {
    async fn batch_analyze(&self, titles: &[String]) -> Result<HashMap<String, TitleAnalysis>> {
        let mut out = HashMap::new();
        for t in titles {
            if let Some(a) = self.canned.get(t) {
                out.insert(t.clone(), a.clone());
            } else if let Some(f) = &self.fallback {
                out.insert(t.clone(), f.clone());
            }
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn raw(title: &str) -> RawNewsItem {
        RawNewsItem {
            title: title.to_string(),
            pub_date: "2026-08-21".to_string(),
        }
    }

    fn analysis(score: f64, sector: &str, weight: f64) -> TitleAnalysis {
        let mut sectors = HashMap::new();
        sectors.insert(sector.to_string(), weight);
        TitleAnalysis { score, sectors }
    }

    #[test]
    fn payload_parser_tolerates_code_fences() {
        let fenced = "```json\n{\"t\": {\"score\": 80, \"sectors\": {\"半导体\": 90}}}\n```";
        let map = parse_analysis_payload(fenced).unwrap();
        assert_eq!(map["t"].score, 80.0);
        assert_eq!(map["t"].sectors["半导体"], 90.0);
    }

    #[test]
    fn payload_parser_rejects_non_json() {
        assert!(parse_analysis_payload("sorry, I cannot help").is_err());
    }

    #[tokio::test]
    async fn scored_items_leave_the_pending_set() {
        let store = MemoryStore::new();
        let cfg = ScanConfig::default();
        let scorer = MockScorer::new().with_fallback(analysis(70.0, "半导体", 80.0));
        let coord = IncrementalScoringCoordinator::new(&store, &scorer, &cfg);

        let summary = coord
            .sync_and_score(&[raw("a"), raw("b")], SourceKind::Policy)
            .await
            .unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.scored, 2);
        assert!(store
            .get_pending_news(30, SourceKind::Policy)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn titles_missing_from_response_stay_pending() {
        let store = MemoryStore::new();
        let cfg = ScanConfig::default();
        let scorer = MockScorer::new().with_result("a", analysis(60.0, "电力设备", 70.0));
        let coord = IncrementalScoringCoordinator::new(&store, &scorer, &cfg);

        coord
            .sync_and_score(&[raw("a"), raw("b")], SourceKind::Flash)
            .await
            .unwrap();
        let pending = store.get_pending_news(30, SourceKind::Flash).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].title, "b");
    }

    #[tokio::test]
    async fn high_scores_append_strategy_hits() {
        let store = MemoryStore::new();
        let cfg = ScanConfig::default();
        let scorer = MockScorer::new()
            .with_result("big policy", analysis(92.0, "半导体", 95.0))
            .with_fallback(analysis(40.0, "其他", 10.0));
        let coord = IncrementalScoringCoordinator::new(&store, &scorer, &cfg);

        let summary = coord
            .sync_and_score(&[raw("big policy"), raw("minor note")], SourceKind::Policy)
            .await
            .unwrap();
        assert_eq!(summary.strategy_hits, 1);
        let hits = store.strategy_hits().unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "big policy");
    }

    /// Fails every call after the first, to prove per-chunk isolation.
    struct FirstChunkOnlyScorer {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ScoringService for FirstChunkOnlyScorer {
        async fn batch_analyze(
            &self,
            titles: &[String],
        ) -> Result<HashMap<String, TitleAnalysis>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
                anyhow::bail!("scoring service timeout");
            }
            Ok(titles
                .iter()
                .map(|t| (t.clone(), TitleAnalysis { score: 75.0, sectors: HashMap::new() }))
                .collect())
        }
        fn name(&self) -> &'static str {
            "first-chunk-only"
        }
    }

    #[tokio::test]
    async fn failed_chunk_does_not_abort_the_run() {
        let store = MemoryStore::new();
        let cfg = ScanConfig::default();
        let items: Vec<RawNewsItem> = (0..30).map(|i| raw(&format!("title-{i:02}"))).collect();
        let scorer = FirstChunkOnlyScorer { calls: AtomicUsize::new(0) };
        let coord = IncrementalScoringCoordinator::new(&store, &scorer, &cfg);

        let summary = coord.sync_and_score(&items, SourceKind::Flash).await.unwrap();
        assert_eq!(summary.inserted, 30);
        assert_eq!(summary.scored, 15, "first chunk of 15 is persisted");
        assert_eq!(summary.failed_chunks, 1);

        let pending = store.get_pending_news(30, SourceKind::Flash).unwrap();
        assert_eq!(pending.len(), 15, "failed chunk stays at the sentinel for retry");
    }
}
