// src/harvest.rs
//! Feed boundary: adapts loosely-typed tabular rows from upstream data
//! providers into canonical structs, exactly once, so the core never sees
//! inconsistent column names.
//!
//! Also owns the outbound-HTTP knobs (`HttpSettings` with an explicit
//! no-proxy field rather than process-wide env mutation) and the injected
//! `RetryPolicy` that replaces ad hoc retry-with-sleep loops.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{PopularityEntry, RawNewsItem, SourceKind};

/// Column aliases seen across upstream sources for instrument codes.
const CODE_COLUMNS: [&str; 3] = ["code", "代码", "股票代码"];
/// Column aliases for display names.
const NAME_COLUMNS: [&str; 3] = ["name", "名称", "股票名称"];
/// Column aliases for news titles.
const TITLE_COLUMNS: [&str; 5] = ["title", "标题", "政策标题", "content", "内容"];
/// Column aliases for publication dates.
const DATE_COLUMNS: [&str; 4] = ["date", "日期", "发布时间", "pub_date"];

/// Explicit HTTP client configuration for outbound calls. "No proxy" is a
/// field here, never a process-wide side effect.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub user_agent: String,
    pub no_proxy: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(4),
            timeout: Duration::from_secs(20),
            user_agent: "resonance-scanner/0.1".to_string(),
            no_proxy: true,
        }
    }
}

impl HttpSettings {
    pub fn build_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .connect_timeout(self.connect_timeout)
            .timeout(self.timeout);
        if self.no_proxy {
            builder = builder.no_proxy();
        }
        builder.build().context("building HTTP client")
    }
}

/// Bounded retry with fixed backoff, injected into flaky boundary calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds or attempts are exhausted; the final
    /// error is returned as-is.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    if attempt < attempts {
                        debug!(attempt, error = %e, "boundary call failed; backing off");
                        tokio::time::sleep(self.backoff).await;
                    }
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.expect("at least one attempt runs"))
    }
}

/// Normalize a raw feed title: decode HTML entities, strip tags, collapse
/// whitespace, cap length. Titles are the dedup key downstream, so this
/// must be deterministic.
pub fn normalize_title(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > 300 {
        out = out.chars().take(300).collect();
    }
    out
}

fn field<'a>(row: &'a Value, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|k| row.get(k))
}

fn value_to_code(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        // Numeric codes lose leading zeros upstream; restore 6-digit form.
        Value::Number(n) => n.as_u64().map(|u| format!("{:06}", u)),
        _ => None,
    }
}

fn value_to_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Map raw popularity rows to canonical entries. Rank is positional within
/// the batch; rows missing a usable code or name are dropped, not fatal.
pub fn adapt_popularity_rows(rows: &[Value]) -> Vec<PopularityEntry> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let code = field(row, &CODE_COLUMNS).and_then(value_to_code);
        let name = field(row, &NAME_COLUMNS).and_then(value_to_text);
        match (code, name) {
            (Some(code), Some(name)) => {
                out.push(PopularityEntry {
                    code,
                    name,
                    rank_index: out.len(),
                });
            }
            _ => debug!(?row, "popularity row missing code/name; dropped"),
        }
    }
    out
}

/// Map raw news rows to canonical items with normalized titles. Rows with
/// no recognizable title are dropped.
pub fn adapt_news_rows(rows: &[Value]) -> Vec<RawNewsItem> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let title = field(row, &TITLE_COLUMNS)
            .and_then(value_to_text)
            .map(|t| normalize_title(&t))
            .filter(|t| !t.is_empty());
        let Some(title) = title else {
            debug!(?row, "news row missing title; dropped");
            continue;
        };
        let pub_date = field(row, &DATE_COLUMNS)
            .and_then(value_to_text)
            .unwrap_or_default();
        out.push(RawNewsItem { title, pub_date });
    }
    out
}

/// Market-data/news harvesting collaborator. Implementations may return an
/// empty result on transient failure; the scan pipeline also absorbs `Err`
/// at its boundary and continues with empty input.
#[async_trait::async_trait]
pub trait MarketFeed: Send + Sync {
    async fn fetch_popularity(&self) -> Result<Vec<PopularityEntry>>;
    async fn fetch_news(&self, kind: SourceKind) -> Result<Vec<RawNewsItem>>;
    fn name(&self) -> &'static str;
}

/// Feed backed by JSON snapshot files in a data directory, written by an
/// external harvesting process:
///
/// - `popularity.json`    — array of tabular rows
/// - `news_policy.json`   — array of tabular rows
/// - `news_flash.json`    — array of tabular rows
///
/// Missing files read as empty batches.
pub struct SnapshotFeed {
    dir: PathBuf,
    retry: RetryPolicy,
}

impl SnapshotFeed {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn read_rows(&self, file: &str) -> Result<Vec<Value>> {
        let path = self.dir.join(file);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let path_for_op = path.clone();
        self.retry
            .run(|| {
                let path = path_for_op.clone();
                async move {
                    let content = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("reading snapshot {}", path.display()))?;
                    let rows: Vec<Value> = serde_json::from_str(&content)
                        .with_context(|| format!("parsing snapshot {}", path.display()))?;
                    Ok(rows)
                }
            })
            .await
    }
}

#[async_trait::async_trait]
impl MarketFeed for SnapshotFeed {
    async fn fetch_popularity(&self) -> Result<Vec<PopularityEntry>> {
        let rows = self.read_rows("popularity.json").await?;
        let entries = adapt_popularity_rows(&rows);
        if entries.len() < rows.len() {
            warn!(
                dropped = rows.len() - entries.len(),
                "popularity rows dropped during adaptation"
            );
        }
        Ok(entries)
    }

    async fn fetch_news(&self, kind: SourceKind) -> Result<Vec<RawNewsItem>> {
        let file = match kind {
            SourceKind::Policy => "news_policy.json",
            SourceKind::Flash => "news_flash.json",
        };
        let rows = self.read_rows(file).await?;
        Ok(adapt_news_rows(&rows))
    }

    fn name(&self) -> &'static str {
        "snapshot"
    }
}
