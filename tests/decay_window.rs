// tests/decay_window.rs
// Interplay of the active-window store query and decay-weighted pooling:
// what leaves the window disappears from the pool, what stays decays.

use chrono::{Duration, Utc};
use resonance_scanner::config::ScanConfig;
use resonance_scanner::scan::pool::build_pool;
use resonance_scanner::store::{content_hash, IntelStore, MemoryStore};
use resonance_scanner::types::{NewsRecord, SourceKind};

fn backdated(title: &str, source: SourceKind, score: f64, hours_ago: i64, sectors_json: &str) -> NewsRecord {
    NewsRecord {
        title: title.to_string(),
        pub_date: "2026-08-10".to_string(),
        created_at: Utc::now() - Duration::hours(hours_ago),
        source,
        content_hash: content_hash(title),
        score,
        sectors_json: sectors_json.to_string(),
    }
}

#[test]
fn old_policy_still_pools_while_old_flash_is_gone() {
    let store = MemoryStore::new();
    let cfg = ScanConfig::default();

    // 5-day-old policy: inside the 14-day window.
    store.insert_record(backdated(
        "集成电路产业扶持政策",
        SourceKind::Policy,
        90.0,
        5 * 24,
        r#"{"半导体": 100}"#,
    ));
    // 2-day-old flash: strong score, but far outside the 24h window.
    store.insert_record(backdated(
        "晶圆代工涨价快讯",
        SourceKind::Flash,
        95.0,
        48,
        r#"{"半导体": 100}"#,
    ));

    let active = store.get_active_intelligence(14, 24, 60.0, 80.0).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].title, "集成电路产业扶持政策");

    let pool = build_pool(&active, &cfg);
    let entry = &pool["半导体"];
    // 90 * e^(-0.002 * 120) ~= 70.8; well below the raw score, well above 0.
    assert!(entry.total_score < 90.0);
    assert!(entry.total_score > 70.0);
}

#[test]
fn fresher_catalysts_outweigh_older_ones_of_equal_score() {
    let store = MemoryStore::new();
    let cfg = ScanConfig::default();

    store.insert_record(backdated(
        "新政策",
        SourceKind::Policy,
        80.0,
        1,
        r#"{"电力设备": 100}"#,
    ));
    store.insert_record(backdated(
        "旧政策",
        SourceKind::Policy,
        80.0,
        10 * 24,
        r#"{"半导体": 100}"#,
    ));

    let active = store.get_active_intelligence(14, 24, 60.0, 80.0).unwrap();
    let pool = build_pool(&active, &cfg);
    assert!(pool["电力设备"].total_score > pool["半导体"].total_score);
}
