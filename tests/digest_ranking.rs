// tests/digest_ranking.rs
//
// Digest selection, feedback boost and rendering over real stores.
//
// Covered:
// - boost reorders for the recipient who clicked, and only for them
// - repeated builds over the same snapshot are byte-identical
// - lookback window and max_items
// - feedback links in the HTML rendering

use chrono::{Duration, TimeZone, Utc};
use std::collections::BTreeSet;
use tempfile::tempdir;

use trend_monitor::config::ImpactWeights;
use trend_monitor::dedup::prepare_candidate;
use trend_monitor::digest::{render, DigestParams, RenderOptions, Scorer};
use trend_monitor::model::{Impact, TrendItem};
use trend_monitor::store::RelevanceStore;

const RECIPIENT: &str = "analyst@bank.io";

fn scorer() -> Scorer {
    // No recency term so the comparison is pure impact + boost.
    Scorer::new(
        ImpactWeights {
            high: 1.0,
            medium: 0.8,
            low: 0.5,
        },
        0.0,
        7.0,
        0.5,
    )
}

fn params() -> DigestParams {
    DigestParams {
        lookback_days: 30,
        max_items: 20,
    }
}

fn item(url: &str, title: &str, impact: Impact, age_days: i64) -> TrendItem {
    let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    let mut it = TrendItem::candidate(url, title, impact, now - Duration::days(age_days));
    prepare_candidate(&mut it);
    it
}

#[test]
fn feedback_boost_moves_item_above_higher_impact() {
    let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    let a = item("https://a.io/high", "A", Impact::High, 2);
    let b = item("https://a.io/medium", "B", Impact::Medium, 2);
    let items = vec![a.clone(), b.clone()];

    let dir = tempdir().expect("tempdir");
    let relevance = RelevanceStore::open(dir.path().join("feedback.jsonl")).expect("open");

    let before = scorer()
        .build(&items, &relevance.boost_set(RECIPIENT), params(), now)
        .expect("build");
    assert_eq!(before.item_ids(), vec![a.id.clone(), b.id.clone()]);

    relevance
        .record(RECIPIENT, &b.id, "digest-2025-05-31-0800", now)
        .expect("record");

    let after = scorer()
        .build(&items, &relevance.boost_set(RECIPIENT), params(), now)
        .expect("build");
    assert_eq!(after.item_ids(), vec![b.id.clone(), a.id.clone()]);
    assert!((after.entries[0].score - 1.3).abs() < 1e-9);
    assert!(after.entries[0].boosted);
    assert!((after.entries[1].score - 1.0).abs() < 1e-9);

    // Another recipient's digest is unaffected.
    let other = scorer()
        .build(&items, &relevance.boost_set("someone@else.io"), params(), now)
        .expect("build");
    assert_eq!(other.item_ids(), vec![a.id, b.id]);
}

#[test]
fn repeated_builds_are_identical() {
    let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    // Equal scores everywhere so only the tie-breakers decide.
    let items: Vec<TrendItem> = (0..12)
        .map(|i| item(&format!("https://a.io/{i}"), &format!("T{i}"), Impact::Low, 1))
        .collect();
    let boost: BTreeSet<String> = BTreeSet::new();

    let first = scorer().build(&items, &boost, params(), now).expect("build");
    let mut reversed = items.clone();
    reversed.reverse();
    let second = scorer().build(&reversed, &boost, params(), now).expect("build");
    assert_eq!(first.item_ids(), second.item_ids());

    let opts = RenderOptions {
        title: "Digest",
        run_id: "digest-2025-06-01-1200",
        feedback_base_url: None,
        recipient: None,
    };
    assert_eq!(render(&first, &opts).text, render(&second, &opts).text);
}

#[test]
fn window_and_limit_are_applied() {
    let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    let items = vec![
        item("https://a.io/1", "fresh high", Impact::High, 1),
        item("https://a.io/2", "fresh medium", Impact::Medium, 1),
        item("https://a.io/3", "fresh low", Impact::Low, 1),
        item("https://a.io/4", "stale high", Impact::High, 45),
    ];
    let d = scorer()
        .build(
            &items,
            &BTreeSet::new(),
            DigestParams {
                lookback_days: 30,
                max_items: 2,
            },
            now,
        )
        .expect("build");
    assert_eq!(d.total, 4);
    assert_eq!(d.considered, 3);
    assert_eq!(d.included(), 2);
    let titles: Vec<&str> = d.entries.iter().map(|e| e.item.title.as_str()).collect();
    assert_eq!(titles, vec!["fresh high", "fresh medium"]);

    let zero = scorer().build(
        &items,
        &BTreeSet::new(),
        DigestParams {
            lookback_days: 0,
            max_items: 2,
        },
        now,
    );
    assert!(zero.is_err());
}

#[test]
fn html_carries_feedback_links() {
    let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    let items = vec![item("https://a.io/1", "Card <rules> & fees", Impact::High, 1)];
    let d = scorer().build(&items, &BTreeSet::new(), params(), now).expect("build");
    let rendered = render(
        &d,
        &RenderOptions {
            title: "Digest",
            run_id: "digest-2025-06-01-1200",
            feedback_base_url: Some("https://fb.example.com"),
            recipient: Some(RECIPIENT),
        },
    );
    assert!(rendered.html.contains("/feedback/relevant?item_id="));
    assert!(rendered.html.contains("analyst%40bank.io"));
    assert!(rendered.html.contains("Card &lt;rules&gt; &amp; fees"));
    assert!(rendered.text.contains("Card <rules> & fees"));
    assert_eq!(rendered.item_ids, d.item_ids());
}
