//! Cache store round-trip and expiry behaviour, exercised through the
//! public `CacheStore` API against a `tempfile::TempDir`.

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use webcrawl_core::cache::CacheStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Payload {
    title: String,
    word_count: usize,
}

#[tokio::test]
async fn set_then_get_round_trips_within_max_age() {
    let dir = TempDir::new().expect("tempdir");
    let store = CacheStore::new(dir.path());
    let payload = Payload { title: "hello".to_string(), word_count: 2 };

    store.set("https://a.test/page", &payload, 3_600, None).await.expect("set");
    let fetched: Option<Payload> = store.get("https://a.test/page", 3_600, None).await.expect("get");

    assert_eq!(fetched, Some(payload));
}

#[tokio::test]
async fn get_misses_once_max_age_has_elapsed() {
    let dir = TempDir::new().expect("tempdir");
    let store = CacheStore::new(dir.path());
    let payload = Payload { title: "stale".to_string(), word_count: 1 };

    store.set("https://a.test/page", &payload, 3_600, None).await.expect("set");
    let fetched: Option<Payload> = store.get("https://a.test/page", 0, None).await.expect("get");

    assert_eq!(fetched, None);
}

#[tokio::test]
async fn different_variants_do_not_collide() {
    let dir = TempDir::new().expect("tempdir");
    let store = CacheStore::new(dir.path());
    let markdown_only = Payload { title: "markdown".to_string(), word_count: 10 };
    let with_screenshot = Payload { title: "markdown+screenshot".to_string(), word_count: 10 };

    store.set("https://a.test/page", &markdown_only, 3_600, Some("markdown")).await.expect("set a");
    store.set("https://a.test/page", &with_screenshot, 3_600, Some("markdown,screenshot")).await.expect("set b");

    let a: Option<Payload> = store.get("https://a.test/page", 3_600, Some("markdown")).await.expect("get a");
    let b: Option<Payload> = store.get("https://a.test/page", 3_600, Some("markdown,screenshot")).await.expect("get b");

    assert_eq!(a, Some(markdown_only));
    assert_eq!(b, Some(with_screenshot));
}

#[tokio::test]
async fn stats_reports_entry_counts() {
    let dir = TempDir::new().expect("tempdir");
    let store = CacheStore::new(dir.path());
    let payload = Payload { title: "x".to_string(), word_count: 1 };

    store.set("https://a.test/one", &payload, 3_600, None).await.expect("set");
    store.set("https://a.test/two", &payload, 3_600, None).await.expect("set");

    let stats = store.stats().await;
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.valid, 2);
    assert_eq!(stats.expired, 0);
}
