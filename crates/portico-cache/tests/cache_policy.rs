//! Integration tests for CachePolicyEngine.
//!
//! A scripted fetcher stands in for the network; time-based races run on a
//! paused tokio clock and freshness runs on a ManualClock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use portico_cache::{
    CachePolicyEngine, CacheRule, CacheStore, Fetcher, ManualClock, ProxyError, ProxyManifest,
    ProxyRequest, ProxyResponse, ProxyResult, ResponseSource, UrlPattern,
};
use tempfile::TempDir;

#[derive(Debug, Clone)]
enum Behavior {
    Respond(u16, &'static str),
    Delay(Duration, u16, &'static str),
    Fail,
}

#[derive(Debug)]
struct ScriptedFetcher {
    calls: AtomicUsize,
    default: Mutex<Behavior>,
    per_url: Mutex<HashMap<String, Behavior>>,
}

impl ScriptedFetcher {
    fn new(default: Behavior) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            default: Mutex::new(default),
            per_url: Mutex::new(HashMap::new()),
        })
    }

    fn set_default(&self, behavior: Behavior) {
        *self.default.lock().unwrap() = behavior;
    }

    fn set_for(&self, url: &str, behavior: Behavior) {
        self.per_url.lock().unwrap().insert(url.to_string(), behavior);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &ProxyRequest) -> ProxyResult<ProxyResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .per_url
            .lock()
            .unwrap()
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| self.default.lock().unwrap().clone());

        match behavior {
            Behavior::Respond(status, body) => Ok(ProxyResponse::new(status, body)),
            Behavior::Delay(delay, status, body) => {
                tokio::time::sleep(delay).await;
                Ok(ProxyResponse::new(status, body))
            }
            Behavior::Fail => Err(ProxyError::Network {
                message: "connection refused".to_string(),
            }),
        }
    }
}

struct Harness {
    engine: CachePolicyEngine,
    fetcher: Arc<ScriptedFetcher>,
    clock: Arc<ManualClock>,
    store: Arc<CacheStore>,
}

fn harness(default: Behavior) -> Harness {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(CacheStore::with_clock(clock.clone()));
    let fetcher = ScriptedFetcher::new(default);
    let engine = CachePolicyEngine::from_manifest(
        &ProxyManifest::portico_default(),
        Arc::clone(&store),
        fetcher.clone(),
    )
    .expect("default manifest installs");

    Harness {
        engine,
        fetcher,
        clock,
        store,
    }
}

const IMAGE: &str = "https://portal.example.com/img/logo.png";
const FONT: &str = "https://fonts.googleapis.com/css2?family=Inter";
const API: &str = "https://portal.example.com/api/audits";

// ==================== CacheFirst ====================

#[tokio::test]
async fn test_cache_first_fresh_entry_served_without_network() {
    let h = harness(Behavior::Respond(200, "png-bytes"));

    let first = h.engine.handle(&ProxyRequest::get(IMAGE)).await.unwrap();
    assert_eq!(first.source, ResponseSource::Network);
    assert!(first.stored);
    assert_eq!(h.fetcher.calls(), 1);

    h.clock.advance(Duration::from_secs(29 * 24 * 60 * 60));
    let second = h.engine.handle(&ProxyRequest::get(IMAGE)).await.unwrap();
    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(second.response.body, b"png-bytes");
    assert_eq!(h.fetcher.calls(), 1, "fresh hit must not touch the network");
}

#[tokio::test]
async fn test_cache_first_stale_entry_triggers_fetch() {
    let h = harness(Behavior::Respond(200, "v1"));
    h.engine.handle(&ProxyRequest::get(IMAGE)).await.unwrap();

    h.clock.advance(Duration::from_secs(30 * 24 * 60 * 60 + 1));
    h.fetcher.set_default(Behavior::Respond(200, "v2"));

    let served = h.engine.handle(&ProxyRequest::get(IMAGE)).await.unwrap();
    assert_eq!(served.source, ResponseSource::Network);
    assert_eq!(served.response.body, b"v2");
    assert_eq!(h.fetcher.calls(), 2);
}

#[tokio::test]
async fn test_cache_first_non_cacheable_status_returned_unstored() {
    let h = harness(Behavior::Respond(404, "missing"));

    let served = h.engine.handle(&ProxyRequest::get(IMAGE)).await.unwrap();
    assert_eq!(served.response.status, 404);
    assert!(!served.stored);
    assert!(h.store.partition("images-cache").await.is_none());

    h.engine.handle(&ProxyRequest::get(IMAGE)).await.unwrap();
    assert_eq!(h.fetcher.calls(), 2);
}

#[tokio::test]
async fn test_cache_first_miss_with_network_failure_errors() {
    let h = harness(Behavior::Fail);

    let err = h.engine.handle(&ProxyRequest::get(IMAGE)).await.unwrap_err();
    assert!(matches!(err, ProxyError::Network { .. }));
}

#[tokio::test]
async fn test_cache_first_stale_entry_not_served_when_network_fails() {
    let h = harness(Behavior::Respond(200, "v1"));
    h.engine.handle(&ProxyRequest::get(IMAGE)).await.unwrap();

    h.clock.advance(Duration::from_secs(31 * 24 * 60 * 60));
    h.fetcher.set_default(Behavior::Fail);

    let err = h.engine.handle(&ProxyRequest::get(IMAGE)).await.unwrap_err();
    assert!(matches!(err, ProxyError::Network { .. }));
}

#[tokio::test]
async fn test_fonts_store_opaque_responses() {
    let h = harness(Behavior::Respond(0, ""));

    let served = h.engine.handle(&ProxyRequest::get(FONT)).await.unwrap();
    assert!(served.stored);
    assert_eq!(served.cache_name.as_deref(), Some("google-fonts-cache"));

    let again = h.engine.handle(&ProxyRequest::get(FONT)).await.unwrap();
    assert_eq!(again.source, ResponseSource::Cache);
    assert_eq!(again.response.status, 0);
}

#[tokio::test]
async fn test_images_do_not_store_opaque_responses() {
    let h = harness(Behavior::Respond(0, ""));

    let served = h.engine.handle(&ProxyRequest::get(IMAGE)).await.unwrap();
    assert!(!served.stored);
}

#[tokio::test]
async fn test_61st_image_evicts_exactly_the_least_recently_used() {
    let h = harness(Behavior::Respond(200, "img"));
    let url = |i: usize| format!("https://portal.example.com/img/{i}.webp");

    for i in 0..60 {
        h.engine.handle(&ProxyRequest::get(url(i))).await.unwrap();
    }
    // Touch image 0 so image 1 becomes least recently used.
    let hit = h.engine.handle(&ProxyRequest::get(url(0))).await.unwrap();
    assert_eq!(hit.source, ResponseSource::Cache);

    let partition = h.store.partition("images-cache").await.unwrap();
    assert_eq!(partition.len().await, 60);

    h.engine.handle(&ProxyRequest::get(url(60))).await.unwrap();

    assert_eq!(partition.len().await, 60);
    assert!(!partition.contains(&url(1)).await);
    assert!(partition.contains(&url(0)).await);
    assert!(partition.contains(&url(60)).await);
    assert_eq!(partition.stats().await.evictions, 1);
}

#[tokio::test]
async fn test_partition_never_exceeds_capacity() {
    let h = harness(Behavior::Respond(200, "font"));
    for i in 0..25 {
        let url = format!("https://fonts.googleapis.com/css?family=F{i}");
        h.engine.handle(&ProxyRequest::get(url)).await.unwrap();
    }

    let partition = h.store.partition("google-fonts-cache").await.unwrap();
    assert_eq!(partition.len().await, 10);
    assert_eq!(partition.stats().await.evictions, 15);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_same_key_keep_one_entry() {
    let h = harness(Behavior::Respond(200, "img"));
    let engine = h.engine.clone();

    let mut handles = Vec::new();
    for _ in 0..32 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.handle(&ProxyRequest::get(IMAGE)).await
        }));
    }
    for handle in handles {
        let served = handle.await.unwrap().unwrap();
        assert_eq!(served.response.body, b"img");
    }

    let partition = h.store.partition("images-cache").await.unwrap();
    assert_eq!(partition.len().await, 1);
    assert_eq!(partition.stats().await.evictions, 0);
}

// ==================== NetworkFirst ====================

#[tokio::test(start_paused = true)]
async fn test_network_first_200_returned_and_stored() {
    let h = harness(Behavior::Delay(Duration::from_secs(3), 200, "[1,2]"));

    let served = h.engine.handle(&ProxyRequest::get(API)).await.unwrap();
    assert_eq!(served.source, ResponseSource::Network);
    assert!(served.stored);

    let partition = h.store.partition("api-cache").await.unwrap();
    assert!(partition.contains(API).await);
}

#[tokio::test(start_paused = true)]
async fn test_network_first_timeout_serves_prior_entry() {
    let h = harness(Behavior::Respond(200, "prior"));
    h.engine.handle(&ProxyRequest::get(API)).await.unwrap();

    h.fetcher
        .set_default(Behavior::Delay(Duration::from_secs(11), 200, "late"));

    let served = h.engine.handle(&ProxyRequest::get(API)).await.unwrap();
    assert_eq!(served.source, ResponseSource::Fallback);
    assert_eq!(served.response.body, b"prior");
}

#[tokio::test(start_paused = true)]
async fn test_network_first_timeout_without_entry_is_network_error() {
    let h = harness(Behavior::Delay(Duration::from_secs(11), 200, "late"));

    let err = h.engine.handle(&ProxyRequest::get(API)).await.unwrap_err();
    assert!(err.is_retryable());
    match err {
        ProxyError::Timeout { url, after } => {
            assert_eq!(url, API);
            assert_eq!(after, Duration::from_secs(10));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_network_first_late_response_still_stored() {
    let h = harness(Behavior::Delay(Duration::from_secs(11), 200, "late"));

    assert!(h.engine.handle(&ProxyRequest::get(API)).await.is_err());

    tokio::time::sleep(Duration::from_secs(2)).await;

    let partition = h.store.partition("api-cache").await.unwrap();
    assert!(partition.contains(API).await);
}

#[tokio::test(start_paused = true)]
async fn test_network_first_failure_falls_back_to_stored_entry() {
    let h = harness(Behavior::Respond(200, "prior"));
    h.engine.handle(&ProxyRequest::get(API)).await.unwrap();

    h.fetcher.set_default(Behavior::Fail);
    let served = h.engine.handle(&ProxyRequest::get(API)).await.unwrap();
    assert_eq!(served.source, ResponseSource::Fallback);
    assert_eq!(served.response.body, b"prior");
}

#[tokio::test(start_paused = true)]
async fn test_network_first_expired_entry_is_not_a_fallback() {
    let h = harness(Behavior::Respond(200, "prior"));
    h.engine.handle(&ProxyRequest::get(API)).await.unwrap();

    h.clock.advance(Duration::from_secs(5 * 60));
    h.fetcher.set_default(Behavior::Fail);

    let err = h.engine.handle(&ProxyRequest::get(API)).await.unwrap_err();
    assert!(matches!(err, ProxyError::Network { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_network_first_non_cacheable_status_returned_unstored() {
    let h = harness(Behavior::Respond(200, "prior"));
    h.engine.handle(&ProxyRequest::get(API)).await.unwrap();

    h.fetcher.set_default(Behavior::Respond(500, "boom"));
    let served = h.engine.handle(&ProxyRequest::get(API)).await.unwrap();
    assert_eq!(served.source, ResponseSource::Network);
    assert_eq!(served.response.status, 500);
    assert!(!served.stored);

    let partition = h.store.partition("api-cache").await.unwrap();
    let stored = partition.get_fresh(API, h.store.clock().now()).await.unwrap();
    assert_eq!(stored.response.body, b"prior");
}

// ==================== Passthrough ====================

#[tokio::test]
async fn test_unmatched_request_passes_through_unstored() {
    let h = harness(Behavior::Respond(200, "<html>"));

    let served = h
        .engine
        .handle(&ProxyRequest::get("https://portal.example.com/index.html"))
        .await
        .unwrap();
    assert_eq!(served.source, ResponseSource::Passthrough);
    assert!(served.cache_name.is_none());
    assert!(h.store.partition_names().await.is_empty());
}

#[tokio::test]
async fn test_non_get_requests_bypass_rules() {
    let h = harness(Behavior::Respond(200, "created"));
    h.fetcher.set_for(API, Behavior::Respond(201, "created"));

    let served = h
        .engine
        .handle(&ProxyRequest::get(API).with_method("POST"))
        .await
        .unwrap();
    assert_eq!(served.source, ResponseSource::Passthrough);
    assert_eq!(served.response.status, 201);
    assert!(h.store.partition("api-cache").await.is_none());
}

// ==================== Persistence ====================

#[tokio::test]
async fn test_persisted_partitions_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::default());
    let fetcher = ScriptedFetcher::new(Behavior::Respond(200, "img"));
    let manifest = ProxyManifest::portico_default();

    {
        let store = Arc::new(
            CacheStore::open(temp_dir.path(), &manifest.revision, clock.clone())
                .await
                .unwrap(),
        );
        let engine =
            CachePolicyEngine::from_manifest(&manifest, Arc::clone(&store), fetcher.clone())
                .unwrap();
        engine.handle(&ProxyRequest::get(IMAGE)).await.unwrap();
        store.flush().await.unwrap();
    }

    let store = Arc::new(
        CacheStore::open(temp_dir.path(), &manifest.revision, clock.clone())
            .await
            .unwrap(),
    );
    let engine =
        CachePolicyEngine::from_manifest(&manifest, Arc::clone(&store), fetcher.clone()).unwrap();
    let served = engine.handle(&ProxyRequest::get(IMAGE)).await.unwrap();

    assert_eq!(served.source, ResponseSource::Cache);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_new_revision_discards_old_partitions() {
    let temp_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::default());
    let fetcher = ScriptedFetcher::new(Behavior::Respond(200, "img"));
    let manifest = ProxyManifest::portico_default();

    let store = Arc::new(
        CacheStore::open(temp_dir.path(), "rev-1", clock.clone())
            .await
            .unwrap(),
    );
    let engine =
        CachePolicyEngine::from_manifest(&manifest, Arc::clone(&store), fetcher.clone()).unwrap();
    engine.handle(&ProxyRequest::get(IMAGE)).await.unwrap();
    store.flush().await.unwrap();
    assert!(temp_dir.path().join("rev-1").exists());

    let upgraded = CacheStore::open(temp_dir.path(), "rev-2", clock.clone())
        .await
        .unwrap();
    assert!(upgraded.partition_names().await.is_empty());
    assert!(!temp_dir.path().join("rev-1").exists());
}

fn png_rule(max_entries: usize, max_age_seconds: u64) -> CacheRule {
    CacheRule::cache_first(
        UrlPattern::new(r"\.png$", true).unwrap(),
        "images-cache",
        max_entries,
        max_age_seconds,
    )
}

#[tokio::test]
async fn test_restored_partition_adopts_smaller_rule_capacity() {
    let temp_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::default());

    {
        let store = CacheStore::open(temp_dir.path(), "rev-1", clock.clone())
            .await
            .unwrap();
        let wide = png_rule(5, 3600);
        for i in 0..5 {
            store
                .insert(&wide, &format!("https://x/{i}.png"), ProxyResponse::new(200, "x"))
                .await
                .unwrap();
        }
        store.flush().await.unwrap();
    }

    let store = CacheStore::open(temp_dir.path(), "rev-1", clock.clone())
        .await
        .unwrap();
    let narrow = png_rule(2, 3600);
    store
        .insert(&narrow, "https://x/new.png", ProxyResponse::new(200, "x"))
        .await
        .unwrap();

    let partition = store.partition("images-cache").await.unwrap();
    assert_eq!(partition.max_entries().await, 2);
    assert_eq!(partition.len().await, 2);
    assert_eq!(partition.keys().await, vec!["https://x/4.png", "https://x/new.png"]);
}

#[tokio::test]
async fn test_restored_partition_adopts_rule_max_age_on_lookup() {
    let temp_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::default());

    {
        let store = CacheStore::open(temp_dir.path(), "rev-1", clock.clone())
            .await
            .unwrap();
        store
            .insert(&png_rule(5, 3600), "https://x/a.png", ProxyResponse::new(200, "a"))
            .await
            .unwrap();
        store.flush().await.unwrap();
    }

    let store = CacheStore::open(temp_dir.path(), "rev-1", clock.clone())
        .await
        .unwrap();
    clock.advance(Duration::from_secs(120));

    assert!(store
        .lookup(&png_rule(5, 60), "https://x/a.png")
        .await
        .is_none());
}

#[tokio::test]
async fn test_zero_capacity_snapshot_skipped_on_open() {
    let temp_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::default());

    {
        let store = CacheStore::open(temp_dir.path(), "rev-1", clock.clone())
            .await
            .unwrap();
        store
            .insert(&png_rule(5, 3600), "https://x/a.png", ProxyResponse::new(200, "a"))
            .await
            .unwrap();
        store.flush().await.unwrap();
    }
    std::fs::write(
        temp_dir.path().join("rev-1").join("fonts-cache.json"),
        r#"{"name":"fonts-cache","max_entries":0,"max_age_seconds":60,"entries":[]}"#,
    )
    .unwrap();

    let store = CacheStore::open(temp_dir.path(), "rev-1", clock.clone())
        .await
        .unwrap();

    assert_eq!(store.partition_names().await, vec!["images-cache"]);
}
