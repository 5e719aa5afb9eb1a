//! Whole-run behaviour of the crawl loop over a scripted link graph.

use carnaval_scrapers::config::{AutoThrottleSettings, HttpCacheSettings, Settings};
use carnaval_scrapers::crawler::Crawler;
use carnaval_scrapers::sinks::MemoryStore;
use carnaval_scrapers::testing::{LinkGraphExtractor, ScriptedTransport};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const SEED: &str = "https://a.test/";

fn settings() -> Settings {
    Settings {
        download_delay_secs: 0.0,
        autothrottle: AutoThrottleSettings {
            enabled: false,
            ..Default::default()
        },
        robots_obey: false,
        http_cache: HttpCacheSettings {
            enabled: false,
            ..Default::default()
        },
        retry_times: 0,
        ..Settings::default()
    }
}

fn extractor() -> Arc<LinkGraphExtractor> {
    Arc::new(LinkGraphExtractor::new("test", &["a.test"], &[SEED]))
}

fn read_lines(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test]
async fn test_missing_page_does_not_stop_siblings() {
    let transport = ScriptedTransport::new()
        .respond(SEED, 200, "link /page/1\nlink /page/2\nlink /page/3")
        .respond("https://a.test/page/1", 200, "article Uno")
        .respond("https://a.test/page/3", 200, "article Tres");
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("run.jsonl");

    let stats = Crawler::new(settings(), Arc::new(transport))
        .run(extractor(), &output)
        .await
        .unwrap();

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.persisted, 2);
    let mut urls: Vec<String> = read_lines(&output)
        .iter()
        .map(|l| l["url"].as_str().unwrap().to_string())
        .collect();
    urls.sort();
    assert_eq!(urls, vec!["https://a.test/page/1", "https://a.test/page/3"]);
}

#[tokio::test]
async fn test_cycles_and_offsite_links_are_not_fetched() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .respond(SEED, 200, "link /a\nlink /b\nlink https://otro.test/x")
            .respond("https://a.test/a", 200, "link /b\narticle A")
            .respond("https://a.test/b", 200, "link /a\narticle B"),
    );
    let dir = tempfile::tempdir().unwrap();

    let stats = Crawler::new(settings(), transport.clone())
        .run(extractor(), &dir.path().join("run.jsonl"))
        .await
        .unwrap();

    assert_eq!(transport.hits("https://a.test/a"), 1);
    assert_eq!(transport.hits("https://a.test/b"), 1);
    assert_eq!(transport.hits("https://otro.test/x"), 0);
    assert_eq!(stats.offsite, 1);
    // /a and /b link each other; both were already scheduled from the seed.
    assert_eq!(stats.duplicate_requests, 2);
    assert_eq!(stats.persisted, 2);
}

#[tokio::test]
async fn test_duplicate_and_incomplete_records_are_dropped() {
    let transport = ScriptedTransport::new()
        .respond(SEED, 200, "link /a\nlink /b\nrecord https://a.test/sin-titulo ")
        .respond("https://a.test/a", 200, "record https://a.test/misma Batalla de Flores")
        .respond("https://a.test/b", 200, "record https://a.test/misma Batalla de Flores");
    let store = Arc::new(MemoryStore::new());
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("run.jsonl");

    let stats = Crawler::new(settings(), Arc::new(transport))
        .with_remote(Some(store.clone()))
        .run(extractor(), &output)
        .await
        .unwrap();

    assert_eq!(stats.records_rejected, 1);
    assert_eq!(stats.records_emitted, 2);
    assert_eq!(stats.persisted, 1);
    assert_eq!(stats.dropped.get("deduplicate: duplicate"), Some(&1));
    assert_eq!(stats.remote_upserts, 1);
    assert_eq!(read_lines(&output).len(), 1);
    assert_eq!(store.rows("articles").len(), 1);
}

#[tokio::test]
async fn test_unreachable_remote_run_is_local_only() {
    let transport = ScriptedTransport::new().respond(SEED, 200, "article Portada");
    let store = Arc::new(MemoryStore::unreachable());
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("run.jsonl");

    let stats = Crawler::new(settings(), Arc::new(transport))
        .with_remote(Some(store.clone()))
        .run(extractor(), &output)
        .await
        .unwrap();

    assert_eq!(stats.persisted, 1);
    assert_eq!(stats.remote_upserts, 0);
    assert_eq!(store.upsert_calls(), 0);
    assert_eq!(read_lines(&output).len(), 1);
}

#[tokio::test]
async fn test_cancelled_run_stops_early() {
    let transport = Arc::new(ScriptedTransport::new().respond(SEED, 200, "article Portada"));
    let token = CancellationToken::new();
    token.cancel();
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("run.jsonl");

    let stats = Crawler::new(settings(), transport.clone())
        .with_cancellation(token)
        .run(extractor(), &output)
        .await
        .unwrap();

    assert!(stats.cancelled);
    assert_eq!(stats.persisted, 0);
    assert!(output.exists());
}
