//! Fetch controller behaviour against a scripted transport.

use carnaval_scrapers::config::{AutoThrottleSettings, HttpCacheSettings, Settings};
use carnaval_scrapers::error::FetchError;
use carnaval_scrapers::fetch::{Callback, FetchController, FetchOutcome, FetchRequest, ResponseCache};
use carnaval_scrapers::testing::ScriptedTransport;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

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
        ..Settings::default()
    }
}

fn request(url: &str) -> FetchRequest {
    FetchRequest::seed("test", Url::parse(url).unwrap(), Callback::Listing)
}

#[tokio::test]
async fn test_per_domain_cap_is_never_exceeded() {
    let mut transport = ScriptedTransport::new().with_latency(Duration::from_millis(40));
    for i in 0..8 {
        transport = transport.respond(&format!("https://a.test/p{i}"), 200, "ok");
    }
    let transport = Arc::new(transport);
    let controller = FetchController::new(
        transport.clone(),
        &Settings {
            concurrent_requests_per_domain: 2,
            ..settings()
        },
    );

    let outcomes = join_all((0..8).map(|i| controller.fetch(request(&format!("https://a.test/p{i}"))))).await;

    assert!(outcomes.iter().all(|o| matches!(o, FetchOutcome::Fetched(_))));
    assert!(transport.max_in_flight("a.test") <= 2);
    assert_eq!(transport.requests().len(), 8);
}

#[tokio::test]
async fn test_global_cap_spans_domains() {
    let mut transport = ScriptedTransport::new().with_latency(Duration::from_millis(40));
    let urls: Vec<String> = ["a.test", "b.test", "c.test"]
        .iter()
        .flat_map(|host| (0..3).map(move |i| format!("https://{host}/p{i}")))
        .collect();
    for url in &urls {
        transport = transport.respond(url, 200, "ok");
    }
    let transport = Arc::new(transport);
    let controller = FetchController::new(
        transport.clone(),
        &Settings {
            concurrent_requests: 1,
            ..settings()
        },
    );

    join_all(urls.iter().map(|u| controller.fetch(request(u)))).await;

    for host in ["a.test", "b.test", "c.test"] {
        assert_eq!(transport.max_in_flight(host), 1);
    }
}

#[tokio::test]
async fn test_disallowed_path_is_never_requested() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .respond("https://a.test/robots.txt", 200, "User-agent: *\nDisallow: /privado\n")
            .respond("https://a.test/privado/nota", 200, "secret")
            .respond("https://a.test/publico", 200, "ok"),
    );
    let controller = FetchController::new(
        transport.clone(),
        &Settings {
            robots_obey: true,
            ..settings()
        },
    );

    let blocked = controller.fetch(request("https://a.test/privado/nota")).await;
    let open = controller.fetch(request("https://a.test/publico")).await;

    assert!(matches!(blocked, FetchOutcome::Skipped { .. }));
    assert!(matches!(open, FetchOutcome::Fetched(_)));
    assert_eq!(transport.hits("https://a.test/privado/nota"), 0);
    assert_eq!(transport.hits("https://a.test/robots.txt"), 1);
}

#[tokio::test]
async fn test_crawl_delay_raises_domain_delay() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .respond("https://a.test/robots.txt", 200, "User-agent: *\nCrawl-delay: 3\n")
            .respond("https://a.test/", 200, "ok"),
    );
    let controller = FetchController::new(
        transport.clone(),
        &Settings {
            robots_obey: true,
            ..settings()
        },
    );

    controller.fetch(request("https://a.test/")).await;
    assert_eq!(controller.domain("a.test").delay(), Duration::from_secs(3));
}

#[tokio::test]
async fn test_unrepresentable_crawl_delay_is_ignored() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .respond("https://a.test/robots.txt", 200, "User-agent: *\nCrawl-delay: 1e20\n")
            .respond("https://a.test/", 200, "ok"),
    );
    let controller = FetchController::new(
        transport.clone(),
        &Settings {
            robots_obey: true,
            ..settings()
        },
    );

    let outcome = controller.fetch(request("https://a.test/")).await;

    assert!(matches!(outcome, FetchOutcome::Fetched(_)));
    assert_eq!(controller.domain("a.test").delay(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_domain_delay_does_not_hold_global_slot() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .respond("https://lento.test/robots.txt", 200, "User-agent: *\nCrawl-delay: 60\n")
            .respond("https://lento.test/p1", 200, "ok")
            .respond("https://lento.test/p2", 200, "ok")
            .respond("https://rapido.test/p1", 200, "ok"),
    );
    let controller = FetchController::new(
        transport.clone(),
        &Settings {
            concurrent_requests: 1,
            concurrent_requests_per_domain: 2,
            robots_obey: true,
            ..settings()
        },
    );
    controller.fetch(request("https://lento.test/p1")).await;

    // p2 now waits a minute for its turn; the other domain must not wait with it.
    let slow = controller.fetch(request("https://lento.test/p2"));
    let fast = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let started = tokio::time::Instant::now();
        let outcome = controller.fetch(request("https://rapido.test/p1")).await;
        (outcome, started.elapsed())
    };
    let (slow, (fast, fast_elapsed)) = tokio::join!(slow, fast);

    assert!(matches!(slow, FetchOutcome::Fetched(_)));
    assert!(matches!(fast, FetchOutcome::Fetched(_)));
    assert!(fast_elapsed < Duration::from_secs(60));
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .respond("https://a.test/lista", 503, "")
            .respond("https://a.test/lista", 200, "ok"),
    );
    let controller = FetchController::new(transport.clone(), &settings());

    let outcome = controller.fetch(request("https://a.test/lista")).await;

    let FetchOutcome::Fetched(page) = outcome else {
        panic!("expected a page, got {outcome:?}");
    };
    assert_eq!(page.body, "ok");
    assert_eq!(transport.hits("https://a.test/lista"), 2);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let transport = Arc::new(
        ScriptedTransport::new().fail("https://a.test/caida", FetchError::Connect("refused".into())),
    );
    let controller = FetchController::new(
        transport.clone(),
        &Settings {
            retry_times: 2,
            ..settings()
        },
    );

    let outcome = controller.fetch(request("https://a.test/caida")).await;

    let FetchOutcome::Failed(failure) = outcome else {
        panic!("expected a failure, got {outcome:?}");
    };
    assert_eq!(failure.attempts, 3);
    assert_eq!(transport.hits("https://a.test/caida"), 3);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let transport = Arc::new(ScriptedTransport::new());
    let controller = FetchController::new(transport.clone(), &settings());

    let outcome = controller.fetch(request("https://a.test/page/99")).await;

    let FetchOutcome::Failed(failure) = outcome else {
        panic!("expected a failure, got {outcome:?}");
    };
    assert_eq!(failure.reason, FetchError::Status(404));
    assert_eq!(failure.attempts, 1);
}

#[tokio::test]
async fn test_fresh_cache_entry_skips_network() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(ScriptedTransport::new().respond("https://a.test/", 200, "home"));
    let controller = FetchController::new(transport.clone(), &settings())
        .with_cache(Some(ResponseCache::new(dir.path(), Duration::from_secs(3600))));

    let first = controller.fetch(request("https://a.test/")).await;
    let second = controller.fetch(request("https://a.test/")).await;

    assert!(matches!(first, FetchOutcome::Fetched(ref p) if !p.from_cache));
    assert!(matches!(second, FetchOutcome::Fetched(ref p) if p.from_cache && p.body == "home"));
    assert_eq!(transport.hits("https://a.test/"), 1);
}
