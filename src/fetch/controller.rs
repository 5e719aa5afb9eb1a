//! The fetch controller: cache, robots policy, caps, pacing and retry.

use crate::config::Settings;
use crate::error::FetchError;
use crate::fetch::cache::ResponseCache;
use crate::fetch::robots::RobotsPolicy;
use crate::fetch::throttle::{DomainThrottle, ThrottlePolicy};
use crate::fetch::transport::{RawResponse, Transport};
use crate::fetch::{FetchFailure, FetchOutcome, FetchRequest, Page};
use rand::{Rng, rng};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

/// Upper bound of the random jitter added before each retry.
const RETRY_JITTER_MS: u64 = 250;

pub struct FetchController {
    transport: Arc<dyn Transport>,
    global: Semaphore,
    per_domain_cap: usize,
    policy: ThrottlePolicy,
    domains: Mutex<HashMap<String, Arc<DomainThrottle>>>,
    robots: Option<RobotsPolicy>,
    cache: Option<ResponseCache>,
    retry_times: u32,
}

impl FetchController {
    pub fn new(transport: Arc<dyn Transport>, settings: &Settings) -> Self {
        let robots = settings
            .robots_obey
            .then(|| RobotsPolicy::new(settings.user_agent.clone()));
        let cache = settings
            .http_cache
            .enabled
            .then(|| ResponseCache::new(&settings.http_cache.dir, settings.cache_freshness()));
        Self {
            transport,
            global: Semaphore::new(settings.concurrent_requests.max(1)),
            per_domain_cap: settings.concurrent_requests_per_domain.max(1),
            policy: ThrottlePolicy::from_settings(settings),
            domains: Mutex::new(HashMap::new()),
            robots,
            cache,
            retry_times: settings.retry_times,
        }
    }

    /// Replace the cache built from settings, or disable it with `None`.
    pub fn with_cache(mut self, cache: Option<ResponseCache>) -> Self {
        self.cache = cache;
        self
    }

    /// The pacing state for a domain, created on first use.
    pub fn domain(&self, domain: &str) -> Arc<DomainThrottle> {
        let mut domains = self
            .domains
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            domains
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(DomainThrottle::new(domain, self.policy, self.per_domain_cap))),
        )
    }

    /// Resolve one request to exactly one outcome.
    #[instrument(level = "info", skip_all, fields(url = %request.url, callback = %request.callback))]
    pub async fn fetch(&self, request: FetchRequest) -> FetchOutcome {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&request.url).await {
                debug!("Served from cache");
                return FetchOutcome::Fetched(page(request, hit, true));
            }
        }

        let Some(domain) = request.domain() else {
            return FetchOutcome::Failed(FetchFailure {
                reason: FetchError::Request("URL has no host".to_string()),
                request,
                attempts: 0,
            });
        };
        let throttle = self.domain(&domain);

        if let Some(robots) = &self.robots {
            let decision = robots.check(self.transport.as_ref(), &request.url).await;
            if let Some(delay) = decision.crawl_delay {
                throttle.raise_floor(delay);
            }
            if !decision.allowed {
                info!("Disallowed by robots.txt; skipping");
                return FetchOutcome::Skipped {
                    request,
                    reason: "disallowed by robots.txt".to_string(),
                };
            }
        }

        let max_attempts = self.retry_times + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.issue(&throttle, &request).await;

            let error = match result {
                Ok(response) if response.is_success() => {
                    if let Some(cache) = &self.cache {
                        if let Err(e) = cache.put(&request.url, &response).await {
                            warn!(error = %e, "Failed to write cache entry");
                        }
                    }
                    return FetchOutcome::Fetched(page(request, response, false));
                }
                Ok(response) => FetchError::Status(response.status),
                Err(e) => e,
            };

            if error.is_transient() && attempt < max_attempts {
                let jitter = Duration::from_millis(rng().random_range(0..=RETRY_JITTER_MS));
                warn!(attempt, max = max_attempts, error = %error, ?jitter, "Transient failure; retrying");
                tokio::time::sleep(jitter).await;
                continue;
            }

            warn!(attempt, error = %error, "Fetch failed");
            return FetchOutcome::Failed(FetchFailure {
                request,
                reason: error,
                attempts: attempt,
            });
        }
    }

    /// One network attempt under the domain cap, the domain delay and the
    /// global cap. Retries come through here too.
    async fn issue(&self, throttle: &DomainThrottle, request: &FetchRequest) -> Result<RawResponse, FetchError> {
        let closed = |_| FetchError::Request("fetch controller shut down".to_string());
        let _domain_slot = throttle.slots().acquire().await.map_err(closed)?;
        // No global slot is held while waiting out the domain delay.
        throttle.wait_turn().await;
        let _global_slot = self.global.acquire().await.map_err(closed)?;

        let started = Instant::now();
        let result = self.transport.get(&request.url).await;
        let latency = started.elapsed();

        let success = matches!(&result, Ok(r) if r.is_success());
        throttle.record(latency, success);
        debug!(
            latency_ms = latency.as_millis() as u64,
            status = result.as_ref().map(|r| r.status).ok(),
            "Request finished"
        );
        result
    }
}

fn page(request: FetchRequest, response: RawResponse, from_cache: bool) -> Page {
    Page {
        request,
        url: response.url,
        status: response.status,
        body: response.body,
        from_cache,
    }
}
