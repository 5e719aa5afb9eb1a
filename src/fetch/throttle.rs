//! Per-domain pacing and auto-throttle.
//!
//! Each domain gets a [`DomainThrottle`]: a semaphore capping in-flight
//! requests and a delay between request starts. With auto-throttle on, the
//! delay follows observed latency:
//!
//! ```text
//! target    = latency / target_concurrency
//! new_delay = clamp((delay + target) / 2, floor, ceiling)
//! ```
//!
//! A failed or non-2xx response may raise the delay but never lowers it.

use crate::config::{Settings, delay_from_secs};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::debug;

/// Delay bounds shared by every domain in a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottlePolicy {
    pub floor: Duration,
    pub start: Duration,
    pub ceiling: Duration,
    pub target_concurrency: f64,
    pub adaptive: bool,
}

impl ThrottlePolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        let floor = settings.download_delay();
        let at = &settings.autothrottle;
        if at.enabled {
            let start = delay_from_secs(at.start_delay_secs).max(floor);
            Self {
                floor,
                start,
                ceiling: delay_from_secs(at.max_delay_secs).max(start),
                target_concurrency: at.target_concurrency,
                adaptive: true,
            }
        } else {
            Self::fixed(floor)
        }
    }

    /// A constant delay with no adaptation.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            floor: delay,
            start: delay,
            ceiling: delay,
            target_concurrency: 1.0,
            adaptive: false,
        }
    }

    /// The next delay after a request that took `latency`.
    pub fn adjust(&self, current: Duration, latency: Duration, success: bool, floor: Duration) -> Duration {
        if !self.adaptive {
            return current;
        }
        let ceiling = self.ceiling.max(floor);
        let target = Duration::try_from_secs_f64(latency.as_secs_f64() / self.target_concurrency)
            .unwrap_or(ceiling);
        let proposed = current.saturating_add(target) / 2;
        let proposed = proposed.clamp(floor, ceiling);
        if !success && proposed < current {
            current
        } else {
            proposed
        }
    }
}

#[derive(Debug)]
struct DomainState {
    delay: Duration,
    floor: Duration,
    next_start: Option<Instant>,
}

/// Pacing state for one domain.
#[derive(Debug)]
pub struct DomainThrottle {
    domain: String,
    policy: ThrottlePolicy,
    slots: Arc<Semaphore>,
    state: Mutex<DomainState>,
}

impl DomainThrottle {
    pub fn new(domain: impl Into<String>, policy: ThrottlePolicy, max_in_flight: usize) -> Self {
        Self {
            domain: domain.into(),
            policy,
            slots: Arc::new(Semaphore::new(max_in_flight.max(1))),
            state: Mutex::new(DomainState {
                delay: policy.start,
                floor: policy.floor,
                next_start: None,
            }),
        }
    }

    pub fn slots(&self) -> &Arc<Semaphore> {
        &self.slots
    }

    fn state(&self) -> std::sync::MutexGuard<'_, DomainState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn delay(&self) -> Duration {
        self.state().delay
    }

    /// Reserve the next start slot and sleep until it arrives. Callers are
    /// served in the order they reserve.
    pub async fn wait_turn(&self) {
        let start_at = {
            let mut state = self.state();
            let now = Instant::now();
            let at = state.next_start.map_or(now, |next| next.max(now));
            state.next_start = Some(at.checked_add(state.delay).unwrap_or(at));
            at
        };
        tokio::time::sleep_until(start_at).await;
    }

    /// Feed one request's latency into the delay.
    pub fn record(&self, latency: Duration, success: bool) {
        let mut state = self.state();
        let before = state.delay;
        state.delay = self.policy.adjust(before, latency, success, state.floor);
        if state.delay != before {
            debug!(
                domain = %self.domain,
                latency_ms = latency.as_millis() as u64,
                old_delay_ms = before.as_millis() as u64,
                new_delay_ms = state.delay.as_millis() as u64,
                "Adjusted domain delay"
            );
        }
    }

    /// Raise the delay floor, e.g. from a robots.txt `Crawl-delay`.
    pub fn raise_floor(&self, floor: Duration) {
        let mut state = self.state();
        if floor > state.floor {
            state.floor = floor;
            state.delay = state.delay.max(floor);
        }
    }
}
