//! Fetch control: everything between a [`FetchRequest`] and a [`Page`].
//!
//! The [`FetchController`] owns the crawl's politeness policy:
//!
//! | Concern | Module | Behaviour |
//! |---------|--------|-----------|
//! | Transport | [`transport`] | `reqwest` client with user agent and timeout |
//! | Robots policy | [`robots`] | one `robots.txt` per origin, disallowed paths skipped |
//! | Response cache | [`cache`] | on-disk, keyed by URL, served while fresh |
//! | Pacing | [`throttle`] | per-domain slots, delay and auto-throttle |
//! | Retry | [`controller`] | transient failures retried under the same caps |
//!
//! A request always resolves to exactly one [`FetchOutcome`]. Failures are
//! values, never errors that stop the crawl.

pub mod cache;
pub mod controller;
pub mod robots;
pub mod throttle;
pub mod transport;

pub use cache::ResponseCache;
pub use controller::FetchController;
pub use robots::{RobotsPolicy, RobotsTxt};
pub use throttle::{DomainThrottle, ThrottlePolicy};
pub use transport::{HttpTransport, RawResponse, Transport};

use crate::error::FetchError;
use std::fmt;
use url::Url;

/// Which piece of extractor logic should handle a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callback {
    /// A listing or tag page: yields detail links and the next page.
    Listing,
    /// A single news story.
    Article,
    /// A page listing several events.
    EventListing,
    /// A single event page.
    Event,
    /// An informational page stored as an article.
    Content,
}

impl fmt::Display for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Callback::Listing => "listing",
            Callback::Article => "article",
            Callback::EventListing => "event_listing",
            Callback::Event => "event",
            Callback::Content => "content",
        };
        f.write_str(name)
    }
}

/// Where a request came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOrigin {
    Seed,
    Derived { parent: Url },
}

/// A URL to fetch and the extractor logic that will receive the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: Url,
    /// Registry key of the extractor that owns this request.
    pub source: &'static str,
    pub callback: Callback,
    pub origin: RequestOrigin,
}

impl FetchRequest {
    pub fn seed(source: &'static str, url: Url, callback: Callback) -> Self {
        Self {
            url,
            source,
            callback,
            origin: RequestOrigin::Seed,
        }
    }

    pub fn is_seed(&self) -> bool {
        matches!(self.origin, RequestOrigin::Seed)
    }

    /// Lower-cased host, used as the throttling key.
    pub fn domain(&self) -> Option<String> {
        self.url.host_str().map(|h| h.to_ascii_lowercase())
    }
}

/// A successfully fetched page.
#[derive(Debug, Clone)]
pub struct Page {
    pub request: FetchRequest,
    /// Final URL after redirects.
    pub url: Url,
    pub status: u16,
    pub body: String,
    pub from_cache: bool,
}

impl Page {
    /// Build a request for a link found on this page, resolved against the
    /// page's final URL. Fragments are dropped; unparsable or non-HTTP links
    /// yield `None`.
    pub fn follow(&self, href: &str, callback: Callback) -> Option<FetchRequest> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            return None;
        }
        let mut url = self.url.join(href).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        url.set_fragment(None);
        Some(FetchRequest {
            url,
            source: self.request.source,
            callback,
            origin: RequestOrigin::Derived {
                parent: self.url.clone(),
            },
        })
    }
}

/// A request that could not be fetched, handed back to its extractor.
#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub request: FetchRequest,
    pub reason: FetchError,
    pub attempts: u32,
}

/// The single result every request resolves to.
#[derive(Debug)]
pub enum FetchOutcome {
    Fetched(Page),
    /// Never issued, e.g. disallowed by robots.txt.
    Skipped { request: FetchRequest, reason: String },
    Failed(FetchFailure),
}
