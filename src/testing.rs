//! Testing utilities: a scripted [`Transport`] and a canned extractor.
//!
//! Useful for exercising the fetch controller, the crawl loop and the
//! pipeline without touching the network.

use crate::error::FetchError;
use crate::fetch::{Callback, FetchRequest, Page, RawResponse, Transport};
use crate::models::{Article, Record};
use crate::scrapers::{Extraction, Extractor};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use url::Url;

type Scripted = Result<(u16, String), FetchError>;

/// A [`Transport`] that answers from a script.
///
/// Each URL holds a queue of responses; the last one repeats once the queue
/// is down to it. Unscripted URLs answer 404 with an empty body.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: RwLock<HashMap<String, VecDeque<Scripted>>>,
    latency: Duration,
    calls: Arc<RwLock<Vec<Url>>>,
    in_flight: Arc<RwLock<HashMap<String, (usize, usize)>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time every request takes to complete.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue a response of `status` with `body` for `url`.
    pub fn respond(self, url: &str, status: u16, body: impl Into<String>) -> Self {
        self.push(url, Ok((status, body.into())));
        self
    }

    /// Queue a transport-level failure for `url`.
    pub fn fail(self, url: &str, error: FetchError) -> Self {
        self.push(url, Err(error));
        self
    }

    fn push(&self, url: &str, response: Scripted) {
        let key = normalize_key(url);
        self.scripts
            .write()
            .unwrap()
            .entry(key)
            .or_default()
            .push_back(response);
    }

    /// Every URL requested so far, in request order.
    pub fn requests(&self) -> Vec<Url> {
        self.calls.read().unwrap().clone()
    }

    /// How many times `url` was requested.
    pub fn hits(&self, url: &str) -> usize {
        let key = normalize_key(url);
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == key)
            .count()
    }

    /// Highest number of concurrent requests seen against `host`.
    pub fn max_in_flight(&self, host: &str) -> usize {
        self.in_flight
            .read()
            .unwrap()
            .get(host)
            .map(|(_, max)| *max)
            .unwrap_or(0)
    }

    fn next_response(&self, url: &Url) -> Scripted {
        let mut scripts = self.scripts.write().unwrap();
        match scripts.get_mut(url.as_str()) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Ok((404, String::new()))),
            Some(queue) => queue.front().cloned().unwrap_or(Ok((404, String::new()))),
            None => Ok((404, String::new())),
        }
    }

    fn enter(&self, host: &str) {
        let mut in_flight = self.in_flight.write().unwrap();
        let entry = in_flight.entry(host.to_string()).or_default();
        entry.0 += 1;
        entry.1 = entry.1.max(entry.0);
    }

    fn leave(&self, host: &str) {
        if let Some(entry) = self.in_flight.write().unwrap().get_mut(host) {
            entry.0 -= 1;
        }
    }
}

fn normalize_key(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &Url) -> Result<RawResponse, FetchError> {
        let host = url.host_str().unwrap_or_default().to_string();
        self.calls.write().unwrap().push(url.clone());
        self.enter(&host);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let response = self.next_response(url);
        self.leave(&host);

        response.map(|(status, body)| RawResponse {
            url: url.clone(),
            status,
            body,
        })
    }
}

/// An extractor driven by a fixed link graph instead of HTML.
///
/// Page bodies are read as lines: `link <url>` follows a link as an article
/// page, `article <title>` emits an article for the page URL, and
/// `record <url> <title>` emits an article for an arbitrary URL.
pub struct LinkGraphExtractor {
    name: &'static str,
    domains: &'static [&'static str],
    seeds: Vec<String>,
}

impl LinkGraphExtractor {
    pub fn new(name: &'static str, domains: &'static [&'static str], seeds: &[&str]) -> Self {
        Self {
            name,
            domains,
            seeds: seeds.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Extractor for LinkGraphExtractor {
    fn name(&self) -> &'static str {
        self.name
    }

    fn allowed_domains(&self) -> &'static [&'static str] {
        self.domains
    }

    fn seeds(&self) -> Vec<FetchRequest> {
        self.seeds
            .iter()
            .filter_map(|s| Url::parse(s).ok())
            .map(|url| FetchRequest::seed(self.name, url, Callback::Listing))
            .collect()
    }

    fn parse(&self, page: &Page) -> Extraction {
        let mut out = Extraction::new();
        for line in page.body.lines().map(str::trim) {
            if let Some(href) = line.strip_prefix("link ") {
                out.follow(page.follow(href, Callback::Article));
            } else if let Some(title) = line.strip_prefix("article ") {
                out.emit(article(page.url.as_str(), title, self.name));
            } else if let Some(rest) = line.strip_prefix("record ") {
                let (url, title) = rest.split_once(' ').unwrap_or((rest, ""));
                out.emit(article(url, title, self.name));
            }
        }
        out
    }
}

fn article(url: &str, title: &str, source: &str) -> Record {
    Article {
        title: title.to_string(),
        url: url.to_string(),
        source: source.to_string(),
        ..Default::default()
    }
    .into()
}
