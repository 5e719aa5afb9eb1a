//! Source extractors for Carnival news and event sites.
//!
//! Each extractor turns one fetched [`Page`] into records and follow-up
//! requests. Extractors are synchronous and do no I/O: the crawl loop owns
//! fetching, and the pipeline owns cleaning, dedup and storage.
//!
//! # Supported Sources
//!
//! | Source | Module | Records | Notes |
//! |--------|--------|---------|-------|
//! | El Heraldo | [`elheraldo`] | articles | Carnival tag listing with pagination |
//! | El Universal | [`eluniversal`] | articles | Carnival tag listing with pagination |
//! | Carnaval de Barranquilla | [`carnaval_oficial`] | events, articles | Official site: programming and history pages |
//!
//! # Emission
//!
//! Records are handed out through [`Extraction::emit`], which refuses any
//! record without a `url` or headline. A record that fails there never
//! reaches the pipeline.

pub mod carnaval_oficial;
pub mod elheraldo;
pub mod eluniversal;

use crate::fetch::{Callback, FetchFailure, FetchRequest, Page};
use crate::models::Record;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Records and follow-up requests produced from one page.
#[derive(Debug, Default)]
pub struct Extraction {
    records: Vec<Record>,
    requests: Vec<FetchRequest>,
    rejected: usize,
}

impl Extraction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a record for the pipeline, dropping it if it lacks a `url` or
    /// headline.
    pub fn emit(&mut self, record: impl Into<Record>) {
        let record = record.into();
        match record.validate() {
            Ok(()) => self.records.push(record),
            Err(reason) => {
                debug!(%reason, kind = %record.kind(), "Dropping incomplete record");
                self.rejected += 1;
            }
        }
    }

    pub fn follow(&mut self, request: Option<FetchRequest>) {
        if let Some(request) = request {
            self.requests.push(request);
        }
    }

    pub fn extend(&mut self, other: Extraction) {
        self.records.extend(other.records);
        self.requests.extend(other.requests);
        self.rejected += other.rejected;
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn requests(&self) -> &[FetchRequest] {
        &self.requests
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn into_parts(self) -> (Vec<Record>, Vec<FetchRequest>) {
        (self.records, self.requests)
    }
}

/// Per-source extraction logic.
pub trait Extractor: Send + Sync {
    /// Registry key, also used in output file names.
    fn name(&self) -> &'static str;

    /// Hosts this source may crawl; derived requests elsewhere are dropped.
    fn allowed_domains(&self) -> &'static [&'static str];

    fn seeds(&self) -> Vec<FetchRequest>;

    /// Turn a fetched page into records and follow-up requests.
    fn parse(&self, page: &Page) -> Extraction;

    /// Called when one of this source's requests permanently failed.
    fn on_failure(&self, failure: &FetchFailure) {
        warn!(
            source = self.name(),
            url = %failure.request.url,
            callback = %failure.request.callback,
            attempts = failure.attempts,
            reason = %failure.reason,
            "Request failed"
        );
    }

    /// Whether `request` stays on this source's allowed hosts, subdomains included.
    fn is_allowed(&self, request: &FetchRequest) -> bool {
        let Some(host) = request.domain() else {
            return false;
        };
        self.allowed_domains()
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")))
    }
}

/// The fixed set of extractors, keyed by source name.
#[derive(Clone, Default)]
pub struct Registry {
    extractors: BTreeMap<&'static str, Arc<dyn Extractor>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every source this build knows how to crawl.
    pub fn builtin() -> Self {
        Self::new()
            .with(elheraldo::ElHeraldo)
            .with(eluniversal::ElUniversal)
            .with(carnaval_oficial::CarnavalOficial)
    }

    pub fn with(mut self, extractor: impl Extractor + 'static) -> Self {
        self.extractors.insert(extractor.name(), Arc::new(extractor));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Extractor>> {
        self.extractors.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.extractors.keys().copied()
    }
}

/// What to read from a matched element.
#[derive(Debug, Clone, Copy)]
pub enum Pick {
    /// Concatenated direct and nested text.
    Text,
    Attr(&'static str),
}

fn pick(element: ElementRef<'_>, what: Pick) -> Option<String> {
    let value = match what {
        Pick::Text => element.text().collect::<String>(),
        Pick::Attr(name) => element.value().attr(name)?.to_string(),
    };
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// The first non-empty value, trying each `(selector, pick)` in order.
pub fn first(doc: &Html, candidates: &[(&Selector, Pick)]) -> Option<String> {
    candidates
        .iter()
        .find_map(|(sel, what)| doc.select(sel).find_map(|el| pick(el, *what)))
}

/// Every non-empty value for one selector, in document order.
pub fn all(doc: &Html, selector: &Selector, what: Pick) -> Vec<String> {
    doc.select(selector).filter_map(|el| pick(el, what)).collect()
}

/// Non-empty paragraphs joined by a blank line.
pub fn paragraphs(doc: &Html, selector: &Selector) -> Option<String> {
    let parts = all(doc, selector, Pick::Text);
    (!parts.is_empty()).then(|| parts.join("\n\n"))
}

/// Every `href` under `selector`, as requests for `callback`.
pub fn follow_all(page: &Page, doc: &Html, selector: &Selector, callback: Callback) -> Vec<FetchRequest> {
    all(doc, selector, Pick::Attr("href"))
        .iter()
        .filter_map(|href| page.follow(href, callback))
        .collect()
}

/// A tag listing page: every story under `links` becomes an article request,
/// and the first `next` link continues the listing.
#[instrument(level = "info", skip_all, fields(source = label, url = %page.url))]
pub fn parse_tag_listing(page: &Page, links: &Selector, next: &Selector, label: &str) -> Extraction {
    let doc = Html::parse_document(&page.body);
    let mut out = Extraction::new();

    for request in follow_all(page, &doc, links, Callback::Article) {
        out.follow(Some(request));
    }
    let next_href = first(&doc, &[(next, Pick::Attr("href"))]);
    out.follow(next_href.and_then(|href| page.follow(&href, Callback::Listing)));

    info!(links = out.requests().len(), "Indexed {label} listing");
    out
}

/// Compile a selector known at build time.
pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css:?}: {e}"))
}

pub(crate) static OG_DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| selector("meta[property='og:description']"));
pub(crate) static OG_IMAGE: Lazy<Selector> = Lazy::new(|| selector("meta[property='og:image']"));
pub(crate) static META_AUTHOR: Lazy<Selector> = Lazy::new(|| selector("meta[name='author']"));
pub(crate) static META_PUBLISHED: Lazy<Selector> =
    Lazy::new(|| selector("meta[property='article:published_time']"));
pub(crate) static TIME_DATETIME: Lazy<Selector> = Lazy::new(|| selector("time[datetime]"));
pub(crate) static H1: Lazy<Selector> = Lazy::new(|| selector("h1"));
