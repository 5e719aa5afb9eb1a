//! # Carnaval Scrapers
//!
//! Crawl news and official sources about the Barranquilla Carnival into
//! typed records, clean and de-duplicate them, and store them in a per-run
//! JSON-lines file and, when configured, a Supabase project.
//!
//! ## Architecture
//!
//! 1. **Fetching** ([`fetch`]): cache, robots.txt, per-domain caps, delays
//!    with auto-throttle, retries
//! 2. **Extraction** ([`scrapers`]): one synchronous extractor per source
//! 3. **Pipeline** ([`pipeline`]): normalize, deduplicate, persist
//! 4. **Sinks** ([`sinks`]): local run file, remote upserts
//!
//! [`crawler::Crawler`] drives one source through all four.

pub mod config;
pub mod crawler;
pub mod error;
pub mod fetch;
pub mod models;
pub mod pipeline;
pub mod scrapers;
pub mod sinks;
pub mod testing;
pub mod utils;

pub use config::{RemoteCredentials, Settings};
pub use crawler::{CrawlStats, Crawler};
pub use error::{ConfigError, FetchError, InvalidRecord, RunError, SinkError};
pub use models::{Article, Business, Event, Plan, Product, Record, RecordKind};
pub use scrapers::{Extractor, Registry};
