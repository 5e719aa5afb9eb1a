//! Remote table store.
//!
//! [`RemoteStore`] is the seam: one upsert call per record, keyed on a
//! conflict column. [`SupabaseStore`] implements it against a Supabase
//! (PostgREST) project. [`RemoteSink`] wraps an optional store, probes it
//! once at start-up, and turns every per-record failure into a log line.

use crate::error::SinkError;
use crate::models::Record;
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Column every table is upserted on.
pub const CONFLICT_KEY: &str = "url";

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Cheap reachability check, made once before the crawl starts.
    async fn ping(&self) -> Result<(), SinkError>;

    /// Insert `row` into `table`, fully replacing any row with the same
    /// `conflict_key` value.
    async fn upsert(&self, table: &str, row: &Value, conflict_key: &str) -> Result<(), SinkError>;
}

/// A Supabase project reached through its PostgREST endpoint.
pub struct SupabaseStore {
    client: reqwest::Client,
    base: String,
}

impl SupabaseStore {
    pub fn new(url: &str, key: &str, timeout: Duration) -> Result<Self, SinkError> {
        let mut headers = HeaderMap::new();
        let key_value = HeaderValue::from_str(key)
            .map_err(|_| SinkError::Unavailable("API key is not a valid header value".to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|_| SinkError::Unavailable("API key is not a valid header value".to_string()))?;
        headers.insert("apikey", key_value);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base: url.trim_end_matches('/').to_string(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base, table)
    }
}

#[async_trait]
impl RemoteStore for SupabaseStore {
    #[instrument(level = "info", skip_all, fields(base = %self.base))]
    async fn ping(&self) -> Result<(), SinkError> {
        let response = self.client.get(format!("{}/rest/v1/", self.base)).send().await?;
        let status = response.status();
        if status.is_success() {
            info!("Remote store reachable");
            Ok(())
        } else {
            Err(SinkError::Unavailable(format!("probe returned HTTP {}", status.as_u16())))
        }
    }

    async fn upsert(&self, table: &str, row: &Value, conflict_key: &str) -> Result<(), SinkError> {
        let response = self
            .client
            .post(self.table_url(table))
            .query(&[("on_conflict", conflict_key)])
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .body(serde_json::to_vec(row)?)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(SinkError::Rejected {
            table: table.to_string(),
            status: status.as_u16(),
            body: truncate_for_log(&body, 300),
        })
    }
}

/// Best-effort remote persistence for one run.
///
/// Disabled for the whole run when no store is configured or the start-up
/// probe fails; a disabled sink accepts every write and does nothing.
#[derive(Default)]
pub struct RemoteSink {
    store: Option<Arc<dyn RemoteStore>>,
    upserts: AtomicUsize,
    failures: AtomicUsize,
}

impl RemoteSink {
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Probe `store` once and keep it only if it answered.
    pub async fn connect(store: Option<Arc<dyn RemoteStore>>) -> Self {
        let Some(store) = store else {
            info!("Remote store not configured; records go to the local file only");
            return Self::disabled();
        };
        match store.ping().await {
            Ok(()) => Self {
                store: Some(store),
                ..Self::default()
            },
            Err(e) => {
                warn!(error = %e, "Remote store unreachable; disabled for this run");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    /// Upsert `record` into its kind's table. Failures are logged and counted.
    pub async fn write(&self, record: &Record) {
        let Some(store) = &self.store else {
            return;
        };
        let table = record.kind().table();
        let result = match record.to_row() {
            Ok(row) => store.upsert(table, &row, CONFLICT_KEY).await,
            Err(e) => Err(SinkError::from(e)),
        };
        match result {
            Ok(()) => {
                self.upserts.fetch_add(1, Ordering::Relaxed);
                debug!(table, url = record.url(), "Upserted record");
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(table, url = record.url(), stage = "persist", error = %e, "Remote upsert failed");
            }
        }
    }
}
