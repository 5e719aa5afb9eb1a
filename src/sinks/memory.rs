//! In-memory [`RemoteStore`].
//!
//! Tables are maps from the conflict column to the last row written, so it
//! has the same replace-on-conflict behaviour as the real store.

use crate::error::SinkError;
use crate::sinks::RemoteStore;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, BTreeMap<String, Value>>>,
    calls: AtomicUsize,
    reachable: bool,
    fail_urls: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            reachable: true,
            ..Self::default()
        }
    }

    /// A store whose probe fails.
    pub fn unreachable() -> Self {
        Self::default()
    }

    /// Reject every upsert whose conflict value is `url`.
    pub fn failing_on(mut self, url: &str) -> Self {
        self.fail_urls.insert(url.to_string());
        self
    }

    /// Number of upsert calls received, failed ones included.
    pub fn upsert_calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Rows currently stored in `table`, ordered by conflict value.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        let tables = self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn ping(&self) -> Result<(), SinkError> {
        if self.reachable {
            Ok(())
        } else {
            Err(SinkError::Unavailable("memory store marked unreachable".to_string()))
        }
    }

    async fn upsert(&self, table: &str, row: &Value, conflict_key: &str) -> Result<(), SinkError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let key = row
            .get(conflict_key)
            .and_then(Value::as_str)
            .ok_or_else(|| SinkError::Rejected {
                table: table.to_string(),
                status: 400,
                body: format!("row has no string '{conflict_key}'"),
            })?
            .to_string();

        if self.fail_urls.contains(&key) {
            return Err(SinkError::Rejected {
                table: table.to_string(),
                status: 500,
                body: "scripted failure".to_string(),
            });
        }

        let mut tables = self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        tables
            .entry(table.to_string())
            .or_default()
            .insert(key, row.clone());
        Ok(())
    }
}
