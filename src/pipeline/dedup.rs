//! Run-scoped duplicate detection.
//!
//! Fingerprints are SHA-256 digests of the record's dedup key. The ledger
//! only grows and lives exactly as long as the run; a record seen in an
//! earlier run is let through again and simply re-upserted remotely.

use crate::error::RunError;
use crate::models::Record;
use crate::pipeline::{RunState, Stage, Verdict};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;
use tracing::debug;

/// What makes two records duplicates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupScope {
    /// Same URL, whatever the kind. An article and an event sharing a URL
    /// collide.
    #[default]
    Url,
    /// Same kind and same URL.
    KindAndUrl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(record: &Record, scope: DedupScope) -> Self {
        let mut hasher = Sha256::new();
        if scope == DedupScope::KindAndUrl {
            hasher.update(record.kind().as_str().as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(record.url().as_bytes());
        Self(hasher.finalize().into())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Append-only set of fingerprints seen during one run.
#[derive(Debug)]
pub struct DedupLedger {
    scope: DedupScope,
    seen: Mutex<HashSet<Fingerprint>>,
}

impl DedupLedger {
    pub fn new(scope: DedupScope) -> Self {
        Self {
            scope,
            seen: Mutex::new(HashSet::new()),
        }
    }

    pub fn scope(&self) -> DedupScope {
        self.scope
    }

    /// Record the fingerprint; `false` if it was already present.
    pub fn insert(&self, record: &Record) -> bool {
        let fingerprint = Fingerprint::of(record, self.scope);
        let mut seen = self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let fresh = seen.insert(fingerprint);
        if !fresh {
            debug!(%fingerprint, url = record.url(), "Fingerprint already in ledger");
        }
        fresh
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeduplicateStage;

#[async_trait]
impl Stage for DeduplicateStage {
    fn name(&self) -> &'static str {
        "deduplicate"
    }

    async fn process(&self, record: Record, state: &RunState) -> Result<Verdict, RunError> {
        if state.ledger.insert(&record) {
            Ok(Verdict::Pass(record))
        } else {
            Ok(Verdict::Drop {
                stage: self.name(),
                reason: "duplicate".to_string(),
            })
        }
    }
}
