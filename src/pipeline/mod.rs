//! The record pipeline: an ordered chain of stages applied to every record.
//!
//! Each stage takes a record plus the run's shared state and either passes
//! a (possibly modified) record on or drops it with a reason. A drop ends the
//! chain for that record. The default order is:
//!
//! 1. [`normalize`]: whitespace cleanup and `scraped_at`
//! 2. [`dedup`]: one record per URL per run
//! 3. [`persist`]: local JSON-lines file, then the remote store
//!
//! Only a local sink failure comes back as an `Err`; it aborts the run.

pub mod dedup;
pub mod normalize;
pub mod persist;

pub use dedup::{DedupLedger, DedupScope, DeduplicateStage, Fingerprint};
pub use normalize::NormalizeStage;
pub use persist::PersistStage;

use crate::error::RunError;
use crate::models::Record;
use crate::sinks::{LocalFileSink, RemoteSink};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// What a stage decided about one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Pass(Record),
    Drop { stage: &'static str, reason: String },
}

/// Mutable state shared by every stage for the length of one run.
#[derive(Debug)]
pub struct RunState {
    pub ledger: DedupLedger,
    pub started_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(scope: DedupScope) -> Self {
        Self {
            ledger: DedupLedger::new(scope),
            started_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(&self, record: Record, state: &RunState) -> Result<Verdict, RunError>;
}

/// Stage identifiers accepted in the `pipeline` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Normalize,
    Deduplicate,
    Persist,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageKind::Normalize => "normalize",
            StageKind::Deduplicate => "deduplicate",
            StageKind::Persist => "persist",
        })
    }
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// Build the configured chain, in configured order.
    pub fn from_kinds(kinds: &[StageKind], local: Arc<LocalFileSink>, remote: Arc<RemoteSink>) -> Self {
        let stages = kinds
            .iter()
            .map(|kind| -> Box<dyn Stage> {
                match kind {
                    StageKind::Normalize => Box::new(NormalizeStage),
                    StageKind::Deduplicate => Box::new(DeduplicateStage),
                    StageKind::Persist => Box::new(PersistStage::new(Arc::clone(&local), Arc::clone(&remote))),
                }
            })
            .collect();
        Self::new(stages)
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run one record through every stage until it is dropped or survives.
    pub async fn process(&self, mut record: Record, state: &RunState) -> Result<Verdict, RunError> {
        let url = record.url().to_string();
        for stage in &self.stages {
            match stage.process(record, state).await? {
                Verdict::Pass(next) => record = next,
                Verdict::Drop { stage, reason } => {
                    info!(%url, stage, %reason, "Dropped record");
                    return Ok(Verdict::Drop { stage, reason });
                }
            }
        }
        Ok(Verdict::Pass(record))
    }
}
