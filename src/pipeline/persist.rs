//! Persistence stage: local file first, then the remote store.

use crate::error::RunError;
use crate::models::Record;
use crate::pipeline::{RunState, Stage, Verdict};
use crate::sinks::{LocalFileSink, RemoteSink};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::instrument;

pub struct PersistStage {
    local: Arc<LocalFileSink>,
    remote: Arc<RemoteSink>,
}

impl PersistStage {
    pub fn new(local: Arc<LocalFileSink>, remote: Arc<RemoteSink>) -> Self {
        Self { local, remote }
    }
}

#[async_trait]
impl Stage for PersistStage {
    fn name(&self) -> &'static str {
        "persist"
    }

    /// The local write must succeed; the remote write is best effort and the
    /// record passes through whatever it returns.
    #[instrument(level = "debug", skip_all, fields(url = record.url(), kind = %record.kind()))]
    async fn process(&self, record: Record, _state: &RunState) -> Result<Verdict, RunError> {
        self.local.write(&record).await.map_err(RunError::LocalSink)?;
        self.remote.write(&record).await;
        Ok(Verdict::Pass(record))
    }
}
