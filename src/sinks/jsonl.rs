//! Append-only JSON-lines file, one per run.
//!
//! Every write is flushed and synced to disk before it returns, so a record
//! that made it through persist survives a crash or Ctrl-C.

use crate::error::SinkError;
use crate::models::Record;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, instrument};

#[derive(Debug)]
pub struct LocalFileSink {
    path: PathBuf,
    file: Mutex<File>,
    written: AtomicUsize,
}

impl LocalFileSink {
    /// Open (or create) the run file, creating parent directories as needed.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        info!("Opened local record file");
        Ok(Self {
            path,
            file: Mutex::new(file),
            written: AtomicUsize::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records written by this sink so far.
    pub fn written(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }

    /// Append one record as a single line. Absent optional fields are left
    /// out of the line.
    pub async fn write(&self, record: &Record) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(&without_nulls(record.to_row()?))?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        file.sync_data().await?;
        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Final sync; the file stays valid even if this is never called.
    pub async fn finish(&self) -> Result<(), SinkError> {
        let file = self.file.lock().await;
        file.sync_all().await?;
        info!(path = %self.path.display(), written = self.written(), "Closed local record file");
        Ok(())
    }
}

fn without_nulls(row: Value) -> Value {
    match row {
        Value::Object(map) => Value::Object(map.into_iter().filter(|(_, v)| !v.is_null()).collect()),
        other => other,
    }
}
