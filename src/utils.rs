//! Small helpers for output paths, logging and file system checks.

use chrono::{DateTime, Utc};
use std::fs as stdfs;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

/// Path of the JSON-lines file for one run of `source`:
/// `{dir}/{source}_{YYYY-MM-DDTHH-MM-SS}.jsonl`, stamped in UTC.
///
/// # Examples
///
/// ```ignore
/// // output/elheraldo_2025-02-28T12-00-00.jsonl
/// let path = run_file_path("output", "elheraldo", started_at);
/// ```
pub fn run_file_path(dir: impl AsRef<Path>, source: &str, started: DateTime<Utc>) -> PathBuf {
    dir.as_ref()
        .join(format!("{}_{}.jsonl", source, started.format("%Y-%m-%dT%H-%M-%S")))
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes, on a character boundary, with
/// `"…(+N bytes)"` appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(+{} bytes)", &s[..end], s.len() - end)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
pub async fn ensure_writable_dir(path: impl AsRef<Path>) -> std::io::Result<()> {
    let path = path.as_ref();
    fs::create_dir_all(path).await?;
    // Sync write through std fs; simpler error surface.
    let probe_path = path.join("..__probe_write__");
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}
