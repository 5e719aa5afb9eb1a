//! Typed errors for the crawl engine.
//!
//! Only [`RunError`] ever stops a run. Every other error is logged where it
//! happens and the crawl carries on with the next page or record.

use thiserror::Error;

/// Reasons an extracted record is refused before it reaches the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRecord {
    #[error("record has no url")]
    MissingUrl,

    #[error("record at {url} has an empty title")]
    EmptyTitle { url: String },
}

/// Errors produced while talking to a target site.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(String),
}

impl FetchError {
    /// Whether a retry has a reasonable chance of succeeding.
    ///
    /// 408, 429 and every 5xx are worth another attempt; any other status is
    /// final. Transport-level failures are always retried.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Connect(_) | FetchError::Request(_) => true,
            FetchError::Status(code) => *code == 408 || *code == 429 || (500..600).contains(code),
        }
    }
}

/// Errors from the local and remote sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("local sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("remote store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote store rejected write to {table}: HTTP {status}: {body}")]
    Rejected {
        table: String,
        status: u16,
        body: String,
    },

    #[error("remote store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("unknown source '{0}'")]
    UnknownSource(String),

    #[error("local sink failed, aborting run: {0}")]
    LocalSink(#[source] SinkError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
