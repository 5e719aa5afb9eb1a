//! On-disk response cache.
//!
//! Each successful response is stored as one JSON file named after the
//! SHA-256 of its request URL. Entries older than the freshness window are
//! ignored and overwritten by the next successful fetch.

use crate::fetch::transport::RawResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, instrument};
use url::Url;

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    request_url: String,
    final_url: String,
    status: u16,
    fetched_at: DateTime<Utc>,
    body: String,
}

#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
    freshness: Duration,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>, freshness: Duration) -> Self {
        Self {
            dir: dir.into(),
            freshness,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, url: &Url) -> PathBuf {
        let digest = Sha256::digest(url.as_str().as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }

    /// A fresh cached response for `url`, if there is one.
    pub async fn get(&self, url: &Url) -> Option<RawResponse> {
        self.get_at(url, Utc::now()).await
    }

    #[instrument(level = "debug", skip_all, fields(%url))]
    pub async fn get_at(&self, url: &Url, now: DateTime<Utc>) -> Option<RawResponse> {
        let raw = fs::read_to_string(self.path_for(url)).await.ok()?;
        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "Ignoring unreadable cache entry");
                return None;
            }
        };
        if entry.request_url != url.as_str() {
            return None;
        }
        let age = now.signed_duration_since(entry.fetched_at).to_std().ok()?;
        if age >= self.freshness {
            debug!(age_secs = age.as_secs(), "Cache entry is stale");
            return None;
        }
        let final_url = Url::parse(&entry.final_url).ok()?;
        Some(RawResponse {
            url: final_url,
            status: entry.status,
            body: entry.body,
        })
    }

    pub async fn put(&self, url: &Url, response: &RawResponse) -> std::io::Result<()> {
        self.put_at(url, response, Utc::now()).await
    }

    /// Store a response. Written to a temporary file first so a crash never
    /// leaves a truncated entry behind.
    pub async fn put_at(
        &self,
        url: &Url,
        response: &RawResponse,
        fetched_at: DateTime<Utc>,
    ) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let entry = CacheEntry {
            request_url: url.to_string(),
            final_url: response.url.to_string(),
            status: response.status,
            fetched_at,
            body: response.body.clone(),
        };
        let json = serde_json::to_vec(&entry)?;
        let path = self.path_for(url);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(url: &Url) -> RawResponse {
        RawResponse {
            url: url.clone(),
            status: 200,
            body: "<html><h1>Carnaval</h1></html>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_fresh_entry_is_served() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path(), Duration::from_secs(3600));
        let url = Url::parse("https://www.elheraldo.co/tags/carnaval").unwrap();

        cache.put(&url, &response(&url)).await.unwrap();
        let hit = cache.get(&url).await.unwrap();

        assert_eq!(hit.status, 200);
        assert!(hit.body.contains("Carnaval"));
    }

    #[tokio::test]
    async fn test_stale_entry_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path(), Duration::from_secs(3600));
        let url = Url::parse("https://www.elheraldo.co/tags/carnaval").unwrap();
        let fetched = Utc::now() - chrono::Duration::hours(2);

        cache.put_at(&url, &response(&url), fetched).await.unwrap();

        assert!(cache.get(&url).await.is_none());
        let earlier = fetched + chrono::Duration::minutes(30);
        assert!(cache.get_at(&url, earlier).await.is_some());
    }

    #[tokio::test]
    async fn test_miss_on_unknown_url() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path(), Duration::from_secs(3600));
        let url = Url::parse("https://www.eluniversal.com.co/nada").unwrap();
        assert!(cache.get(&url).await.is_none());
    }
}
