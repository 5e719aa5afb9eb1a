//! Crawl settings loaded once at start-up.
//!
//! Settings come from an optional `config.yaml`; any field left out takes the
//! default shown on [`Settings::default`]. Remote store credentials are not
//! part of the file and arrive through the CLI or environment instead.

use crate::error::ConfigError;
use crate::pipeline::{DedupScope, StageKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};

pub const DEFAULT_USER_AGENT: &str =
    "CarnavalDeBarranquilla Bot (+https://github.com/edgarmonza/carnaval-de-barranquilla)";

/// Upper bound for any configured or advertised delay, in seconds.
pub const MAX_DELAY_SECS: f64 = 3600.0;

/// Smallest accepted `autothrottle.target_concurrency`.
pub const MIN_TARGET_CONCURRENCY: f64 = 0.01;

/// Seconds to a [`Duration`] clamped to `0..=MAX_DELAY_SECS`. NaN maps to zero.
pub fn delay_from_secs(secs: f64) -> Duration {
    if secs.is_nan() {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs.clamp(0.0, MAX_DELAY_SECS)).unwrap_or(Duration::ZERO)
}

fn is_valid_delay(secs: f64) -> bool {
    (0.0..=MAX_DELAY_SECS).contains(&secs)
}

/// Settings governing one crawl run. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub user_agent: String,
    /// Requests in flight across all domains.
    pub concurrent_requests: usize,
    /// Requests in flight against a single domain.
    pub concurrent_requests_per_domain: usize,
    /// Floor for the per-domain delay between requests, in seconds.
    pub download_delay_secs: f64,
    pub autothrottle: AutoThrottleSettings,
    /// Retries after the first attempt for transient failures.
    pub retry_times: u32,
    pub request_timeout_secs: u64,
    pub robots_obey: bool,
    pub http_cache: HttpCacheSettings,
    pub pipeline: Vec<StageKind>,
    pub dedup_scope: DedupScope,
    pub output_dir: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoThrottleSettings {
    pub enabled: bool,
    pub start_delay_secs: f64,
    pub max_delay_secs: f64,
    /// Average number of parallel requests each origin should see.
    pub target_concurrency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpCacheSettings {
    pub enabled: bool,
    pub dir: String,
    pub expiration_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            concurrent_requests: 8,
            concurrent_requests_per_domain: 4,
            download_delay_secs: 1.5,
            autothrottle: AutoThrottleSettings::default(),
            retry_times: 2,
            request_timeout_secs: 30,
            robots_obey: true,
            http_cache: HttpCacheSettings::default(),
            pipeline: vec![StageKind::Normalize, StageKind::Deduplicate, StageKind::Persist],
            dedup_scope: DedupScope::Url,
            output_dir: "output".to_string(),
        }
    }
}

impl Default for AutoThrottleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            start_delay_secs: 2.0,
            max_delay_secs: 10.0,
            target_concurrency: 2.0,
        }
    }
}

impl Default for HttpCacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: ".http_cache".to_string(),
            expiration_secs: 86_400,
        }
    }
}

impl Settings {
    /// Load settings from a YAML file, or the defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let settings = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_string(),
                    source,
                })?;
                let parsed = Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
                    path: path.to_string(),
                    source,
                })?;
                info!(path, "Loaded settings file");
                parsed
            }
            None => Self::default(),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrent_requests == 0 {
            return Err(invalid("concurrent_requests", "must be at least 1"));
        }
        if self.concurrent_requests_per_domain == 0 {
            return Err(invalid("concurrent_requests_per_domain", "must be at least 1"));
        }
        if !is_valid_delay(self.download_delay_secs) {
            return Err(invalid("download_delay_secs", "must be between 0 and 3600"));
        }
        let at = &self.autothrottle;
        if at.enabled {
            if !(at.target_concurrency >= MIN_TARGET_CONCURRENCY && at.target_concurrency.is_finite()) {
                return Err(invalid("autothrottle.target_concurrency", "must be a finite number of at least 0.01"));
            }
            if !is_valid_delay(at.start_delay_secs) {
                return Err(invalid("autothrottle.start_delay_secs", "must be between 0 and 3600"));
            }
            if !is_valid_delay(at.max_delay_secs) {
                return Err(invalid("autothrottle.max_delay_secs", "must be between 0 and 3600"));
            }
            if at.max_delay_secs < at.start_delay_secs {
                return Err(invalid(
                    "autothrottle.max_delay_secs",
                    "must be at least autothrottle.start_delay_secs",
                ));
            }
        }
        if !self.pipeline.contains(&StageKind::Persist) {
            return Err(invalid("pipeline", "must include the persist stage"));
        }
        if self.pipeline.iter().filter(|s| **s == StageKind::Persist).count() > 1 {
            return Err(invalid("pipeline", "persist may only appear once"));
        }
        Ok(())
    }

    pub fn download_delay(&self) -> Duration {
        delay_from_secs(self.download_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_freshness(&self) -> Duration {
        Duration::from_secs(self.http_cache.expiration_secs)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

/// Remote store credentials. Both values are needed for the sink to be enabled.
#[derive(Clone, Default)]
pub struct RemoteCredentials {
    pub url: Option<String>,
    pub key: Option<String>,
}

impl RemoteCredentials {
    pub fn is_configured(&self) -> bool {
        matches!((&self.url, &self.key), (Some(u), Some(k)) if !u.is_empty() && !k.is_empty())
    }
}

impl std::fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCredentials")
            .field("url", &self.url)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_polite_crawl() {
        let s = Settings::default();
        assert_eq!(s.concurrent_requests, 8);
        assert_eq!(s.concurrent_requests_per_domain, 4);
        assert_eq!(s.download_delay(), Duration::from_millis(1500));
        assert_eq!(s.cache_freshness(), Duration::from_secs(24 * 3600));
        assert!(s.robots_obey);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
concurrent_requests_per_domain: 2
autothrottle:
  max_delay_secs: 20
pipeline: [deduplicate, normalize, persist]
"#;
        let s = Settings::from_yaml(yaml).unwrap();
        assert_eq!(s.concurrent_requests_per_domain, 2);
        assert_eq!(s.concurrent_requests, 8);
        assert_eq!(s.autothrottle.max_delay_secs, 20.0);
        assert_eq!(s.autothrottle.start_delay_secs, 2.0);
        assert_eq!(
            s.pipeline,
            vec![StageKind::Deduplicate, StageKind::Normalize, StageKind::Persist]
        );
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let s = Settings::from_yaml(include_str!("../config.example.yaml")).unwrap();
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn test_pipeline_without_persist_is_rejected() {
        let s = Settings {
            pipeline: vec![StageKind::Normalize],
            ..Settings::default()
        };
        assert!(matches!(
            s.validate(),
            Err(ConfigError::Invalid { field: "pipeline", .. })
        ));
    }

    #[test]
    fn test_zero_domain_cap_is_rejected() {
        let s = Settings {
            concurrent_requests_per_domain: 0,
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_unrepresentable_delays_are_rejected() {
        let huge = Settings {
            download_delay_secs: 1e20,
            ..Settings::default()
        };
        assert!(matches!(
            huge.validate(),
            Err(ConfigError::Invalid { field: "download_delay_secs", .. })
        ));
        assert_eq!(huge.download_delay(), Duration::from_secs(3600));

        let mut s = Settings::default();
        s.autothrottle.start_delay_secs = f64::NAN;
        assert!(matches!(
            s.validate(),
            Err(ConfigError::Invalid { field: "autothrottle.start_delay_secs", .. })
        ));

        let mut s = Settings::default();
        s.autothrottle.max_delay_secs = 1e30;
        assert!(matches!(
            s.validate(),
            Err(ConfigError::Invalid { field: "autothrottle.max_delay_secs", .. })
        ));
    }

    #[test]
    fn test_tiny_target_concurrency_is_rejected() {
        let mut s = Settings::default();
        s.autothrottle.target_concurrency = 1e-300;
        assert!(matches!(
            s.validate(),
            Err(ConfigError::Invalid { field: "autothrottle.target_concurrency", .. })
        ));
    }

    #[test]
    fn test_delay_from_secs_never_panics() {
        assert_eq!(delay_from_secs(-1.0), Duration::ZERO);
        assert_eq!(delay_from_secs(f64::NAN), Duration::ZERO);
        assert_eq!(delay_from_secs(f64::INFINITY), Duration::from_secs(3600));
        assert_eq!(delay_from_secs(0.25), Duration::from_millis(250));
    }

    #[test]
    fn test_credentials_require_both_values() {
        let creds = RemoteCredentials {
            url: Some("https://x.supabase.co".into()),
            key: None,
        };
        assert!(!creds.is_configured());
        let creds = RemoteCredentials {
            key: Some("secret".into()),
            ..creds
        };
        assert!(creds.is_configured());
        assert!(!format!("{creds:?}").contains("secret"));
    }
}
