//! Runtime configuration for the scrape pipeline.
//!
//! Defaults are compiled in; every knob can be overridden through
//! `RUSTPUBMED_*` environment variables. A malformed override is a
//! [`PubmedError::Config`] and is surfaced before any fetch begins —
//! this is the only fatal condition in the pipeline.

use crate::error::{PubmedError, Result};
use std::time::Duration;

/// Default PubMed base URL (listing and detail origin)
pub const DEFAULT_BASE_URL: &str = "https://pubmed.ncbi.nlm.nih.gov";

/// Default concurrency cap for detail fetches
const DEFAULT_CONCURRENCY: usize = 10;

/// Default enrichment rate limit: permits per interval
const DEFAULT_RATE_PERMITS: u32 = 20;

/// Default enrichment rate limit interval in seconds
const DEFAULT_RATE_INTERVAL_SECS: u64 = 60;

/// Default per-request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Base URL for the listing and detail origin
    pub base_url: String,
    /// Maximum detail fetch+extract tasks in flight at once
    pub concurrency: usize,
    /// Enrichment origin rate limit: admissions per interval
    pub rate_permits: u32,
    /// Enrichment origin rate limit interval
    pub rate_interval: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Whether to perform the optional enrichment fetch per record
    pub enrich: bool,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            rate_permits: DEFAULT_RATE_PERMITS,
            rate_interval: Duration::from_secs(DEFAULT_RATE_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            enrich: false,
        }
    }
}

impl ScrapeConfig {
    /// Build a config from defaults plus `RUSTPUBMED_*` environment overrides.
    ///
    /// Recognized variables: `RUSTPUBMED_BASE_URL`, `RUSTPUBMED_CONCURRENCY`,
    /// `RUSTPUBMED_RATE_PERMITS`, `RUSTPUBMED_RATE_INTERVAL_SECS`,
    /// `RUSTPUBMED_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("RUSTPUBMED_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(n) = parse_env("RUSTPUBMED_CONCURRENCY")? {
            config.concurrency = n;
        }
        if let Some(n) = parse_env("RUSTPUBMED_RATE_PERMITS")? {
            config.rate_permits = n;
        }
        if let Some(secs) = parse_env("RUSTPUBMED_RATE_INTERVAL_SECS")? {
            config.rate_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env("RUSTPUBMED_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the invariants every run relies on.
    pub fn validate(&self) -> Result<()> {
        if url::Url::parse(&self.base_url).is_err() {
            return Err(PubmedError::Config(format!(
                "base URL is not a valid URL: {:?}",
                self.base_url
            )));
        }
        if self.concurrency == 0 {
            return Err(PubmedError::Config(
                "concurrency cap must be at least 1".to_string(),
            ));
        }
        if self.rate_permits == 0 {
            return Err(PubmedError::Config(
                "rate limit permits must be at least 1".to_string(),
            ));
        }
        if self.rate_interval.is_zero() {
            return Err(PubmedError::Config(
                "rate limit interval must be non-zero".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(PubmedError::Config(
                "request timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse an optional environment variable, turning bad values into Config errors
fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| PubmedError::Config(format!("invalid value for {}: {:?}", name, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ScrapeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.rate_permits, 20);
    }

    #[test]
    fn test_malformed_base_url_rejected() {
        let config = ScrapeConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PubmedError::Config(_))));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = ScrapeConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PubmedError::Config(_))));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = ScrapeConfig {
            rate_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
