use std::time::Duration;

use url::Url;
use zeroize::Zeroizing;

use crate::application::services::console_service::FanoutSettings;
use crate::infrastructure::searchad_client::SearchAdCredentials;

const DEFAULT_API_BASE: &str = "https://api.searchad.naver.com";
const DEFAULT_BILLING_BASE: &str = "https://api.naver.com";

/// Runtime configuration for the console service.
#[derive(Clone, Debug)]
pub struct ConsoleConfig {
    pub api_base: Url,
    pub billing_base: Url,
    /// Parallel upstream calls per fan-out chunk.
    pub stats_concurrency: usize,
    /// Pause between fan-out chunks, to stay under the platform's limits.
    pub inter_chunk_delay_ms: u64,
    /// 429 retries before the final attempt is returned as-is.
    pub upstream_max_retries: u32,
    /// TTL of the assembled performance-row cache.
    pub stats_cache_ttl_seconds: u64,
    /// Inbound API rate limit.
    pub requests_per_minute: u32,
}

impl ConsoleConfig {
    /// Defaults matching the platform's tolerated call pattern.
    pub fn default() -> ConsoleConfig {
        ConsoleConfig {
            api_base: Url::parse(DEFAULT_API_BASE).expect("default api base url"),
            billing_base: Url::parse(DEFAULT_BILLING_BASE).expect("default billing base url"),
            stats_concurrency: 10,
            inter_chunk_delay_ms: 300,
            upstream_max_retries: 4,
            stats_cache_ttl_seconds: 300,
            requests_per_minute: 100,
        }
    }

    /// Load configuration from environment variables, keeping defaults
    /// for anything unset or out of range.
    pub fn from_env() -> ConsoleConfig {
        let mut config = ConsoleConfig::default();

        if let Ok(base) = std::env::var("SEARCHAD_API_BASE") {
            match Url::parse(&base) {
                Ok(url) => config.api_base = url,
                Err(e) => {
                    tracing::warn!(
                        "Invalid SEARCHAD_API_BASE '{}': {}, using default: {}",
                        base,
                        e,
                        config.api_base
                    );
                }
            }
        }

        if let Ok(base) = std::env::var("BILLING_API_BASE") {
            match Url::parse(&base) {
                Ok(url) => config.billing_base = url,
                Err(e) => {
                    tracing::warn!(
                        "Invalid BILLING_API_BASE '{}': {}, using default: {}",
                        base,
                        e,
                        config.billing_base
                    );
                }
            }
        }

        if let Ok(concurrency) = std::env::var("STATS_CONCURRENCY") {
            if let Ok(value) = concurrency.parse::<usize>() {
                if (1..=50).contains(&value) {
                    config.stats_concurrency = value;
                } else {
                    tracing::warn!(
                        "STATS_CONCURRENCY {} out of range (1-50), using default: {}",
                        value,
                        config.stats_concurrency
                    );
                }
            }
        }

        if let Ok(delay) = std::env::var("INTER_CHUNK_DELAY_MS") {
            if let Ok(value) = delay.parse::<u64>() {
                if value <= 5_000 {
                    config.inter_chunk_delay_ms = value;
                }
            }
        }

        if let Ok(retries) = std::env::var("UPSTREAM_MAX_RETRIES") {
            if let Ok(value) = retries.parse::<u32>() {
                if value <= 10 {
                    config.upstream_max_retries = value;
                }
            }
        }

        if let Ok(ttl) = std::env::var("STATS_CACHE_TTL_SECONDS") {
            if let Ok(value) = ttl.parse::<u64>() {
                if (10..=3_600).contains(&value) {
                    config.stats_cache_ttl_seconds = value;
                }
            }
        }

        if let Ok(rpm) = std::env::var("REQUESTS_PER_MINUTE") {
            if let Ok(value) = rpm.parse::<u32>() {
                if (1..=10_000).contains(&value) {
                    config.requests_per_minute = value;
                }
            }
        }

        config
    }

    pub fn fanout(&self) -> FanoutSettings {
        FanoutSettings {
            concurrency: self.stats_concurrency,
            inter_chunk_delay: Duration::from_millis(self.inter_chunk_delay_ms),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.stats_cache_ttl_seconds)
    }
}

/// Read the upstream account credentials. Both variables are required;
/// the service refuses to start without them.
pub fn credentials_from_env() -> Result<SearchAdCredentials, String> {
    let api_key = std::env::var("SEARCHAD_API_KEY")
        .map_err(|_| "SEARCHAD_API_KEY environment variable is not set".to_string())?;
    let customer_id = std::env::var("SEARCHAD_CUSTOMER_ID")
        .map_err(|_| "SEARCHAD_CUSTOMER_ID environment variable is not set".to_string())?;

    if api_key.trim().is_empty() || customer_id.trim().is_empty() {
        return Err("SEARCHAD_API_KEY / SEARCHAD_CUSTOMER_ID must be non-empty".to_string());
    }

    Ok(SearchAdCredentials {
        api_key: Zeroizing::new(api_key),
        customer_id,
    })
}
