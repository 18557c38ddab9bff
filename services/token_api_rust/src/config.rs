//! Configuration for token_api_rust

use anyhow::{anyhow, Result};
use std::env;
use std::time::Duration;
use token_pulse_core::clients::{dexscreener, jupiter, RetryPolicy};
use token_pulse_core::refresh::{RefreshConfig, DEFAULT_WORKER_QUERIES};

#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,

    // Redis; `None` runs on the in-process tier only
    pub redis_url: Option<String>,
    pub publish_to_redis: bool,

    // Refresh
    pub refresh_interval_secs: u64,
    pub snapshot_ttl_secs: u64,
    pub search_ttl_secs: u64,
    pub token_mirror_ttl_secs: u64,
    pub worker_queries: Vec<String>,
    pub registry_query: String,
    pub broadcast_capacity: usize,

    // Upstreams
    pub chain_id: String,
    pub dexscreener_base_url: String,
    pub jupiter_search_base_url: String,
    pub jupiter_price_base_url: String,
    pub http_timeout_secs: u64,
    pub http_max_retries: u32,
    pub http_retry_base_delay_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup so tests need not touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let refresh_interval_secs = parse_u64(&lookup, "REFRESH_INTERVAL_SECS", 15)?;
        let snapshot_ttl_secs = parse_u64(&lookup, "SNAPSHOT_TTL_SECS", 30)?;
        let search_ttl_secs = parse_u64(&lookup, "SEARCH_TTL_SECS", 60)?;
        let token_mirror_ttl_secs = parse_u64(&lookup, "TOKEN_MIRROR_TTL_SECS", 60)?;
        let http_timeout_secs = parse_u64(&lookup, "HTTP_TIMEOUT_SECS", 10)?;
        let broadcast_capacity = parse_u64(&lookup, "BROADCAST_CAPACITY", 16)? as usize;

        // Validate timings
        if refresh_interval_secs == 0 {
            return Err(anyhow!("REFRESH_INTERVAL_SECS must be > 0"));
        }
        if snapshot_ttl_secs <= refresh_interval_secs {
            return Err(anyhow!("SNAPSHOT_TTL_SECS must be > REFRESH_INTERVAL_SECS"));
        }
        if search_ttl_secs == 0 || token_mirror_ttl_secs == 0 {
            return Err(anyhow!("SEARCH_TTL_SECS and TOKEN_MIRROR_TTL_SECS must be > 0"));
        }
        if http_timeout_secs == 0 {
            return Err(anyhow!("HTTP_TIMEOUT_SECS must be > 0"));
        }
        if broadcast_capacity == 0 {
            return Err(anyhow!("BROADCAST_CAPACITY must be > 0"));
        }

        let worker_queries = split_list(&var("WORKER_QUERIES", &DEFAULT_WORKER_QUERIES.join(",")));
        if worker_queries.is_empty() {
            return Err(anyhow!("WORKER_QUERIES must name at least one query"));
        }

        let redis_url = Some(var("REDIS_URL", "redis://127.0.0.1:6379"))
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        let publish_to_redis = parse_bool(&lookup, "PUBLISH_TO_REDIS", false)?;
        if publish_to_redis && redis_url.is_none() {
            return Err(anyhow!("PUBLISH_TO_REDIS requires REDIS_URL"));
        }

        Ok(Self {
            host: var("HOST", "0.0.0.0"),
            port: parse_u16(&lookup, "PORT", 3000)?,

            redis_url,
            publish_to_redis,

            refresh_interval_secs,
            snapshot_ttl_secs,
            search_ttl_secs,
            token_mirror_ttl_secs,
            worker_queries,
            registry_query: var("REGISTRY_QUERY", "SOL"),
            broadcast_capacity,

            chain_id: var("CHAIN_ID", dexscreener::DEFAULT_CHAIN_ID),
            dexscreener_base_url: var("DEXSCREENER_BASE_URL", dexscreener::DEFAULT_BASE_URL),
            jupiter_search_base_url: var(
                "JUPITER_SEARCH_BASE_URL",
                jupiter::DEFAULT_SEARCH_BASE_URL,
            ),
            jupiter_price_base_url: var("JUPITER_PRICE_BASE_URL", jupiter::DEFAULT_PRICE_BASE_URL),
            http_timeout_secs,
            http_max_retries: parse_u32(&lookup, "HTTP_MAX_RETRIES", 3)?,
            http_retry_base_delay_ms: parse_u64(&lookup, "HTTP_RETRY_BASE_DELAY_MS", 1000)?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn search_ttl(&self) -> Duration {
        Duration::from_secs(self.search_ttl_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.http_max_retries,
            base_delay: Duration::from_millis(self.http_retry_base_delay_ms),
        }
    }

    pub fn refresh(&self) -> RefreshConfig {
        RefreshConfig {
            interval: Duration::from_secs(self.refresh_interval_secs),
            snapshot_ttl: Duration::from_secs(self.snapshot_ttl_secs),
            token_ttl: Duration::from_secs(self.token_mirror_ttl_secs),
            worker_queries: self.worker_queries.clone(),
            registry_query: self.registry_query.clone(),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse variable as u64 with default fallback
fn parse_u64<F>(lookup: &F, var_name: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var_name) {
        Some(val) => val.trim().parse().map_err(|_| anyhow!("{} must be a valid u64", var_name)),
        None => Ok(default),
    }
}

/// Parse variable as u32 with default fallback
fn parse_u32<F>(lookup: &F, var_name: &str, default: u32) -> Result<u32>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var_name) {
        Some(val) => val.trim().parse().map_err(|_| anyhow!("{} must be a valid u32", var_name)),
        None => Ok(default),
    }
}

fn parse_u16<F>(lookup: &F, var_name: &str, default: u16) -> Result<u16>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var_name) {
        Some(val) => val.trim().parse().map_err(|_| anyhow!("{} must be a valid port", var_name)),
        None => Ok(default),
    }
}

fn parse_bool<F>(lookup: &F, var_name: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var_name) {
        Some(val) => val
            .trim()
            .to_lowercase()
            .parse()
            .map_err(|_| anyhow!("{} must be true or false", var_name)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_with(&[]).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
        assert_eq!(config.redis_url.as_deref(), Some("redis://127.0.0.1:6379"));
        assert!(!config.publish_to_redis);
        assert_eq!(config.worker_queries.len(), 7);
        assert_eq!(config.worker_queries[0], "SOL");
        assert_eq!(config.registry_query, "SOL");
        assert_eq!(config.chain_id, "solana");

        let refresh = config.refresh();
        assert_eq!(refresh.interval, Duration::from_secs(15));
        assert_eq!(refresh.snapshot_ttl, Duration::from_secs(30));
        assert_eq!(refresh.token_ttl, Duration::from_secs(60));

        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_overrides() {
        let config = config_with(&[
            ("PORT", "8080"),
            ("WORKER_QUERIES", " bonk , ,wif "),
            ("REDIS_URL", ""),
            ("HTTP_MAX_RETRIES", "0"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.worker_queries, vec!["bonk", "wif"]);
        assert_eq!(config.redis_url, None);
        assert_eq!(config.http_max_retries, 0);
    }

    #[test]
    fn test_snapshot_ttl_must_outlive_interval() {
        let err = config_with(&[("REFRESH_INTERVAL_SECS", "30"), ("SNAPSHOT_TTL_SECS", "30")])
            .unwrap_err();
        assert!(err.to_string().contains("SNAPSHOT_TTL_SECS"));

        assert!(config_with(&[("REFRESH_INTERVAL_SECS", "0")]).is_err());
    }

    #[test]
    fn test_invalid_values() {
        assert!(config_with(&[("PORT", "http")]).is_err());
        assert!(config_with(&[("PUBLISH_TO_REDIS", "maybe")]).is_err());
        assert!(config_with(&[("WORKER_QUERIES", ",,")]).is_err());
        assert!(config_with(&[("BROADCAST_CAPACITY", "0")]).is_err());
        assert!(config_with(&[("PUBLISH_TO_REDIS", "true"), ("REDIS_URL", " ")]).is_err());
    }
}
