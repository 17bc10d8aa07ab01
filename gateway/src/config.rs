//! Gateway configuration.
//!
//! Built once at startup and passed down. Changing any value requires a
//! restart.

use chrono::Duration;
use fxgate_fx::coinbase::COINBASE_API_URL;

/// Daily request thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per key on Monday to Friday.
    pub weekday_limit: u32,
    /// Requests allowed per key on Saturday and Sunday.
    pub weekend_limit: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            weekday_limit: 100,
            weekend_limit: 50,
        }
    }
}

/// Rate cache configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Seconds a fetched rate stays usable.
    pub expiry_seconds: u64,
    /// Let only one concurrent miss per pair reach the upstream.
    pub coalesce_fetches: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            expiry_seconds: 60,
            coalesce_fetches: true,
        }
    }
}

impl CacheConfig {
    /// Expiry as a duration, `None` if it does not fit.
    pub fn expiry(&self) -> Option<Duration> {
        i64::try_from(self.expiry_seconds)
            .ok()
            .and_then(Duration::try_seconds)
    }
}

/// Main gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen address.
    pub listen_addr: String,
    /// Listen port.
    pub listen_port: u16,
    /// Postgres URL; the in-memory store is used when unset.
    pub database_url: Option<String>,
    /// Upstream exchange-rates endpoint.
    pub upstream_url: String,
    /// Rate limit configuration.
    pub rate_limits: RateLimitConfig,
    /// Cache configuration.
    pub cache: CacheConfig,
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 8080,
            database_url: None,
            upstream_url: COINBASE_API_URL.to_string(),
            rate_limits: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("FXGATE_LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Some(port) = lookup("FXGATE_LISTEN_PORT") {
            config.listen_port = parse_var("FXGATE_LISTEN_PORT", &port)?;
        }

        if let Some(url) = lookup("DATABASE_URL") {
            config.database_url = Some(url).filter(|u| !u.trim().is_empty());
        }

        if let Some(url) = lookup("FXGATE_UPSTREAM_URL") {
            config.upstream_url = url;
        }

        if let Some(limit) = lookup("FXGATE_WEEKDAY_LIMIT") {
            config.rate_limits.weekday_limit = parse_var("FXGATE_WEEKDAY_LIMIT", &limit)?;
        }

        if let Some(limit) = lookup("FXGATE_WEEKEND_LIMIT") {
            config.rate_limits.weekend_limit = parse_var("FXGATE_WEEKEND_LIMIT", &limit)?;
        }

        if let Some(secs) = lookup("FXGATE_CACHE_EXPIRY_SECONDS") {
            config.cache.expiry_seconds = parse_var("FXGATE_CACHE_EXPIRY_SECONDS", &secs)?;
        }

        if let Some(flag) = lookup("FXGATE_COALESCE_FETCHES") {
            config.cache.coalesce_fetches = parse_bool("FXGATE_COALESCE_FETCHES", &flag)?;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_port == 0 {
            return Err("Listen port cannot be 0".to_string());
        }

        if !(self.upstream_url.starts_with("http://") || self.upstream_url.starts_with("https://")) {
            return Err(format!("Upstream URL must be http(s): {}", self.upstream_url));
        }

        if self.cache.expiry().is_none() {
            return Err(format!(
                "Cache expiry of {} seconds is out of range",
                self.cache.expiry_seconds
            ));
        }

        Ok(())
    }

    /// Socket address string to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen_addr, self.listen_port)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("{} has an invalid value: {:?}", name, value))
}

fn parse_bool(name: &str, value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(format!("{} has an invalid value: {:?}", name, value)),
    }
}
