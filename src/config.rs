//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Security Configuration
//!
//! - `JWT_SECRET`: HMAC secret for bearer tokens (random per process when unset)
//! - `TOKEN_TTL_SECS` / `TOKEN_ISSUER`: Claims enforced on every token
//! - `CORS_ALLOWED_ORIGINS`: Comma-separated list of allowed origins (default: `*` for dev)
//!
//! # Rate Limiting
//!
//! - `RATE_LIMIT_MAX_REQUESTS`: Requests per client per window (default: 10, 0 = disabled)
//! - `RATE_LIMIT_WINDOW_SECS`: Window length (default: 60, 0 = counts never reset)
//! - `RATE_LIMIT_KEY`: `ip` (default) or `peer_addr`
//! - `TRUSTED_PROXIES`: CIDR ranges whose forwarded headers are honored

use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;

use crate::error::{AppError, AppResult};

/// Default upstream catalog search endpoint.
pub const DEFAULT_UPSTREAM_SEARCH_URL: &str = "https://openlibrary.org/search.json";

/// Shortest accepted `JWT_SECRET`, in bytes.
pub const MIN_JWT_SECRET_LEN: usize = 16;

/// What the rate limiter counts requests against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitKey {
    /// Peer IP address, ignoring the source port.
    #[default]
    Ip,
    /// Raw peer socket address (`ip:port`). A client reconnecting from a new
    /// port gets a fresh counter.
    PeerAddr,
}

impl FromStr for RateLimitKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ip" => Ok(Self::Ip),
            "peer_addr" | "peer" => Ok(Self::PeerAddr),
            other => Err(format!("unknown key '{other}', expected 'ip' or 'peer_addr'")),
        }
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip => f.write_str("ip"),
            Self::PeerAddr => f.write_str("peer_addr"),
        }
    }
}

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 8080)
    pub port: u16,

    /// Expose `/search` without authentication (default: true).
    /// `/api/search` always requires a bearer token.
    pub public_search: bool,

    // =========================================================================
    // Upstream Catalog Configuration
    // =========================================================================
    /// Catalog search endpoint; `?author=` is appended per request
    pub upstream_search_url: String,

    /// Upper bound for a single catalog call (default: 30 seconds).
    /// Clients may shorten it with `X-Request-Timeout`, never extend it.
    pub upstream_timeout: Duration,

    // =========================================================================
    // Token Configuration
    // =========================================================================
    /// HMAC secret for signing tokens. `None` generates a random secret at
    /// startup, so tokens do not survive a restart.
    pub jwt_secret: Option<String>,

    /// Lifetime of issued tokens (default: 1 hour)
    pub token_ttl: Duration,

    /// `iss` claim written on issue and required on verification
    pub token_issuer: String,

    /// Failed token verifications allowed per client per minute (default: 10)
    pub auth_failure_limit: u32,

    /// Burst capacity for failed verifications (default: 5)
    pub auth_failure_burst: u32,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Requests allowed per client per window (default: 10).
    /// Set to 0 to disable rate limiting.
    pub rate_limit_max_requests: u32,

    /// Fixed window length. `Duration::ZERO` means counts never reset.
    pub rate_limit_window: Duration,

    /// Which part of the connection identifies a client
    pub rate_limit_key: RateLimitKey,

    /// Trusted proxy CIDR ranges.
    /// `X-Forwarded-For` / `X-Real-IP` are only honored when the connecting
    /// peer falls inside one of these networks.
    ///
    /// Format: Comma-separated CIDR notation (e.g., "10.0.0.0/8,172.16.0.0/12")
    /// Default: Empty (forwarded headers are ignored)
    pub trusted_proxies: Vec<String>,

    // =========================================================================
    // Security Configuration
    // =========================================================================
    /// Comma-separated list of allowed CORS origins
    /// Use "*" to allow all origins (not recommended for production)
    pub cors_allowed_origins: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Emit logs as JSON lines instead of human-readable text
    pub log_json: bool,

    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any configuration is invalid
    /// (e.g., non-numeric PORT value, malformed upstream URL).
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 8080)?,
            public_search: Self::parse_env("PUBLIC_SEARCH", true)?,

            // Upstream
            upstream_search_url: env::var("UPSTREAM_SEARCH_URL")
                .unwrap_or_else(|_| DEFAULT_UPSTREAM_SEARCH_URL.to_string()),
            upstream_timeout: Duration::from_secs(Self::parse_env("UPSTREAM_TIMEOUT_SECS", 30)?),

            // Tokens
            jwt_secret: env::var("JWT_SECRET").ok().filter(|s| !s.is_empty()),
            token_ttl: Duration::from_secs(Self::parse_env("TOKEN_TTL_SECS", 3600)?),
            token_issuer: env::var("TOKEN_ISSUER").unwrap_or_else(|_| "book-search".to_string()),
            auth_failure_limit: Self::parse_env("AUTH_FAILURE_LIMIT_PER_MINUTE", 10)?,
            auth_failure_burst: Self::parse_env("AUTH_FAILURE_BURST", 5)?,

            // Rate limiting
            rate_limit_max_requests: Self::parse_env("RATE_LIMIT_MAX_REQUESTS", 10)?,
            rate_limit_window: Duration::from_secs(Self::parse_env("RATE_LIMIT_WINDOW_SECS", 60)?),
            rate_limit_key: Self::parse_env("RATE_LIMIT_KEY", RateLimitKey::Ip)?,
            trusted_proxies: Self::parse_list("TRUSTED_PROXIES", ""),

            // Security
            cors_allowed_origins: Self::parse_list("CORS_ALLOWED_ORIGINS", "*"),

            // Observability
            log_json: env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")),
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    fn validate(&self) -> AppResult<()> {
        let url = Url::parse(&self.upstream_search_url).map_err(|e| {
            AppError::ConfigError(format!(
                "UPSTREAM_SEARCH_URL ({}) is not a valid URL: {e}",
                self.upstream_search_url
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::ConfigError(format!(
                "UPSTREAM_SEARCH_URL must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.upstream_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "UPSTREAM_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        if self.token_ttl.is_zero() {
            return Err(AppError::ConfigError(
                "TOKEN_TTL_SECS must be greater than 0".to_string(),
            ));
        }

        if self.token_issuer.is_empty() {
            return Err(AppError::ConfigError(
                "TOKEN_ISSUER cannot be empty".to_string(),
            ));
        }

        if self.auth_failure_limit == 0 {
            return Err(AppError::ConfigError(
                "AUTH_FAILURE_LIMIT_PER_MINUTE must be greater than 0".to_string(),
            ));
        }

        if let Some(secret) = &self.jwt_secret
            && secret.len() < MIN_JWT_SECRET_LEN
        {
            return Err(AppError::ConfigError(format!(
                "JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} bytes"
            )));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if rate limiting is enabled.
    pub fn rate_limiting_enabled(&self) -> bool {
        self.rate_limit_max_requests > 0
    }

    /// Fixed window length, or `None` when counts never reset.
    pub fn rate_limit_window(&self) -> Option<Duration> {
        (!self.rate_limit_window.is_zero()).then_some(self.rate_limit_window)
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        (self.metrics_port > 0).then(|| SocketAddr::from(([0, 0, 0, 0], self.metrics_port)))
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse a comma-separated list, dropping blank entries.
    fn parse_list(name: &str, default: &str) -> Vec<String> {
        split_list(&env::var(name).unwrap_or_else(|_| default.to_string()))
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_search: true,
            upstream_search_url: DEFAULT_UPSTREAM_SEARCH_URL.to_string(),
            upstream_timeout: Duration::from_secs(30),
            jwt_secret: None,
            token_ttl: Duration::from_secs(3600),
            token_issuer: "book-search".to_string(),
            auth_failure_limit: 10,
            auth_failure_burst: 5,
            rate_limit_max_requests: 10,
            rate_limit_window: Duration::from_secs(60),
            rate_limit_key: RateLimitKey::Ip,
            trusted_proxies: vec![],
            cors_allowed_origins: vec!["*".to_string()],
            log_json: false,
            metrics_port: 9090,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.port, 8080);
        assert_eq!(config.rate_limit_max_requests, 10);
        assert_eq!(config.rate_limit_key, RateLimitKey::Ip);
        assert_eq!(config.upstream_search_url, DEFAULT_UPSTREAM_SEARCH_URL);
        assert!(config.jwt_secret.is_none());
        assert!(config.public_search);
    }

    #[test]
    fn test_server_addr_format() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 9000,
            ..Config::default()
        };

        assert_eq!(config.server_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn test_rate_limiting_enabled() {
        assert!(Config::default().rate_limiting_enabled());

        let config = Config {
            rate_limit_max_requests: 0,
            ..Config::default()
        };
        assert!(!config.rate_limiting_enabled());
    }

    #[test]
    fn test_zero_window_never_resets() {
        let config = Config {
            rate_limit_window: Duration::ZERO,
            ..Config::default()
        };
        assert_eq!(config.rate_limit_window(), None);
        assert_eq!(
            Config::default().rate_limit_window(),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_metrics_addr_disabled_on_zero() {
        let config = Config {
            metrics_port: 0,
            ..Config::default()
        };
        assert!(config.metrics_addr().is_none());
        assert_eq!(Config::default().metrics_addr().unwrap().port(), 9090);
    }

    #[test]
    fn test_rate_limit_key_parsing() {
        assert_eq!("ip".parse::<RateLimitKey>().unwrap(), RateLimitKey::Ip);
        assert_eq!(
            "PEER_ADDR".parse::<RateLimitKey>().unwrap(),
            RateLimitKey::PeerAddr
        );
        assert!("mac".parse::<RateLimitKey>().is_err());
    }

    #[test]
    fn test_split_list_drops_blanks() {
        assert_eq!(
            split_list(" 10.0.0.0/8, ,172.16.0.0/12,"),
            vec!["10.0.0.0/8".to_string(), "172.16.0.0/12".to_string()]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_upstream_url() {
        let config = Config {
            upstream_search_url: "not a url".to_string(),
            ..Config::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("UPSTREAM_SEARCH_URL"));

        let config = Config {
            upstream_search_url: "ftp://example.com/search".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_short_secret() {
        let config = Config {
            jwt_secret: Some("short".to_string()),
            ..Config::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("JWT_SECRET"));
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let config = Config {
            upstream_timeout: Duration::ZERO,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            token_ttl: Duration::ZERO,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }
}
