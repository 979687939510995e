//! API configuration.

use std::net::SocketAddr;
use std::str::FromStr;

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    /// Read `ENVIRONMENT`; anything other than `production` is development.
    pub fn from_env() -> Self {
        std::env::var("ENVIRONMENT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for Environment {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s.trim().eq_ignore_ascii_case("production") {
            Self::Production
        } else {
            Self::Development
        })
    }
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,
    /// Upload rate limit, requests per second per client IP
    pub rate_limit_rps: u32,
    /// Upload rate limit burst
    pub rate_limit_burst: u32,
    /// Largest accepted request body, uploads included
    pub max_body_size: usize,
    pub environment: Environment,
    /// Expose Prometheus metrics at /metrics
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            rate_limit_burst: 20,
            max_body_size: 512 * 1024 * 1024, // 512MB
            environment: Environment::Development,
            metrics_enabled: true,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from `lookup`, falling back to defaults for unset or
    /// malformed values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            lookup(key).and_then(|v| v.trim().parse().ok())
        }
        let d = Self::default();

        Self {
            host: lookup("API_HOST").unwrap_or(d.host),
            port: parsed(&lookup, "API_PORT").unwrap_or(d.port),
            cors_origins: lookup("CORS_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or(d.cors_origins),
            rate_limit_rps: parsed(&lookup, "RATE_LIMIT_RPS").unwrap_or(d.rate_limit_rps),
            rate_limit_burst: parsed(&lookup, "RATE_LIMIT_BURST").unwrap_or(d.rate_limit_burst),
            max_body_size: parsed(&lookup, "MAX_BODY_SIZE").unwrap_or(d.max_body_size),
            environment: parsed(&lookup, "ENVIRONMENT").unwrap_or(d.environment),
            metrics_enabled: lookup("METRICS_ENABLED")
                .map(|v| matches!(v.trim(), "true" | "1"))
                .unwrap_or(d.metrics_enabled),
        }
    }

    /// Socket address to listen on.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> ApiConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = config_from(&[]);
        assert_eq!(config.port, 8000);
        assert_eq!(config.cors_origins, vec!["*"]);
        assert_eq!(config.max_body_size, 512 * 1024 * 1024);
        assert!(!config.is_production());
        assert!(config.metrics_enabled);
    }

    #[test]
    fn test_overrides_and_malformed_values() {
        let config = config_from(&[
            ("API_PORT", "9001"),
            ("RATE_LIMIT_RPS", "not-a-number"),
            ("CORS_ORIGINS", "https://a.example, https://b.example,"),
            ("ENVIRONMENT", "Production"),
            ("METRICS_ENABLED", "false"),
        ]);

        assert_eq!(config.port, 9001);
        assert_eq!(config.rate_limit_rps, 10);
        assert_eq!(
            config.cors_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert!(config.is_production());
        assert!(!config.metrics_enabled);
    }

    #[test]
    fn test_bind_addr() {
        let config = config_from(&[("API_HOST", "127.0.0.1"), ("API_PORT", "8080")]);
        assert_eq!(config.bind_addr().unwrap(), "127.0.0.1:8080".parse().unwrap());

        let bad = config_from(&[("API_HOST", "not a host")]);
        assert!(bad.bind_addr().is_err());
    }
}
