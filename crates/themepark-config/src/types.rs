//! Configuration types

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use themepark_core::Result;
use themepark_middleware::{MiddlewareBuilder, RewriteBodyConfig, ThemeParkConfig};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Reverse proxy host
    pub proxy: ProxyConfig,

    /// Theme injection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_park: Option<ThemeParkConfig>,

    /// Generic body rewriting, runs after theme injection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite_body: Option<RewriteBodyConfig>,

    /// Observability
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Middleware chain described by this configuration.
    ///
    /// Theme injection comes first so generic rules see the injected links.
    pub fn middleware(&self) -> Result<MiddlewareBuilder> {
        let mut builder = MiddlewareBuilder::new();

        if let Some(ref theme_park) = self.theme_park {
            builder = builder.with_theme_park(theme_park)?;
        }

        if let Some(ref rewrite_body) = self.rewrite_body {
            builder = builder.with_rewrite_body(rewrite_body.clone())?;
        }

        Ok(builder)
    }
}

/// Reverse proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Absolute `http://` URL of the proxied app
    pub upstream: String,

    /// Upstream request timeout
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Graceful shutdown timeout (wait for in-flight requests)
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Forward the client's `Host` header instead of the upstream authority
    #[serde(default = "default_true")]
    pub preserve_host: bool,
}

impl ProxyConfig {
    /// Proxy in front of `upstream` with default settings
    pub fn new(upstream: impl Into<String>) -> Self {
        Self {
            listen: default_listen(),
            upstream: upstream.into(),
            request_timeout: default_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
            preserve_host: true,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, text)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_defaults() {
        let proxy: ProxyConfig =
            serde_json::from_str(r#"{"upstream": "http://127.0.0.1:8989"}"#).unwrap();

        assert_eq!(proxy, ProxyConfig::new("http://127.0.0.1:8989"));
        assert_eq!(proxy.listen.to_string(), "127.0.0.1:8080");
        assert!(proxy.preserve_host);
    }

    #[test]
    fn test_humantime_timeout() {
        let proxy: ProxyConfig = serde_yaml::from_str(
            "upstream: http://sonarr:8989\nrequestTimeout: 1m 30s\npreserveHost: false\n",
        )
        .unwrap();

        assert_eq!(proxy.request_timeout, Duration::from_secs(90));
        assert!(!proxy.preserve_host);
    }

    #[test]
    fn test_middleware_chain_order() {
        let config = Config {
            proxy: ProxyConfig::new("http://127.0.0.1:8989"),
            theme_park: Some(ThemeParkConfig::new("sonarr", "dark")),
            rewrite_body: Some(RewriteBodyConfig::default()),
            observability: ObservabilityConfig::default(),
        };

        let chain = config.middleware().unwrap().build();
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_empty_chain() {
        let config = Config {
            proxy: ProxyConfig::new("http://127.0.0.1:8989"),
            theme_park: None,
            rewrite_body: None,
            observability: ObservabilityConfig::default(),
        };

        assert!(config.middleware().unwrap().is_empty());
    }
}
