//! Configuration builder

use crate::types::{Config, ObservabilityConfig, ProxyConfig};
use std::net::SocketAddr;
use std::time::Duration;
use themepark_core::{Error, Result};
use themepark_middleware::{RewriteBodyConfig, ThemeParkConfig};

/// Builder for constructing configuration programmatically
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    proxy: Option<ProxyConfig>,
    listen: Option<SocketAddr>,
    request_timeout: Option<Duration>,
    theme_park: Option<ThemeParkConfig>,
    rewrite_body: Option<RewriteBodyConfig>,
    observability: ObservabilityConfig,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the whole proxy section
    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Set the upstream URL, keeping other proxy defaults
    pub fn upstream(mut self, upstream: impl Into<String>) -> Self {
        let upstream = upstream.into();
        match self.proxy {
            Some(ref mut proxy) => proxy.upstream = upstream,
            None => self.proxy = Some(ProxyConfig::new(upstream)),
        }
        self
    }

    /// Set listen address
    pub fn listen(mut self, addr: SocketAddr) -> Self {
        self.listen = Some(addr);
        self
    }

    /// Set upstream request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Enable theme injection
    pub fn theme_park(mut self, theme_park: ThemeParkConfig) -> Self {
        self.theme_park = Some(theme_park);
        self
    }

    /// Enable generic body rewriting
    pub fn rewrite_body(mut self, rewrite_body: RewriteBodyConfig) -> Self {
        self.rewrite_body = Some(rewrite_body);
        self
    }

    /// Set observability configuration
    pub fn observability(mut self, observability: ObservabilityConfig) -> Self {
        self.observability = observability;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        let mut proxy = self
            .proxy
            .ok_or_else(|| Error::Config("proxy upstream is required".to_string()))?;

        if let Some(listen) = self.listen {
            proxy.listen = listen;
        }
        if let Some(timeout) = self.request_timeout {
            proxy.request_timeout = timeout;
        }

        let config = Config {
            proxy,
            theme_park: self.theme_park,
            rewrite_body: self.rewrite_body,
            observability: self.observability,
        };
        crate::validator::validate_config(&config)?;

        Ok(config)
    }
}
