//! Configuration validation

use crate::Config;
use themepark_core::{Error, Result};
use themepark_middleware::{LogLevel, RewriteBody};
use url::Url;

/// Validate configuration
///
/// Unknown theme-park apps and themes are not errors: the tables only
/// mirror what theme-park published at the time, so they are logged.
pub fn validate_config(config: &Config) -> Result<()> {
    validate_proxy(config)?;
    validate_theme_park(config)?;
    validate_rewrite_body(config)?;
    validate_observability(config)?;

    for warning in warnings(config) {
        tracing::warn!("{warning}");
    }

    Ok(())
}

/// Non-fatal findings, for display by the caller
pub fn warnings(config: &Config) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Some(ref theme_park) = config.theme_park {
        warnings.extend(theme_park.warnings());
    }

    if config.proxy.request_timeout.as_secs() > 300 {
        warnings.push("proxy.requestTimeout is very high (>5 minutes)".to_string());
    }

    if let Some(ref rewrite_body) = config.rewrite_body {
        if rewrite_body.rewrites.is_empty() {
            warnings.push("rewriteBody has no rewrites".to_string());
        }
    }

    warnings
}

fn validate_proxy(config: &Config) -> Result<()> {
    let upstream = Url::parse(&config.proxy.upstream).map_err(|e| {
        Error::Config(format!(
            "proxy.upstream '{}' is not an absolute URL: {e}",
            config.proxy.upstream
        ))
    })?;

    if upstream.scheme() != "http" {
        return Err(Error::Config(format!(
            "proxy.upstream must use http, got '{}'",
            upstream.scheme()
        )));
    }

    if upstream.host_str().is_none() {
        return Err(Error::Config("proxy.upstream must have a host".to_string()));
    }

    if config.proxy.request_timeout.is_zero() {
        return Err(Error::Config("proxy.requestTimeout must be > 0".to_string()));
    }

    Ok(())
}

fn validate_theme_park(config: &Config) -> Result<()> {
    if let Some(ref theme_park) = config.theme_park {
        theme_park.validate()?;
        theme_park.rule()?;
    }

    Ok(())
}

fn validate_rewrite_body(config: &Config) -> Result<()> {
    if let Some(ref rewrite_body) = config.rewrite_body {
        RewriteBody::new(rewrite_body.clone())?;
    }

    Ok(())
}

fn validate_observability(config: &Config) -> Result<()> {
    let logging = &config.observability.logging;

    logging.level.parse::<LogLevel>().map_err(|e| {
        Error::Config(format!(
            "Invalid observability.logging.level '{}': {e}",
            logging.level
        ))
    })?;

    match logging.format.as_str() {
        "text" | "json" => Ok(()),
        other => Err(Error::Config(format!(
            "Invalid observability.logging.format '{other}' (must be text or json)"
        ))),
    }
}
