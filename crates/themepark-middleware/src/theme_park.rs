//! Theme-park stylesheet injection
//!
//! Builds the rewrite rule that inserts `<link>` tags for an app's theme
//! (plus optional add-ons) ahead of the closing `</head>` or `</body>` tag,
//! and the [`RewriteBody`] middleware that applies it together with the CSP
//! adjustments the stylesheets need.

use crate::apps;
use crate::body_rewrite::RewriteBody;
use crate::csp::CspRewriter;
use crate::logging::LogLevel;
use crate::monitoring::MonitoringConfig;
use crate::rewrite::{RewriteEngine, RewriteRule};
use crate::themes;
use serde::{Deserialize, Serialize};
use themepark_core::{Error, Result};
use url::Url;

/// Where theme-park serves its stylesheets
pub const DEFAULT_BASE_URL: &str = "https://theme-park.dev";

/// Anchor used for most apps
pub const HEAD_TARGET: &str = "</head>";
/// Anchor used for apps that rebuild their `<head>` client-side
pub const BODY_TARGET: &str = "</body>";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

/// Theme injection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeParkConfig {
    /// Application identifier (`sonarr`, `radarr`, ...)
    pub app: String,

    /// Theme name; empty or `base` selects `{app}-base`
    #[serde(default)]
    pub theme: String,

    /// Root of the stylesheet URLs
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Extra stylesheets layered over the theme
    #[serde(default)]
    pub addons: Vec<String>,

    /// Literal anchor overriding the per-app `</head>` / `</body>` choice
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Diagnostic verbosity
    #[serde(default)]
    pub log_level: LogLevel,

    /// Keep the upstream `Last-Modified` header
    #[serde(default)]
    pub last_modified: bool,

    /// Which responses are themed
    #[serde(default)]
    pub monitor: MonitoringConfig,
}

impl ThemeParkConfig {
    /// Theme `theme` for `app` with every other setting defaulted
    pub fn new(app: impl Into<String>, theme: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            theme: theme.into(),
            base_url: default_base_url(),
            addons: Vec::new(),
            target: None,
            log_level: LogLevel::default(),
            last_modified: false,
            monitor: MonitoringConfig::default(),
        }
    }

    /// Lower-cased application identifier
    pub fn app(&self) -> String {
        self.app.trim().to_ascii_lowercase()
    }

    /// Effective theme name
    pub fn theme_name(&self) -> String {
        let theme = self.theme.trim();
        if theme.is_empty() || theme.eq_ignore_ascii_case(themes::BASE_THEME) {
            themes::base_theme(&self.app())
        } else {
            theme.to_ascii_lowercase()
        }
    }

    /// Base URL without trailing slashes
    pub fn base_url(&self) -> &str {
        let base_url = self.base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            DEFAULT_BASE_URL
        } else {
            base_url
        }
    }

    /// URL of the theme stylesheet
    pub fn theme_url(&self) -> String {
        format!("{}/css/base/{}/{}.css", self.base_url(), self.app(), self.theme_name())
    }

    /// URL of an add-on stylesheet.
    ///
    /// Add-ons named after the app (`sonarr-4k-logo`) live in a directory of
    /// the same name; older short names (`4k-logo`) get the app prefix added.
    pub fn addon_url(&self, addon: &str) -> String {
        let app = self.app();
        let addon = addon.trim().to_ascii_lowercase();
        let addon = if addon.starts_with(&app) {
            addon
        } else {
            format!("{app}-{addon}")
        };
        format!("{}/css/addons/{app}/{addon}/{addon}.css", self.base_url())
    }

    /// All `<link>` tags, theme first, then add-ons in configured order
    pub fn links(&self) -> String {
        std::iter::once(self.theme_url())
            .chain(
                self.addons
                    .iter()
                    .filter(|addon| !addon.trim().is_empty())
                    .map(|addon| self.addon_url(addon)),
            )
            .map(|href| stylesheet_link(&href))
            .collect()
    }

    /// Anchor the links are inserted before
    pub fn target(&self) -> &str {
        match self.target.as_deref().filter(|target| !target.is_empty()) {
            Some(target) => target,
            None if apps::is_body_anchored(&self.app()) => BODY_TARGET,
            None => HEAD_TARGET,
        }
    }

    /// Rule inserting [`links`](Self::links) before the first anchor.
    ///
    /// The automatic anchors match case-insensitively; an explicit target is
    /// matched exactly as configured.
    pub fn rule(&self) -> Result<RewriteRule> {
        let anchor = regex::escape(self.target());
        let pattern = if self.target.as_deref().map_or(true, str::is_empty) {
            format!("(?i){anchor}")
        } else {
            anchor
        };

        let replacement = format!("{}$0", self.links().replace('$', "$$"));
        Ok(RewriteRule::new(&pattern, replacement)?.with_limit(1))
    }

    /// Problems that make the configuration unusable
    pub fn validate(&self) -> Result<()> {
        if self.app().is_empty() {
            return Err(Error::Config("themePark.app must not be empty".to_string()));
        }

        Url::parse(self.base_url()).map_err(|e| {
            Error::Config(format!("Invalid themePark.baseUrl '{}': {e}", self.base_url))
        })?;

        Ok(())
    }

    /// Things worth a warning: names theme-park does not publish
    pub fn warnings(&self) -> Vec<String> {
        let app = self.app();
        let mut warnings = Vec::new();

        if !apps::is_supported(&app) {
            warnings.push(format!("'{app}' is not a known theme-park app"));
        }

        let theme = self.theme_name();
        if !themes::is_supported(&app, &theme) {
            warnings.push(format!("'{theme}' is not a known theme-park theme"));
        }

        warnings
    }

    /// Build the injecting middleware
    pub fn build(&self) -> Result<RewriteBody> {
        self.validate()?;
        for warning in self.warnings() {
            tracing::warn!(app = %self.app(), "{warning}");
        }

        let middleware = RewriteBody::with_engine(
            RewriteEngine::new(vec![self.rule()?]),
            self.monitor.clone(),
        )
        .with_name(format!("theme-park:{}", self.app()))
        .with_csp(CspRewriter::for_base_url(self.base_url()))
        .with_last_modified(self.last_modified)
        .with_log_level(self.log_level);

        tracing::info!(
            app = %self.app(),
            theme = %self.theme_name(),
            addons = self.addons.len(),
            target = %self.target(),
            "Theme injection configured"
        );

        Ok(middleware)
    }
}

fn stylesheet_link(href: &str) -> String {
    format!(r#"<link rel="stylesheet" type="text/css" href="{href}">"#)
}
