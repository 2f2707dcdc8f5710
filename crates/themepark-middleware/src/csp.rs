//! Content-Security-Policy rewriting
//!
//! Theme stylesheets are served from the theme host and pull images and fonts
//! from GitHub and Font Awesome. A policy that restricts `style-src`,
//! `img-src` or `font-src` would block them, so the matching directives get
//! the missing hosts appended. Other directives, their order and the
//! original separators are left as they are.

use http::header::CONTENT_SECURITY_POLICY;
use http::{HeaderMap, HeaderValue};
use url::Url;

/// Host serving theme-park stylesheets by default
pub const THEME_PARK_HOST: &str = "theme-park.dev";
/// Host serving images referenced by theme stylesheets
pub const RAW_GITHUB_HOST: &str = "raw.githubusercontent.com";
/// Host serving the icon fonts used by themes
pub const FONT_AWESOME_HOST: &str = "use.fontawesome.com";

/// Appends the theme hosts to the directives that need them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CspRewriter {
    theme_host: String,
}

impl Default for CspRewriter {
    fn default() -> Self {
        Self::new(THEME_PARK_HOST)
    }
}

impl CspRewriter {
    /// Rewriter allowing stylesheets from `theme_host`
    pub fn new(theme_host: impl Into<String>) -> Self {
        Self {
            theme_host: theme_host.into(),
        }
    }

    /// Rewriter for themes served from `base_url`; falls back to the default
    /// host when the URL has none
    pub fn for_base_url(base_url: &str) -> Self {
        match Url::parse(base_url).ok().and_then(|url| url.host_str().map(str::to_string)) {
            Some(host) => Self::new(host),
            None => Self::default(),
        }
    }

    /// Host added to `style-src` and `img-src`
    pub fn theme_host(&self) -> &str {
        &self.theme_host
    }

    /// Rewrite one policy value
    pub fn rewrite(&self, policy: &str) -> String {
        policy
            .split(';')
            .map(|directive| self.rewrite_directive(directive))
            .collect::<Vec<_>>()
            .join(";")
    }

    fn rewrite_directive(&self, directive: &str) -> String {
        let content = directive.trim_end();
        let trailing = &directive[content.len()..];

        let mut tokens = content.split_whitespace();
        let Some(name) = tokens.next() else {
            return directive.to_string();
        };
        let sources: Vec<&str> = tokens.collect();

        let required: Vec<&str> = match name.to_ascii_lowercase().as_str() {
            "style-src" => vec![self.theme_host.as_str(), RAW_GITHUB_HOST, FONT_AWESOME_HOST],
            "img-src" => vec![self.theme_host.as_str(), RAW_GITHUB_HOST],
            "font-src" => vec![FONT_AWESOME_HOST],
            _ => return directive.to_string(),
        };

        let mut rewritten = content.to_string();
        for host in required {
            if !sources.iter().any(|source| source.eq_ignore_ascii_case(host)) {
                rewritten.push(' ');
                rewritten.push_str(host);
            }
        }
        rewritten.push_str(trailing);
        rewritten
    }

    /// Rewrite every `Content-Security-Policy` value in `headers`
    pub fn apply(&self, headers: &mut HeaderMap) {
        if !headers.contains_key(CONTENT_SECURITY_POLICY) {
            return;
        }

        let policies: Vec<HeaderValue> = headers
            .get_all(CONTENT_SECURITY_POLICY)
            .iter()
            .map(|value| match value.to_str() {
                Ok(policy) => {
                    let rewritten = self.rewrite(policy);
                    tracing::debug!(original = %policy, rewritten = %rewritten, "Rewrote CSP");
                    HeaderValue::from_str(&rewritten).unwrap_or_else(|_| value.clone())
                }
                Err(_) => value.clone(),
            })
            .collect();

        headers.remove(CONTENT_SECURITY_POLICY);
        for policy in policies {
            headers.append(CONTENT_SECURITY_POLICY, policy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_src_gets_all_hosts() {
        let csp = CspRewriter::default();
        assert_eq!(
            csp.rewrite("style-src 'self'"),
            "style-src 'self' theme-park.dev raw.githubusercontent.com use.fontawesome.com"
        );
    }

    #[test]
    fn test_img_and_font_src() {
        let csp = CspRewriter::default();
        assert_eq!(
            csp.rewrite("img-src 'self' data:"),
            "img-src 'self' data: theme-park.dev raw.githubusercontent.com"
        );
        assert_eq!(csp.rewrite("font-src 'self'"), "font-src 'self' use.fontawesome.com");
    }

    #[test]
    fn test_present_hosts_not_duplicated() {
        let csp = CspRewriter::default();
        assert_eq!(
            csp.rewrite("style-src theme-park.dev 'self'; img-src raw.githubusercontent.com"),
            "style-src theme-park.dev 'self' raw.githubusercontent.com use.fontawesome.com; \
             img-src raw.githubusercontent.com theme-park.dev"
        );
    }

    #[test]
    fn test_other_directives_untouched() {
        let csp = CspRewriter::default();
        let policy = "default-src 'self'; script-src 'none'; frame-ancestors 'self';";
        assert_eq!(csp.rewrite(policy), policy);
    }

    #[test]
    fn test_separators_preserved() {
        let csp = CspRewriter::default();
        assert_eq!(
            csp.rewrite("default-src 'self';font-src data: ;  STYLE-SRC;"),
            "default-src 'self';font-src data: use.fontawesome.com ;  STYLE-SRC theme-park.dev raw.githubusercontent.com use.fontawesome.com;"
        );
    }

    #[test]
    fn test_custom_theme_host() {
        let csp = CspRewriter::for_base_url("https://themes.example.com:8443/theme-park");
        assert_eq!(csp.theme_host(), "themes.example.com");
        assert_eq!(
            csp.rewrite("img-src 'self'"),
            "img-src 'self' themes.example.com raw.githubusercontent.com"
        );

        assert_eq!(CspRewriter::for_base_url("not a url").theme_host(), THEME_PARK_HOST);
    }

    #[test]
    fn test_apply_to_headers() {
        let csp = CspRewriter::default();
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'self'; font-src 'self'"),
        );

        csp.apply(&mut headers);
        assert_eq!(
            headers[CONTENT_SECURITY_POLICY],
            "default-src 'self'; font-src 'self' use.fontawesome.com"
        );

        let mut empty = HeaderMap::new();
        csp.apply(&mut empty);
        assert!(empty.is_empty());
    }
}
