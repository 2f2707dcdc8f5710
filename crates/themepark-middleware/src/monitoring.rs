//! Content-type / method eligibility filter

use http::Method;
use serde::{Deserialize, Deserializer, Serialize};

/// Content type monitored when none is configured
pub const DEFAULT_TYPE: &str = "text/html";
/// Method monitored when none is configured
pub const DEFAULT_METHOD: &str = "GET";

/// Which responses are eligible for rewriting.
///
/// Types are matched as lower-case substrings of `Accept` / `Content-Type`,
/// methods exactly and upper-case. Both lists accept either a YAML/JSON list
/// or a single comma separated string (`"text/html, application/xhtml+xml"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringConfig {
    /// Monitored content types
    #[serde(default, deserialize_with = "string_or_list")]
    pub types: Vec<String>,

    /// Monitored request methods
    #[serde(default, deserialize_with = "string_or_list")]
    pub methods: Vec<String>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            types: vec![DEFAULT_TYPE.to_string()],
            methods: vec![DEFAULT_METHOD.to_string()],
        }
    }
}

impl MonitoringConfig {
    /// Build a config from explicit lists, normalizing them
    pub fn new<T, M>(types: T, methods: M) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        M: IntoIterator,
        M::Item: Into<String>,
    {
        Self {
            types: types.into_iter().map(Into::into).collect(),
            methods: methods.into_iter().map(Into::into).collect(),
        }
        .normalized()
    }

    /// Lower-case types, upper-case methods, drop blanks and apply defaults
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.types = self
            .types
            .iter()
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        self.methods = self
            .methods
            .iter()
            .map(|m| m.trim().to_ascii_uppercase())
            .filter(|m| !m.is_empty())
            .collect();

        if self.types.is_empty() {
            self.types.push(DEFAULT_TYPE.to_string());
        }
        if self.methods.is_empty() {
            self.methods.push(DEFAULT_METHOD.to_string());
        }
        self
    }

    /// Whether a header value (`Accept`, `Content-Type`) mentions a monitored type
    pub fn matches_type(&self, value: &str) -> bool {
        let value = value.to_ascii_lowercase();
        self.types.iter().any(|t| value.contains(t.as_str()))
    }

    /// Whether `method` is monitored
    pub fn matches_method(&self, method: &Method) -> bool {
        self.methods.iter().any(|m| m == method.as_str())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    Joined(String),
    List(Vec<String>),
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Option::<StringOrList>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(StringOrList::List(items)) => items,
        Some(StringOrList::Joined(joined)) => joined
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
    };
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied_when_empty() {
        let config = MonitoringConfig::new(Vec::<String>::new(), Vec::<String>::new());
        assert_eq!(config, MonitoringConfig::default());
    }

    #[test]
    fn test_normalization() {
        let config = MonitoringConfig::new(["Text/HTML ", "APPLICATION/XHTML+XML"], ["get", " head"]);
        assert_eq!(config.types, vec!["text/html", "application/xhtml+xml"]);
        assert_eq!(config.methods, vec!["GET", "HEAD"]);
    }

    #[test]
    fn test_matches() {
        let config = MonitoringConfig::default();
        assert!(config.matches_type("text/html; charset=utf-8"));
        assert!(config.matches_type("TEXT/HTML"));
        assert!(!config.matches_type("application/json"));
        assert!(config.matches_method(&Method::GET));
        assert!(!config.matches_method(&Method::POST));
    }

    #[test]
    fn test_deserialize_joined_string() {
        let config: MonitoringConfig = serde_json::from_str(
            r#"{"types": "text/html, application/xhtml+xml", "methods": "GET, HEAD"}"#,
        )
        .unwrap();
        let config = config.normalized();
        assert_eq!(config.types, vec!["text/html", "application/xhtml+xml"]);
        assert_eq!(config.methods, vec!["GET", "HEAD"]);
    }

    #[test]
    fn test_deserialize_list_and_missing() {
        let config: MonitoringConfig = serde_yaml::from_str("types: [text/html]\n").unwrap();
        let config = config.normalized();
        assert_eq!(config.types, vec!["text/html"]);
        assert_eq!(config.methods, vec!["GET"]);
    }
}
