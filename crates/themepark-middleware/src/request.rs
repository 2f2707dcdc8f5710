//! Request classification and downstream request shaping

use crate::monitoring::MonitoringConfig;
use http::header::{ACCEPT, ACCEPT_ENCODING, UPGRADE};
use http::{HeaderMap, HeaderName, HeaderValue, Request};
use themepark_compression::{filter_supported, Encoding, EncodingPreference};

/// Decides whether a request's response may be rewritten and prepares the
/// request that is sent downstream.
#[derive(Debug, Clone, Default)]
pub struct RequestClassifier {
    monitoring: MonitoringConfig,
}

impl RequestClassifier {
    /// Classify against the given monitoring config
    pub fn new(monitoring: MonitoringConfig) -> Self {
        Self {
            monitoring: monitoring.normalized(),
        }
    }

    /// Monitoring config in use
    pub fn monitoring(&self) -> &MonitoringConfig {
        &self.monitoring
    }

    /// Whether the response to `req` is a rewrite candidate.
    ///
    /// The client must accept a monitored type, the method must be monitored
    /// and the request must not be a WebSocket upgrade.
    pub fn supports_processing<B>(&self, req: &Request<B>) -> bool {
        let headers = req.headers();

        if !self.monitoring.matches_type(&joined(headers, &ACCEPT)) {
            return false;
        }

        if !self.monitoring.matches_method(req.method()) {
            return false;
        }

        !joined(headers, &UPGRADE)
            .to_ascii_lowercase()
            .contains("websocket")
    }

    /// Restrict `Accept-Encoding` to codings the codec can round-trip.
    ///
    /// Unsupported entries are dropped; when nothing remains the header is
    /// kept with an empty value, which leaves the downstream handler only
    /// identity. Requests without the header are left alone.
    pub fn with_supported_encoding<B>(&self, mut req: Request<B>) -> Request<B> {
        let headers = req.headers_mut();
        if !headers.contains_key(ACCEPT_ENCODING) {
            return req;
        }

        let filtered = filter_supported(&joined(headers, &ACCEPT_ENCODING));
        match HeaderValue::from_str(&filtered) {
            Ok(value) => {
                headers.insert(ACCEPT_ENCODING, value);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Unable to rebuild Accept-Encoding, clearing it");
                headers.insert(ACCEPT_ENCODING, HeaderValue::from_static(""));
            }
        }
        req
    }
}

/// Coding the client would most like among those the codec supports
pub fn encoding_target(headers: &HeaderMap) -> Encoding {
    EncodingPreference::parse(&joined(headers, &ACCEPT_ENCODING)).preferred()
}

/// All values of a (list-valued) header joined with `,`
fn joined(headers: &HeaderMap, name: &HeaderName) -> String {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn request(method: Method, headers: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder().method(method).uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_html_get_is_eligible() {
        let classifier = RequestClassifier::default();
        let req = request(Method::GET, &[("accept", "text/html,application/xhtml+xml")]);
        assert!(classifier.supports_processing(&req));
    }

    #[test]
    fn test_wrong_accept_is_ineligible() {
        let classifier = RequestClassifier::default();
        assert!(!classifier.supports_processing(&request(Method::GET, &[("accept", "application/json")])));
        assert!(!classifier.supports_processing(&request(Method::GET, &[])));
    }

    #[test]
    fn test_unmonitored_method_is_ineligible() {
        let classifier = RequestClassifier::default();
        let req = request(Method::POST, &[("accept", "text/html")]);
        assert!(!classifier.supports_processing(&req));

        let classifier = RequestClassifier::new(MonitoringConfig::new(["text/html"], ["get", "post"]));
        assert!(classifier.supports_processing(&req));
    }

    #[test]
    fn test_websocket_upgrade_is_ineligible() {
        let classifier = RequestClassifier::default();
        let req = request(
            Method::GET,
            &[("accept", "text/html"), ("upgrade", "WebSocket")],
        );
        assert!(!classifier.supports_processing(&req));
    }

    #[test]
    fn test_accept_encoding_filtered() {
        let classifier = RequestClassifier::default();
        let req = request(Method::GET, &[("accept-encoding", "br;q=1.0, gzip;q=0.8, deflate")]);
        let req = classifier.with_supported_encoding(req);
        assert_eq!(req.headers()[ACCEPT_ENCODING], "gzip;q=0.8, deflate");
    }

    #[test]
    fn test_accept_encoding_emptied() {
        let classifier = RequestClassifier::default();
        let req = classifier.with_supported_encoding(request(Method::GET, &[("accept-encoding", "br")]));
        assert_eq!(req.headers()[ACCEPT_ENCODING], "");

        let req = classifier.with_supported_encoding(request(Method::GET, &[]));
        assert!(!req.headers().contains_key(ACCEPT_ENCODING));
    }

    #[test]
    fn test_encoding_target() {
        let target = |value: &str| encoding_target(request(Method::GET, &[("accept-encoding", value)]).headers());
        assert_eq!(target("br, gzip"), Encoding::Gzip);
        assert_eq!(target("gzip;q=0.8, deflate;q=0.9"), Encoding::Deflate);
        assert_eq!(target("*"), Encoding::Gzip);
        assert_eq!(target("br"), Encoding::Identity);
        assert_eq!(encoding_target(&HeaderMap::new()), Encoding::Identity);
    }
}
