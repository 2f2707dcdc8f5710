//! Single-upstream HTTP proxy

use crate::client::HttpClient;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::uri::{Authority, Scheme};
use http::Uri;
use http_body_util::BodyExt;
use std::net::SocketAddr;
use themepark_core::{Body, Error, Request, Response, Result};

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Connection-scoped headers never forwarded in either direction
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Peer address of the downstream connection, stored in request extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub SocketAddr);

/// HTTP proxy in front of one upstream app
#[derive(Debug, Clone)]
pub struct HttpProxy {
    client: HttpClient,
    scheme: Scheme,
    authority: Authority,
    base_path: String,
    preserve_host: bool,
}

impl HttpProxy {
    /// Proxy to `upstream`, an absolute URL such as `http://127.0.0.1:8989/sonarr`
    pub fn new(client: HttpClient, upstream: &str, preserve_host: bool) -> Result<Self> {
        let uri: Uri = upstream
            .parse()
            .map_err(|e| Error::Config(format!("Invalid upstream '{upstream}': {e}")))?;

        let scheme = uri
            .scheme()
            .cloned()
            .ok_or_else(|| Error::Config(format!("Upstream '{upstream}' has no scheme")))?;
        let authority = uri
            .authority()
            .cloned()
            .ok_or_else(|| Error::Config(format!("Upstream '{upstream}' has no host")))?;

        Ok(Self {
            client,
            scheme,
            authority,
            base_path: uri.path().trim_end_matches('/').to_string(),
            preserve_host,
        })
    }

    /// Upstream authority (`host:port`)
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Forward a request and collect the upstream response
    pub async fn proxy(&self, mut req: Request<Body>) -> Result<Response<Body>> {
        let upstream_uri = self.build_upstream_uri(req.uri())?;
        let original_host = req
            .headers()
            .get(header::HOST)
            .cloned()
            .or_else(|| {
                req.uri()
                    .authority()
                    .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
            });
        let client_addr = req.extensions().get::<ClientAddr>().copied();

        *req.uri_mut() = upstream_uri;
        self.transform_headers(req.headers_mut(), original_host, client_addr)?;

        tracing::debug!(
            method = %req.method(),
            uri = %req.uri(),
            "Forwarding request upstream"
        );

        let response = self.client.send(req).await?;

        let (mut parts, body) = response.into_parts();
        let body_bytes = body
            .collect()
            .await
            .map_err(|e| Error::UpstreamConnection(e.to_string()))?
            .to_bytes();
        strip_hop_by_hop(&mut parts.headers);

        Ok(Response::from_parts(parts, Body::new(body_bytes)))
    }

    /// Build the upstream URI
    fn build_upstream_uri(&self, uri: &Uri) -> Result<Uri> {
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(format!("{}{}", self.base_path, path_and_query))
            .build()
            .map_err(|e| Error::UpstreamConnection(format!("Invalid upstream URI: {e}")))
    }

    /// Transform request headers
    fn transform_headers(
        &self,
        headers: &mut HeaderMap,
        original_host: Option<HeaderValue>,
        client_addr: Option<ClientAddr>,
    ) -> Result<()> {
        strip_hop_by_hop(headers);

        if !self.preserve_host || original_host.is_none() {
            headers.insert(
                header::HOST,
                HeaderValue::from_str(self.authority.as_str())
                    .map_err(|e| Error::InvalidRequest(format!("Invalid host: {e}")))?,
            );
        }

        if let Some(ClientAddr(addr)) = client_addr {
            let forwarded_for = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok())
            {
                Some(prior) => format!("{prior}, {}", addr.ip()),
                None => addr.ip().to_string(),
            };
            headers.insert(
                X_FORWARDED_FOR,
                HeaderValue::from_str(&forwarded_for)
                    .map_err(|e| Error::InvalidRequest(format!("Invalid X-Forwarded-For: {e}")))?,
            );
        }

        if let Some(host) = original_host {
            if !headers.contains_key(&X_FORWARDED_HOST) {
                headers.insert(X_FORWARDED_HOST, host);
            }
        }

        if !headers.contains_key(&X_FORWARDED_PROTO) {
            headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
        }

        Ok(())
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named by Connection are hop-by-hop too
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn proxy(upstream: &str, preserve_host: bool) -> HttpProxy {
        HttpProxy::new(HttpClient::new(), upstream, preserve_host).unwrap()
    }

    #[test]
    fn test_build_upstream_uri() {
        let proxy = proxy("http://localhost:8989", true);

        let uri = proxy.build_upstream_uri(&"/test?foo=bar".parse().unwrap()).unwrap();
        assert_eq!(uri.to_string(), "http://localhost:8989/test?foo=bar");
    }

    #[test]
    fn test_build_upstream_uri_with_base_path() {
        let proxy = proxy("http://localhost:8989/sonarr/", true);

        let uri = proxy.build_upstream_uri(&"/api/v3".parse().unwrap()).unwrap();
        assert_eq!(uri.to_string(), "http://localhost:8989/sonarr/api/v3");
    }

    #[test]
    fn test_invalid_upstream() {
        assert!(HttpProxy::new(HttpClient::new(), "/relative", true).is_err());
        assert!(HttpProxy::new(HttpClient::new(), "not a uri", true).is_err());
    }

    #[test]
    fn test_forwarded_headers() {
        let proxy = proxy("http://sonarr:8989", true);
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("media.lan"));
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("10.0.0.1"));

        proxy
            .transform_headers(
                &mut headers,
                Some(HeaderValue::from_static("media.lan")),
                Some(ClientAddr("192.168.1.20:51000".parse().unwrap())),
            )
            .unwrap();

        assert_eq!(headers[header::HOST], "media.lan");
        assert_eq!(headers[&X_FORWARDED_FOR], "10.0.0.1, 192.168.1.20");
        assert_eq!(headers[&X_FORWARDED_HOST], "media.lan");
        assert_eq!(headers[&X_FORWARDED_PROTO], "http");
    }

    #[test]
    fn test_host_rewritten_unless_preserved() {
        let proxy = proxy("http://sonarr:8989", false);
        let mut headers = HeaderMap::new();

        proxy
            .transform_headers(&mut headers, Some(HeaderValue::from_static("media.lan")), None)
            .unwrap();

        assert_eq!(headers[header::HOST], "sonarr:8989");
        assert!(!headers.contains_key(&X_FORWARDED_FOR));
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-trace"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-trace", HeaderValue::from_static("1"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(header::CONTENT_TYPE));
    }

    #[tokio::test]
    async fn test_proxy_unreachable_upstream() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let proxy = proxy(&format!("http://{addr}"), false);
        let req = Request::builder()
            .uri("/")
            .body(Body::new(Bytes::new()))
            .unwrap();

        let err = proxy.proxy(req).await.unwrap_err();
        assert_eq!(err.to_status_code(), http::StatusCode::BAD_GATEWAY);
    }
}
