//! HTTP client for making requests to the upstream app

use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use themepark_core::{Body, Error, Request, Response, Result};

/// HTTP client for upstream requests
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a new HTTP client with custom timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Self { client, timeout }
    }

    /// Send a request upstream, bounded by the configured timeout
    pub async fn send(&self, req: Request<Body>) -> Result<Response<Incoming>> {
        let timeout = tokio::time::timeout(self.timeout, self.client.request(req));

        match timeout.await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(Error::UpstreamConnection(e.to_string())),
            Err(_) => Err(Error::UpstreamTimeout),
        }
    }

    /// Get the configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}
