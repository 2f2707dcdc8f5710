//! HTTP server implementation

use crate::client::HttpClient;
use crate::proxy::{ClientAddr, HttpProxy};
use crate::shutdown::ShutdownSignal;
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use themepark_config::Config;
use themepark_core::{handler_fn, Body, Error, Middleware, Next, Request, Response, Result};
use tokio::net::TcpListener;

/// Reverse proxy server running the configured middleware chain
pub struct Server {
    listen: SocketAddr,
    shutdown_timeout: Duration,
    handler: RequestHandler,
    shutdown: ShutdownSignal,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("listen", &self.listen)
            .field("upstream", &self.handler.proxy.authority())
            .field("middleware_count", &self.handler.middleware.len())
            .field("active_requests", &self.active_requests())
            .finish()
    }
}

impl Server {
    /// Build the proxy and middleware chain described by `config`
    pub fn new(config: &Config) -> Result<Self> {
        let client = HttpClient::with_timeout(config.proxy.request_timeout);
        let proxy = HttpProxy::new(client, &config.proxy.upstream, config.proxy.preserve_host)?;
        let middleware = config.middleware()?.build();

        Ok(Self {
            listen: config.proxy.listen,
            shutdown_timeout: config.proxy.shutdown_timeout,
            handler: RequestHandler {
                proxy: Arc::new(proxy),
                middleware,
                active_requests: Arc::new(AtomicUsize::new(0)),
            },
            shutdown: ShutdownSignal::new(),
        })
    }

    /// Get listen address
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen
    }

    /// Requests currently being served
    pub fn active_requests(&self) -> usize {
        self.handler.active_requests.load(Ordering::Relaxed)
    }

    /// Get shutdown signal
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.listen)
            .await
            .map_err(|e| Error::Runtime(format!("Failed to bind to {}: {e}", self.listen)))?;

        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!(
            listen = %local_addr,
            upstream = %self.handler.proxy.authority(),
            middleware = self.handler.middleware.len(),
            "Server listening"
        );

        let shutdown = self.shutdown.wait();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            tracing::trace!("Accepted connection from {}", addr);
                            let handler = self.handler.clone();

                            tokio::spawn(async move {
                                let service = hyper::service::service_fn(move |req| {
                                    let handler = handler.clone();
                                    async move {
                                        handler.handle(req, addr).await.or_else(|e| {
                                            tracing::error!("Request handler error: {}", e);
                                            Response::builder()
                                                .status(e.to_status_code())
                                                .body(Body::new(Bytes::from(format!("Error: {e}"))))
                                        })
                                    }
                                });

                                let io = TokioIo::new(stream);
                                if let Err(e) = hyper::server::conn::http1::Builder::new()
                                    .serve_connection(io, service)
                                    .await
                                {
                                    tracing::error!("HTTP connection error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }

                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.drain().await;
        Ok(())
    }

    /// Wait for in-flight requests, bounded by the shutdown timeout
    async fn drain(&self) {
        let start = Instant::now();

        loop {
            let active = self.active_requests();

            if active == 0 {
                tracing::info!("All requests completed, shutting down cleanly");
                break;
            }

            if start.elapsed() >= self.shutdown_timeout {
                tracing::warn!(
                    active_requests = active,
                    "Shutdown timeout reached, forcing shutdown"
                );
                break;
            }

            tracing::debug!(active_requests = active, "Waiting for active requests to complete");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        tracing::info!(
            shutdown_duration_ms = start.elapsed().as_millis(),
            "Server stopped"
        );
    }
}

/// Per-request entry point shared by all connections
#[derive(Clone)]
struct RequestHandler {
    proxy: Arc<HttpProxy>,
    middleware: Arc<[Arc<dyn Middleware>]>,
    active_requests: Arc<AtomicUsize>,
}

impl RequestHandler {
    async fn handle(&self, req: Request<Incoming>, client: SocketAddr) -> Result<Response<Body>> {
        let _active = ActiveRequest::enter(&self.active_requests);
        let start = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let (mut parts, body) = req.into_parts();
        let body_bytes = body
            .collect()
            .await
            .map_err(|e| Error::InvalidRequest(format!("Failed to read request body: {e}")))?
            .to_bytes();
        parts.extensions.insert(ClientAddr(client));
        let req = Request::from_parts(parts, Body::new(body_bytes));

        let proxy = Arc::clone(&self.proxy);
        let upstream = handler_fn(move |req: Request<Body>| {
            let proxy = Arc::clone(&proxy);
            async move { proxy.proxy(req).await }
        });

        let response = Next::with_handler(Arc::clone(&self.middleware), upstream)
            .run(req)
            .await?;

        tracing::info!(
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );

        Ok(response)
    }
}

struct ActiveRequest(Arc<AtomicUsize>);

impl ActiveRequest {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}
