//! Middleware chain
//!
//! Bodies are fully buffered ([`Body`] is `Full<Bytes>`), which is what the
//! rewriting middleware needs: it must see the whole upstream response before
//! it can decode, rewrite and re-encode it.

use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Buffered body used on both sides of the chain
pub type Body = Full<Bytes>;

/// Response-valued middleware
#[async_trait]
pub trait Middleware: Send + Sync + fmt::Debug {
    /// Handle `req`, usually by running `next` and adjusting its response
    async fn call(&self, req: Request<Body>, next: Next) -> Result<Response<Body>>;
}

/// Future produced by a [`HandlerFn`]
pub type ResponseFuture = Pin<Box<dyn Future<Output = Result<Response<Body>>> + Send>>;

/// Terminal handler run after the last middleware (the upstream, in the proxy)
pub type HandlerFn = Box<dyn Fn(Request<Body>) -> ResponseFuture + Send + Sync>;

/// Box an async closure as a [`HandlerFn`]
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<Body>>> + Send + 'static,
{
    Box::new(move |req| Box::pin(f(req)) as ResponseFuture)
}

/// Position in a middleware chain
pub struct Next {
    stack: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    terminal: Option<Arc<HandlerFn>>,
}

impl Next {
    /// Chain with no terminal handler; running past the last middleware fails
    pub fn new(stack: Arc<[Arc<dyn Middleware>]>) -> Self {
        Self {
            stack,
            index: 0,
            terminal: None,
        }
    }

    /// Chain ending in `handler`
    pub fn with_handler(stack: Arc<[Arc<dyn Middleware>]>, handler: HandlerFn) -> Self {
        Self {
            stack,
            index: 0,
            terminal: Some(Arc::new(handler)),
        }
    }

    /// Middleware still to run before the terminal handler
    pub fn remaining(&self) -> usize {
        self.stack.len().saturating_sub(self.index)
    }

    /// Run the next middleware, or the terminal handler once the stack is done
    pub async fn run(self, req: Request<Body>) -> Result<Response<Body>> {
        match self.stack.get(self.index) {
            Some(middleware) => {
                let next = Self {
                    stack: Arc::clone(&self.stack),
                    index: self.index + 1,
                    terminal: self.terminal.clone(),
                };
                middleware.call(req, next).await
            }
            None => match self.terminal {
                Some(handler) => handler(req).await,
                None => Err(Error::Internal(
                    "Middleware chain has no upstream handler".to_string(),
                )),
            },
        }
    }
}

impl Clone for Next {
    fn clone(&self) -> Self {
        Self {
            stack: Arc::clone(&self.stack),
            index: self.index,
            terminal: self.terminal.clone(),
        }
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("remaining", &self.remaining())
            .field("terminal", &self.terminal.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::CONTENT_TYPE;
    use http::HeaderValue;
    use http_body_util::BodyExt;

    /// Appends a marker to HTML bodies, the way a rewriting middleware would
    #[derive(Debug)]
    struct AppendMarker(&'static str);

    #[async_trait]
    impl Middleware for AppendMarker {
        async fn call(&self, req: Request<Body>, next: Next) -> Result<Response<Body>> {
            let response = next.run(req).await?;
            let (parts, body) = response.into_parts();
            let mut body = body.collect().await.map_err(|e| -> crate::error::Error { match e {} })?.to_bytes().to_vec();
            body.extend_from_slice(self.0.as_bytes());
            Ok(Response::from_parts(parts, Body::from(body)))
        }
    }

    fn stack(markers: &[&'static str]) -> Arc<[Arc<dyn Middleware>]> {
        markers
            .iter()
            .map(|&marker| Arc::new(AppendMarker(marker)) as Arc<dyn Middleware>)
            .collect()
    }

    fn html_upstream() -> HandlerFn {
        handler_fn(|_req| async {
            Ok(Response::builder()
                .header(CONTENT_TYPE, HeaderValue::from_static("text/html"))
                .body(Body::from("<head></head>"))
                .unwrap())
        })
    }

    fn request() -> Request<Body> {
        Request::builder().uri("/").body(Body::from("")).unwrap()
    }

    #[tokio::test]
    async fn test_chain_without_upstream_errors() {
        let next = Next::new(stack(&["<!-- a -->"]));
        let err = next.run(request()).await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn test_innermost_middleware_rewrites_first() {
        let next = Next::with_handler(stack(&["<!-- outer -->", "<!-- inner -->"]), html_upstream());
        assert_eq!(next.remaining(), 2);

        let response = next.run(request()).await.unwrap();
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"<head></head><!-- inner --><!-- outer -->");
    }

    #[tokio::test]
    async fn test_empty_chain_reaches_upstream() {
        let next = Next::with_handler(stack(&[]), html_upstream());
        assert_eq!(next.remaining(), 0);
        assert!(format!("{next:?}").contains("terminal: true"));

        let body = next.run(request()).await.unwrap().into_body().collect().await.unwrap();
        assert_eq!(&body.to_bytes()[..], b"<head></head>");
    }
}
