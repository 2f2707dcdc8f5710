//! Sink-based request handlers

use crate::middleware::{Body, Next};
use crate::sink::{write_response, ResponseSink};
use crate::{Error, Result};
use async_trait::async_trait;
use http::Request;
use http_body_util::BodyExt;
use std::fmt;

/// A handler that writes its response into a [`ResponseSink`].
///
/// This is the shape the rewriting middleware wraps: the handler never
/// returns a response value, it streams headers and bytes into whatever sink
/// it is given, which lets a decorator sit between the handler and the client.
#[async_trait]
pub trait Handler: Send + Sync + fmt::Debug {
    /// Serve one request into `sink`
    async fn serve(&self, sink: &mut dyn ResponseSink, req: Request<Body>) -> Result<()>;
}

/// Adapts the rest of a middleware chain to the [`Handler`] interface
#[derive(Debug, Clone)]
pub struct NextHandler {
    next: Next,
}

impl NextHandler {
    /// Wrap the remaining chain
    pub fn new(next: Next) -> Self {
        Self { next }
    }

    /// Give back the wrapped chain
    pub fn into_inner(self) -> Next {
        self.next
    }
}

#[async_trait]
impl Handler for NextHandler {
    async fn serve(&self, sink: &mut dyn ResponseSink, req: Request<Body>) -> Result<()> {
        let response = self.next.clone().run(req).await?;
        let (parts, body) = response.into_parts();

        let body = body
            .collect()
            .await
            .map_err(|e| Error::Internal(format!("Failed to read body: {e}")))?
            .to_bytes();

        write_response(sink, parts, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Middleware;
    use crate::sink::ResponseRecorder;
    use http::{Response, StatusCode};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_next_handler_writes_into_sink() {
        let stack: Arc<[Arc<dyn Middleware>]> = Arc::new([]);
        let next = Next::with_handler(
            stack,
            Box::new(|_req| {
                Box::pin(async {
                    Ok(Response::builder()
                        .status(StatusCode::IM_A_TEAPOT)
                        .header("content-type", "text/html")
                        .body(Body::from("<p>tea</p>"))
                        .unwrap())
                })
            }),
        );

        let handler = NextHandler::new(next);
        let mut recorder = ResponseRecorder::new();
        let req = Request::builder().uri("/").body(Body::from("")).unwrap();

        handler.serve(&mut recorder, req).await.unwrap();

        assert_eq!(recorder.status(), Some(StatusCode::IM_A_TEAPOT));
        assert_eq!(recorder.body(), b"<p>tea</p>");
    }

    #[tokio::test]
    async fn test_next_handler_propagates_errors() {
        let stack: Arc<[Arc<dyn Middleware>]> = Arc::new([]);
        let handler = NextHandler::new(Next::new(stack));
        let mut recorder = ResponseRecorder::new();
        let req = Request::builder().uri("/").body(Body::from("")).unwrap();

        assert!(handler.serve(&mut recorder, req).await.is_err());
        assert!(!recorder.is_committed());
    }
}
