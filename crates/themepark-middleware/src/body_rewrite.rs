//! Response body rewriting middleware
//!
//! Per request:
//! 1. requests the client would not render as a monitored type (wrong
//!    `Accept`, unmonitored method, WebSocket upgrade) go straight through;
//! 2. otherwise the downstream handler writes into a [`ResponseWrapper`],
//!    after being told to only use codings the codec understands;
//! 3. responses that turn out not to be rewritable are sent back verbatim,
//!    as are bodies that fail to decode;
//! 4. everything else is decoded, run through the rewrite rules and
//!    re-encoded with the coding the downstream handler declared.
//!
//! Panics raised while handling a request are caught here. An
//! [`AbortHandler`] payload (or [`themepark_core::Error::Aborted`]) means the client is gone
//! and is dropped silently; anything else is logged.

use crate::csp::CspRewriter;
use crate::interceptor::ResponseWrapper;
use crate::logging::LogLevel;
use crate::monitoring::MonitoringConfig;
use crate::request::RequestClassifier;
use crate::rewrite::{RewriteEngine, RewriteRule};
use async_trait::async_trait;
use futures::FutureExt;
use http::{Request, Response};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::future::Future;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use themepark_core::{
    AbortHandler, Body, Handler, Middleware, Next, NextHandler, ResponseRecorder, ResponseSink,
    Result,
};
use tracing::Level;

/// One configured `(regex, replacement)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rewrite {
    /// Pattern matched against the decoded body
    pub regex: String,
    /// Replacement, may reference capture groups (`$1`, `${name}`).
    /// Config files spell `${name}` as `$${name}` to skip env expansion.
    pub replacement: String,
}

/// Configuration of a generic body rewriting middleware
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteBodyConfig {
    /// Keep the downstream `Last-Modified` header
    #[serde(default)]
    pub last_modified: bool,

    /// Diagnostic verbosity of this instance
    #[serde(default)]
    pub log_level: LogLevel,

    /// Rules applied in order
    #[serde(default)]
    pub rewrites: Vec<Rewrite>,

    /// Which responses are rewritten
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// The body rewriting middleware
#[derive(Debug, Clone)]
pub struct RewriteBody {
    name: String,
    engine: RewriteEngine,
    classifier: RequestClassifier,
    csp: Option<CspRewriter>,
    last_modified: bool,
    log_level: LogLevel,
}

impl RewriteBody {
    /// Compile every configured rule; an invalid regex fails here rather
    /// than at request time
    pub fn new(config: RewriteBodyConfig) -> Result<Self> {
        let rules = config
            .rewrites
            .iter()
            .map(|rewrite| RewriteRule::new(&rewrite.regex, rewrite.replacement.as_bytes()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::with_engine(RewriteEngine::new(rules), config.monitoring)
            .with_last_modified(config.last_modified)
            .with_log_level(config.log_level))
    }

    /// Middleware running `engine` on responses selected by `monitoring`
    pub fn with_engine(engine: RewriteEngine, monitoring: MonitoringConfig) -> Self {
        Self {
            name: "rewrite-body".to_string(),
            engine,
            classifier: RequestClassifier::new(monitoring),
            csp: None,
            last_modified: false,
            log_level: LogLevel::default(),
        }
    }

    /// Name used in diagnostics
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Also rewrite `Content-Security-Policy` on monitored responses
    #[must_use]
    pub fn with_csp(mut self, csp: CspRewriter) -> Self {
        self.csp = Some(csp);
        self
    }

    /// Keep the downstream `Last-Modified` header
    #[must_use]
    pub fn with_last_modified(mut self, keep: bool) -> Self {
        self.last_modified = keep;
        self
    }

    /// Diagnostic verbosity of this instance
    #[must_use]
    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    /// Name used in diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rewrite rules in application order
    pub fn engine(&self) -> &RewriteEngine {
        &self.engine
    }

    /// Request classifier
    pub fn classifier(&self) -> &RequestClassifier {
        &self.classifier
    }

    /// CSP rewriter, when enabled
    pub fn csp(&self) -> Option<&CspRewriter> {
        self.csp.as_ref()
    }

    /// Diagnostic verbosity of this instance
    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    /// Decorate a sink-based handler
    pub fn wrap(self: Arc<Self>, next: Arc<dyn Handler>) -> RewriteBodyHandler {
        RewriteBodyHandler {
            middleware: self,
            next,
        }
    }

    /// Serve `req` through `next`, rewriting the response written to `sink`
    pub async fn serve_with(
        &self,
        next: &dyn Handler,
        sink: &mut dyn ResponseSink,
        req: Request<Body>,
    ) -> Result<()> {
        self.recover(async move {
            if !self.classifier.supports_processing(&req) {
                return next.serve(sink, req).await;
            }
            self.intercept(next, sink, req).await
        })
        .await
    }

    async fn intercept(
        &self,
        next: &dyn Handler,
        sink: &mut dyn ResponseSink,
        req: Request<Body>,
    ) -> Result<()> {
        if self.log_level.allows(Level::DEBUG) {
            tracing::debug!(
                middleware = %self.name,
                method = %req.method(),
                uri = %req.uri(),
                "Intercepting response"
            );
        }

        let req = self.classifier.with_supported_encoding(req);
        let mut wrapper = ResponseWrapper::new(sink, self.classifier.monitoring())
            .with_last_modified(self.last_modified)
            .with_csp(self.csp.as_ref())
            .with_log_level(self.log_level);

        next.serve(&mut wrapper, req).await?;

        if wrapper.is_hijacked() {
            if self.log_level.allows(Level::DEBUG) {
                tracing::debug!(middleware = %self.name, "Connection hijacked, leaving response alone");
            }
            return Ok(());
        }

        if let Err(e) = self.finish(&mut wrapper) {
            tracing::error!(middleware = %self.name, error = %e, "Unable to write response");
            if self.log_level.allows(Level::DEBUG) {
                tracing::debug!(
                    middleware = %self.name,
                    headers = ?wrapper.headers(),
                    "Headers of the failed response"
                );
            }
        }
        Ok(())
    }

    fn finish(&self, wrapper: &mut ResponseWrapper<'_>) -> io::Result<()> {
        if !wrapper.supports_processing() {
            if self.log_level.allows(Level::TRACE) {
                tracing::trace!(
                    middleware = %self.name,
                    content_type = %wrapper.content_type(),
                    encoding = ?wrapper.content_encoding(),
                    "Response not eligible for rewriting"
                );
            }
            return wrapper.write_buffered();
        }

        let content = match wrapper.get_content() {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(middleware = %self.name, error = %e, "Error loading content");
                return wrapper.write_buffered();
            }
        };

        if content.is_empty() {
            return Ok(());
        }

        let rewritten = self.engine.apply(&content);

        if self.log_level.allows(Level::TRACE) {
            tracing::trace!(
                middleware = %self.name,
                before = %String::from_utf8_lossy(&content),
                after = %String::from_utf8_lossy(&rewritten),
                "Rewrote body"
            );
        }

        let encoding = wrapper.content_encoding();
        wrapper.set_content(&rewritten, encoding)
    }

    async fn recover<F, T>(&self, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
        T: Default,
    {
        match AssertUnwindSafe(work).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) if e.is_abort() => Ok(T::default()),
            Ok(Err(e)) => Err(e),
            Err(panic) => {
                if !panic.is::<AbortHandler>() {
                    tracing::error!(
                        middleware = %self.name,
                        panic = %panic_message(panic.as_ref()),
                        "Recovered from panic while rewriting response"
                    );
                }
                Ok(T::default())
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}

#[async_trait]
impl Middleware for RewriteBody {
    async fn call(&self, req: Request<Body>, next: Next) -> Result<Response<Body>> {
        self.recover(async move {
            if !self.classifier.supports_processing(&req) {
                return next.run(req).await;
            }

            let handler = NextHandler::new(next);
            let mut recorder = ResponseRecorder::new();
            self.intercept(&handler, &mut recorder, req).await?;
            Ok(recorder.into_response())
        })
        .await
    }
}

/// A [`RewriteBody`] decorating a sink-based handler
#[derive(Debug, Clone)]
pub struct RewriteBodyHandler {
    middleware: Arc<RewriteBody>,
    next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for RewriteBodyHandler {
    async fn serve(&self, sink: &mut dyn ResponseSink, req: Request<Body>) -> Result<()> {
        self.middleware
            .serve_with(self.next.as_ref(), sink, req)
            .await
    }
}
