//! Buffering response interceptor
//!
//! [`ResponseWrapper`] sits between a downstream handler and the real
//! response sink. Header commits go through immediately (minus the headers a
//! rewrite would invalidate) while body bytes are held back until the
//! orchestrator decides whether to rewrite them.

use crate::csp::CspRewriter;
use crate::logging::LogLevel;
use crate::monitoring::MonitoringConfig;
use bytes::BytesMut;
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED};
use http::{HeaderMap, StatusCode};
use std::fmt;
use std::io;
use themepark_compression::{CodecError, Encoding};
use themepark_core::{
    CloseNotifier, Error, Flusher, HijackedIo, Hijacker, ResponseSink, Result,
};
use tokio_util::sync::CancellationToken;
use tracing::Level;

/// Lifecycle of one intercepted response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptState {
    /// Nothing committed yet
    NotStarted,
    /// Status and headers forwarded to the real sink
    HeaderCommitted,
    /// Body bytes held in the buffer
    BodyBuffered,
    /// Final body written to the real sink
    Finalized,
}

/// Response sink decorator that buffers the body of one response
pub struct ResponseWrapper<'a> {
    inner: &'a mut dyn ResponseSink,
    monitoring: &'a MonitoringConfig,
    csp: Option<&'a CspRewriter>,
    last_modified: bool,
    log_level: LogLevel,
    buffer: BytesMut,
    status: Option<StatusCode>,
    state: InterceptState,
    hijacked: bool,
}

impl<'a> ResponseWrapper<'a> {
    /// Wrap `inner`, judging eligibility with `monitoring`
    pub fn new(inner: &'a mut dyn ResponseSink, monitoring: &'a MonitoringConfig) -> Self {
        Self {
            inner,
            monitoring,
            csp: None,
            last_modified: false,
            log_level: LogLevel::default(),
            buffer: BytesMut::new(),
            status: None,
            state: InterceptState::NotStarted,
            hijacked: false,
        }
    }

    /// Keep the downstream `Last-Modified` header instead of dropping it
    #[must_use]
    pub fn with_last_modified(mut self, keep: bool) -> Self {
        self.last_modified = keep;
        self
    }

    /// Rewrite `Content-Security-Policy` on commit for monitored content types
    #[must_use]
    pub fn with_csp(mut self, csp: Option<&'a CspRewriter>) -> Self {
        self.csp = csp;
        self
    }

    /// Verbosity for this response's diagnostics
    #[must_use]
    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> InterceptState {
        self.state
    }

    /// Committed status, if any
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Whether the downstream handler took over the connection
    pub fn is_hijacked(&self) -> bool {
        self.hijacked
    }

    /// Raw bytes written by the downstream handler
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Declared `Content-Type`, empty when absent
    pub fn content_type(&self) -> &str {
        header_str(self.inner.headers(), CONTENT_TYPE)
    }

    /// Coding the buffered bytes are declared to be in
    pub fn content_encoding(&self) -> Encoding {
        match self.inner.headers().get(CONTENT_ENCODING) {
            None => Encoding::Identity,
            Some(value) => value
                .to_str()
                .map(Encoding::from_name)
                .unwrap_or(Encoding::Passthrough),
        }
    }

    /// Whether the response, as the downstream handler declared it, can be
    /// rewritten: a monitored (or missing) content type in a coding the codec
    /// can round-trip.
    pub fn supports_processing(&self) -> bool {
        let content_type = self.content_type();
        let type_ok = content_type.is_empty() || self.monitoring.matches_type(content_type);
        type_ok && self.content_encoding().is_supported()
    }

    /// Decode the buffer according to the declared `Content-Encoding`
    pub fn get_content(&self) -> std::result::Result<Vec<u8>, CodecError> {
        self.content_encoding().decode(&self.buffer[..])
    }

    /// Encode `data` with `encoding` and write it to the real sink.
    ///
    /// If encoding fails nothing partial is written; the untouched buffer is
    /// sent instead so the client still gets the original response.
    pub fn set_content(&mut self, data: &[u8], encoding: Encoding) -> io::Result<()> {
        match encoding.encode(data) {
            Ok(encoded) => self.finalize(&encoded),
            Err(e) => {
                tracing::warn!(error = %e, "Unable to re-encode rewritten body, sending original");
                self.write_buffered()
            }
        }
    }

    /// Send the buffered bytes to the real sink unchanged
    pub fn write_buffered(&mut self) -> io::Result<()> {
        let buffered = self.buffer.split().freeze();
        self.finalize(&buffered)
    }

    fn finalize(&mut self, mut data: &[u8]) -> io::Result<()> {
        if self.state == InterceptState::NotStarted {
            self.write_header(StatusCode::OK);
        }

        while !data.is_empty() {
            match self.inner.write(data)? {
                0 => return Err(io::ErrorKind::WriteZero.into()),
                written => data = &data[written..],
            }
        }

        self.state = InterceptState::Finalized;
        Ok(())
    }
}

fn header_str(headers: &HeaderMap, name: http::header::HeaderName) -> &str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

impl ResponseSink for ResponseWrapper<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.state != InterceptState::NotStarted {
            return;
        }

        if !self.last_modified {
            self.inner.headers_mut().remove(LAST_MODIFIED);
        }
        // the body is about to change size
        self.inner.headers_mut().remove(CONTENT_LENGTH);

        if let Some(csp) = self.csp {
            let content_type = self.content_type();
            if content_type.is_empty() || self.monitoring.matches_type(content_type) {
                csp.apply(self.inner.headers_mut());
            }
        }

        if self.log_level.allows(Level::TRACE) {
            tracing::trace!(status = %status, headers = ?self.inner.headers(), "Committing intercepted headers");
        }

        self.inner.write_header(status);
        self.status = Some(status);
        self.state = InterceptState::HeaderCommitted;
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.state == InterceptState::NotStarted {
            self.write_header(StatusCode::OK);
        }
        if self.state == InterceptState::HeaderCommitted {
            self.state = InterceptState::BodyBuffered;
        }

        self.buffer.extend_from_slice(data);
        Ok(data.len())
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        Some(self)
    }

    fn flusher(&mut self) -> Option<&mut dyn Flusher> {
        Some(self)
    }

    fn close_notifier(&self) -> Option<&dyn CloseNotifier> {
        Some(self)
    }
}

impl Hijacker for ResponseWrapper<'_> {
    fn hijack(&mut self) -> Result<Box<dyn HijackedIo>> {
        let conn = match self.inner.hijacker() {
            Some(hijacker) => hijacker.hijack()?,
            None => return Err(Error::Unsupported("hijack")),
        };
        self.hijacked = true;
        Ok(conn)
    }
}

impl Flusher for ResponseWrapper<'_> {
    fn flush(&mut self) -> Result<()> {
        // a flush commits headers, so they must be fixed up first
        if !self.hijacked {
            self.write_header(self.status.unwrap_or(StatusCode::OK));
        }
        match self.inner.flusher() {
            Some(flusher) => flusher.flush(),
            None => Err(Error::Unsupported("flush")),
        }
    }
}

impl CloseNotifier for ResponseWrapper<'_> {
    fn close_notify(&self) -> Result<CancellationToken> {
        match self.inner.close_notifier() {
            Some(notifier) => notifier.close_notify(),
            None => Err(Error::Unsupported("close notification")),
        }
    }
}

impl fmt::Debug for ResponseWrapper<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseWrapper")
            .field("state", &self.state)
            .field("status", &self.status)
            .field("buffered", &self.buffer.len())
            .field("last_modified", &self.last_modified)
            .field("hijacked", &self.hijacked)
            .finish()
    }
}
