//! Response sinks and their optional capabilities
//!
//! A [`ResponseSink`] is the write side of one HTTP response: a mutable
//! header map, a one-shot status commit and a byte stream. Some sinks can
//! also hand over the raw connection, flush to the client or report that the
//! client went away; those capabilities are probed at runtime through
//! [`ResponseSink::hijacker`], [`ResponseSink::flusher`] and
//! [`ResponseSink::close_notifier`] instead of being required of every sink.

use crate::middleware::Body;
use crate::{Error, Result};
use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Response, StatusCode};
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

/// Raw bidirectional connection handed out by [`Hijacker::hijack`]
pub trait HijackedIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> HijackedIo for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Takes over the underlying connection
pub trait Hijacker: Send {
    /// Detach the connection from the HTTP machinery
    fn hijack(&mut self) -> Result<Box<dyn HijackedIo>>;
}

/// Pushes buffered data to the client
pub trait Flusher: Send {
    /// Flush whatever has been written so far
    fn flush(&mut self) -> Result<()>;
}

/// Signals that the client connection has gone away
pub trait CloseNotifier: Send {
    /// Token cancelled once the client disconnects
    fn close_notify(&self) -> Result<CancellationToken>;
}

/// Write side of an HTTP response
pub trait ResponseSink: Send {
    /// Response headers; only meaningful until [`ResponseSink::write_header`]
    fn headers(&self) -> &HeaderMap;

    /// Mutable response headers
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Commit the status line and current headers
    fn write_header(&mut self, status: StatusCode);

    /// Write body bytes, committing `200 OK` first if needed
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Connection hijacking, when the sink supports it
    fn hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        None
    }

    /// Explicit flushing, when the sink supports it
    fn flusher(&mut self) -> Option<&mut dyn Flusher> {
        None
    }

    /// Client close notification, when the sink supports it
    fn close_notifier(&self) -> Option<&dyn CloseNotifier> {
        None
    }
}

/// In-memory sink that records everything written to it.
///
/// Headers are snapshotted at commit time, so changes made after
/// [`ResponseSink::write_header`] do not reach the recorded response.
#[derive(Default)]
pub struct ResponseRecorder {
    headers: HeaderMap,
    committed: Option<(StatusCode, HeaderMap)>,
    body: BytesMut,
    flushed: bool,
    close: Option<CancellationToken>,
}

impl ResponseRecorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Report client disconnects through `token`
    pub fn with_close_notify(mut self, token: CancellationToken) -> Self {
        self.close = Some(token);
        self
    }

    /// Committed status, if any
    pub fn status(&self) -> Option<StatusCode> {
        self.committed.as_ref().map(|(status, _)| *status)
    }

    /// Whether headers were committed
    pub fn is_committed(&self) -> bool {
        self.committed.is_some()
    }

    /// Headers as the client would see them
    pub fn committed_headers(&self) -> &HeaderMap {
        match &self.committed {
            Some((_, headers)) => headers,
            None => &self.headers,
        }
    }

    /// Body bytes written so far
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Whether a flush was requested
    pub fn flushed(&self) -> bool {
        self.flushed
    }

    /// Convert the recording into a response; uncommitted recordings become `200 OK`
    pub fn into_response(self) -> Response<Body> {
        let (status, headers) = self
            .committed
            .unwrap_or((StatusCode::OK, self.headers));

        let mut response = Response::new(Body::new(self.body.freeze()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

impl ResponseSink for ResponseRecorder {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.committed.is_some() {
            tracing::trace!(status = %status, "Superfluous write_header call ignored");
            return;
        }
        self.committed = Some((status, self.headers.clone()));
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.committed.is_none() {
            self.write_header(StatusCode::OK);
        }
        self.body.extend_from_slice(data);
        Ok(data.len())
    }

    fn flusher(&mut self) -> Option<&mut dyn Flusher> {
        Some(self)
    }

    fn close_notifier(&self) -> Option<&dyn CloseNotifier> {
        if self.close.is_some() {
            Some(self)
        } else {
            None
        }
    }
}

impl Flusher for ResponseRecorder {
    fn flush(&mut self) -> Result<()> {
        if self.committed.is_none() {
            self.write_header(StatusCode::OK);
        }
        self.flushed = true;
        Ok(())
    }
}

impl CloseNotifier for ResponseRecorder {
    fn close_notify(&self) -> Result<CancellationToken> {
        self.close
            .clone()
            .ok_or(Error::Unsupported("close notification"))
    }
}

impl fmt::Debug for ResponseRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseRecorder")
            .field("status", &self.status())
            .field("headers", self.committed_headers())
            .field("body_len", &self.body.len())
            .field("flushed", &self.flushed)
            .finish()
    }
}

/// Copy a complete response into a sink: headers, status, then body.
pub fn write_response(
    sink: &mut dyn ResponseSink,
    parts: http::response::Parts,
    body: Bytes,
) -> Result<()> {
    for (name, value) in parts.headers.iter() {
        sink.headers_mut().append(name.clone(), value.clone());
    }
    sink.write_header(parts.status);

    if !body.is_empty() {
        sink.write(&body)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{CONTENT_TYPE, LAST_MODIFIED};
    use http::HeaderValue;
    use http_body_util::BodyExt;

    #[test]
    fn test_write_commits_ok() {
        let mut recorder = ResponseRecorder::new();
        assert!(!recorder.is_committed());

        recorder.write(b"hello").unwrap();

        assert_eq!(recorder.status(), Some(StatusCode::OK));
        assert_eq!(recorder.body(), b"hello");
    }

    #[test]
    fn test_headers_snapshot_at_commit() {
        let mut recorder = ResponseRecorder::new();
        recorder
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        recorder.write_header(StatusCode::NOT_FOUND);
        recorder
            .headers_mut()
            .insert(LAST_MODIFIED, HeaderValue::from_static("yesterday"));
        recorder.write_header(StatusCode::OK);

        assert_eq!(recorder.status(), Some(StatusCode::NOT_FOUND));
        assert!(recorder.committed_headers().contains_key(CONTENT_TYPE));
        assert!(!recorder.committed_headers().contains_key(LAST_MODIFIED));
    }

    #[test]
    fn test_capability_probing() {
        let mut recorder = ResponseRecorder::new();
        assert!(recorder.hijacker().is_none());
        assert!(recorder.close_notifier().is_none());

        recorder.flusher().unwrap().flush().unwrap();
        assert!(recorder.flushed());

        let token = CancellationToken::new();
        let recorder = ResponseRecorder::new().with_close_notify(token.clone());
        let notified = recorder.close_notifier().unwrap().close_notify().unwrap();
        token.cancel();
        assert!(notified.is_cancelled());
    }

    #[tokio::test]
    async fn test_into_response() {
        let mut recorder = ResponseRecorder::new();
        recorder.write_header(StatusCode::CREATED);
        recorder.write(b"abc").unwrap();
        recorder.write(b"def").unwrap();

        let response = recorder.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"abcdef");
    }

    #[test]
    fn test_write_response_copies_parts() {
        let response = Response::builder()
            .status(StatusCode::ACCEPTED)
            .header(CONTENT_TYPE, "text/plain")
            .body(())
            .unwrap();
        let (parts, _) = response.into_parts();

        let mut recorder = ResponseRecorder::new();
        write_response(&mut recorder, parts, Bytes::from_static(b"payload")).unwrap();

        assert_eq!(recorder.status(), Some(StatusCode::ACCEPTED));
        assert_eq!(
            recorder.committed_headers().get(CONTENT_TYPE).unwrap(),
            "text/plain"
        );
        assert_eq!(recorder.body(), b"payload");
    }
}
