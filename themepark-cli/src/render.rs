//! Run a local page through the middleware chain as if an upstream served it

use bytes::Bytes;
use http::header::{ACCEPT, ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, Request, Response, StatusCode};
use http_body_util::BodyExt;
use std::sync::Arc;
use themepark_compression::Encoding;
use themepark_core::{handler_fn, Body, Error, Middleware, Next};
use themepark_middleware::encoding_target;

/// Outcome of one render
#[derive(Debug)]
pub(crate) struct Rendered {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    /// Coding the upstream picked for the response
    pub(crate) encoding: Encoding,
    /// Decoded body
    pub(crate) body: Vec<u8>,
}

/// Serve `page` through `chain` for one GET request.
///
/// The fake upstream compresses with whatever the (filtered) request
/// `Accept-Encoding` prefers, so `accept_encoding` exercises the same
/// decode and re-encode path as a real app would.
pub(crate) async fn render(
    chain: Arc<[Arc<dyn Middleware>]>,
    page: Bytes,
    content_type: &str,
    accept_encoding: Option<&str>,
) -> anyhow::Result<Rendered> {
    let content_type = content_type.to_string();
    let next = Next::with_handler(
        chain,
        handler_fn(move |req: Request<Body>| {
            let result = serve_page(&req, &page, &content_type);
            async move { result }
        }),
    );

    let mut req = Request::builder().uri("/").header(ACCEPT, "text/html");
    if let Some(accept_encoding) = accept_encoding {
        req = req.header(ACCEPT_ENCODING, accept_encoding);
    }
    let response = next.run(req.body(Body::new(Bytes::new()))?).await?;

    let (parts, body) = response.into_parts();
    let encoding = parts
        .headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(Encoding::from_name)
        .unwrap_or(Encoding::Identity);
    let body = body.collect().await?.to_bytes();

    Ok(Rendered {
        status: parts.status,
        headers: parts.headers,
        encoding,
        body: encoding.decode(&body[..])?,
    })
}

fn serve_page(
    req: &Request<Body>,
    page: &[u8],
    content_type: &str,
) -> themepark_core::Result<Response<Body>> {
    let encoding = encoding_target(req.headers());
    let body = encoding
        .encode(page)
        .map_err(|e| Error::Internal(e.to_string()))?;

    let mut response = Response::builder()
        .header(CONTENT_TYPE, content_type)
        .header(CONTENT_LENGTH, body.len());
    if encoding != Encoding::Identity {
        if let Some(name) = encoding.name() {
            response = response.header(CONTENT_ENCODING, name);
        }
    }

    Ok(response.body(Body::new(body))?)
}
