//! # Theme-park Core
//!
//! Core types, traits, and error handling for the theme-park rewriting proxy.
//!
//! This crate provides the foundational abstractions used throughout the proxy:
//! - Error types
//! - Middleware trait and chain
//! - Response sinks with optional capabilities (hijack, flush, close notify)
//! - Sink-based handlers and the bridge from a middleware chain

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod error;
pub mod handler;
pub mod middleware;
pub mod sink;

pub use error::{AbortHandler, Error, Result};
pub use handler::{Handler, NextHandler};
pub use middleware::{handler_fn, Body, HandlerFn, Middleware, Next, ResponseFuture};
pub use sink::{
    write_response, CloseNotifier, Flusher, HijackedIo, Hijacker, ResponseRecorder, ResponseSink,
};

// Re-export commonly used HTTP types
pub use bytes::Bytes;
pub use http::{Method, Request, Response, StatusCode};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::handler::{Handler, NextHandler};
    pub use crate::middleware::{Body, Middleware, Next};
    pub use crate::sink::{ResponseRecorder, ResponseSink};
}
