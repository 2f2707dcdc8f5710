//! # Theme-park Proxy
//!
//! A minimal reverse proxy host for running the rewriting middleware locally:
//! - One upstream app, with `X-Forwarded-*` headers
//! - Upstream request timeout
//! - The configured middleware chain on every request
//! - Graceful shutdown on SIGINT/SIGTERM

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod client;
pub mod proxy;
pub mod server;
pub mod shutdown;

pub use client::HttpClient;
pub use proxy::{ClientAddr, HttpProxy};
pub use server::Server;
pub use shutdown::{ShutdownSignal, SignalHandler};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::HttpClient;
    pub use crate::proxy::HttpProxy;
    pub use crate::server::Server;
    pub use crate::shutdown::{ShutdownSignal, SignalHandler};
}
