//! # Theme-park Middleware
//!
//! Response rewriting for self-hosted web apps behind a reverse proxy:
//! - Request classification (monitored types/methods, WebSocket bypass)
//! - A buffering response interceptor that decodes and re-encodes bodies
//! - Ordered byte-level regex rewrites
//! - Theme stylesheet injection and CSP host allow-listing

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod apps;
pub mod body_rewrite;
pub mod builder;
pub mod csp;
pub mod interceptor;
pub mod logging;
pub mod monitoring;
pub mod request;
pub mod rewrite;
pub mod theme_park;
pub mod themes;

pub use body_rewrite::{Rewrite, RewriteBody, RewriteBodyConfig, RewriteBodyHandler};
pub use builder::MiddlewareBuilder;
pub use csp::CspRewriter;
pub use interceptor::{InterceptState, ResponseWrapper};
pub use logging::LogLevel;
pub use monitoring::MonitoringConfig;
pub use request::{encoding_target, RequestClassifier};
pub use rewrite::{RewriteEngine, RewriteRule};
pub use theme_park::ThemeParkConfig;

// Re-export core middleware types from themepark-core
pub use themepark_core::middleware::{Middleware, Next};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::body_rewrite::{RewriteBody, RewriteBodyConfig};
    pub use crate::builder::MiddlewareBuilder;
    pub use crate::monitoring::MonitoringConfig;
    pub use crate::theme_park::ThemeParkConfig;
    pub use themepark_core::middleware::{Middleware, Next};
}
