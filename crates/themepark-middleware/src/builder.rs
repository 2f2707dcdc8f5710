//! Middleware chain builder
//!
//! This module provides a builder pattern for constructing middleware chains.

use crate::body_rewrite::{RewriteBody, RewriteBodyConfig};
use crate::theme_park::ThemeParkConfig;
use std::sync::Arc;
use themepark_core::{Middleware, Result};

/// Middleware chain builder
#[derive(Debug, Default)]
pub struct MiddlewareBuilder {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareBuilder {
    /// Create a new middleware builder
    #[must_use]
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    /// Add theme injection for one app
    pub fn with_theme_park(mut self, config: &ThemeParkConfig) -> Result<Self> {
        self.middlewares.push(Arc::new(config.build()?));
        Ok(self)
    }

    /// Add generic body rewriting
    pub fn with_rewrite_body(mut self, config: RewriteBodyConfig) -> Result<Self> {
        self.middlewares.push(Arc::new(RewriteBody::new(config)?));
        Ok(self)
    }

    /// Add custom middleware
    #[must_use]
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Build the middleware chain
    ///
    /// Returns an `Arc<[Arc<dyn Middleware>]>` for efficient sharing.
    #[must_use]
    pub fn build(self) -> Arc<[Arc<dyn Middleware>]> {
        self.middlewares.into()
    }

    /// Get the number of middlewares in the chain
    #[must_use]
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Check if the chain is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}
