//! Byte-level regex rewriting

use regex::bytes::{NoExpand, Regex};
use std::borrow::Cow;
use themepark_core::{Error, Result};

/// One compiled `(pattern, replacement)` pair.
///
/// Replacements expand `$0`, `$1`, `${name}` like [`Regex::replace_all`]
/// unless built with [`RewriteRule::literal`].
#[derive(Debug, Clone)]
pub struct RewriteRule {
    regex: Regex,
    replacement: Vec<u8>,
    limit: usize,
    expand: bool,
}

impl RewriteRule {
    /// Compile `pattern`; the replacement may reference capture groups
    pub fn new(pattern: &str, replacement: impl Into<Vec<u8>>) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::Config(format!("Invalid rewrite regex '{pattern}': {e}")))?;

        Ok(Self {
            regex,
            replacement: replacement.into(),
            limit: 0,
            expand: true,
        })
    }

    /// Compile `pattern`; the replacement is inserted verbatim
    pub fn literal(pattern: &str, replacement: impl Into<Vec<u8>>) -> Result<Self> {
        let mut rule = Self::new(pattern, replacement)?;
        rule.expand = false;
        Ok(rule)
    }

    /// Replace at most `limit` matches; `0` replaces all of them
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Source pattern
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Replacement bytes
    pub fn replacement(&self) -> &[u8] {
        &self.replacement
    }

    /// Rewrite `input`, borrowing it back unchanged when nothing matched
    pub fn apply<'a>(&self, input: &'a [u8]) -> Cow<'a, [u8]> {
        if self.expand {
            self.regex
                .replacen(input, self.limit, self.replacement.as_slice())
        } else {
            self.regex
                .replacen(input, self.limit, NoExpand(&self.replacement))
        }
    }
}

/// Ordered rewrite rules, each applied to the previous rule's output
#[derive(Debug, Clone, Default)]
pub struct RewriteEngine {
    rules: Vec<RewriteRule>,
}

impl RewriteEngine {
    /// Engine applying `rules` in order
    pub fn new(rules: Vec<RewriteRule>) -> Self {
        Self { rules }
    }

    /// Rules in application order
    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    /// Whether there is nothing to apply
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every rule over `body`
    pub fn apply(&self, body: &[u8]) -> Vec<u8> {
        let mut current = body.to_vec();
        for rule in &self.rules {
            let rewritten = match rule.apply(&current) {
                Cow::Owned(rewritten) => Some(rewritten),
                Cow::Borrowed(_) => None,
            };
            if let Some(rewritten) = rewritten {
                current = rewritten;
            }
        }
        current
    }
}
