//! Per-instance diagnostic verbosity
//!
//! Every rewriting middleware carries its own [`LogLevel`] so that two
//! instances in the same process can log at different verbosities. The level
//! only gates the verbose dumps the middleware emits itself; the global
//! `tracing` subscriber still decides what is finally printed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::Level;

/// Verbosity of one middleware instance.
///
/// Configured either numerically (`-1` most verbose, `0` info, `1` warn,
/// `2` error) or by name (`"trace"` .. `"error"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLogLevel", into = "RawLogLevel")]
pub struct LogLevel(Level);

impl LogLevel {
    /// Most verbose level
    pub const TRACE: Self = Self(Level::TRACE);
    /// Debug level
    pub const DEBUG: Self = Self(Level::DEBUG);
    /// Default level
    pub const INFO: Self = Self(Level::INFO);
    /// Warnings only
    pub const WARN: Self = Self(Level::WARN);
    /// Errors only
    pub const ERROR: Self = Self(Level::ERROR);

    /// Map a numeric verbosity; anything below zero is the most verbose
    pub fn from_verbosity(verbosity: i64) -> Self {
        match verbosity {
            i64::MIN..=-1 => Self::TRACE,
            0 => Self::INFO,
            1 => Self::WARN,
            _ => Self::ERROR,
        }
    }

    /// Underlying `tracing` level
    pub fn level(&self) -> Level {
        self.0
    }

    /// Whether events at `level` should be emitted by this instance
    pub fn allows(&self, level: Level) -> bool {
        // tracing orders levels so that more verbose compares greater
        level <= self.0
    }

    /// Name usable in an `EnvFilter` directive
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            _ => "error",
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::INFO
    }
}

impl From<Level> for LogLevel {
    fn from(level: Level) -> Self {
        Self(level)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(verbosity) = trimmed.parse::<i64>() {
            return Ok(Self::from_verbosity(verbosity));
        }

        Level::from_str(trimmed)
            .map(Self)
            .map_err(|_| format!("unknown log level '{s}'"))
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawLogLevel {
    Verbosity(i64),
    Name(String),
}

impl TryFrom<RawLogLevel> for LogLevel {
    type Error = String;

    fn try_from(raw: RawLogLevel) -> Result<Self, Self::Error> {
        match raw {
            RawLogLevel::Verbosity(verbosity) => Ok(Self::from_verbosity(verbosity)),
            RawLogLevel::Name(name) => name.parse(),
        }
    }
}

impl From<LogLevel> for RawLogLevel {
    fn from(level: LogLevel) -> Self {
        RawLogLevel::Name(level.as_str().to_string())
    }
}
