// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the uasrv binary.
//!
//! Exit codes follow `sysexits.h`:
//!
//! | Error | Code |
//! |---|---|
//! | usage | 64 |
//! | listen address unavailable | 69 |
//! | internal (logging, server) | 70 |
//! | output rendering | 74 |
//! | configuration | 78 |

use thiserror::Error;
use uasrv_config::ConfigError;
use uasrv_core::{ListenerError, UaError};

/// Result alias for the binary.
pub type BinResult<T> = Result<T, BinError>;

/// Exit code for command-line misuse.
pub const EXIT_USAGE: i32 = 64;
/// Exit code when the listen address cannot be bound.
pub const EXIT_UNAVAILABLE: i32 = 69;
/// Exit code for internal failures.
pub const EXIT_SOFTWARE: i32 = 70;
/// Exit code when output cannot be produced.
pub const EXIT_IOERR: i32 = 74;
/// Exit code for configuration errors.
pub const EXIT_CONFIG: i32 = 78;

/// Errors that end the process.
#[derive(Debug, Error)]
pub enum BinError {
    /// The command line is inconsistent.
    #[error("{0}")]
    Usage(String),

    /// The log subscriber could not be installed.
    #[error("Logging setup failed: {0}")]
    Logging(String),

    /// The configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The server failed to start or stop.
    #[error(transparent)]
    Server(#[from] UaError),

    /// Command output could not be rendered.
    #[error("Cannot render {format} output: {message}")]
    Render {
        /// Output format.
        format: &'static str,
        /// Serializer message.
        message: String,
    },

    /// Another error with a description of what was being attempted.
    #[error("{context}: {source}")]
    WithContext {
        /// What was being attempted.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<BinError>,
    },
}

impl BinError {
    /// Creates a usage error.
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    /// Creates a logging setup error.
    pub fn logging(msg: impl Into<String>) -> Self {
        Self::Logging(msg.into())
    }

    /// Creates a rendering error.
    pub fn render(format: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Render {
            format,
            message: err.to_string(),
        }
    }

    /// Wraps the error with what was being attempted.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the process exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => EXIT_USAGE,
            Self::Config(_) => EXIT_CONFIG,
            Self::Server(UaError::Listener(ListenerError::Bind { .. })) => EXIT_UNAVAILABLE,
            Self::Server(UaError::Configuration(_)) => EXIT_CONFIG,
            Self::Logging(_) | Self::Server(_) => EXIT_SOFTWARE,
            Self::Render { .. } => EXIT_IOERR,
            Self::WithContext { source, .. } => source.exit_code(),
        }
    }
}

/// Prints the error and its causes to stderr, one per line.
pub fn report_error(error: &BinError) {
    eprintln!("uasrv: {error}");
    let mut cause = std::error::Error::source(error);
    while let Some(inner) = cause {
        eprintln!("  because: {inner}");
        cause = inner.source();
    }
}

/// Reports the error and exits with its exit code.
pub fn report_error_and_exit(error: BinError) -> ! {
    report_error(&error);
    std::process::exit(error.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_exit_code() {
        let err = BinError::usage("no configuration given").with_context("building runtime");
        assert_eq!(err.to_string(), "building runtime: no configuration given");
        assert_eq!(err.exit_code(), EXIT_USAGE);
    }

    #[test]
    fn test_config_errors_exit_with_config_code() {
        let err = BinError::from(ConfigError::validation("server.port", "cannot be zero"));
        assert_eq!(err.exit_code(), EXIT_CONFIG);
        assert_eq!(err.to_string(), "Invalid value for `server.port`: cannot be zero");
    }

    #[test]
    fn test_bind_failure_is_unavailable() {
        let bind = ListenerError::Bind {
            address: "0.0.0.0:4840".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(BinError::from(UaError::from(bind)).exit_code(), EXIT_UNAVAILABLE);
        assert_eq!(
            BinError::from(UaError::from(ListenerError::ShuttingDown)).exit_code(),
            EXIT_SOFTWARE
        );
    }

    #[test]
    fn test_render_error() {
        let err = BinError::render("toml", "unsupported type");
        assert_eq!(err.to_string(), "Cannot render toml output: unsupported type");
        assert_eq!(err.exit_code(), EXIT_IOERR);
    }
}
