// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Errors raised while reading, parsing and validating a [`ServerConfig`].
//!
//! [`ServerConfig`]: crate::ServerConfig

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Why a configuration could not be produced.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Configuration file does not exist: {}", path.display())]
    FileNotFound {
        /// Requested path.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("Cannot read configuration file {}: {source}", path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file extension names no supported format.
    #[error("Unsupported configuration extension `{extension}` (expected yaml, yml, toml or json)")]
    UnsupportedFormat {
        /// Offending extension.
        extension: String,
    },

    /// The document is not well-formed for its format, or does not match the
    /// schema.
    #[error("Malformed {format} configuration{}{}: {message}", source_label(path.as_deref()), line_label(*line))]
    Parse {
        /// `yaml`, `toml` or `json`.
        format: &'static str,
        /// Source file, when parsed from disk.
        path: Option<PathBuf>,
        /// 1-based line, when the parser reports one.
        line: Option<usize>,
        /// Parser message.
        message: String,
    },

    /// A field holds a value the runtime cannot work with.
    #[error("Invalid value for `{field}`: {message}")]
    Validation {
        /// Dotted field path, e.g. `server.max_connections`.
        field: String,
        /// What is wrong.
        message: String,
    },

    /// A numeric field lies outside its accepted range.
    #[error("`{field}` = {value} is outside {min}..={max}")]
    OutOfRange {
        /// Dotted field path.
        field: String,
        /// Rejected value.
        value: String,
        /// Inclusive lower bound.
        min: String,
        /// Inclusive upper bound.
        max: String,
    },

    /// An environment override could not be applied.
    #[error("Environment override {name} rejected: {message}")]
    InvalidEnvVar {
        /// Variable name.
        name: String,
        /// What was expected.
        message: String,
    },
}

fn source_label(path: Option<&Path>) -> String {
    path.map(|p| format!(" in {}", p.display())).unwrap_or_default()
}

fn line_label(line: Option<usize>) -> String {
    line.map(|l| format!(" at line {l}")).unwrap_or_default()
}

impl ConfigError {
    /// A document that failed to parse as `format`.
    pub fn malformed(format: &'static str, message: impl Into<String>) -> Self {
        Self::Parse {
            format,
            path: None,
            line: None,
            message: message.into(),
        }
    }

    /// Attaches the line reported by the parser to a parse error.
    pub fn with_line(mut self, at: usize) -> Self {
        if let Self::Parse { line, .. } = &mut self {
            *line = Some(at);
        }
        self
    }

    /// Attaches the source file to a parse error. Other variants pass through.
    pub fn in_file(mut self, file: &Path) -> Self {
        if let Self::Parse { path, .. } = &mut self {
            *path = Some(file.to_path_buf());
        }
        self
    }

    /// Creates a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a range error.
    pub fn out_of_range<T: std::fmt::Display>(
        field: impl Into<String>,
        value: T,
        min: T,
        max: T,
    ) -> Self {
        Self::OutOfRange {
            field: field.into(),
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }

    /// Creates an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a missing-file error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates an unsupported-extension error.
    pub fn unsupported_format(extension: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            extension: extension.into(),
        }
    }

    /// Creates an environment override error.
    pub fn invalid_env_var(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Returns the offending field for value errors.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } | Self::OutOfRange { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Returns `true` if the file could not be located or read.
    pub fn is_file_error(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::FileNotFound { .. })
    }

    /// Returns `true` if the document parsed but holds unusable values.
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::OutOfRange { .. })
    }
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
