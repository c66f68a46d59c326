// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Command-line surface of `uasrv`.
//!
//! Global options (`--config`, logging, quiet/verbose) apply to every
//! subcommand. Running with no subcommand is `uasrv run`.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use uasrv_config::LoggingConfig;

/// uasrv - OPC UA server runtime
///
/// Accepts OPC UA TCP connections, manages secure channels and sessions,
/// and publishes subscription notifications.
#[derive(Parser, Debug)]
#[command(
    name = "uasrv",
    version = uasrv_server::VERSION,
    about = "OPC UA server runtime",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// YAML, TOML or JSON file holding the server configuration
    #[arg(
        short,
        long,
        default_value = "uasrv.yaml",
        env = "UASRV_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, env = "UASRV_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Log format (text, json, compact); overrides the config file
    #[arg(long, env = "UASRV_LOG_FORMAT", global = true)]
    pub log_format: Option<LogFormat>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// What to do; `run` when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Listen for OPC UA TCP connections until interrupted
    Run(RunArgs),

    /// Check the configuration file without binding a socket
    Validate(ValidateArgs),

    /// Print crate and protocol versions
    Version,
}

/// `uasrv run` options.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Listen port, overriding `server.port`
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Bind address, overriding `server.bind_address`
    #[arg(short, long)]
    pub bind: Option<IpAddr>,
}

/// `uasrv validate` options.
#[derive(Args, Debug, Default, Clone)]
pub struct ValidateArgs {
    /// Print the effective configuration, defaults filled in
    #[arg(short, long)]
    pub show_config: bool,

    /// How to print the result
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// `--log-format` values, mirroring the config file's `logging.format`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Multi-field human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
    /// Single-line events
    Compact,
}

impl From<uasrv_config::LogFormat> for LogFormat {
    fn from(format: uasrv_config::LogFormat) -> Self {
        match format {
            uasrv_config::LogFormat::Text => Self::Text,
            uasrv_config::LogFormat::Json => Self::Json,
            uasrv_config::LogFormat::Compact => Self::Compact,
        }
    }
}

/// `validate --format` values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Summary lines
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
    /// TOML, loadable as a config file
    Toml,
}

impl Cli {
    /// Parses `std::env::args`, exiting with usage on error.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the subcommand, `run` with no overrides when omitted.
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Run(RunArgs::default()))
    }

    /// Reads the `logging` section of the config file, falling back to
    /// defaults when the file is missing or invalid.
    ///
    /// Errors surface later, when the command loads the file for real.
    pub fn file_logging(&self) -> LoggingConfig {
        uasrv_config::load_config(&self.config)
            .map(|config| config.logging)
            .unwrap_or_default()
    }

    /// Resolves the log level: `-q`/`-v` first, then `--log-level`, then the
    /// config file.
    pub fn effective_log_level(&self, file: &LoggingConfig) -> String {
        if self.quiet {
            "warn".to_string()
        } else if self.verbose {
            "debug".to_string()
        } else {
            self.log_level
                .clone()
                .unwrap_or_else(|| file.level.as_str().to_string())
        }
    }

    /// Resolves the log format: `--log-format`, then the config file.
    pub fn effective_log_format(&self, file: &LoggingConfig) -> LogFormat {
        self.log_format.unwrap_or_else(|| file.format.into())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uasrv_config::LogLevel;

    #[test]
    fn test_no_subcommand_means_run() {
        let cli = Cli::parse_from(["uasrv"]);
        assert!(cli.command.is_none());
        assert!(matches!(cli.effective_command(), Commands::Run(_)));
    }

    #[test]
    fn test_run_overrides() {
        let cli = Cli::parse_from(["uasrv", "run", "--port", "4841", "--bind", "127.0.0.1"]);
        let Some(Commands::Run(args)) = cli.command else {
            panic!("run not parsed");
        };
        assert_eq!(args.port, Some(4841));
        assert_eq!(args.bind, Some("127.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_validate_flags() {
        let cli = Cli::parse_from(["uasrv", "validate", "--show-config", "-f", "toml"]);
        let Some(Commands::Validate(args)) = cli.command else {
            panic!("validate not parsed");
        };
        assert!(args.show_config);
        assert_eq!(args.format, OutputFormat::Toml);
    }

    #[test]
    fn test_config_path() {
        let cli = Cli::parse_from(["uasrv", "-c", "/etc/uasrv/uasrv.yaml"]);
        assert_eq!(cli.config, PathBuf::from("/etc/uasrv/uasrv.yaml"));
    }

    #[test]
    fn test_log_level_precedence() {
        let file = LoggingConfig {
            level: LogLevel::Trace,
            ..Default::default()
        };

        let cli = Cli::parse_from(["uasrv"]);
        assert_eq!(cli.effective_log_level(&file), "trace");

        let cli = Cli::parse_from(["uasrv", "-l", "error"]);
        assert_eq!(cli.effective_log_level(&file), "error");

        let cli = Cli::parse_from(["uasrv", "-q", "-l", "error"]);
        assert_eq!(cli.effective_log_level(&file), "warn");

        let cli = Cli::parse_from(["uasrv", "-v"]);
        assert_eq!(cli.effective_log_level(&file), "debug");
    }

    #[test]
    fn test_log_format_falls_back_to_file() {
        let file = LoggingConfig {
            format: uasrv_config::LogFormat::Json,
            ..Default::default()
        };
        let cli = Cli::parse_from(["uasrv"]);
        assert_eq!(cli.effective_log_format(&file), LogFormat::Json);

        let cli = Cli::parse_from(["uasrv", "--log-format", "compact"]);
        assert_eq!(cli.effective_log_format(&file), LogFormat::Compact);
    }
}
