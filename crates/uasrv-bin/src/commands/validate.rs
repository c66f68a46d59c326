// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use uasrv_config::{ConfigError, ServerConfig};

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};

/// Loads and validates the configuration file, then prints a summary.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let config_path = &cli.config;

    if !config_path.exists() {
        return Err(ConfigError::file_not_found(config_path).into());
    }

    let config = uasrv_config::load_config(config_path)
        .map_err(|e| BinError::from(e).with_context("Configuration validation failed"))?;
    let warnings = collect_warnings(&config);

    match args.format {
        OutputFormat::Text => {
            println!("✓ Configuration is valid: {}", config_path.display());
            println!();
            println!("Summary:");
            println!("  Listen:            {}", config.server.socket_addr());
            println!("  Max connections:   {}", config.server.max_connections);
            println!("  Max sessions:      {}", config.session.max_sessions);
            println!(
                "  Session timeout:   {}..{} ms",
                config.session.min_timeout_ms, config.session.max_timeout_ms
            );
            println!(
                "  Subscriptions:     {} per session",
                config.subscription.max_subscriptions_per_session
            );
            println!("  Log:               {} / {}", config.logging.level.as_str(), config.logging.format.as_str());

            if !warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &warnings {
                    println!("  ⚠ {}", warning);
                }
            }

            if args.show_config {
                println!();
                println!("Parsed configuration:");
                println!("{}", to_toml(&config)?);
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "summary": {
                    "listen": config.server.socket_addr().to_string(),
                    "max_connections": config.server.max_connections,
                    "max_sessions": config.session.max_sessions,
                    "max_subscriptions_per_session": config.subscription.max_subscriptions_per_session,
                },
                "warnings": warnings,
                "config": if args.show_config { Some(&config) } else { None },
            });
            let rendered = serde_json::to_string_pretty(&output)
                .map_err(|e| BinError::render("json", e))?;
            println!("{}", rendered);
        }
        OutputFormat::Toml => {
            println!("# valid: {}", config_path.display());
            for warning in &warnings {
                println!("# warning: {}", warning);
            }
            if args.show_config {
                println!("{}", to_toml(&config)?);
            }
        }
    }

    Ok(())
}

/// Returns settings that are valid but likely unintended.
fn collect_warnings(config: &ServerConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.session.max_sessions < config.server.max_connections {
        warnings.push(format!(
            "session.max_sessions ({}) is below server.max_connections ({}); some channels can never hold a session",
            config.session.max_sessions, config.server.max_connections
        ));
    }

    if config.session.housekeeping_interval_ms > config.session.min_timeout_ms {
        warnings.push(format!(
            "session.housekeeping_interval_ms ({}) exceeds session.min_timeout_ms ({}); expiry will lag",
            config.session.housekeeping_interval_ms, config.session.min_timeout_ms
        ));
    }

    if config.server.bind_address.is_unspecified() {
        warnings.push(format!(
            "server.bind_address is {}; the server listens on every interface",
            config.server.bind_address
        ));
    }

    warnings
}

fn to_toml(config: &ServerConfig) -> BinResult<String> {
    toml::to_string_pretty(config)
        .map_err(|e| BinError::render("toml", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_default_config_warns_about_bind_address() {
        let warnings = collect_warnings(&ServerConfig::default());
        assert!(warnings.iter().any(|w| w.contains("bind_address")));
    }

    #[test]
    fn test_session_limit_warning() {
        let mut config = ServerConfig::default();
        config.server.max_connections = 10;
        config.session.max_sessions = 2;
        let warnings = collect_warnings(&config);
        assert!(warnings.iter().any(|w| w.contains("max_sessions")));
    }

    #[test]
    fn test_rendered_toml_round_trips() {
        let config = ServerConfig::default();
        let rendered = to_toml(&config).unwrap();
        let parsed = uasrv_config::load_config_str(&rendered, uasrv_config::ConfigFormat::Toml).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
    }

    #[test]
    fn test_validate_missing_file() {
        let cli = Cli::parse_from(["uasrv", "-c", "/nonexistent/uasrv.yaml", "validate"]);
        let err = validate(&cli, ValidateArgs::default()).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
    }

    #[test]
    fn test_validate_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "server:\n  port: 4842\n  bind_address: 127.0.0.1").unwrap();

        let path = file.path().to_string_lossy().to_string();
        let cli = Cli::parse_from(["uasrv", "-c", path.as_str(), "validate"]);
        let args = ValidateArgs {
            show_config: true,
            format: OutputFormat::Json,
        };
        assert!(validate(&cli, args).is_ok());
    }
}
