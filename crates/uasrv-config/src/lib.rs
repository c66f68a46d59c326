// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uasrv-config
//!
//! Configuration management for the uasrv OPC UA server runtime.
//!
//! ## Features
//!
//! - **Schema Definition**: every runtime limit with defaults and validation
//! - **Multi-Format Support**: YAML, TOML, and JSON configuration files
//! - **Environment Overrides**: `UASRV_*` variables and `${VAR:default}` placeholders
//!
//! ## Quick Start
//!
//! ```no_run
//! use uasrv_config::loader::load_config;
//!
//! let config = load_config("uasrv.yaml").unwrap();
//!
//! println!("Listening on {}", config.server.socket_addr());
//! println!("Max channels: {}", config.server.max_connections);
//! ```
//!
//! ## Configuration Schema
//!
//! - `server` - listener address, channel cap, handshake timeout, frame limit
//! - `secure_channel` - security token lifetime bounds
//! - `session` - session count, timeout bounds, continuation points
//! - `subscription` - publishing interval and counter bounds, per-session limits
//! - `monitored_item` - sampling interval and queue bounds
//! - `logging` - level and output format
//!
//! Values in config files can reference environment variables:
//!
//! ```yaml
//! server:
//!   port: "${UA_PORT:4840}"
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod error;
pub mod loader;
pub mod schema;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_config_str, ConfigFormat, ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::{
    LogFormat, LogLevel, LoggingConfig, MonitoredItemConfig, NetworkConfig, SecureChannelConfig,
    ServerConfig, SessionConfig, SubscriptionConfig,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
