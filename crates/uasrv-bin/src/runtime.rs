// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Server runtime orchestration.
//!
//! - Configuration loading, overrides and validation
//! - Server start with lifecycle logging
//! - Graceful shutdown on signal

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};
use uasrv_config::{ServerConfig, load_config};
use uasrv_server::{ServerEvent, UaServer};

use crate::error::{BinError, BinResult};
use crate::shutdown::ShutdownCoordinator;

// =============================================================================
// ServerRuntime
// =============================================================================

/// Runs one server until shutdown is signaled.
pub struct ServerRuntime {
    config: ServerConfig,
    shutdown: ShutdownCoordinator,
}

impl ServerRuntime {
    /// Creates a new runtime.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            shutdown: ShutdownCoordinator::new(),
        }
    }

    /// Returns the effective configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the shutdown coordinator, for stopping the runtime without a
    /// signal.
    pub fn shutdown_coordinator(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Starts the server and blocks until shutdown completes.
    pub async fn run(self) -> BinResult<()> {
        info!(version = uasrv_server::VERSION, "Starting uasrv");

        let server = UaServer::new(self.config);
        server
            .observers()
            .register(Arc::new(|event: &ServerEvent| debug!(?event, "Server event")));

        let handle = server
            .start()
            .await
            .map_err(|e| BinError::from(e).with_context("Failed to start server"))?;
        info!(address = %handle.local_addr(), "uasrv is ready");

        let reason = self.shutdown.wait_for_shutdown().await;
        info!(%reason, "Closing channels and sessions");

        let stats = handle.stats();
        handle.shutdown().await?;

        info!(
            accepted = stats.accepted,
            refused = stats.refused,
            evicted = stats.evicted,
            deferred = stats.deferred,
            bytes_read = stats.total_bytes_read,
            bytes_written = stats.total_bytes_written,
            transactions = stats.total_transactions,
            "uasrv shutdown complete"
        );
        Ok(())
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`ServerRuntime`].
#[derive(Debug, Default)]
pub struct RuntimeBuilder {
    config_path: Option<PathBuf>,
    config: Option<ServerConfig>,
    port: Option<u16>,
    bind_address: Option<IpAddr>,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration file path.
    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the configuration directly.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Overrides the listen port.
    pub fn port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    /// Overrides the bind address.
    pub fn bind_address(mut self, address: Option<IpAddr>) -> Self {
        self.bind_address = address;
        self
    }

    /// Loads, overrides and validates the configuration.
    pub fn build(self) -> BinResult<ServerRuntime> {
        let mut config = match self.config {
            Some(config) => config,
            None => {
                let path = self
                    .config_path
                    .ok_or_else(|| BinError::usage("No configuration provided"))?;
                load_config(&path).map_err(|e| {
                    BinError::from(e).with_context(format!("Failed to load {}", path.display()))
                })?
            }
        };

        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(address) = self.bind_address {
            config.server.bind_address = address;
        }
        config.validate()?;

        Ok(ServerRuntime::new(config))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_builder_applies_overrides() {
        let runtime = RuntimeBuilder::new()
            .config(ServerConfig::default())
            .port(Some(4999))
            .bind_address(Some("127.0.0.1".parse().unwrap()))
            .build()
            .unwrap();

        assert_eq!(runtime.config().server.port, 4999);
        assert_eq!(runtime.config().server.bind_address.to_string(), "127.0.0.1");
    }

    #[test]
    fn test_builder_requires_config() {
        let err = RuntimeBuilder::new().build().err().unwrap();
        assert_eq!(err.exit_code(), crate::error::EXIT_USAGE);
    }

    #[test]
    fn test_builder_loads_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[server]\nport = 4850\nmax_connections = 7").unwrap();

        let runtime = RuntimeBuilder::new().config_path(file.path()).build().unwrap();
        assert_eq!(runtime.config().server.port, 4850);
        assert_eq!(runtime.config().server.max_connections, 7);
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let mut config = ServerConfig::default();
        config.server.max_connections = 0;
        assert!(RuntimeBuilder::new().config(config).build().is_err());
    }

    #[tokio::test]
    async fn test_runtime_stops_on_manual_shutdown() {
        let runtime = RuntimeBuilder::new()
            .config(ServerConfig::default())
            .port(Some(0))
            .bind_address(Some("127.0.0.1".parse().unwrap()))
            .build()
            .unwrap();
        let coordinator = runtime.shutdown_coordinator().clone();

        let task = tokio::spawn(runtime.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        coordinator.initiate_shutdown();

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
