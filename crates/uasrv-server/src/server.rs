// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Server assembly: engine task plus listener task.
//!
//! ```text
//! UaServer::new(config)
//!     .with_address_space(..)     optional, defaults to MemoryAddressSpace
//!     .with_codec(..)             optional, defaults to JsonServiceCodec
//!     .start().await ──► ServerHandle ──shutdown()──► listener drained,
//!                                                     sessions closed
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use uasrv_config::ServerConfig;
use uasrv_core::{ObserverList, UaError, UaResult};

use crate::address_space::{AddressSpace, MemoryAddressSpace};
use crate::engine::{Engine, EngineDiagnostics, EngineHandle};
use crate::events::ServerEvent;
use crate::listener::ConnectionListener;
use crate::registry::ChannelRegistry;
use crate::service::{JsonServiceCodec, ServiceCodec};
use crate::stats::{ListenerStats, ListenerStatsSnapshot};

/// Server builder.
pub struct UaServer {
    config: ServerConfig,
    space: Arc<dyn AddressSpace>,
    codec: Arc<dyn ServiceCodec>,
    observers: Arc<ObserverList<ServerEvent>>,
}

impl UaServer {
    /// Creates a server with the default address space and codec.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            space: Arc::new(MemoryAddressSpace::new()),
            codec: Arc::new(JsonServiceCodec::new()),
            observers: Arc::new(ObserverList::new()),
        }
    }

    /// Replaces the address space.
    pub fn with_address_space(mut self, space: Arc<dyn AddressSpace>) -> Self {
        self.space = space;
        self
    }

    /// Replaces the service codec.
    pub fn with_codec(mut self, codec: Arc<dyn ServiceCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Returns the lifecycle observers. Register before [`start`](Self::start)
    /// to see every event.
    pub fn observers(&self) -> &Arc<ObserverList<ServerEvent>> {
        &self.observers
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Validates the configuration, binds the listener and spawns the engine
    /// and listener tasks.
    pub async fn start(self) -> UaResult<ServerHandle> {
        self.config
            .validate()
            .map_err(|e| UaError::invalid_argument("config", e.to_string()))?;

        let (engine, engine_task) = Engine::spawn(
            &self.config,
            self.space,
            self.codec,
            self.observers.clone(),
        );

        let listener =
            match ConnectionListener::bind(&self.config, engine.clone(), self.observers.clone()).await {
                Ok(listener) => listener,
                Err(e) => {
                    engine.shutdown().await;
                    if let Err(join) = engine_task.await {
                        tracing::error!(error = %join, "Engine task failed");
                    }
                    return Err(e);
                }
            };

        let local_addr = listener.local_addr();
        let registry = listener.registry().clone();
        let stats = listener.stats().clone();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let listener_task = tokio::spawn(listener.run(shutdown_rx));

        tracing::info!(address = %local_addr, "Server started");

        Ok(ServerHandle {
            local_addr,
            registry,
            stats,
            engine,
            observers: self.observers,
            shutdown,
            listener_task,
            engine_task,
        })
    }
}

/// Handle to a running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    registry: Arc<ChannelRegistry>,
    stats: Arc<ListenerStats>,
    engine: EngineHandle,
    observers: Arc<ObserverList<ServerEvent>>,
    shutdown: watch::Sender<bool>,
    listener_task: JoinHandle<UaResult<()>>,
    engine_task: JoinHandle<()>,
}

impl ServerHandle {
    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the number of live channels.
    pub fn channel_count(&self) -> usize {
        self.registry.len()
    }

    /// Returns listener statistics.
    pub fn stats(&self) -> ListenerStatsSnapshot {
        self.stats.snapshot(&self.registry)
    }

    /// Queries engine diagnostics. `None` once the engine stopped.
    pub async fn diagnostics(&self) -> Option<EngineDiagnostics> {
        self.engine.diagnostics().await
    }

    /// Returns the lifecycle observers.
    pub fn observers(&self) -> &Arc<ObserverList<ServerEvent>> {
        &self.observers
    }

    /// Stops accepting, closes every channel, then closes every session.
    pub async fn shutdown(self) -> UaResult<()> {
        tracing::info!("Server shutting down");
        self.shutdown.send_replace(true);

        let listener_result = match self.listener_task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "Listener task failed");
                Ok(())
            }
        };

        self.engine.shutdown().await;
        if let Err(e) = self.engine_task.await {
            tracing::error!(error = %e, "Engine task failed");
        }

        tracing::info!("Server stopped");
        listener_result
    }
}
