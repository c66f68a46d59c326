// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! TCP listener with admission control.
//!
//! Admission runs on the accept loop, so decisions are serialized:
//!
//! ```text
//!             accept
//!               │
//!     channels < max? ──yes──► spawn connection task
//!               │ no
//!     idle channel? ──yes──► close it, wait until unregistered, retry
//!               │ no
//!     opened channel without session? ──yes──► wait for a release
//!               │ no                           (bounded by timeout), retry
//!               ▼
//!     ERR BadTcpServerTooBusy, drop socket
//! ```
//!
//! A channel is idle while it has neither a token nor a session.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::instrument;
use uasrv_config::{NetworkConfig, ServerConfig};
use uasrv_core::{ChannelId, IdSequence, ListenerError, ObserverList, StatusCode, UaResult};

use crate::channel::ChannelLimits;
use crate::connection::Connection;
use crate::engine::EngineHandle;
use crate::events::ServerEvent;
use crate::frame::{ErrorMessage, Frame};
use crate::registry::{ChannelRegistry, ChannelSlot, ChannelStatus};
use crate::stats::ListenerStats;
use crate::transport::FrameWriter;

/// Accepts connections and owns their tasks.
pub struct ConnectionListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: NetworkConfig,
    limits: ChannelLimits,
    engine: EngineHandle,
    registry: Arc<ChannelRegistry>,
    stats: Arc<ListenerStats>,
    observers: Arc<ObserverList<ServerEvent>>,
    channel_ids: IdSequence,
    released: Arc<Notify>,
    tasks: JoinSet<()>,
}

impl ConnectionListener {
    /// Binds the listen socket.
    pub async fn bind(
        config: &ServerConfig,
        engine: EngineHandle,
        observers: Arc<ObserverList<ServerEvent>>,
    ) -> UaResult<Self> {
        let addr = config.server.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ListenerError::bind(addr.to_string(), e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ListenerError::bind(addr.to_string(), e))?;

        tracing::info!(address = %local_addr, max_connections = config.server.max_connections, "Listener bound");

        Ok(Self {
            listener,
            local_addr,
            config: config.server.clone(),
            limits: ChannelLimits::from_config(config),
            engine,
            registry: Arc::new(ChannelRegistry::new()),
            stats: Arc::new(ListenerStats::new()),
            observers,
            channel_ids: IdSequence::new(),
            released: Arc::new(Notify::new()),
            tasks: JoinSet::new(),
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the live channel registry.
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Returns the listener statistics.
    pub fn stats(&self) -> &Arc<ListenerStats> {
        &self.stats
    }

    /// Accepts connections until `shutdown` turns `true`, then closes every
    /// channel and waits for their tasks.
    #[instrument(skip_all, name = "listener", fields(address = %self.local_addr))]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> UaResult<()> {
        let mut stopping = shutdown.clone();
        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Connection task panicked");
                    }
                }

                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => self.admit(stream, peer, &mut stopping).await,
                        Err(e) => {
                            let error = ListenerError::Accept { source: e };
                            tracing::warn!(error = %error, "Accept failed");
                        }
                    }
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn admit(&mut self, stream: TcpStream, peer: SocketAddr, stopping: &mut watch::Receiver<bool>) {
        let max = self.config.max_connections;
        let mut deferred = false;

        loop {
            if self.registry.len() < max {
                self.spawn_channel(stream, peer);
                return;
            }

            if let Some(idle) = self.registry.find_idle() {
                self.stats.record_evicted();
                self.observers
                    .notify(&ServerEvent::ChannelEvicted { channel_id: idle.id });
                tracing::info!(channel_id = %idle.id, peer = %peer, "Closing idle channel to admit connection");
                idle.close_and_wait().await;
                continue;
            }

            if !deferred && self.registry.has_pending_session() {
                deferred = true;
                self.stats.record_deferred();
                tracing::debug!(peer = %peer, "Admission deferred until a channel is released");
                if !self.wait_for_release(max, stopping).await {
                    tracing::debug!(peer = %peer, "Deferred connection dropped, listener stopping");
                    return;
                }
                continue;
            }

            break;
        }

        self.refuse(stream, peer).await;
    }

    /// Waits until the registry drops below `max` or the timeout elapses.
    /// Returns `false` if shutdown began first.
    async fn wait_for_release(&self, max: usize, stopping: &mut watch::Receiver<bool>) -> bool {
        let deadline = Instant::now() + self.config.timeout();
        let released = async {
            while self.registry.len() >= max {
                if timeout_at(deadline, self.released.notified()).await.is_err() {
                    break;
                }
            }
        };
        tokio::select! {
            () = released => true,
            _ = stopping.wait_for(|stop| *stop) => false,
        }
    }

    async fn refuse(&self, stream: TcpStream, peer: SocketAddr) {
        let error = ListenerError::refused(self.registry.len(), self.config.max_connections);
        self.stats.record_refused();
        self.observers
            .notify(&ServerEvent::ConnectionRefused { peer });
        tracing::warn!(peer = %peer, error = %error, "Connection refused");

        let mut writer = FrameWriter::new(stream);
        let frame = Frame::Error(ErrorMessage::new(
            StatusCode::BAD_TCP_SERVER_TOO_BUSY,
            error.to_string(),
        ));
        match timeout(self.config.timeout(), writer.write_frame(&frame)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::trace!(peer = %peer, error = %e, "Could not send ERR frame"),
            Err(_) => tracing::trace!(peer = %peer, "Timed out sending ERR frame"),
        }
        writer.disconnect().await;
    }

    fn spawn_channel(&mut self, stream: TcpStream, peer: SocketAddr) {
        let id = ChannelId::new(self.channel_ids.next());
        let status = Arc::new(ChannelStatus::default());
        let (control_tx, control_rx) = mpsc::channel(1);
        let (closed_tx, closed_rx) = watch::channel(false);

        let slot = ChannelSlot {
            id,
            peer,
            status: status.clone(),
            control: control_tx,
            closed: closed_rx,
        };
        if let Err(e) = self.registry.insert(slot) {
            tracing::error!(error = %e, "Channel registration failed");
            return;
        }

        self.stats.record_accepted();
        self.observers
            .notify(&ServerEvent::ChannelOpened { channel_id: id, peer });
        tracing::info!(channel_id = %id, peer = %peer, active = self.registry.len(), "Connection accepted");

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(channel_id = %id, error = %e, "Failed to set TCP_NODELAY");
        }
        let (reader, writer) = stream.into_split();
        let connection = Connection::new(
            id,
            self.limits,
            status,
            reader,
            writer,
            self.engine.clone(),
            control_rx,
        );

        let registry = self.registry.clone();
        let stats = self.stats.clone();
        let observers = self.observers.clone();
        let released = self.released.clone();
        self.tasks.spawn(async move {
            if let Err(e) = connection.run().await {
                tracing::debug!(channel_id = %id, error = %e, "Channel ended with error");
            }

            if let Some(slot) = registry.remove(id) {
                stats.absorb(&slot.status);
            }
            observers.notify(&ServerEvent::ChannelClosed { channel_id: id });
            tracing::info!(channel_id = %id, active = registry.len(), "Channel unregistered");
            released.notify_one();
            closed_tx.send_replace(true);
        });
    }

    async fn shutdown(self) {
        let Self {
            listener,
            registry,
            config,
            mut tasks,
            ..
        } = self;
        drop(listener);

        let slots = registry.snapshot();
        tracing::info!(channels = slots.len(), "Listener stopping");

        futures::stream::iter(slots)
            .for_each_concurrent(config.shutdown_concurrency, ChannelSlot::close_and_wait)
            .await;

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Connection task panicked");
            }
        }
        tracing::info!("Listener stopped");
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::MemoryAddressSpace;
    use crate::engine::Engine;
    use crate::frame::{Direction, HelloMessage, OpenRequest, SecurityTokenRequestType};
    use crate::service::JsonServiceCodec;
    use crate::transport::FrameReader;
    use std::time::Duration;
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::task::JoinHandle;
    use uasrv_core::{EventCollector, MessageSecurityMode, RequestId, TransportError, UaError};

    struct Running {
        addr: SocketAddr,
        registry: Arc<ChannelRegistry>,
        stats: Arc<ListenerStats>,
        events: Arc<EventCollector<ServerEvent>>,
        shutdown: watch::Sender<bool>,
        task: JoinHandle<UaResult<()>>,
    }

    async fn start(max_connections: usize, timeout_ms: u64) -> Running {
        let mut config = ServerConfig::default();
        config.server.bind_address = "127.0.0.1".parse().unwrap();
        config.server.port = 0;
        config.server.max_connections = max_connections;
        config.server.timeout_ms = timeout_ms;

        let observers = Arc::new(ObserverList::new());
        let events = Arc::new(EventCollector::new(64));
        observers.register(events.clone());

        let (engine, _engine_task) = Engine::spawn(
            &config,
            Arc::new(MemoryAddressSpace::new()),
            Arc::new(JsonServiceCodec::new()),
            observers.clone(),
        );
        let listener = ConnectionListener::bind(&config, engine, observers)
            .await
            .unwrap();
        let (shutdown, shutdown_rx) = watch::channel(false);

        Running {
            addr: listener.local_addr(),
            registry: listener.registry().clone(),
            stats: listener.stats().clone(),
            events,
            shutdown,
            task: tokio::spawn(listener.run(shutdown_rx)),
        }
    }

    struct Client {
        reader: FrameReader<OwnedReadHalf>,
        writer: FrameWriter<OwnedWriteHalf>,
    }

    impl Client {
        async fn connect(addr: SocketAddr) -> Self {
            let (read, write) = TcpStream::connect(addr).await.unwrap().into_split();
            Self {
                reader: FrameReader::new(read, Direction::FromServer, 65_536),
                writer: FrameWriter::new(write),
            }
        }

        async fn open(&mut self) {
            self.writer
                .write_frame(&Frame::Hello(HelloMessage::new("opc.tcp://localhost")))
                .await
                .unwrap();
            assert!(matches!(self.reader.read_frame().await.unwrap().0, Frame::Acknowledge(_)));
            self.writer
                .write_frame(&Frame::OpenRequest(OpenRequest {
                    channel_id: ChannelId::new(0),
                    sequence_number: 1,
                    request_id: RequestId::new(1),
                    request_type: SecurityTokenRequestType::Issue,
                    security_mode: MessageSecurityMode::None,
                    requested_lifetime: 0,
                }))
                .await
                .unwrap();
            assert!(matches!(self.reader.read_frame().await.unwrap().0, Frame::OpenResponse(_)));
        }

        async fn expect_closed(&mut self) {
            loop {
                match self.reader.read_frame().await {
                    Err(UaError::Transport(TransportError::ConnectionClosed)) => return,
                    Err(UaError::Transport(TransportError::Io(_))) => return,
                    Ok((Frame::Error(_), _)) => continue,
                    other => panic!("expected close, got {other:?}"),
                }
            }
        }
    }

    async fn wait_for_channels(registry: &ChannelRegistry, count: usize) {
        for _ in 0..200 {
            if registry.len() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("registry never reached {count} channels");
    }

    #[tokio::test]
    async fn test_idle_channel_is_evicted() {
        let running = start(1, 5_000).await;

        let mut idle = Client::connect(running.addr).await;
        wait_for_channels(&running.registry, 1).await;

        let mut fresh = Client::connect(running.addr).await;
        idle.expect_closed().await;
        fresh.open().await;

        let stats = running.stats.snapshot(&running.registry);
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.evicted, 1);
        assert_eq!(stats.refused, 0);
        assert!(running
            .events
            .events()
            .contains(&ServerEvent::ChannelEvicted { channel_id: ChannelId::new(1) }));
    }

    #[tokio::test]
    async fn test_pending_channel_defers_then_refuses() {
        let running = start(1, 200).await;

        let mut opened = Client::connect(running.addr).await;
        opened.open().await;

        let mut late = Client::connect(running.addr).await;
        match late.reader.read_frame().await.unwrap().0 {
            Frame::Error(err) => assert_eq!(err.status, StatusCode::BAD_TCP_SERVER_TOO_BUSY),
            other => panic!("expected ERR, got {other:?}"),
        }

        let stats = running.stats.snapshot(&running.registry);
        assert_eq!(stats.deferred, 1);
        assert_eq!(stats.refused, 1);
        assert_eq!(stats.active_channels, 1);
    }

    #[tokio::test]
    async fn test_deferred_admission_proceeds_on_release() {
        let running = start(1, 5_000).await;

        let mut opened = Client::connect(running.addr).await;
        opened.open().await;

        let mut late = Client::connect(running.addr).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(opened);

        late.open().await;
        let stats = running.stats.snapshot(&running.registry);
        assert_eq!(stats.deferred, 1);
        assert_eq!(stats.refused, 0);
        assert_eq!(stats.closed, 1);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_deferred_admission() {
        let running = start(1, 30_000).await;

        let mut opened = Client::connect(running.addr).await;
        opened.open().await;

        let mut deferred = Client::connect(running.addr).await;
        for _ in 0..200 {
            if running.stats.snapshot(&running.registry).deferred == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(running.stats.snapshot(&running.registry).deferred, 1);

        running.shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), running.task)
            .await
            .expect("listener stops without waiting out the deferral")
            .unwrap()
            .unwrap();

        deferred.expect_closed().await;
        opened.expect_closed().await;
        let stats = running.stats.snapshot(&running.registry);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.refused, 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_channels() {
        let running = start(4, 5_000).await;

        let mut a = Client::connect(running.addr).await;
        a.open().await;
        let mut b = Client::connect(running.addr).await;
        b.open().await;
        wait_for_channels(&running.registry, 2).await;

        running.shutdown.send(true).unwrap();
        running.task.await.unwrap().unwrap();

        assert!(running.registry.is_empty());
        a.expect_closed().await;
        b.expect_closed().await;

        let stats = running.stats.snapshot(&running.registry);
        assert_eq!(stats.closed, 2);
        assert!(stats.total_bytes_read > 0);
    }
}
