// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Graceful shutdown coordination.
//!
//! OS signals (SIGTERM, SIGINT, SIGQUIT on Unix; Ctrl+C elsewhere) and
//! programmatic requests both settle a single [`ShutdownReason`] in a watch
//! channel. The first reason wins.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

/// Why the server is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// An OS signal arrived.
    Signal(&'static str),
    /// [`ShutdownCoordinator::initiate_shutdown`] was called.
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(name) => write!(f, "received {name}"),
            Self::Requested => f.write_str("requested"),
        }
    }
}

/// Settles the shutdown reason once and lets any number of tasks wait on it.
///
/// ```ignore
/// let coordinator = ShutdownCoordinator::new();
/// let stopper = coordinator.clone();
/// tokio::spawn(async move { stopper.initiate_shutdown() });
/// let reason = coordinator.wait_for_shutdown().await;
/// ```
#[derive(Clone)]
pub struct ShutdownCoordinator {
    reason: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl ShutdownCoordinator {
    /// Creates a coordinator with no reason settled.
    pub fn new() -> Self {
        let (reason, _) = watch::channel(None);
        Self {
            reason: Arc::new(reason),
        }
    }

    /// Returns a receiver that observes the reason once settled.
    pub fn subscribe(&self) -> watch::Receiver<Option<ShutdownReason>> {
        self.reason.subscribe()
    }

    /// Requests shutdown. Ignored if a reason is already settled.
    pub fn initiate_shutdown(&self) {
        self.settle(ShutdownReason::Requested);
    }

    /// Returns the settled reason, if any.
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.reason.borrow()
    }

    /// Returns `true` once a reason is settled.
    pub fn is_shutdown_initiated(&self) -> bool {
        self.reason().is_some()
    }

    fn settle(&self, reason: ShutdownReason) {
        let settled = self.reason.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
        if settled {
            info!(%reason, "Shutdown initiated");
        }
    }

    /// Waits for an OS signal or a programmatic request and returns the
    /// reason that won.
    pub async fn wait_for_shutdown(&self) -> ShutdownReason {
        let mut settled = self.subscribe();
        tokio::select! {
            signal = wait_for_os_signal() => self.settle(ShutdownReason::Signal(signal)),
            _ = settled.wait_for(Option::is_some) => {}
        }
        self.reason().unwrap_or(ShutdownReason::Requested)
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_os_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
        signal(SignalKind::quit()),
    ) {
        (Ok(mut term), Ok(mut int), Ok(mut quit)) => tokio::select! {
            _ = term.recv() => "SIGTERM",
            _ = int.recv() => "SIGINT",
            _ = quit.recv() => "SIGQUIT",
        },
        _ => {
            warn!("Unix signal handlers unavailable, listening for Ctrl+C only");
            wait_for_ctrl_c().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_os_signal() -> &'static str {
    wait_for_ctrl_c().await
}

async fn wait_for_ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Ctrl+C handler unavailable; only programmatic shutdown remains");
        std::future::pending::<()>().await;
    }
    "Ctrl+C"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_request_is_observed_by_subscribers() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();
        assert!(!coordinator.is_shutdown_initiated());

        coordinator.initiate_shutdown();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Some(ShutdownReason::Requested));
    }

    #[tokio::test]
    async fn test_wait_returns_on_request() {
        let coordinator = ShutdownCoordinator::new();
        let stopper = coordinator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            stopper.initiate_shutdown();
        });

        let reason = tokio::time::timeout(Duration::from_secs(1), coordinator.wait_for_shutdown())
            .await
            .expect("wait_for_shutdown should return");
        assert_eq!(reason, ShutdownReason::Requested);
    }

    #[tokio::test]
    async fn test_wait_returns_when_already_settled() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.initiate_shutdown();
        tokio::time::timeout(Duration::from_millis(100), coordinator.wait_for_shutdown())
            .await
            .expect("already settled");
    }

    #[test]
    fn test_first_reason_wins() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.settle(ShutdownReason::Signal("SIGTERM"));
        coordinator.initiate_shutdown();
        assert_eq!(coordinator.reason(), Some(ShutdownReason::Signal("SIGTERM")));
        assert_eq!(ShutdownReason::Signal("SIGTERM").to_string(), "received SIGTERM");
    }
}
