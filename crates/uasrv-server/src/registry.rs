// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Live channel registry shared by the listener and connection tasks.
//!
//! Each accepted connection registers a [`ChannelSlot`]: a status block the
//! connection task keeps current, a control sender to ask it to close, and a
//! watch that flips once the channel is unregistered. Admission control reads
//! the status blocks to find idle channels.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use uasrv_core::{ChannelId, ListenerError};

// =============================================================================
// ChannelStatus
// =============================================================================

/// Lock-free status of one channel.
#[derive(Debug, Default)]
pub struct ChannelStatus {
    opened: AtomicBool,
    has_session: AtomicBool,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    transactions: AtomicU64,
}

impl ChannelStatus {
    /// Returns `true` once a token was issued.
    pub fn is_opened(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    /// Returns `true` while a session is attached.
    pub fn has_session(&self) -> bool {
        self.has_session.load(Ordering::Acquire)
    }

    /// Returns `true` for a channel that may be recycled by admission control.
    pub fn is_idle(&self) -> bool {
        !self.is_opened() && !self.has_session()
    }

    pub(crate) fn set_opened(&self, opened: bool) {
        self.opened.store(opened, Ordering::Release);
    }

    pub(crate) fn set_has_session(&self, has_session: bool) {
        self.has_session.store(has_session, Ordering::Release);
    }

    /// Adds to the bytes-read counter.
    pub fn record_read(&self, bytes: usize) {
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Adds to the bytes-written counter.
    pub fn record_written(&self, bytes: usize) {
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Counts one request.
    pub fn record_transaction(&self) {
        self.transactions.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns bytes read.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Returns bytes written.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Returns requests served.
    pub fn transactions(&self) -> u64 {
        self.transactions.load(Ordering::Relaxed)
    }
}

// =============================================================================
// ChannelSlot
// =============================================================================

/// Commands the listener sends to a connection task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCommand {
    /// Close the channel and drop the socket.
    Close,
}

/// Registry entry for one live channel.
#[derive(Debug, Clone)]
pub struct ChannelSlot {
    /// Channel id.
    pub id: ChannelId,
    /// Remote address.
    pub peer: SocketAddr,
    /// Status kept current by the connection task.
    pub status: Arc<ChannelStatus>,
    /// Control sender.
    pub control: mpsc::Sender<ChannelCommand>,
    /// Flips to `true` after the channel is unregistered.
    pub closed: watch::Receiver<bool>,
}

impl ChannelSlot {
    /// Asks the channel to close and waits until it is unregistered.
    pub async fn close_and_wait(mut self) {
        // A failed send means the task already ended; the watch still flips.
        let _ = self.control.send(ChannelCommand::Close).await;
        if self.closed.wait_for(|closed| *closed).await.is_err() {
            tracing::trace!(channel_id = %self.id, "Close watch dropped");
        }
    }
}

// =============================================================================
// ChannelRegistry
// =============================================================================

/// Map of live channels ordered by id.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    slots: RwLock<BTreeMap<ChannelId, ChannelSlot>>,
}

impl ChannelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a slot. Duplicate ids are rejected.
    pub fn insert(&self, slot: ChannelSlot) -> Result<(), ListenerError> {
        let mut slots = self.slots.write();
        if slots.contains_key(&slot.id) {
            return Err(ListenerError::DuplicateChannel {
                channel_id: slot.id.value(),
            });
        }
        slots.insert(slot.id, slot);
        Ok(())
    }

    /// Removes a slot.
    pub fn remove(&self, id: ChannelId) -> Option<ChannelSlot> {
        self.slots.write().remove(&id)
    }

    /// Returns the number of live channels.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Returns `true` if no channel is live.
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Returns the oldest idle channel (no session, not opened).
    pub fn find_idle(&self) -> Option<ChannelSlot> {
        self.slots
            .read()
            .values()
            .find(|slot| slot.status.is_idle())
            .cloned()
    }

    /// Returns `true` if some channel is opened but has no session yet.
    pub fn has_pending_session(&self) -> bool {
        self.slots
            .read()
            .values()
            .any(|slot| slot.status.is_opened() && !slot.status.has_session())
    }

    /// Returns every slot.
    pub fn snapshot(&self) -> Vec<ChannelSlot> {
        self.slots.read().values().cloned().collect()
    }

    /// Sums (bytes read, bytes written, transactions) over live channels.
    pub fn live_totals(&self) -> (u64, u64, u64) {
        self.slots.read().values().fold((0, 0, 0), |acc, slot| {
            (
                acc.0 + slot.status.bytes_read(),
                acc.1 + slot.status.bytes_written(),
                acc.2 + slot.status.transactions(),
            )
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(id: u32) -> (ChannelSlot, mpsc::Receiver<ChannelCommand>, watch::Sender<bool>) {
        let (control, control_rx) = mpsc::channel(1);
        let (closed_tx, closed) = watch::channel(false);
        let slot = ChannelSlot {
            id: ChannelId::new(id),
            peer: "127.0.0.1:50000".parse().unwrap(),
            status: Arc::new(ChannelStatus::default()),
            control,
            closed,
        };
        (slot, control_rx, closed_tx)
    }

    #[test]
    fn test_duplicate_rejected() {
        let registry = ChannelRegistry::new();
        let (a, _rx_a, _w_a) = slot(1);
        let (b, _rx_b, _w_b) = slot(1);
        registry.insert(a).unwrap();
        assert!(matches!(
            registry.insert(b),
            Err(ListenerError::DuplicateChannel { channel_id: 1 })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_idle_detection() {
        let registry = ChannelRegistry::new();
        let (a, _rx_a, _w_a) = slot(1);
        let (b, _rx_b, _w_b) = slot(2);
        a.status.set_opened(true);
        a.status.set_has_session(true);
        registry.insert(a).unwrap();
        registry.insert(b.clone()).unwrap();

        assert_eq!(registry.find_idle().map(|s| s.id), Some(ChannelId::new(2)));
        assert!(!registry.has_pending_session());

        b.status.set_opened(true);
        assert!(registry.find_idle().is_none());
        assert!(registry.has_pending_session());
    }

    #[test]
    fn test_live_totals() {
        let registry = ChannelRegistry::new();
        let (a, _rx_a, _w_a) = slot(1);
        a.status.record_read(100);
        a.status.record_written(40);
        a.status.record_transaction();
        registry.insert(a).unwrap();
        assert_eq!(registry.live_totals(), (100, 40, 1));
    }

    #[tokio::test]
    async fn test_close_and_wait() {
        let (a, mut control_rx, closed_tx) = slot(1);
        let task = tokio::spawn(async move {
            assert_eq!(control_rx.recv().await, Some(ChannelCommand::Close));
            closed_tx.send(true).unwrap();
        });
        a.close_and_wait().await;
        task.await.unwrap();
    }
}
