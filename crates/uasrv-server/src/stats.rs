// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Listener statistics.
//!
//! Byte and transaction counters of closed channels are folded into
//! historical totals when the channel is unregistered, so aggregates survive
//! connection churn.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::registry::{ChannelRegistry, ChannelStatus};

/// Admission and traffic counters of a listener.
#[derive(Debug, Default)]
pub struct ListenerStats {
    accepted: AtomicU64,
    refused: AtomicU64,
    evicted: AtomicU64,
    deferred: AtomicU64,
    closed: AtomicU64,
    historical_bytes_read: AtomicU64,
    historical_bytes_written: AtomicU64,
    historical_transactions: AtomicU64,
}

impl ListenerStats {
    /// Creates zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an admitted connection.
    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a refused connection.
    pub fn record_refused(&self) {
        self.refused.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an idle channel closed to make room.
    pub fn record_evicted(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an admission that waited for capacity.
    pub fn record_deferred(&self) {
        self.deferred.fetch_add(1, Ordering::Relaxed);
    }

    /// Folds the counters of a closed channel into the historical totals.
    pub fn absorb(&self, status: &ChannelStatus) {
        self.closed.fetch_add(1, Ordering::Relaxed);
        self.historical_bytes_read
            .fetch_add(status.bytes_read(), Ordering::Relaxed);
        self.historical_bytes_written
            .fetch_add(status.bytes_written(), Ordering::Relaxed);
        self.historical_transactions
            .fetch_add(status.transactions(), Ordering::Relaxed);
    }

    /// Returns a point-in-time copy including live channel counters.
    pub fn snapshot(&self, registry: &ChannelRegistry) -> ListenerStatsSnapshot {
        let (live_read, live_written, live_transactions) = registry.live_totals();
        let historical_bytes_read = self.historical_bytes_read.load(Ordering::Relaxed);
        let historical_bytes_written = self.historical_bytes_written.load(Ordering::Relaxed);
        let historical_transactions = self.historical_transactions.load(Ordering::Relaxed);

        ListenerStatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            refused: self.refused.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            closed: self.closed.load(Ordering::Relaxed),
            active_channels: registry.len(),
            historical_bytes_read,
            historical_bytes_written,
            historical_transactions,
            total_bytes_read: historical_bytes_read + live_read,
            total_bytes_written: historical_bytes_written + live_written,
            total_transactions: historical_transactions + live_transactions,
        }
    }
}

/// Snapshot of [`ListenerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ListenerStatsSnapshot {
    /// Connections admitted.
    pub accepted: u64,
    /// Connections refused.
    pub refused: u64,
    /// Idle channels closed by admission control.
    pub evicted: u64,
    /// Admissions that waited for capacity.
    pub deferred: u64,
    /// Channels unregistered.
    pub closed: u64,
    /// Channels currently registered.
    pub active_channels: usize,
    /// Bytes read by closed channels.
    pub historical_bytes_read: u64,
    /// Bytes written by closed channels.
    pub historical_bytes_written: u64,
    /// Requests served by closed channels.
    pub historical_transactions: u64,
    /// Bytes read by all channels.
    pub total_bytes_read: u64,
    /// Bytes written by all channels.
    pub total_bytes_written: u64,
    /// Requests served by all channels.
    pub total_transactions: u64,
}
