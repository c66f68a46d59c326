// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Monitored items.
//!
//! An item samples one attribute on its own timer and keeps the samples in a
//! bounded queue until the owning subscription drains it.
//!
//! ```text
//!  sampling tick ─► owner reads value ─► sample() ─► changed? ─► record_value()
//!                                                                 │
//!          queue (capacity = queue_size)                          ▼
//!          discard_oldest = true  : drop front, keep the newest N
//!          discard_oldest = false : drop incoming, keep the earliest N
//!
//!  publishing tick ─► extract_notifications() ─► queue emptied, overflow bit
//!                                                 on the affected value
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uasrv_config::MonitoredItemConfig;
use uasrv_core::{
    DataValue, MonitoredItemId, MonitoringMode, ReadValueId, SessionId, SubscriptionId,
    TimerHandle,
};

use crate::events::TimerEvent;

// =============================================================================
// Limits
// =============================================================================

/// Revision bounds for monitored item parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitoredItemLimits {
    /// Fastest sampling interval.
    pub min_sampling_interval: Duration,
    /// Slowest sampling interval.
    pub max_sampling_interval: Duration,
    /// Interval used for a requested interval of 0.
    pub default_sampling_interval: Duration,
    /// Queue size used for a requested size of 0.
    pub default_queue_size: usize,
    /// Largest queue.
    pub max_queue_size: usize,
}

impl MonitoredItemLimits {
    /// Derives the limits from configuration.
    pub fn from_config(config: &MonitoredItemConfig) -> Self {
        Self {
            min_sampling_interval: Duration::from_millis(config.min_sampling_interval_ms),
            max_sampling_interval: Duration::from_millis(config.max_sampling_interval_ms),
            default_sampling_interval: Duration::from_millis(config.default_sampling_interval_ms),
            default_queue_size: config.default_queue_size as usize,
            max_queue_size: config.max_queue_size as usize,
        }
    }

    /// Revises a requested sampling interval in milliseconds.
    ///
    /// Negative values follow the publishing interval, 0 or NaN selects the
    /// default, and the result is clamped to the configured range.
    pub fn revise_sampling_interval(&self, requested_ms: f64, publishing_interval: Duration) -> Duration {
        let interval = if requested_ms.is_nan() || requested_ms == 0.0 {
            self.default_sampling_interval
        } else if requested_ms < 0.0 {
            publishing_interval
        } else {
            Duration::from_secs_f64(requested_ms.min(u32::MAX as f64) / 1000.0)
        };
        interval.clamp(
            self.min_sampling_interval,
            self.max_sampling_interval.max(self.min_sampling_interval),
        )
    }

    /// Revises a requested queue size. Zero selects the default.
    pub fn revise_queue_size(&self, requested: u32) -> usize {
        let size = if requested == 0 {
            self.default_queue_size
        } else {
            requested as usize
        };
        size.clamp(1, self.max_queue_size.max(1))
    }
}

impl Default for MonitoredItemLimits {
    fn default() -> Self {
        Self::from_config(&MonitoredItemConfig::default())
    }
}

// =============================================================================
// Notification
// =============================================================================

/// A queued value tagged with the client's handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemNotification {
    /// Client-assigned handle of the item.
    pub client_handle: u32,
    /// The sampled value.
    pub value: DataValue,
}

/// Revised creation parameters of an item.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemSettings {
    /// Client-assigned handle.
    pub client_handle: u32,
    /// Node and attribute to sample.
    pub item: ReadValueId,
    /// Initial monitoring mode.
    pub mode: MonitoringMode,
    /// Revised sampling interval.
    pub sampling_interval: Duration,
    /// Revised queue capacity.
    pub queue_size: usize,
    /// Overflow policy.
    pub discard_oldest: bool,
}

// =============================================================================
// MonitoredItem
// =============================================================================

/// A sampled attribute with a bounded value queue.
#[derive(Debug)]
pub struct MonitoredItem {
    id: MonitoredItemId,
    client_handle: u32,
    item: ReadValueId,
    mode: MonitoringMode,
    sampling_interval: Duration,
    queue_size: usize,
    discard_oldest: bool,
    queue: VecDeque<DataValue>,
    overflow: bool,
    last_value: Option<DataValue>,
    timer: TimerHandle,
}

impl MonitoredItem {
    /// Creates an item. Its timer is not running until [`arm`](Self::arm).
    pub fn new(id: MonitoredItemId, settings: MonitoredItemSettings) -> Self {
        let queue_size = settings.queue_size.max(1);
        Self {
            id,
            client_handle: settings.client_handle,
            item: settings.item,
            mode: settings.mode,
            sampling_interval: settings.sampling_interval,
            queue_size,
            discard_oldest: settings.discard_oldest,
            queue: VecDeque::with_capacity(queue_size.min(64)),
            overflow: false,
            last_value: None,
            timer: TimerHandle::inactive(),
        }
    }

    /// Returns the item id.
    pub fn id(&self) -> MonitoredItemId {
        self.id
    }

    /// Returns the client handle.
    pub fn client_handle(&self) -> u32 {
        self.client_handle
    }

    /// Returns the monitored node and attribute.
    pub fn item_to_monitor(&self) -> &ReadValueId {
        &self.item
    }

    /// Returns the monitoring mode.
    pub fn mode(&self) -> MonitoringMode {
        self.mode
    }

    /// Returns the revised sampling interval.
    pub fn sampling_interval(&self) -> Duration {
        self.sampling_interval
    }

    /// Returns the queue capacity.
    pub fn queue_size(&self) -> usize {
        self.queue_size
    }

    /// Returns the number of queued values.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if samples were dropped since the last drain.
    pub fn has_overflow(&self) -> bool {
        self.overflow
    }

    /// Returns `true` while the sampling timer runs.
    pub fn is_sampling_timer_active(&self) -> bool {
        self.timer.is_active()
    }

    /// Starts the sampling timer.
    pub fn arm(
        &mut self,
        sink: &mpsc::Sender<TimerEvent>,
        session_id: SessionId,
        subscription_id: SubscriptionId,
    ) {
        self.timer = TimerHandle::periodic(
            self.sampling_interval,
            sink.clone(),
            TimerEvent::SamplingTick {
                session_id,
                subscription_id,
                item_id: self.id,
            },
        );
    }

    /// Stops the sampling timer. Idempotent.
    pub fn stop(&mut self) {
        self.timer.cancel();
    }

    /// Changes the monitoring mode. Disabling discards queued values.
    pub fn set_mode(&mut self, mode: MonitoringMode) {
        if mode == MonitoringMode::Disabled {
            self.queue.clear();
            self.overflow = false;
            self.last_value = None;
        }
        self.mode = mode;
    }

    /// Offers a freshly read value. Returns `true` if it was queued.
    ///
    /// Values equal to the last sample (value and status) are skipped.
    pub fn sample(&mut self, value: DataValue) -> bool {
        if !self.mode.is_sampling() {
            return false;
        }
        if self
            .last_value
            .as_ref()
            .is_some_and(|last| last.same_value(&value))
        {
            return false;
        }
        self.record_value(value);
        true
    }

    /// Appends a value to the queue, applying the discard policy on overflow.
    pub fn record_value(&mut self, mut value: DataValue) {
        if value.server_timestamp.is_none() {
            value.server_timestamp = Some(Utc::now());
        }
        self.last_value = Some(value.clone());

        if self.queue.len() >= self.queue_size {
            self.overflow = true;
            if self.discard_oldest {
                self.queue.pop_front();
            } else {
                tracing::trace!(item_id = %self.id, "Queue full, sample discarded");
                return;
            }
        }
        self.queue.push_back(value);
    }

    /// Empties the queue and returns its values tagged with the client handle.
    ///
    /// Items not in reporting mode return nothing and keep their queue. After
    /// an overflow the oldest value (discard oldest) or the newest value
    /// (discard newest) carries the overflow info bit.
    pub fn extract_notifications(&mut self) -> Vec<MonitoredItemNotification> {
        if !self.mode.is_reporting() || self.queue.is_empty() {
            return Vec::new();
        }

        if std::mem::take(&mut self.overflow) {
            let marked = if self.discard_oldest {
                self.queue.front_mut()
            } else {
                self.queue.back_mut()
            };
            if let Some(value) = marked {
                value.status = value.status.with_overflow();
            }
        }

        self.queue
            .drain(..)
            .map(|value| MonitoredItemNotification {
                client_handle: self.client_handle,
                value,
            })
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uasrv_core::{NodeId, StatusCode, Variant};

    fn item(queue_size: usize, discard_oldest: bool) -> MonitoredItem {
        MonitoredItem::new(
            MonitoredItemId::new(1),
            MonitoredItemSettings {
                client_handle: 42,
                item: ReadValueId::value_of(NodeId::numeric(2, 1)),
                mode: MonitoringMode::Reporting,
                sampling_interval: Duration::from_millis(100),
                queue_size,
                discard_oldest,
            },
        )
    }

    fn values(notifications: &[MonitoredItemNotification]) -> Vec<Variant> {
        notifications.iter().map(|n| n.value.value.clone()).collect()
    }

    #[test]
    fn test_discard_oldest_keeps_newest() {
        let mut item = item(3, true);
        for i in 0..5 {
            item.record_value(DataValue::new(i));
        }
        assert_eq!(item.queue_len(), 3);
        assert!(item.has_overflow());

        let drained = item.extract_notifications();
        assert_eq!(values(&drained), vec![Variant::Int32(2), Variant::Int32(3), Variant::Int32(4)]);
        assert!(drained[0].value.status.has_overflow());
        assert!(!drained[2].value.status.has_overflow());
        assert!(drained.iter().all(|n| n.client_handle == 42));
        assert!(!item.has_overflow());
    }

    #[test]
    fn test_discard_newest_keeps_earliest() {
        let mut item = item(3, false);
        for i in 0..5 {
            item.record_value(DataValue::new(i));
        }
        let drained = item.extract_notifications();
        assert_eq!(values(&drained), vec![Variant::Int32(0), Variant::Int32(1), Variant::Int32(2)]);
        assert!(drained[2].value.status.has_overflow());
        assert!(!drained[0].value.status.has_overflow());
    }

    #[test]
    fn test_drain_is_exactly_once() {
        let mut item = item(2, true);
        item.record_value(DataValue::new(1));
        assert_eq!(item.extract_notifications().len(), 1);
        assert!(item.extract_notifications().is_empty());
    }

    #[test]
    fn test_sample_skips_unchanged_values() {
        let mut item = item(5, true);
        assert!(item.sample(DataValue::new(1.5)));
        assert!(!item.sample(DataValue::new(1.5)));
        assert!(item.sample(DataValue::new(1.5).with_status(StatusCode::BAD_NODE_ID_UNKNOWN)));
        assert_eq!(item.queue_len(), 2);
    }

    #[test]
    fn test_modes() {
        let mut item = item(5, true);
        item.set_mode(MonitoringMode::Sampling);
        assert!(item.sample(DataValue::new(1)));
        assert!(item.extract_notifications().is_empty());
        assert_eq!(item.queue_len(), 1);

        item.set_mode(MonitoringMode::Reporting);
        assert_eq!(item.extract_notifications().len(), 1);

        item.record_value(DataValue::new(2));
        item.set_mode(MonitoringMode::Disabled);
        assert_eq!(item.queue_len(), 0);
        assert!(!item.sample(DataValue::new(3)));
    }

    #[test]
    fn test_revision() {
        let limits = MonitoredItemLimits {
            min_sampling_interval: Duration::from_millis(50),
            max_sampling_interval: Duration::from_millis(5_000),
            default_sampling_interval: Duration::from_millis(250),
            default_queue_size: 1,
            max_queue_size: 10,
        };
        let publishing = Duration::from_millis(1000);

        assert_eq!(limits.revise_sampling_interval(0.0, publishing), Duration::from_millis(250));
        assert_eq!(limits.revise_sampling_interval(-1.0, publishing), publishing);
        assert_eq!(limits.revise_sampling_interval(10.0, publishing), Duration::from_millis(50));
        assert_eq!(limits.revise_sampling_interval(500.0, publishing), Duration::from_millis(500));
        assert_eq!(limits.revise_sampling_interval(60_000.0, publishing), Duration::from_millis(5_000));
        assert_eq!(
            limits.revise_sampling_interval(-1.0, Duration::from_secs(60)),
            Duration::from_millis(5_000)
        );
        assert_eq!(limits.revise_sampling_interval(f64::INFINITY, publishing), Duration::from_millis(5_000));
        assert_eq!(limits.revise_queue_size(0), 1);
        assert_eq!(limits.revise_queue_size(100), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampling_timer() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut item = item(1, true);
        item.arm(&tx, SessionId::new(1), SubscriptionId::new(2));

        let tick = rx.recv().await.unwrap();
        assert_eq!(
            tick,
            TimerEvent::SamplingTick {
                session_id: SessionId::new(1),
                subscription_id: SubscriptionId::new(2),
                item_id: MonitoredItemId::new(1),
            }
        );

        item.stop();
        assert!(!item.is_sampling_timer_active());
    }
}
