// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subscriptions.
//!
//! A subscription groups monitored items and turns their queued values into
//! sequenced notification messages on every publishing tick.
//!
//! # Tick
//!
//! ```text
//!  tick ─► 1. refresh + drain reporting items (publishing enabled only)
//!          2. lifetime counter += 1, prune stale retransmission entries
//!          3. lifetime ≥ max lifetime ─────────────► Expired (terminal)
//!          4. pending message ────────────────────► Notification
//!          5. keep-alive counter += 1, ≥ max ─────► KeepAlive(next seq)
//!             otherwise ──────────────────────────► Idle
//! ```
//!
//! # States
//!
//! ```text
//!  CREATING ─start()─► NORMAL ◄──────── message delivered
//!                        │  ▲
//!        nothing to send │  │ request arrived
//!                        ▼  │
//!                        LATE ─── keep-alive delivered ─► KEEPALIVE
//!
//!  any ─expiry / terminate()─► TERMINATED ─delete─► CLOSED
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uasrv_config::SubscriptionConfig;
use uasrv_core::{
    DataValue, IdSequence, MonitoredItemId, MonitoringMode, ReadValueId, SessionId, StatusCode,
    SubscriptionError, SubscriptionId, TimerHandle,
};

use crate::events::TimerEvent;
use crate::monitored_item::{MonitoredItem, MonitoredItemNotification, MonitoredItemSettings};

// =============================================================================
// State
// =============================================================================

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Deleted by the client.
    Closed,
    /// Constructed, timer not running yet.
    Creating,
    /// Running.
    Normal,
    /// Something is ready but no publish request was available.
    Late,
    /// The last delivered response was a keep-alive.
    KeepAlive,
    /// Expired or terminated.
    Terminated,
}

impl SubscriptionState {
    /// Returns `true` once the subscription can no longer publish.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Terminated)
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "CLOSED",
            Self::Creating => "CREATING",
            Self::Normal => "NORMAL",
            Self::Late => "LATE",
            Self::KeepAlive => "KEEPALIVE",
            Self::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Limits & parameters
// =============================================================================

/// Revision bounds for subscription parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubscriptionLimits {
    /// Fastest publishing interval.
    pub min_publishing_interval: Duration,
    /// Slowest publishing interval.
    pub max_publishing_interval: Duration,
    /// Interval used for a requested interval of 0.
    pub default_publishing_interval: Duration,
    /// Keep-alive count used for a requested count of 0.
    pub default_keep_alive_count: u32,
    /// Largest keep-alive count.
    pub max_keep_alive_count: u32,
    /// Lifetime count used for a requested count of 0.
    pub default_lifetime_count: u32,
    /// Largest lifetime count.
    pub max_lifetime_count: u32,
    /// Upper bound on notifications per message. 0 means unlimited.
    pub max_notifications_per_publish: usize,
    /// Monitored items allowed per subscription.
    pub max_monitored_items: usize,
}

impl SubscriptionLimits {
    /// Derives the limits from configuration.
    pub fn from_config(config: &SubscriptionConfig) -> Self {
        Self {
            min_publishing_interval: Duration::from_millis(config.min_publishing_interval_ms),
            max_publishing_interval: Duration::from_millis(config.max_publishing_interval_ms),
            default_publishing_interval: Duration::from_millis(
                config.default_publishing_interval_ms,
            ),
            default_keep_alive_count: config.default_keep_alive_count,
            max_keep_alive_count: config.max_keep_alive_count,
            default_lifetime_count: config.default_lifetime_count,
            max_lifetime_count: config.max_lifetime_count,
            max_notifications_per_publish: config.max_notifications_per_publish,
            max_monitored_items: config.max_monitored_items_per_subscription,
        }
    }

    /// Revises client-requested parameters.
    ///
    /// The revised lifetime count is always at least three keep-alive counts.
    pub fn revise(&self, requested: &RequestedParameters) -> SubscriptionParameters {
        let interval_ms = requested.publishing_interval_ms;
        let publishing_interval = if !interval_ms.is_finite() || interval_ms <= 0.0 {
            self.default_publishing_interval
        } else {
            Duration::from_secs_f64(interval_ms.min(u32::MAX as f64) / 1000.0)
        }
        .clamp(self.min_publishing_interval, self.max_publishing_interval);

        let keep_alive = match requested.max_keep_alive_count {
            0 => self.default_keep_alive_count,
            count => count,
        }
        .clamp(1, self.max_keep_alive_count.max(1));

        let lifetime = match requested.lifetime_count {
            0 => self.default_lifetime_count,
            count => count,
        }
        .min(self.max_lifetime_count)
        .max(keep_alive.saturating_mul(3));

        let asked = requested.max_notifications_per_publish as usize;
        let max_notifications = match (asked, self.max_notifications_per_publish) {
            (0, limit) => limit,
            (asked, 0) => asked,
            (asked, limit) => asked.min(limit),
        };

        SubscriptionParameters {
            publishing_interval,
            max_keep_alive_count: keep_alive,
            max_lifetime_count: lifetime,
            max_notifications_per_publish: max_notifications,
            publishing_enabled: requested.publishing_enabled,
            priority: requested.priority,
        }
    }
}

impl Default for SubscriptionLimits {
    fn default() -> Self {
        Self::from_config(&SubscriptionConfig::default())
    }
}

/// Parameters as requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RequestedParameters {
    /// Publishing interval in milliseconds.
    #[serde(default)]
    pub publishing_interval_ms: f64,
    /// Lifetime in publishing intervals.
    #[serde(default)]
    pub lifetime_count: u32,
    /// Keep-alive period in publishing intervals.
    #[serde(default)]
    pub max_keep_alive_count: u32,
    /// Notifications per message, 0 for unlimited.
    #[serde(default)]
    pub max_notifications_per_publish: u32,
    /// Whether notifications are produced.
    #[serde(default = "default_true")]
    pub publishing_enabled: bool,
    /// Relative priority.
    #[serde(default)]
    pub priority: u8,
}

fn default_true() -> bool {
    true
}

impl Default for RequestedParameters {
    fn default() -> Self {
        Self {
            publishing_interval_ms: 0.0,
            lifetime_count: 0,
            max_keep_alive_count: 0,
            max_notifications_per_publish: 0,
            publishing_enabled: true,
            priority: 0,
        }
    }
}

/// Revised subscription parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubscriptionParameters {
    /// Publishing interval.
    pub publishing_interval: Duration,
    /// Ticks without data before a keep-alive.
    pub max_keep_alive_count: u32,
    /// Ticks without client contact before expiry.
    pub max_lifetime_count: u32,
    /// Upper bound on notifications per message. 0 means unlimited.
    pub max_notifications_per_publish: usize,
    /// Whether notifications are produced.
    pub publishing_enabled: bool,
    /// Relative priority.
    pub priority: u8,
}

// =============================================================================
// Messages
// =============================================================================

/// A sequenced notification message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    /// Sequence number. For a keep-alive, the next number to expect.
    pub sequence_number: u32,
    /// When the message was produced.
    pub publish_time: DateTime<Utc>,
    /// Data change notifications.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notifications: Vec<MonitoredItemNotification>,
    /// Subscription status change, sent when the subscription ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_change: Option<StatusCode>,
}

impl NotificationMessage {
    /// Creates an empty keep-alive message.
    pub fn keep_alive(next_sequence_number: u32) -> Self {
        Self {
            sequence_number: next_sequence_number,
            publish_time: Utc::now(),
            notifications: Vec::new(),
            status_change: None,
        }
    }

    /// Returns `true` for a message without payload.
    pub fn is_keep_alive(&self) -> bool {
        self.notifications.is_empty() && self.status_change.is_none()
    }
}

/// What a subscription hands to a publish response.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishPayload {
    /// Subscription id.
    pub subscription_id: SubscriptionId,
    /// Sequence numbers the client has not acknowledged yet.
    pub available_sequence_numbers: Vec<u32>,
    /// More messages are already waiting.
    pub more_notifications: bool,
    /// The message.
    pub message: NotificationMessage,
}

/// Result of one publishing tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to report.
    Idle,
    /// A notification message is pending.
    Notification,
    /// The keep-alive count was reached.
    KeepAlive {
        /// Sequence number the next message will carry.
        next_sequence_number: u32,
    },
    /// The lifetime count was reached. The subscription is terminated.
    Expired,
}

/// Per-subscription counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubscriptionDiagnostics {
    /// Messages produced.
    pub notification_messages: u64,
    /// Data change notifications produced.
    pub data_change_notifications: u64,
    /// Keep-alive messages delivered.
    pub keep_alive_messages: u64,
    /// Publish responses delivered.
    pub publish_responses: u64,
    /// Times the subscription went late.
    pub late_count: u64,
    /// Republish requests received.
    pub republish_requests: u64,
    /// Republish requests answered with a message.
    pub republish_messages: u64,
    /// Acknowledgements applied.
    pub acknowledgements: u64,
    /// Retransmission entries dropped unacknowledged.
    pub discarded_messages: u64,
}

// =============================================================================
// Subscription
// =============================================================================

#[derive(Debug)]
struct SentMessage {
    message: NotificationMessage,
    sent_at_tick: u64,
}

/// A subscription and its monitored items.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    session_id: SessionId,
    params: SubscriptionParameters,
    max_monitored_items: usize,
    state: SubscriptionState,
    next_sequence_number: u32,
    lifetime_counter: u32,
    keep_alive_counter: u32,
    ticks: u64,
    pending: VecDeque<NotificationMessage>,
    sent: BTreeMap<u32, SentMessage>,
    items: BTreeMap<MonitoredItemId, MonitoredItem>,
    item_ids: IdSequence,
    sink: mpsc::Sender<TimerEvent>,
    timer: TimerHandle,
    diagnostics: SubscriptionDiagnostics,
}

impl Subscription {
    /// Creates a subscription in the `Creating` state.
    pub fn new(
        id: SubscriptionId,
        session_id: SessionId,
        params: SubscriptionParameters,
        max_monitored_items: usize,
        sink: mpsc::Sender<TimerEvent>,
    ) -> Self {
        Self {
            id,
            session_id,
            params,
            max_monitored_items,
            state: SubscriptionState::Creating,
            next_sequence_number: 1,
            lifetime_counter: 0,
            keep_alive_counter: 0,
            ticks: 0,
            pending: VecDeque::new(),
            sent: BTreeMap::new(),
            items: BTreeMap::new(),
            item_ids: IdSequence::new(),
            sink,
            timer: TimerHandle::inactive(),
            diagnostics: SubscriptionDiagnostics::default(),
        }
    }

    /// Returns the subscription id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the owning session.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Returns the current state.
    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Returns the revised parameters.
    pub fn parameters(&self) -> &SubscriptionParameters {
        &self.params
    }

    /// Returns the sequence number the next message will carry.
    pub fn next_sequence_number(&self) -> u32 {
        self.next_sequence_number
    }

    /// Returns the lifetime counter.
    pub fn lifetime_counter(&self) -> u32 {
        self.lifetime_counter
    }

    /// Returns the keep-alive counter.
    pub fn keep_alive_counter(&self) -> u32 {
        self.keep_alive_counter
    }

    /// Returns `true` if a message waits for a publish request.
    pub fn has_pending_notifications(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Returns the unacknowledged sequence numbers.
    pub fn available_sequence_numbers(&self) -> Vec<u32> {
        self.sent.keys().copied().collect()
    }

    /// Returns the counters.
    pub fn diagnostics(&self) -> SubscriptionDiagnostics {
        self.diagnostics
    }

    /// Returns `true` while the publishing timer runs.
    pub fn is_timer_active(&self) -> bool {
        self.timer.is_active()
    }

    /// Starts the publishing timer and every item's sampling timer.
    pub fn start(&mut self) {
        if self.state != SubscriptionState::Creating {
            return;
        }
        self.state = SubscriptionState::Normal;
        self.arm_timer();
        for item in self.items.values_mut() {
            if item.mode().is_sampling() {
                item.arm(&self.sink, self.session_id, self.id);
            }
        }
        tracing::debug!(
            session_id = %self.session_id,
            subscription_id = %self.id,
            publishing_interval_ms = self.params.publishing_interval.as_millis() as u64,
            "Subscription started"
        );
    }

    fn arm_timer(&mut self) {
        self.timer = TimerHandle::periodic(
            self.params.publishing_interval,
            self.sink.clone(),
            TimerEvent::SubscriptionTick {
                session_id: self.session_id,
                subscription_id: self.id,
            },
        );
    }

    fn is_running(&self) -> bool {
        !matches!(
            self.state,
            SubscriptionState::Creating | SubscriptionState::Closed | SubscriptionState::Terminated
        )
    }

    /// Applies new revised parameters. A changed interval restarts the timer.
    pub fn modify(&mut self, params: SubscriptionParameters) {
        let interval_changed = params.publishing_interval != self.params.publishing_interval;
        // Publishing mode is changed through set_publishing_enabled.
        self.params = SubscriptionParameters {
            publishing_enabled: self.params.publishing_enabled,
            ..params
        };
        if interval_changed && self.is_running() {
            self.arm_timer();
        }
        self.lifetime_counter = 0;
    }

    /// Enables or disables notification production.
    pub fn set_publishing_enabled(&mut self, enabled: bool) {
        self.params.publishing_enabled = enabled;
        self.lifetime_counter = 0;
    }

    // -------------------------------------------------------------------------
    // Tick
    // -------------------------------------------------------------------------

    /// Runs one publishing cycle.
    ///
    /// `read` supplies the current value of a monitored attribute and is
    /// called for every sampling item before the drain.
    pub fn tick(&mut self, mut read: impl FnMut(&ReadValueId) -> DataValue) -> TickOutcome {
        if self.state.is_terminal() {
            return TickOutcome::Idle;
        }
        self.ticks += 1;

        if self.params.publishing_enabled {
            for item in self.items.values_mut() {
                if item.mode().is_sampling() {
                    let value = read(item.item_to_monitor());
                    item.sample(value);
                }
            }
            self.collect_notifications();
        }

        self.lifetime_counter += 1;
        self.prune_sent();

        if self.lifetime_counter >= self.params.max_lifetime_count {
            tracing::info!(
                session_id = %self.session_id,
                subscription_id = %self.id,
                lifetime_count = self.params.max_lifetime_count,
                "Subscription expired"
            );
            self.terminate();
            return TickOutcome::Expired;
        }

        if !self.pending.is_empty() {
            self.keep_alive_counter = 0;
            return TickOutcome::Notification;
        }

        self.keep_alive_counter += 1;
        if self.keep_alive_counter >= self.params.max_keep_alive_count {
            self.keep_alive_counter = 0;
            return TickOutcome::KeepAlive {
                next_sequence_number: self.next_sequence_number,
            };
        }
        TickOutcome::Idle
    }

    fn collect_notifications(&mut self) {
        let mut collected = Vec::new();
        for item in self.items.values_mut() {
            collected.extend(item.extract_notifications());
        }
        if collected.is_empty() {
            return;
        }
        self.diagnostics.data_change_notifications += collected.len() as u64;

        let chunk = match self.params.max_notifications_per_publish {
            0 => collected.len(),
            limit => limit,
        };
        let mut remaining = collected.into_iter().peekable();
        while remaining.peek().is_some() {
            let notifications: Vec<_> = remaining.by_ref().take(chunk).collect();
            let message = NotificationMessage {
                sequence_number: self.take_sequence_number(),
                publish_time: Utc::now(),
                notifications,
                status_change: None,
            };
            tracing::trace!(
                subscription_id = %self.id,
                sequence_number = message.sequence_number,
                notifications = message.notifications.len(),
                "Notification queued"
            );
            self.diagnostics.notification_messages += 1;
            self.pending.push_back(message);
        }
    }

    fn take_sequence_number(&mut self) -> u32 {
        let current = self.next_sequence_number;
        self.next_sequence_number = IdSequence::successor(current);
        current
    }

    fn prune_sent(&mut self) {
        let keep_alive_ticks = u64::from(self.params.max_keep_alive_count);
        let ticks = self.ticks;
        let before = self.sent.len();
        self.sent
            .retain(|_, sent| ticks - sent.sent_at_tick <= keep_alive_ticks);
        let dropped = before - self.sent.len();
        if dropped > 0 {
            self.diagnostics.discarded_messages += dropped as u64;
            tracing::debug!(
                subscription_id = %self.id,
                dropped,
                "Unacknowledged messages discarded"
            );
        }
    }

    // -------------------------------------------------------------------------
    // Publish
    // -------------------------------------------------------------------------

    /// Records that something was ready but no publish request was queued.
    pub fn mark_late(&mut self) {
        if self.is_running() && self.state != SubscriptionState::Late {
            self.state = SubscriptionState::Late;
            self.diagnostics.late_count += 1;
        }
    }

    /// Produces the next publish payload: the oldest pending message, or a
    /// keep-alive if none is pending. Resets the lifetime and keep-alive
    /// counters.
    pub fn take_publish(&mut self) -> PublishPayload {
        let message = match self.pending.pop_front() {
            Some(message) => {
                self.sent.insert(
                    message.sequence_number,
                    SentMessage {
                        message: message.clone(),
                        sent_at_tick: self.ticks,
                    },
                );
                if self.is_running() {
                    self.state = SubscriptionState::Normal;
                }
                message
            }
            None => {
                self.diagnostics.keep_alive_messages += 1;
                if self.is_running() {
                    self.state = SubscriptionState::KeepAlive;
                }
                NotificationMessage::keep_alive(self.next_sequence_number)
            }
        };

        self.reset_lifetime_counters();
        self.diagnostics.publish_responses += 1;

        PublishPayload {
            subscription_id: self.id,
            available_sequence_numbers: self.available_sequence_numbers(),
            more_notifications: !self.pending.is_empty(),
            message,
        }
    }

    /// Builds the final status change message of an ended subscription.
    pub fn take_status_change(&mut self, status: StatusCode) -> PublishPayload {
        let message = NotificationMessage {
            sequence_number: self.take_sequence_number(),
            publish_time: Utc::now(),
            notifications: Vec::new(),
            status_change: Some(status),
        };
        PublishPayload {
            subscription_id: self.id,
            available_sequence_numbers: Vec::new(),
            more_notifications: false,
            message,
        }
    }

    /// Clears both counters after a delivered response.
    pub fn reset_lifetime_counters(&mut self) {
        self.lifetime_counter = 0;
        self.keep_alive_counter = 0;
    }

    /// Removes an acknowledged message from the retransmission queue.
    pub fn acknowledge(&mut self, sequence_number: u32) -> Result<(), SubscriptionError> {
        match self.sent.remove(&sequence_number) {
            Some(_) => {
                self.diagnostics.acknowledgements += 1;
                Ok(())
            }
            None => Err(SubscriptionError::SequenceNumberUnknown {
                subscription_id: self.id.value(),
                sequence_number,
            }),
        }
    }

    /// Returns a retained message again.
    pub fn republish(&mut self, sequence_number: u32) -> Result<NotificationMessage, SubscriptionError> {
        self.diagnostics.republish_requests += 1;
        self.lifetime_counter = 0;
        let sent = self
            .sent
            .get(&sequence_number)
            .ok_or(SubscriptionError::MessageNotAvailable {
                subscription_id: self.id.value(),
                sequence_number,
            })?;
        self.diagnostics.republish_messages += 1;
        Ok(sent.message.clone())
    }

    // -------------------------------------------------------------------------
    // Monitored items
    // -------------------------------------------------------------------------

    /// Returns the number of monitored items.
    pub fn monitored_item_count(&self) -> usize {
        self.items.len()
    }

    /// Looks up a monitored item.
    pub fn monitored_item(&self, id: MonitoredItemId) -> Option<&MonitoredItem> {
        self.items.get(&id)
    }

    /// Adds a monitored item and starts its sampling timer if running.
    pub fn create_monitored_item(
        &mut self,
        settings: MonitoredItemSettings,
    ) -> Result<MonitoredItemId, SubscriptionError> {
        if self.state.is_terminal() {
            return Err(SubscriptionError::terminated(self.id.value()));
        }
        if self.items.len() >= self.max_monitored_items {
            return Err(SubscriptionError::TooManyMonitoredItems {
                max: self.max_monitored_items,
            });
        }

        let id = MonitoredItemId::new(self.item_ids.next());
        let mut item = MonitoredItem::new(id, settings);
        if self.is_running() && item.mode().is_sampling() {
            item.arm(&self.sink, self.session_id, self.id);
        }
        tracing::debug!(
            subscription_id = %self.id,
            item_id = %id,
            node = %item.item_to_monitor(),
            "Monitored item created"
        );
        self.items.insert(id, item);
        Ok(id)
    }

    /// Removes a monitored item and stops its timer.
    pub fn delete_monitored_item(&mut self, id: MonitoredItemId) -> Result<(), SubscriptionError> {
        let mut item = self
            .items
            .remove(&id)
            .ok_or_else(|| SubscriptionError::monitored_item_not_found(id.value()))?;
        item.stop();
        Ok(())
    }

    /// Changes an item's monitoring mode and starts or stops its timer.
    pub fn set_monitoring_mode(
        &mut self,
        id: MonitoredItemId,
        mode: MonitoringMode,
    ) -> Result<(), SubscriptionError> {
        let running = self.is_running();
        let item = self
            .items
            .get_mut(&id)
            .ok_or_else(|| SubscriptionError::monitored_item_not_found(id.value()))?;

        let was_sampling = item.mode().is_sampling();
        item.set_mode(mode);
        match (was_sampling, mode.is_sampling()) {
            (false, true) if running => item.arm(&self.sink, self.session_id, self.id),
            (true, false) => item.stop(),
            _ => {}
        }
        Ok(())
    }

    /// Offers a sampled value to an item. Returns `true` if it was queued.
    pub fn sample_item(
        &mut self,
        id: MonitoredItemId,
        value: DataValue,
    ) -> Result<bool, SubscriptionError> {
        let item = self
            .items
            .get_mut(&id)
            .ok_or_else(|| SubscriptionError::monitored_item_not_found(id.value()))?;
        Ok(item.sample(value))
    }

    /// Returns the monitored attribute of an item.
    pub fn item_to_monitor(&self, id: MonitoredItemId) -> Option<&ReadValueId> {
        self.items.get(&id).map(MonitoredItem::item_to_monitor)
    }

    // -------------------------------------------------------------------------
    // Termination
    // -------------------------------------------------------------------------

    /// Stops every timer and removes all monitored items. Idempotent.
    pub fn terminate(&mut self) {
        self.timer.cancel();
        for item in self.items.values_mut() {
            item.stop();
        }
        self.items.clear();
        self.pending.clear();
        if self.state != SubscriptionState::Closed {
            self.state = SubscriptionState::Terminated;
        }
    }

    /// Terminates and marks the subscription deleted.
    pub fn close(&mut self) {
        self.terminate();
        self.sent.clear();
        self.state = SubscriptionState::Closed;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.terminate();
    }
}

// =============================================================================
// Tests
// =============================================================================
