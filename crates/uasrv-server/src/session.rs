// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Sessions.
//!
//! A session owns its subscriptions, one [`PublishEngine`] and one
//! [`ContinuationPointManager`]. It lives in the engine task and is addressed
//! by its authentication token. A session outlives its channel until its
//! timeout and may be activated again on another channel.
//!
//! Publish responses are not sent directly: every operation that answers a
//! queued publish request pushes a [`PublishDelivery`] to the session outbox,
//! which the engine drains after each event.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use uasrv_config::ServerConfig;
use uasrv_core::{
    AuthenticationToken, ChannelId, MonitoredItemId, MonitoringMode, NodeId, RequestId, SessionError,
    SessionId, SharedSequence, StatusCode, SubscriptionError, SubscriptionId,
};

use crate::address_space::{AddressSpace, ReferenceDescription};
use crate::continuation::ContinuationPointManager;
use crate::events::TimerEvent;
use crate::monitored_item::{MonitoredItemLimits, MonitoredItemSettings};
use crate::publish::{PendingPublish, PublishEngine, SubscriptionAcknowledgement};
use crate::service::{
    BrowseResponse, BrowseResult, MonitoredItemCreateRequest, MonitoredItemCreateResult,
    PublishResponse, ResponseEnvelope, ServiceResponse,
};
use crate::subscription::{
    NotificationMessage, PublishPayload, RequestedParameters, Subscription, SubscriptionLimits,
    SubscriptionParameters, TickOutcome,
};

// =============================================================================
// Limits
// =============================================================================

/// Per-session limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionLimits {
    /// Subscription parameter bounds.
    pub subscription: SubscriptionLimits,
    /// Monitored item parameter bounds.
    pub monitored_item: MonitoredItemLimits,
    /// Overflow policy for items that do not choose one.
    pub discard_oldest: bool,
    /// Subscriptions per session.
    pub max_subscriptions: usize,
    /// Queued publish requests per session.
    pub max_publish_requests: usize,
    /// Stored continuation points per session.
    pub max_continuation_points: usize,
}

impl SessionLimits {
    /// Derives the limits from configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            subscription: SubscriptionLimits::from_config(&config.subscription),
            monitored_item: MonitoredItemLimits::from_config(&config.monitored_item),
            discard_oldest: config.monitored_item.discard_oldest,
            max_subscriptions: config.subscription.max_subscriptions_per_session,
            max_publish_requests: config.subscription.max_publish_requests,
            max_continuation_points: config.session.max_continuation_points,
        }
    }
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

/// A publish response ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishDelivery {
    /// Channel the request arrived on.
    pub channel_id: ChannelId,
    /// Request id to answer.
    pub request_id: RequestId,
    /// The response.
    pub response: ResponseEnvelope,
}

/// Result of a publishing tick that the owner has to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionSignal {
    /// Nothing beyond the delivered responses.
    None,
    /// The subscription expired and was removed.
    Expired(SubscriptionId),
}

// =============================================================================
// Session
// =============================================================================

/// A client session.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    name: String,
    token: AuthenticationToken,
    timeout: Duration,
    last_activity: Instant,
    channel_id: Option<ChannelId>,
    activated: bool,
    closed: bool,
    limits: SessionLimits,
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
    publish: PublishEngine,
    /// Final status changes of expired subscriptions, owed to the next
    /// publish requests.
    expired: VecDeque<PublishPayload>,
    continuation: ContinuationPointManager<ReferenceDescription>,
    subscription_ids: SharedSequence,
    sink: mpsc::Sender<TimerEvent>,
    outbox: Vec<PublishDelivery>,
}

impl Session {
    /// Creates a session bound to the channel that created it.
    pub fn new(
        id: SessionId,
        name: impl Into<String>,
        channel_id: ChannelId,
        timeout: Duration,
        limits: SessionLimits,
        subscription_ids: SharedSequence,
        sink: mpsc::Sender<TimerEvent>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            token: AuthenticationToken::generate(),
            timeout,
            last_activity: Instant::now(),
            channel_id: Some(channel_id),
            activated: false,
            closed: false,
            limits,
            subscriptions: BTreeMap::new(),
            publish: PublishEngine::new(limits.max_publish_requests),
            expired: VecDeque::new(),
            continuation: ContinuationPointManager::new(limits.max_continuation_points),
            subscription_ids,
            sink,
            outbox: Vec::new(),
        }
    }

    /// Returns the session id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the session name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the authentication token.
    pub fn token(&self) -> &AuthenticationToken {
        &self.token
    }

    /// Returns the revised timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the bound channel.
    pub fn channel_id(&self) -> Option<ChannelId> {
        self.channel_id
    }

    /// Returns `true` once activated.
    pub fn is_activated(&self) -> bool {
        self.activated
    }

    /// Returns `true` once closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns the number of owned subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Looks up a subscription.
    pub fn subscription(&self, id: SubscriptionId) -> Option<&Subscription> {
        self.subscriptions.get(&id)
    }

    /// Returns the owned subscription ids.
    pub fn subscription_ids(&self) -> Vec<SubscriptionId> {
        self.subscriptions.keys().copied().collect()
    }

    /// Returns the number of queued publish requests.
    pub fn pending_publish_requests(&self) -> usize {
        self.publish.pending_requests()
    }

    /// Returns the number of stored continuation points.
    pub fn continuation_points(&self) -> usize {
        self.continuation.len()
    }

    /// Records client activity.
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Returns `true` once the timeout elapsed without activity.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.last_activity) >= self.timeout
    }

    /// Takes the responses produced since the last call.
    pub fn take_deliveries(&mut self) -> Vec<PublishDelivery> {
        std::mem::take(&mut self.outbox)
    }

    // -------------------------------------------------------------------------
    // Channel binding
    // -------------------------------------------------------------------------

    /// Activates the session on `channel_id`. Returns the channel it was
    /// bound to before, if that is a different one.
    pub fn activate(&mut self, channel_id: ChannelId) -> Result<Option<ChannelId>, SessionError> {
        if self.closed {
            return Err(SessionError::closed(self.id.value()));
        }
        let previous = self.channel_id.replace(channel_id);
        self.activated = true;
        Ok(previous.filter(|previous| *previous != channel_id))
    }

    /// Checks that a request may run on `channel_id`.
    pub fn check_channel(&self, channel_id: ChannelId) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::closed(self.id.value()));
        }
        if self.channel_id != Some(channel_id) {
            return Err(SessionError::ChannelMismatch {
                session_id: self.id.value(),
                channel_id: channel_id.value(),
            });
        }
        if !self.activated {
            return Err(SessionError::not_activated(self.id.value()));
        }
        Ok(())
    }

    /// Forgets a closed channel and the publish requests it queued.
    pub fn on_channel_closed(&mut self, channel_id: ChannelId) {
        let discarded = self.publish.discard_channel(channel_id);
        if self.channel_id == Some(channel_id) {
            self.channel_id = None;
            tracing::debug!(
                session_id = %self.id,
                channel_id = %channel_id,
                discarded,
                "Session detached from channel"
            );
        }
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Creates and starts a subscription.
    pub fn create_subscription(
        &mut self,
        requested: &RequestedParameters,
    ) -> Result<(SubscriptionId, SubscriptionParameters), SubscriptionError> {
        if self.subscriptions.len() >= self.limits.max_subscriptions {
            return Err(SubscriptionError::TooManySubscriptions {
                max: self.limits.max_subscriptions,
            });
        }

        let params = self.limits.subscription.revise(requested);
        let id = SubscriptionId::new(self.subscription_ids.next());
        let mut subscription = Subscription::new(
            id,
            self.id,
            params,
            self.limits.subscription.max_monitored_items,
            self.sink.clone(),
        );
        subscription.start();
        self.subscriptions.insert(id, subscription);
        self.publish.register(id);

        tracing::info!(
            session_id = %self.id,
            subscription_id = %id,
            publishing_interval_ms = params.publishing_interval.as_millis() as u64,
            keep_alive_count = params.max_keep_alive_count,
            lifetime_count = params.max_lifetime_count,
            "Subscription created"
        );
        Ok((id, params))
    }

    /// Revises and applies new parameters.
    pub fn modify_subscription(
        &mut self,
        id: SubscriptionId,
        requested: &RequestedParameters,
    ) -> Result<SubscriptionParameters, SubscriptionError> {
        let params = self.limits.subscription.revise(requested);
        let subscription = self.subscription_mut(id)?;
        subscription.modify(params);
        Ok(*subscription.parameters())
    }

    /// Deletes a subscription.
    pub fn delete_subscription(&mut self, id: SubscriptionId) -> Result<(), SubscriptionError> {
        let mut subscription = self
            .subscriptions
            .remove(&id)
            .ok_or_else(|| SubscriptionError::not_found(id.value()))?;
        subscription.close();
        self.publish.unregister(id);
        tracing::info!(session_id = %self.id, subscription_id = %id, "Subscription deleted");

        if self.subscriptions.is_empty() {
            self.flush_requests(StatusCode::BAD_NO_SUBSCRIPTION);
        }
        Ok(())
    }

    /// Enables or disables publishing. Returns one result per id.
    pub fn set_publishing_mode(&mut self, enabled: bool, ids: &[SubscriptionId]) -> Vec<StatusCode> {
        ids.iter()
            .map(|id| match self.subscriptions.get_mut(id) {
                Some(subscription) => {
                    subscription.set_publishing_enabled(enabled);
                    StatusCode::GOOD
                }
                None => StatusCode::BAD_SUBSCRIPTION_ID_INVALID,
            })
            .collect()
    }

    fn subscription_mut(&mut self, id: SubscriptionId) -> Result<&mut Subscription, SubscriptionError> {
        self.subscriptions
            .get_mut(&id)
            .ok_or_else(|| SubscriptionError::not_found(id.value()))
    }

    // -------------------------------------------------------------------------
    // Monitored items
    // -------------------------------------------------------------------------

    /// Creates monitored items. Each item's initial value is read and queued.
    pub fn create_monitored_items(
        &mut self,
        id: SubscriptionId,
        requests: &[MonitoredItemCreateRequest],
        space: &dyn AddressSpace,
    ) -> Result<Vec<MonitoredItemCreateResult>, SubscriptionError> {
        let limits = self.limits;
        let subscription = self.subscription_mut(id)?;
        let publishing_interval = subscription.parameters().publishing_interval;

        let results = requests
            .iter()
            .map(|request| {
                let initial = space.read(&request.item_to_monitor);
                if initial.status == StatusCode::BAD_NODE_ID_UNKNOWN
                    || initial.status == StatusCode::BAD_ATTRIBUTE_ID_INVALID
                {
                    return MonitoredItemCreateResult::failed(initial.status);
                }

                let sampling_interval = limits
                    .monitored_item
                    .revise_sampling_interval(request.sampling_interval_ms, publishing_interval);
                let queue_size = limits.monitored_item.revise_queue_size(request.queue_size);
                let settings = MonitoredItemSettings {
                    client_handle: request.client_handle,
                    item: request.item_to_monitor.clone(),
                    mode: request.monitoring_mode,
                    sampling_interval,
                    queue_size,
                    discard_oldest: request.discard_oldest.unwrap_or(limits.discard_oldest),
                };

                match subscription.create_monitored_item(settings) {
                    Ok(item_id) => {
                        // Only sampling items take the initial value.
                        let _ = subscription.sample_item(item_id, initial);
                        MonitoredItemCreateResult {
                            status_code: StatusCode::GOOD,
                            monitored_item_id: item_id,
                            revised_sampling_interval_ms: sampling_interval.as_secs_f64() * 1000.0,
                            revised_queue_size: queue_size as u32,
                        }
                    }
                    Err(e) => MonitoredItemCreateResult::failed(e.status_code()),
                }
            })
            .collect();
        Ok(results)
    }

    /// Deletes monitored items. Returns one result per id.
    pub fn delete_monitored_items(
        &mut self,
        id: SubscriptionId,
        item_ids: &[MonitoredItemId],
    ) -> Result<Vec<StatusCode>, SubscriptionError> {
        let subscription = self.subscription_mut(id)?;
        Ok(item_ids
            .iter()
            .map(|item_id| match subscription.delete_monitored_item(*item_id) {
                Ok(()) => StatusCode::GOOD,
                Err(e) => e.status_code(),
            })
            .collect())
    }

    /// Changes monitoring modes. Returns one result per id.
    pub fn set_monitoring_mode(
        &mut self,
        id: SubscriptionId,
        mode: MonitoringMode,
        item_ids: &[MonitoredItemId],
    ) -> Result<Vec<StatusCode>, SubscriptionError> {
        let subscription = self.subscription_mut(id)?;
        Ok(item_ids
            .iter()
            .map(|item_id| match subscription.set_monitoring_mode(*item_id, mode) {
                Ok(()) => StatusCode::GOOD,
                Err(e) => e.status_code(),
            })
            .collect())
    }

    // -------------------------------------------------------------------------
    // Publish
    // -------------------------------------------------------------------------

    /// Handles a Publish request: applies its acknowledgements, then queues
    /// it or answers it immediately.
    pub fn publish(&mut self, mut request: PendingPublish, acknowledgements: &[SubscriptionAcknowledgement]) {
        request.ack_results = acknowledgements
            .iter()
            .map(|ack| match self.subscriptions.get_mut(&ack.subscription_id) {
                Some(subscription) => match subscription.acknowledge(ack.sequence_number) {
                    Ok(()) => StatusCode::GOOD,
                    Err(e) => e.status_code(),
                },
                None => StatusCode::BAD_SUBSCRIPTION_ID_INVALID,
            })
            .collect();

        if let Some(status_change) = self.expired.pop_front() {
            self.deliver(request, status_change);
            return;
        }

        if self.subscriptions.is_empty() {
            self.answer(request, StatusCode::BAD_NO_SUBSCRIPTION);
            return;
        }

        if let Some(evicted) = self.publish.enqueue(request) {
            tracing::warn!(session_id = %self.id, "Publish queue full, oldest request dropped");
            self.answer(evicted, StatusCode::BAD_TOO_MANY_PUBLISH_REQUESTS);
        }
        self.serve_late();
    }

    /// Returns a retained message.
    pub fn republish(
        &mut self,
        id: SubscriptionId,
        sequence_number: u32,
    ) -> Result<NotificationMessage, SubscriptionError> {
        self.subscription_mut(id)?.republish(sequence_number)
    }

    /// Runs a publishing tick of one subscription.
    pub fn on_subscription_tick(&mut self, id: SubscriptionId, space: &dyn AddressSpace) -> SubscriptionSignal {
        let Some(subscription) = self.subscriptions.get_mut(&id) else {
            return SubscriptionSignal::None;
        };

        match subscription.tick(|item| space.read(item)) {
            TickOutcome::Idle => SubscriptionSignal::None,
            TickOutcome::Notification | TickOutcome::KeepAlive { .. } => {
                self.deliver_or_mark_late(id);
                SubscriptionSignal::None
            }
            TickOutcome::Expired => {
                self.remove_expired(id);
                SubscriptionSignal::Expired(id)
            }
        }
    }

    /// Samples one monitored item. Ticks for removed items are ignored.
    pub fn on_sampling_tick(&mut self, id: SubscriptionId, item_id: MonitoredItemId, space: &dyn AddressSpace) {
        let Some(subscription) = self.subscriptions.get_mut(&id) else {
            return;
        };
        let Some(item) = subscription.item_to_monitor(item_id).cloned() else {
            return;
        };
        let value = space.read(&item);
        if let Ok(true) = subscription.sample_item(item_id, value) {
            tracing::trace!(subscription_id = %id, item_id = %item_id, "Value changed");
        }
    }

    /// Answers queued requests whose timeout hint has passed.
    pub fn expire_publish_requests(&mut self, now: Instant) {
        for request in self.publish.expire_requests(now) {
            self.answer(request, StatusCode::BAD_TIMEOUT);
        }
    }

    /// Answers queued requests with the subscription's messages until either
    /// runs out. Leftover messages leave the subscription late.
    fn deliver_or_mark_late(&mut self, id: SubscriptionId) {
        while let Some(subscription) = self.subscriptions.get_mut(&id) {
            let Some(request) = self.publish.pop_request() else {
                subscription.mark_late();
                self.publish.mark_late(id);
                tracing::trace!(subscription_id = %id, "Subscription late");
                return;
            };
            let payload = subscription.take_publish();
            let more = payload.more_notifications;
            self.deliver(request, payload);
            if !more {
                return;
            }
        }
    }

    fn serve_late(&mut self) {
        while self.publish.pending_requests() > 0 {
            let Some(id) = self.publish.next_late() else {
                break;
            };
            let Some(subscription) = self.subscriptions.get_mut(&id) else {
                continue;
            };
            if subscription.state().is_terminal() {
                continue;
            }
            let Some(request) = self.publish.pop_request() else {
                break;
            };
            let payload = subscription.take_publish();
            if payload.more_notifications {
                subscription.mark_late();
                self.publish.mark_late(id);
            }
            self.deliver(request, payload);
        }
    }

    fn remove_expired(&mut self, id: SubscriptionId) {
        let Some(mut subscription) = self.subscriptions.remove(&id) else {
            return;
        };
        self.publish.unregister(id);
        self.expired
            .push_back(subscription.take_status_change(StatusCode::BAD_TIMEOUT));
        while !self.expired.is_empty() {
            let Some(request) = self.publish.pop_request() else {
                break;
            };
            if let Some(status_change) = self.expired.pop_front() {
                self.deliver(request, status_change);
            }
        }
        if self.subscriptions.is_empty() {
            self.flush_requests(StatusCode::BAD_NO_SUBSCRIPTION);
        }
    }

    fn deliver(&mut self, request: PendingPublish, payload: PublishPayload) {
        tracing::debug!(
            session_id = %self.id,
            subscription_id = %payload.subscription_id,
            sequence_number = payload.message.sequence_number,
            keep_alive = payload.message.is_keep_alive(),
            "Publish response"
        );
        let body = ServiceResponse::Publish(PublishResponse {
            subscription_id: payload.subscription_id,
            available_sequence_numbers: payload.available_sequence_numbers,
            more_notifications: payload.more_notifications,
            notification_message: payload.message,
            results: request.ack_results,
        });
        self.outbox.push(PublishDelivery {
            channel_id: request.channel_id,
            request_id: request.request_id,
            response: ResponseEnvelope::ok(request.request_handle, body),
        });
    }

    fn answer(&mut self, request: PendingPublish, status: StatusCode) {
        self.outbox.push(PublishDelivery {
            channel_id: request.channel_id,
            request_id: request.request_id,
            response: ResponseEnvelope::fault(request.request_handle, status),
        });
    }

    fn flush_requests(&mut self, status: StatusCode) {
        for request in self.publish.drain_requests() {
            self.answer(request, status);
        }
    }

    // -------------------------------------------------------------------------
    // Browse
    // -------------------------------------------------------------------------

    /// Browses nodes, paging results through continuation points.
    pub fn browse(&mut self, max_references: u32, nodes: &[NodeId], space: &dyn AddressSpace) -> BrowseResponse {
        let results = nodes
            .iter()
            .map(|node| match space.browse(node) {
                Ok(references) => match self.continuation.register(max_references as usize, references) {
                    Ok(page) => BrowseResult {
                        status_code: StatusCode::GOOD,
                        continuation_point: page.continuation_point,
                        references: page.values,
                    },
                    Err(e) => BrowseResult::empty(e.status_code()),
                },
                Err(status) => BrowseResult::empty(status),
            })
            .collect();
        BrowseResponse { results }
    }

    /// Continues or releases browses.
    pub fn browse_next(
        &mut self,
        release: bool,
        points: &[crate::continuation::ContinuationPoint],
    ) -> BrowseResponse {
        let results = points
            .iter()
            .map(|point| {
                if release {
                    return match self.continuation.cancel(point) {
                        Ok(()) => BrowseResult::empty(StatusCode::GOOD),
                        Err(e) => BrowseResult::empty(e.status_code()),
                    };
                }
                match self.continuation.get_next(point) {
                    Ok(page) => BrowseResult {
                        status_code: StatusCode::GOOD,
                        continuation_point: page.continuation_point,
                        references: page.values,
                    },
                    Err(e) => BrowseResult::empty(e.status_code()),
                }
            })
            .collect();
        BrowseResponse { results }
    }

    // -------------------------------------------------------------------------
    // Close
    // -------------------------------------------------------------------------

    /// Closes the session. Only `delete_subscriptions = true` is supported;
    /// `false` leaves the session untouched.
    ///
    /// Returns the deleted subscription ids.
    pub fn close(&mut self, delete_subscriptions: bool) -> Result<Vec<SubscriptionId>, SessionError> {
        if !delete_subscriptions {
            return Err(SessionError::DeleteSubscriptionsRequired {
                session_id: self.id.value(),
            });
        }
        if self.closed {
            return Ok(Vec::new());
        }

        let deleted: Vec<_> = self.subscriptions.keys().copied().collect();
        for (_, mut subscription) in std::mem::take(&mut self.subscriptions) {
            subscription.close();
        }
        for request in self.publish.shutdown() {
            self.answer(request, StatusCode::BAD_SESSION_CLOSED);
        }
        self.expired.clear();
        self.continuation.clear();
        self.closed = true;
        self.activated = false;

        debug_assert_eq!(self.subscriptions.len(), 0);
        tracing::info!(
            session_id = %self.id,
            subscriptions = deleted.len(),
            "Session closed"
        );
        Ok(deleted)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::{MemoryAddressSpace, reference_types};
    use uasrv_core::{IdSequence, ReadValueId, Variant};

    struct Fixture {
        session: Session,
        space: MemoryAddressSpace,
        _timers: mpsc::Receiver<TimerEvent>,
    }

    fn fixture() -> Fixture {
        let (tx, rx) = mpsc::channel(64);
        let space = MemoryAddressSpace::new();
        space.add_variable(NodeId::numeric(2, 1), "Temperature", 20.0f64);
        let mut session = Session::new(
            SessionId::new(1),
            "test",
            ChannelId::new(1),
            Duration::from_secs(30),
            SessionLimits::default(),
            IdSequence::shared(),
            tx,
        );
        session.activate(ChannelId::new(1)).unwrap();
        Fixture {
            session,
            space,
            _timers: rx,
        }
    }

    fn pending(request_id: u32) -> PendingPublish {
        PendingPublish {
            channel_id: ChannelId::new(1),
            request_id: RequestId::new(request_id),
            request_handle: request_id,
            timeout_hint: Duration::ZERO,
            received_at: Instant::now(),
            ack_results: Vec::new(),
        }
    }

    fn item_request(handle: u32) -> MonitoredItemCreateRequest {
        MonitoredItemCreateRequest {
            item_to_monitor: ReadValueId::value_of(NodeId::numeric(2, 1)),
            monitoring_mode: MonitoringMode::Reporting,
            client_handle: handle,
            sampling_interval_ms: 100.0,
            queue_size: 10,
            discard_oldest: None,
        }
    }

    fn publish_body(delivery: &PublishDelivery) -> &PublishResponse {
        match &delivery.response.body {
            ServiceResponse::Publish(body) => body,
            other => panic!("expected publish response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscriptions() {
        let mut f = fixture();
        f.session.publish(pending(1), &[]);
        let deliveries = f.session.take_deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(
            deliveries[0].response.header.service_result,
            StatusCode::BAD_NO_SUBSCRIPTION
        );
        assert_eq!(f.session.pending_publish_requests(), 0);
    }

    #[tokio::test]
    async fn test_notification_delivered_against_queued_request() {
        let mut f = fixture();
        let (id, _) = f.session.create_subscription(&RequestedParameters::default()).unwrap();
        let results = f
            .session
            .create_monitored_items(id, &[item_request(5)], &f.space)
            .unwrap();
        assert_eq!(results[0].status_code, StatusCode::GOOD);

        f.session.publish(pending(1), &[]);
        assert!(f.session.take_deliveries().is_empty());

        f.session.on_subscription_tick(id, &f.space);
        let deliveries = f.session.take_deliveries();
        assert_eq!(deliveries.len(), 1);
        let body = publish_body(&deliveries[0]);
        assert_eq!(body.subscription_id, id);
        assert_eq!(body.notification_message.sequence_number, 1);
        assert_eq!(body.notification_message.notifications[0].client_handle, 5);
        assert_eq!(
            body.notification_message.notifications[0].value.value,
            Variant::Double(20.0)
        );
        assert_eq!(body.available_sequence_numbers, vec![1]);
    }

    #[tokio::test]
    async fn test_late_subscription_served_on_next_request() {
        let mut f = fixture();
        let (id, _) = f.session.create_subscription(&RequestedParameters::default()).unwrap();
        f.session
            .create_monitored_items(id, &[item_request(1)], &f.space)
            .unwrap();

        f.session.on_subscription_tick(id, &f.space);
        assert!(f.session.take_deliveries().is_empty());
        assert_eq!(
            f.session.subscription(id).unwrap().state(),
            crate::subscription::SubscriptionState::Late
        );

        f.session.publish(pending(2), &[]);
        let deliveries = f.session.take_deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].request_id, RequestId::new(2));
        assert_eq!(publish_body(&deliveries[0]).notification_message.notifications.len(), 1);
    }

    #[tokio::test]
    async fn test_acknowledgement_results() {
        let mut f = fixture();
        let (id, _) = f.session.create_subscription(&RequestedParameters::default()).unwrap();
        f.session
            .create_monitored_items(id, &[item_request(1)], &f.space)
            .unwrap();
        f.session.publish(pending(1), &[]);
        f.session.on_subscription_tick(id, &f.space);
        f.session.take_deliveries();

        let acks = [
            SubscriptionAcknowledgement {
                subscription_id: id,
                sequence_number: 1,
            },
            SubscriptionAcknowledgement {
                subscription_id: id,
                sequence_number: 42,
            },
            SubscriptionAcknowledgement {
                subscription_id: SubscriptionId::new(999),
                sequence_number: 1,
            },
        ];
        f.session.publish(pending(2), &acks);
        f.space.set_value(&NodeId::numeric(2, 1), uasrv_core::DataValue::new(21.0f64));
        f.session.on_subscription_tick(id, &f.space);
        let deliveries = f.session.take_deliveries();
        assert_eq!(deliveries.len(), 1);
        let body = publish_body(&deliveries[0]);
        assert_eq!(body.notification_message.sequence_number, 2);
        assert_eq!(
            body.results,
            vec![
                StatusCode::GOOD,
                StatusCode::BAD_SEQUENCE_NUMBER_UNKNOWN,
                StatusCode::BAD_SUBSCRIPTION_ID_INVALID,
            ]
        );
    }

    #[tokio::test]
    async fn test_expiry_removes_subscription_and_flushes_requests() {
        let mut f = fixture();
        let (id, params) = f
            .session
            .create_subscription(&RequestedParameters {
                lifetime_count: 3,
                max_keep_alive_count: 1,
                ..RequestedParameters::default()
            })
            .unwrap();
        assert_eq!(params.max_lifetime_count, 3);

        let mut expired = false;
        for _ in 0..3 {
            if f.session.on_subscription_tick(id, &f.space) == SubscriptionSignal::Expired(id) {
                expired = true;
            }
        }
        assert!(expired);
        assert_eq!(f.session.subscription_count(), 0);

        f.session.publish(pending(9), &[]);
        f.session.publish(pending(10), &[]);
        let deliveries = f.session.take_deliveries();
        assert_eq!(deliveries.len(), 2);
        let last_word = publish_body(&deliveries[0]);
        assert_eq!(last_word.subscription_id, id);
        assert_eq!(
            last_word.notification_message.status_change,
            Some(StatusCode::BAD_TIMEOUT)
        );
        assert_eq!(
            deliveries[1].response.header.service_result,
            StatusCode::BAD_NO_SUBSCRIPTION
        );
    }

    #[tokio::test]
    async fn test_status_change_of_expired_subscription_goes_to_next_request() {
        let mut f = fixture();
        let (expiring, _) = f
            .session
            .create_subscription(&RequestedParameters {
                lifetime_count: 3,
                max_keep_alive_count: 1,
                ..RequestedParameters::default()
            })
            .unwrap();
        let (survivor, _) = f.session.create_subscription(&RequestedParameters::default()).unwrap();
        f.session
            .create_monitored_items(expiring, &[item_request(1)], &f.space)
            .unwrap();

        f.session.publish(pending(1), &[]);
        f.session.on_subscription_tick(expiring, &f.space);
        let first = f.session.take_deliveries();
        assert_eq!(publish_body(&first[0]).notification_message.sequence_number, 1);

        // Unchanged value: keep-alives go unanswered until the lifetime runs out.
        let signals: Vec<_> = (0..3)
            .map(|_| f.session.on_subscription_tick(expiring, &f.space))
            .collect();
        assert_eq!(signals.last(), Some(&SubscriptionSignal::Expired(expiring)));
        assert_eq!(f.session.subscription_ids(), vec![survivor]);
        assert!(f.session.take_deliveries().is_empty());

        f.session.publish(pending(2), &[]);
        let deliveries = f.session.take_deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].request_id, RequestId::new(2));
        let body = publish_body(&deliveries[0]);
        assert_eq!(body.subscription_id, expiring);
        assert_eq!(body.notification_message.sequence_number, 2);
        assert_eq!(
            body.notification_message.status_change,
            Some(StatusCode::BAD_TIMEOUT)
        );
        assert!(body.notification_message.notifications.is_empty());
        assert!(body.available_sequence_numbers.is_empty());

        // The survivor has nothing ready, so the next request waits.
        f.session.publish(pending(3), &[]);
        assert!(f.session.take_deliveries().is_empty());
        assert_eq!(f.session.pending_publish_requests(), 1);
    }

    #[tokio::test]
    async fn test_queued_request_takes_status_change_at_expiry() {
        let mut f = fixture();
        let (id, _) = f
            .session
            .create_subscription(&RequestedParameters {
                lifetime_count: 3,
                max_keep_alive_count: 1,
                ..RequestedParameters::default()
            })
            .unwrap();
        for _ in 0..2 {
            f.session.on_subscription_tick(id, &f.space);
        }
        // A request that reached the queue without being matched to the late
        // subscription.
        f.session.publish.unregister(id);
        f.session.publish.enqueue(pending(4));

        assert_eq!(
            f.session.on_subscription_tick(id, &f.space),
            SubscriptionSignal::Expired(id)
        );
        let deliveries = f.session.take_deliveries();
        assert_eq!(deliveries.len(), 1);
        let body = publish_body(&deliveries[0]);
        assert_eq!(body.notification_message.sequence_number, 1);
        assert_eq!(
            body.notification_message.status_change,
            Some(StatusCode::BAD_TIMEOUT)
        );
        assert_eq!(f.session.pending_publish_requests(), 0);
    }

    fn split_subscription(f: &mut Fixture) -> SubscriptionId {
        let (id, params) = f
            .session
            .create_subscription(&RequestedParameters {
                max_notifications_per_publish: 1,
                ..RequestedParameters::default()
            })
            .unwrap();
        assert_eq!(params.max_notifications_per_publish, 1);
        f.session
            .create_monitored_items(id, &[item_request(1), item_request(2)], &f.space)
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_late_subscription_drains_across_consecutive_requests() {
        let mut f = fixture();
        let id = split_subscription(&mut f);

        f.session.on_subscription_tick(id, &f.space);
        assert!(f.session.take_deliveries().is_empty());

        f.session.publish(pending(1), &[]);
        f.session.publish(pending(2), &[]);
        let deliveries = f.session.take_deliveries();
        assert_eq!(deliveries.len(), 2);
        let first = publish_body(&deliveries[0]);
        assert!(first.more_notifications);
        assert_eq!(first.notification_message.sequence_number, 1);
        let second = publish_body(&deliveries[1]);
        assert!(!second.more_notifications);
        assert_eq!(second.notification_message.sequence_number, 2);
        assert_eq!(f.session.pending_publish_requests(), 0);

        // Drained: a third request waits for the next tick.
        f.session.publish(pending(3), &[]);
        assert!(f.session.take_deliveries().is_empty());
        assert_eq!(f.session.pending_publish_requests(), 1);
    }

    #[tokio::test]
    async fn test_tick_answers_every_queued_request_it_can() {
        let mut f = fixture();
        let id = split_subscription(&mut f);

        for request_id in 1..=3 {
            f.session.publish(pending(request_id), &[]);
        }
        f.session.on_subscription_tick(id, &f.space);

        let deliveries = f.session.take_deliveries();
        let sequence_numbers: Vec<_> = deliveries
            .iter()
            .map(|d| publish_body(d).notification_message.sequence_number)
            .collect();
        assert_eq!(sequence_numbers, vec![1, 2]);
        assert_eq!(deliveries[0].request_id, RequestId::new(1));
        assert_eq!(deliveries[1].request_id, RequestId::new(2));
        assert_eq!(f.session.pending_publish_requests(), 1);
    }

    #[tokio::test]
    async fn test_tick_leaves_remainder_late_when_requests_run_out() {
        let mut f = fixture();
        let id = split_subscription(&mut f);

        f.session.publish(pending(1), &[]);
        f.session.on_subscription_tick(id, &f.space);
        assert_eq!(f.session.take_deliveries().len(), 1);
        assert_eq!(
            f.session.subscription(id).unwrap().state(),
            crate::subscription::SubscriptionState::Late
        );

        f.session.publish(pending(2), &[]);
        let deliveries = f.session.take_deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(publish_body(&deliveries[0]).notification_message.sequence_number, 2);
    }

    #[tokio::test]
    async fn test_close_requires_delete_subscriptions() {
        let mut f = fixture();
        f.session.create_subscription(&RequestedParameters::default()).unwrap();
        assert!(matches!(
            f.session.close(false),
            Err(SessionError::DeleteSubscriptionsRequired { .. })
        ));
        assert_eq!(f.session.subscription_count(), 1);

        f.session.publish(pending(1), &[]);
        let deleted = f.session.close(true).unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(f.session.subscription_count(), 0);
        assert!(f.session.is_closed());
        let deliveries = f.session.take_deliveries();
        assert_eq!(
            deliveries[0].response.header.service_result,
            StatusCode::BAD_SESSION_CLOSED
        );
    }

    #[tokio::test]
    async fn test_subscription_limit() {
        let (tx, _rx) = mpsc::channel(8);
        let limits = SessionLimits {
            max_subscriptions: 1,
            ..SessionLimits::default()
        };
        let mut session = Session::new(
            SessionId::new(1),
            "s",
            ChannelId::new(1),
            Duration::from_secs(1),
            limits,
            IdSequence::shared(),
            tx,
        );
        session.create_subscription(&RequestedParameters::default()).unwrap();
        assert!(matches!(
            session.create_subscription(&RequestedParameters::default()),
            Err(SubscriptionError::TooManySubscriptions { max: 1 })
        ));
    }

    #[tokio::test]
    async fn test_unknown_node_item_fails() {
        let mut f = fixture();
        let (id, _) = f.session.create_subscription(&RequestedParameters::default()).unwrap();
        let mut request = item_request(1);
        request.item_to_monitor = ReadValueId::value_of(NodeId::numeric(9, 9));
        let results = f.session.create_monitored_items(id, &[request], &f.space).unwrap();
        assert_eq!(results[0].status_code, StatusCode::BAD_NODE_ID_UNKNOWN);
    }

    #[tokio::test]
    async fn test_browse_paging() {
        let mut f = fixture();
        let folder = NodeId::numeric(2, 100);
        f.space.add_object(folder.clone(), "Folder");
        for i in 0..5u32 {
            let node = NodeId::numeric(2, 200 + i);
            f.space.add_variable(node.clone(), format!("N{i}"), i);
            f.space.add_reference(&folder, reference_types::organizes(), &node);
        }

        let first = f.session.browse(2, &[folder], &f.space);
        let token = first.results[0].continuation_point.clone().unwrap();
        assert_eq!(first.results[0].references.len(), 2);

        let second = f.session.browse_next(false, &[token.clone()]);
        assert_eq!(second.results[0].references.len(), 2);
        let next = second.results[0].continuation_point.clone().unwrap();

        let stale = f.session.browse_next(false, &[token]);
        assert_eq!(
            stale.results[0].status_code,
            StatusCode::BAD_CONTINUATION_POINT_INVALID
        );

        let released = f.session.browse_next(true, &[next]);
        assert_eq!(released.results[0].status_code, StatusCode::GOOD);
        assert_eq!(f.session.continuation_points(), 0);
    }

    #[tokio::test]
    async fn test_channel_binding() {
        let mut f = fixture();
        assert!(f.session.check_channel(ChannelId::new(1)).is_ok());
        assert!(matches!(
            f.session.check_channel(ChannelId::new(2)),
            Err(SessionError::ChannelMismatch { .. })
        ));

        f.session.on_channel_closed(ChannelId::new(1));
        assert_eq!(f.session.channel_id(), None);
        assert_eq!(f.session.activate(ChannelId::new(2)).unwrap(), None);
        assert!(f.session.check_channel(ChannelId::new(2)).is_ok());
        assert_eq!(
            f.session.activate(ChannelId::new(3)).unwrap(),
            Some(ChannelId::new(2))
        );
    }
}
