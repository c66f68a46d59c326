// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The engine task.
//!
//! One task owns every session, subscription and monitored item and handles
//! events one at a time:
//!
//! ```text
//!                 ┌──────────────────────────── Engine ───────────────────────────┐
//!  EngineEvent ──►│ ChannelOpened / ChannelClosed ─► channel table                │
//!  (bounded)      │ Request ─► decode ─► dispatch ─► SessionManager ─► Session     │──► Outbound
//!                 │ Diagnostics / Shutdown                                        │   (per channel)
//!  TimerEvent ───►│ SubscriptionTick / SamplingTick / Housekeeping                │
//!  (bounded)      └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Connection tasks never touch session state. They forward decoded `MSG`
//! payloads and receive encoded responses. Publish responses produced by a
//! tick or a later request are collected from the session outboxes after
//! every event and routed to the channel the request arrived on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::instrument;
use uasrv_config::ServerConfig;
use uasrv_core::{
    ChannelId, IdSequence, ListenerError, ObserverList, RequestId, SessionId, StatusCode,
    SubscriptionError, SubscriptionId, TimerHandle, UaError, UaResult,
};

use crate::address_space::AddressSpace;
use crate::events::{EngineEvent, Outbound, ServerEvent, TimerEvent};
use crate::publish::PendingPublish;
use crate::service::{
    CreateMonitoredItemsResponse, CreateSessionResponse, CreateSubscriptionResponse, EmptyResponse,
    ModifySubscriptionResponse, RepublishResponse, RequestEnvelope, ResponseEnvelope,
    ServiceCodec, ServiceRequest, ServiceResponse, StatusResults,
};
use crate::session::{PublishDelivery, Session, SubscriptionSignal};
use crate::session_manager::SessionManager;
use crate::subscription::{SubscriptionDiagnostics, SubscriptionParameters, SubscriptionState};

/// Capacity of the engine event queue.
pub const ENGINE_QUEUE_CAPACITY: usize = 1024;

/// Capacity of the timer event queue.
pub const TIMER_QUEUE_CAPACITY: usize = 4096;

// =============================================================================
// Diagnostics
// =============================================================================

/// Point-in-time view of one subscription.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionSummary {
    /// Owning session.
    pub session_id: SessionId,
    /// Subscription id.
    pub subscription_id: SubscriptionId,
    /// Current state.
    pub state: SubscriptionState,
    /// Number of monitored items.
    pub monitored_items: usize,
    /// Counters.
    pub diagnostics: SubscriptionDiagnostics,
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineDiagnostics {
    /// Channels with an issued token.
    pub channels: usize,
    /// Live sessions.
    pub sessions: usize,
    /// Live subscriptions over all sessions.
    pub subscriptions: usize,
    /// Queued publish requests over all sessions.
    pub pending_publish_requests: usize,
    /// Service requests handled.
    pub requests: u64,
    /// Requests answered with a service fault.
    pub service_faults: u64,
    /// Sessions removed by timeout.
    pub expired_sessions: u64,
    /// Per-subscription details.
    pub subscription_details: Vec<SubscriptionSummary>,
}

#[derive(Debug, Default)]
struct EngineCounters {
    requests: u64,
    service_faults: u64,
    expired_sessions: u64,
}

// =============================================================================
// EngineHandle
// =============================================================================

/// Sender side of the engine, cloned into every connection task.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    events: mpsc::Sender<EngineEvent>,
}

impl EngineHandle {
    /// Registers a channel whose token was issued.
    pub async fn channel_opened(
        &self,
        channel_id: ChannelId,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> UaResult<()> {
        self.send(EngineEvent::ChannelOpened {
            channel_id,
            outbound,
        })
        .await
    }

    /// Unregisters a channel. Sessions bound to it stay alive until their timeout.
    pub async fn channel_closed(&self, channel_id: ChannelId) {
        if self
            .send(EngineEvent::ChannelClosed { channel_id })
            .await
            .is_err()
        {
            tracing::trace!(channel_id = %channel_id, "Engine gone, channel close not delivered");
        }
    }

    /// Forwards a service request.
    pub async fn request(&self, channel_id: ChannelId, request_id: RequestId, payload: Bytes) -> UaResult<()> {
        self.send(EngineEvent::Request {
            channel_id,
            request_id,
            payload,
        })
        .await
    }

    /// Asks for a diagnostics snapshot. Returns `None` once the engine stopped.
    pub async fn diagnostics(&self) -> Option<EngineDiagnostics> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineEvent::Diagnostics { reply }).await.ok()?;
        rx.await.ok()
    }

    /// Closes every session and stops the engine.
    pub async fn shutdown(&self) {
        let (done, rx) = oneshot::channel();
        if self.send(EngineEvent::Shutdown { done }).await.is_ok() && rx.await.is_err() {
            tracing::trace!("Engine stopped before confirming shutdown");
        }
    }

    /// Returns `true` once the engine task is gone.
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }

    async fn send(&self, event: EngineEvent) -> UaResult<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| ListenerError::ShuttingDown.into())
    }
}

// =============================================================================
// Engine
// =============================================================================

enum Reply {
    Response(ServiceResponse),
    Fault(StatusCode),
    Queued,
}

/// Session and subscription state machine driver.
pub struct Engine {
    sessions: SessionManager,
    channels: HashMap<ChannelId, mpsc::UnboundedSender<Outbound>>,
    space: Arc<dyn AddressSpace>,
    codec: Arc<dyn ServiceCodec>,
    observers: Arc<ObserverList<ServerEvent>>,
    events: mpsc::Receiver<EngineEvent>,
    timers: mpsc::Receiver<TimerEvent>,
    housekeeping: TimerHandle,
    counters: EngineCounters,
}

impl Engine {
    /// Creates an engine and the handle that feeds it.
    pub fn new(
        config: &ServerConfig,
        space: Arc<dyn AddressSpace>,
        codec: Arc<dyn ServiceCodec>,
        observers: Arc<ObserverList<ServerEvent>>,
    ) -> (Self, EngineHandle) {
        let (events_tx, events) = mpsc::channel(ENGINE_QUEUE_CAPACITY);
        let (timer_tx, timers) = mpsc::channel(TIMER_QUEUE_CAPACITY);

        let housekeeping = TimerHandle::periodic(
            config.session.housekeeping_interval(),
            timer_tx.clone(),
            TimerEvent::Housekeeping,
        );

        let engine = Self {
            sessions: SessionManager::new(config, IdSequence::shared(), timer_tx),
            channels: HashMap::new(),
            space,
            codec,
            observers,
            events,
            timers,
            housekeeping,
            counters: EngineCounters::default(),
        };
        (engine, EngineHandle { events: events_tx })
    }

    /// Creates an engine and runs it on a new task.
    pub fn spawn(
        config: &ServerConfig,
        space: Arc<dyn AddressSpace>,
        codec: Arc<dyn ServiceCodec>,
        observers: Arc<ObserverList<ServerEvent>>,
    ) -> (EngineHandle, JoinHandle<()>) {
        let (engine, handle) = Self::new(config, space, codec, observers);
        (handle, tokio::spawn(engine.run()))
    }

    /// Runs until shut down or until every handle is dropped.
    #[instrument(skip(self), name = "engine")]
    pub async fn run(mut self) {
        tracing::info!("Engine started");

        loop {
            tokio::select! {
                biased;

                event = self.events.recv() => {
                    match event {
                        Some(EngineEvent::Shutdown { done }) => {
                            self.shutdown();
                            let _ = done.send(());
                            break;
                        }
                        Some(event) => self.handle_event(event),
                        None => {
                            tracing::info!("Engine handles dropped, stopping");
                            self.shutdown();
                            break;
                        }
                    }
                }

                Some(timer) = self.timers.recv() => {
                    self.handle_timer(timer);
                }
            }
            self.route_deliveries();
        }

        tracing::info!(
            requests = self.counters.requests,
            faults = self.counters.service_faults,
            expired_sessions = self.counters.expired_sessions,
            "Engine stopped"
        );
    }

    // =========================================================================
    // Events
    // =========================================================================

    fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::ChannelOpened {
                channel_id,
                outbound,
            } => {
                self.channels.insert(channel_id, outbound);
                tracing::debug!(channel_id = %channel_id, "Channel registered with engine");
            }
            EngineEvent::ChannelClosed { channel_id } => {
                self.channels.remove(&channel_id);
                self.sessions.on_channel_closed(channel_id);
                tracing::debug!(channel_id = %channel_id, "Channel unregistered from engine");
            }
            EngineEvent::Request {
                channel_id,
                request_id,
                payload,
            } => self.handle_request(channel_id, request_id, &payload),
            EngineEvent::Diagnostics { reply } => {
                let _ = reply.send(self.diagnostics());
            }
            // Handled by the run loop.
            EngineEvent::Shutdown { .. } => {}
        }
    }

    fn handle_timer(&mut self, timer: TimerEvent) {
        match timer {
            TimerEvent::SubscriptionTick {
                session_id,
                subscription_id,
            } => {
                let Some(session) = self.sessions.get_mut(session_id) else {
                    return;
                };
                if session.on_subscription_tick(subscription_id, self.space.as_ref())
                    == SubscriptionSignal::Expired(subscription_id)
                {
                    tracing::info!(
                        session_id = %session_id,
                        subscription_id = %subscription_id,
                        "Subscription expired"
                    );
                    self.observers.notify(&ServerEvent::SubscriptionExpired {
                        session_id,
                        subscription_id,
                    });
                }
            }
            TimerEvent::SamplingTick {
                session_id,
                subscription_id,
                item_id,
            } => {
                if let Some(session) = self.sessions.get_mut(session_id) {
                    session.on_sampling_tick(subscription_id, item_id, self.space.as_ref());
                }
            }
            TimerEvent::Housekeeping => self.housekeeping(),
        }
    }

    fn housekeeping(&mut self) {
        let now = Instant::now();
        for session in self.sessions.iter_mut() {
            session.expire_publish_requests(now);
        }

        for mut session in self.sessions.take_expired(now) {
            let session_id = session.id();
            tracing::warn!(
                session_id = %session_id,
                timeout_ms = session.timeout().as_millis() as u64,
                "Session timed out"
            );
            self.counters.expired_sessions += 1;
            self.retire_session(&mut session);
            self.observers
                .notify(&ServerEvent::SessionExpired { session_id });
        }
    }

    fn shutdown(&mut self) {
        self.housekeeping.cancel();
        let mut sessions = self.sessions.drain();
        tracing::info!(sessions = sessions.len(), "Engine closing sessions");
        for session in &mut sessions {
            let session_id = session.id();
            self.retire_session(session);
            self.observers.notify(&ServerEvent::SessionClosed { session_id });
        }
    }

    /// Closes a session already removed from the table and flushes its outbox.
    fn retire_session(&mut self, session: &mut Session) {
        let session_id = session.id();
        match session.close(true) {
            Ok(deleted) => {
                for subscription_id in deleted {
                    self.observers.notify(&ServerEvent::SubscriptionDeleted {
                        session_id,
                        subscription_id,
                    });
                }
            }
            Err(e) => UaError::from(e).log("retire session"),
        }
        if let Some(channel_id) = session.channel_id() {
            send_outbound(&self.channels, channel_id, Outbound::DetachSession(session_id));
        }
        let deliveries = session.take_deliveries();
        self.route(deliveries);
    }

    // =========================================================================
    // Requests
    // =========================================================================

    fn handle_request(&mut self, channel_id: ChannelId, request_id: RequestId, payload: &[u8]) {
        self.counters.requests += 1;

        let request = match self.codec.decode_request(payload) {
            Ok(request) => request,
            Err(e) => {
                e.log("decode request");
                self.counters.service_faults += 1;
                self.respond(
                    channel_id,
                    request_id,
                    &ResponseEnvelope::fault(0, StatusCode::BAD_DECODING_ERROR),
                );
                return;
            }
        };

        let handle = request.header.request_handle;
        let service = request.body.name();
        tracing::debug!(channel_id = %channel_id, request_id = %request_id, service, handle, "Service request");

        match self.dispatch(channel_id, request_id, request) {
            Ok(Reply::Response(body)) => {
                self.respond(channel_id, request_id, &ResponseEnvelope::ok(handle, body));
            }
            Ok(Reply::Queued) => {}
            Ok(Reply::Fault(status)) => {
                self.counters.service_faults += 1;
                tracing::debug!(channel_id = %channel_id, service, status = %status, "Service not supported");
                self.respond(channel_id, request_id, &ResponseEnvelope::fault(handle, status));
            }
            Err(e) => {
                self.counters.service_faults += 1;
                tracing::debug!(
                    channel_id = %channel_id,
                    service,
                    status = %e.status_code(),
                    error = %e,
                    "Service fault"
                );
                self.respond(
                    channel_id,
                    request_id,
                    &ResponseEnvelope::fault(handle, e.status_code()),
                );
            }
        }
    }

    fn dispatch(
        &mut self,
        channel_id: ChannelId,
        request_id: RequestId,
        request: RequestEnvelope,
    ) -> UaResult<Reply> {
        let RequestEnvelope { header, body } = request;

        if let ServiceRequest::CreateSession(create) = &body {
            let session = self.sessions.create(
                &create.session_name,
                create.requested_session_timeout_ms,
                channel_id,
            )?;
            let response = CreateSessionResponse {
                session_id: session.id(),
                authentication_token: session.token().clone(),
                revised_session_timeout_ms: session.timeout().as_millis() as u64,
            };
            self.observers.notify(&ServerEvent::SessionCreated {
                session_id: response.session_id,
                channel_id,
            });
            return Ok(Reply::Response(ServiceResponse::CreateSession(response)));
        }

        let space = Arc::clone(&self.space);
        let session = self.sessions.lookup(&header.authentication_token)?;
        let session_id = session.id();

        if let ServiceRequest::ActivateSession(_) = &body {
            let previous = session.activate(channel_id)?;
            session.touch(Instant::now());
            if let Some(previous) = previous {
                send_outbound(&self.channels, previous, Outbound::DetachSession(session_id));
            }
            send_outbound(&self.channels, channel_id, Outbound::AttachSession(session_id));
            tracing::info!(session_id = %session_id, channel_id = %channel_id, "Session activated");
            self.observers.notify(&ServerEvent::SessionActivated {
                session_id,
                channel_id,
            });
            return Ok(Reply::Response(ServiceResponse::ActivateSession(EmptyResponse {})));
        }

        session.check_channel(channel_id)?;
        session.touch(Instant::now());

        let body = match body {
            ServiceRequest::CreateSession(_) | ServiceRequest::ActivateSession(_) => {
                return Ok(Reply::Fault(StatusCode::BAD_INTERNAL_ERROR));
            }

            ServiceRequest::CloseSession(close) => {
                let deleted = session.close(close.delete_subscriptions)?;
                let bound = session.channel_id();
                if let Some(mut closed) = self.sessions.remove(session_id) {
                    let deliveries = closed.take_deliveries();
                    self.route(deliveries);
                }
                if let Some(bound) = bound {
                    send_outbound(&self.channels, bound, Outbound::DetachSession(session_id));
                }
                for subscription_id in deleted {
                    self.observers.notify(&ServerEvent::SubscriptionDeleted {
                        session_id,
                        subscription_id,
                    });
                }
                self.observers.notify(&ServerEvent::SessionClosed { session_id });
                ServiceResponse::CloseSession(EmptyResponse {})
            }

            ServiceRequest::CreateSubscription(requested) => {
                let (subscription_id, params) = session.create_subscription(&requested)?;
                self.observers.notify(&ServerEvent::SubscriptionCreated {
                    session_id,
                    subscription_id,
                });
                ServiceResponse::CreateSubscription(CreateSubscriptionResponse {
                    subscription_id,
                    revised_publishing_interval_ms: millis(&params),
                    revised_lifetime_count: params.max_lifetime_count,
                    revised_max_keep_alive_count: params.max_keep_alive_count,
                })
            }

            ServiceRequest::ModifySubscription(modify) => {
                let params = session.modify_subscription(modify.subscription_id, &modify.parameters)?;
                ServiceResponse::ModifySubscription(ModifySubscriptionResponse {
                    revised_publishing_interval_ms: millis(&params),
                    revised_lifetime_count: params.max_lifetime_count,
                    revised_max_keep_alive_count: params.max_keep_alive_count,
                })
            }

            ServiceRequest::DeleteSubscriptions(delete) => {
                require_operations(delete.subscription_ids.len())?;
                let mut results = Vec::with_capacity(delete.subscription_ids.len());
                for subscription_id in delete.subscription_ids {
                    match session.delete_subscription(subscription_id) {
                        Ok(()) => {
                            results.push(StatusCode::GOOD);
                            self.observers.notify(&ServerEvent::SubscriptionDeleted {
                                session_id,
                                subscription_id,
                            });
                        }
                        Err(e) => results.push(e.status_code()),
                    }
                }
                ServiceResponse::DeleteSubscriptions(StatusResults { results })
            }

            ServiceRequest::SetPublishingMode(mode) => {
                require_operations(mode.subscription_ids.len())?;
                let results = session.set_publishing_mode(mode.publishing_enabled, &mode.subscription_ids);
                ServiceResponse::SetPublishingMode(StatusResults { results })
            }

            ServiceRequest::CreateMonitoredItems(create) => {
                require_operations(create.items_to_create.len())?;
                let results =
                    session.create_monitored_items(create.subscription_id, &create.items_to_create, space.as_ref())?;
                ServiceResponse::CreateMonitoredItems(CreateMonitoredItemsResponse { results })
            }

            ServiceRequest::DeleteMonitoredItems(delete) => {
                require_operations(delete.monitored_item_ids.len())?;
                let results = session.delete_monitored_items(delete.subscription_id, &delete.monitored_item_ids)?;
                ServiceResponse::DeleteMonitoredItems(StatusResults { results })
            }

            ServiceRequest::SetMonitoringMode(mode) => {
                require_operations(mode.monitored_item_ids.len())?;
                let results = session.set_monitoring_mode(
                    mode.subscription_id,
                    mode.monitoring_mode,
                    &mode.monitored_item_ids,
                )?;
                ServiceResponse::SetMonitoringMode(StatusResults { results })
            }

            ServiceRequest::Publish(publish) => {
                let pending = PendingPublish {
                    channel_id,
                    request_id,
                    request_handle: header.request_handle,
                    timeout_hint: Duration::from_millis(u64::from(header.timeout_hint_ms)),
                    received_at: Instant::now(),
                    ack_results: Vec::new(),
                };
                session.publish(pending, &publish.subscription_acknowledgements);
                return Ok(Reply::Queued);
            }

            ServiceRequest::Republish(republish) => {
                let notification_message =
                    session.republish(republish.subscription_id, republish.retransmit_sequence_number)?;
                ServiceResponse::Republish(RepublishResponse { notification_message })
            }

            ServiceRequest::Browse(browse) => {
                require_operations(browse.nodes_to_browse.len())?;
                ServiceResponse::Browse(session.browse(
                    browse.requested_max_references_per_node,
                    &browse.nodes_to_browse,
                    space.as_ref(),
                ))
            }

            ServiceRequest::BrowseNext(next) => {
                require_operations(next.continuation_points.len())?;
                ServiceResponse::BrowseNext(
                    session.browse_next(next.release_continuation_points, &next.continuation_points),
                )
            }

            ServiceRequest::Unsupported => {
                return Ok(Reply::Fault(StatusCode::BAD_SERVICE_UNSUPPORTED));
            }
        };
        Ok(Reply::Response(body))
    }

    // =========================================================================
    // Output
    // =========================================================================

    fn respond(&self, channel_id: ChannelId, request_id: RequestId, response: &ResponseEnvelope) {
        match self.codec.encode_response(response) {
            Ok(payload) => send_outbound(&self.channels, channel_id, Outbound::Response { request_id, payload }),
            Err(e) => e.log("encode response"),
        }
    }

    fn route(&self, deliveries: Vec<PublishDelivery>) {
        for delivery in deliveries {
            self.respond(delivery.channel_id, delivery.request_id, &delivery.response);
        }
    }

    fn route_deliveries(&mut self) {
        let deliveries: Vec<_> = self
            .sessions
            .iter_mut()
            .flat_map(Session::take_deliveries)
            .collect();
        self.route(deliveries);
    }

    fn diagnostics(&self) -> EngineDiagnostics {
        let mut diagnostics = EngineDiagnostics {
            channels: self.channels.len(),
            sessions: self.sessions.len(),
            requests: self.counters.requests,
            service_faults: self.counters.service_faults,
            expired_sessions: self.counters.expired_sessions,
            ..EngineDiagnostics::default()
        };
        for session in self.sessions.iter() {
            diagnostics.pending_publish_requests += session.pending_publish_requests();
            for subscription_id in session.subscription_ids() {
                let Some(subscription) = session.subscription(subscription_id) else {
                    continue;
                };
                diagnostics.subscriptions += 1;
                diagnostics.subscription_details.push(SubscriptionSummary {
                    session_id: session.id(),
                    subscription_id,
                    state: subscription.state(),
                    monitored_items: subscription.monitored_item_count(),
                    diagnostics: subscription.diagnostics(),
                });
            }
        }
        diagnostics
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("sessions", &self.sessions.len())
            .field("channels", &self.channels.len())
            .finish()
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn send_outbound(
    channels: &HashMap<ChannelId, mpsc::UnboundedSender<Outbound>>,
    channel_id: ChannelId,
    message: Outbound,
) {
    match channels.get(&channel_id) {
        Some(outbound) => {
            if outbound.send(message).is_err() {
                tracing::debug!(channel_id = %channel_id, "Channel task gone, message dropped");
            }
        }
        None => tracing::debug!(channel_id = %channel_id, "No such channel, message dropped"),
    }
}

fn millis(params: &SubscriptionParameters) -> f64 {
    params.publishing_interval.as_secs_f64() * 1000.0
}

fn require_operations(count: usize) -> UaResult<()> {
    if count == 0 {
        return Err(SubscriptionError::NothingToDo.into());
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::MemoryAddressSpace;
    use crate::service::{
        ActivateSessionRequest, CloseSessionRequest, CreateMonitoredItemsRequest,
        CreateSessionRequest, DeleteSubscriptionsRequest, JsonServiceCodec,
        MonitoredItemCreateRequest, PublishRequest,
    };
    use crate::subscription::RequestedParameters;
    use uasrv_core::{AuthenticationToken, EventCollector, MonitoringMode, NodeId, ReadValueId};

    struct Harness {
        handle: EngineHandle,
        task: JoinHandle<()>,
        outbound: mpsc::UnboundedReceiver<Outbound>,
        events: Arc<EventCollector<ServerEvent>>,
        channel_id: ChannelId,
        next_request: u32,
    }

    impl Harness {
        async fn start(config: ServerConfig) -> Self {
            let space = Arc::new(MemoryAddressSpace::new());
            space.add_variable(NodeId::numeric(2, 1), "Pressure", 1.5f64);
            let observers = Arc::new(ObserverList::new());
            let events = Arc::new(EventCollector::new(64));
            observers.register(events.clone());

            let (handle, task) = Engine::spawn(
                &config,
                space,
                Arc::new(JsonServiceCodec::new()),
                observers,
            );
            let (tx, outbound) = mpsc::unbounded_channel();
            let channel_id = ChannelId::new(1);
            handle.channel_opened(channel_id, tx).await.unwrap();

            Self {
                handle,
                task,
                outbound,
                events,
                channel_id,
                next_request: 1,
            }
        }

        async fn send(&mut self, token: &AuthenticationToken, body: ServiceRequest) -> RequestId {
            let request_id = RequestId::new(self.next_request);
            self.next_request += 1;
            let envelope = RequestEnvelope::new(token.clone(), request_id.value(), body);
            let payload = JsonServiceCodec.encode_request(&envelope).unwrap();
            self.handle
                .request(self.channel_id, request_id, payload)
                .await
                .unwrap();
            request_id
        }

        async fn next_response(&mut self) -> (RequestId, ResponseEnvelope) {
            loop {
                match self.outbound.recv().await.expect("engine stopped") {
                    Outbound::Response {
                        request_id,
                        payload,
                    } => return (request_id, JsonServiceCodec.decode_response(&payload).unwrap()),
                    Outbound::AttachSession(_) | Outbound::DetachSession(_) => continue,
                }
            }
        }

        async fn call(&mut self, token: &AuthenticationToken, body: ServiceRequest) -> ResponseEnvelope {
            let request_id = self.send(token, body).await;
            let (answered, response) = self.next_response().await;
            assert_eq!(answered, request_id);
            response
        }

        async fn open_session(&mut self) -> AuthenticationToken {
            let response = self
                .call(
                    &AuthenticationToken::default(),
                    ServiceRequest::CreateSession(CreateSessionRequest {
                        session_name: "test".to_string(),
                        requested_session_timeout_ms: 5_000,
                    }),
                )
                .await;
            let ServiceResponse::CreateSession(created) = response.body else {
                panic!("expected create_session, got {:?}", response.body);
            };
            let token = created.authentication_token;
            let activated = self
                .call(&token, ServiceRequest::ActivateSession(ActivateSessionRequest::default()))
                .await;
            assert!(activated.header.service_result.is_good());
            token
        }
    }

    #[tokio::test]
    async fn test_activate_attaches_before_response() {
        let mut h = Harness::start(ServerConfig::default()).await;
        let created = h
            .call(
                &AuthenticationToken::default(),
                ServiceRequest::CreateSession(CreateSessionRequest::default()),
            )
            .await;
        let ServiceResponse::CreateSession(created) = created.body else {
            panic!("expected create_session");
        };

        h.send(
            &created.authentication_token,
            ServiceRequest::ActivateSession(ActivateSessionRequest::default()),
        )
        .await;
        assert_eq!(
            h.outbound.recv().await,
            Some(Outbound::AttachSession(created.session_id))
        );
        assert!(matches!(h.outbound.recv().await, Some(Outbound::Response { .. })));

        let events = h.events.events();
        assert!(events.contains(&ServerEvent::SessionActivated {
            session_id: created.session_id,
            channel_id: h.channel_id,
        }));
    }

    #[tokio::test]
    async fn test_service_faults() {
        let mut h = Harness::start(ServerConfig::default()).await;

        let unknown = h
            .call(
                &AuthenticationToken::new("forged"),
                ServiceRequest::Publish(PublishRequest::default()),
            )
            .await;
        assert_eq!(unknown.header.service_result, StatusCode::BAD_SESSION_ID_INVALID);

        let token = h.open_session().await;
        let unsupported = h.call(&token, ServiceRequest::Unsupported).await;
        assert_eq!(unsupported.header.service_result, StatusCode::BAD_SERVICE_UNSUPPORTED);
        assert_eq!(unsupported.body, ServiceResponse::ServiceFault);

        let nothing = h
            .call(
                &token,
                ServiceRequest::DeleteSubscriptions(DeleteSubscriptionsRequest {
                    subscription_ids: Vec::new(),
                }),
            )
            .await;
        assert_eq!(nothing.header.service_result, StatusCode::BAD_NOTHING_TO_DO);

        h.handle
            .request(h.channel_id, RequestId::new(99), Bytes::from_static(b"{broken"))
            .await
            .unwrap();
        let (request_id, garbled) = h.next_response().await;
        assert_eq!(request_id, RequestId::new(99));
        assert_eq!(garbled.header.service_result, StatusCode::BAD_DECODING_ERROR);

        let diagnostics = h.handle.diagnostics().await.unwrap();
        assert_eq!(diagnostics.service_faults, 4);
        assert_eq!(diagnostics.sessions, 1);
    }

    #[tokio::test]
    async fn test_close_session_without_delete_is_rejected() {
        let mut h = Harness::start(ServerConfig::default()).await;
        let token = h.open_session().await;

        let rejected = h
            .call(
                &token,
                ServiceRequest::CloseSession(CloseSessionRequest {
                    delete_subscriptions: false,
                }),
            )
            .await;
        assert_eq!(rejected.header.service_result, StatusCode::BAD_NOT_SUPPORTED);

        let closed = h
            .call(
                &token,
                ServiceRequest::CloseSession(CloseSessionRequest {
                    delete_subscriptions: true,
                }),
            )
            .await;
        assert!(closed.header.service_result.is_good());

        let again = h
            .call(&token, ServiceRequest::Publish(PublishRequest::default()))
            .await;
        assert_eq!(again.header.service_result, StatusCode::BAD_SESSION_ID_INVALID);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_delivers_data_change_then_keep_alive() {
        let mut h = Harness::start(ServerConfig::default()).await;
        let token = h.open_session().await;

        let created = h
            .call(
                &token,
                ServiceRequest::CreateSubscription(RequestedParameters {
                    publishing_interval_ms: 100.0,
                    max_keep_alive_count: 3,
                    ..RequestedParameters::default()
                }),
            )
            .await;
        let ServiceResponse::CreateSubscription(subscription) = created.body else {
            panic!("expected create_subscription");
        };

        let items = h
            .call(
                &token,
                ServiceRequest::CreateMonitoredItems(CreateMonitoredItemsRequest {
                    subscription_id: subscription.subscription_id,
                    items_to_create: vec![MonitoredItemCreateRequest {
                        item_to_monitor: ReadValueId::value_of(NodeId::numeric(2, 1)),
                        monitoring_mode: MonitoringMode::Reporting,
                        client_handle: 77,
                        sampling_interval_ms: 50.0,
                        queue_size: 1,
                        discard_oldest: None,
                    }],
                }),
            )
            .await;
        let ServiceResponse::CreateMonitoredItems(items) = items.body else {
            panic!("expected create_monitored_items");
        };
        assert!(items.results[0].status_code.is_good());

        h.send(&token, ServiceRequest::Publish(PublishRequest::default())).await;
        let (_, first) = h.next_response().await;
        let ServiceResponse::Publish(first) = first.body else {
            panic!("expected publish");
        };
        assert_eq!(first.notification_message.sequence_number, 1);
        assert_eq!(first.notification_message.notifications[0].client_handle, 77);

        h.send(&token, ServiceRequest::Publish(PublishRequest::default())).await;
        let (_, second) = h.next_response().await;
        let ServiceResponse::Publish(second) = second.body else {
            panic!("expected publish");
        };
        assert!(second.notification_message.is_keep_alive());
        assert_eq!(second.notification_message.sequence_number, 2);

        let diagnostics = h.handle.diagnostics().await.unwrap();
        assert_eq!(diagnostics.subscriptions, 1);
        assert_eq!(diagnostics.subscription_details[0].monitored_items, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_session_expires() {
        let mut h = Harness::start(ServerConfig::default()).await;
        let response = h
            .call(
                &AuthenticationToken::default(),
                ServiceRequest::CreateSession(CreateSessionRequest {
                    session_name: "short".to_string(),
                    requested_session_timeout_ms: 1_000,
                }),
            )
            .await;
        let ServiceResponse::CreateSession(created) = response.body else {
            panic!("expected create_session");
        };

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        let diagnostics = h.handle.diagnostics().await.unwrap();
        assert_eq!(diagnostics.sessions, 0);
        assert_eq!(diagnostics.expired_sessions, 1);
        assert!(h.events.events().contains(&ServerEvent::SessionExpired {
            session_id: created.session_id,
        }));
    }

    #[tokio::test]
    async fn test_shutdown_stops_engine() {
        let h = Harness::start(ServerConfig::default()).await;
        h.handle.shutdown().await;
        h.task.await.unwrap();
        assert!(h.handle.is_closed());
        assert!(h.handle.diagnostics().await.is_none());
    }
}
