// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Messages exchanged between connection tasks, timers and the engine.
//!
//! ```text
//!  connection task ──EngineEvent──►┐
//!                                  ├──► engine task ──Outbound──► connection task
//!  TimerHandle ──────TimerEvent───►┘
//! ```
//!
//! Lifecycle notifications for embedders are [`ServerEvent`]s delivered
//! through an `ObserverList`.

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use uasrv_core::{ChannelId, MonitoredItemId, RequestId, SessionId, SubscriptionId};

use crate::engine::EngineDiagnostics;

/// Commands sent to the engine by connection tasks and the server handle.
#[derive(Debug)]
pub enum EngineEvent {
    /// A channel completed its handshake.
    ChannelOpened {
        /// Channel id.
        channel_id: ChannelId,
        /// Where the engine sends responses for this channel.
        outbound: mpsc::UnboundedSender<Outbound>,
    },
    /// A channel is gone.
    ChannelClosed {
        /// Channel id.
        channel_id: ChannelId,
    },
    /// A service request arrived.
    Request {
        /// Originating channel.
        channel_id: ChannelId,
        /// Request id to answer with.
        request_id: RequestId,
        /// Encoded request.
        payload: Bytes,
    },
    /// Diagnostics query.
    Diagnostics {
        /// Reply slot.
        reply: oneshot::Sender<EngineDiagnostics>,
    },
    /// Close every session and stop.
    Shutdown {
        /// Signalled once all sessions are closed.
        done: oneshot::Sender<()>,
    },
}

/// Ticks produced by timers owned by engine entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// A subscription's publishing interval elapsed.
    SubscriptionTick {
        /// Owning session.
        session_id: SessionId,
        /// Subscription.
        subscription_id: SubscriptionId,
    },
    /// A monitored item's sampling interval elapsed.
    SamplingTick {
        /// Owning session.
        session_id: SessionId,
        /// Owning subscription.
        subscription_id: SubscriptionId,
        /// Item.
        item_id: MonitoredItemId,
    },
    /// Session expiry and publish request timeout sweep.
    Housekeeping,
}

/// Messages the engine sends to a connection task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A response to send on the channel.
    Response {
        /// Request being answered.
        request_id: RequestId,
        /// Encoded response.
        payload: Bytes,
    },
    /// A session was activated on this channel.
    AttachSession(SessionId),
    /// A session left this channel.
    DetachSession(SessionId),
}

/// Lifecycle notifications published to server observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A connection was admitted.
    ChannelOpened {
        /// Channel id.
        channel_id: ChannelId,
        /// Remote address.
        peer: SocketAddr,
    },
    /// A channel was unregistered.
    ChannelClosed {
        /// Channel id.
        channel_id: ChannelId,
    },
    /// An idle channel was closed to admit a new connection.
    ChannelEvicted {
        /// Channel id.
        channel_id: ChannelId,
    },
    /// A connection was refused.
    ConnectionRefused {
        /// Remote address.
        peer: SocketAddr,
    },
    /// A session was created.
    SessionCreated {
        /// Session id.
        session_id: SessionId,
        /// Creating channel.
        channel_id: ChannelId,
    },
    /// A session was activated on a channel.
    SessionActivated {
        /// Session id.
        session_id: SessionId,
        /// Bound channel.
        channel_id: ChannelId,
    },
    /// A session was closed by its client.
    SessionClosed {
        /// Session id.
        session_id: SessionId,
    },
    /// A session timed out.
    SessionExpired {
        /// Session id.
        session_id: SessionId,
    },
    /// A subscription was created.
    SubscriptionCreated {
        /// Owning session.
        session_id: SessionId,
        /// Subscription id.
        subscription_id: SubscriptionId,
    },
    /// A subscription was deleted.
    SubscriptionDeleted {
        /// Owning session.
        session_id: SessionId,
        /// Subscription id.
        subscription_id: SubscriptionId,
    },
    /// A subscription reached its lifetime count.
    SubscriptionExpired {
        /// Owning session.
        session_id: SessionId,
        /// Subscription id.
        subscription_id: SubscriptionId,
    },
}
