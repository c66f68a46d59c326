// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Secure channel state machine.
//!
//! ```text
//!  INIT ──start_handshake──► WAIT_FOR_OPEN ──OPN(issue)──► OPEN ──► CLOSING ──► CLOSED
//!                               │    ▲                      │  ▲
//!                               │    └── HEL / ACK          │  └── OPN(renew)
//!                               └── timeout: BadTimeout     └── token past grace: abort
//! ```
//!
//! The channel is plain state. The connection task feeds it frames and timer
//! events and acts on what it returns. Token lifetimes are revised as
//! `min(requested, default, maximum)` floored at the minimum, with a
//! requested value of 0 meaning the default. A renewed channel keeps the
//! prior token valid until 120% of its lifetime has passed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::Instant;
use uasrv_config::ServerConfig;
use uasrv_core::{
    ChannelError, ChannelId, IdSequence, MessageSecurityMode, RequestId, SessionId, TimerHandle,
    TokenId,
};

use crate::frame::{
    AcknowledgeMessage, ChannelSecurityToken, HelloMessage, OpenRequest, OpenResponse,
    PROTOCOL_VERSION, SecurityTokenRequestType, ServiceMessage,
};
use crate::registry::ChannelStatus;

/// Grace overlap applied to token lifetimes, as a fraction of 100.
const TOKEN_GRACE_PERCENT: u32 = 120;

/// Sequence numbers below this may follow a wrap-around.
const SEQUENCE_WRAP_WINDOW: u32 = 1024;

// =============================================================================
// ChannelState
// =============================================================================

/// Lifecycle state of a secure channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelState {
    /// Created, handshake not started.
    #[default]
    Init,
    /// Waiting for the first OpenSecureChannel request.
    WaitForOpen,
    /// Token issued; service messages flow.
    Open,
    /// Shutting down.
    Closing,
    /// Closed.
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "INIT"),
            Self::WaitForOpen => write!(f, "WAIT_FOR_OPEN"),
            Self::Open => write!(f, "OPEN"),
            Self::Closing => write!(f, "CLOSING"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Events a channel's timer delivers to its connection task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelTimerEvent {
    /// No OpenSecureChannel request arrived in time.
    HandshakeTimeout,
    /// A token reached its grace deadline.
    TokenCheck,
}

// =============================================================================
// ChannelLimits
// =============================================================================

/// Handshake and token limits applied to every channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelLimits {
    /// Lifetime used for a requested lifetime of 0, and upper bound of any revision.
    pub default_lifetime: Duration,
    /// Floor of a revised lifetime.
    pub min_lifetime: Duration,
    /// Configured ceiling of a revised lifetime.
    pub max_lifetime: Duration,
    /// Time allowed between accept and the first OpenSecureChannel request.
    pub handshake_timeout: Duration,
    /// Largest frame the server accepts.
    pub max_message_size: u32,
}

impl ChannelLimits {
    /// Derives the limits from configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        let channel = &config.secure_channel;
        Self {
            default_lifetime: Duration::from_millis(channel.default_token_lifetime_ms),
            min_lifetime: Duration::from_millis(channel.minimum_token_lifetime_ms),
            max_lifetime: Duration::from_millis(channel.maximum_token_lifetime_ms),
            handshake_timeout: config.server.timeout(),
            max_message_size: u32::try_from(config.server.max_message_size).unwrap_or(u32::MAX),
        }
    }

    /// Revises a requested token lifetime in milliseconds.
    pub fn revise_lifetime(&self, requested_ms: u32) -> Duration {
        if requested_ms == 0 {
            return self.default_lifetime.max(self.min_lifetime);
        }
        Duration::from_millis(u64::from(requested_ms))
            .min(self.default_lifetime)
            .min(self.max_lifetime)
            .max(self.min_lifetime)
    }
}

impl Default for ChannelLimits {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

// =============================================================================
// SecurityToken
// =============================================================================

/// A security token issued on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityToken {
    /// Token id.
    pub token_id: TokenId,
    /// Wall-clock issue time reported to the client.
    pub created_at: DateTime<Utc>,
    /// Monotonic issue time used for expiry.
    pub issued: Instant,
    /// Revised lifetime.
    pub lifetime: Duration,
}

impl SecurityToken {
    /// Returns the instant after which the token is no longer accepted.
    pub fn grace_deadline(&self) -> Instant {
        self.issued + self.lifetime * TOKEN_GRACE_PERCENT / 100
    }

    /// Returns `true` once the grace deadline has passed.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.grace_deadline()
    }

    fn to_wire(&self, channel_id: ChannelId) -> ChannelSecurityToken {
        ChannelSecurityToken {
            channel_id,
            token_id: self.token_id,
            created_at: self.created_at,
            revised_lifetime: u32::try_from(self.lifetime.as_millis()).unwrap_or(u32::MAX),
        }
    }
}

// =============================================================================
// SecureChannel
// =============================================================================

/// Per-connection secure channel state.
pub struct SecureChannel {
    id: ChannelId,
    state: ChannelState,
    limits: ChannelLimits,
    status: Arc<ChannelStatus>,
    security_mode: MessageSecurityMode,
    current: Option<SecurityToken>,
    previous: Option<SecurityToken>,
    token_ids: IdSequence,
    send_sequence: IdSequence,
    last_received_sequence: Option<u32>,
    pending_request: Option<RequestId>,
    session: Option<SessionId>,
    hello_received: bool,
    timer: TimerHandle,
    timer_sink: mpsc::Sender<ChannelTimerEvent>,
}

impl SecureChannel {
    /// Creates a channel in `INIT`.
    pub fn new(
        id: ChannelId,
        limits: ChannelLimits,
        status: Arc<ChannelStatus>,
        timer_sink: mpsc::Sender<ChannelTimerEvent>,
    ) -> Self {
        Self {
            id,
            state: ChannelState::Init,
            limits,
            status,
            security_mode: MessageSecurityMode::None,
            current: None,
            previous: None,
            token_ids: IdSequence::new(),
            send_sequence: IdSequence::new(),
            last_received_sequence: None,
            pending_request: None,
            session: None,
            hello_received: false,
            timer: TimerHandle::inactive(),
            timer_sink,
        }
    }

    /// Returns the channel id.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Returns `true` once a token has been issued and the channel is not closing.
    pub fn is_opened(&self) -> bool {
        self.state == ChannelState::Open
    }

    /// Returns `true` while a session is attached.
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Returns the attached session.
    pub fn session_id(&self) -> Option<SessionId> {
        self.session
    }

    /// Returns the negotiated security mode.
    pub fn security_mode(&self) -> MessageSecurityMode {
        self.security_mode
    }

    /// Returns the shared status visible to the listener.
    pub fn status(&self) -> &Arc<ChannelStatus> {
        &self.status
    }

    /// Returns the current token.
    pub fn current_token(&self) -> Option<&SecurityToken> {
        self.current.as_ref()
    }

    /// Returns the prior token still inside its grace period.
    pub fn previous_token(&self) -> Option<&SecurityToken> {
        self.previous.as_ref()
    }

    /// Returns the request awaiting a response.
    pub fn pending_request(&self) -> Option<RequestId> {
        self.pending_request
    }

    /// Returns `true` while the channel's timer task is alive.
    pub fn has_active_timer(&self) -> bool {
        self.timer.is_active()
    }

    // =========================================================================
    // Handshake
    // =========================================================================

    /// Moves to `WAIT_FOR_OPEN` and arms the handshake timeout.
    pub fn start_handshake(&mut self) -> Result<(), ChannelError> {
        if self.state != ChannelState::Init {
            return Err(ChannelError::invalid_state(
                self.id.value(),
                self.state,
                "start handshake",
            ));
        }
        self.state = ChannelState::WaitForOpen;
        self.timer = TimerHandle::once(
            self.limits.handshake_timeout,
            self.timer_sink.clone(),
            ChannelTimerEvent::HandshakeTimeout,
        );
        tracing::debug!(channel_id = %self.id, timeout = ?self.limits.handshake_timeout, "Handshake started");
        Ok(())
    }

    /// Handles a transport hello and returns the acknowledge to send.
    pub fn on_hello(&mut self, hello: &HelloMessage) -> Result<AcknowledgeMessage, ChannelError> {
        if self.state != ChannelState::WaitForOpen || self.hello_received {
            return Err(ChannelError::unexpected_message(self.id.value(), "HEL"));
        }
        self.hello_received = true;

        let max = self.limits.max_message_size;
        let revise = |size: u32| if size == 0 { max } else { size.min(max) };
        tracing::debug!(channel_id = %self.id, endpoint = %hello.endpoint_url, "Hello received");

        Ok(AcknowledgeMessage {
            protocol_version: PROTOCOL_VERSION,
            receive_buffer_size: revise(hello.send_buffer_size),
            send_buffer_size: revise(hello.receive_buffer_size),
            max_message_size: max,
            max_chunk_count: 1,
        })
    }

    /// Handles an OpenSecureChannel request (issue or renew).
    pub fn open(&mut self, request: &OpenRequest) -> Result<OpenResponse, ChannelError> {
        match request.request_type {
            SecurityTokenRequestType::Issue => {
                if self.state != ChannelState::WaitForOpen {
                    return Err(ChannelError::InvalidRequestType {
                        channel_id: self.id.value(),
                        request_type: request.request_type.value(),
                    });
                }
                if !request.security_mode.is_none() {
                    return Err(ChannelError::SecurityModeRejected {
                        mode: request.security_mode.to_string(),
                    });
                }
                self.security_mode = request.security_mode;
            }
            SecurityTokenRequestType::Renew => {
                if self.state != ChannelState::Open {
                    return Err(ChannelError::InvalidRequestType {
                        channel_id: self.id.value(),
                        request_type: request.request_type.value(),
                    });
                }
                if request.channel_id != self.id {
                    return Err(ChannelError::ChannelIdMismatch {
                        expected: self.id.value(),
                        actual: request.channel_id.value(),
                    });
                }
            }
        }
        self.accept_sequence(request.sequence_number)?;

        let token = SecurityToken {
            token_id: TokenId::new(self.token_ids.next()),
            created_at: Utc::now(),
            issued: Instant::now(),
            lifetime: self.limits.revise_lifetime(request.requested_lifetime),
        };
        let wire = token.to_wire(self.id);

        if let Some(prior) = self.current.replace(token) {
            tracing::debug!(
                channel_id = %self.id,
                token_id = %wire.token_id,
                prior_token_id = %prior.token_id,
                lifetime_ms = wire.revised_lifetime,
                "Security token renewed"
            );
            self.previous = Some(prior);
        } else {
            tracing::info!(
                channel_id = %self.id,
                token_id = %wire.token_id,
                lifetime_ms = wire.revised_lifetime,
                "Secure channel opened"
            );
        }

        self.state = ChannelState::Open;
        self.status.set_opened(true);
        self.arm_token_timer();

        Ok(OpenResponse {
            channel_id: self.id,
            sequence_number: self.send_sequence.next(),
            request_id: request.request_id,
            token: wire,
        })
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Checks channel id, token and sequence number of an inbound `MSG`/`CLO`.
    pub fn validate_message(
        &mut self,
        message: &ServiceMessage,
        now: Instant,
    ) -> Result<(), ChannelError> {
        if self.state != ChannelState::Open {
            return Err(ChannelError::unexpected_message(self.id.value(), "MSG"));
        }
        if message.channel_id != self.id {
            return Err(ChannelError::ChannelIdMismatch {
                expected: self.id.value(),
                actual: message.channel_id.value(),
            });
        }

        let current_matches = self
            .current
            .as_ref()
            .is_some_and(|t| t.token_id == message.token_id);
        let previous_matches = self
            .previous
            .as_ref()
            .is_some_and(|t| t.token_id == message.token_id && !t.is_expired(now));
        if !current_matches && !previous_matches {
            return Err(ChannelError::token_unknown(
                self.id.value(),
                message.token_id.value(),
            ));
        }

        self.accept_sequence(message.sequence_number)
    }

    /// Records the request awaiting a response.
    pub fn receive_request(&mut self, request_id: RequestId) {
        if let Some(previous) = self.pending_request.replace(request_id) {
            tracing::trace!(channel_id = %self.id, previous = %previous, request_id = %request_id, "Pipelined request");
        }
        self.status.record_transaction();
    }

    /// Builds the `MSG` carrying a response to `request_id`.
    ///
    /// The message is tagged with the current token and the next send
    /// sequence number. A matching pending request is cleared.
    pub fn response_message(
        &mut self,
        request_id: RequestId,
        payload: Bytes,
    ) -> Result<ServiceMessage, ChannelError> {
        if self.state != ChannelState::Open {
            return Err(ChannelError::invalid_state(
                self.id.value(),
                self.state,
                "send response",
            ));
        }
        let token_id = self
            .current
            .as_ref()
            .map(|t| t.token_id)
            .ok_or_else(|| ChannelError::invalid_state(self.id.value(), self.state, "send response"))?;

        if self.pending_request == Some(request_id) {
            self.pending_request = None;
        }

        Ok(ServiceMessage {
            channel_id: self.id,
            token_id,
            sequence_number: self.send_sequence.next(),
            request_id,
            payload,
        })
    }

    fn accept_sequence(&mut self, received: u32) -> Result<(), ChannelError> {
        if let Some(last) = self.last_received_sequence {
            let wrapped = last > u32::MAX - SEQUENCE_WRAP_WINDOW && received < SEQUENCE_WRAP_WINDOW;
            if received <= last && !wrapped {
                return Err(ChannelError::SequenceNumberInvalid {
                    channel_id: self.id.value(),
                    last,
                    received,
                });
            }
        }
        self.last_received_sequence = Some(received);
        Ok(())
    }

    // =========================================================================
    // Tokens
    // =========================================================================

    /// Discards a prior token past its grace deadline and fails once the
    /// current token is past its own.
    pub fn check_tokens(&mut self, now: Instant) -> Result<(), ChannelError> {
        if self.previous.as_ref().is_some_and(|t| t.is_expired(now)) {
            if let Some(prior) = self.previous.take() {
                tracing::debug!(channel_id = %self.id, token_id = %prior.token_id, "Prior token discarded");
            }
        }

        if let Some(current) = &self.current {
            if current.is_expired(now) {
                return Err(ChannelError::token_expired(
                    self.id.value(),
                    current.token_id.value(),
                ));
            }
        }

        self.arm_token_timer();
        Ok(())
    }

    /// Returns the earliest grace deadline among live tokens.
    pub fn next_token_deadline(&self) -> Option<Instant> {
        [self.current.as_ref(), self.previous.as_ref()]
            .into_iter()
            .flatten()
            .map(SecurityToken::grace_deadline)
            .min()
    }

    fn arm_token_timer(&mut self) {
        self.timer.cancel();
        if let Some(deadline) = self.next_token_deadline() {
            let delay = deadline.saturating_duration_since(Instant::now());
            self.timer = TimerHandle::once(delay, self.timer_sink.clone(), ChannelTimerEvent::TokenCheck);
        }
    }

    // =========================================================================
    // Session attachment
    // =========================================================================

    /// Marks a session as bound to this channel.
    pub fn attach_session(&mut self, session_id: SessionId) {
        self.session = Some(session_id);
        self.status.set_has_session(true);
        tracing::debug!(channel_id = %self.id, session_id = %session_id, "Session attached");
    }

    /// Clears the session binding if it names `session_id`.
    pub fn detach_session(&mut self, session_id: SessionId) {
        if self.session == Some(session_id) {
            self.session = None;
            self.status.set_has_session(false);
            tracing::debug!(channel_id = %self.id, session_id = %session_id, "Session detached");
        }
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Enters `CLOSING` and cancels the timer.
    pub fn begin_close(&mut self) {
        self.timer.cancel();
        if self.state != ChannelState::Closed {
            self.state = ChannelState::Closing;
        }
    }

    /// Enters `CLOSED`. Idempotent.
    pub fn close(&mut self) {
        self.timer.cancel();
        if self.state == ChannelState::Closed {
            return;
        }
        self.state = ChannelState::Closed;
        self.status.set_opened(false);
        self.current = None;
        self.previous = None;
        self.pending_request = None;
        tracing::debug!(channel_id = %self.id, "Secure channel closed");
    }
}

impl fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureChannel")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("token_id", &self.current.as_ref().map(|t| t.token_id))
            .field("session", &self.session)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ChannelLimits {
        ChannelLimits {
            default_lifetime: Duration::from_secs(60),
            min_lifetime: Duration::from_secs(1),
            max_lifetime: Duration::from_secs(3600),
            handshake_timeout: Duration::from_secs(5),
            max_message_size: 65_536,
        }
    }

    fn channel() -> (SecureChannel, mpsc::Receiver<ChannelTimerEvent>) {
        let (tx, rx) = mpsc::channel(4);
        let channel = SecureChannel::new(
            ChannelId::new(7),
            limits(),
            Arc::new(ChannelStatus::default()),
            tx,
        );
        (channel, rx)
    }

    fn open_request(kind: SecurityTokenRequestType, seq: u32, lifetime: u32) -> OpenRequest {
        OpenRequest {
            channel_id: if kind == SecurityTokenRequestType::Issue {
                ChannelId::new(0)
            } else {
                ChannelId::new(7)
            },
            sequence_number: seq,
            request_id: RequestId::new(seq),
            request_type: kind,
            security_mode: MessageSecurityMode::None,
            requested_lifetime: lifetime,
        }
    }

    fn message(token: u32, seq: u32) -> ServiceMessage {
        ServiceMessage {
            channel_id: ChannelId::new(7),
            token_id: TokenId::new(token),
            sequence_number: seq,
            request_id: RequestId::new(seq),
            payload: Bytes::new(),
        }
    }

    #[test]
    fn test_lifetime_revision() {
        let limits = limits();
        assert_eq!(limits.revise_lifetime(0), Duration::from_secs(60));
        assert_eq!(limits.revise_lifetime(10), Duration::from_secs(1));
        assert_eq!(limits.revise_lifetime(30_000), Duration::from_secs(30));
        assert_eq!(limits.revise_lifetime(u32::MAX), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout_fires() {
        let (mut channel, mut rx) = channel();
        channel.start_handshake().unwrap();
        assert_eq!(channel.state(), ChannelState::WaitForOpen);

        assert_eq!(rx.recv().await, Some(ChannelTimerEvent::HandshakeTimeout));
        assert!(channel.start_handshake().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_issue_then_renew() {
        let (mut channel, _rx) = channel();
        channel.start_handshake().unwrap();

        let issued = channel
            .open(&open_request(SecurityTokenRequestType::Issue, 1, 0))
            .unwrap();
        assert!(channel.is_opened());
        assert!(channel.status().is_opened());
        assert_eq!(issued.token.token_id, TokenId::new(1));
        assert_eq!(issued.token.revised_lifetime, 60_000);

        let renewed = channel
            .open(&open_request(SecurityTokenRequestType::Renew, 2, 20_000))
            .unwrap();
        assert_eq!(renewed.token.token_id, TokenId::new(2));
        assert!(renewed.sequence_number > issued.sequence_number);
        assert_eq!(
            channel.previous_token().map(|t| t.token_id),
            Some(TokenId::new(1))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_issue_twice_rejected() {
        let (mut channel, _rx) = channel();
        channel.start_handshake().unwrap();
        channel
            .open(&open_request(SecurityTokenRequestType::Issue, 1, 0))
            .unwrap();
        let err = channel
            .open(&open_request(SecurityTokenRequestType::Issue, 2, 0))
            .unwrap_err();
        assert!(matches!(err, ChannelError::InvalidRequestType { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prior_token_valid_during_grace() {
        let (mut channel, _rx) = channel();
        channel.start_handshake().unwrap();
        channel
            .open(&open_request(SecurityTokenRequestType::Issue, 1, 10_000))
            .unwrap();
        channel
            .open(&open_request(SecurityTokenRequestType::Renew, 2, 10_000))
            .unwrap();

        let now = Instant::now();
        assert!(channel.validate_message(&message(1, 3), now).is_ok());

        let after_grace = now + Duration::from_millis(12_001);
        let err = channel.validate_message(&message(1, 4), after_grace).unwrap_err();
        assert!(matches!(err, ChannelError::TokenUnknown { token_id: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_channel_and_unknown_token() {
        let (mut channel, _rx) = channel();
        channel.start_handshake().unwrap();
        channel
            .open(&open_request(SecurityTokenRequestType::Issue, 1, 0))
            .unwrap();

        let mut foreign = message(1, 2);
        foreign.channel_id = ChannelId::new(99);
        let err = channel.validate_message(&foreign, Instant::now()).unwrap_err();
        assert_eq!(
            err.status_code(),
            uasrv_core::StatusCode::BAD_SECURE_CHANNEL_ID_INVALID
        );

        let err = channel
            .validate_message(&message(42, 3), Instant::now())
            .unwrap_err();
        assert_eq!(
            err.status_code(),
            uasrv_core::StatusCode::BAD_SECURE_CHANNEL_TOKEN_UNKNOWN
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_before_open_rejected() {
        let (mut channel, _rx) = channel();
        channel.start_handshake().unwrap();
        let err = channel.validate_message(&message(1, 1), Instant::now()).unwrap_err();
        assert_eq!(
            err.status_code(),
            uasrv_core::StatusCode::BAD_COMMUNICATION_ERROR
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequence_numbers_must_increase() {
        let (mut channel, _rx) = channel();
        channel.start_handshake().unwrap();
        channel
            .open(&open_request(SecurityTokenRequestType::Issue, 5, 0))
            .unwrap();
        assert!(channel.validate_message(&message(1, 6), Instant::now()).is_ok());
        assert!(matches!(
            channel.validate_message(&message(1, 6), Instant::now()),
            Err(ChannelError::SequenceNumberInvalid { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_current_token_expiry_aborts() {
        let (mut channel, mut rx) = channel();
        channel.start_handshake().unwrap();
        channel
            .open(&open_request(SecurityTokenRequestType::Issue, 1, 1_000))
            .unwrap();

        assert_eq!(rx.recv().await, Some(ChannelTimerEvent::TokenCheck));
        let err = channel.check_tokens(Instant::now()).unwrap_err();
        assert!(matches!(err, ChannelError::TokenExpired { token_id: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_clears_matching_request() {
        let (mut channel, _rx) = channel();
        channel.start_handshake().unwrap();
        channel
            .open(&open_request(SecurityTokenRequestType::Issue, 1, 0))
            .unwrap();

        channel.receive_request(RequestId::new(10));
        assert_eq!(channel.pending_request(), Some(RequestId::new(10)));

        let other = channel
            .response_message(RequestId::new(9), Bytes::new())
            .unwrap();
        assert_eq!(other.request_id, RequestId::new(9));
        assert_eq!(channel.pending_request(), Some(RequestId::new(10)));

        let reply = channel
            .response_message(RequestId::new(10), Bytes::from_static(b"ok"))
            .unwrap();
        assert_eq!(reply.token_id, TokenId::new(1));
        assert!(reply.sequence_number > other.sequence_number);
        assert_eq!(channel.pending_request(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_attachment_updates_status() {
        let (mut channel, _rx) = channel();
        channel.attach_session(SessionId::new(3));
        assert!(channel.has_session());
        assert!(channel.status().has_session());

        channel.detach_session(SessionId::new(4));
        assert!(channel.has_session());
        channel.detach_session(SessionId::new(3));
        assert!(!channel.has_session());
        assert!(!channel.status().has_session());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_timer() {
        let (mut channel, mut rx) = channel();
        channel.start_handshake().unwrap();
        assert!(channel.has_active_timer());

        channel.close();
        channel.close();
        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(!channel.has_active_timer());

        drop(channel);
        assert_eq!(rx.recv().await, None);
    }
}
