// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Server runtime error types.
//!
//! Every error in the engine maps to an OPC UA [`StatusCode`] so that a
//! failure can be returned to the client inside a well-formed response, and
//! to an [`ErrorSeverity`] so that it can be logged at a consistent level.
//!
//! # Error Categories
//!
//! ```text
//! UaError
//! ├── Channel       - Secure channel handshake, token and state errors
//! ├── Session       - Session lifecycle and authentication token errors
//! ├── Subscription  - Subscription, monitored item and publish errors
//! ├── Continuation  - Continuation point errors
//! ├── Listener      - Socket admission and bind errors
//! ├── Encoding      - Frame and service payload codec errors
//! ├── Transport     - Byte stream I/O errors
//! └── Configuration - Invalid settings
//! ```
//!
//! # Examples
//!
//! ```
//! use uasrv_core::error::{UaError, SubscriptionError};
//! use uasrv_core::StatusCode;
//!
//! let error = UaError::from(SubscriptionError::not_found(7));
//! assert_eq!(error.status_code(), StatusCode::BAD_SUBSCRIPTION_ID_INVALID);
//! assert!(!error.is_retryable());
//! ```

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;
use tracing::Level;

use crate::status::StatusCode;

// =============================================================================
// UaError - Main Error Type
// =============================================================================

/// The main error type for the server runtime.
#[derive(Debug, Error)]
pub enum UaError {
    /// Secure channel errors.
    #[error("{0}")]
    Channel(#[from] ChannelError),

    /// Session errors.
    #[error("{0}")]
    Session(#[from] SessionError),

    /// Subscription and publish errors.
    #[error("{0}")]
    Subscription(#[from] SubscriptionError),

    /// Continuation point errors.
    #[error("{0}")]
    Continuation(#[from] ContinuationError),

    /// Listener and admission errors.
    #[error("{0}")]
    Listener(#[from] ListenerError),

    /// Codec errors.
    #[error("{0}")]
    Encoding(#[from] EncodingError),

    /// Transport errors.
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// Configuration errors.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),
}

impl UaError {
    /// Creates an invalid-argument configuration error.
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration(ConfigurationError::invalid(field, message))
    }

    // =========================================================================
    // Error Properties
    // =========================================================================

    /// Returns the OPC UA status code reported to clients for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Channel(e) => e.status_code(),
            Self::Session(e) => e.status_code(),
            Self::Subscription(e) => e.status_code(),
            Self::Continuation(e) => e.status_code(),
            Self::Listener(e) => e.status_code(),
            Self::Encoding(e) => e.status_code(),
            Self::Transport(e) => e.status_code(),
            Self::Configuration(_) => StatusCode::BAD_INVALID_ARGUMENT,
        }
    }

    /// Returns `true` if a client may retry the operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Channel(e) => e.is_retryable(),
            Self::Session(e) => e.is_retryable(),
            Self::Subscription(e) => e.is_retryable(),
            Self::Listener(e) => e.is_retryable(),
            Self::Transport(_) => true,
            Self::Continuation(_) | Self::Encoding(_) | Self::Configuration(_) => false,
        }
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Channel(e) => e.severity(),
            Self::Session(e) => e.severity(),
            Self::Subscription(e) => e.severity(),
            Self::Continuation(_) => ErrorSeverity::Info,
            Self::Listener(e) => e.severity(),
            Self::Encoding(_) => ErrorSeverity::Warning,
            Self::Transport(_) => ErrorSeverity::Warning,
            Self::Configuration(_) => ErrorSeverity::Critical,
        }
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Channel(_) => "channel",
            Self::Session(_) => "session",
            Self::Subscription(_) => "subscription",
            Self::Continuation(_) => "continuation",
            Self::Listener(_) => "listener",
            Self::Encoding(_) => "encoding",
            Self::Transport(_) => "transport",
            Self::Configuration(_) => "configuration",
        }
    }

    /// Returns a unique error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Channel(e) => e.error_code(),
            Self::Session(e) => e.error_code(),
            Self::Subscription(e) => e.error_code(),
            Self::Continuation(e) => e.error_code(),
            Self::Listener(e) => e.error_code(),
            Self::Encoding(e) => e.error_code(),
            Self::Transport(e) => e.error_code(),
            Self::Configuration(e) => e.error_code(),
        }
    }

    /// Returns the tracing level for this error.
    pub fn tracing_level(&self) -> Level {
        self.severity().to_tracing_level()
    }

    /// Logs this error with appropriate level and context.
    pub fn log(&self, context: &str) {
        let code = self.error_code();
        let status = self.status_code();

        match self.tracing_level() {
            Level::ERROR => tracing::error!(
                error_code = %code,
                status = %status,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                error_code = %code,
                status = %status,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            Level::INFO => tracing::info!(
                error_code = %code,
                status = %status,
                category = self.category(),
                context = context,
                "{self}"
            ),
            _ => tracing::debug!(
                error_code = %code,
                status = %status,
                category = self.category(),
                context = context,
                "{self}"
            ),
        }
    }
}

impl From<io::Error> for UaError {
    fn from(error: io::Error) -> Self {
        Self::Transport(TransportError::Io(error))
    }
}

// =============================================================================
// ChannelError
// =============================================================================

/// Secure channel errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Operation attempted in the wrong channel state.
    #[error("Channel {channel_id} cannot {operation} in state {state}")]
    InvalidState {
        /// Channel id.
        channel_id: u32,
        /// Current state name.
        state: String,
        /// Attempted operation.
        operation: String,
    },

    /// A message arrived that the handshake does not allow.
    #[error("Unexpected {message_type} message on channel {channel_id}")]
    UnexpectedMessage {
        /// Channel id.
        channel_id: u32,
        /// The offending message type.
        message_type: String,
    },

    /// No OpenSecureChannel request arrived in time.
    #[error("Channel {channel_id} handshake timed out after {duration:?}")]
    HandshakeTimeout {
        /// Channel id.
        channel_id: u32,
        /// Configured timeout.
        duration: Duration,
    },

    /// The message names a different channel.
    #[error("Message for channel {actual} received on channel {expected}")]
    ChannelIdMismatch {
        /// This channel's id.
        expected: u32,
        /// The id carried by the message.
        actual: u32,
    },

    /// The message carries a token this channel never issued or already discarded.
    #[error("Unknown security token {token_id} on channel {channel_id}")]
    TokenUnknown {
        /// Channel id.
        channel_id: u32,
        /// The unknown token id.
        token_id: u32,
    },

    /// The current token passed its grace deadline without renewal.
    #[error("Security token {token_id} on channel {channel_id} expired")]
    TokenExpired {
        /// Channel id.
        channel_id: u32,
        /// The expired token id.
        token_id: u32,
    },

    /// The OpenSecureChannel request type is invalid for the current state.
    #[error("Invalid request type {request_type} on channel {channel_id}")]
    InvalidRequestType {
        /// Channel id.
        channel_id: u32,
        /// Raw request type.
        request_type: u32,
    },

    /// The requested message security mode is not offered.
    #[error("Security mode {mode} rejected")]
    SecurityModeRejected {
        /// The requested mode.
        mode: String,
    },

    /// A sequence number went backwards.
    #[error("Sequence number {received} invalid on channel {channel_id} (last {last})")]
    SequenceNumberInvalid {
        /// Channel id.
        channel_id: u32,
        /// Last accepted number.
        last: u32,
        /// Received number.
        received: u32,
    },

    /// The channel is closed.
    #[error("Channel {channel_id} is closed")]
    Closed {
        /// Channel id.
        channel_id: u32,
    },
}

impl ChannelError {
    /// Creates an invalid state error.
    pub fn invalid_state(
        channel_id: u32,
        state: impl fmt::Display,
        operation: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            channel_id,
            state: state.to_string(),
            operation: operation.into(),
        }
    }

    /// Creates an unexpected message error.
    pub fn unexpected_message(channel_id: u32, message_type: impl Into<String>) -> Self {
        Self::UnexpectedMessage {
            channel_id,
            message_type: message_type.into(),
        }
    }

    /// Creates a handshake timeout error.
    pub fn handshake_timeout(channel_id: u32, duration: Duration) -> Self {
        Self::HandshakeTimeout {
            channel_id,
            duration,
        }
    }

    /// Creates a token unknown error.
    pub fn token_unknown(channel_id: u32, token_id: u32) -> Self {
        Self::TokenUnknown {
            channel_id,
            token_id,
        }
    }

    /// Creates a token expired error.
    pub fn token_expired(channel_id: u32, token_id: u32) -> Self {
        Self::TokenExpired {
            channel_id,
            token_id,
        }
    }

    /// Creates a closed error.
    pub fn closed(channel_id: u32) -> Self {
        Self::Closed { channel_id }
    }

    /// Returns the status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidState { .. } => StatusCode::BAD_INVALID_STATE,
            Self::UnexpectedMessage { .. } => StatusCode::BAD_COMMUNICATION_ERROR,
            Self::HandshakeTimeout { .. } => StatusCode::BAD_TIMEOUT,
            Self::ChannelIdMismatch { .. } => StatusCode::BAD_SECURE_CHANNEL_ID_INVALID,
            Self::TokenUnknown { .. } | Self::TokenExpired { .. } => {
                StatusCode::BAD_SECURE_CHANNEL_TOKEN_UNKNOWN
            }
            Self::InvalidRequestType { .. } => StatusCode::BAD_REQUEST_TYPE_INVALID,
            Self::SecurityModeRejected { .. } => StatusCode::BAD_SECURITY_MODE_REJECTED,
            Self::SequenceNumberInvalid { .. } => StatusCode::BAD_SEQUENCE_NUMBER_INVALID,
            Self::Closed { .. } => StatusCode::BAD_SECURE_CHANNEL_CLOSED,
        }
    }

    /// Returns `true` if the client may reconnect and retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::HandshakeTimeout { .. } | Self::TokenExpired { .. } | Self::Closed { .. }
        )
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Closed { .. } => ErrorSeverity::Info,
            Self::HandshakeTimeout { .. } | Self::TokenExpired { .. } => ErrorSeverity::Warning,
            Self::InvalidState { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidState { .. } => ErrorCode::new(1, 1),
            Self::UnexpectedMessage { .. } => ErrorCode::new(1, 2),
            Self::HandshakeTimeout { .. } => ErrorCode::new(1, 3),
            Self::ChannelIdMismatch { .. } => ErrorCode::new(1, 4),
            Self::TokenUnknown { .. } => ErrorCode::new(1, 5),
            Self::TokenExpired { .. } => ErrorCode::new(1, 6),
            Self::InvalidRequestType { .. } => ErrorCode::new(1, 7),
            Self::SecurityModeRejected { .. } => ErrorCode::new(1, 8),
            Self::SequenceNumberInvalid { .. } => ErrorCode::new(1, 9),
            Self::Closed { .. } => ErrorCode::new(1, 10),
        }
    }
}

// =============================================================================
// SessionError
// =============================================================================

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session matches the authentication token.
    #[error("Invalid authentication token")]
    InvalidToken,

    /// The session has not been activated yet.
    #[error("Session {session_id} not activated")]
    NotActivated {
        /// Session id.
        session_id: u32,
    },

    /// The server session limit is reached.
    #[error("Too many sessions (max: {max})")]
    TooManySessions {
        /// Configured maximum.
        max: usize,
    },

    /// Closing without deleting subscriptions is not supported.
    #[error("Session {session_id} close requires deleteSubscriptions=true")]
    DeleteSubscriptionsRequired {
        /// Session id.
        session_id: u32,
    },

    /// The session was closed.
    #[error("Session {session_id} is closed")]
    Closed {
        /// Session id.
        session_id: u32,
    },

    /// The request arrived on a channel the session is not bound to.
    #[error("Session {session_id} is not bound to channel {channel_id}")]
    ChannelMismatch {
        /// Session id.
        session_id: u32,
        /// Channel the request arrived on.
        channel_id: u32,
    },

    /// The session timed out.
    #[error("Session {session_id} expired after {timeout:?}")]
    Expired {
        /// Session id.
        session_id: u32,
        /// Session timeout.
        timeout: Duration,
    },
}

impl SessionError {
    /// Creates a not activated error.
    pub fn not_activated(session_id: u32) -> Self {
        Self::NotActivated { session_id }
    }

    /// Creates a too many sessions error.
    pub fn too_many_sessions(max: usize) -> Self {
        Self::TooManySessions { max }
    }

    /// Creates a closed error.
    pub fn closed(session_id: u32) -> Self {
        Self::Closed { session_id }
    }

    /// Returns the status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidToken | Self::Expired { .. } => StatusCode::BAD_SESSION_ID_INVALID,
            Self::NotActivated { .. } => StatusCode::BAD_SESSION_NOT_ACTIVATED,
            Self::TooManySessions { .. } => StatusCode::BAD_TOO_MANY_SESSIONS,
            Self::DeleteSubscriptionsRequired { .. } => StatusCode::BAD_NOT_SUPPORTED,
            Self::Closed { .. } => StatusCode::BAD_SESSION_CLOSED,
            Self::ChannelMismatch { .. } => StatusCode::BAD_SECURE_CHANNEL_ID_INVALID,
        }
    }

    /// Returns `true` if the client may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TooManySessions { .. })
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::InvalidToken => ErrorSeverity::Warning,
            Self::Expired { .. } | Self::Closed { .. } => ErrorSeverity::Info,
            Self::TooManySessions { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidToken => ErrorCode::new(2, 1),
            Self::NotActivated { .. } => ErrorCode::new(2, 2),
            Self::TooManySessions { .. } => ErrorCode::new(2, 3),
            Self::DeleteSubscriptionsRequired { .. } => ErrorCode::new(2, 4),
            Self::Closed { .. } => ErrorCode::new(2, 5),
            Self::ChannelMismatch { .. } => ErrorCode::new(2, 6),
            Self::Expired { .. } => ErrorCode::new(2, 7),
        }
    }
}

// =============================================================================
// SubscriptionError
// =============================================================================

/// Subscription, monitored item and publish errors.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Unknown subscription id.
    #[error("Subscription not found: {subscription_id}")]
    NotFound {
        /// The id.
        subscription_id: u32,
    },

    /// Unknown monitored item id.
    #[error("Monitored item not found: {item_id}")]
    MonitoredItemNotFound {
        /// The id.
        item_id: u32,
    },

    /// The per-session subscription limit is reached.
    #[error("Too many subscriptions (max: {max})")]
    TooManySubscriptions {
        /// Configured maximum.
        max: usize,
    },

    /// The per-subscription monitored item limit is reached.
    #[error("Too many monitored items (max: {max})")]
    TooManyMonitoredItems {
        /// Configured maximum.
        max: usize,
    },

    /// Publish request on a session without subscriptions.
    #[error("Session has no subscriptions")]
    NoSubscription,

    /// The publish request queue is full.
    #[error("Too many publish requests (max: {max})")]
    TooManyPublishRequests {
        /// Configured maximum.
        max: usize,
    },

    /// Acknowledgement for a sequence number not in the retransmission queue.
    #[error("Sequence number {sequence_number} unknown for subscription {subscription_id}")]
    SequenceNumberUnknown {
        /// Subscription id.
        subscription_id: u32,
        /// The acknowledged number.
        sequence_number: u32,
    },

    /// Republish for a message no longer retained.
    #[error("Message {sequence_number} not available for subscription {subscription_id}")]
    MessageNotAvailable {
        /// Subscription id.
        subscription_id: u32,
        /// The requested number.
        sequence_number: u32,
    },

    /// The subscription has terminated.
    #[error("Subscription {subscription_id} terminated")]
    Terminated {
        /// Subscription id.
        subscription_id: u32,
    },

    /// Empty operation list.
    #[error("Nothing to do")]
    NothingToDo,
}

impl SubscriptionError {
    /// Creates a not found error.
    pub fn not_found(subscription_id: u32) -> Self {
        Self::NotFound { subscription_id }
    }

    /// Creates a monitored item not found error.
    pub fn monitored_item_not_found(item_id: u32) -> Self {
        Self::MonitoredItemNotFound { item_id }
    }

    /// Creates a terminated error.
    pub fn terminated(subscription_id: u32) -> Self {
        Self::Terminated { subscription_id }
    }

    /// Returns the status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } | Self::Terminated { .. } => {
                StatusCode::BAD_SUBSCRIPTION_ID_INVALID
            }
            Self::MonitoredItemNotFound { .. } => StatusCode::BAD_MONITORED_ITEM_ID_INVALID,
            Self::TooManySubscriptions { .. } => StatusCode::BAD_TOO_MANY_SUBSCRIPTIONS,
            Self::TooManyMonitoredItems { .. } => StatusCode::BAD_TOO_MANY_MONITORED_ITEMS,
            Self::NoSubscription => StatusCode::BAD_NO_SUBSCRIPTION,
            Self::TooManyPublishRequests { .. } => StatusCode::BAD_TOO_MANY_PUBLISH_REQUESTS,
            Self::SequenceNumberUnknown { .. } => StatusCode::BAD_SEQUENCE_NUMBER_UNKNOWN,
            Self::MessageNotAvailable { .. } => StatusCode::BAD_MESSAGE_NOT_AVAILABLE,
            Self::NothingToDo => StatusCode::BAD_NOTHING_TO_DO,
        }
    }

    /// Returns `true` if the client may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TooManyPublishRequests { .. })
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::TooManySubscriptions { .. }
            | Self::TooManyMonitoredItems { .. }
            | Self::TooManyPublishRequests { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Info,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::new(3, 1),
            Self::MonitoredItemNotFound { .. } => ErrorCode::new(3, 2),
            Self::TooManySubscriptions { .. } => ErrorCode::new(3, 3),
            Self::TooManyMonitoredItems { .. } => ErrorCode::new(3, 4),
            Self::NoSubscription => ErrorCode::new(3, 5),
            Self::TooManyPublishRequests { .. } => ErrorCode::new(3, 6),
            Self::SequenceNumberUnknown { .. } => ErrorCode::new(3, 7),
            Self::MessageNotAvailable { .. } => ErrorCode::new(3, 8),
            Self::Terminated { .. } => ErrorCode::new(3, 9),
            Self::NothingToDo => ErrorCode::new(3, 10),
        }
    }
}

// =============================================================================
// ContinuationError
// =============================================================================

/// Continuation point errors.
#[derive(Debug, Error)]
pub enum ContinuationError {
    /// The token is unknown, exhausted or cancelled.
    #[error("Invalid continuation point")]
    Invalid,

    /// The per-session limit of stored continuation points is reached.
    #[error("No continuation points available (max: {max})")]
    NoContinuationPoints {
        /// Configured maximum.
        max: usize,
    },
}

impl ContinuationError {
    /// Returns the status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Invalid => StatusCode::BAD_CONTINUATION_POINT_INVALID,
            Self::NoContinuationPoints { .. } => StatusCode::BAD_NO_CONTINUATION_POINTS,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Invalid => ErrorCode::new(4, 1),
            Self::NoContinuationPoints { .. } => ErrorCode::new(4, 2),
        }
    }
}

// =============================================================================
// ListenerError
// =============================================================================

/// Listener and admission errors.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Binding the listen socket failed.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Requested address.
        address: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The connection was refused because every channel has a session.
    #[error("Connection refused: {active} of {max} channels in use")]
    Refused {
        /// Active channel count.
        active: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The listener is shutting down.
    #[error("Listener is shutting down")]
    ShuttingDown,

    /// A channel id was registered twice.
    #[error("Channel {channel_id} already registered")]
    DuplicateChannel {
        /// Channel id.
        channel_id: u32,
    },

    /// Accepting a socket failed.
    #[error("Accept failed: {source}")]
    Accept {
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

impl ListenerError {
    /// Creates a bind error.
    pub fn bind(address: impl Into<String>, source: io::Error) -> Self {
        Self::Bind {
            address: address.into(),
            source,
        }
    }

    /// Creates a refused error.
    pub fn refused(active: usize, max: usize) -> Self {
        Self::Refused { active, max }
    }

    /// Returns the status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Bind { .. } | Self::Accept { .. } => StatusCode::BAD_COMMUNICATION_ERROR,
            Self::Refused { .. } => StatusCode::BAD_TCP_SERVER_TOO_BUSY,
            Self::ShuttingDown => StatusCode::BAD_SHUTDOWN,
            Self::DuplicateChannel { .. } => StatusCode::BAD_INTERNAL_ERROR,
        }
    }

    /// Returns `true` if the operation may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Refused { .. } | Self::Accept { .. })
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Refused { .. } => ErrorSeverity::Warning,
            Self::ShuttingDown => ErrorSeverity::Info,
            Self::Accept { .. } => ErrorSeverity::Error,
            Self::Bind { .. } | Self::DuplicateChannel { .. } => ErrorSeverity::Critical,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Bind { .. } => ErrorCode::new(5, 1),
            Self::Refused { .. } => ErrorCode::new(5, 2),
            Self::ShuttingDown => ErrorCode::new(5, 3),
            Self::DuplicateChannel { .. } => ErrorCode::new(5, 4),
            Self::Accept { .. } => ErrorCode::new(5, 5),
        }
    }
}

// =============================================================================
// EncodingError
// =============================================================================

/// Frame and service payload codec errors.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// Not enough bytes to decode a field.
    #[error("Truncated message: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes required.
        needed: usize,
        /// Bytes present.
        available: usize,
    },

    /// Unknown three-letter message type.
    #[error("Invalid message type: {message_type}")]
    InvalidMessageType {
        /// The raw type.
        message_type: String,
    },

    /// Unsupported chunk type byte.
    #[error("Invalid chunk type: {chunk_type:#04x}")]
    InvalidChunkType {
        /// The raw byte.
        chunk_type: u8,
    },

    /// Frame exceeds the negotiated maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Declared size.
        size: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// A string field is not valid UTF-8.
    #[error("Invalid string: {message}")]
    InvalidString {
        /// Detail.
        message: String,
    },

    /// Service payload could not be decoded.
    #[error("Failed to decode service payload: {message}")]
    Decode {
        /// Detail.
        message: String,
    },

    /// Service payload could not be encoded.
    #[error("Failed to encode service payload: {message}")]
    Encode {
        /// Detail.
        message: String,
    },
}

impl EncodingError {
    /// Creates a truncated error.
    pub fn truncated(needed: usize, available: usize) -> Self {
        Self::Truncated { needed, available }
    }

    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates an encode error.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Returns the status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Truncated { .. } | Self::InvalidString { .. } | Self::Decode { .. } => {
                StatusCode::BAD_DECODING_ERROR
            }
            Self::InvalidMessageType { .. } | Self::InvalidChunkType { .. } => {
                StatusCode::BAD_TCP_MESSAGE_TYPE_INVALID
            }
            Self::MessageTooLarge { .. } => StatusCode::BAD_TCP_MESSAGE_TOO_LARGE,
            Self::Encode { .. } => StatusCode::BAD_ENCODING_ERROR,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Truncated { .. } => ErrorCode::new(6, 1),
            Self::InvalidMessageType { .. } => ErrorCode::new(6, 2),
            Self::InvalidChunkType { .. } => ErrorCode::new(6, 3),
            Self::MessageTooLarge { .. } => ErrorCode::new(6, 4),
            Self::InvalidString { .. } => ErrorCode::new(6, 5),
            Self::Decode { .. } => ErrorCode::new(6, 6),
            Self::Encode { .. } => ErrorCode::new(6, 7),
        }
    }
}

// =============================================================================
// TransportError
// =============================================================================

/// Byte stream errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the connection.
    #[error("Connection closed by peer")]
    ConnectionClosed,
}

impl TransportError {
    /// Returns the status code for this error.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::BAD_COMMUNICATION_ERROR
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Io(_) => ErrorCode::new(7, 1),
            Self::ConnectionClosed => ErrorCode::new(7, 2),
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Invalid runtime settings.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A setting is out of range or inconsistent.
    #[error("Invalid configuration for '{field}': {message}")]
    Invalid {
        /// Field name.
        field: String,
        /// Detail.
        message: String,
    },
}

impl ConfigurationError {
    /// Creates an invalid setting error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::new(8, 1)
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Informational - no action required.
    Info,
    /// Warning - action may be required.
    Warning,
    /// Error - action required, but recoverable.
    Error,
    /// Critical - immediate action required.
    Critical,
}

impl ErrorSeverity {
    /// Converts to tracing level.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error => Level::ERROR,
            Self::Critical => Level::ERROR,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// ErrorCode
// =============================================================================

/// Structured error code for categorization.
///
/// Format: `UA-XXYY` where XX is category and YY is specific error.
///
/// Categories:
/// - 1: Channel
/// - 2: Session
/// - 3: Subscription
/// - 4: Continuation
/// - 5: Listener
/// - 6: Encoding
/// - 7: Transport
/// - 8: Configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category (1-8).
    pub category: u8,
    /// Specific error within category.
    pub code: u8,
}

impl ErrorCode {
    /// Creates a new error code.
    pub const fn new(category: u8, code: u8) -> Self {
        Self { category, code }
    }

    /// Returns the full error code as a u16.
    pub fn as_u16(&self) -> u16 {
        ((self.category as u16) << 8) | (self.code as u16)
    }

    /// Creates from a u16.
    pub fn from_u16(value: u16) -> Self {
        Self {
            category: (value >> 8) as u8,
            code: (value & 0xFF) as u8,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UA-{:02X}{:02X}", self.category, self.code)
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A Result type with UaError.
pub type UaResult<T> = Result<T, UaError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_error_status_codes() {
        assert_eq!(
            ChannelError::token_unknown(1, 9).status_code(),
            StatusCode::BAD_SECURE_CHANNEL_TOKEN_UNKNOWN
        );
        assert_eq!(
            ChannelError::ChannelIdMismatch {
                expected: 1,
                actual: 2
            }
            .status_code(),
            StatusCode::BAD_SECURE_CHANNEL_ID_INVALID
        );
        assert_eq!(
            ChannelError::handshake_timeout(1, Duration::from_secs(1)).status_code(),
            StatusCode::BAD_TIMEOUT
        );
        assert_eq!(
            ChannelError::unexpected_message(1, "MSG").status_code(),
            StatusCode::BAD_COMMUNICATION_ERROR
        );
    }

    #[test]
    fn test_session_close_without_delete_maps_to_not_supported() {
        let error = UaError::from(SessionError::DeleteSubscriptionsRequired { session_id: 3 });
        assert_eq!(error.status_code(), StatusCode::BAD_NOT_SUPPORTED);
        assert_eq!(error.category(), "session");
    }

    #[test]
    fn test_subscription_error() {
        let error = SubscriptionError::TooManyMonitoredItems { max: 500 };
        assert!(error.to_string().contains("500"));
        assert_eq!(error.severity(), ErrorSeverity::Warning);
        assert_eq!(
            SubscriptionError::NoSubscription.status_code(),
            StatusCode::BAD_NO_SUBSCRIPTION
        );
    }

    #[test]
    fn test_continuation_error() {
        let error = UaError::from(ContinuationError::Invalid);
        assert_eq!(error.status_code(), StatusCode::BAD_CONTINUATION_POINT_INVALID);
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_listener_refused_is_retryable() {
        let error = UaError::from(ListenerError::refused(3, 3));
        assert!(error.is_retryable());
        assert_eq!(error.status_code(), StatusCode::BAD_TCP_SERVER_TOO_BUSY);
        assert!(error.to_string().contains("3 of 3"));
    }

    #[test]
    fn test_io_error_conversion() {
        let error: UaError = io::Error::new(io::ErrorKind::BrokenPipe, "pipe").into();
        assert_eq!(error.category(), "transport");
        assert_eq!(error.status_code(), StatusCode::BAD_COMMUNICATION_ERROR);
    }

    #[test]
    fn test_error_code() {
        let code = ErrorCode::new(1, 5);
        assert_eq!(code.to_string(), "UA-0105");
        assert_eq!(code.as_u16(), 0x0105);

        let from_u16 = ErrorCode::from_u16(0x0305);
        assert_eq!(from_u16.category, 3);
        assert_eq!(from_u16.code, 5);
    }

    #[test]
    fn test_error_severity_levels() {
        assert_eq!(ErrorSeverity::Warning.to_tracing_level(), Level::WARN);
        assert_eq!(ErrorSeverity::Critical.to_tracing_level(), Level::ERROR);
        assert!(ErrorSeverity::Info < ErrorSeverity::Critical);
    }
}
