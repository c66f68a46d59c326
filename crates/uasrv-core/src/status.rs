// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA status codes.
//!
//! A [`StatusCode`] is the 32-bit result carried inside every service
//! response and every data value. The top two bits encode severity
//! (`00` good, `01` uncertain, `10` bad); the low 16 bits carry info bits
//! such as the queue-overflow marker set on monitored item notifications.
//!
//! Only the codes this runtime actually produces are given names. Any other
//! value is still representable and displays as hex.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// StatusCode
// =============================================================================

/// An OPC UA status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

/// Severity mask (top two bits).
const SEVERITY_MASK: u32 = 0xC000_0000;

/// Mask selecting the code part, ignoring info bits.
const CODE_MASK: u32 = 0xFFFF_0000;

/// InfoType = DataValue.
const INFO_TYPE_DATA_VALUE: u32 = 0x0000_0400;

/// Overflow info bit, only meaningful with `INFO_TYPE_DATA_VALUE`.
const INFO_BIT_OVERFLOW: u32 = 0x0000_0080;

impl StatusCode {
    /// The operation succeeded.
    pub const GOOD: Self = Self(0x0000_0000);

    /// An unexpected error occurred.
    pub const BAD_UNEXPECTED_ERROR: Self = Self(0x8001_0000);
    /// An internal error occurred as a result of a programming or configuration error.
    pub const BAD_INTERNAL_ERROR: Self = Self(0x8002_0000);
    /// A low level communication error occurred.
    pub const BAD_COMMUNICATION_ERROR: Self = Self(0x8005_0000);
    /// Encoding halted because of invalid data in the objects being serialized.
    pub const BAD_ENCODING_ERROR: Self = Self(0x8006_0000);
    /// Decoding halted because of invalid data in the stream.
    pub const BAD_DECODING_ERROR: Self = Self(0x8007_0000);
    /// The operation timed out.
    pub const BAD_TIMEOUT: Self = Self(0x800A_0000);
    /// The server does not support the requested service.
    pub const BAD_SERVICE_UNSUPPORTED: Self = Self(0x800B_0000);
    /// The operation was cancelled because the application is shutting down.
    pub const BAD_SHUTDOWN: Self = Self(0x800C_0000);
    /// There was nothing to do because the client passed a list of operations with no elements.
    pub const BAD_NOTHING_TO_DO: Self = Self(0x800F_0000);
    /// The request could not be processed because it specified too many operations.
    pub const BAD_TOO_MANY_OPERATIONS: Self = Self(0x8010_0000);
    /// The specified secure channel is no longer valid.
    pub const BAD_SECURE_CHANNEL_ID_INVALID: Self = Self(0x8022_0000);
    /// The session id is not valid.
    pub const BAD_SESSION_ID_INVALID: Self = Self(0x8025_0000);
    /// The session was closed by the client.
    pub const BAD_SESSION_CLOSED: Self = Self(0x8026_0000);
    /// The session cannot be used because ActivateSession has not been called.
    pub const BAD_SESSION_NOT_ACTIVATED: Self = Self(0x8027_0000);
    /// The subscription id is not valid.
    pub const BAD_SUBSCRIPTION_ID_INVALID: Self = Self(0x8028_0000);
    /// The node id refers to a node that does not exist in the server address space.
    pub const BAD_NODE_ID_UNKNOWN: Self = Self(0x8034_0000);
    /// The attribute is not supported for the specified node.
    pub const BAD_ATTRIBUTE_ID_INVALID: Self = Self(0x8035_0000);
    /// The requested operation is not supported.
    pub const BAD_NOT_SUPPORTED: Self = Self(0x803D_0000);
    /// The monitoring mode is invalid.
    pub const BAD_MONITORING_MODE_INVALID: Self = Self(0x8041_0000);
    /// The monitoring item id does not refer to a valid monitored item.
    pub const BAD_MONITORED_ITEM_ID_INVALID: Self = Self(0x8042_0000);
    /// The continuation point provided is longer valid.
    pub const BAD_CONTINUATION_POINT_INVALID: Self = Self(0x804A_0000);
    /// The operation could not be processed because all continuation points have been allocated.
    pub const BAD_NO_CONTINUATION_POINTS: Self = Self(0x804B_0000);
    /// The security token request type is not valid.
    pub const BAD_REQUEST_TYPE_INVALID: Self = Self(0x8053_0000);
    /// The security mode does not meet the requirements set by the server.
    pub const BAD_SECURITY_MODE_REJECTED: Self = Self(0x8054_0000);
    /// The server has reached its maximum number of sessions.
    pub const BAD_TOO_MANY_SESSIONS: Self = Self(0x8056_0000);
    /// The server has reached its maximum number of subscriptions.
    pub const BAD_TOO_MANY_SUBSCRIPTIONS: Self = Self(0x8077_0000);
    /// The server has reached the maximum number of queued publish requests.
    pub const BAD_TOO_MANY_PUBLISH_REQUESTS: Self = Self(0x8078_0000);
    /// There is no subscription available for this session.
    pub const BAD_NO_SUBSCRIPTION: Self = Self(0x8079_0000);
    /// The sequence number is unknown to the server.
    pub const BAD_SEQUENCE_NUMBER_UNKNOWN: Self = Self(0x807A_0000);
    /// The requested notification message is no longer available.
    pub const BAD_MESSAGE_NOT_AVAILABLE: Self = Self(0x807B_0000);
    /// The server cannot process the request because it is too busy.
    pub const BAD_TCP_SERVER_TOO_BUSY: Self = Self(0x807D_0000);
    /// The type of the message specified in the header invalid.
    pub const BAD_TCP_MESSAGE_TYPE_INVALID: Self = Self(0x807E_0000);
    /// The SecureChannelId and/or TokenId are not currently in use.
    pub const BAD_TCP_SECURE_CHANNEL_UNKNOWN: Self = Self(0x807F_0000);
    /// The size of the message chunk specified in the header is too large.
    pub const BAD_TCP_MESSAGE_TOO_LARGE: Self = Self(0x8080_0000);
    /// An internal error occurred.
    pub const BAD_TCP_INTERNAL_ERROR: Self = Self(0x8082_0000);
    /// The secure channel has been closed.
    pub const BAD_SECURE_CHANNEL_CLOSED: Self = Self(0x8086_0000);
    /// The token has expired or is not recognized.
    pub const BAD_SECURE_CHANNEL_TOKEN_UNKNOWN: Self = Self(0x8087_0000);
    /// The sequence number is not valid.
    pub const BAD_SEQUENCE_NUMBER_INVALID: Self = Self(0x8088_0000);
    /// The server has reached the maximum number of monitored items.
    pub const BAD_TOO_MANY_MONITORED_ITEMS: Self = Self(0x80DB_0000);
    /// One or more arguments are invalid.
    pub const BAD_INVALID_ARGUMENT: Self = Self(0x80AB_0000);
    /// The operation cannot be completed because the object is closed, uninitialized or in some other invalid state.
    pub const BAD_INVALID_STATE: Self = Self(0x80AF_0000);
    /// The applications do not have compatible protocol versions.
    pub const BAD_PROTOCOL_VERSION_UNSUPPORTED: Self = Self(0x80BE_0000);

    /// Creates a status code from its raw value.
    #[inline]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Returns `true` if the severity is good.
    #[inline]
    pub const fn is_good(&self) -> bool {
        self.0 & SEVERITY_MASK == 0
    }

    /// Returns `true` if the severity is uncertain.
    #[inline]
    pub const fn is_uncertain(&self) -> bool {
        self.0 & SEVERITY_MASK == 0x4000_0000
    }

    /// Returns `true` if the severity is bad.
    #[inline]
    pub const fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Returns the code with info bits stripped.
    #[inline]
    pub const fn code(&self) -> Self {
        Self(self.0 & CODE_MASK)
    }

    /// Returns a copy with the data-value overflow info bit set.
    #[inline]
    pub const fn with_overflow(&self) -> Self {
        Self(self.0 | INFO_TYPE_DATA_VALUE | INFO_BIT_OVERFLOW)
    }

    /// Returns `true` if the data-value overflow info bit is set.
    #[inline]
    pub const fn has_overflow(&self) -> bool {
        self.0 & INFO_TYPE_DATA_VALUE != 0 && self.0 & INFO_BIT_OVERFLOW != 0
    }

    /// Returns the symbolic name of the code, ignoring info bits.
    pub fn name(&self) -> &'static str {
        match self.code().0 {
            0x0000_0000 => "Good",
            0x8001_0000 => "BadUnexpectedError",
            0x8002_0000 => "BadInternalError",
            0x8005_0000 => "BadCommunicationError",
            0x8006_0000 => "BadEncodingError",
            0x8007_0000 => "BadDecodingError",
            0x800A_0000 => "BadTimeout",
            0x800B_0000 => "BadServiceUnsupported",
            0x800C_0000 => "BadShutdown",
            0x800F_0000 => "BadNothingToDo",
            0x8010_0000 => "BadTooManyOperations",
            0x8022_0000 => "BadSecureChannelIdInvalid",
            0x8025_0000 => "BadSessionIdInvalid",
            0x8026_0000 => "BadSessionClosed",
            0x8027_0000 => "BadSessionNotActivated",
            0x8028_0000 => "BadSubscriptionIdInvalid",
            0x8034_0000 => "BadNodeIdUnknown",
            0x8035_0000 => "BadAttributeIdInvalid",
            0x803D_0000 => "BadNotSupported",
            0x8041_0000 => "BadMonitoringModeInvalid",
            0x8042_0000 => "BadMonitoredItemIdInvalid",
            0x804A_0000 => "BadContinuationPointInvalid",
            0x804B_0000 => "BadNoContinuationPoints",
            0x8053_0000 => "BadRequestTypeInvalid",
            0x8054_0000 => "BadSecurityModeRejected",
            0x8056_0000 => "BadTooManySessions",
            0x8077_0000 => "BadTooManySubscriptions",
            0x8078_0000 => "BadTooManyPublishRequests",
            0x8079_0000 => "BadNoSubscription",
            0x807A_0000 => "BadSequenceNumberUnknown",
            0x807B_0000 => "BadMessageNotAvailable",
            0x807D_0000 => "BadTcpServerTooBusy",
            0x807E_0000 => "BadTcpMessageTypeInvalid",
            0x807F_0000 => "BadTcpSecureChannelUnknown",
            0x8080_0000 => "BadTcpMessageTooLarge",
            0x8082_0000 => "BadTcpInternalError",
            0x8086_0000 => "BadSecureChannelClosed",
            0x8087_0000 => "BadSecureChannelTokenUnknown",
            0x8088_0000 => "BadSequenceNumberInvalid",
            0x80AB_0000 => "BadInvalidArgument",
            0x80AF_0000 => "BadInvalidState",
            0x80BE_0000 => "BadProtocolVersionUnsupported",
            0x80DB_0000 => "BadTooManyMonitoredItems",
            _ if self.is_good() => "Good",
            _ if self.is_uncertain() => "Uncertain",
            _ => "Bad",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.0)
    }
}

impl From<u32> for StatusCode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<StatusCode> for u32 {
    fn from(code: StatusCode) -> Self {
        code.0
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity() {
        assert!(StatusCode::GOOD.is_good());
        assert!(!StatusCode::GOOD.is_bad());
        assert!(StatusCode::BAD_TIMEOUT.is_bad());
        assert!(StatusCode::new(0x4000_0000).is_uncertain());
    }

    #[test]
    fn test_names() {
        assert_eq!(StatusCode::BAD_NO_SUBSCRIPTION.name(), "BadNoSubscription");
        assert_eq!(
            StatusCode::BAD_CONTINUATION_POINT_INVALID.name(),
            "BadContinuationPointInvalid"
        );
        assert_eq!(StatusCode::new(0x80FF_0000).name(), "Bad");
    }

    #[test]
    fn test_overflow_bit() {
        let status = StatusCode::GOOD.with_overflow();
        assert!(status.has_overflow());
        assert!(status.is_good());
        assert_eq!(status.code(), StatusCode::GOOD);
        assert_eq!(status.name(), "Good");
        assert!(!StatusCode::GOOD.has_overflow());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            StatusCode::BAD_TIMEOUT.to_string(),
            "BadTimeout (0x800A0000)"
        );
    }
}
