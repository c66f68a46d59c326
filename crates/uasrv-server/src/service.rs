// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Service request and response types and the payload codec seam.
//!
//! MSG payloads are opaque to the secure channel. The engine turns them into
//! [`RequestEnvelope`]s through a [`ServiceCodec`]; the bundled
//! [`JsonServiceCodec`] uses `serde_json`:
//!
//! ```json
//! {
//!   "header": { "authentication_token": "…", "request_handle": 7 },
//!   "body":   { "service": "publish", "subscription_acknowledgements": [] }
//! }
//! ```
//!
//! Unknown services decode to [`ServiceRequest::Unsupported`] and are answered
//! with `BadServiceUnsupported`.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uasrv_core::{
    AuthenticationToken, EncodingError, MonitoredItemId, MonitoringMode, NodeId, ReadValueId,
    SessionId, StatusCode, SubscriptionId, UaResult,
};

use crate::address_space::ReferenceDescription;
use crate::continuation::ContinuationPoint;
use crate::publish::SubscriptionAcknowledgement;
use crate::subscription::{NotificationMessage, RequestedParameters};

// =============================================================================
// Headers & envelopes
// =============================================================================

/// Common request header.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RequestHeader {
    /// Session token. Empty for CreateSession.
    #[serde(default)]
    pub authentication_token: AuthenticationToken,
    /// Client handle echoed in the response.
    #[serde(default)]
    pub request_handle: u32,
    /// How long the client waits, in milliseconds. 0 means no hint.
    #[serde(default)]
    pub timeout_hint_ms: u32,
}

/// Common response header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseHeader {
    /// Handle from the request.
    pub request_handle: u32,
    /// Overall result.
    pub service_result: StatusCode,
    /// When the response was produced.
    pub timestamp: DateTime<Utc>,
}

/// A decoded request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Header.
    pub header: RequestHeader,
    /// Service body.
    pub body: ServiceRequest,
}

impl RequestEnvelope {
    /// Builds a request.
    pub fn new(authentication_token: AuthenticationToken, request_handle: u32, body: ServiceRequest) -> Self {
        Self {
            header: RequestHeader {
                authentication_token,
                request_handle,
                timeout_hint_ms: 0,
            },
            body,
        }
    }
}

/// A response to encode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Header.
    pub header: ResponseHeader,
    /// Service body.
    pub body: ServiceResponse,
}

impl ResponseEnvelope {
    /// A good response.
    pub fn ok(request_handle: u32, body: ServiceResponse) -> Self {
        Self::with_result(request_handle, StatusCode::GOOD, body)
    }

    /// A response with an explicit service result.
    pub fn with_result(request_handle: u32, service_result: StatusCode, body: ServiceResponse) -> Self {
        Self {
            header: ResponseHeader {
                request_handle,
                service_result,
                timestamp: Utc::now(),
            },
            body,
        }
    }

    /// A service fault.
    pub fn fault(request_handle: u32, status: StatusCode) -> Self {
        Self::with_result(request_handle, status, ServiceResponse::ServiceFault)
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Service requests understood by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "service", rename_all = "snake_case")]
pub enum ServiceRequest {
    /// Create a session.
    CreateSession(CreateSessionRequest),
    /// Activate a session on the current channel.
    ActivateSession(ActivateSessionRequest),
    /// Close the session.
    CloseSession(CloseSessionRequest),
    /// Create a subscription.
    CreateSubscription(RequestedParameters),
    /// Change subscription parameters.
    ModifySubscription(ModifySubscriptionRequest),
    /// Delete subscriptions.
    DeleteSubscriptions(DeleteSubscriptionsRequest),
    /// Enable or disable publishing.
    SetPublishingMode(SetPublishingModeRequest),
    /// Add monitored items.
    CreateMonitoredItems(CreateMonitoredItemsRequest),
    /// Remove monitored items.
    DeleteMonitoredItems(DeleteMonitoredItemsRequest),
    /// Change monitoring modes.
    SetMonitoringMode(SetMonitoringModeRequest),
    /// Queue a publish request.
    Publish(PublishRequest),
    /// Ask for a retained message.
    Republish(RepublishRequest),
    /// List references of nodes.
    Browse(BrowseRequest),
    /// Continue or release a browse.
    BrowseNext(BrowseNextRequest),
    /// Any service this server does not implement.
    #[serde(other)]
    Unsupported,
}

impl ServiceRequest {
    /// Returns the service name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateSession(_) => "CreateSession",
            Self::ActivateSession(_) => "ActivateSession",
            Self::CloseSession(_) => "CloseSession",
            Self::CreateSubscription(_) => "CreateSubscription",
            Self::ModifySubscription(_) => "ModifySubscription",
            Self::DeleteSubscriptions(_) => "DeleteSubscriptions",
            Self::SetPublishingMode(_) => "SetPublishingMode",
            Self::CreateMonitoredItems(_) => "CreateMonitoredItems",
            Self::DeleteMonitoredItems(_) => "DeleteMonitoredItems",
            Self::SetMonitoringMode(_) => "SetMonitoringMode",
            Self::Publish(_) => "Publish",
            Self::Republish(_) => "Republish",
            Self::Browse(_) => "Browse",
            Self::BrowseNext(_) => "BrowseNext",
            Self::Unsupported => "Unsupported",
        }
    }
}

/// CreateSession parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    /// Human-readable session name.
    #[serde(default)]
    pub session_name: String,
    /// Requested timeout in milliseconds. 0 selects the default.
    #[serde(default)]
    pub requested_session_timeout_ms: u64,
}

/// ActivateSession parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActivateSessionRequest {
    /// Preferred locales.
    #[serde(default)]
    pub locale_ids: Vec<String>,
}

/// CloseSession parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CloseSessionRequest {
    /// Must be `true`.
    pub delete_subscriptions: bool,
}

/// ModifySubscription parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModifySubscriptionRequest {
    /// Subscription to change.
    pub subscription_id: SubscriptionId,
    /// New parameters. `publishing_enabled` is ignored.
    pub parameters: RequestedParameters,
}

/// DeleteSubscriptions parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteSubscriptionsRequest {
    /// Subscriptions to delete.
    pub subscription_ids: Vec<SubscriptionId>,
}

/// SetPublishingMode parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetPublishingModeRequest {
    /// New mode.
    pub publishing_enabled: bool,
    /// Subscriptions to change.
    pub subscription_ids: Vec<SubscriptionId>,
}

/// One monitored item to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemCreateRequest {
    /// Node and attribute to sample.
    pub item_to_monitor: ReadValueId,
    /// Initial mode.
    #[serde(default)]
    pub monitoring_mode: MonitoringMode,
    /// Client handle.
    pub client_handle: u32,
    /// Requested sampling interval in milliseconds. Negative follows the
    /// publishing interval, 0 selects the default.
    #[serde(default)]
    pub sampling_interval_ms: f64,
    /// Requested queue size. 0 selects the default.
    #[serde(default)]
    pub queue_size: u32,
    /// Overflow policy. Unset selects the configured policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discard_oldest: Option<bool>,
}

/// CreateMonitoredItems parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMonitoredItemsRequest {
    /// Target subscription.
    pub subscription_id: SubscriptionId,
    /// Items to create.
    pub items_to_create: Vec<MonitoredItemCreateRequest>,
}

/// DeleteMonitoredItems parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteMonitoredItemsRequest {
    /// Target subscription.
    pub subscription_id: SubscriptionId,
    /// Items to delete.
    pub monitored_item_ids: Vec<MonitoredItemId>,
}

/// SetMonitoringMode parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetMonitoringModeRequest {
    /// Target subscription.
    pub subscription_id: SubscriptionId,
    /// New mode.
    pub monitoring_mode: MonitoringMode,
    /// Items to change.
    pub monitored_item_ids: Vec<MonitoredItemId>,
}

/// Publish parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PublishRequest {
    /// Messages the client has received.
    #[serde(default)]
    pub subscription_acknowledgements: Vec<SubscriptionAcknowledgement>,
}

/// Republish parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RepublishRequest {
    /// Subscription id.
    pub subscription_id: SubscriptionId,
    /// Message to resend.
    pub retransmit_sequence_number: u32,
}

/// Browse parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowseRequest {
    /// References per node per response. 0 means unlimited.
    #[serde(default)]
    pub requested_max_references_per_node: u32,
    /// Nodes to browse.
    pub nodes_to_browse: Vec<NodeId>,
}

/// BrowseNext parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowseNextRequest {
    /// Release instead of continuing.
    #[serde(default)]
    pub release_continuation_points: bool,
    /// Tokens from a previous Browse or BrowseNext.
    pub continuation_points: Vec<ContinuationPoint>,
}

// =============================================================================
// Responses
// =============================================================================

/// Service responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "service", rename_all = "snake_case")]
pub enum ServiceResponse {
    /// Session created.
    CreateSession(CreateSessionResponse),
    /// Session activated.
    ActivateSession(EmptyResponse),
    /// Session closed.
    CloseSession(EmptyResponse),
    /// Subscription created.
    CreateSubscription(CreateSubscriptionResponse),
    /// Subscription changed.
    ModifySubscription(ModifySubscriptionResponse),
    /// Per-subscription results.
    DeleteSubscriptions(StatusResults),
    /// Per-subscription results.
    SetPublishingMode(StatusResults),
    /// Per-item results.
    CreateMonitoredItems(CreateMonitoredItemsResponse),
    /// Per-item results.
    DeleteMonitoredItems(StatusResults),
    /// Per-item results.
    SetMonitoringMode(StatusResults),
    /// Notification or keep-alive.
    Publish(PublishResponse),
    /// Retained message.
    Republish(RepublishResponse),
    /// Per-node references.
    Browse(BrowseResponse),
    /// Per-token references.
    BrowseNext(BrowseResponse),
    /// Error without body; the header carries the status.
    ServiceFault,
}

/// Body of responses carrying nothing but the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmptyResponse {}

/// Per-operation status codes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusResults {
    /// One result per operation, in request order.
    pub results: Vec<StatusCode>,
}

/// CreateSession result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    /// Server-assigned id.
    pub session_id: SessionId,
    /// Token for every later request.
    pub authentication_token: AuthenticationToken,
    /// Revised timeout in milliseconds.
    pub revised_session_timeout_ms: u64,
}

/// CreateSubscription result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CreateSubscriptionResponse {
    /// Server-assigned id.
    pub subscription_id: SubscriptionId,
    /// Revised publishing interval in milliseconds.
    pub revised_publishing_interval_ms: f64,
    /// Revised lifetime count.
    pub revised_lifetime_count: u32,
    /// Revised keep-alive count.
    pub revised_max_keep_alive_count: u32,
}

/// ModifySubscription result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModifySubscriptionResponse {
    /// Revised publishing interval in milliseconds.
    pub revised_publishing_interval_ms: f64,
    /// Revised lifetime count.
    pub revised_lifetime_count: u32,
    /// Revised keep-alive count.
    pub revised_max_keep_alive_count: u32,
}

/// Result for one created monitored item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemCreateResult {
    /// Outcome.
    pub status_code: StatusCode,
    /// Assigned id. Zero on failure.
    pub monitored_item_id: MonitoredItemId,
    /// Revised sampling interval in milliseconds.
    pub revised_sampling_interval_ms: f64,
    /// Revised queue size.
    pub revised_queue_size: u32,
}

impl MonitoredItemCreateResult {
    /// A failed creation.
    pub fn failed(status_code: StatusCode) -> Self {
        Self {
            status_code,
            monitored_item_id: MonitoredItemId::new(0),
            revised_sampling_interval_ms: 0.0,
            revised_queue_size: 0,
        }
    }
}

/// CreateMonitoredItems result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CreateMonitoredItemsResponse {
    /// One result per requested item.
    pub results: Vec<MonitoredItemCreateResult>,
}

/// Publish result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishResponse {
    /// Subscription the message belongs to.
    pub subscription_id: SubscriptionId,
    /// Unacknowledged sequence numbers.
    pub available_sequence_numbers: Vec<u32>,
    /// More messages are waiting.
    pub more_notifications: bool,
    /// The message. Empty for a keep-alive.
    pub notification_message: NotificationMessage,
    /// Results of the request's acknowledgements.
    pub results: Vec<StatusCode>,
}

/// Republish result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepublishResponse {
    /// The retained message.
    pub notification_message: NotificationMessage,
}

/// References of one node, possibly paged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowseResult {
    /// Outcome.
    pub status_code: StatusCode,
    /// Token for the next page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_point: Option<ContinuationPoint>,
    /// References of this page.
    #[serde(default)]
    pub references: Vec<ReferenceDescription>,
}

impl BrowseResult {
    /// A result without references.
    pub fn empty(status_code: StatusCode) -> Self {
        Self {
            status_code,
            continuation_point: None,
            references: Vec::new(),
        }
    }
}

/// Browse and BrowseNext result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BrowseResponse {
    /// One result per node or token.
    pub results: Vec<BrowseResult>,
}

// =============================================================================
// Codec
// =============================================================================

/// Converts service payloads to and from their wire form.
///
/// The server side decodes requests and encodes responses; the client side
/// methods are used by tools and tests.
pub trait ServiceCodec: Send + Sync {
    /// Decodes a request payload.
    fn decode_request(&self, payload: &[u8]) -> UaResult<RequestEnvelope>;

    /// Encodes a response payload.
    fn encode_response(&self, response: &ResponseEnvelope) -> UaResult<Bytes>;

    /// Encodes a request payload.
    fn encode_request(&self, request: &RequestEnvelope) -> UaResult<Bytes>;

    /// Decodes a response payload.
    fn decode_response(&self, payload: &[u8]) -> UaResult<ResponseEnvelope>;
}

/// JSON payload codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonServiceCodec;

impl JsonServiceCodec {
    /// Creates the codec.
    pub fn new() -> Self {
        Self
    }
}

impl ServiceCodec for JsonServiceCodec {
    fn decode_request(&self, payload: &[u8]) -> UaResult<RequestEnvelope> {
        serde_json::from_slice(payload).map_err(|e| EncodingError::decode(e.to_string()).into())
    }

    fn encode_response(&self, response: &ResponseEnvelope) -> UaResult<Bytes> {
        serde_json::to_vec(response)
            .map(Bytes::from)
            .map_err(|e| EncodingError::encode(e.to_string()).into())
    }

    fn encode_request(&self, request: &RequestEnvelope) -> UaResult<Bytes> {
        serde_json::to_vec(request)
            .map(Bytes::from)
            .map_err(|e| EncodingError::encode(e.to_string()).into())
    }

    fn decode_response(&self, payload: &[u8]) -> UaResult<ResponseEnvelope> {
        serde_json::from_slice(payload).map_err(|e| EncodingError::decode(e.to_string()).into())
    }
}
