// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Request Builders
//!
//! Fluent builders for the service requests the integration tests send.

use uasrv_core::{MonitoredItemId, MonitoringMode, NodeId, ReadValueId, SubscriptionId};
use uasrv_server::publish::SubscriptionAcknowledgement;
use uasrv_server::service::{
    BrowseNextRequest, BrowseRequest, CreateMonitoredItemsRequest, MonitoredItemCreateRequest,
    PublishRequest, RepublishRequest, SetMonitoringModeRequest,
};
use uasrv_server::subscription::RequestedParameters;
use uasrv_server::ServiceRequest;
use uasrv_server::continuation::ContinuationPoint;

// =============================================================================
// SubscriptionBuilder
// =============================================================================

/// Builder for CreateSubscription requests.
#[derive(Debug, Clone)]
pub struct SubscriptionBuilder {
    params: RequestedParameters,
}

impl SubscriptionBuilder {
    /// Starts from a 100 ms interval with server defaults for the counts.
    pub fn new() -> Self {
        Self {
            params: RequestedParameters {
                publishing_interval_ms: 100.0,
                ..RequestedParameters::default()
            },
        }
    }

    /// Sets the publishing interval.
    pub fn interval_ms(mut self, interval: f64) -> Self {
        self.params.publishing_interval_ms = interval;
        self
    }

    /// Sets the keep-alive count.
    pub fn keep_alive(mut self, count: u32) -> Self {
        self.params.max_keep_alive_count = count;
        self
    }

    /// Sets the lifetime count.
    pub fn lifetime(mut self, count: u32) -> Self {
        self.params.lifetime_count = count;
        self
    }

    /// Limits notifications per message.
    pub fn max_notifications(mut self, count: u32) -> Self {
        self.params.max_notifications_per_publish = count;
        self
    }

    /// Creates the subscription with publishing disabled.
    pub fn disabled(mut self) -> Self {
        self.params.publishing_enabled = false;
        self
    }

    /// Returns the parameters.
    pub fn parameters(&self) -> RequestedParameters {
        self.params
    }

    /// Builds the request.
    pub fn build(self) -> ServiceRequest {
        ServiceRequest::CreateSubscription(self.params)
    }
}

impl Default for SubscriptionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// MonitoredItemBuilder
// =============================================================================

/// Builder for one monitored item of a CreateMonitoredItems request.
#[derive(Debug, Clone)]
pub struct MonitoredItemBuilder {
    item: MonitoredItemCreateRequest,
}

impl MonitoredItemBuilder {
    /// Monitors the value attribute of `node` in reporting mode.
    pub fn new(node: NodeId, client_handle: u32) -> Self {
        Self {
            item: MonitoredItemCreateRequest {
                item_to_monitor: ReadValueId::value_of(node),
                monitoring_mode: MonitoringMode::Reporting,
                client_handle,
                sampling_interval_ms: 50.0,
                queue_size: 1,
                discard_oldest: None,
            },
        }
    }

    /// Sets the sampling interval.
    pub fn sampling_ms(mut self, interval: f64) -> Self {
        self.item.sampling_interval_ms = interval;
        self
    }

    /// Sets the queue size and discard policy.
    pub fn queue(mut self, size: u32, discard_oldest: bool) -> Self {
        self.item.queue_size = size;
        self.item.discard_oldest = Some(discard_oldest);
        self
    }

    /// Sets the initial monitoring mode.
    pub fn mode(mut self, mode: MonitoringMode) -> Self {
        self.item.monitoring_mode = mode;
        self
    }

    /// Returns the item request.
    pub fn build(self) -> MonitoredItemCreateRequest {
        self.item
    }
}

/// Builds a CreateMonitoredItems request.
pub fn create_items(subscription_id: SubscriptionId, items: Vec<MonitoredItemBuilder>) -> ServiceRequest {
    ServiceRequest::CreateMonitoredItems(CreateMonitoredItemsRequest {
        subscription_id,
        items_to_create: items.into_iter().map(MonitoredItemBuilder::build).collect(),
    })
}

/// Builds a SetMonitoringMode request.
pub fn set_monitoring_mode(
    subscription_id: SubscriptionId,
    mode: MonitoringMode,
    monitored_item_ids: Vec<MonitoredItemId>,
) -> ServiceRequest {
    ServiceRequest::SetMonitoringMode(SetMonitoringModeRequest {
        subscription_id,
        monitoring_mode: mode,
        monitored_item_ids,
    })
}

// =============================================================================
// Publish / Browse
// =============================================================================

/// Builds a Publish request acknowledging the given messages.
pub fn publish(acks: &[(SubscriptionId, u32)]) -> ServiceRequest {
    ServiceRequest::Publish(PublishRequest {
        subscription_acknowledgements: acks
            .iter()
            .map(|&(subscription_id, sequence_number)| SubscriptionAcknowledgement {
                subscription_id,
                sequence_number,
            })
            .collect(),
    })
}

/// Builds a Republish request.
pub fn republish(subscription_id: SubscriptionId, sequence_number: u32) -> ServiceRequest {
    ServiceRequest::Republish(RepublishRequest {
        subscription_id,
        retransmit_sequence_number: sequence_number,
    })
}

/// Builds a Browse request.
pub fn browse(nodes: Vec<NodeId>, max_references: u32) -> ServiceRequest {
    ServiceRequest::Browse(BrowseRequest {
        requested_max_references_per_node: max_references,
        nodes_to_browse: nodes,
    })
}

/// Builds a BrowseNext request.
pub fn browse_next(points: Vec<ContinuationPoint>, release: bool) -> ServiceRequest {
    ServiceRequest::BrowseNext(BrowseNextRequest {
        release_continuation_points: release,
        continuation_points: points,
    })
}
