// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Custom Test Assertions
//!
//! Assertion helpers with failure messages that name the service and the
//! status involved.

use uasrv_core::{StatusCode, Variant};
use uasrv_server::service::{BrowseResponse, PublishResponse, StatusResults};
use uasrv_server::{ErrorMessage, ResponseEnvelope, ServiceResponse};

// =============================================================================
// Response Assertions
// =============================================================================

/// Assertion extensions for service responses.
pub trait ResponseAssertions {
    /// Asserts a good service result.
    fn assert_good(&self);

    /// Asserts a specific service result.
    fn assert_status(&self, expected: StatusCode);

    /// Asserts a ServiceFault with the given status.
    fn assert_fault(&self, expected: StatusCode);
}

impl ResponseAssertions for ResponseEnvelope {
    fn assert_good(&self) {
        assert!(
            self.header.service_result.is_good(),
            "Expected Good, got {} ({:?})",
            self.header.service_result,
            self.body
        );
    }

    fn assert_status(&self, expected: StatusCode) {
        assert_eq!(
            self.header.service_result, expected,
            "Expected {}, got {} ({:?})",
            expected, self.header.service_result, self.body
        );
    }

    fn assert_fault(&self, expected: StatusCode) {
        self.assert_status(expected);
        assert!(
            matches!(self.body, ServiceResponse::ServiceFault),
            "Expected ServiceFault body, got {:?}",
            self.body
        );
    }
}

/// Extracts the per-operation results of a StatusResults-shaped response.
pub fn status_results(response: &ResponseEnvelope) -> Vec<StatusCode> {
    match &response.body {
        ServiceResponse::DeleteSubscriptions(StatusResults { results })
        | ServiceResponse::SetPublishingMode(StatusResults { results })
        | ServiceResponse::DeleteMonitoredItems(StatusResults { results })
        | ServiceResponse::SetMonitoringMode(StatusResults { results }) => results.clone(),
        other => panic!("Expected per-operation results, got {other:?}"),
    }
}

/// Extracts a Browse or BrowseNext body.
pub fn browse_results(response: &ResponseEnvelope) -> &BrowseResponse {
    match &response.body {
        ServiceResponse::Browse(browse) | ServiceResponse::BrowseNext(browse) => browse,
        other => panic!("Expected Browse response, got {other:?}"),
    }
}

// =============================================================================
// Publish Assertions
// =============================================================================

/// Assertion extensions for Publish responses.
pub trait PublishAssertions {
    /// Asserts a keep-alive announcing `next_sequence_number`.
    fn assert_keep_alive(&self, next_sequence_number: u32);

    /// Asserts a data message with the given sequence number.
    fn assert_data(&self, sequence_number: u32);

    /// Returns the values notified for `client_handle`, oldest first.
    fn values_for(&self, client_handle: u32) -> Vec<Variant>;
}

impl PublishAssertions for PublishResponse {
    fn assert_keep_alive(&self, next_sequence_number: u32) {
        let message = &self.notification_message;
        assert!(
            message.is_keep_alive(),
            "Expected keep-alive, got {} notifications",
            message.notifications.len()
        );
        assert_eq!(
            message.sequence_number, next_sequence_number,
            "Keep-alive announced the wrong next sequence number"
        );
    }

    fn assert_data(&self, sequence_number: u32) {
        let message = &self.notification_message;
        assert!(!message.is_keep_alive(), "Expected data, got a keep-alive");
        assert_eq!(message.sequence_number, sequence_number, "Unexpected sequence number");
        assert!(
            self.available_sequence_numbers.contains(&sequence_number),
            "Sequence number {sequence_number} missing from {:?}",
            self.available_sequence_numbers
        );
    }

    fn values_for(&self, client_handle: u32) -> Vec<Variant> {
        self.notification_message
            .notifications
            .iter()
            .filter(|n| n.client_handle == client_handle)
            .map(|n| n.value.value.clone())
            .collect()
    }
}

// =============================================================================
// Transport Assertions
// =============================================================================

/// Asserts an ERR frame with the given status.
pub fn assert_error_frame(error: &ErrorMessage, expected: StatusCode) {
    assert_eq!(
        error.status, expected,
        "Expected ERR {}, got ERR {} ({})",
        expected, error.status, error.reason
    );
}
