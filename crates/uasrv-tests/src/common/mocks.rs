// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! A recording [`AddressSpace`] for tests that need to observe how often the
//! engine samples, or to script values and failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use uasrv_core::{DataValue, NodeId, ReadValueId, StatusCode, Variant};
use uasrv_server::{AddressSpace, ReferenceDescription};

// =============================================================================
// MockAddressSpace
// =============================================================================

/// Address space with scripted values and per-node read counters.
#[derive(Debug, Default)]
pub struct MockAddressSpace {
    values: RwLock<HashMap<NodeId, DataValue>>,
    references: RwLock<HashMap<NodeId, Vec<ReferenceDescription>>>,
    reads: RwLock<HashMap<NodeId, u64>>,
    total_reads: AtomicU64,
    fail_reads: AtomicBool,
}

impl MockAddressSpace {
    /// Creates an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value returned for `node`.
    pub fn set(&self, node: NodeId, value: impl Into<Variant>) {
        self.values.write().insert(node, DataValue::new(value));
    }

    /// Sets the full data value returned for `node`.
    pub fn set_data_value(&self, node: NodeId, value: DataValue) {
        self.values.write().insert(node, value);
    }

    /// Sets the references returned for `node`.
    pub fn set_references(&self, node: NodeId, references: Vec<ReferenceDescription>) {
        self.references.write().insert(node, references);
    }

    /// Makes every read return `BadInternalError`.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Returns how often `node` was read.
    pub fn read_count(&self, node: &NodeId) -> u64 {
        self.reads.read().get(node).copied().unwrap_or(0)
    }

    /// Returns the total number of reads.
    pub fn total_reads(&self) -> u64 {
        self.total_reads.load(Ordering::SeqCst)
    }
}

impl AddressSpace for MockAddressSpace {
    fn read(&self, item: &ReadValueId) -> DataValue {
        self.total_reads.fetch_add(1, Ordering::SeqCst);
        *self.reads.write().entry(item.node_id.clone()).or_default() += 1;

        if self.fail_reads.load(Ordering::SeqCst) {
            return DataValue::default().with_status(StatusCode::BAD_INTERNAL_ERROR);
        }
        self.values
            .read()
            .get(&item.node_id)
            .cloned()
            .unwrap_or_else(|| DataValue::default().with_status(StatusCode::BAD_NODE_ID_UNKNOWN))
    }

    fn browse(&self, node_id: &NodeId) -> Result<Vec<ReferenceDescription>, StatusCode> {
        self.references
            .read()
            .get(node_id)
            .cloned()
            .ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_counts_reads() {
        let mock = MockAddressSpace::new();
        let node = NodeId::numeric(2, 7);
        mock.set(node.clone(), 3i32);

        let value = mock.read(&ReadValueId::value_of(node.clone()));
        assert_eq!(value.value, Variant::Int32(3));
        assert_eq!(mock.read_count(&node), 1);

        mock.fail_reads(true);
        let value = mock.read(&ReadValueId::value_of(node.clone()));
        assert_eq!(value.status, StatusCode::BAD_INTERNAL_ERROR);
        assert_eq!(mock.total_reads(), 2);
    }

    #[test]
    fn test_unknown_node() {
        let mock = MockAddressSpace::new();
        let value = mock.read(&ReadValueId::value_of(NodeId::numeric(2, 1)));
        assert_eq!(value.status, StatusCode::BAD_NODE_ID_UNKNOWN);
        assert!(mock.browse(&NodeId::numeric(2, 1)).is_err());
    }
}
