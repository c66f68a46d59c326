// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Value source seam.
//!
//! The engine reads monitored attributes and browses references through
//! [`AddressSpace`]. Implementations must not block: they are called from the
//! engine task on every sampling tick.
//!
//! ```text
//!  ┌───────────────┐   read(ReadValueId)    ┌──────────────────────┐
//!  │ engine task   │ ─────────────────────► │ dyn AddressSpace     │
//!  │ (sampling,    │   browse(NodeId)       │  MemoryAddressSpace  │
//!  │  Browse)      │ ─────────────────────► │  or an application   │
//!  └───────────────┘                        └──────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uasrv_core::types::ATTRIBUTE_VALUE;
use uasrv_core::{DataValue, NodeId, ReadValueId, StatusCode, Variant};

/// Standard reference type ids.
pub mod reference_types {
    use uasrv_core::NodeId;

    /// Organizes - i=35.
    pub fn organizes() -> NodeId {
        NodeId::numeric(0, 35)
    }

    /// HasComponent - i=47.
    pub fn has_component() -> NodeId {
        NodeId::numeric(0, 47)
    }
}

/// A reference returned by Browse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDescription {
    /// Reference type.
    pub reference_type: NodeId,
    /// Direction of the reference.
    pub is_forward: bool,
    /// Target node.
    pub node_id: NodeId,
    /// Browse name of the target.
    pub browse_name: String,
}

/// Source of attribute values and references.
pub trait AddressSpace: Send + Sync {
    /// Reads an attribute. Failures are reported through the value status.
    fn read(&self, item: &ReadValueId) -> DataValue;

    /// Lists the references of a node.
    fn browse(&self, node_id: &NodeId) -> Result<Vec<ReferenceDescription>, StatusCode>;
}

// =============================================================================
// MemoryAddressSpace
// =============================================================================

#[derive(Debug, Clone)]
struct Node {
    browse_name: String,
    value: Option<DataValue>,
    references: Vec<ReferenceDescription>,
}

/// In-memory address space.
///
/// Always contains the server current time variable, whose value is the
/// wall clock at read time.
#[derive(Debug)]
pub struct MemoryAddressSpace {
    nodes: RwLock<HashMap<NodeId, Node>>,
}

impl MemoryAddressSpace {
    /// Creates an address space holding only the server current time.
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            NodeId::server_current_time(),
            Node {
                browse_name: "CurrentTime".to_string(),
                value: None,
                references: Vec::new(),
            },
        );
        Self {
            nodes: RwLock::new(nodes),
        }
    }

    /// Adds or replaces a variable.
    pub fn add_variable(&self, node_id: NodeId, browse_name: impl Into<String>, value: impl Into<Variant>) {
        let value = DataValue::new(value).with_source_timestamp(Utc::now());
        let mut nodes = self.nodes.write();
        let node = nodes.entry(node_id).or_insert_with(|| Node {
            browse_name: String::new(),
            value: None,
            references: Vec::new(),
        });
        node.browse_name = browse_name.into();
        node.value = Some(value);
    }

    /// Adds an object without a value.
    pub fn add_object(&self, node_id: NodeId, browse_name: impl Into<String>) {
        self.nodes.write().insert(
            node_id,
            Node {
                browse_name: browse_name.into(),
                value: None,
                references: Vec::new(),
            },
        );
    }

    /// Adds a forward reference and its inverse.
    ///
    /// Returns `false` if either node is unknown.
    pub fn add_reference(&self, source: &NodeId, reference_type: NodeId, target: &NodeId) -> bool {
        let mut nodes = self.nodes.write();
        let (Some(source_name), Some(target_name)) = (
            nodes.get(source).map(|node| node.browse_name.clone()),
            nodes.get(target).map(|node| node.browse_name.clone()),
        ) else {
            return false;
        };

        if let Some(node) = nodes.get_mut(source) {
            node.references.push(ReferenceDescription {
                reference_type: reference_type.clone(),
                is_forward: true,
                node_id: target.clone(),
                browse_name: target_name,
            });
        }
        if let Some(node) = nodes.get_mut(target) {
            node.references.push(ReferenceDescription {
                reference_type,
                is_forward: false,
                node_id: source.clone(),
                browse_name: source_name,
            });
        }
        true
    }

    /// Updates the value of a variable. Returns `false` for unknown nodes.
    pub fn set_value(&self, node_id: &NodeId, value: DataValue) -> bool {
        match self.nodes.write().get_mut(node_id) {
            Some(node) => {
                node.value = Some(value);
                true
            }
            None => false,
        }
    }

    /// Returns the number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Returns `true` if only built-in nodes exist.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

impl Default for MemoryAddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace for MemoryAddressSpace {
    fn read(&self, item: &ReadValueId) -> DataValue {
        let now = Utc::now();
        if item.attribute_id != ATTRIBUTE_VALUE {
            return DataValue::default()
                .with_status(StatusCode::BAD_ATTRIBUTE_ID_INVALID)
                .with_server_timestamp(now);
        }
        if item.node_id == NodeId::server_current_time() {
            return DataValue::new(now)
                .with_source_timestamp(now)
                .with_server_timestamp(now);
        }

        let nodes = self.nodes.read();
        match nodes.get(&item.node_id) {
            Some(Node {
                value: Some(value), ..
            }) => value.clone().with_server_timestamp(now),
            Some(_) => DataValue::default()
                .with_status(StatusCode::BAD_ATTRIBUTE_ID_INVALID)
                .with_server_timestamp(now),
            None => DataValue::default()
                .with_status(StatusCode::BAD_NODE_ID_UNKNOWN)
                .with_server_timestamp(now),
        }
    }

    fn browse(&self, node_id: &NodeId) -> Result<Vec<ReferenceDescription>, StatusCode> {
        self.nodes
            .read()
            .get(node_id)
            .map(|node| node.references.clone())
            .ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_variable_and_errors() {
        let space = MemoryAddressSpace::new();
        let node = NodeId::string(2, "Line1.Speed");
        space.add_variable(node.clone(), "Speed", 12.5f64);

        let value = space.read(&ReadValueId::value_of(node.clone()));
        assert_eq!(value.value, Variant::Double(12.5));
        assert!(value.status.is_good());
        assert!(value.server_timestamp.is_some());

        let unknown = space.read(&ReadValueId::value_of(NodeId::numeric(2, 999)));
        assert_eq!(unknown.status, StatusCode::BAD_NODE_ID_UNKNOWN);

        let attribute = space.read(&ReadValueId {
            node_id: node,
            attribute_id: 1,
        });
        assert_eq!(attribute.status, StatusCode::BAD_ATTRIBUTE_ID_INVALID);
    }

    #[test]
    fn test_server_current_time_changes() {
        let space = MemoryAddressSpace::new();
        let value = space.read(&ReadValueId::value_of(NodeId::server_current_time()));
        assert!(matches!(value.value, Variant::DateTime(_)));
    }

    #[test]
    fn test_browse_references() {
        let space = MemoryAddressSpace::new();
        let folder = NodeId::numeric(2, 1);
        space.add_object(folder.clone(), "Line1");
        for i in 0..3 {
            let child = NodeId::numeric(2, 10 + i);
            space.add_variable(child.clone(), format!("Tag{i}"), i);
            assert!(space.add_reference(&folder, reference_types::organizes(), &child));
        }

        let refs = space.browse(&folder).unwrap();
        assert_eq!(refs.len(), 3);
        assert!(refs.iter().all(|r| r.is_forward));
        assert_eq!(refs[0].browse_name, "Tag0");

        let inverse = space.browse(&NodeId::numeric(2, 10)).unwrap();
        assert_eq!(inverse[0].node_id, folder);
        assert!(!inverse[0].is_forward);

        assert_eq!(
            space.browse(&NodeId::numeric(5, 5)),
            Err(StatusCode::BAD_NODE_ID_UNKNOWN)
        );
    }
}
