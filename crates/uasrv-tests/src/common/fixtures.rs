// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Pre-built server configurations, node ids and config file contents.

use std::sync::Arc;

use uasrv_config::ServerConfig;
use uasrv_core::{NodeId, Variant};
use uasrv_server::MemoryAddressSpace;
use uasrv_server::address_space::reference_types;

// =============================================================================
// Config Fixtures
// =============================================================================

/// Server configurations for integration tests.
pub struct ConfigFixtures;

impl ConfigFixtures {
    /// Loopback on an ephemeral port with defaults otherwise.
    pub fn local() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.server.bind_address = "127.0.0.1".parse().expect("loopback address");
        config.server.port = 0;
        config
    }

    /// Loopback config with a connection cap and admission wait.
    pub fn with_connection_cap(max_connections: usize, timeout_ms: u64) -> ServerConfig {
        let mut config = Self::local();
        config.server.max_connections = max_connections;
        config.server.timeout_ms = timeout_ms;
        config
    }

    /// Loopback config tuned for fast publishing: 50 ms floor on both the
    /// publishing and sampling intervals.
    pub fn fast_publishing() -> ServerConfig {
        let mut config = Self::local();
        config.subscription.min_publishing_interval_ms = 50;
        config.monitored_item.min_sampling_interval_ms = 50;
        config
    }
}

// =============================================================================
// Node Fixtures
// =============================================================================

/// Well-known nodes of [`populated_space`].
pub struct NodeFixtures;

impl NodeFixtures {
    /// Folder with [`Self::FOLDER_CHILDREN`] variables.
    pub fn folder() -> NodeId {
        NodeId::string(2, "Plant")
    }

    /// Number of children under [`Self::folder`].
    pub const FOLDER_CHILDREN: usize = 5;

    /// The i-th child variable of the folder.
    pub fn child(index: usize) -> NodeId {
        NodeId::string(2, format!("Plant.Sensor{index}"))
    }

    /// Browse name of the i-th child.
    pub fn child_name(index: usize) -> String {
        format!("Sensor{index}")
    }

    /// A writable numeric variable.
    pub fn temperature() -> NodeId {
        NodeId::numeric(2, 1001)
    }

    /// A second numeric variable.
    pub fn pressure() -> NodeId {
        NodeId::numeric(2, 1002)
    }

    /// A node that does not exist.
    pub fn missing() -> NodeId {
        NodeId::numeric(2, 9999)
    }
}

/// Builds an address space with a folder of five sensors and two writable
/// variables.
pub fn populated_space() -> Arc<MemoryAddressSpace> {
    let space = Arc::new(MemoryAddressSpace::new());

    space.add_object(NodeFixtures::folder(), "Plant");
    for index in 0..NodeFixtures::FOLDER_CHILDREN {
        let child = NodeFixtures::child(index);
        space.add_variable(child.clone(), NodeFixtures::child_name(index), index as i32);
        space.add_reference(&NodeFixtures::folder(), reference_types::organizes(), &child);
    }

    space.add_variable(NodeFixtures::temperature(), "Temperature", 20.0f64);
    space.add_variable(NodeFixtures::pressure(), "Pressure", Variant::Double(1.0));
    space
}

// =============================================================================
// Config File Fixtures
// =============================================================================

/// Config file contents in every supported format.
pub struct ConfigFileFixtures;

impl ConfigFileFixtures {
    /// YAML document.
    pub const YAML: &'static str = r#"
server:
  bind_address: 127.0.0.1
  port: 4841
  max_connections: 8
session:
  max_sessions: 16
subscription:
  default_keep_alive_count: 5
logging:
  level: debug
  format: json
"#;

    /// TOML document.
    pub const TOML: &'static str = r#"
[server]
bind_address = "127.0.0.1"
port = 4842
max_connections = 8

[session]
max_sessions = 16

[monitored_item]
default_queue_size = 4
discard_oldest = false
"#;

    /// JSON document.
    pub const JSON: &'static str = r#"{
  "server": { "bind_address": "127.0.0.1", "port": 4843, "max_connections": 8 },
  "session": { "max_sessions": 16, "max_continuation_points": 3 },
  "logging": { "level": "warn", "format": "compact" }
}"#;

    /// Document that parses but fails validation.
    pub const INVALID_YAML: &'static str = r#"
server:
  port: 4840
  max_connections: 0
"#;

    /// Document that does not parse.
    pub const MALFORMED_TOML: &'static str = "[server\nport = ";

    /// YAML with a defaulted placeholder for the port.
    pub const PLACEHOLDER_YAML: &'static str = r#"
server:
  bind_address: 127.0.0.1
  port: ${UASRV_TEST_UNSET_PORT_VARIABLE:4901}
"#;
}
