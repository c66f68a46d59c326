// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uasrv Integration Tests
//!
//! End-to-end tests that run a real server on `127.0.0.1:0` and talk to it
//! over TCP with the frame protocol.
//!
//! ## Module Structure
//!
//! - [`common`]: Shared test utilities
//!   - `fixtures`: Configurations, node ids and config file contents
//!   - `builders`: Service request builders
//!   - `assertions`: Response and frame assertions
//!   - `mocks`: Recording address space
//!   - `harness`: `TestServer` and `TestClient`
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p uasrv-tests
//! cargo test -p uasrv-tests --test integration_admission
//! cargo test -p uasrv-tests --test integration_subscription -- --nocapture
//! ```
//!
//! ## Test Categories
//!
//! - `integration_admission.rs`: connection caps, idle eviction, deferral, refusal
//! - `integration_channel.rs`: handshake, token renewal, channel aborts
//! - `integration_subscription.rs`: publish flow, keep-alives, republish, expiry
//! - `integration_continuation.rs`: Browse paging through continuation points
//! - `integration_config.rs`: loading YAML/TOML/JSON files and validation
//!
//! ## Writing New Tests
//!
//! ```rust,ignore
//! use uasrv_tests::prelude::*;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let server = TestServer::start(ConfigFixtures::local()).await;
//!     let mut client = server.client().await;
//!     client.open_channel().await.unwrap();
//!     let token = client.open_session("test").await.unwrap();
//!     // ...
//!     server.stop().await;
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Re-export commonly used items for convenience.
pub mod prelude {
    pub use crate::common::assertions::*;
    pub use crate::common::builders::*;
    pub use crate::common::fixtures::*;
    pub use crate::common::harness::*;
    pub use crate::common::mocks::*;
    pub use crate::common::init_test_logging;
}
