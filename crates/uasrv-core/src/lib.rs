// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uasrv-core
//!
//! Core abstractions and shared types for the uasrv OPC UA server runtime.
//!
//! This crate provides the foundational pieces every other uasrv crate builds on:
//!
//! - **Status**: OPC UA `StatusCode` with the codes the engine emits
//! - **Error**: Unified error hierarchy mapping every failure to a status code
//! - **Types**: Identifiers, `NodeId`, `Variant`, `DataValue`, security and monitoring modes
//! - **Sequence**: Strictly increasing id sequences that wrap without producing zero
//! - **Timer**: Owned, cancellable periodic and one-shot timers feeding an mpsc channel
//! - **Observer**: Ordered observer registry with idempotent unregistration
//!
//! ## Example
//!
//! ```rust
//! use uasrv_core::{DataValue, IdSequence, StatusCode, SubscriptionId};
//!
//! let ids = IdSequence::new();
//! let first = SubscriptionId::new(ids.next());
//! assert_eq!(first.value(), 1);
//!
//! let value = DataValue::new(21.5f64).with_status(StatusCode::GOOD);
//! assert!(value.status.is_good());
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Core Modules
// =============================================================================

pub mod error;
pub mod status;
pub mod types;

// =============================================================================
// Scheduling & Event Modules
// =============================================================================

pub mod observer;
pub mod sequence;
pub mod timer;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use error::*;
pub use status::StatusCode;
pub use types::*;

pub use observer::{EventCollector, Observer, ObserverId, ObserverList};
pub use sequence::{IdSequence, SharedSequence};
pub use timer::{MIN_TIMER_PERIOD, TimerHandle};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
