// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uasrv-server
//!
//! OPC UA server engine for uasrv.
//!
//! The crate splits into three layers:
//!
//! - **Transport**: frame codec, cancel-safe reader/writer, per-socket
//!   connection tasks driving a [`SecureChannel`]
//! - **Admission**: [`ConnectionListener`] with idle-channel recycling,
//!   bounded deferral and refusal, plus [`ListenerStats`]
//! - **Engine**: one task owning every [`Session`], [`Subscription`] and
//!   [`MonitoredItem`]; the per-session [`PublishEngine`] and
//!   [`ContinuationPointManager`]
//!
//! ```text
//!  TcpListener ──► ConnectionListener ──spawn──► Connection (per socket)
//!                        │                          │  ▲
//!                   ChannelRegistry           Request│  │Outbound
//!                                                   ▼  │
//!                                                  Engine ──► SessionManager
//!                                                              └► Session
//!                                                                 ├► Subscription ─► MonitoredItem
//!                                                                 ├► PublishEngine
//!                                                                 └► ContinuationPointManager
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use uasrv_config::ServerConfig;
//! use uasrv_server::UaServer;
//!
//! let handle = UaServer::new(ServerConfig::default()).start().await?;
//! println!("listening on {}", handle.local_addr());
//! handle.shutdown().await?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Transport Modules
// =============================================================================

pub mod connection;
pub mod frame;
pub mod transport;

// =============================================================================
// Channel & Admission Modules
// =============================================================================

pub mod channel;
pub mod listener;
pub mod registry;
pub mod stats;

// =============================================================================
// Engine Modules
// =============================================================================

pub mod address_space;
pub mod continuation;
pub mod engine;
pub mod events;
pub mod monitored_item;
pub mod publish;
pub mod service;
pub mod session;
pub mod session_manager;
pub mod subscription;

// =============================================================================
// Server Assembly
// =============================================================================

pub mod server;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use address_space::{AddressSpace, MemoryAddressSpace, ReferenceDescription};
pub use channel::{ChannelLimits, ChannelState, SecureChannel, SecurityToken};
pub use connection::Connection;
pub use continuation::{ContinuationPoint, ContinuationPointManager, Page};
pub use engine::{Engine, EngineDiagnostics, EngineHandle, SubscriptionSummary};
pub use events::{Outbound, ServerEvent};
pub use frame::{Direction, ErrorMessage, Frame, MessageType};
pub use listener::ConnectionListener;
pub use monitored_item::{MonitoredItem, MonitoredItemSettings};
pub use publish::{PendingPublish, PublishEngine, SubscriptionAcknowledgement};
pub use registry::{ChannelRegistry, ChannelSlot, ChannelStatus};
pub use server::{ServerHandle, UaServer};
pub use service::{
    JsonServiceCodec, RequestEnvelope, ResponseEnvelope, ServiceCodec, ServiceRequest,
    ServiceResponse,
};
pub use session::Session;
pub use session_manager::SessionManager;
pub use stats::{ListenerStats, ListenerStatsSnapshot};
pub use subscription::{Subscription, SubscriptionDiagnostics, SubscriptionState};
pub use transport::{FrameReader, FrameWriter};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
