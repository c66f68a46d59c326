// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The `uasrv` command.
//!
//! `main` parses a [`Cli`], installs logging (command-line flags take
//! precedence over the configuration file) and dispatches to a subcommand. `run` builds a
//! [`ServerRuntime`], which serves until [`ShutdownCoordinator`] settles a
//! [`ShutdownReason`], then closes channels and sessions in order.
//!
//! ```text
//! main ─► Cli ─► commands::execute
//!                  ├─ run ──► RuntimeBuilder ─► ServerRuntime ─► uasrv-server
//!                  │                                 ▲
//!                  │                         ShutdownCoordinator
//!                  ├─ validate ─► ServerConfig (rendered as json/toml)
//!                  └─ version
//! ```
//!
//! Failures surface as [`BinError`], whose exit codes follow `sysexits.h`.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;
pub use runtime::{RuntimeBuilder, ServerRuntime};
pub use shutdown::{ShutdownCoordinator, ShutdownReason};

/// Version of the `uasrv` binary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
