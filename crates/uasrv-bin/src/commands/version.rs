// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `version` command.

use uasrv_config::schema::DEFAULT_PORT;
use uasrv_server::frame::PROTOCOL_VERSION;

use crate::cli::Cli;
use crate::error::BinResult;

/// Prints crate versions and the wire protocol the server speaks.
pub fn version(cli: &Cli) -> BinResult<()> {
    println!("uasrv {}", crate::VERSION);
    if cli.quiet {
        return Ok(());
    }

    println!();
    println!("Crates:");
    for (name, version) in [
        ("uasrv-core", uasrv_core::VERSION),
        ("uasrv-config", uasrv_config::VERSION),
        ("uasrv-server", uasrv_server::VERSION),
    ] {
        println!("  {name:<14}{version}");
    }

    println!();
    println!("Protocol:");
    println!("  Transport:    opc.tcp, protocol version {PROTOCOL_VERSION}");
    println!("  Default port: {DEFAULT_PORT}");
    println!("  Security:     None");
    println!("  Payloads:     JSON service envelopes");
    println!();
    println!(
        "Platform: {}-{}",
        std::env::consts::ARCH,
        std::env::consts::OS
    );

    Ok(())
}
