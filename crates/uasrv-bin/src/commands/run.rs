// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! `uasrv run`

use crate::cli::{Cli, RunArgs};
use crate::error::BinResult;
use crate::runtime::RuntimeBuilder;

/// Serves until a signal or shutdown request arrives.
pub async fn run(cli: &Cli, RunArgs { port, bind }: RunArgs) -> BinResult<()> {
    RuntimeBuilder::new()
        .config_path(&cli.config)
        .port(port)
        .bind_address(bind)
        .build()?
        .run()
        .await
}
