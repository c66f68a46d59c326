// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! `uasrv` entry point.

use uasrv_bin::{Cli, commands, error::report_error_and_exit, init_logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    let file_logging = cli.file_logging();
    let level = cli.effective_log_level(&file_logging);
    if let Err(e) = init_logging(&level, cli.effective_log_format(&file_logging)) {
        report_error_and_exit(e);
    }

    if let Err(e) = commands::execute(cli).await {
        report_error_and_exit(e);
    }
}
