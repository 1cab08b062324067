// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set. The terminal UI owns the screen,
/// so only errors get through there, with or without `--verbose`.
fn default_directive(verbose: bool, interactive: bool) -> &'static str {
    match (verbose, interactive) {
        (_, true) => "error",
        (true, false) => "debug",
        (false, false) => "warn",
    }
}

pub fn init(verbose: bool, interactive: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, interactive)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    tracing::debug!("logging initialized");
    Ok(())
}
