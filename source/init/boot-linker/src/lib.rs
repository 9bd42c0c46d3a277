#![forbid(unsafe_code)]
// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: boot-linker – selects and activates services/app once per boot
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable (v1.0)
//! TEST_COVERAGE: 3 host tests (tests/cli.rs)
//!
//! PUBLIC API: Cli, run(), execute(), init_logging()
//! DEPENDS_ON: updates domain library

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use updates::{BootLinker, Config, Resolution};

/// Command line of the boot linker.
#[derive(Debug, Parser)]
#[command(name = "boot-linker", version, about = "Resolve and activate component versions")]
pub struct Cli {
    /// Configuration file (defaults to /etc/headunit/updates.toml when present).
    #[arg(long, value_name = "TOML")]
    pub config: Option<PathBuf>,
}

/// Installs `env_logger` with an `info` default; `RUST_LOG` overrides it.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .try_init();
}

pub fn run(cli: &Cli) -> updates::Result<Resolution> {
    let config = Config::load(cli.config.as_deref())?;
    BootLinker::new(&config.layout).activate()
}

/// 0 when both layers are active, 1 otherwise.
pub fn execute(cli: &Cli) -> ExitCode {
    match run(cli) {
        Ok(resolution) => {
            info!(
                "boot-linker: OS {} services {} app {}",
                resolution.os_version,
                resolution.services.manifest.version,
                resolution.app.manifest.version
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("boot-linker: {err}");
            ExitCode::FAILURE
        }
    }
}
