#![forbid(unsafe_code)]
// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: updated – head unit update agent (one package per invocation)
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable (v1.0)
//! TEST_COVERAGE: 5 host tests (tests/cli.rs)
//!   - flag parsing (file xor scan, one required)
//!   - empty scan exits successfully
//!   - full install through a sandbox config
//!
//! PUBLIC API: Cli, run(), execute(), init_logging()
//! DEPENDS_ON: updates domain library

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgGroup, Parser};
use log::{error, info};

use updates::{
    AgentOptions, AgentOutcome, Config, HostSystem, PackageSource, SystemControl, UpdateAgent,
};

/// Command line of the update agent.
#[derive(Debug, Parser)]
#[command(name = "updated", version, about = "Validate and install a component update package")]
#[command(group(ArgGroup::new("source").required(true).args(["file", "scan"])))]
pub struct Cli {
    /// Install this package.
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Install the oldest package found in this directory.
    #[arg(long, value_name = "DIR")]
    pub scan: Option<PathBuf>,

    /// Do not reboot after a successful install.
    #[arg(long)]
    pub no_reboot: bool,

    /// Reclaim the install lock even if another process holds it.
    #[arg(long)]
    pub force_unlock: bool,

    /// Configuration file (defaults to /etc/headunit/updates.toml when present).
    #[arg(long, value_name = "TOML")]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn source(&self) -> Option<PackageSource> {
        match (&self.file, &self.scan) {
            (Some(file), _) => Some(PackageSource::File(file.clone())),
            (None, Some(dir)) => Some(PackageSource::Scan(dir.clone())),
            (None, None) => None,
        }
    }

    pub fn options(&self) -> AgentOptions {
        AgentOptions { reboot: !self.no_reboot, force_unlock: self.force_unlock }
    }
}

/// Installs `env_logger` with an `info` default; `RUST_LOG` overrides it.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .try_init();
}

/// Runs one agent invocation with the given host side effects.
pub fn run(cli: &Cli, system: Box<dyn SystemControl>) -> updates::Result<AgentOutcome> {
    let config = Config::load(cli.config.as_deref())?;
    let source = match cli.source() {
        Some(source) => source,
        None => return Ok(AgentOutcome::NothingToInstall),
    };
    let agent = UpdateAgent::with_host(config.layout, config.lock, Box::new(updates::ProcFs), system);
    agent.run(&source, &cli.options())
}

/// Maps a run to the process exit status: 0 on install or empty scan, 1 otherwise.
pub fn execute(cli: &Cli) -> ExitCode {
    match run(cli, Box::new(HostSystem)) {
        Ok(AgentOutcome::NothingToInstall) => {
            info!("updated: nothing to install");
            ExitCode::SUCCESS
        }
        Ok(AgentOutcome::Installed { component, version, .. }) => {
            info!("updated: {component} {version} installed");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("updated: {err}");
            ExitCode::FAILURE
        }
    }
}
