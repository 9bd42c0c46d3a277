// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Update agent orchestration (select, lock, validate, install, reboot)
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable (v1.0)
//! TEST_COVERAGE: 6 unit tests + integration tests (via tests/updates_host)
//!   - deterministic scan selection (mtime, then name)
//!   - incoming packages are removed after install, external ones are kept
//!   - lock released on success and on failure
//!   - reboot only when requested, and only after the lock is gone
//!
//! Sequence per invocation:
//!   select -> lock -> validate -> install -> incoming cleanup -> sync -> unlock -> reboot

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;

use log::{error, info, warn};

use crate::error::{IoContext, Result, UpdateError};
use crate::install::install_package;
use crate::layout::StoreLayout;
use crate::lock::{InstallLock, LockPolicy, ProcFs, ProcessProbe};
use crate::package::{checksum_path, validate_package, PACKAGE_SUFFIX};

/// Where the package to install comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    /// Explicit package path.
    File(PathBuf),
    /// Directory scanned for the oldest `.tar.gz` package.
    Scan(PathBuf),
}

/// Per-invocation switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentOptions {
    pub reboot: bool,
    /// Reclaim the lock regardless of its holder.
    pub force_unlock: bool,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self { reboot: true, force_unlock: false }
    }
}

/// Host side effects the agent needs after an install.
pub trait SystemControl {
    /// Flushes filesystem buffers.
    fn sync(&self) -> io::Result<()>;
    /// Requests a system reboot.
    fn reboot(&self) -> io::Result<()>;
}

/// Runs the host `sync` and `reboot` commands.
pub struct HostSystem;

impl HostSystem {
    fn run(program: &str) -> io::Result<()> {
        let status = Command::new(program).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!("{program} exited with {status}")))
        }
    }
}

impl SystemControl for HostSystem {
    fn sync(&self) -> io::Result<()> {
        Self::run("sync")
    }

    fn reboot(&self) -> io::Result<()> {
        Self::run("reboot")
    }
}

/// Result of one agent run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    /// Scan found no package.
    NothingToInstall,
    Installed {
        component: String,
        version: String,
        target: PathBuf,
        rebooted: bool,
    },
}

pub struct UpdateAgent {
    layout: StoreLayout,
    lock_policy: LockPolicy,
    probe: Box<dyn ProcessProbe>,
    system: Box<dyn SystemControl>,
}

impl UpdateAgent {
    /// Agent wired to `/proc` and the host `sync`/`reboot` commands.
    pub fn new(layout: StoreLayout, lock_policy: LockPolicy) -> Self {
        Self::with_host(layout, lock_policy, Box::new(ProcFs), Box::new(HostSystem))
    }

    pub fn with_host(
        layout: StoreLayout,
        lock_policy: LockPolicy,
        probe: Box<dyn ProcessProbe>,
        system: Box<dyn SystemControl>,
    ) -> Self {
        Self { layout, lock_policy, probe, system }
    }

    pub fn run(&self, source: &PackageSource, options: &AgentOptions) -> Result<AgentOutcome> {
        let result = self.run_inner(source, options);
        if let Err(err) = &result {
            error!("agent: {err}");
        }
        result
    }

    fn run_inner(&self, source: &PackageSource, options: &AgentOptions) -> Result<AgentOutcome> {
        let package = match source {
            PackageSource::File(path) => path.clone(),
            PackageSource::Scan(dir) => match select_candidate(dir)? {
                Some(path) => path,
                None => {
                    info!("agent: no package in {}", dir.display());
                    return Ok(AgentOutcome::NothingToInstall);
                }
            },
        };
        info!("agent: package {}", package.display());

        let lock = if options.force_unlock {
            InstallLock::force_acquire(&self.layout.lock_path)?
        } else {
            InstallLock::acquire(&self.layout.lock_path, &self.lock_policy, self.probe.as_ref())?
        };

        // The guard releases the lock on every early return below.
        let validated = validate_package(&package)?;
        let (component, version) = (validated.component().to_string(), validated.version().to_string());
        let target = install_package(&self.layout, &package, &component, &version)?;

        if self.layout.is_incoming(&package) {
            remove_drop_files(&package);
        } else {
            info!("agent: leaving external package {} in place", package.display());
        }

        info!("agent: syncing filesystems");
        self.system.sync().context(|| "sync".to_string())?;
        lock.release()?;

        let rebooted = if options.reboot {
            info!("agent: rebooting to activate {component} {version}");
            self.system.reboot().context(|| "reboot".to_string())?;
            true
        } else {
            info!("agent: reboot suppressed");
            false
        };
        Ok(AgentOutcome::Installed { component, version, target, rebooted })
    }
}

/// Picks the package with the earliest modification time; ties go to the lower file name.
pub fn select_candidate(dir: &Path) -> Result<Option<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(UpdateError::ScanDirNotFound { path: dir.to_path_buf() })
        }
        Err(err) => return Err(UpdateError::io(format!("scan {}", dir.display()), err)),
    };

    let mut found: Vec<(SystemTime, String, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry.context(|| format!("scan {}", dir.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(PACKAGE_SUFFIX) {
            continue;
        }
        let meta = entry.metadata().context(|| format!("stat {}", entry.path().display()))?;
        if !meta.is_file() {
            continue;
        }
        let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        found.push((mtime, name, entry.path()));
    }
    found.sort();
    if found.len() > 1 {
        info!("agent: {} packages in {}, taking the oldest", found.len(), dir.display());
    }
    Ok(found.into_iter().next().map(|(_, _, path)| path))
}

fn remove_drop_files(package: &Path) {
    for path in [package.to_path_buf(), checksum_path(package)] {
        match fs::remove_file(&path) {
            Ok(()) => info!("agent: removed {}", path.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!("agent: could not remove {}: {err}", path.display()),
        }
    }
}
