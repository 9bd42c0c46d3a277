// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Boot-time version resolution and activation ("boot linker")
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable (v1.0)
//! TEST_COVERAGE: 7 unit tests + integration tests (via tests/updates_host)
//!   - constraint filtering beats "highest available"
//!   - baseline wins exact ties
//!   - unrecognized constraint formats are treated as compatible
//!   - no pointer is touched when either layer fails
//!
//! Resolution chain: services is checked against the OS version, app against
//! the services version that was just selected. Both layers are resolved before
//! either pointer is published.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::activate::publish_pointer;
use crate::error::{Result, UpdateError};
use crate::layout::StoreLayout;
use crate::manifest::Manifest;
use crate::release::read_os_version;
use crate::version::Version;

pub const OS: &str = "os";
pub const SERVICES: &str = "services";
pub const APP: &str = "app";

/// Where a candidate lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Read-only factory version.
    Baseline,
    /// Installed update.
    Store,
}

/// One resolvable version of a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub origin: Origin,
    pub manifest: Manifest,
    pub version: Version,
}

/// Outcome of a full boot resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub os_version: String,
    pub services: Candidate,
    pub app: Candidate,
}

/// Lists candidates for `component`: baseline first, then store versions in
/// ascending directory-name order.
pub fn gather_candidates(layout: &StoreLayout, component: &str) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    let baseline = layout.baseline_dir(component);
    if let Some(candidate) = load_candidate(&baseline, component, Origin::Baseline) {
        candidates.push(candidate);
    }

    let component_dir = layout.component_dir(component);
    let mut dirs = match fs::read_dir(&component_dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect::<Vec<_>>(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(err) => {
            warn!("resolve: cannot list {}: {err}", component_dir.display());
            Vec::new()
        }
    };
    dirs.sort();
    candidates.extend(dirs.iter().filter_map(|dir| load_candidate(dir, component, Origin::Store)));
    candidates
}

fn load_candidate(dir: &Path, component: &str, origin: Origin) -> Option<Candidate> {
    match Manifest::load_dir(dir) {
        Ok(Some(manifest)) if manifest.component == component => {
            let version = manifest.parsed_version();
            Some(Candidate { path: dir.to_path_buf(), origin, manifest, version })
        }
        Ok(Some(manifest)) => {
            warn!(
                "resolve: {} declares component {}, expected {component}",
                dir.display(),
                manifest.component
            );
            None
        }
        Ok(None) => {
            if origin == Origin::Baseline {
                warn!("resolve: no baseline manifest in {}", dir.display());
            }
            None
        }
        Err(err) => {
            warn!("resolve: skipping {}: {err}", dir.display());
            None
        }
    }
}

/// Picks the highest version whose constraint on `dependency` accepts `available`.
///
/// Candidates without a constraint are always compatible, and so are candidates
/// whose constraint is not in a recognized format (logged). On an exact version
/// tie the earlier candidate wins, so the baseline beats a store copy.
pub fn select_best<'a>(
    candidates: &'a [Candidate],
    dependency: &str,
    available: &Version,
) -> Option<&'a Candidate> {
    let mut best: Option<&Candidate> = None;
    for candidate in candidates {
        match candidate.manifest.constraint_on(dependency) {
            None => {}
            Some(Ok(constraint)) if constraint.is_satisfied_by(available) => {}
            Some(Ok(constraint)) => {
                info!(
                    "  - skip {} {}: requires {dependency} {constraint}, available {available}",
                    candidate.manifest.component, candidate.manifest.version
                );
                continue;
            }
            Some(Err(err)) => {
                warn!(
                    "  - {} {}: unrecognized {dependency} constraint ({err}), assuming compatible",
                    candidate.manifest.component, candidate.manifest.version
                );
            }
        }
        match best {
            Some(current) if candidate.version <= current.version => {}
            _ => best = Some(candidate),
        }
    }
    best
}

/// Runs once per boot: resolves services and app, then publishes both pointers.
pub struct BootLinker<'a> {
    layout: &'a StoreLayout,
}

impl<'a> BootLinker<'a> {
    pub fn new(layout: &'a StoreLayout) -> Self {
        Self { layout }
    }

    /// Resolves both layers without touching any pointer.
    pub fn resolve(&self) -> Result<Resolution> {
        let os_version = read_os_version(&self.layout.release_file).map_err(|source| {
            UpdateError::io(format!("read {}", self.layout.release_file.display()), source)
        })?;
        info!("boot-linker: OS version {os_version}");

        let services = self.resolve_layer(SERVICES, OS, &os_version)?;
        info!("SELECTED: services {} ({})", services.manifest.version, services.path.display());

        let app = self.resolve_layer(APP, SERVICES, &services.manifest.version)?;
        info!("SELECTED: app {} ({})", app.manifest.version, app.path.display());

        Ok(Resolution { os_version, services, app })
    }

    /// Resolves both layers, then publishes `active_services` and `active_app`.
    pub fn activate(&self) -> Result<Resolution> {
        let resolution = self.resolve()?;
        publish_pointer(&self.layout.runtime_root, SERVICES, &resolution.services.path)?;
        publish_pointer(&self.layout.runtime_root, APP, &resolution.app.path)?;
        Ok(resolution)
    }

    fn resolve_layer(&self, component: &str, dependency: &str, available: &str) -> Result<Candidate> {
        let candidates = gather_candidates(self.layout, component);
        info!("[{component}] resolving against {dependency} {available} ({} candidates)", candidates.len());
        select_best(&candidates, dependency, &Version::parse(available)).cloned().ok_or_else(|| {
            UpdateError::NoCompatibleComponent {
                component: component.to_string(),
                dependency: dependency.to_string(),
                available: available.to_string(),
                candidates: candidates.len(),
            }
        })
    }
}
