// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Crash-consistent installation of a validated package into the store
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable (v1.0)
//! TEST_COVERAGE: 5 unit tests + integration tests (via tests/updates_host)
//!
//! INVARIANTS:
//!   - `<store>/<component>/<version>` is either absent or complete
//!   - payload is extracted into `.staging-<version>-<pid>` and renamed into place
//!   - a replaced version is parked as `.retired-<version>-<pid>` until the swap lands
//!   - leftovers from an interrupted install are swept before the next one
//!
//! Callers hold the install lock for the whole operation.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use log::{debug, info, warn};

use crate::error::{IoContext, Result, UpdateError};
use crate::layout::StoreLayout;
use crate::manifest::{is_path_segment, Manifest, MANIFEST_FILE};
use crate::package::{normalize_member, open_archive};

const STAGING_PREFIX: &str = ".staging-";
const RETIRED_PREFIX: &str = ".retired-";
const WRAPPER_NAME: &str = ".wrapper";

/// Installs `package` as `<store>/<component>/<version>` and returns that path.
///
/// An existing directory for the same version is replaced atomically.
pub fn install_package(
    layout: &StoreLayout,
    package: &Path,
    component: &str,
    version: &str,
) -> Result<PathBuf> {
    for (field, value) in [("component", component), ("version", version)] {
        if !is_path_segment(value) {
            return Err(UpdateError::ManifestInvalid {
                path: package.to_path_buf(),
                reason: format!("{field} `{value}` is not a valid directory name"),
            });
        }
    }

    let component_dir = layout.component_dir(component);
    fs::create_dir_all(&component_dir)
        .context(|| format!("create {}", component_dir.display()))?;
    recover_component_dir(&component_dir)?;

    let target = component_dir.join(version);
    let staging = component_dir.join(format!("{STAGING_PREFIX}{version}-{}", process::id()));
    info!("install: {component} {version} -> {}", target.display());

    if let Err(err) = stage(package, &staging, component, version) {
        if let Err(cleanup) = remove_dir_if_present(&staging) {
            warn!("install: could not remove {}: {cleanup}", staging.display());
        }
        return Err(UpdateError::ExtractionFailed { target, reason: err.to_string() });
    }

    swap_into_place(&component_dir, &staging, &target, version)?;
    info!("install: {component} {version} installed");
    Ok(target)
}

/// Removes staging leftovers and restores a version parked mid-swap.
pub fn recover_component_dir(component_dir: &Path) -> Result<()> {
    let entries = match fs::read_dir(component_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            return Err(UpdateError::io(format!("scan {}", component_dir.display()), err))
        }
    };

    for entry in entries {
        let entry = entry.context(|| format!("scan {}", component_dir.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();

        if name.starts_with(STAGING_PREFIX) {
            warn!("install: removing interrupted staging dir {}", path.display());
            remove_dir_if_present(&path).context(|| format!("remove {}", path.display()))?;
            continue;
        }

        let Some(rest) = name.strip_prefix(RETIRED_PREFIX) else {
            continue;
        };
        let version = rest.rsplit_once('-').map_or(rest, |(version, _pid)| version);
        let original = component_dir.join(version);
        if is_path_segment(version) && !original.exists() {
            warn!("install: restoring interrupted swap {} -> {}", path.display(), original.display());
            fs::rename(&path, &original)
                .context(|| format!("restore {}", original.display()))?;
        } else {
            debug!("install: removing retired dir {}", path.display());
            remove_dir_if_present(&path).context(|| format!("remove {}", path.display()))?;
        }
    }
    Ok(())
}

fn stage(package: &Path, staging: &Path, component: &str, version: &str) -> io::Result<()> {
    remove_dir_if_present(staging)?;
    fs::create_dir_all(staging)?;

    extract(package, staging)?;
    hoist_wrapped_payload(staging)?;

    let manifest = Manifest::load_dir(staging)
        .map_err(|err| io::Error::other(err.to_string()))?
        .ok_or_else(|| io::Error::other(format!("no {MANIFEST_FILE} at package root")))?;
    if manifest.component != component || manifest.version != version {
        return Err(io::Error::other(format!(
            "extracted manifest declares {} {}, expected {component} {version}",
            manifest.component, manifest.version
        )));
    }

    sync_tree(staging)
}

fn extract(package: &Path, staging: &Path) -> io::Result<()> {
    let mut archive = open_archive(package)?;
    archive.set_overwrite(true);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let raw = entry.path()?.into_owned();
        if normalize_member(&raw).is_none() {
            warn!("install: dropping unsafe member {}", raw.display());
            continue;
        }
        if !entry.unpack_in(staging)? {
            warn!("install: dropping member outside target {}", raw.display());
        }
    }
    Ok(())
}

/// Archives that wrap the payload in one top-level folder are flattened.
fn hoist_wrapped_payload(staging: &Path) -> io::Result<()> {
    if staging.join(MANIFEST_FILE).is_file() {
        return Ok(());
    }

    let mut subdirs = Vec::new();
    for entry in fs::read_dir(staging)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            subdirs.push(entry.path());
        }
    }
    let [wrapper] = subdirs.as_slice() else {
        return Err(io::Error::other(format!(
            "no {MANIFEST_FILE} at package root and {} top-level directories",
            subdirs.len()
        )));
    };
    if !wrapper.join(MANIFEST_FILE).is_file() {
        return Err(io::Error::other(format!("no {MANIFEST_FILE} at package root")));
    }

    debug!("install: flattening wrapper directory {}", wrapper.display());
    // Move the wrapper aside first so a child sharing its name cannot collide.
    let parked = staging.join(WRAPPER_NAME);
    fs::rename(wrapper, &parked)?;
    for item in fs::read_dir(&parked)? {
        let item = item?;
        let dest = staging.join(item.file_name());
        if dest.symlink_metadata().is_ok() {
            return Err(io::Error::other(format!(
                "wrapped entry {} collides with a top-level entry",
                dest.display()
            )));
        }
        fs::rename(item.path(), dest)?;
    }
    fs::remove_dir(&parked)
}

fn swap_into_place(component_dir: &Path, staging: &Path, target: &Path, version: &str) -> Result<()> {
    let retired = component_dir.join(format!("{RETIRED_PREFIX}{version}-{}", process::id()));
    let replacing = target.symlink_metadata().is_ok();
    if replacing {
        info!("install: replacing existing {}", target.display());
        fs::rename(target, &retired).context(|| format!("retire {}", target.display()))?;
    }

    if let Err(err) = fs::rename(staging, target) {
        if replacing {
            if let Err(restore) = fs::rename(&retired, target) {
                warn!("install: could not restore {}: {restore}", target.display());
            }
        }
        if let Err(cleanup) = remove_dir_if_present(staging) {
            warn!("install: could not remove {}: {cleanup}", staging.display());
        }
        return Err(UpdateError::ExtractionFailed {
            target: target.to_path_buf(),
            reason: format!("rename into place: {err}"),
        });
    }
    sync_dir(component_dir).context(|| format!("sync {}", component_dir.display()))?;

    if replacing {
        if let Err(err) = remove_dir_if_present(&retired) {
            warn!("install: could not remove {}: {err}", retired.display());
        }
    }
    Ok(())
}

fn sync_tree(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            sync_tree(&entry.path())?;
        } else if file_type.is_file() {
            File::open(entry.path())?.sync_all()?;
        }
    }
    sync_dir(dir)
}

fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

fn remove_dir_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
