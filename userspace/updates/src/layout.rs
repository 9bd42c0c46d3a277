// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Artifact store layout.
//!
//! ```text
//! <baseline>/<component>/manifest.json           read-only factory version
//! <store>/<component>/<version>/manifest.json    installed updates
//! <runtime>/active_<component>                   symlink to the version in service
//! ```

use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_BASELINE_ROOT: &str = "/opt/headunit/factory";
pub const DEFAULT_STORE_ROOT: &str = "/data/components";
pub const DEFAULT_RUNTIME_ROOT: &str = "/run/headunit";
pub const DEFAULT_INCOMING_DIR: &str = "/data/incoming_updates";
pub const DEFAULT_LOCK_PATH: &str = "/run/headunit/update.lock";
pub const DEFAULT_RELEASE_FILE: &str = "/etc/headunit-release";

/// Roots of the artifact store, constructed once per process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    pub baseline_root: PathBuf,
    pub store_root: PathBuf,
    pub runtime_root: PathBuf,
    pub incoming_dir: PathBuf,
    pub lock_path: PathBuf,
    pub release_file: PathBuf,
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self {
            baseline_root: PathBuf::from(DEFAULT_BASELINE_ROOT),
            store_root: PathBuf::from(DEFAULT_STORE_ROOT),
            runtime_root: PathBuf::from(DEFAULT_RUNTIME_ROOT),
            incoming_dir: PathBuf::from(DEFAULT_INCOMING_DIR),
            lock_path: PathBuf::from(DEFAULT_LOCK_PATH),
            release_file: PathBuf::from(DEFAULT_RELEASE_FILE),
        }
    }
}

impl StoreLayout {
    /// Same relative structure as the device image, placed under `prefix`.
    pub fn rooted(prefix: &Path) -> Self {
        let under = |abs: &str| prefix.join(abs.trim_start_matches('/'));
        Self {
            baseline_root: under(DEFAULT_BASELINE_ROOT),
            store_root: under(DEFAULT_STORE_ROOT),
            runtime_root: under(DEFAULT_RUNTIME_ROOT),
            incoming_dir: under(DEFAULT_INCOMING_DIR),
            lock_path: under(DEFAULT_LOCK_PATH),
            release_file: under(DEFAULT_RELEASE_FILE),
        }
    }

    pub fn baseline_dir(&self, component: &str) -> PathBuf {
        self.baseline_root.join(component)
    }

    pub fn component_dir(&self, component: &str) -> PathBuf {
        self.store_root.join(component)
    }

    pub fn version_dir(&self, component: &str, version: &str) -> PathBuf {
        self.component_dir(component).join(version)
    }

    pub fn active_pointer(&self, component: &str) -> PathBuf {
        crate::activate::pointer_path(&self.runtime_root, component)
    }

    /// True when `package` sits directly in the incoming drop directory.
    ///
    /// Packages from anywhere else (removable media, manual paths) are never
    /// deleted after install.
    pub fn is_incoming(&self, package: &Path) -> bool {
        let Some(parent) = package.parent() else {
            return false;
        };
        let parent = if parent.as_os_str().is_empty() { Path::new(".") } else { parent };
        match (fs::canonicalize(parent), fs::canonicalize(&self.incoming_dir)) {
            (Ok(parent), Ok(incoming)) => parent == incoming,
            _ => false,
        }
    }
}
