// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Optional on-device configuration (`/etc/headunit/updates.toml`).
//!
//! ```toml
//! [paths]
//! store = "/data/components"
//! incoming = "/data/incoming_updates"
//!
//! [lock]
//! max_age_secs = 3600
//! ```
//!
//! Every key is optional; omitted keys keep the device-image defaults.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, UpdateError};
use crate::layout::StoreLayout;
use crate::lock::LockPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/headunit/updates.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    paths: RawPaths,
    #[serde(default)]
    lock: RawLock,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPaths {
    baseline: Option<PathBuf>,
    store: Option<PathBuf>,
    runtime: Option<PathBuf>,
    incoming: Option<PathBuf>,
    lock: Option<PathBuf>,
    release: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLock {
    max_age_secs: Option<u64>,
}

/// Resolved configuration: store roots plus lock policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub layout: StoreLayout,
    pub lock: LockPolicy,
}

impl Config {
    /// Loads `explicit` if given (must exist), else the default path if present,
    /// else built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match Self::from_file(Path::new(DEFAULT_CONFIG_PATH)) {
                Err(UpdateError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                    Ok(Self::default())
                }
                other => other,
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|source| UpdateError::io(format!("read config {}", path.display()), source))?;
        Self::parse_str(&raw)
            .map_err(|reason| UpdateError::Config { path: path.to_path_buf(), reason })
    }

    /// Parses TOML text on top of the built-in defaults.
    pub fn parse_str(input: &str) -> core::result::Result<Self, String> {
        let raw: RawConfig = toml::from_str(input).map_err(|err| err.to_string())?;
        let mut layout = StoreLayout::default();
        let paths = raw.paths;
        override_path(&mut layout.baseline_root, paths.baseline);
        override_path(&mut layout.store_root, paths.store);
        override_path(&mut layout.runtime_root, paths.runtime);
        override_path(&mut layout.incoming_dir, paths.incoming);
        override_path(&mut layout.lock_path, paths.lock);
        override_path(&mut layout.release_file, paths.release);

        let lock = LockPolicy { max_age: raw.lock.max_age_secs.map(Duration::from_secs) };
        Ok(Self { layout, lock })
    }
}

fn override_path(slot: &mut PathBuf, value: Option<PathBuf>) {
    if let Some(value) = value {
        *slot = value;
    }
}
