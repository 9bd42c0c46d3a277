// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Component manifest (`manifest.json`) model and parser.
//!
//! The parser focuses on validation and reporting rather than I/O so it can be
//! exercised directly from tests. Required fields are `component` and `version`;
//! `dependencies` maps upstream component names to `>=X.Y.Z` constraints.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::version::{Constraint, ConstraintError, Version};

/// File name of the manifest at the root of every installed version directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Upper bound on manifest size, inside archives and on disk.
pub const MAX_MANIFEST_BYTES: u64 = 256 * 1024;

/// Errors emitted while parsing manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Document is not valid JSON or has the wrong shape.
    #[error("manifest parse error: {0}")]
    Json(String),
    /// A required field was not provided or was empty.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    /// A field contained a malformed value.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// Human-readable reason for the failure.
        reason: String,
    },
    /// Manifest exceeds [`MAX_MANIFEST_BYTES`].
    #[error("manifest too large: {0} bytes")]
    TooLarge(u64),
    /// Manifest file could not be read.
    #[error("manifest read error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Deserialize)]
struct RawManifest {
    component: Option<String>,
    version: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
}

/// Parsed manifest of one installed component version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    /// Component layer name (`services`, `app`, ...).
    pub component: String,
    /// Declared version string, as written by the packager.
    pub version: String,
    /// Upstream component name to constraint string.
    pub dependencies: BTreeMap<String, String>,
}

impl Manifest {
    /// Parses a manifest from raw JSON bytes.
    pub fn parse_slice(bytes: &[u8]) -> Result<Self, ManifestError> {
        if bytes.len() as u64 > MAX_MANIFEST_BYTES {
            return Err(ManifestError::TooLarge(bytes.len() as u64));
        }
        let raw: RawManifest =
            serde_json::from_slice(bytes).map_err(|err| ManifestError::Json(err.to_string()))?;

        let component = require_segment(raw.component, "component")?;
        let version = require_segment(raw.version, "version")?;
        Ok(Self { component, version, dependencies: raw.dependencies })
    }

    /// Loads `dir/manifest.json`. Returns `Ok(None)` when the file is absent.
    pub fn load_dir(dir: &Path) -> Result<Option<Self>, ManifestError> {
        let path = dir.join(MANIFEST_FILE);
        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if meta.len() > MAX_MANIFEST_BYTES {
            return Err(ManifestError::TooLarge(meta.len()));
        }
        let bytes = fs::read(&path)?;
        Self::parse_slice(&bytes).map(Some)
    }

    /// Declared version, parsed leniently.
    pub fn parsed_version(&self) -> Version {
        Version::parse(&self.version)
    }

    /// Constraint this component declares on `upstream`, if any.
    pub fn constraint_on(&self, upstream: &str) -> Option<Result<Constraint, ConstraintError>> {
        self.dependencies.get(upstream).map(|raw| Constraint::parse(raw))
    }
}

fn require_segment(value: Option<String>, field: &'static str) -> Result<String, ManifestError> {
    let value = value.ok_or(ManifestError::MissingField(field))?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ManifestError::MissingField(field));
    }
    if !is_path_segment(trimmed) {
        return Err(ManifestError::InvalidField {
            field,
            reason: format!("`{trimmed}` is not a valid directory name"),
        });
    }
    Ok(trimmed.to_string())
}

/// True when `name` can be used verbatim as one directory level in the store.
pub(crate) fn is_path_segment(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
}
