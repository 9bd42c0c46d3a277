// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy shared by the update agent and the boot linker.
//!
//! Every variant is fatal to the current invocation; retry policy belongs to the
//! caller (scheduler tick, next boot).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for update operations.
pub type Result<T> = core::result::Result<T, UpdateError>;

/// Errors emitted by update installation and version resolution.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Another install holds the lock.
    #[error("update already in progress: lock {path} held by {}", describe_holder(.holder))]
    LockHeld {
        /// Lock file path.
        path: PathBuf,
        /// Pid recorded by the current holder, if readable.
        holder: Option<u32>,
    },
    /// Package file does not exist.
    #[error("package not found: {path}")]
    PackageNotFound {
        /// Requested package path.
        path: PathBuf,
    },
    /// Scan directory does not exist.
    #[error("scan directory not found: {path}")]
    ScanDirNotFound {
        /// Requested scan directory.
        path: PathBuf,
    },
    /// Sidecar `.sha256` file is absent.
    #[error("checksum file missing: {path}")]
    ChecksumMissing {
        /// Expected sidecar path.
        path: PathBuf,
    },
    /// Package digest differs from the sidecar.
    #[error("checksum mismatch for {path}: expected {expected}, actual {actual}")]
    ChecksumMismatch {
        /// Package path.
        path: PathBuf,
        /// Digest read from the sidecar.
        expected: String,
        /// Digest computed from the package.
        actual: String,
    },
    /// gzip or tar stream could not be read.
    #[error("corrupt archive {path}: {reason}")]
    ArchiveCorrupt {
        /// Package path.
        path: PathBuf,
        /// Decoder diagnostic.
        reason: String,
    },
    /// No manifest at the archive root or one level below.
    #[error("manifest.json not found in {path}")]
    ManifestMissing {
        /// Package or directory path.
        path: PathBuf,
    },
    /// Manifest is not valid JSON or lacks required fields.
    #[error("invalid manifest in {path}: {reason}")]
    ManifestInvalid {
        /// Package or directory path.
        path: PathBuf,
        /// Validation diagnostic.
        reason: String,
    },
    /// No candidate of `component` satisfies its upstream dependency.
    #[error("no compatible {component} for {dependency} {available} ({candidates} candidates inspected)")]
    NoCompatibleComponent {
        /// Layer being resolved.
        component: String,
        /// Upstream component key.
        dependency: String,
        /// Upstream version the constraint was evaluated against.
        available: String,
        /// Number of candidates found before filtering.
        candidates: usize,
    },
    /// Extraction into the store failed; the previous version is untouched.
    #[error("extraction into {target} failed: {reason}")]
    ExtractionFailed {
        /// Final version directory.
        target: PathBuf,
        /// Failure diagnostic.
        reason: String,
    },
    /// Configuration file unreadable or malformed.
    #[error("config error in {path}: {reason}")]
    Config {
        /// Configuration file path.
        path: PathBuf,
        /// Parse diagnostic.
        reason: String,
    },
    /// I/O failure outside the categories above.
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted.
        context: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

impl UpdateError {
    /// Wraps an I/O error with a short description of the failed step.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io { context: context.into(), source }
    }
}

fn describe_holder(holder: &Option<u32>) -> String {
    match holder {
        Some(pid) => format!("pid {pid}"),
        None => "unknown holder".to_string(),
    }
}

/// Adds context to `io::Result` values.
pub(crate) trait IoContext<T> {
    fn context(self, context: impl FnOnce() -> String) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn context(self, context: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|source| UpdateError::io(context(), source))
    }
}
