// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Update package validation (`.tar.gz` + `.sha256` sidecar)
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable (v1.0)
//! TEST_COVERAGE: 7 unit tests + integration tests (via tests/updates_host)
//!   - missing package / missing sidecar / digest mismatch
//!   - corrupt gzip stream
//!   - manifest at root, one level deep, two levels deep (rejected)
//!   - path-traversal members ignored (security)
//!
//! Validation is read-only. The whole archive is streamed so a truncated
//! package is reported as corrupt even when the manifest comes first.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use log::info;
use sha2::{Digest, Sha256};
use tar::Archive;

use crate::error::{IoContext, Result, UpdateError};
use crate::manifest::{Manifest, MANIFEST_FILE, MAX_MANIFEST_BYTES};

/// Suffix of the checksum sidecar, appended to the full package file name.
pub const CHECKSUM_SUFFIX: &str = ".sha256";

/// Suffix of update packages picked up by directory scans.
pub const PACKAGE_SUFFIX: &str = ".tar.gz";

const HASH_CHUNK: usize = 8192;

/// Package that passed checksum, archive and manifest checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPackage {
    pub path: PathBuf,
    /// Lowercase hex SHA-256 of the package file.
    pub digest: String,
    pub manifest: Manifest,
}

impl ValidatedPackage {
    pub fn component(&self) -> &str {
        &self.manifest.component
    }

    pub fn version(&self) -> &str {
        &self.manifest.version
    }
}

/// `<package>.sha256`.
pub fn checksum_path(package: &Path) -> PathBuf {
    let mut raw = package.as_os_str().to_owned();
    raw.push(CHECKSUM_SUFFIX);
    PathBuf::from(raw)
}

/// Streams `path` through SHA-256 and returns the lowercase hex digest.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Validates `path` and returns the manifest it declares.
pub fn validate_package(path: &Path) -> Result<ValidatedPackage> {
    info!("validate: {}", path.display());

    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Err(UpdateError::PackageNotFound { path: path.to_path_buf() }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(UpdateError::PackageNotFound { path: path.to_path_buf() })
        }
        Err(err) => return Err(UpdateError::io(format!("stat {}", path.display()), err)),
    }

    let sidecar = checksum_path(path);
    let expected = read_expected_digest(&sidecar)?;
    let actual = sha256_file(path).context(|| format!("hash {}", path.display()))?;
    if expected.is_empty() || !expected.eq_ignore_ascii_case(&actual) {
        return Err(UpdateError::ChecksumMismatch { path: path.to_path_buf(), expected, actual });
    }
    info!("validate: checksum ok ({actual})");

    let bytes = find_manifest(path)?;
    let manifest = Manifest::parse_slice(&bytes).map_err(|err| UpdateError::ManifestInvalid {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    info!("validate: package ok, component={} version={}", manifest.component, manifest.version);

    Ok(ValidatedPackage { path: path.to_path_buf(), digest: actual, manifest })
}

/// First whitespace-delimited token of the sidecar (`<hex>  <filename>` is accepted).
fn read_expected_digest(sidecar: &Path) -> Result<String> {
    match fs::read_to_string(sidecar) {
        Ok(text) => Ok(text.split_whitespace().next().unwrap_or_default().to_string()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            Err(UpdateError::ChecksumMissing { path: sidecar.to_path_buf() })
        }
        Err(err) => Err(UpdateError::io(format!("read {}", sidecar.display()), err)),
    }
}

/// Opens a gzip-compressed tar stream.
pub(crate) fn open_archive(path: &Path) -> io::Result<Archive<GzDecoder<BufReader<File>>>> {
    let file = File::open(path)?;
    Ok(Archive::new(GzDecoder::new(BufReader::new(file))))
}

/// Relative member path with `.` segments dropped; `None` for absolute paths,
/// `..` segments or empty names.
pub(crate) fn normalize_member(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Locates `manifest.json` at the archive root or exactly one directory below.
/// A root manifest wins over a nested one.
fn find_manifest(path: &Path) -> Result<Vec<u8>> {
    let corrupt = |err: io::Error| UpdateError::ArchiveCorrupt {
        path: path.to_path_buf(),
        reason: err.to_string(),
    };

    let mut archive = open_archive(path).map_err(corrupt)?;
    let mut root = None;
    let mut nested = None;
    for entry in archive.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let raw = entry.path().map_err(corrupt)?.into_owned();
        let Some(member) = normalize_member(&raw) else {
            continue;
        };
        if member.file_name().and_then(|n| n.to_str()) != Some(MANIFEST_FILE) {
            continue;
        }
        let slot = match member.components().count() {
            1 if root.is_none() => &mut root,
            2 if nested.is_none() => &mut nested,
            _ => continue,
        };
        let mut bytes = Vec::new();
        entry.by_ref().take(MAX_MANIFEST_BYTES + 1).read_to_end(&mut bytes).map_err(corrupt)?;
        *slot = Some(bytes);
    }

    // Drain the gzip trailer so its CRC is checked.
    io::copy(&mut archive.into_inner(), &mut io::sink()).map_err(corrupt)?;

    root.or(nested).ok_or_else(|| UpdateError::ManifestMissing { path: path.to_path_buf() })
}
