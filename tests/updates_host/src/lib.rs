#![forbid(unsafe_code)]
// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Host fixtures for update agent and boot linker tests
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable (test-only)
//!
//! Builds real `.tar.gz` packages with `.sha256` sidecars and lays out a
//! throwaway device tree (factory baseline, store, runtime, incoming drop).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tar::{Builder as TarBuilder, EntryType, Header};
use tempfile::TempDir;

use updates::{StoreLayout, MANIFEST_FILE};

/// One archive member.
#[derive(Debug, Clone)]
pub enum Member {
    File(String, Vec<u8>),
    Dir(String),
    /// Written with a hand-built header so unsafe names reach the archive.
    Raw(String, Vec<u8>),
}

impl Member {
    pub fn file(path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        Self::File(path.to_string(), bytes.into())
    }

    pub fn dir(path: &str) -> Self {
        Self::Dir(path.to_string())
    }

    pub fn raw(path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        Self::Raw(path.to_string(), bytes.into())
    }
}

/// `manifest.json` body.
pub fn manifest_json(component: &str, version: &str, deps: &[(&str, &str)]) -> Vec<u8> {
    let deps: serde_json::Map<String, serde_json::Value> =
        deps.iter().map(|(k, v)| (k.to_string(), serde_json::Value::from(*v))).collect();
    let doc = serde_json::json!({
        "component": component,
        "version": version,
        "dependencies": deps,
    });
    serde_json::to_vec_pretty(&doc).expect("manifest encode")
}

/// Flat payload: manifest plus one file at the archive root.
pub fn flat_members(component: &str, version: &str) -> Vec<Member> {
    vec![
        Member::file(MANIFEST_FILE, manifest_json(component, version, &[])),
        Member::dir("bin/"),
        Member::file("bin/run.sh", format!("#!/bin/sh\necho {component} {version}\n")),
    ]
}

/// Same payload wrapped in a single top-level folder.
pub fn wrapped_members(wrapper: &str, component: &str, version: &str) -> Vec<Member> {
    vec![
        Member::dir(&format!("{wrapper}/")),
        Member::file(&format!("{wrapper}/{MANIFEST_FILE}"), manifest_json(component, version, &[])),
        Member::dir(&format!("{wrapper}/bin/")),
        Member::file(&format!("{wrapper}/bin/run.sh"), "#!/bin/sh\n"),
    ]
}

/// Gzip-compressed tar stream of `members`.
pub fn build_tar_gz(members: &[Member]) -> Vec<u8> {
    let mut tar = TarBuilder::new(Vec::new());
    for member in members {
        match member {
            Member::File(path, bytes) => append_file(&mut tar, path, bytes),
            Member::Dir(path) => append_dir(&mut tar, path),
            Member::Raw(path, bytes) => append_file_raw(&mut tar, path, bytes),
        }
    }
    let tar_bytes = tar.into_inner().expect("tar bytes");
    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    gz.write_all(&tar_bytes).expect("gzip write");
    gz.finish().expect("gzip finish")
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Writes `<dir>/<name>` and a matching `<name>.sha256` sidecar in `sha256sum` format.
pub fn write_package(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    fs::create_dir_all(dir).expect("package dir");
    let path = dir.join(name);
    fs::write(&path, bytes).expect("write package");
    fs::write(sidecar(&path), format!("{}  {name}\n", sha256_hex(bytes))).expect("write sidecar");
    path
}

pub fn sidecar(package: &Path) -> PathBuf {
    let mut raw = package.as_os_str().to_owned();
    raw.push(".sha256");
    PathBuf::from(raw)
}

/// Throwaway device tree rooted in a temp directory.
pub struct Sandbox {
    root: TempDir,
    pub layout: StoreLayout,
}

impl Sandbox {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let layout = StoreLayout::rooted(root.path());
        fs::create_dir_all(&layout.incoming_dir).expect("incoming dir");
        Self { root, layout }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn write_release(&self, os_version: &str) {
        let path = &self.layout.release_file;
        fs::create_dir_all(path.parent().expect("release parent")).expect("release dir");
        fs::write(path, format!("NAME=\"HeadUnit OS\"\nOS_VERSION=\"{os_version}\"\n"))
            .expect("write release");
    }

    pub fn write_baseline(&self, component: &str, version: &str, deps: &[(&str, &str)]) -> PathBuf {
        let dir = self.layout.baseline_dir(component);
        write_manifest_dir(&dir, component, version, deps);
        dir
    }

    pub fn write_store(&self, component: &str, version: &str, deps: &[(&str, &str)]) -> PathBuf {
        let dir = self.layout.version_dir(component, version);
        write_manifest_dir(&dir, component, version, deps);
        dir
    }

    /// Drops a package into the incoming directory.
    pub fn drop_incoming(&self, name: &str, members: &[Member]) -> PathBuf {
        write_package(&self.layout.incoming_dir, name, &build_tar_gz(members))
    }

    /// TOML config pointing every path at this sandbox.
    pub fn write_config(&self) -> PathBuf {
        let layout = &self.layout;
        let text = format!(
            "[paths]\nbaseline = {:?}\nstore = {:?}\nruntime = {:?}\nincoming = {:?}\nlock = {:?}\nrelease = {:?}\n",
            layout.baseline_root,
            layout.store_root,
            layout.runtime_root,
            layout.incoming_dir,
            layout.lock_path,
            layout.release_file,
        );
        let path = self.root().join("updates.toml");
        fs::write(&path, text).expect("write config");
        path
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

pub fn write_manifest_dir(dir: &Path, component: &str, version: &str, deps: &[(&str, &str)]) {
    fs::create_dir_all(dir).expect("manifest dir");
    fs::write(dir.join(MANIFEST_FILE), manifest_json(component, version, deps)).expect("manifest");
}

fn append_file(builder: &mut TarBuilder<Vec<u8>>, path: &str, bytes: &[u8]) {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_cksum();
    builder.append_data(&mut header, path, bytes).expect("append file");
}

fn append_dir(builder: &mut TarBuilder<Vec<u8>>, path: &str) {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Directory);
    header.set_size(0);
    header.set_mode(0o755);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_cksum();
    builder.append_data(&mut header, path, std::io::empty()).expect("append dir");
}

/// Ustar header written by hand; `tar::Builder` refuses `..` and absolute names.
fn append_file_raw(builder: &mut TarBuilder<Vec<u8>>, path: &str, bytes: &[u8]) {
    let mut header = [0u8; 512];
    let name = path.as_bytes();
    let len = name.len().min(100);
    header[..len].copy_from_slice(&name[..len]);
    header[100..108].copy_from_slice(b"0000644\0");
    header[108..116].copy_from_slice(b"0000000\0");
    header[116..124].copy_from_slice(b"0000000\0");
    header[124..136].copy_from_slice(format!("{:011o}\0", bytes.len()).as_bytes());
    header[136..148].copy_from_slice(b"00000000000\0");
    header[148..156].copy_from_slice(b"        ");
    header[156] = b'0';
    let cksum: u32 = header.iter().map(|b| u32::from(*b)).sum();
    header[148..156].copy_from_slice(format!("{cksum:06o}\0 ").as_bytes());

    let inner = builder.get_mut();
    inner.write_all(&header).expect("write header");
    inner.write_all(bytes).expect("write data");
    let padding = (512 - (bytes.len() % 512)) % 512;
    inner.write_all(&vec![0u8; padding]).expect("write padding");
}
