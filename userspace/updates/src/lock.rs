// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Single-writer install lock with stale-holder reclaim
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable (v1.0)
//! TEST_COVERAGE: 11 unit tests
//!
//! The lock file is created with exclusive-create semantics and records
//! `pid=<pid>` and `acquired=<unix seconds>`. Acquisition never waits: a live
//! holder yields `LockHeld` immediately. A holder whose process is gone, whose
//! record is unreadable, or whose age exceeds the configured maximum is stale
//! and is reclaimed with an audit entry in the log.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, warn};

use crate::error::{Result, UpdateError};

const UNREADABLE_GRACE: Duration = Duration::from_secs(10);

/// Staleness policy for an existing lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockPolicy {
    /// Locks older than this are stale even if the holder still runs.
    pub max_age: Option<Duration>,
}

/// Answers whether a process id refers to a running process.
pub trait ProcessProbe {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Probe backed by `/proc/<pid>`.
pub struct ProcFs;

impl ProcessProbe for ProcFs {
    fn is_alive(&self, pid: u32) -> bool {
        pid != 0 && Path::new("/proc").join(pid.to_string()).exists()
    }
}

/// Contents of a lock file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRecord {
    pub pid: u32,
    pub acquired_unix_secs: Option<u64>,
    /// Distinguishes two acquisitions by the same process.
    pub token: Option<u64>,
}

impl LockRecord {
    fn current() -> Self {
        Self { pid: process::id(), acquired_unix_secs: Some(unix_now()), token: Some(next_token()) }
    }

    fn render(&self) -> String {
        let mut out = format!("pid={}\n", self.pid);
        if let Some(secs) = self.acquired_unix_secs {
            out.push_str(&format!("acquired={secs}\n"));
        }
        if let Some(token) = self.token {
            out.push_str(&format!("token={token}\n"));
        }
        out
    }

    /// Parses `pid=..`/`acquired=..` lines, or a bare pid.
    pub fn parse(text: &str) -> Option<Self> {
        let mut pid = None;
        let mut acquired = None;
        let mut token = None;
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match line.split_once('=') {
                Some(("pid", value)) => pid = value.trim().parse().ok(),
                Some(("acquired", value)) => acquired = value.trim().parse().ok(),
                Some(("token", value)) => token = value.trim().parse().ok(),
                Some(_) => {}
                None if pid.is_none() => pid = line.parse().ok(),
                None => {}
            }
        }
        pid.map(|pid| Self { pid, acquired_unix_secs: acquired, token })
    }
}

/// Held install lock. Released on drop.
///
/// Release only removes the file while it still carries this holder's record,
/// so a holder whose lock was reclaimed cannot delete its successor's lock.
#[derive(Debug)]
pub struct InstallLock {
    path: PathBuf,
    record: LockRecord,
    released: bool,
}

impl InstallLock {
    /// Acquires the lock or fails fast with [`UpdateError::LockHeld`].
    pub fn acquire(path: &Path, policy: &LockPolicy, probe: &dyn ProcessProbe) -> Result<Self> {
        match try_create(path) {
            Ok(lock) => return Ok(lock),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
            Err(err) => return Err(lock_io(path, err)),
        }

        let existing = read_record(path);
        match stale_reason(path, existing, policy, probe) {
            Some(reason) => {
                warn!(
                    "lock: reclaiming stale lock {} (holder {}, {reason})",
                    path.display(),
                    describe(existing)
                );
                let current = read_record(path);
                if current != existing {
                    return Err(UpdateError::LockHeld {
                        path: path.to_path_buf(),
                        holder: current.map(|record| record.pid),
                    });
                }
                remove_if_present(path).map_err(|err| lock_io(path, err))?;
                try_create(path).map_err(|err| match err.kind() {
                    io::ErrorKind::AlreadyExists => {
                        UpdateError::LockHeld { path: path.to_path_buf(), holder: None }
                    }
                    _ => lock_io(path, err),
                })
            }
            None => Err(UpdateError::LockHeld {
                path: path.to_path_buf(),
                holder: existing.map(|record| record.pid),
            }),
        }
    }

    /// Takes the lock regardless of the current holder (operator override).
    pub fn force_acquire(path: &Path) -> Result<Self> {
        if path.exists() {
            warn!(
                "lock: forced reclaim of {} from holder {}",
                path.display(),
                describe(read_record(path))
            );
            remove_if_present(path).map_err(|err| lock_io(path, err))?;
        }
        try_create(path).map_err(|err| lock_io(path, err))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases the lock, reporting removal failures.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.release_owned()
    }

    fn release_owned(&self) -> Result<()> {
        match fs::read_to_string(&self.path) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(lock_io(&self.path, err)),
            Ok(text) if LockRecord::parse(&text) != Some(self.record) => {
                warn!(
                    "lock: {} was reclaimed by {}, leaving it in place",
                    self.path.display(),
                    describe(LockRecord::parse(&text))
                );
                return Ok(());
            }
            Ok(_) => {}
        }
        release_lock(&self.path)
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.release_owned() {
            warn!("lock: failed to release {}: {err}", self.path.display());
        }
    }
}

/// Removes the lock file. Absent lock is success.
pub fn release_lock(path: &Path) -> Result<()> {
    remove_if_present(path).map_err(|err| lock_io(path, err))?;
    debug!("lock: released {}", path.display());
    Ok(())
}

fn try_create(path: &Path) -> io::Result<InstallLock> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file: File = OpenOptions::new().write(true).create_new(true).open(path)?;
    let record = LockRecord::current();
    if let Err(err) = file.write_all(record.render().as_bytes()) {
        if let Err(cleanup) = remove_if_present(path) {
            warn!("lock: could not remove partial lock {}: {cleanup}", path.display());
        }
        return Err(err);
    }
    let lock = InstallLock { path: path.to_path_buf(), record, released: false };
    file.sync_all()?;
    debug!("lock: acquired {}", path.display());
    Ok(lock)
}

fn read_record(path: &Path) -> Option<LockRecord> {
    fs::read_to_string(path).ok().and_then(|text| LockRecord::parse(&text))
}

fn stale_reason(
    path: &Path,
    record: Option<LockRecord>,
    policy: &LockPolicy,
    probe: &dyn ProcessProbe,
) -> Option<String> {
    let Some(record) = record else {
        // A concurrent acquirer may not have written its record yet.
        let age = fs::metadata(path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|mtime| SystemTime::now().duration_since(mtime).ok());
        return match age {
            Some(age) if age > UNREADABLE_GRACE => Some("unreadable lock record".to_string()),
            _ => None,
        };
    };
    if !probe.is_alive(record.pid) {
        return Some(format!("pid {} is not running", record.pid));
    }
    if let (Some(max_age), Some(acquired)) = (policy.max_age, record.acquired_unix_secs) {
        let age = unix_now().saturating_sub(acquired);
        if age > max_age.as_secs() {
            return Some(format!("held for {age}s, max {}s", max_age.as_secs()));
        }
    }
    None
}

fn describe(record: Option<LockRecord>) -> String {
    match record {
        Some(LockRecord { pid, acquired_unix_secs: Some(secs), .. }) => format!("pid {pid} since {secs}"),
        Some(LockRecord { pid, acquired_unix_secs: None, .. }) => format!("pid {pid}"),
        None => "unknown".to_string(),
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn lock_io(path: &Path, source: io::Error) -> UpdateError {
    UpdateError::io(format!("lock {}", path.display()), source)
}

fn next_token() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0);
    nanos.wrapping_add(COUNTER.fetch_add(1, Ordering::Relaxed))
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
