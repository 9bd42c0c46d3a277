// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Active pointers: `<runtime>/active_<component>` symlinks.
//!
//! A pointer is replaced by creating the new link under a temporary name and
//! renaming it over the old one, so readers always see a valid target.

use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::process;

use log::info;

use crate::error::{IoContext, Result, UpdateError};

pub(crate) fn pointer_path(runtime_root: &Path, component: &str) -> PathBuf {
    runtime_root.join(format!("active_{component}"))
}

/// Points `active_<component>` at `target`.
pub fn publish_pointer(runtime_root: &Path, component: &str, target: &Path) -> Result<()> {
    fs::create_dir_all(runtime_root).context(|| format!("create {}", runtime_root.display()))?;

    let link = pointer_path(runtime_root, component);
    let temp = runtime_root.join(format!(".active_{component}.tmp-{}", process::id()));
    remove_link_if_present(&temp).context(|| format!("remove {}", temp.display()))?;

    symlink(target, &temp).context(|| format!("link {} -> {}", temp.display(), target.display()))?;
    if let Err(err) = fs::rename(&temp, &link) {
        let _ = fs::remove_file(&temp);
        return Err(UpdateError::io(format!("publish {}", link.display()), err));
    }
    info!("LINK: active_{component} -> {}", target.display());
    Ok(())
}

/// Current target of `active_<component>`, `None` if the pointer does not exist.
pub fn read_pointer(runtime_root: &Path, component: &str) -> io::Result<Option<PathBuf>> {
    match fs::read_link(pointer_path(runtime_root, component)) {
        Ok(target) => Ok(Some(target)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

fn remove_link_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
