// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! OS release descriptor (`/etc/headunit-release`).

use std::fs;
use std::io;
use std::path::Path;

use log::warn;

const OS_VERSION_KEY: &str = "OS_VERSION";
const FALLBACK_VERSION: &str = "0.0.0";

/// Extracts `OS_VERSION` from key=value text. The last assignment wins.
pub fn parse_os_version(text: &str) -> Option<String> {
    let mut found = None;
    for line in text.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        if key.trim() != OS_VERSION_KEY {
            continue;
        }
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'').trim();
        found = Some(value.to_string());
    }
    found.filter(|value| !value.is_empty())
}

/// Reads the OS version, falling back to `0.0.0` when the descriptor or key is absent.
pub fn read_os_version(path: &Path) -> io::Result<String> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            warn!("release: {} missing, assuming OS {FALLBACK_VERSION}", path.display());
            return Ok(FALLBACK_VERSION.to_string());
        }
        Err(err) => return Err(err),
    };
    Ok(parse_os_version(&text).unwrap_or_else(|| {
        warn!("release: no {OS_VERSION_KEY} in {}, assuming {FALLBACK_VERSION}", path.display());
        FALLBACK_VERSION.to_string()
    }))
}
