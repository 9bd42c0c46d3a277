// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Update domain library (package install + boot-time version resolution)
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable (v1.0)
//! TEST_COVERAGE: Unit tests per module + integration tests (via tests/updates_host)
//!   - lenient version parsing and `>=` constraints
//!   - package checksum/archive/manifest validation
//!   - staged install with atomic swap and crash recovery
//!   - reclaimable install lock
//!   - two-stage services/app resolution and atomic pointer publish
//!
//! PUBLIC API:
//!   - UpdateAgent: lock + validate + install + cleanup + sync + reboot
//!   - BootLinker: resolve services/app and publish `active_<component>` pointers
//!   - StoreLayout / Config: explicit artifact-store roots
//!   - validate_package / install_package / InstallLock: building blocks
//!
//! DEPENDENCIES:
//!   - flate2 + tar: `.tar.gz` package streaming
//!   - sha2 + hex: sidecar checksum verification
//!   - serde + serde_json: manifest.json
//!   - toml: optional on-device configuration
//!   - log: diagnostics for remote triage

#![forbid(unsafe_code)]
#![deny(clippy::all)]

pub mod activate;
pub mod agent;
pub mod config;
pub mod error;
pub mod install;
pub mod layout;
pub mod lock;
pub mod manifest;
pub mod package;
pub mod release;
pub mod resolver;
pub mod version;

pub use activate::{publish_pointer, read_pointer};
pub use agent::{AgentOptions, AgentOutcome, HostSystem, PackageSource, SystemControl, UpdateAgent};
pub use config::Config;
pub use error::{Result, UpdateError};
pub use install::install_package;
pub use layout::StoreLayout;
pub use lock::{release_lock, InstallLock, LockPolicy, ProcFs, ProcessProbe};
pub use manifest::{Manifest, MANIFEST_FILE};
pub use package::{validate_package, ValidatedPackage};
pub use release::read_os_version;
pub use resolver::{BootLinker, Candidate, Origin, Resolution};
pub use version::{Constraint, ConstraintError, Version};
