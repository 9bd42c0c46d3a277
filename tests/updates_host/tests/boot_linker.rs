// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Integration tests for boot-time services/app resolution
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: 8 tests
//!
//! TEST_SCENARIOS:
//!   - test_constraint_beats_highest_version(): OS 1.5.0 picks services 1.0.0 over 1.2.0
//!   - test_app_resolves_against_selected_services(): two-stage chain
//!   - test_baseline_only_device(): factory image activates baseline
//!   - test_app_failure_leaves_pointers_untouched(): cross-layer abort
//!   - test_services_failure_leaves_pointers_untouched(): first-layer abort
//!   - test_unrecognized_constraint_still_boots(): non-`>=` constraints count as compatible
//!   - test_pointer_replacement_is_atomic(): repeated boots only swap targets
//!   - test_installed_package_becomes_active(): agent install then boot

use std::fs;

use updates::lock::ProcFs;
use updates::resolver::{APP, SERVICES};
use updates::{
    read_pointer, AgentOptions, BootLinker, LockPolicy, Origin, PackageSource, SystemControl,
    UpdateAgent, UpdateError,
};
use updates_host::{flat_members, Sandbox};

#[test]
fn test_constraint_beats_highest_version() {
    let sandbox = Sandbox::new();
    sandbox.write_release("1.5.0");
    let v100 = sandbox.write_store(SERVICES, "1.0.0", &[("os", ">=1.0.0")]);
    sandbox.write_store(SERVICES, "1.2.0", &[("os", ">=2.0.0")]);
    sandbox.write_baseline(APP, "1.0.0", &[]);

    let resolution = BootLinker::new(&sandbox.layout).activate().unwrap();

    assert_eq!(resolution.os_version, "1.5.0");
    assert_eq!(resolution.services.manifest.version, "1.0.0");
    assert_eq!(read_pointer(&sandbox.layout.runtime_root, SERVICES).unwrap(), Some(v100));
}

#[test]
fn test_app_resolves_against_selected_services() {
    let sandbox = Sandbox::new();
    sandbox.write_release("2.0.0");
    sandbox.write_baseline(SERVICES, "1.0.0", &[]);
    sandbox.write_store(SERVICES, "1.3.0", &[("os", ">=2.0.0")]);
    sandbox.write_baseline(APP, "1.0.0", &[]);
    let app_12 = sandbox.write_store(APP, "1.2.0", &[("services", ">=1.3.0")]);
    sandbox.write_store(APP, "1.4.0", &[("services", ">=1.4.0")]);

    let resolution = BootLinker::new(&sandbox.layout).activate().unwrap();

    assert_eq!(resolution.services.manifest.version, "1.3.0");
    assert_eq!(resolution.app.manifest.version, "1.2.0");
    assert_eq!(read_pointer(&sandbox.layout.runtime_root, APP).unwrap(), Some(app_12));
}

#[test]
fn test_baseline_only_device() {
    let sandbox = Sandbox::new();
    sandbox.write_release("1.0.0");
    let services = sandbox.write_baseline(SERVICES, "1.0.0", &[("os", ">=1.0.0")]);
    let app = sandbox.write_baseline(APP, "1.0.0", &[("services", ">=1.0.0")]);
    // A store copy of the same version does not displace the factory image.
    sandbox.write_store(APP, "1.0", &[]);

    let resolution = BootLinker::new(&sandbox.layout).activate().unwrap();

    assert_eq!(resolution.services.origin, Origin::Baseline);
    assert_eq!(resolution.app.origin, Origin::Baseline);
    assert_eq!(read_pointer(&sandbox.layout.runtime_root, SERVICES).unwrap(), Some(services));
    assert_eq!(read_pointer(&sandbox.layout.runtime_root, APP).unwrap(), Some(app));
}

#[test]
fn test_app_failure_leaves_pointers_untouched() {
    let sandbox = Sandbox::new();
    sandbox.write_release("1.0.0");
    sandbox.write_baseline(SERVICES, "1.0.0", &[]);
    let old_app = sandbox.write_baseline(APP, "1.0.0", &[]);
    BootLinker::new(&sandbox.layout).activate().unwrap();
    let old_services = read_pointer(&sandbox.layout.runtime_root, SERVICES).unwrap();

    // Newer services whose only compatible app is missing.
    sandbox.write_store(SERVICES, "2.0.0", &[]);
    fs::write(
        old_app.join("manifest.json"),
        updates_host::manifest_json(APP, "1.0.0", &[("services", ">=3.0.0")]),
    )
    .unwrap();

    let err = BootLinker::new(&sandbox.layout).activate().unwrap_err();

    match err {
        UpdateError::NoCompatibleComponent { component, dependency, available, .. } => {
            assert_eq!(component, APP);
            assert_eq!(dependency, SERVICES);
            assert_eq!(available, "2.0.0");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(read_pointer(&sandbox.layout.runtime_root, SERVICES).unwrap(), old_services);
    assert_eq!(read_pointer(&sandbox.layout.runtime_root, APP).unwrap(), Some(old_app));
}

#[test]
fn test_services_failure_leaves_pointers_untouched() {
    let sandbox = Sandbox::new();
    sandbox.write_release("1.0.0");
    sandbox.write_store(SERVICES, "2.0.0", &[("os", ">=2.0.0")]);
    sandbox.write_baseline(APP, "1.0.0", &[]);

    let err = BootLinker::new(&sandbox.layout).activate().unwrap_err();

    assert!(matches!(err, UpdateError::NoCompatibleComponent { candidates: 1, .. }));
    assert_eq!(read_pointer(&sandbox.layout.runtime_root, SERVICES).unwrap(), None);
    assert_eq!(read_pointer(&sandbox.layout.runtime_root, APP).unwrap(), None);
}

#[test]
fn test_unrecognized_constraint_still_boots() {
    let sandbox = Sandbox::new();
    sandbox.write_release("1.0.0");
    let services = sandbox.write_baseline(SERVICES, "1.0.0", &[("os", "1.0.0")]);
    let app = sandbox.write_baseline(APP, "1.0.0", &[("services", "^1.0")]);

    let resolution = BootLinker::new(&sandbox.layout).activate().unwrap();

    assert_eq!(resolution.services.path, services);
    assert_eq!(read_pointer(&sandbox.layout.runtime_root, SERVICES).unwrap(), Some(services));
    assert_eq!(read_pointer(&sandbox.layout.runtime_root, APP).unwrap(), Some(app));
}

#[test]
fn test_pointer_replacement_is_atomic() {
    let sandbox = Sandbox::new();
    sandbox.write_release("1.0.0");
    sandbox.write_baseline(SERVICES, "1.0.0", &[]);
    sandbox.write_baseline(APP, "1.0.0", &[]);
    BootLinker::new(&sandbox.layout).activate().unwrap();

    let newer = sandbox.write_store(APP, "1.1.0", &[]);
    BootLinker::new(&sandbox.layout).activate().unwrap();

    assert_eq!(read_pointer(&sandbox.layout.runtime_root, APP).unwrap(), Some(newer));
    let mut entries: Vec<_> = fs::read_dir(&sandbox.layout.runtime_root)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    entries.sort();
    assert_eq!(entries, vec!["active_app".to_string(), "active_services".to_string()]);
}

struct Quiet;

impl SystemControl for Quiet {
    fn sync(&self) -> std::io::Result<()> {
        Ok(())
    }

    fn reboot(&self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_installed_package_becomes_active() {
    let sandbox = Sandbox::new();
    sandbox.write_release("1.0.0");
    sandbox.write_baseline(SERVICES, "1.0.0", &[]);
    sandbox.write_baseline(APP, "1.0.0", &[]);
    sandbox.drop_incoming("app-v2.0.0.tar.gz", &flat_members(APP, "2.0.0"));

    let agent = UpdateAgent::with_host(
        sandbox.layout.clone(),
        LockPolicy::default(),
        Box::new(ProcFs),
        Box::new(Quiet),
    );
    agent
        .run(&PackageSource::Scan(sandbox.layout.incoming_dir.clone()), &AgentOptions::default())
        .unwrap();
    let resolution = BootLinker::new(&sandbox.layout).activate().unwrap();

    assert_eq!(resolution.app.manifest.version, "2.0.0");
    assert_eq!(resolution.app.origin, Origin::Store);
    assert_eq!(
        read_pointer(&sandbox.layout.runtime_root, APP).unwrap(),
        Some(sandbox.layout.version_dir(APP, "2.0.0"))
    );
}
