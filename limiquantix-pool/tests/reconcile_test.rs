//! Reconciliation tests against the mock `virsh`.
//!
//! These tests exercise full transitions (define/build/start/autostart and
//! stop/undefine) and check the exact sequence of CLI verbs issued.

use std::path::Path;

use limiquantix_pool::{
    reconcile_all, Ensure, MockVirsh, PoolAction, PoolError, PoolOutcome, PoolSpec, PoolStatus,
    PoolType, Reconciler, Virsh,
};

fn images_spec() -> PoolSpec {
    PoolSpec::new("images", PoolType::Dir)
        .with_target("/var/lib/libvirt/images")
        .with_active(true)
        .with_autostart(true)
}

/// Create on an absent pool issues define, build, start, autostart-enable.
#[test]
fn test_create_sequence() {
    let mock = MockVirsh::new();
    let virsh = Virsh::new(&mock);
    let mut reconciler = Reconciler::new(&virsh);

    let report = reconciler.create(&images_spec()).unwrap();

    assert_eq!(
        mock.mutating_verbs(),
        ["pool-define", "pool-build", "pool-start", "pool-autostart"]
    );
    assert_eq!(
        report.actions,
        [
            PoolAction::Define,
            PoolAction::Build,
            PoolAction::Start,
            PoolAction::AutostartEnable
        ]
    );
    assert!(report.soft_failures.is_empty());

    let observed = report.observed.unwrap();
    assert!(observed.active());
    assert!(observed.autostart());

    let pool = mock.pool("images").unwrap();
    assert!(pool.active && pool.autostart && pool.built);
    assert_eq!(pool.descriptor.pool_type, PoolType::Dir);
    assert_eq!(pool.descriptor.target.unwrap().path, "/var/lib/libvirt/images");
}

/// A failing build is recorded but start and autostart still happen.
#[test]
fn test_build_failure_is_tolerated() {
    let mock = MockVirsh::new();
    mock.fail_verb("pool-build", "error: Storage pool already built: File exists");
    let virsh = Virsh::new(&mock);
    let mut reconciler = Reconciler::new(&virsh);

    let report = reconciler.create(&images_spec()).unwrap();

    assert_eq!(
        mock.mutating_verbs(),
        ["pool-define", "pool-build", "pool-start", "pool-autostart"]
    );
    assert_eq!(report.soft_failures.len(), 1);
    assert_eq!(report.soft_failures[0].action, PoolAction::Build);
    assert!(report.soft_failures[0].message.contains("already built"));
    assert!(mock.pool("images").unwrap().active);
}

/// A rejected define aborts the create and removes the descriptor file.
#[test]
fn test_define_failure_is_fatal() {
    let mock = MockVirsh::new();
    mock.fail_verb("pool-define", "error: XML error: unknown storage pool type");
    let virsh = Virsh::new(&mock);
    let mut reconciler = Reconciler::new(&virsh);

    let err = reconciler.create(&images_spec()).unwrap_err();

    match err {
        PoolError::DefineFailed { name, reason } => {
            assert_eq!(name, "images");
            assert!(reason.contains("unknown storage pool type"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(mock.mutating_verbs(), ["pool-define"]);
    assert_eq!(reconciler.status("images").unwrap(), PoolStatus::Absent);

    let define_call = mock
        .calls()
        .into_iter()
        .find(|args| args.first().map(String::as_str) == Some("pool-define"))
        .unwrap();
    assert!(!Path::new(&define_call[1]).exists());
}

/// A descriptor file that cannot be created fails the define before any
/// mutating call, and the pool stays absent.
#[test]
fn test_descriptor_file_creation_failure_is_define_failure() {
    let mock = MockVirsh::new();
    let virsh = Virsh::new(&mock);
    let scratch = tempfile::tempdir().unwrap();
    let mut reconciler =
        Reconciler::new(&virsh).with_descriptor_dir(scratch.path().join("missing"));

    let err = reconciler.create(&images_spec()).unwrap_err();

    match err {
        PoolError::DefineFailed { name, reason } => {
            assert_eq!(name, "images");
            assert!(reason.contains("descriptor file"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(mock.mutating_verbs().is_empty());
    assert!(mock.defined_paths().is_empty());
    assert_eq!(reconciler.status("images").unwrap(), PoolStatus::Absent);
}

/// Descriptors are written under the configured directory.
#[test]
fn test_descriptor_dir_is_used() {
    let mock = MockVirsh::new();
    let virsh = Virsh::new(&mock);
    let scratch = tempfile::tempdir().unwrap();

    Reconciler::new(&virsh)
        .with_descriptor_dir(scratch.path())
        .create(&images_spec())
        .unwrap();

    let paths = mock.defined_paths();
    assert_eq!(paths.len(), 1);
    assert!(Path::new(&paths[0]).starts_with(scratch.path()));
    assert!(!Path::new(&paths[0]).exists());
}

/// A name with a path separator is rejected before virsh is called.
#[test]
fn test_slash_in_name_rejected_before_any_call() {
    let mock = MockVirsh::new();
    let virsh = Virsh::new(&mock);

    let err = Reconciler::new(&virsh)
        .create(&PoolSpec::new("a/b", PoolType::Dir))
        .unwrap_err();

    assert!(matches!(err, PoolError::InvalidSpec(_)));
    assert!(mock.calls().is_empty());
}

/// The descriptor file is gone after a successful define as well.
#[test]
fn test_descriptor_file_removed_after_define() {
    let mock = MockVirsh::new();
    let virsh = Virsh::new(&mock);
    Reconciler::new(&virsh).create(&images_spec()).unwrap();

    let paths = mock.defined_paths();
    assert_eq!(paths.len(), 1);
    assert!(paths[0].contains("pool.images."));
    assert!(!Path::new(&paths[0]).exists());
}

/// Stop failure does not prevent undefine.
#[test]
fn test_destroy_tolerates_stop_failure() {
    let mock = MockVirsh::new().with_pool("images", PoolType::Dir, false, true);
    let virsh = Virsh::new(&mock);
    let mut reconciler = Reconciler::new(&virsh);

    let report = reconciler.destroy("images").unwrap();

    assert_eq!(mock.mutating_verbs(), ["pool-destroy", "pool-undefine"]);
    assert_eq!(report.soft_failures.len(), 1);
    assert_eq!(report.soft_failures[0].action, PoolAction::Stop);
    assert!(report.observed.is_none());
    assert!(mock.pool("images").is_none());
    assert_eq!(reconciler.status("images").unwrap(), PoolStatus::Absent);
}

/// Undefine failure surfaces to the caller.
#[test]
fn test_destroy_undefine_failure_is_fatal() {
    let mock = MockVirsh::new().with_pool("images", PoolType::Dir, true, false);
    mock.fail_verb("pool-undefine", "error: Failed to undefine pool images");
    let virsh = Virsh::new(&mock);

    let err = Reconciler::new(&virsh).destroy("images").unwrap_err();
    assert_eq!(err.exit_code(), Some(1));
    assert!(mock.pool("images").is_some());
}

/// A second create against a converged pool issues no start or autostart.
#[test]
fn test_create_is_idempotent() {
    let mock = MockVirsh::new();
    let virsh = Virsh::new(&mock);
    let mut reconciler = Reconciler::new(&virsh);

    reconciler.create(&images_spec()).unwrap();
    mock.reset_calls();

    let report = reconciler.create(&images_spec()).unwrap();

    assert_eq!(mock.mutating_verbs(), ["pool-define", "pool-build"]);
    assert_eq!(report.actions, [PoolAction::Define, PoolAction::Build]);
}

/// A fresh pass against a converged pool changes nothing at all.
#[test]
fn test_reconcile_converged_pool_is_noop() {
    let mock = MockVirsh::new().with_pool("images", PoolType::Dir, true, true);
    let virsh = Virsh::new(&mock);

    let pass = reconcile_all(&virsh, &[images_spec()]).unwrap();

    assert!(mock.mutating_verbs().is_empty());
    assert_eq!(pass.changed(), 0);
    assert_eq!(pass.failures(), 0);
}

/// Existing pools get only the flag changes they need.
#[test]
fn test_reconcile_updates_flags() {
    let mock = MockVirsh::new().with_pool("images", PoolType::Dir, true, false);
    let virsh = Virsh::new(&mock);
    let mut reconciler = Reconciler::new(&virsh);

    let spec = images_spec().with_active(false).with_autostart(true);
    let report = reconciler.reconcile(&spec).unwrap();

    assert_eq!(mock.mutating_verbs(), ["pool-destroy", "pool-autostart"]);
    assert_eq!(report.actions, [PoolAction::Stop, PoolAction::AutostartEnable]);
    let pool = mock.pool("images").unwrap();
    assert!(!pool.active);
    assert!(pool.autostart);
}

/// Requesting an inactive pool that is already inactive issues no stop.
#[test]
fn test_set_active_false_on_inactive_pool_is_noop() {
    let mock = MockVirsh::new().with_pool("images", PoolType::Dir, false, false);
    let virsh = Virsh::new(&mock);
    let mut reconciler = Reconciler::new(&virsh);

    let report = reconciler.set_active("images", false).unwrap();

    assert!(!report.changed());
    assert!(mock.mutating_verbs().is_empty());
}

/// Stop inside set_active is not tolerated.
#[test]
fn test_set_active_failure_propagates() {
    let mock = MockVirsh::new().with_pool("images", PoolType::Dir, true, false);
    mock.fail_verb("pool-destroy", "error: device busy");
    let virsh = Virsh::new(&mock);
    let mut reconciler = Reconciler::new(&virsh);

    assert!(reconciler.set_active("images", false).is_err());
    assert!(reconciler.observe("images").unwrap().unwrap().active());
}

#[test]
fn test_set_autostart_disable() {
    let mock = MockVirsh::new().with_pool("images", PoolType::Dir, true, true);
    let virsh = Virsh::new(&mock);
    let mut reconciler = Reconciler::new(&virsh);

    let report = reconciler.set_autostart("images", false).unwrap();

    assert_eq!(report.actions, [PoolAction::AutostartDisable]);
    assert!(!report.observed.unwrap().autostart());
    assert_eq!(
        mock.calls().last().unwrap(),
        &["pool-autostart", "--pool", "images", "--disable"]
    );
}

/// ensure=absent removes present pools and leaves absent ones alone.
#[test]
fn test_reconcile_absent() {
    let mock = MockVirsh::new().with_pool("old", PoolType::Dir, true, false);
    let virsh = Virsh::new(&mock);

    let specs = [
        PoolSpec::absent("old", PoolType::Dir),
        PoolSpec::absent("never-existed", PoolType::Dir),
    ];
    assert_eq!(specs[0].ensure, Ensure::Absent);

    let pass = reconcile_all(&virsh, &specs).unwrap();

    assert_eq!(mock.mutating_verbs(), ["pool-destroy", "pool-undefine"]);
    assert_eq!(pass.failures(), 0);
    assert_eq!(pass.changed(), 1);
}

/// The batch lists once and the status query matches names exactly.
#[test]
fn test_pass_lists_once_with_prefix_names() {
    let mock = MockVirsh::new().with_pool("pool10", PoolType::Dir, true, true);
    let virsh = Virsh::new(&mock);

    let specs = [
        PoolSpec::new("pool1", PoolType::Dir),
        PoolSpec::new("pool10", PoolType::Dir).with_autostart(true),
    ];
    let pass = reconcile_all(&virsh, &specs).unwrap();

    assert_eq!(mock.list_calls(), 1);
    assert_eq!(mock.mutating_verbs(), ["pool-define", "pool-build", "pool-start"]);
    assert!(mock.pool("pool1").unwrap().active);
    assert_eq!(pass.pools.len(), 2);
}

/// Without prefetch every new name costs one listing.
#[test]
fn test_fallback_status_query() {
    let mock = MockVirsh::new()
        .with_pool("pool1", PoolType::Dir, true, false)
        .with_pool("pool10", PoolType::Dir, false, false);
    let virsh = Virsh::new(&mock);
    let mut reconciler = Reconciler::new(&virsh);

    assert_eq!(reconciler.status("pool1").unwrap(), PoolStatus::Present);
    assert_eq!(reconciler.status("pool").unwrap(), PoolStatus::Absent);
    assert_eq!(reconciler.status("pool1").unwrap(), PoolStatus::Present);
    assert_eq!(mock.list_calls(), 2);
}

/// One failing pool does not stop the pass.
#[test]
fn test_pass_continues_after_failure() {
    let mock = MockVirsh::new().with_pool("busy", PoolType::Dir, false, false);
    mock.fail_verb("pool-start", "error: cannot open directory");
    let virsh = Virsh::new(&mock);

    let specs = [
        PoolSpec::new("busy", PoolType::Dir),
        PoolSpec::new("bad name", PoolType::Dir),
        PoolSpec::new("idle", PoolType::Dir).with_active(false),
    ];
    let pass = reconcile_all(&virsh, &specs).unwrap();

    assert_eq!(pass.failures(), 2);
    assert!(matches!(&pass.pools[0], PoolOutcome::Failed { name, .. } if name == "busy"));
    assert!(matches!(
        &pass.pools[1],
        PoolOutcome::Failed { error: PoolError::InvalidSpec(_), .. }
    ));
    assert!(matches!(&pass.pools[2], PoolOutcome::Converged(r) if r.name == "idle"));
    assert!(mock.pool("idle").is_some());
    assert!(!mock.pool("idle").unwrap().active);
    assert!(pass.finished_at >= pass.started_at);
}

/// A listing failure aborts the whole pass.
#[test]
fn test_pass_fails_when_listing_fails() {
    let mock = MockVirsh::new();
    mock.fail_verb("pool-list", "error: failed to connect to the hypervisor");
    let virsh = Virsh::new(&mock);

    let err = reconcile_all(&virsh, &[images_spec()]).unwrap_err();
    assert!(matches!(err, PoolError::ExternalCommand { .. }));
}

/// Logical pools carry their devices through define.
#[test]
fn test_logical_pool_devices_reach_define() {
    let mock = MockVirsh::new();
    let virsh = Virsh::new(&mock).with_connect_uri("qemu:///system");

    let spec = PoolSpec::new("vg0", PoolType::Logical)
        .with_source_device("/dev/sda1")
        .with_source_device("/dev/sdb1")
        .with_source_name("vg0")
        .with_source_format("lvm2")
        .with_active(false);
    Reconciler::new(&virsh).create(&spec).unwrap();

    let source = mock.pool("vg0").unwrap().descriptor.source.unwrap();
    let devices: Vec<&str> = source.devices.iter().map(|d| d.path.as_str()).collect();
    assert_eq!(devices, ["/dev/sda1", "/dev/sdb1"]);
    assert_eq!(source.format.unwrap().format_type, "lvm2");
    assert!(mock.calls().iter().all(|args| args[..2] == ["-c", "qemu:///system"]));
}
