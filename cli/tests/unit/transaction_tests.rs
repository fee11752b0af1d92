//! Rollback ordering, commit and idempotency of `ProvisioningTransaction`.

#![allow(clippy::expect_used)]

use std::path::{Path, PathBuf};

use kvmkit_cli::application::services::transaction::{
    ProvisioningTransaction, TransactionState,
};
use kvmkit_cli::domain::{ResourceHandle, ResourceKind, TransactionError, UndoOutcome};
use proptest::prelude::*;

use crate::mocks::{MockToolchain, RecordingReporter};

fn images() -> PathBuf {
    PathBuf::from("/kvm/images")
}

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
        .block_on(fut)
}

#[tokio::test]
async fn rollback_undoes_entity_then_files_in_reverse() {
    let disk = Path::new("/kvm/vms/diskA.qcow2");
    let seed = Path::new("/kvm/seeds/seedB.iso");
    let tools = MockToolchain::new(&images())
        .with_file(disk)
        .with_file(seed)
        .with_instance("vm1");
    let reporter = RecordingReporter::default();

    let mut tx = ProvisioningTransaction::new();
    tx.register(ResourceHandle::file(disk));
    tx.register(ResourceHandle::file(seed));
    tx.set_managed_entity("vm1").expect("first entity");

    let report = tx.rollback(&tools, &tools, &reporter).await;

    assert_eq!(
        tools.calls(),
        [
            "stop vm1",
            "delete vm1",
            "rm /kvm/seeds/seedB.iso",
            "rm /kvm/vms/diskA.qcow2",
        ]
    );
    assert_eq!(report.records.len(), 3);
    assert!(report.records.iter().all(|r| r.outcome == UndoOutcome::Removed));
    assert!(!tools.has_instance("vm1"));
    assert!(!tools.has_file(disk));
    assert_eq!(tx.state(), TransactionState::RolledBack);
}

#[tokio::test]
async fn rollback_continues_past_failures() {
    let disk = Path::new("/kvm/vms/diskA.qcow2");
    let seed = Path::new("/kvm/seeds/seedB.iso");
    let tools = MockToolchain {
        delete_fails: true,
        undeletable: Some(seed.to_path_buf()),
        ..MockToolchain::new(&images())
    }
    .with_file(disk)
    .with_file(seed)
    .with_instance("vm1");
    let reporter = RecordingReporter::default();

    let mut tx = ProvisioningTransaction::new();
    tx.register(ResourceHandle::file(disk));
    tx.register(ResourceHandle::file(seed));
    tx.set_managed_entity("vm1").expect("entity");

    let report = tx.rollback(&tools, &tools, &reporter).await;

    let attempted: Vec<_> = report.attempted().iter().map(|h| h.locator()).collect();
    assert_eq!(attempted, ["vm1", "/kvm/seeds/seedB.iso", "/kvm/vms/diskA.qcow2"]);
    assert_eq!(report.failures(), 2);
    assert!(report.records[0].outcome.is_failure());
    assert!(report.records[1].outcome.is_failure());
    assert_eq!(report.records[2].outcome, UndoOutcome::Removed);
    assert_eq!(reporter.warnings().len(), 2);
}

#[tokio::test]
async fn entity_teardown_deletes_even_when_stop_finds_nothing() {
    let tools = MockToolchain::new(&images());
    let reporter = RecordingReporter::default();
    let mut tx = ProvisioningTransaction::new();
    tx.set_managed_entity("ghost").expect("entity");

    let report = tx.rollback(&tools, &tools, &reporter).await;

    assert_eq!(tools.calls(), ["stop ghost", "delete ghost"]);
    assert_eq!(report.records[0].outcome, UndoOutcome::AlreadyAbsent);
    assert_eq!(report.failures(), 0);
}

#[tokio::test]
async fn entity_teardown_deletes_after_stop_error() {
    let tools = MockToolchain {
        stop_fails: true,
        ..MockToolchain::new(&images())
    }
    .with_instance("vm1");
    let reporter = RecordingReporter::default();
    let mut tx = ProvisioningTransaction::new();
    tx.set_managed_entity("vm1").expect("entity");

    let report = tx.rollback(&tools, &tools, &reporter).await;

    assert_eq!(tools.calls(), ["stop vm1", "delete vm1"]);
    assert!(report.records[0].outcome.is_failure());
    assert!(!tools.has_instance("vm1"));
}

#[tokio::test]
async fn directory_handles_are_removed_recursively() {
    let staging = Path::new("/kvm/seeds/vm1");
    let tools = MockToolchain::new(&images())
        .with_dir(staging)
        .with_file(&staging.join("user-data"));
    let reporter = RecordingReporter::default();
    let mut tx = ProvisioningTransaction::new();
    tx.register(ResourceHandle::directory(staging));

    let report = tx.rollback(&tools, &tools, &reporter).await;

    assert_eq!(report.records[0].handle.kind(), ResourceKind::Directory);
    assert_eq!(report.records[0].outcome, UndoOutcome::Removed);
    assert!(!tools.has_file(&staging.join("user-data")));
}

#[test]
fn second_managed_entity_is_rejected() {
    let mut tx = ProvisioningTransaction::new();
    tx.set_managed_entity("vm1").expect("first");
    assert_eq!(
        tx.set_managed_entity("vm2"),
        Err(TransactionError::ManagedEntityAlreadySet {
            existing: "vm1".to_string(),
            requested: "vm2".to_string(),
        })
    );
    assert_eq!(tx.managed_entity(), Some("vm1"));
}

#[test]
fn register_after_commit_is_ignored() {
    let mut tx = ProvisioningTransaction::new();
    tx.register(ResourceHandle::file(Path::new("/a")));
    tx.commit();
    tx.register(ResourceHandle::file(Path::new("/b")));
    assert!(tx.registered().is_empty());
    assert_eq!(tx.state(), TransactionState::Committed);
}

// ── Properties ───────────────────────────────────────────────────────────────

fn file_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{1,8}", 0..12)
}

proptest! {
    /// Every registered handle is undone exactly once, in reverse order.
    #[test]
    fn prop_rollback_is_complete_and_reversed(names in file_names()) {
        let paths: Vec<PathBuf> = names
            .iter()
            .enumerate()
            .map(|(i, n)| PathBuf::from(format!("/kvm/vms/{i}-{n}")))
            .collect();
        let mut tools = MockToolchain::new(&images());
        for p in &paths {
            tools = tools.with_file(p);
        }
        let reporter = RecordingReporter::default();
        let mut tx = ProvisioningTransaction::new();
        for p in &paths {
            tx.register(ResourceHandle::file(p));
        }

        let report = block_on(tx.rollback(&tools, &tools, &reporter));

        let undone: Vec<PathBuf> = report.records.iter().map(|r| r.handle.path()).collect();
        let mut expected = paths.clone();
        expected.reverse();
        prop_assert_eq!(undone, expected);
        prop_assert!(tools.files.lock().expect("lock").is_empty());
    }

    /// After commit, rollback touches nothing.
    #[test]
    fn prop_commit_clears_liability(names in file_names(), entity in any::<bool>()) {
        let tools = MockToolchain::new(&images());
        let reporter = RecordingReporter::default();
        let mut tx = ProvisioningTransaction::new();
        for n in &names {
            tx.register(ResourceHandle::file(Path::new(&format!("/kvm/{n}"))));
        }
        if entity {
            tx.set_managed_entity("vm1").expect("entity");
        }
        tx.commit();

        let report = block_on(tx.rollback(&tools, &tools, &reporter));
        prop_assert!(report.is_empty());
        prop_assert!(tools.calls().is_empty());
    }

    /// Undoing resources that are already gone succeeds, and a second
    /// rollback is a no-op.
    #[test]
    fn prop_undo_is_idempotent(names in file_names()) {
        let tools = MockToolchain::new(&images());
        let reporter = RecordingReporter::default();
        let mut tx = ProvisioningTransaction::new();
        for n in &names {
            tx.register(ResourceHandle::file(Path::new(&format!("/kvm/{n}"))));
        }

        let first = block_on(tx.rollback(&tools, &tools, &reporter));
        prop_assert_eq!(first.failures(), 0);
        prop_assert!(first.records.iter().all(|r| r.outcome == UndoOutcome::AlreadyAbsent));

        let second = block_on(tx.rollback(&tools, &tools, &reporter));
        prop_assert!(second.is_empty());
    }
}
