//! Provisioning transaction: tracks what one `create` run made and undoes it.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! The transaction is single-use: once committed or rolled back it ignores
//! further registrations.

use tracing::{debug, info, warn};

use crate::application::ports::{InstanceManager, LocalFs, ProgressReporter, TeardownStatus};
use crate::domain::{
    ResourceHandle, ResourceKind, RollbackReport, TransactionError, UndoOutcome, UndoRecord,
};

/// Lifecycle of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    #[default]
    Open,
    Committed,
    RolledBack,
}

/// Ordered registry of resources created during one provisioning attempt.
#[derive(Debug, Default)]
pub struct ProvisioningTransaction {
    registry: Vec<ResourceHandle>,
    managed_entity: Option<String>,
    state: TransactionState,
}

impl ProvisioningTransaction {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Handles in registration order.
    #[must_use]
    pub fn registered(&self) -> &[ResourceHandle] {
        &self.registry
    }

    #[must_use]
    pub fn managed_entity(&self) -> Option<&str> {
        self.managed_entity.as_deref()
    }

    /// Record a resource that was just created. Call it right after the
    /// creating step succeeds, one handle at a time.
    pub fn register(&mut self, handle: ResourceHandle) {
        if self.state != TransactionState::Open {
            warn!(resource = %handle, state = ?self.state, "register on closed transaction ignored");
            return;
        }
        debug!(resource = %handle, position = self.registry.len(), "resource registered");
        self.registry.push(handle);
    }

    /// Record the one long-lived entity this transaction owns.
    ///
    /// # Errors
    ///
    /// Returns `ManagedEntityAlreadySet` if an entity is already tracked.
    pub fn set_managed_entity(&mut self, name: &str) -> Result<(), TransactionError> {
        if let Some(existing) = &self.managed_entity {
            return Err(TransactionError::ManagedEntityAlreadySet {
                existing: existing.clone(),
                requested: name.to_string(),
            });
        }
        if self.state != TransactionState::Open {
            warn!(instance = name, state = ?self.state, "managed entity on closed transaction ignored");
            return Ok(());
        }
        debug!(instance = name, "managed entity recorded");
        self.managed_entity = Some(name.to_string());
        Ok(())
    }

    /// Adopt everything created so far. Nothing is deleted.
    pub fn commit(&mut self) {
        if self.state != TransactionState::Open {
            return;
        }
        info!(
            resources = self.registry.len(),
            instance = self.managed_entity.as_deref().unwrap_or("-"),
            "transaction committed"
        );
        self.registry.clear();
        self.managed_entity = None;
        self.state = TransactionState::Committed;
    }

    /// Undo everything this transaction owns.
    ///
    /// The managed entity goes first (stop, then delete), followed by every
    /// registered handle in reverse registration order. Each undo is
    /// attempted exactly once; failures are logged, reported and recorded,
    /// never returned. A closed transaction returns an empty report.
    pub async fn rollback(
        &mut self,
        fs: &impl LocalFs,
        instances: &impl InstanceManager,
        reporter: &impl ProgressReporter,
    ) -> RollbackReport {
        let mut report = RollbackReport::default();
        if self.state != TransactionState::Open {
            return report;
        }
        self.state = TransactionState::RolledBack;

        if let Some(name) = self.managed_entity.take() {
            let outcome = undo_managed_entity(instances, &name).await;
            record(
                &mut report,
                reporter,
                ResourceHandle::managed_entity(&name),
                outcome,
            );
        }

        for handle in std::mem::take(&mut self.registry).into_iter().rev() {
            let outcome = match handle.kind() {
                ResourceKind::File => undo_file(fs, &handle),
                ResourceKind::Directory => undo_directory(fs, &handle),
                ResourceKind::ManagedEntity => {
                    undo_managed_entity(instances, handle.locator()).await
                }
            };
            record(&mut report, reporter, handle, outcome);
        }

        info!(
            attempted = report.records.len(),
            failed = report.failures(),
            "rollback finished"
        );
        report
    }
}

fn record(
    report: &mut RollbackReport,
    reporter: &impl ProgressReporter,
    handle: ResourceHandle,
    outcome: UndoOutcome,
) {
    match &outcome {
        UndoOutcome::Removed => {
            info!(resource = %handle, "rolled back");
            reporter.step(&format!("removed {handle}"));
        }
        UndoOutcome::AlreadyAbsent => {
            debug!(resource = %handle, "already absent");
        }
        UndoOutcome::Failed(reason) => {
            warn!(resource = %handle, error = %reason, "undo failed");
            reporter.warn(&format!("could not remove {handle}: {reason}"));
        }
    }
    report.records.push(UndoRecord { handle, outcome });
}

fn undo_file(fs: &impl LocalFs, handle: &ResourceHandle) -> UndoOutcome {
    let path = handle.path();
    if !fs.exists(&path) {
        return UndoOutcome::AlreadyAbsent;
    }
    match fs.remove_file(&path) {
        Ok(()) => UndoOutcome::Removed,
        Err(e) => UndoOutcome::Failed(format!("{e:#}")),
    }
}

fn undo_directory(fs: &impl LocalFs, handle: &ResourceHandle) -> UndoOutcome {
    let path = handle.path();
    if !fs.exists(&path) {
        return UndoOutcome::AlreadyAbsent;
    }
    match fs.remove_dir_all(&path) {
        Ok(()) => UndoOutcome::Removed,
        Err(e) => UndoOutcome::Failed(format!("{e:#}")),
    }
}

/// Stop, then delete. Delete runs whatever stop reported.
async fn undo_managed_entity(instances: &impl InstanceManager, name: &str) -> UndoOutcome {
    let stop = instances.stop(name).await;
    let delete = instances.delete(name).await;

    let mut errors = Vec::new();
    let mut changed = false;
    for (step, result) in [("stop", stop), ("delete", delete)] {
        match result {
            Ok(TeardownStatus::Done) => changed = true,
            Ok(TeardownStatus::AlreadyGone) => {}
            Err(e) => errors.push(format!("{step}: {e:#}")),
        }
    }

    if !errors.is_empty() {
        UndoOutcome::Failed(errors.join("; "))
    } else if changed {
        UndoOutcome::Removed
    } else {
        UndoOutcome::AlreadyAbsent
    }
}
