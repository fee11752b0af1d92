//! Handles for externally created resources and rollback outcomes.
//!
//! Pure data: no I/O. The transaction that owns these lives in
//! `crate::application::services::transaction`.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// What kind of artifact a handle points at. Decides how it is undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A regular file, removed with unlink.
    File,
    /// A directory, removed recursively.
    Directory,
    /// An externally named long-lived object (a VM), removed with stop + delete.
    ManagedEntity,
}

/// One externally created artifact. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceHandle {
    kind: ResourceKind,
    locator: String,
}

impl ResourceHandle {
    #[must_use]
    pub fn file(path: &Path) -> Self {
        Self {
            kind: ResourceKind::File,
            locator: path.to_string_lossy().into_owned(),
        }
    }

    #[must_use]
    pub fn directory(path: &Path) -> Self {
        Self {
            kind: ResourceKind::Directory,
            locator: path.to_string_lossy().into_owned(),
        }
    }

    #[must_use]
    pub fn managed_entity(name: &str) -> Self {
        Self {
            kind: ResourceKind::ManagedEntity,
            locator: name.to_string(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Path or name used to address the resource.
    #[must_use]
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// The locator as a filesystem path (meaningful for files and directories).
    #[must_use]
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.locator)
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            ResourceKind::File => "file",
            ResourceKind::Directory => "directory",
            ResourceKind::ManagedEntity => "instance",
        };
        write!(f, "{label} {}", self.locator)
    }
}

/// Result of undoing a single handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum UndoOutcome {
    /// The resource existed and was removed.
    Removed,
    /// Nothing to do: the resource was already gone.
    AlreadyAbsent,
    /// The undo step failed; the message was logged and rollback went on.
    Failed(String),
}

impl UndoOutcome {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, UndoOutcome::Failed(_))
    }
}

/// One attempted undo, in the order it ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UndoRecord {
    pub handle: ResourceHandle,
    pub outcome: UndoOutcome,
}

/// Everything a rollback attempted. Never an error: failures are data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    pub records: Vec<UndoRecord>,
}

impl RollbackReport {
    /// Handles in the order their undo was attempted.
    #[must_use]
    pub fn attempted(&self) -> Vec<&ResourceHandle> {
        self.records.iter().map(|r| &r.handle).collect()
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.records.iter().filter(|r| r.outcome.is_failure()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
