//! Application service: create the kvmkit directory tree.

use std::path::PathBuf;

use anyhow::Result;

use crate::application::ports::{LocalFs, ProgressReporter};
use crate::domain::KvmLayout;

/// Create every layout directory. Returns the ones that were missing.
///
/// # Errors
///
/// Returns an error if a directory cannot be created.
pub fn prepare_layout(
    fs: &impl LocalFs,
    reporter: &impl ProgressReporter,
    layout: &KvmLayout,
) -> Result<Vec<PathBuf>> {
    let mut created = Vec::new();
    for dir in layout.directories() {
        if fs.is_dir(&dir) {
            continue;
        }
        fs.create_dir_all(&dir)?;
        reporter.step(&format!("created {}", dir.display()));
        created.push(dir);
    }
    reporter.success(&format!("kvmkit directory ready: {}", layout.base_dir().display()));
    Ok(created)
}
