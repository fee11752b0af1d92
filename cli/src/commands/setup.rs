//! `kvmkit setup`: create the directory structure.

use std::process::ExitCode;

use anyhow::Result;

use crate::app::AppContext;
use crate::application::services::setup::prepare_layout;
use crate::infra::fs::HostFs;
use crate::output::TerminalReporter;

/// Run the setup command.
///
/// # Errors
///
/// Returns an error if a directory cannot be created.
pub fn run(app: &AppContext) -> Result<ExitCode> {
    let reporter = TerminalReporter::new(&app.output);
    let created = prepare_layout(&HostFs, &reporter, &app.layout)?;
    if app.is_json() {
        crate::output::json::print(&serde_json::json!({
            "base_dir": app.layout.base_dir(),
            "created": created,
        }))?;
    }
    Ok(ExitCode::SUCCESS)
}
