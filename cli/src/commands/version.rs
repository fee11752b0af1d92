//! Version command

use std::process::ExitCode;

use anyhow::Result;

/// Run the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn run(json: bool) -> Result<ExitCode> {
    let version = env!("CARGO_PKG_VERSION");

    if json {
        crate::output::json::print(&serde_json::json!({ "version": version }))?;
    } else {
        println!("kvmkit {version}");
    }
    Ok(ExitCode::SUCCESS)
}
