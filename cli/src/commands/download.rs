//! `kvmkit download`: fetch one base image.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use kvmkit_common::Distro;

use crate::app::AppContext;
use crate::application::services::images::download_image;
use crate::domain::ProvisionError;
use crate::infra::image::HttpImageStore;
use crate::output::TerminalReporter;

/// Arguments for the download command.
#[derive(Args)]
pub struct DownloadArgs {
    /// Image to download
    #[arg(value_enum)]
    pub image: Distro,
}

/// Run the download command.
///
/// # Errors
///
/// Returns an error if the download fails or is interrupted.
pub async fn run(app: &AppContext, args: &DownloadArgs) -> Result<ExitCode> {
    let store = HttpImageStore::new(app.layout.images_dir(), app.show_progress());
    let reporter = TerminalReporter::new(&app.output);
    // An abandoned download never reaches the image path; only the final
    // rename writes it.
    let outcome = tokio::select! {
        res = download_image(&store, &reporter, args.image) => res?,
        () = app.abort.requested() => return Err(ProvisionError::SignalInterrupted.into()),
    };
    if app.is_json() {
        crate::output::json::print(&outcome)?;
    } else {
        app.human().render_download(&outcome);
    }
    Ok(ExitCode::SUCCESS)
}
