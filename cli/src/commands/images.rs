//! `kvmkit images`: list the image catalog.

use std::process::ExitCode;

use anyhow::Result;

use crate::app::AppContext;
use crate::application::services::images::list_images;
use crate::infra::image::HttpImageStore;

/// Run the images command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn run(app: &AppContext) -> Result<ExitCode> {
    let store = HttpImageStore::new(app.layout.images_dir(), false);
    let images = list_images(&store);
    if app.is_json() {
        crate::output::json::print(&images)?;
    } else {
        app.human().render_images(&images);
    }
    Ok(ExitCode::SUCCESS)
}
