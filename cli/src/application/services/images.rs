//! Application service: base image catalog and cache.

use std::path::PathBuf;

use anyhow::Result;
use kvmkit_common::Distro;
use serde::Serialize;

use crate::application::ports::{ImageStore, ProgressReporter};

/// One catalog entry with its local cache status.
#[derive(Debug, Clone, Serialize)]
pub struct ImageEntry {
    pub name: &'static str,
    pub url: &'static str,
    pub os_variant: &'static str,
    pub path: PathBuf,
    pub downloaded: bool,
}

/// Every catalog image, in catalog order.
pub fn list_images(store: &impl ImageStore) -> Vec<ImageEntry> {
    Distro::ALL
        .iter()
        .map(|&distro| ImageEntry {
            name: distro.name(),
            url: distro.url(),
            os_variant: distro.os_variant(),
            path: store.image_path(distro),
            downloaded: store.is_cached(distro),
        })
        .collect()
}

/// Result of `download_image`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub already_present: bool,
}

/// Download `distro` unless it is already cached.
///
/// # Errors
///
/// Returns an error if the download fails. A failed download leaves no
/// partial file behind.
pub async fn download_image(
    store: &impl ImageStore,
    reporter: &impl ProgressReporter,
    distro: Distro,
) -> Result<DownloadOutcome> {
    if store.is_cached(distro) {
        let path = store.image_path(distro);
        reporter.success(&format!("{distro} already downloaded: {}", path.display()));
        return Ok(DownloadOutcome {
            path,
            already_present: true,
        });
    }
    reporter.step(&format!("downloading {distro}..."));
    let path = store.fetch(distro).await?;
    reporter.success(&format!("{distro} saved to {}", path.display()));
    Ok(DownloadOutcome {
        path,
        already_present: false,
    })
}
