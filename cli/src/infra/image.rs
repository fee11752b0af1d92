//! Image infrastructure: base cloud image cache under `<base>/images`.

#![allow(clippy::expect_used)] // Progress bar template is a compile-time constant

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use kvmkit_common::Distro;
use tracing::info;

use crate::application::ports::ImageStore;

/// Downloads catalog images over HTTP into a local directory.
///
/// A download streams into a temporary file next to the target and is
/// renamed into place only once complete.
#[derive(Debug, Clone)]
pub struct HttpImageStore {
    images_dir: PathBuf,
    show_progress: bool,
}

impl HttpImageStore {
    #[must_use]
    pub fn new(images_dir: PathBuf, show_progress: bool) -> Self {
        Self {
            images_dir,
            show_progress,
        }
    }
}

impl ImageStore for HttpImageStore {
    fn image_path(&self, distro: Distro) -> PathBuf {
        self.images_dir.join(distro.file_name())
    }

    fn is_cached(&self, distro: Distro) -> bool {
        self.image_path(distro).is_file()
    }

    async fn fetch(&self, distro: Distro) -> Result<PathBuf> {
        let target = self.image_path(distro);
        if target.is_file() {
            return Ok(target);
        }
        let dir = self.images_dir.clone();
        let show_progress = self.show_progress;
        let dest = target.clone();
        tokio::task::spawn_blocking(move || download(distro, &dir, &dest, show_progress))
            .await
            .context("spawn_blocking for image download")??;
        info!(image = %distro, path = %target.display(), "image downloaded");
        Ok(target)
    }
}

fn download(distro: Distro, dir: &Path, dest: &Path, show_progress: bool) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating directory {}", dir.display()))?;

    let url = distro.url();
    let response = match ureq::get(url)
        .set("User-Agent", concat!("kvmkit/", env!("CARGO_PKG_VERSION")))
        .call()
    {
        Ok(resp) => resp,
        Err(ureq::Error::Status(code, _)) => {
            anyhow::bail!("cannot download {distro}: HTTP {code} from {url}")
        }
        Err(e) => anyhow::bail!("cannot download {distro}: {e}"),
    };
    let total = response
        .header("Content-Length")
        .and_then(|v| v.parse::<u64>().ok());

    let pb = if show_progress {
        progress_bar(total, distro)
    } else {
        ProgressBar::hidden()
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temporary file in {}", dir.display()))?;
    let mut reader = pb.wrap_read(response.into_reader());
    io::copy(&mut reader, tmp.as_file_mut())
        .with_context(|| format!("downloading {url}"))?;
    tmp.as_file().sync_all().context("flushing downloaded image")?;
    tmp.persist(dest)
        .with_context(|| format!("saving {}", dest.display()))?;
    pb.finish_and_clear();
    Ok(())
}

fn progress_bar(total: Option<u64>, distro: Distro) -> ProgressBar {
    let pb = total.map_or_else(ProgressBar::new_spinner, ProgressBar::new);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {msg}\n    {bar:40.cyan/dim} {percent}%  {bytes}/{total_bytes}")
            .expect("valid template")
            .progress_chars("━━─"),
    );
    pb.set_message(format!("downloading {distro}"));
    pb
}
