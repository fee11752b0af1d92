//! On-disk layout under the kvmkit base directory.
//!
//! ```text
//! <base>/images/<distro>.img
//! <base>/vms/<vm>.qcow2
//! <base>/seeds/<vm>/            staging directory for seed documents
//! <base>/seeds/<vm>-seed.iso
//! <base>/keys/<vm>_id_ed25519[.pub]
//! <base>/templates/
//! ```

use std::path::{Path, PathBuf};

use kvmkit_common::Distro;

/// Path arithmetic for one base directory. Does not touch the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvmLayout {
    base: PathBuf,
}

impl KvmLayout {
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.base.join("images")
    }

    #[must_use]
    pub fn vms_dir(&self) -> PathBuf {
        self.base.join("vms")
    }

    #[must_use]
    pub fn seeds_dir(&self) -> PathBuf {
        self.base.join("seeds")
    }

    #[must_use]
    pub fn keys_dir(&self) -> PathBuf {
        self.base.join("keys")
    }

    #[must_use]
    pub fn templates_dir(&self) -> PathBuf {
        self.base.join("templates")
    }

    /// Every directory `kvmkit setup` creates.
    #[must_use]
    pub fn directories(&self) -> [PathBuf; 5] {
        [
            self.images_dir(),
            self.vms_dir(),
            self.templates_dir(),
            self.seeds_dir(),
            self.keys_dir(),
        ]
    }

    #[must_use]
    pub fn image_path(&self, distro: Distro) -> PathBuf {
        self.images_dir().join(distro.file_name())
    }

    #[must_use]
    pub fn disk_path(&self, vm: &str) -> PathBuf {
        self.vms_dir().join(format!("{vm}.qcow2"))
    }

    #[must_use]
    pub fn seed_staging_dir(&self, vm: &str) -> PathBuf {
        self.seeds_dir().join(vm)
    }

    #[must_use]
    pub fn seed_path(&self, vm: &str) -> PathBuf {
        self.seeds_dir().join(format!("{vm}-seed.iso"))
    }

    /// Private key path; the public half sits next to it with `.pub`.
    #[must_use]
    pub fn key_path(&self, vm: &str) -> PathBuf {
        self.keys_dir().join(format!("{vm}_id_ed25519"))
    }
}

/// `<key>.pub` for a private key path.
#[must_use]
pub fn public_key_path(private_key: &Path) -> PathBuf {
    let mut name = private_key.as_os_str().to_owned();
    name.push(".pub");
    PathBuf::from(name)
}
