//! Infrastructure implementation of the `ConfigStore` port.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::application::ports::ConfigStore;
use crate::domain::KvmkitConfig;

/// Environment variable overriding the settings file location.
pub const CONFIG_ENV: &str = "KVMKIT_CONFIG";
/// Environment variable overriding the base directory.
pub const HOME_ENV: &str = "KVMKIT_HOME";

/// Production implementation of `ConfigStore` that uses a YAML file on disk.
pub struct YamlConfigStore;

impl ConfigStore for YamlConfigStore {
    fn load(&self) -> Result<KvmkitConfig> {
        let path = self.path()?;
        if !path.exists() {
            return Ok(KvmkitConfig::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(KvmkitConfig::default());
        }
        serde_yaml::from_str(&content).with_context(|| format!("cannot parse {}", path.display()))
    }

    fn save(&self, config: &KvmkitConfig) -> Result<()> {
        let path = self.path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let content = serde_yaml::to_string(config).context("cannot serialize config")?;
        std::fs::write(&path, content)
            .with_context(|| format!("cannot write {}", path.display()))
    }

    fn path(&self) -> Result<PathBuf> {
        if let Ok(val) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(val));
        }
        Ok(default_base_dir()?.join("config.yaml"))
    }
}

/// `~/.kvm`.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn default_base_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|h| h.join(".kvm"))
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))
}

/// Resolve the base directory: flag, then `KVMKIT_HOME`, then the settings
/// file, then `~/.kvm`.
///
/// # Errors
///
/// Returns an error if every source is unset and the home directory cannot
/// be determined.
pub fn resolve_base_dir(flag: Option<PathBuf>, config: &KvmkitConfig) -> Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir);
    }
    if let Some(dir) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    if let Some(dir) = &config.base_dir {
        return Ok(dir.clone());
    }
    default_base_dir()
}
