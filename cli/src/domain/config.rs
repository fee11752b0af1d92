//! Domain types and validators for kvmkit configuration.
//!
//! Pure functions only: no I/O, no async, no filesystem access.
//!
//! Two layers live here: [`KvmkitConfig`], the on-disk settings file with a
//! default for every option, and [`VmConfig`], the fully resolved parameters
//! of one VM, validated once before provisioning touches anything.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::LazyLock;

use kvmkit_common::{ChannelSpec, Distro, default_channels};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

// ── Constants ────────────────────────────────────────────────────────────────

pub const MIN_MEMORY_MB: u32 = 256;
pub const MAX_MEMORY_MB: u32 = 1_048_576;
pub const MIN_VCPUS: u32 = 1;
pub const MAX_VCPUS: u32 = 256;

// Patterns are compile-time constants.
#[allow(clippy::expect_used)]
static VM_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]{0,62}$").expect("valid regex")
});
#[allow(clippy::expect_used)]
static HOSTNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?$").expect("valid regex")
});
#[allow(clippy::expect_used)]
static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$").expect("valid regex"));
#[allow(clippy::expect_used)]
static DISK_SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[1-9][0-9]*[KMGT]?$").expect("valid regex"));

// ── Settings file schema ─────────────────────────────────────────────────────

/// Top-level configuration stored in `~/.kvm/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KvmkitConfig {
    /// Root of the images/vms/seeds/keys tree. `~/.kvm` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,
    /// How to reach libvirt.
    pub libvirt: LibvirtConfig,
    /// Defaults for `kvmkit create`.
    pub defaults: VmDefaults,
    /// Port-forward supervisor settings.
    pub forward: ForwardConfig,
}

/// libvirt connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibvirtConfig {
    /// Connection URI passed as `--connect` to virsh and virt-install.
    pub uri: String,
    /// Run virt-install through sudo.
    pub use_sudo: bool,
}

impl Default for LibvirtConfig {
    fn default() -> Self {
        Self {
            uri: "qemu:///system".to_string(),
            use_sudo: true,
        }
    }
}

/// Default VM parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VmDefaults {
    pub base_image: Distro,
    pub memory_mb: u32,
    pub vcpus: u32,
    pub disk_size: String,
    pub network: String,
    pub username: String,
    pub network_interface: String,
}

impl Default for VmDefaults {
    fn default() -> Self {
        Self {
            base_image: Distro::default(),
            memory_mb: 2048,
            vcpus: 2,
            disk_size: "20G".to_string(),
            network: "default".to_string(),
            username: "ubuntu".to_string(),
            network_interface: "enp1s0".to_string(),
        }
    }
}

/// Port-forward supervisor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Pause after each launch before judging whether it came up.
    pub settle_ms: u64,
    /// Liveness poll interval.
    pub poll_ms: u64,
    /// How long a child gets to exit after SIGTERM before it is killed.
    pub stop_grace_ms: u64,
    /// Channels to keep alive. Empty means the built-in defaults.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<ChannelSpec>,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            settle_ms: 500,
            poll_ms: 1000,
            stop_grace_ms: 2000,
            channels: Vec::new(),
        }
    }
}

impl ForwardConfig {
    /// Configured channels, or the built-in set when none are configured.
    #[must_use]
    pub fn effective_channels(&self) -> Vec<ChannelSpec> {
        if self.channels.is_empty() {
            default_channels()
        } else {
            self.channels.clone()
        }
    }
}

// ── Resolved VM parameters ───────────────────────────────────────────────────

/// Where the VM's SSH key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Generate `keys/<vm>_id_ed25519` unless it already exists.
    Generate,
    /// Authorize an existing public key file.
    Existing(PathBuf),
    /// No SSH key; password login only.
    Skip,
}

/// DNS configuration written into the guest's network-config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsMode {
    /// Use whatever DHCP hands out.
    Dhcp,
    /// Ignore DHCP DNS and use these servers, in order.
    Static(Vec<IpAddr>),
}

/// Every recognized VM option, resolved from flags, prompts and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    pub name: String,
    pub hostname: String,
    pub username: String,
    pub password: String,
    pub key: KeySource,
    /// Extra public keys to authorize besides the one from `key`.
    pub authorized_keys: Vec<String>,
    pub base_image: Distro,
    pub memory_mb: u32,
    pub vcpus: u32,
    pub disk_size: String,
    pub network: String,
    pub network_interface: String,
    pub dns: DnsMode,
    pub ssh_password_auth: bool,
    pub auto_upgrade: bool,
}

impl VmConfig {
    /// A config for `name` populated from `defaults`. The hostname follows
    /// the VM name and the password follows the username, as the interactive
    /// prompts suggest.
    #[must_use]
    pub fn from_defaults(name: &str, defaults: &VmDefaults) -> Self {
        Self {
            name: name.to_string(),
            hostname: name.to_string(),
            username: defaults.username.clone(),
            password: defaults.username.clone(),
            key: KeySource::Generate,
            authorized_keys: Vec::new(),
            base_image: defaults.base_image,
            memory_mb: defaults.memory_mb,
            vcpus: defaults.vcpus,
            disk_size: defaults.disk_size.clone(),
            network: defaults.network.clone(),
            network_interface: defaults.network_interface.clone(),
            dns: DnsMode::Dhcp,
            ssh_password_auth: true,
            auto_upgrade: true,
        }
    }

    /// libosinfo variant for the selected base image.
    #[must_use]
    pub fn os_variant(&self) -> &'static str {
        self.base_image.os_variant()
    }

    /// Validate every field.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VM_NAME_RE.is_match(&self.name) {
            return Err(ConfigError::InvalidVmName(self.name.clone()));
        }
        if !HOSTNAME_RE.is_match(&self.hostname) {
            return Err(ConfigError::InvalidHostname(self.hostname.clone()));
        }
        if !USERNAME_RE.is_match(&self.username) {
            return Err(ConfigError::InvalidUsername(self.username.clone()));
        }
        if self.password.is_empty() {
            return Err(ConfigError::EmptyPassword);
        }
        if !DISK_SIZE_RE.is_match(&self.disk_size) {
            return Err(ConfigError::InvalidDiskSize(self.disk_size.clone()));
        }
        check_range("memory (MB)", self.memory_mb, MIN_MEMORY_MB, MAX_MEMORY_MB)?;
        check_range("vCPUs", self.vcpus, MIN_VCPUS, MAX_VCPUS)?;
        if !VM_NAME_RE.is_match(&self.network) {
            return Err(ConfigError::InvalidNetwork(self.network.clone()));
        }
        if let DnsMode::Static(servers) = &self.dns
            && servers.is_empty()
        {
            return Err(ConfigError::MissingDnsServers);
        }
        Ok(())
    }
}

fn check_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

/// Parse a list of DNS server strings.
///
/// # Errors
///
/// Returns `InvalidDnsServer` for the first entry that is not an IP address.
pub fn parse_dns_servers(values: &[String]) -> Result<Vec<IpAddr>, ConfigError> {
    values
        .iter()
        .map(|v| {
            v.trim()
                .parse::<IpAddr>()
                .map_err(|_| ConfigError::InvalidDnsServer(v.clone()))
        })
        .collect()
}

// ── Unit tests ───────────────────────────────────────────────────────────────
