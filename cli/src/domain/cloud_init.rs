//! cloud-init seed documents: `user-data`, `meta-data`, `network-config`.
//!
//! Rendering only. Writing the files and building the seed image is the
//! orchestrator's job.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::net::IpAddr;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::config::{DnsMode, VmConfig};

pub const USER_DATA: &str = "user-data";
pub const META_DATA: &str = "meta-data";
pub const NETWORK_CONFIG: &str = "network-config";

const PACKAGES: &[&str] = &["curl", "vim", "qemu-guest-agent", "net-tools"];

/// The three documents a NoCloud seed carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedDocuments {
    pub user_data: String,
    pub meta_data: String,
    pub network_config: String,
}

impl SeedDocuments {
    /// Render all documents for `cfg`, authorizing `ssh_keys`.
    ///
    /// # Errors
    ///
    /// Returns an error if YAML serialization fails.
    pub fn render(cfg: &VmConfig, ssh_keys: &[String]) -> Result<Self, serde_yaml::Error> {
        Ok(Self {
            user_data: user_data(cfg, ssh_keys)?,
            meta_data: meta_data(&instance_id(&cfg.name), &cfg.hostname)?,
            network_config: network_config(&cfg.network_interface, &cfg.dns)?,
        })
    }

    /// `(file name, contents)` pairs in the order they are written.
    #[must_use]
    pub fn files(&self) -> [(&'static str, &str); 3] {
        [
            (USER_DATA, &self.user_data),
            (META_DATA, &self.meta_data),
            (NETWORK_CONFIG, &self.network_config),
        ]
    }
}

/// Stable instance id: `<name>-<first 8 hex chars of sha256(name)>`.
#[must_use]
pub fn instance_id(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    let mut short = String::with_capacity(8);
    for byte in &digest[..4] {
        let _ = write!(short, "{byte:02x}");
    }
    format!("{name}-{short}")
}

// ── user-data ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct UserData<'a> {
    preserve_hostname: bool,
    hostname: &'a str,
    users: Vec<CloudUser<'a>>,
    ssh_pwauth: bool,
    disable_root: bool,
    chpasswd: Chpasswd,
    package_update: bool,
    package_upgrade: bool,
    package_reboot_if_required: bool,
    packages: &'static [&'static str],
    runcmd: Vec<Vec<&'static str>>,
    final_message: String,
}

#[derive(Serialize)]
struct CloudUser<'a> {
    name: &'a str,
    groups: Vec<&'static str>,
    shell: &'static str,
    sudo: Vec<&'static str>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    ssh_authorized_keys: &'a [String],
}

#[derive(Serialize)]
struct Chpasswd {
    list: String,
    expire: bool,
}

/// Render `user-data` with its `#cloud-config` header.
///
/// # Errors
///
/// Returns an error if YAML serialization fails.
pub fn user_data(cfg: &VmConfig, ssh_keys: &[String]) -> Result<String, serde_yaml::Error> {
    let doc = UserData {
        preserve_hostname: false,
        hostname: &cfg.hostname,
        users: vec![CloudUser {
            name: &cfg.username,
            groups: vec!["sudo"],
            shell: "/bin/bash",
            sudo: vec!["ALL=(ALL) NOPASSWD:ALL"],
            ssh_authorized_keys: ssh_keys,
        }],
        ssh_pwauth: cfg.ssh_password_auth,
        disable_root: false,
        chpasswd: Chpasswd {
            list: format!("{}:{}", cfg.username, cfg.password),
            expire: false,
        },
        package_update: true,
        package_upgrade: cfg.auto_upgrade,
        package_reboot_if_required: true,
        packages: PACKAGES,
        runcmd: vec![vec!["systemctl", "enable", "--now", "qemu-guest-agent"]],
        final_message: format!("VM {} is ready!", cfg.hostname),
    };
    Ok(format!("#cloud-config\n{}", serde_yaml::to_string(&doc)?))
}

// ── meta-data ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct MetaData<'a> {
    #[serde(rename = "instance-id")]
    instance_id: &'a str,
    #[serde(rename = "local-hostname")]
    local_hostname: &'a str,
}

/// Render `meta-data`.
///
/// # Errors
///
/// Returns an error if YAML serialization fails.
pub fn meta_data(instance_id: &str, hostname: &str) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(&MetaData {
        instance_id,
        local_hostname: hostname,
    })
}

// ── network-config ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct NetworkConfig {
    version: u8,
    ethernets: BTreeMap<String, Ethernet>,
}

#[derive(Serialize)]
struct Ethernet {
    dhcp4: bool,
    #[serde(rename = "dhcp4-overrides", skip_serializing_if = "Option::is_none")]
    dhcp4_overrides: Option<DhcpOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nameservers: Option<Nameservers>,
}

#[derive(Serialize)]
struct DhcpOverrides {
    #[serde(rename = "use-dns")]
    use_dns: bool,
}

#[derive(Serialize)]
struct Nameservers {
    addresses: Vec<IpAddr>,
}

/// Render a netplan v2 `network-config` with DHCP on `interface`.
///
/// # Errors
///
/// Returns an error if YAML serialization fails.
pub fn network_config(interface: &str, dns: &DnsMode) -> Result<String, serde_yaml::Error> {
    let ethernet = match dns {
        DnsMode::Dhcp => Ethernet {
            dhcp4: true,
            dhcp4_overrides: None,
            nameservers: None,
        },
        DnsMode::Static(servers) => Ethernet {
            dhcp4: true,
            dhcp4_overrides: Some(DhcpOverrides { use_dns: false }),
            nameservers: Some(Nameservers {
                addresses: servers.clone(),
            }),
        },
    };
    serde_yaml::to_string(&NetworkConfig {
        version: 2,
        ethernets: BTreeMap::from([(interface.to_string(), ethernet)]),
    })
}
