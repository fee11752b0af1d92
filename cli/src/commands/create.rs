//! `kvmkit create`: provision a VM with rollback on failure.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use kvmkit_common::Distro;

use crate::app::AppContext;
use crate::application::ports::{InstanceManager, KeyGenerator};
use crate::application::services::provision::{ProvisionOrchestrator, ProvisionRequest};
use crate::domain::config::parse_dns_servers;
use crate::domain::{DnsMode, KeySource, VmConfig};
use crate::infra::image::HttpImageStore;
use crate::infra::libvirt::LibvirtToolchain;
use crate::infra::network::host_dns_servers;
use crate::output::TerminalReporter;

/// VM name offered when none is given.
pub const DEFAULT_VM_NAME: &str = "test-vm";

/// Public key offered for `--key existing` prompts.
const DEFAULT_PUBLIC_KEY: &str = "~/.ssh/id_ed25519.pub";

/// DNS strategy on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DnsArg {
    /// Use the DNS servers DHCP hands out
    Dhcp,
    /// This host first, then 1.1.1.1
    Host,
    /// The servers given with --dns-server
    Custom,
}

/// Arguments for the create command.
#[derive(Args, Default)]
pub struct CreateArgs {
    /// Base image
    #[arg(long, value_enum)]
    pub image: Option<Distro>,

    /// VM name
    #[arg(long)]
    pub name: Option<String>,

    /// Guest hostname [default: the VM name]
    #[arg(long)]
    pub hostname: Option<String>,

    /// Login user
    #[arg(long)]
    pub username: Option<String>,

    /// Login password [default: the username]
    #[arg(long)]
    pub password: Option<String>,

    /// SSH key: `generate`, `existing:<path>` or `none`
    #[arg(long, value_parser = parse_key_source, value_name = "SOURCE")]
    pub key: Option<KeySource>,

    /// Extra public key file to authorize (repeatable)
    #[arg(long = "authorized-key", value_name = "PATH")]
    pub authorized_keys: Vec<PathBuf>,

    /// Memory in MB
    #[arg(long)]
    pub memory: Option<u32>,

    /// Virtual CPUs
    #[arg(long)]
    pub vcpus: Option<u32>,

    /// Disk size, e.g. 20G
    #[arg(long)]
    pub disk_size: Option<String>,

    /// libvirt network
    #[arg(long)]
    pub network: Option<String>,

    /// DNS strategy
    #[arg(long, value_enum)]
    pub dns: Option<DnsArg>,

    /// DNS server for `--dns custom` (repeatable)
    #[arg(long = "dns-server", value_name = "IP")]
    pub dns_servers: Vec<String>,

    /// Disable SSH password login
    #[arg(long)]
    pub no_password_auth: bool,

    /// Skip package upgrades on first boot
    #[arg(long)]
    pub no_upgrade: bool,

    /// Fail instead of downloading a missing base image
    #[arg(long)]
    pub no_download: bool,
}

/// Parse `generate`, `none` or `existing:<path>`.
///
/// # Errors
///
/// Returns a message naming the accepted forms.
pub fn parse_key_source(value: &str) -> Result<KeySource, String> {
    match value {
        "generate" => Ok(KeySource::Generate),
        "none" => Ok(KeySource::Skip),
        other => match other.strip_prefix("existing:") {
            Some(path) if !path.is_empty() => Ok(KeySource::Existing(expand_home(path))),
            _ => Err(format!(
                "expected generate, existing:<path> or none, got '{other}'"
            )),
        },
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Run the create command.
///
/// # Errors
///
/// Returns the error that stopped provisioning, after rollback.
pub async fn run(app: &AppContext, args: CreateArgs) -> Result<ExitCode> {
    let images = HttpImageStore::new(app.layout.images_dir(), app.show_progress());
    let tools = LibvirtToolchain::default_runner(&app.config.libvirt, images);

    let networks = if args.network.is_none() && !app.non_interactive {
        tools.list_networks().await.unwrap_or_default()
    } else {
        Vec::new()
    };
    let mut cfg = resolve_config(app, &args, &networks)?;
    for path in &args.authorized_keys {
        let key = tools.read_public_key(path).await?;
        cfg.authorized_keys.push(key);
    }

    let reporter = TerminalReporter::new(&app.output);
    let mut orchestrator = ProvisionOrchestrator::new(&tools, app, &reporter, app.abort.clone());
    let request = ProvisionRequest {
        config: &cfg,
        layout: &app.layout,
        fetch_missing_image: !args.no_download,
    };

    match orchestrator.run(&request).await {
        Ok(outcome) => {
            if app.is_json() {
                crate::output::json::print(&outcome)?;
            } else {
                app.human().render_provisioned(&outcome);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            if let Some(report) = orchestrator.rollback_report()
                && !app.is_json()
            {
                app.human().render_rollback(report);
            }
            Err(e)
        }
    }
}

/// Build the VM configuration from flags, prompting for anything missing
/// unless the context is non-interactive.
///
/// # Errors
///
/// Returns an error if a prompt fails or an answer cannot be parsed.
pub fn resolve_config(app: &AppContext, args: &CreateArgs, networks: &[String]) -> Result<VmConfig> {
    let defaults = &app.config.defaults;

    let base_image = match args.image {
        Some(d) => d,
        None => {
            let items: Vec<String> = Distro::ALL.iter().map(|d| d.name().to_string()).collect();
            let default = Distro::ALL
                .iter()
                .position(|d| *d == defaults.base_image)
                .unwrap_or_default();
            Distro::ALL[app.select("Base image", &items, default)?]
        }
    };

    let name = match &args.name {
        Some(n) => n.clone(),
        None => app.input("VM name", DEFAULT_VM_NAME)?,
    };
    let mut cfg = VmConfig::from_defaults(&name, defaults);
    cfg.base_image = base_image;

    cfg.hostname = match &args.hostname {
        Some(h) => h.clone(),
        None => app.input("Hostname", &name)?,
    };
    cfg.username = match &args.username {
        Some(u) => u.clone(),
        None => app.input("Username", &defaults.username)?,
    };
    cfg.password = match &args.password {
        Some(p) => p.clone(),
        None => app.password("Password", &cfg.username)?,
    };

    cfg.key = match &args.key {
        Some(k) => k.clone(),
        None => prompt_key(app)?,
    };

    cfg.memory_mb = match args.memory {
        Some(m) => m,
        None => parse_number(&app.input("Memory (MB)", &defaults.memory_mb.to_string())?)?,
    };
    cfg.vcpus = match args.vcpus {
        Some(v) => v,
        None => parse_number(&app.input("vCPUs", &defaults.vcpus.to_string())?)?,
    };
    cfg.disk_size = match &args.disk_size {
        Some(d) => d.clone(),
        None => app.input("Disk size", &defaults.disk_size)?,
    };

    cfg.network = match &args.network {
        Some(n) => n.clone(),
        None => {
            if !networks.is_empty() && !app.is_json() {
                app.output
                    .info(&format!("Available networks: {}", networks.join(", ")));
            }
            app.input("Network", &defaults.network)?
        }
    };

    let dns = match args.dns {
        Some(d) => d,
        None if !args.dns_servers.is_empty() => DnsArg::Custom,
        None => prompt_dns(app)?,
    };
    cfg.dns = resolve_dns(app, dns, &args.dns_servers)?;

    cfg.ssh_password_auth = !args.no_password_auth;
    cfg.auto_upgrade = !args.no_upgrade;
    Ok(cfg)
}

fn prompt_key(app: &AppContext) -> Result<KeySource> {
    let items = [
        "Generate new SSH key".to_string(),
        "Use existing public key".to_string(),
        "No key (password login only)".to_string(),
    ];
    Ok(match app.select("SSH key", &items, 0)? {
        0 => KeySource::Generate,
        1 => KeySource::Existing(expand_home(
            &app.input("Public key path", DEFAULT_PUBLIC_KEY)?,
        )),
        _ => KeySource::Skip,
    })
}

fn prompt_dns(app: &AppContext) -> Result<DnsArg> {
    let items = [
        "DHCP".to_string(),
        "This host, then 1.1.1.1".to_string(),
        "Custom servers".to_string(),
    ];
    Ok(match app.select("DNS", &items, 0)? {
        0 => DnsArg::Dhcp,
        1 => DnsArg::Host,
        _ => DnsArg::Custom,
    })
}

fn resolve_dns(app: &AppContext, dns: DnsArg, servers: &[String]) -> Result<DnsMode> {
    Ok(match dns {
        DnsArg::Dhcp => DnsMode::Dhcp,
        DnsArg::Host => DnsMode::Static(host_dns_servers()?),
        DnsArg::Custom => {
            let raw: Vec<String> = if servers.is_empty() {
                app.input("DNS servers (comma-separated)", "1.1.1.1")?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            } else {
                servers.to_vec()
            };
            DnsMode::Static(parse_dns_servers(&raw)?)
        }
    })
}

fn parse_number(value: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .with_context(|| format!("'{value}' is not a number"))
}
