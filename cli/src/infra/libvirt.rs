//! Infrastructure implementation of the provisioning ports on a libvirt host.
//!
//! `LibvirtToolchain<R>` routes every external tool (`qemu-img`,
//! `cloud-localds`, `virt-install`, `virsh`, `ssh-keygen`) through a
//! `CommandRunner` and delegates image caching and raw file operations to
//! `HttpImageStore` and `HostFs`, so one value satisfies `ProvisionToolchain`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Output;

use anyhow::{Context, Result};
use kvmkit_common::Distro;
use tracing::debug;

use crate::application::ports::{
    CommandRunner, DiskTool, ImageStore, InstanceManager, KeyGenerator, KeyStatus, LaunchSpec,
    LocalFs, SeedBuilder, SeedInputs, SshKeyPair, TeardownStatus,
};
use crate::domain::ProvisionError;
use crate::domain::config::LibvirtConfig;
use crate::domain::layout::public_key_path;
use crate::infra::command_runner::{DEFAULT_CMD_TIMEOUT, LAUNCH_TIMEOUT, TokioCommandRunner};
use crate::infra::fs::HostFs;
use crate::infra::image::HttpImageStore;

/// Host-side provisioning toolchain.
///
/// Generic over `R: CommandRunner` so that tests can inject a mock runner
/// without spawning real processes.
pub struct LibvirtToolchain<R: CommandRunner> {
    runner: R,
    uri: String,
    use_sudo: bool,
    images: HttpImageStore,
    fs: HostFs,
}

impl<R: CommandRunner> LibvirtToolchain<R> {
    pub fn new(runner: R, libvirt: &LibvirtConfig, images: HttpImageStore) -> Self {
        Self {
            runner,
            uri: libvirt.uri.clone(),
            use_sudo: libvirt.use_sudo,
            images,
            fs: HostFs,
        }
    }

    /// The runner every tool invocation goes through.
    pub fn runner(&self) -> &R {
        &self.runner
    }

    async fn virsh(&self, args: &[&str]) -> Result<Output> {
        let mut full = vec!["--connect", self.uri.as_str()];
        full.extend_from_slice(args);
        self.runner
            .run("virsh", &full)
            .await
            .with_context(|| format!("virsh {}", args.first().unwrap_or(&"")))
    }

    /// Run a virsh teardown verb, mapping "not found"/"not running" to
    /// `AlreadyGone`.
    async fn teardown(&self, verb: &str, name: &str) -> Result<TeardownStatus> {
        let output = self.virsh(&[verb, name]).await?;
        if output.status.success() {
            return Ok(TeardownStatus::Done);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_absent_instance(&stderr) {
            debug!(verb, instance = name, "instance already gone");
            return Ok(TeardownStatus::AlreadyGone);
        }
        Err(ProvisionError::tool_failed(
            &format!("virsh {verb}"),
            output.status.code(),
            &output.stderr,
        )
        .into())
    }
}

impl LibvirtToolchain<TokioCommandRunner> {
    /// Convenience constructor for production use.
    #[must_use]
    pub fn default_runner(libvirt: &LibvirtConfig, images: HttpImageStore) -> Self {
        Self::new(TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT), libvirt, images)
    }
}

// ── Tool output helpers ──────────────────────────────────────────────────────

/// Turn a non-zero exit into `ProvisionError::ExternalToolFailed`.
fn ensure_success(tool: &str, output: Output) -> Result<Output> {
    if output.status.success() {
        Ok(output)
    } else {
        Err(ProvisionError::tool_failed(tool, output.status.code(), &output.stderr).into())
    }
}

/// Whether virsh stderr says the instance is absent or already stopped.
#[must_use]
pub fn is_absent_instance(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    [
        "domain not found",
        "failed to get domain",
        "no domain with matching name",
        "domain is not running",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}

/// Parse `virsh list --name` style output: one name per line, blanks skipped.
#[must_use]
pub fn parse_name_list(stdout: &[u8]) -> BTreeSet<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect()
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

// ── Port implementations ─────────────────────────────────────────────────────

impl<R: CommandRunner> DiskTool for LibvirtToolchain<R> {
    async fn create_linked(&self, base: &Path, disk: &Path, size: &str) -> Result<PathBuf> {
        let base_arg = path_arg(base);
        let disk_arg = path_arg(disk);
        let output = self
            .runner
            .run(
                "qemu-img",
                &[
                    "create", "-f", "qcow2", "-F", "qcow2", "-b", &base_arg, &disk_arg, size,
                ],
            )
            .await
            .context("qemu-img create")?;
        ensure_success("qemu-img", output)?;
        Ok(disk.to_path_buf())
    }
}

impl<R: CommandRunner> SeedBuilder for LibvirtToolchain<R> {
    async fn build(&self, inputs: &SeedInputs<'_>, seed: &Path) -> Result<PathBuf> {
        let network = path_arg(inputs.network_config);
        let seed_arg = path_arg(seed);
        let user = path_arg(inputs.user_data);
        let meta = path_arg(inputs.meta_data);
        let output = self
            .runner
            .run(
                "cloud-localds",
                &["--network-config", &network, &seed_arg, &user, &meta],
            )
            .await
            .context("cloud-localds")?;
        ensure_success("cloud-localds", output)?;
        Ok(seed.to_path_buf())
    }
}

impl<R: CommandRunner> InstanceManager for LibvirtToolchain<R> {
    async fn launch(&self, spec: &LaunchSpec<'_>) -> Result<String> {
        let memory = spec.memory_mb.to_string();
        let vcpus = spec.vcpus.to_string();
        let disk = format!("path={},format=qcow2,bus=virtio", spec.disk.display());
        let seed = format!("path={},device=cdrom", spec.seed.display());
        let network = format!("network={},model=virtio", spec.network);

        let mut args: Vec<&str> = Vec::new();
        let program = if self.use_sudo {
            args.push("virt-install");
            "sudo"
        } else {
            "virt-install"
        };
        args.extend_from_slice(&[
            "--connect",
            self.uri.as_str(),
            "--name",
            spec.name,
            "--memory",
            memory.as_str(),
            "--vcpus",
            vcpus.as_str(),
            "--disk",
            disk.as_str(),
            "--disk",
            seed.as_str(),
            "--os-variant",
            spec.os_variant,
            "--import",
            "--network",
            network.as_str(),
            "--graphics",
            "none",
            "--noautoconsole",
        ]);

        let output = self
            .runner
            .run_with_timeout(program, &args, LAUNCH_TIMEOUT)
            .await
            .context("virt-install")?;
        ensure_success("virt-install", output)?;
        Ok(spec.name.to_string())
    }

    async fn stop(&self, name: &str) -> Result<TeardownStatus> {
        self.teardown("destroy", name).await
    }

    async fn delete(&self, name: &str) -> Result<TeardownStatus> {
        self.teardown("undefine", name).await
    }

    async fn list_names(&self) -> Result<BTreeSet<String>> {
        let output = ensure_success("virsh list", self.virsh(&["list", "--all", "--name"]).await?)?;
        Ok(parse_name_list(&output.stdout))
    }

    async fn list_networks(&self) -> Result<Vec<String>> {
        let output = ensure_success(
            "virsh net-list",
            self.virsh(&["net-list", "--all", "--name"]).await?,
        )?;
        Ok(parse_name_list(&output.stdout).into_iter().collect())
    }
}

impl<R: CommandRunner> KeyGenerator for LibvirtToolchain<R> {
    async fn ensure_key(&self, private_key: &Path, comment: &str) -> Result<SshKeyPair> {
        let public_key = public_key_path(private_key);
        let key_arg = path_arg(private_key);

        if private_key.exists() {
            let mut created = Vec::new();
            if !public_key.exists() {
                // Recover the public half from the private key.
                let output = ensure_success(
                    "ssh-keygen",
                    self.runner
                        .run("ssh-keygen", &["-y", "-f", &key_arg])
                        .await
                        .context("ssh-keygen -y")?,
                )?;
                let line = String::from_utf8_lossy(&output.stdout).trim().to_string();
                self.fs.write(&public_key, &format!("{line}\n"))?;
                created.push(public_key.clone());
            }
            return Ok(SshKeyPair {
                private_key: private_key.to_path_buf(),
                public_key,
                status: KeyStatus::Existing,
                created,
            });
        }

        if let Some(parent) = private_key.parent() {
            self.fs.create_dir_all(parent)?;
        }
        let output = self
            .runner
            .run(
                "ssh-keygen",
                &["-q", "-t", "ed25519", "-f", &key_arg, "-N", "", "-C", comment],
            )
            .await
            .context("ssh-keygen")?;
        ensure_success("ssh-keygen", output)?;
        Ok(SshKeyPair {
            private_key: private_key.to_path_buf(),
            created: vec![private_key.to_path_buf(), public_key.clone()],
            public_key,
            status: KeyStatus::Created,
        })
    }

    async fn read_public_key(&self, path: &Path) -> Result<String> {
        // Accept the private key path when its `.pub` sits next to it.
        let candidate = public_key_path(path);
        let path = if path.extension().is_none_or(|e| e != "pub") && candidate.exists() {
            candidate.as_path()
        } else {
            path
        };
        read_key_file(path)
    }
}

fn read_key_file(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading public key {}", path.display()))?;
    let line = content.trim().to_string();
    anyhow::ensure!(
        is_public_key_line(&line),
        "{} does not look like an OpenSSH public key",
        path.display()
    );
    Ok(line)
}

/// `ssh-ed25519 AAAA... comment` style lines.
#[must_use]
pub fn is_public_key_line(line: &str) -> bool {
    let mut parts = line.split_whitespace();
    matches!(
        (parts.next(), parts.next()),
        (Some(kind), Some(_)) if kind.starts_with("ssh-") || kind.starts_with("ecdsa-") || kind.starts_with("sk-")
    )
}

impl<R: CommandRunner> ImageStore for LibvirtToolchain<R> {
    fn image_path(&self, distro: Distro) -> PathBuf {
        self.images.image_path(distro)
    }

    fn is_cached(&self, distro: Distro) -> bool {
        self.images.is_cached(distro)
    }

    async fn fetch(&self, distro: Distro) -> Result<PathBuf> {
        self.images.fetch(distro).await
    }
}

impl<R: CommandRunner> LocalFs for LibvirtToolchain<R> {
    fn exists(&self, path: &Path) -> bool {
        self.fs.exists(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.fs.is_dir(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.fs.create_dir_all(path)
    }

    fn write(&self, path: &Path, content: &str) -> Result<()> {
        self.fs.write(path, content)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.fs.remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.fs.remove_dir_all(path)
    }
}
