//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and `kvmkit_common`: never
//! from `crate::infra`, `crate::commands`, or `crate::output`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use anyhow::Result;
use kvmkit_common::{ChannelSpec, Distro};

use crate::domain::{KvmkitConfig, VmConfig};

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;
    /// Spawn a long-running program without waiting for it. Stdout is
    /// discarded; stderr is piped so callers can collect diagnostics.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    fn spawn(&self, program: &str, args: &[&str]) -> Result<tokio::process::Child>;
}

// ── Provisioning collaborator ports ──────────────────────────────────────────

/// Local cache of base cloud images.
#[allow(async_fn_in_trait)]
pub trait ImageStore {
    /// Where `distro` lives (or would live) locally.
    fn image_path(&self, distro: Distro) -> PathBuf;
    /// Whether the image is already downloaded.
    fn is_cached(&self, distro: Distro) -> bool;
    /// Download the image unless present. Idempotent.
    async fn fetch(&self, distro: Distro) -> Result<PathBuf>;
}

/// Copy-on-write disk creation.
#[allow(async_fn_in_trait)]
pub trait DiskTool {
    /// Create `disk` as a linked clone of `base` with virtual size `size`.
    async fn create_linked(&self, base: &Path, disk: &Path, size: &str) -> Result<PathBuf>;
}

/// Paths of the rendered seed documents.
#[derive(Debug, Clone, Copy)]
pub struct SeedInputs<'a> {
    pub user_data: &'a Path,
    pub meta_data: &'a Path,
    pub network_config: &'a Path,
}

/// Builds a cloud-init NoCloud seed image from rendered documents.
#[allow(async_fn_in_trait)]
pub trait SeedBuilder {
    async fn build(&self, inputs: &SeedInputs<'_>, seed: &Path) -> Result<PathBuf>;
}

/// Launch parameters for a new instance.
#[derive(Debug, Clone, Copy)]
pub struct LaunchSpec<'a> {
    pub name: &'a str,
    pub disk: &'a Path,
    pub seed: &'a Path,
    pub memory_mb: u32,
    pub vcpus: u32,
    pub network: &'a str,
    pub os_variant: &'a str,
}

/// Outcome of an idempotent teardown call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStatus {
    /// The call changed something.
    Done,
    /// The instance was already stopped or did not exist.
    AlreadyGone,
}

/// Virtualization runtime operations on named instances.
#[allow(async_fn_in_trait)]
pub trait InstanceManager {
    /// Define and boot an instance; returns its name.
    async fn launch(&self, spec: &LaunchSpec<'_>) -> Result<String>;
    /// Force-stop. "Already stopped" and "not found" are `AlreadyGone`.
    async fn stop(&self, name: &str) -> Result<TeardownStatus>;
    /// Remove the definition. "Not found" is `AlreadyGone`.
    async fn delete(&self, name: &str) -> Result<TeardownStatus>;
    /// Names of every defined instance, running or not.
    async fn list_names(&self) -> Result<BTreeSet<String>>;
    /// Names of the virtual networks instances can attach to.
    async fn list_networks(&self) -> Result<Vec<String>>;
}

/// Whether a key pair was made by this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    Created,
    Existing,
}

/// An SSH key pair on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshKeyPair {
    pub private_key: PathBuf,
    pub public_key: PathBuf,
    pub status: KeyStatus,
    /// Files written by this call, in creation order. A recovered public
    /// half of an existing private key is listed here too.
    pub created: Vec<PathBuf>,
}

/// SSH key-pair generation.
#[allow(async_fn_in_trait)]
pub trait KeyGenerator {
    /// Generate a key at `private_key` unless one is already there. The
    /// public key is not read; callers do that once the files are tracked.
    async fn ensure_key(&self, private_key: &Path, comment: &str) -> Result<SshKeyPair>;
    /// Read an existing public key file.
    async fn read_public_key(&self, path: &Path) -> Result<String>;
}

/// Raw local filesystem operations used for staging and rollback.
pub trait LocalFs {
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn write(&self, path: &Path, content: &str) -> Result<()>;
    fn remove_file(&self, path: &Path) -> Result<()>;
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
}

/// Composite trait: everything the provisioning orchestrator drives.
pub trait ProvisionToolchain:
    ImageStore + DiskTool + SeedBuilder + InstanceManager + KeyGenerator + LocalFs
{
}

/// Blanket implementation: any type implementing all sub-traits is a `ProvisionToolchain`.
impl<T> ProvisionToolchain for T where
    T: ImageStore + DiskTool + SeedBuilder + InstanceManager + KeyGenerator + LocalFs
{
}

// ── Interaction ports ─────────────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait: no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}

/// The confirmation point before any disk or instance is created.
#[allow(async_fn_in_trait)]
pub trait Confirmer {
    /// Show the plan and ask whether to go ahead.
    async fn confirm_provision(&self, cfg: &VmConfig) -> Result<bool>;
}

// ── Forwarding ports ─────────────────────────────────────────────────────────

/// One running forwarding process.
#[allow(async_fn_in_trait)]
pub trait ChannelProcess {
    /// OS process id, when still known.
    fn id(&self) -> Option<u32>;
    /// `true` while the process has not exited.
    fn is_alive(&mut self) -> bool;
    /// Whatever the process wrote to stderr, most recent last.
    async fn diagnostics(&mut self) -> String;
    /// Ask the process to exit (SIGTERM).
    fn terminate(&mut self) -> Result<()>;
    /// Force the process to exit and reap it.
    async fn kill(&mut self) -> Result<()>;
    /// Wait up to `timeout` for exit; `true` if it exited.
    async fn wait_exit(&mut self, timeout: Duration) -> bool;
}

/// Starts forwarding processes.
pub trait ForwardLauncher {
    type Process: ChannelProcess;
    /// Spawn a forwarding process for `spec`.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned at all.
    fn launch(&self, spec: &ChannelSpec) -> Result<Self::Process>;
}

// ── Settings port ────────────────────────────────────────────────────────────

/// Loads and stores the kvmkit settings file.
pub trait ConfigStore {
    /// Load the settings, falling back to defaults when the file is absent.
    fn load(&self) -> Result<KvmkitConfig>;
    /// Persist the settings.
    fn save(&self, config: &KvmkitConfig) -> Result<()>;
    /// Location of the settings file.
    fn path(&self) -> Result<PathBuf>;
}
