//! Shared mock infrastructure for unit tests.
//!
//! Provides an in-memory provisioning toolchain, a recording command runner,
//! scripted forwarding processes and output helpers so each test file
//! doesn't have to re-define the same boilerplate.

#![allow(clippy::expect_used, dead_code)]

use std::collections::{BTreeSet, VecDeque};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use kvmkit_cli::application::AbortTrigger;
use kvmkit_cli::application::ports::{
    ChannelProcess, CommandRunner, Confirmer, DiskTool, ForwardLauncher, ImageStore,
    InstanceManager, KeyGenerator, KeyStatus, LaunchSpec, LocalFs, ProgressReporter,
    SeedBuilder, SeedInputs, SshKeyPair, TeardownStatus,
};
use kvmkit_cli::domain::layout::public_key_path;
use kvmkit_cli::domain::{ProvisionError, VmConfig};
use kvmkit_common::{ChannelSpec, Distro};

// ── Output helpers ────────────────────────────────────────────────────────────

pub fn ok_output(stdout: &[u8]) -> Output {
    Output {
        status: ExitStatus::from_raw(0),
        stdout: stdout.to_vec(),
        stderr: Vec::new(),
    }
}

pub fn err_output(stderr: &[u8]) -> Output {
    Output {
        status: ExitStatus::from_raw(1 << 8),
        stdout: Vec::new(),
        stderr: stderr.to_vec(),
    }
}

fn unexpected<T>() -> Result<T> {
    anyhow::bail!("not expected in this test")
}

// ── Mock: command runner ─────────────────────────────────────────────────────

/// Records every invocation and replays queued outputs (success when empty).
#[derive(Default)]
pub struct RecordingRunner {
    pub calls: Mutex<Vec<Vec<String>>>,
    pub timeouts: Mutex<Vec<Duration>>,
    responses: Mutex<VecDeque<Output>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, output: Output) -> Self {
        self.responses.lock().expect("lock").push_back(output);
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().expect("lock").clone()
    }

    fn record(&self, program: &str, args: &[&str]) -> Output {
        let mut call = vec![program.to_string()];
        call.extend(args.iter().map(|a| (*a).to_string()));
        self.calls.lock().expect("lock").push(call);
        self.responses
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| ok_output(b""))
    }
}

impl CommandRunner for RecordingRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        Ok(self.record(program, args))
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        self.timeouts.lock().expect("lock").push(timeout);
        Ok(self.record(program, args))
    }

    fn spawn(&self, _: &str, _: &[&str]) -> Result<tokio::process::Child> {
        unexpected()
    }
}

// ── Mock: provisioning toolchain ─────────────────────────────────────────────

/// External steps a test can make fail or abort after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Fetch,
    Keygen,
    ReadKey,
    Disk,
    Seed,
    Launch,
}

/// In-memory host: files, directories and defined instances are sets, and
/// every external call is appended to `calls`.
#[derive(Default)]
pub struct MockToolchain {
    pub images_dir: PathBuf,
    pub files: Mutex<BTreeSet<PathBuf>>,
    pub dirs: Mutex<BTreeSet<PathBuf>>,
    pub instances: Mutex<BTreeSet<String>>,
    pub calls: Mutex<Vec<String>>,
    /// Make this step fail.
    pub fail_at: Option<Step>,
    /// A failing launch still leaves the instance defined.
    pub launch_defines_on_failure: bool,
    /// Raise the abort flag right after this step succeeds.
    pub abort_after: Option<(Step, AbortTrigger)>,
    pub stop_fails: bool,
    pub delete_fails: bool,
    /// `remove_file` fails for this path.
    pub undeletable: Option<PathBuf>,
}

impl MockToolchain {
    pub fn new(images_dir: &Path) -> Self {
        Self {
            images_dir: images_dir.to_path_buf(),
            ..Self::default()
        }
    }

    pub fn with_file(self, path: &Path) -> Self {
        self.files.lock().expect("lock").insert(path.to_path_buf());
        self
    }

    pub fn with_dir(self, path: &Path) -> Self {
        self.dirs.lock().expect("lock").insert(path.to_path_buf());
        self
    }

    pub fn with_instance(self, name: &str) -> Self {
        self.instances.lock().expect("lock").insert(name.to_string());
        self
    }

    pub fn with_cached_image(self, distro: Distro) -> Self {
        let path = self.image_path(distro);
        self.with_file(&path)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }

    pub fn image_path_for(&self, distro: Distro) -> PathBuf {
        self.images_dir.join(distro.file_name())
    }

    pub fn has_file(&self, path: &Path) -> bool {
        self.files.lock().expect("lock").contains(path)
    }

    pub fn has_dir(&self, path: &Path) -> bool {
        self.dirs.lock().expect("lock").contains(path)
    }

    pub fn has_instance(&self, name: &str) -> bool {
        self.instances.lock().expect("lock").contains(name)
    }

    fn log(&self, call: String) {
        self.calls.lock().expect("lock").push(call);
    }

    fn step(&self, step: Step) -> Result<()> {
        if self.fail_at == Some(step) {
            return Err(ProvisionError::ExternalToolFailed {
                tool: format!("{step:?}").to_lowercase(),
                code: Some(1),
                stderr: "simulated failure".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn after(&self, step: Step) {
        if let Some((at, trigger)) = &self.abort_after
            && *at == step
        {
            trigger.trigger();
        }
    }
}

impl ImageStore for MockToolchain {
    fn image_path(&self, distro: Distro) -> PathBuf {
        self.images_dir.join(distro.file_name())
    }

    fn is_cached(&self, distro: Distro) -> bool {
        self.has_file(&self.image_path(distro))
    }

    async fn fetch(&self, distro: Distro) -> Result<PathBuf> {
        self.log(format!("fetch {distro}"));
        self.step(Step::Fetch)?;
        let path = self.image_path(distro);
        self.files.lock().expect("lock").insert(path.clone());
        self.after(Step::Fetch);
        Ok(path)
    }
}

impl DiskTool for MockToolchain {
    async fn create_linked(&self, base: &Path, disk: &Path, size: &str) -> Result<PathBuf> {
        self.log(format!("disk {} {} {size}", base.display(), disk.display()));
        self.step(Step::Disk)?;
        self.files.lock().expect("lock").insert(disk.to_path_buf());
        self.after(Step::Disk);
        Ok(disk.to_path_buf())
    }
}

impl SeedBuilder for MockToolchain {
    async fn build(&self, inputs: &SeedInputs<'_>, seed: &Path) -> Result<PathBuf> {
        self.log(format!("seed {}", seed.display()));
        for doc in [inputs.user_data, inputs.meta_data, inputs.network_config] {
            assert!(self.has_file(doc), "seed input {} was not written", doc.display());
        }
        self.step(Step::Seed)?;
        self.files.lock().expect("lock").insert(seed.to_path_buf());
        self.after(Step::Seed);
        Ok(seed.to_path_buf())
    }
}

impl InstanceManager for MockToolchain {
    async fn launch(&self, spec: &LaunchSpec<'_>) -> Result<String> {
        self.log(format!("launch {}", spec.name));
        if self.fail_at == Some(Step::Launch) && self.launch_defines_on_failure {
            self.instances
                .lock()
                .expect("lock")
                .insert(spec.name.to_string());
        }
        self.step(Step::Launch)?;
        self.instances
            .lock()
            .expect("lock")
            .insert(spec.name.to_string());
        self.after(Step::Launch);
        Ok(spec.name.to_string())
    }

    async fn stop(&self, name: &str) -> Result<TeardownStatus> {
        self.log(format!("stop {name}"));
        if self.stop_fails {
            anyhow::bail!("virsh destroy failed: connection reset");
        }
        if self.has_instance(name) {
            Ok(TeardownStatus::Done)
        } else {
            Ok(TeardownStatus::AlreadyGone)
        }
    }

    async fn delete(&self, name: &str) -> Result<TeardownStatus> {
        self.log(format!("delete {name}"));
        if self.delete_fails {
            anyhow::bail!("virsh undefine failed: permission denied");
        }
        if self.instances.lock().expect("lock").remove(name) {
            Ok(TeardownStatus::Done)
        } else {
            Ok(TeardownStatus::AlreadyGone)
        }
    }

    async fn list_names(&self) -> Result<BTreeSet<String>> {
        Ok(self.instances.lock().expect("lock").clone())
    }

    async fn list_networks(&self) -> Result<Vec<String>> {
        Ok(vec!["default".to_string()])
    }
}

impl KeyGenerator for MockToolchain {
    async fn ensure_key(&self, private_key: &Path, comment: &str) -> Result<SshKeyPair> {
        let public_key = public_key_path(private_key);
        let (status, created) = if self.has_file(private_key) {
            (KeyStatus::Existing, Vec::new())
        } else {
            self.log(format!("keygen {} {comment}", private_key.display()));
            self.step(Step::Keygen)?;
            let mut files = self.files.lock().expect("lock");
            files.insert(private_key.to_path_buf());
            files.insert(public_key.clone());
            (
                KeyStatus::Created,
                vec![private_key.to_path_buf(), public_key.clone()],
            )
        };
        self.after(Step::Keygen);
        Ok(SshKeyPair {
            private_key: private_key.to_path_buf(),
            public_key,
            status,
            created,
        })
    }

    async fn read_public_key(&self, path: &Path) -> Result<String> {
        self.step(Step::ReadKey)?;
        if self.has_file(path) {
            Ok("ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIGV4aXN0aW5n me@laptop".to_string())
        } else {
            anyhow::bail!("reading public key {}: not found", path.display())
        }
    }
}

impl LocalFs for MockToolchain {
    fn exists(&self, path: &Path) -> bool {
        self.has_file(path) || self.has_dir(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.has_dir(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.dirs.lock().expect("lock").insert(path.to_path_buf());
        Ok(())
    }

    fn write(&self, path: &Path, _content: &str) -> Result<()> {
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
        anyhow::ensure!(self.has_dir(&parent), "{} does not exist", parent.display());
        self.files.lock().expect("lock").insert(path.to_path_buf());
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.log(format!("rm {}", path.display()));
        if self.undeletable.as_deref() == Some(path) {
            anyhow::bail!("permission denied");
        }
        self.files.lock().expect("lock").remove(path);
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.log(format!("rm -r {}", path.display()));
        self.dirs.lock().expect("lock").retain(|d| !d.starts_with(path));
        self.files.lock().expect("lock").retain(|f| !f.starts_with(path));
        Ok(())
    }
}

// ── Mock: confirmation ───────────────────────────────────────────────────────

/// Answers every confirmation with a fixed value and counts the asks.
pub struct FixedConfirmer {
    pub answer: bool,
    pub asked: AtomicUsize,
}

impl FixedConfirmer {
    pub fn yes() -> Self {
        Self {
            answer: true,
            asked: AtomicUsize::new(0),
        }
    }

    pub fn no() -> Self {
        Self {
            answer: false,
            asked: AtomicUsize::new(0),
        }
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

impl Confirmer for FixedConfirmer {
    async fn confirm_provision(&self, _cfg: &VmConfig) -> Result<bool> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer)
    }
}

/// Raises the abort flag and then waits forever, like a user staring at the
/// prompt when Ctrl+C arrives.
pub struct InterruptedConfirmer {
    pub trigger: AbortTrigger,
}

impl Confirmer for InterruptedConfirmer {
    async fn confirm_provision(&self, _cfg: &VmConfig) -> Result<bool> {
        self.trigger.trigger();
        std::future::pending().await
    }
}

// ── Mock: progress reporter ──────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingReporter {
    pub lines: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("lock").clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter_map(|l| l.strip_prefix("warn: ").map(str::to_owned))
            .collect()
    }
}

impl ProgressReporter for RecordingReporter {
    fn step(&self, message: &str) {
        self.lines.lock().expect("lock").push(format!("step: {message}"));
    }
    fn success(&self, message: &str) {
        self.lines
            .lock()
            .expect("lock")
            .push(format!("success: {message}"));
    }
    fn warn(&self, message: &str) {
        self.lines.lock().expect("lock").push(format!("warn: {message}"));
    }
}

// ── Mock: forwarding processes ───────────────────────────────────────────────

/// Shared switches for one scripted process.
#[derive(Default)]
pub struct ProcessControl {
    pub alive: AtomicBool,
    pub terminated: AtomicBool,
    pub killed: AtomicBool,
    /// Ignore SIGTERM so `stop` has to escalate.
    pub ignore_term: AtomicBool,
}

impl ProcessControl {
    pub fn exit(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

pub struct ScriptedProcess {
    pid: u32,
    control: Arc<ProcessControl>,
    stderr: String,
}

impl ChannelProcess for ScriptedProcess {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn is_alive(&mut self) -> bool {
        self.control.is_alive()
    }

    async fn diagnostics(&mut self) -> String {
        self.stderr.clone()
    }

    fn terminate(&mut self) -> Result<()> {
        self.control.terminated.store(true, Ordering::SeqCst);
        if !self.control.ignore_term.load(Ordering::SeqCst) {
            self.control.exit();
        }
        Ok(())
    }

    async fn kill(&mut self) -> Result<()> {
        self.control.killed.store(true, Ordering::SeqCst);
        self.control.exit();
        Ok(())
    }

    async fn wait_exit(&mut self, _timeout: Duration) -> bool {
        !self.control.is_alive()
    }
}

/// Launches scripted processes and keeps a handle to each one, per channel.
#[derive(Default)]
pub struct ScriptedLauncher {
    /// Every launch, as `(channel index, control)`, in launch order.
    pub launched: Mutex<Vec<(usize, Arc<ProcessControl>)>>,
    /// Channels whose processes exit immediately with this stderr.
    pub dead_on_arrival: Vec<(u16, String)>,
    /// Channels that cannot be spawned at all.
    pub unspawnable: Vec<u16>,
    /// Channel local ports in supervisor order, to map specs to indices.
    pub ports: Vec<u16>,
    next_pid: AtomicUsize,
}

impl ScriptedLauncher {
    pub fn for_specs(specs: &[ChannelSpec]) -> Self {
        Self {
            ports: specs.iter().map(|s| s.local_port).collect(),
            ..Self::default()
        }
    }

    /// Processes for the channel on `port` exit immediately with `stderr`.
    pub fn with_dead_on_arrival(mut self, port: u16, stderr: &str) -> Self {
        self.dead_on_arrival.push((port, stderr.to_string()));
        self
    }

    /// The channel on `port` cannot be spawned at all.
    pub fn with_unspawnable(mut self, port: u16) -> Self {
        self.unspawnable.push(port);
        self
    }

    /// Launch count per channel index.
    pub fn launch_counts(&self) -> Vec<usize> {
        let launched = self.launched.lock().expect("lock");
        (0..self.ports.len())
            .map(|i| launched.iter().filter(|(idx, _)| *idx == i).count())
            .collect()
    }

    /// Control of the most recent process for channel `index`.
    pub fn latest(&self, index: usize) -> Arc<ProcessControl> {
        self.launched
            .lock()
            .expect("lock")
            .iter()
            .rev()
            .find(|(i, _)| *i == index)
            .map(|(_, c)| Arc::clone(c))
            .expect("channel was launched")
    }

    pub fn all(&self) -> Vec<Arc<ProcessControl>> {
        self.launched
            .lock()
            .expect("lock")
            .iter()
            .map(|(_, c)| Arc::clone(c))
            .collect()
    }
}

impl ForwardLauncher for ScriptedLauncher {
    type Process = ScriptedProcess;

    fn launch(&self, spec: &ChannelSpec) -> Result<ScriptedProcess> {
        if self.unspawnable.contains(&spec.local_port) {
            anyhow::bail!("kubectl: command not found");
        }
        let index = self
            .ports
            .iter()
            .position(|p| *p == spec.local_port)
            .expect("known channel");
        let stderr = self
            .dead_on_arrival
            .iter()
            .find(|(port, _)| *port == spec.local_port)
            .map(|(_, msg)| msg.clone());
        let control = Arc::new(ProcessControl::default());
        control.alive.store(stderr.is_none(), Ordering::SeqCst);
        self.launched
            .lock()
            .expect("lock")
            .push((index, Arc::clone(&control)));
        let pid = u32::try_from(self.next_pid.fetch_add(1, Ordering::SeqCst)).expect("pid") + 1000;
        Ok(ScriptedProcess {
            pid,
            control,
            stderr: stderr.unwrap_or_default(),
        })
    }
}
