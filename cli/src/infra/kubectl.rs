//! Infrastructure implementation of the forwarding ports with
//! `kubectl port-forward`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use kvmkit_common::ChannelSpec;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::application::ports::{ChannelProcess, CommandRunner, ForwardLauncher};
use crate::infra::command_runner::{DEFAULT_CMD_TIMEOUT, TokioCommandRunner};

/// Lines of stderr kept per process for diagnostics.
pub const STDERR_TAIL_LINES: usize = 20;

/// How long `diagnostics` waits for the stderr reader to reach EOF.
const DRAIN_WAIT: Duration = Duration::from_millis(200);

/// `kubectl port-forward pod/<name> <local>:<remote> -n <namespace>`.
#[must_use]
pub fn port_forward_args(spec: &ChannelSpec) -> Vec<String> {
    vec![
        "port-forward".to_string(),
        spec.target(),
        spec.port_mapping(),
        "-n".to_string(),
        spec.namespace.clone(),
    ]
}

/// Launches one `kubectl port-forward` per channel.
pub struct KubectlForwardLauncher<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> KubectlForwardLauncher<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl KubectlForwardLauncher<TokioCommandRunner> {
    /// Convenience constructor for production use.
    #[must_use]
    pub fn default_runner() -> Self {
        Self::new(TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT))
    }
}

impl<R: CommandRunner> ForwardLauncher for KubectlForwardLauncher<R> {
    type Process = KubectlProcess;

    fn launch(&self, spec: &ChannelSpec) -> Result<KubectlProcess> {
        let args = port_forward_args(spec);
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        let child = self
            .runner
            .spawn("kubectl", &argv)
            .with_context(|| format!("starting port-forward for {spec}"))?;
        debug!(channel = %spec, pid = ?child.id(), "port-forward spawned");
        Ok(KubectlProcess::new(child))
    }
}

/// A running `kubectl port-forward` with its stderr tail.
pub struct KubectlProcess {
    child: Child,
    pid: Option<u32>,
    tail: Arc<Mutex<VecDeque<String>>>,
    drain: Option<JoinHandle<()>>,
}

impl KubectlProcess {
    /// Wrap `child`, draining its stderr (if piped) into a bounded buffer.
    #[must_use]
    pub fn new(mut child: Child) -> Self {
        let pid = child.id();
        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let drain = child.stderr.take().map(|stderr| {
            let tail = Arc::clone(&tail);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    trace!(line = %line, "port-forward stderr");
                    push_bounded(&tail, line);
                }
            })
        });
        Self {
            child,
            pid,
            tail,
            drain,
        }
    }
}

fn push_bounded(tail: &Mutex<VecDeque<String>>, line: String) {
    if let Ok(mut buf) = tail.lock() {
        if buf.len() == STDERR_TAIL_LINES {
            buf.pop_front();
        }
        buf.push_back(line);
    }
}

impl ChannelProcess for KubectlProcess {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn diagnostics(&mut self) -> String {
        if let Some(drain) = self.drain.take() {
            let _ = tokio::time::timeout(DRAIN_WAIT, drain).await;
        }
        let status = self
            .child
            .try_wait()
            .ok()
            .flatten()
            .map(|s| format!("({s}) "))
            .unwrap_or_default();
        let tail = self
            .tail
            .lock()
            .map(|buf| buf.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default();
        format!("{status}{tail}").trim().to_string()
    }

    fn terminate(&mut self) -> Result<()> {
        if !self.is_alive() {
            return Ok(());
        }
        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            let Some(pid) = self.pid else {
                return Ok(());
            };
            let pid = i32::try_from(pid).context("pid out of range")?;
            match kill(Pid::from_raw(pid), Signal::SIGTERM) {
                Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
                Err(e) => Err(anyhow::anyhow!("sending SIGTERM to {pid}: {e}")),
            }
        }
        #[cfg(not(unix))]
        {
            self.child.start_kill().context("terminating port-forward")
        }
    }

    async fn kill(&mut self) -> Result<()> {
        self.child.kill().await.context("killing port-forward")
    }

    async fn wait_exit(&mut self, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, self.child.wait()).await,
            Ok(Ok(_))
        )
    }
}
