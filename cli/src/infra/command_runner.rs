//! Infrastructure implementation of the `CommandRunner` port.
//!
//! Every external tool kvmkit drives (`qemu-img`, `cloud-localds`,
//! `virt-install`, `virsh`, `ssh-keygen`, `kubectl`) starts here.

use std::process::{Output, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::application::ports::CommandRunner;

/// Default timeout for short tool calls (virsh, qemu-img, cloud-localds, ssh-keygen).
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for `virt-install`, which may wait on a sudo prompt and image import.
pub const LAUNCH_TIMEOUT: Duration = Duration::from_secs(600);

/// Production `CommandRunner` backed by `tokio::process`.
///
/// A tool that outlives its timeout is killed explicitly before the error is
/// returned, so a hung `virsh` or `virt-install` never outlives the run that
/// started it.
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// Read a pipe to EOF. A missing pipe or a read error yields what was read.
async fn drain<P: AsyncRead + Unpin>(pipe: Option<P>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    buf
}

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.run_with_timeout(program, args, self.timeout).await
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        debug!(program, ?args, timeout_s = timeout.as_secs(), "running");
        let started = Instant::now();
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let collected = async {
            let (status, stdout, stderr) = tokio::join!(child.wait(), drain(stdout), drain(stderr));
            (status, stdout, stderr)
        };

        let (status, stdout, stderr) = tokio::select! {
            collected = collected => collected,
            () = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                anyhow::bail!("{program} timed out after {}s", timeout.as_secs())
            }
        };
        let status = status.with_context(|| format!("waiting for {program}"))?;
        debug!(
            program,
            %status,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "finished"
        );
        Ok(Output {
            status,
            stdout,
            stderr,
        })
    }

    fn spawn(&self, program: &str, args: &[&str]) -> Result<tokio::process::Child> {
        debug!(program, ?args, "spawning");
        tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))
    }
}
