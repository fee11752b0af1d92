//! Application service: self-healing port-forward supervisor.
//!
//! Owns one forwarding process per [`ChannelSpec`], polls liveness and
//! relaunches dead channels with no backoff and no retry limit. Nothing
//! else may launch, signal or reap these processes.

use std::time::Duration;

use kvmkit_common::ChannelSpec;
use tracing::{debug, info, warn};

use crate::application::abort::AbortSignal;
use crate::application::ports::{ChannelProcess, ForwardLauncher, ProgressReporter};
use crate::domain::config::ForwardConfig;

/// Supervisor lifecycle. Restarts only happen while `Monitoring`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Monitoring,
    Stopping,
    Stopped,
}

/// Settle, poll and stop-grace intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorTiming {
    pub settle: Duration,
    pub poll: Duration,
    pub stop_grace: Duration,
}

impl Default for SupervisorTiming {
    fn default() -> Self {
        Self::from(&ForwardConfig::default())
    }
}

impl From<&ForwardConfig> for SupervisorTiming {
    fn from(cfg: &ForwardConfig) -> Self {
        Self {
            settle: Duration::from_millis(cfg.settle_ms),
            poll: Duration::from_millis(cfg.poll_ms),
            stop_grace: Duration::from_millis(cfg.stop_grace_ms),
        }
    }
}

/// Start-up classification of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    Up,
    FailedToStart(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReport {
    pub spec: ChannelSpec,
    pub status: ChannelStatus,
}

/// A spec paired with its current process. The process is replaced, never
/// mutated, on restart; `None` means the last launch attempt failed.
struct SupervisedProcess<P> {
    spec: ChannelSpec,
    process: Option<P>,
    restarts: u64,
}

pub struct ChannelSupervisor<'a, L: ForwardLauncher, R> {
    launcher: &'a L,
    reporter: &'a R,
    timing: SupervisorTiming,
    state: SupervisorState,
    slots: Vec<SupervisedProcess<L::Process>>,
}

impl<'a, L, R> ChannelSupervisor<'a, L, R>
where
    L: ForwardLauncher,
    R: ProgressReporter,
{
    pub fn new(
        launcher: &'a L,
        reporter: &'a R,
        specs: Vec<ChannelSpec>,
        timing: SupervisorTiming,
    ) -> Self {
        let slots = specs
            .into_iter()
            .map(|spec| SupervisedProcess {
                spec,
                process: None,
                restarts: 0,
            })
            .collect();
        Self {
            launcher,
            reporter,
            timing,
            state: SupervisorState::Starting,
            slots,
        }
    }

    #[must_use]
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Number of supervised channels. Constant for the supervisor's life.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// How many times channel `index` has been relaunched after start-up.
    #[must_use]
    pub fn restarts(&self, index: usize) -> u64 {
        self.slots.get(index).map_or(0, |s| s.restarts)
    }

    /// Launch every channel once, waiting the settle interval after each.
    /// A channel that fails to start does not stop the others. An abort
    /// cuts the settle wait short and leaves later channels unlaunched.
    pub async fn start(&mut self, abort: &AbortSignal) -> Vec<ChannelReport> {
        if self.state != SupervisorState::Starting {
            return Vec::new();
        }
        let mut reports = Vec::with_capacity(self.slots.len());
        for slot in &mut self.slots {
            if abort.is_requested() {
                info!(launched = reports.len(), "abort during start-up");
                break;
            }
            let status = match self.launcher.launch(&slot.spec) {
                Ok(process) => {
                    slot.process = Some(process);
                    tokio::select! {
                        () = tokio::time::sleep(self.timing.settle) => {}
                        () = abort.requested() => {}
                    }
                    classify(slot).await
                }
                Err(e) => ChannelStatus::FailedToStart(format!("{e:#}")),
            };
            match &status {
                ChannelStatus::Up => {
                    info!(channel = %slot.spec, "channel up");
                    self.reporter.success(&format!(
                        "{} forwarding on localhost:{}",
                        slot.spec.service_label(),
                        slot.spec.local_port
                    ));
                }
                ChannelStatus::FailedToStart(reason) => {
                    warn!(channel = %slot.spec, error = %reason, "channel failed to start");
                    self.reporter
                        .warn(&format!("{} failed to start: {reason}", slot.spec));
                }
            }
            reports.push(ChannelReport {
                spec: slot.spec.clone(),
                status,
            });
        }
        self.state = SupervisorState::Monitoring;
        reports
    }

    /// One liveness pass. Relaunches every channel whose process exited
    /// (or never launched) and returns the indices that were relaunched.
    pub async fn tick(&mut self) -> Vec<usize> {
        if self.state != SupervisorState::Monitoring {
            return Vec::new();
        }
        let mut restarted = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let diagnostics = match slot.process.as_mut() {
                Some(process) => {
                    if process.is_alive() {
                        continue;
                    }
                    process.diagnostics().await
                }
                None => String::new(),
            };
            warn!(channel = %slot.spec, diagnostics = %diagnostics, "channel down, restarting");
            if diagnostics.is_empty() {
                self.reporter
                    .warn(&format!("{} is down, restarting", slot.spec));
            } else {
                self.reporter.warn(&format!(
                    "{} exited, restarting: {}",
                    slot.spec,
                    diagnostics.trim()
                ));
            }

            slot.process = None;
            slot.restarts += 1;
            restarted.push(index);
            match self.launcher.launch(&slot.spec) {
                Ok(process) => {
                    slot.process = Some(process);
                    tokio::time::sleep(self.timing.settle).await;
                    debug!(channel = %slot.spec, restarts = slot.restarts, "channel relaunched");
                }
                Err(e) => {
                    warn!(channel = %slot.spec, error = %format!("{e:#}"), "relaunch failed");
                }
            }
        }
        restarted
    }

    /// Start (if needed), monitor until `abort` is raised, then stop.
    pub async fn run(&mut self, abort: &AbortSignal) {
        if self.state == SupervisorState::Starting {
            self.start(abort).await;
        }
        while self.state == SupervisorState::Monitoring && !abort.is_requested() {
            tokio::select! {
                () = tokio::time::sleep(self.timing.poll) => {}
                () = abort.requested() => break,
            }
            if abort.is_requested() {
                break;
            }
            self.tick().await;
        }
        self.stop().await;
    }

    /// Terminate every process: SIGTERM, bounded wait, then kill. Runs once;
    /// later calls are no-ops.
    pub async fn stop(&mut self) {
        if matches!(
            self.state,
            SupervisorState::Stopping | SupervisorState::Stopped
        ) {
            return;
        }
        self.state = SupervisorState::Stopping;
        info!(channels = self.slots.len(), "stopping channels");
        for slot in &mut self.slots {
            let Some(mut process) = slot.process.take() else {
                continue;
            };
            if !process.is_alive() {
                continue;
            }
            if let Err(e) = process.terminate() {
                warn!(channel = %slot.spec, error = %format!("{e:#}"), "terminate failed");
            }
            if !process.wait_exit(self.timing.stop_grace).await {
                debug!(channel = %slot.spec, "grace period elapsed, killing");
                if let Err(e) = process.kill().await {
                    warn!(channel = %slot.spec, error = %format!("{e:#}"), "kill failed");
                    self.reporter
                        .warn(&format!("could not stop {}: {e}", slot.spec));
                }
            }
        }
        self.state = SupervisorState::Stopped;
    }
}

async fn classify<P: ChannelProcess>(slot: &mut SupervisedProcess<P>) -> ChannelStatus {
    match slot.process.as_mut() {
        Some(process) => {
            if process.is_alive() {
                return ChannelStatus::Up;
            }
            let diagnostics = process.diagnostics().await;
            let reason = if diagnostics.trim().is_empty() {
                "exited immediately".to_string()
            } else {
                diagnostics.trim().to_string()
            };
            ChannelStatus::FailedToStart(reason)
        }
        None => ChannelStatus::FailedToStart("not launched".to_string()),
    }
}
