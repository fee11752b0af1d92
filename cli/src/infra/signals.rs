//! Termination signal listener.
//!
//! Signals never touch provisioning or supervisor state. The listener task
//! only raises the [`AbortSignal`]; the owner of the resources notices it at
//! its next safe point.

use anyhow::Result;
use tracing::{info, warn};

use crate::application::abort::{AbortSignal, AbortTrigger, abort_pair};

/// Register SIGINT/SIGTERM handlers and return the signal they raise.
///
/// Must be called from inside a tokio runtime. The first signal raises the
/// flag; repeats are logged and ignored so teardown runs once.
///
/// # Errors
///
/// Returns an error if the OS handlers cannot be registered.
pub fn install() -> Result<AbortSignal> {
    let (trigger, signal) = abort_pair();
    spawn_listener(trigger)?;
    Ok(signal)
}

#[cfg(unix)]
fn spawn_listener(trigger: AbortTrigger) -> Result<()> {
    use anyhow::Context;
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("registering SIGINT handler")?;
    tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                Some(()) = sigterm.recv() => "SIGTERM",
                Some(()) = sigint.recv() => "SIGINT",
                else => break,
            };
            raise(&trigger, name);
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn spawn_listener(trigger: AbortTrigger) -> Result<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            raise(&trigger, "ctrl-c");
        }
    });
    Ok(())
}

fn raise(trigger: &AbortTrigger, name: &str) {
    if trigger.trigger() {
        info!(signal = name, "termination requested");
    } else {
        warn!(signal = name, "termination already in progress, ignoring repeat signal");
    }
}
