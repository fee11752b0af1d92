//! `kvmkit forward`: keep port-forwards alive until interrupted.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use kvmkit_common::{ChannelSpec, validate_channels};

use crate::app::AppContext;
use crate::application::services::supervisor::{
    ChannelStatus, ChannelSupervisor, SupervisorTiming,
};
use crate::infra::kubectl::KubectlForwardLauncher;
use crate::output::{TerminalReporter, progress};

/// Arguments for the forward command.
#[derive(Args)]
pub struct ForwardArgs {
    /// Channel as `namespace/pod:local:remote` (repeatable; default from config)
    #[arg(long = "channel", value_name = "SPEC")]
    pub channels: Vec<ChannelSpec>,
}

/// Run the forward command until SIGINT/SIGTERM.
///
/// # Errors
///
/// Returns an error if the channel list is invalid.
pub async fn run(app: &AppContext, args: &ForwardArgs) -> Result<ExitCode> {
    let specs = if args.channels.is_empty() {
        app.config.forward.effective_channels()
    } else {
        args.channels.clone()
    };
    validate_channels(&specs)?;

    let launcher = KubectlForwardLauncher::default_runner();
    let reporter = TerminalReporter::new(&app.output);
    let timing = SupervisorTiming::from(&app.config.forward);
    let mut supervisor = ChannelSupervisor::new(&launcher, &reporter, specs, timing);

    let pb = progress::spinner(
        &format!("starting {} port-forwards...", supervisor.len()),
        app.show_progress(),
    );
    let reports = supervisor.start(&app.abort).await;
    let up = reports
        .iter()
        .filter(|r| r.status == ChannelStatus::Up)
        .count();
    progress::finish_ok(&pb, &format!("{up}/{} port-forwards running", reports.len()));
    if !app.is_json() {
        app.human().render_channels(&reports);
    }
    supervisor.run(&app.abort).await;
    app.output.success("all port-forwards stopped");
    Ok(ExitCode::SUCCESS)
}
