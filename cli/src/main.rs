//! kvmkit - cloud-init VMs with rollback-safe provisioning

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use kvmkit_cli::cli::Cli;
use kvmkit_cli::domain::ProvisionError;
use kvmkit_cli::infra::signals;
use kvmkit_cli::output::{OutputContext, json};

/// Exit status after SIGINT/SIGTERM, as shells report it.
const EXIT_SIGNAL: i32 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let (json_mode, no_color) = (cli.json, cli.no_color);

    let result = match signals::install() {
        Ok(abort) => cli.run(abort).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            let code = report_error(&e, json_mode, no_color);
            // Exit without waiting on a prompt thread that may still be
            // blocked reading the terminal.
            std::process::exit(code);
        }
    }
}

/// `KVMKIT_LOG` (or `RUST_LOG`) wins over `-v`; the default is warnings only.
fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = std::env::var("KVMKIT_LOG")
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn report_error(e: &anyhow::Error, json_mode: bool, no_color: bool) -> i32 {
    let typed = e.downcast_ref::<ProvisionError>();
    if json_mode {
        let code = typed.map_or("error", ProvisionError::code);
        match json::format_error(&format!("{e:#}"), code) {
            Ok(out) => println!("{out}"),
            Err(_) => eprintln!("Error: {e:#}"),
        }
    } else {
        OutputContext::new(no_color, false).error(&format!("Error: {e:#}"));
    }
    match typed {
        Some(ProvisionError::SignalInterrupted) => EXIT_SIGNAL,
        _ => 1,
    }
}
