//! CLI argument parsing with clap derive

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::{AppContext, AppFlags, BehaviourFlags, OutputFlags};
use crate::application::abort::AbortSignal;
use crate::commands;

/// cloud-init VMs with rollback-safe provisioning, and a self-healing
/// port-forward supervisor
#[derive(Parser)]
#[command(
    name = "kvmkit",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Root of the images/vms/seeds/keys tree [default: ~/.kvm]
    #[arg(long, global = true, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Answer yes to every prompt and take defaults
    #[arg(short, long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the kvmkit directory structure
    Setup,

    /// List base images and whether they are downloaded
    Images,

    /// Download a base image
    Download(commands::download::DownloadArgs),

    /// Create a VM (prompts for anything not given on the command line)
    Create(Box<commands::create::CreateArgs>),

    /// Keep port-forwards alive until interrupted
    Forward(commands::forward::ForwardArgs),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self, abort: AbortSignal) -> Result<ExitCode> {
        let Cli {
            base_dir,
            json,
            quiet,
            no_color,
            yes,
            command,
            ..
        } = self;

        if let Command::Version = command {
            return commands::version::run(json);
        }

        let flags = AppFlags {
            output: OutputFlags {
                no_color,
                quiet,
                json,
            },
            behaviour: BehaviourFlags { yes, base_dir },
        };
        let app = AppContext::new(flags, abort)?;

        match command {
            Command::Setup => commands::setup::run(&app),
            Command::Images => commands::images::run(&app),
            Command::Download(args) => commands::download::run(&app, &args).await,
            Command::Create(args) => commands::create::run(&app, *args).await,
            Command::Forward(args) => commands::forward::run(&app, &args).await,
            Command::Config(cmd) => commands::config::run(&app, &cmd),
            Command::Version => commands::version::run(json),
        }
    }
}
