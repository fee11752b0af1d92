//! `kvmkit config`: inspect and initialise the settings file.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::app::AppContext;
use crate::application::ports::ConfigStore;
use crate::domain::KvmkitConfig;
use crate::infra::config::YamlConfigStore;

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,
    /// Print the settings file location
    Path,
    /// Write a settings file populated with the defaults
    Init {
        /// Overwrite an existing settings file
        #[arg(long)]
        force: bool,
    },
}

/// Run the config command.
///
/// # Errors
///
/// Returns an error if the settings path cannot be determined, or if
/// `init` would overwrite a file without `--force`.
pub fn run(app: &AppContext, cmd: &ConfigCommand) -> Result<ExitCode> {
    match cmd {
        ConfigCommand::Show => show_config(app),
        ConfigCommand::Path => {
            let path = YamlConfigStore.path()?;
            if app.is_json() {
                crate::output::json::print(&serde_json::json!({ "path": path }))?;
            } else {
                println!("{}", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        ConfigCommand::Init { force } => init_config(app, &YamlConfigStore, *force),
    }
}

fn init_config(app: &AppContext, store: &impl ConfigStore, force: bool) -> Result<ExitCode> {
    let path = store.path()?;
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    let mut config = KvmkitConfig::default();
    config.forward.channels = config.forward.effective_channels();
    store.save(&config)?;
    if app.is_json() {
        crate::output::json::print(&serde_json::json!({ "path": path }))?;
    } else {
        app.output.success(&format!("Wrote {}", path.display()));
    }
    Ok(ExitCode::SUCCESS)
}

fn show_config(app: &AppContext) -> Result<ExitCode> {
    let mut effective = app.config.clone();
    effective.base_dir = Some(app.layout.base_dir().to_path_buf());
    effective.forward.channels = app.config.forward.effective_channels();
    if app.is_json() {
        crate::output::json::print(&effective)?;
    } else {
        let yaml = serde_yaml::to_string(&effective).context("cannot serialize config")?;
        print!("{yaml}");
    }
    Ok(ExitCode::SUCCESS)
}
