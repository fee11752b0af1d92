//! Application context: unified state passed to every command handler.
//!
//! Built once in `Cli::run()` from the global flags, the settings file and
//! the installed signal listener.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::application::abort::AbortSignal;
use crate::application::ports::{ConfigStore, Confirmer};
use crate::domain::{KvmLayout, KvmkitConfig, ProvisionError, VmConfig};
use crate::infra::config::{YamlConfigStore, resolve_base_dir};
use crate::output::{HumanRenderer, OutputContext};

/// Environment variable that, like `CI`, disables interactive prompts.
pub const YES_ENV: &str = "KVMKIT_YES";

/// Ctrl-C inside a raw-mode prompt arrives as an interrupted read, not SIGINT.
fn prompt_failure(err: dialoguer::Error) -> anyhow::Error {
    let err = std::io::Error::from(err);
    if err.kind() == std::io::ErrorKind::Interrupted {
        ProvisionError::SignalInterrupted.into()
    } else {
        anyhow::Error::new(err).context("prompt failed")
    }
}

/// Output rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable terminal output (default).
    Human,
    /// Machine-readable JSON output.
    Json,
}

/// Output rendering flags.
pub struct OutputFlags {
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
    /// Enable JSON output mode.
    pub json: bool,
}

/// Behaviour flags.
pub struct BehaviourFlags {
    /// Skip interactive prompts (also set by `CI` / `KVMKIT_YES` env vars).
    pub yes: bool,
    /// `--base-dir` override.
    pub base_dir: Option<PathBuf>,
}

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct AppFlags {
    /// Output rendering options.
    pub output: OutputFlags,
    /// Behaviour options.
    pub behaviour: BehaviourFlags,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// Output rendering mode (human vs JSON).
    pub mode: OutputMode,
    /// Effective settings.
    pub config: KvmkitConfig,
    /// Resolved directory structure.
    pub layout: KvmLayout,
    /// Raised by SIGINT/SIGTERM.
    pub abort: AbortSignal,
    /// When `true`, skip interactive prompts and use defaults.
    ///
    /// Set when `--yes` / `-y` is passed, or when the `CI` or `KVMKIT_YES`
    /// environment variables are present.
    pub non_interactive: bool,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file is unreadable or no base
    /// directory can be determined.
    pub fn new(flags: AppFlags, abort: AbortSignal) -> Result<Self> {
        let config = YamlConfigStore.load()?;
        Self::with_config(flags, config, abort)
    }

    /// Like [`AppContext::new`] with an already loaded config.
    ///
    /// # Errors
    ///
    /// Returns an error if no base directory can be determined.
    pub fn with_config(flags: AppFlags, config: KvmkitConfig, abort: AbortSignal) -> Result<Self> {
        let ci_env = std::env::var_os("CI").is_some() || std::env::var_os(YES_ENV).is_some();
        let non_interactive = flags.behaviour.yes || ci_env;

        let mode = if flags.output.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        };
        let base_dir = resolve_base_dir(flags.behaviour.base_dir, &config)?;

        Ok(Self {
            // JSON mode keeps stdout for the final document.
            output: OutputContext::new(
                flags.output.no_color,
                flags.output.quiet || flags.output.json,
            ),
            mode,
            layout: KvmLayout::new(base_dir),
            config,
            abort,
            non_interactive,
        })
    }

    /// Returns `true` when JSON output mode is active.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    /// Human renderer over this context's output.
    #[must_use]
    pub fn human(&self) -> HumanRenderer<'_> {
        HumanRenderer::new(&self.output)
    }

    /// Whether spinners and bars should be drawn.
    #[must_use]
    pub fn show_progress(&self) -> bool {
        self.output.show_progress() && !self.is_json()
    }

    /// Ask the user for confirmation.
    ///
    /// When `non_interactive` is `true` (CI, `--yes` flag, or `KVMKIT_YES`
    /// env), returns `default` immediately without prompting.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails (e.g. no TTY available).
    pub fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if self.non_interactive {
            return Ok(default);
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()
            .map_err(prompt_failure)?;
        Ok(confirmed)
    }

    /// Prompt for a line of text, pre-filled with `default`.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails.
    pub fn input(&self, prompt: &str, default: &str) -> Result<String> {
        if self.non_interactive {
            return Ok(default.to_string());
        }
        let value: String = dialoguer::Input::new()
            .with_prompt(prompt)
            .default(default.to_string())
            .interact_text()
            .map_err(prompt_failure)?;
        Ok(value.trim().to_string())
    }

    /// Prompt for a secret. An empty answer keeps `default`.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails.
    pub fn password(&self, prompt: &str, default: &str) -> Result<String> {
        if self.non_interactive {
            return Ok(default.to_string());
        }
        let value = dialoguer::Password::new()
            .with_prompt(format!("{prompt} [{default}]"))
            .allow_empty_password(true)
            .interact()
            .map_err(prompt_failure)?;
        Ok(if value.is_empty() {
            default.to_string()
        } else {
            value
        })
    }

    /// Pick one of `items`; returns its index.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails.
    pub fn select(&self, prompt: &str, items: &[String], default: usize) -> Result<usize> {
        if self.non_interactive {
            return Ok(default);
        }
        let index = dialoguer::Select::new()
            .with_prompt(prompt)
            .items(items)
            .default(default)
            .interact()
            .map_err(prompt_failure)?;
        Ok(index)
    }
}

impl Confirmer for AppContext {
    async fn confirm_provision(&self, cfg: &VmConfig) -> Result<bool> {
        if !self.is_json() {
            self.human().render_plan(cfg);
        }
        if self.non_interactive {
            return Ok(true);
        }
        // Blocking terminal read; run it off the runtime so the abort
        // signal can still win the race.
        tokio::task::spawn_blocking(|| {
            dialoguer::Confirm::new()
                .with_prompt("Create VM?")
                .default(true)
                .interact()
        })
        .await
        .context("confirmation prompt task failed")?
        .map_err(prompt_failure)
    }
}
