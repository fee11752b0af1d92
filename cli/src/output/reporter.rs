//! `TerminalReporter`: Presentation-layer implementation of `ProgressReporter`.
//!
//! Wraps `&OutputContext` and implements the `application::ports::ProgressReporter`
//! trait so application services can emit progress events without depending on
//! any presentation type directly.

use indicatif::ProgressBar;
use owo_colors::OwoColorize as _;

use crate::application::ports::ProgressReporter;
use crate::output::OutputContext;

/// Terminal progress reporter that wraps an `OutputContext`.
///
/// - `step()` prints `"  → {message}"` (suppressed when `ctx.quiet`)
/// - `success()` prints `"  ✓ {message}"` (suppressed when `ctx.quiet`)
/// - `warn()` prints `"  ! {message}"` (never suppressed; goes to stderr)
///
/// While a spinner is attached, lines are printed above it.
pub struct TerminalReporter<'a> {
    ctx: &'a OutputContext,
    spinner: Option<ProgressBar>,
}

impl<'a> TerminalReporter<'a> {
    /// Create a new `TerminalReporter` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx, spinner: None }
    }

    /// Route output above `spinner` until it is detached.
    #[must_use]
    pub fn with_spinner(ctx: &'a OutputContext, spinner: ProgressBar) -> Self {
        Self {
            ctx,
            spinner: Some(spinner),
        }
    }

    fn emit(&self, line: String) {
        match &self.spinner {
            Some(pb) if !pb.is_hidden() => pb.println(line),
            _ => println!("{line}"),
        }
    }
}

impl ProgressReporter for TerminalReporter<'_> {
    fn step(&self, message: &str) {
        if !self.ctx.quiet {
            self.emit(format!("  {} {message}", "→".style(self.ctx.styles.step)));
        }
    }

    fn success(&self, message: &str) {
        if !self.ctx.quiet {
            self.emit(format!("  {} {message}", "✓".style(self.ctx.styles.ok)));
        }
    }

    fn warn(&self, message: &str) {
        let line = format!("  {} {message}", "!".style(self.ctx.styles.caution));
        match &self.spinner {
            Some(pb) if !pb.is_hidden() => pb.suspend(|| eprintln!("{line}")),
            _ => eprintln!("{line}"),
        }
    }
}
