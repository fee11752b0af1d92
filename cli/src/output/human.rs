//! Human-readable terminal renderer.

use owo_colors::OwoColorize as _;

use crate::application::services::images::{DownloadOutcome, ImageEntry};
use crate::application::services::provision::ProvisionOutcome;
use crate::application::services::supervisor::{ChannelReport, ChannelStatus};
use crate::domain::{RollbackReport, UndoOutcome, VmConfig};
use crate::output::OutputContext;

/// Renders results as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Render the CLI version information.
    pub fn render_version(&self, version: &str) {
        self.ctx.info(&format!("kvmkit v{version}"));
    }

    /// Render the image catalog with cache status.
    pub fn render_images(&self, images: &[ImageEntry]) {
        self.ctx.header("Available images:");
        for (i, image) in images.iter().enumerate() {
            let status = if image.downloaded {
                format!("{}", "downloaded".style(self.ctx.styles.ok))
            } else {
                format!("{}", "not downloaded".style(self.ctx.styles.muted))
            };
            if !self.ctx.quiet {
                println!("  {}. {:<14} {status}", i + 1, image.name);
            }
        }
    }

    pub fn render_download(&self, outcome: &DownloadOutcome) {
        if outcome.already_present {
            self.ctx.info("Image was already cached; nothing downloaded.");
        }
        self.ctx.kv("Path:", &outcome.path.display().to_string());
    }

    /// Configuration summary shown before the confirmation prompt.
    pub fn render_plan(&self, cfg: &VmConfig) {
        if self.ctx.quiet {
            return;
        }
        println!();
        self.ctx.header("Configuration summary:");
        self.ctx.kv("VM name:   ", &cfg.name);
        self.ctx.kv("Hostname:  ", &cfg.hostname);
        self.ctx.kv("Base image:", cfg.base_image.name());
        self.ctx.kv(
            "Resources: ",
            &format!(
                "{}MB RAM, {} vCPUs, {} disk",
                cfg.memory_mb, cfg.vcpus, cfg.disk_size
            ),
        );
        self.ctx.kv("User:      ", &cfg.username);
        self.ctx.kv("Network:   ", &cfg.network);
        println!();
    }

    /// Render a committed provisioning run.
    pub fn render_provisioned(&self, outcome: &ProvisionOutcome) {
        if self.ctx.quiet {
            return;
        }
        println!();
        self.ctx.success(&format!("VM '{}' created successfully", outcome.name));
        self.ctx.kv("Disk:", &outcome.disk.display().to_string());
        self.ctx.kv("Seed:", &outcome.seed.display().to_string());
        println!();
        let ssh = format!("ssh {}@<vm-ip>", outcome.username);
        self.ctx
            .info(&format!("Connect with: {}", ssh.style(self.ctx.styles.literal)));
        if let Some(key) = &outcome.private_key {
            let keyed = format!("ssh -i {} {}@<vm-ip>", key.display(), outcome.username);
            self.ctx
                .info(&format!("Using key:    {}", keyed.style(self.ctx.styles.literal)));
        }
        let lookup = format!("virsh domifaddr {}", outcome.name);
        self.ctx.info(&format!(
            "Find the address with: {}",
            lookup.style(self.ctx.styles.literal)
        ));
    }

    /// Summarize what a rollback did. Printed to stderr.
    pub fn render_rollback(&self, report: &RollbackReport) {
        if report.is_empty() {
            return;
        }
        let removed = report
            .records
            .iter()
            .filter(|r| r.outcome == UndoOutcome::Removed)
            .count();
        if report.failures() == 0 {
            eprintln!(
                "  {} rolled back {removed} resource(s)",
                "✓".style(self.ctx.styles.ok)
            );
        } else {
            self.ctx.error(&format!(
                "rollback incomplete: {} of {} undo step(s) failed; clean up manually",
                report.failures(),
                report.records.len()
            ));
            for record in report.records.iter().filter(|r| r.outcome.is_failure()) {
                eprintln!(
                    "      {}",
                    record.handle.to_string().style(self.ctx.styles.caution)
                );
            }
        }
    }

    /// Render the channel start-up summary.
    pub fn render_channels(&self, reports: &[ChannelReport]) {
        let up = reports
            .iter()
            .filter(|r| r.status == ChannelStatus::Up)
            .count();
        self.ctx.info(&format!(
            "{up}/{} channel(s) up; supervising (Ctrl+C to stop)",
            reports.len()
        ));
    }
}
