//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use std::path::PathBuf;

use thiserror::Error;

// ── Provisioning errors ───────────────────────────────────────────────────────

/// Reasons a provisioning run stops before commit. Every variant routes
/// through rollback.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Base image not found: {}\n\nDownload it first: kvmkit download <image>", .path.display())]
    MissingBaseImage { path: PathBuf },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("{tool} failed{}: {}", exit_suffix(.code), stderr_summary(.stderr))]
    ExternalToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Cancelled by user.")]
    UserAborted,

    #[error("Interrupted by termination signal.")]
    SignalInterrupted,
}

impl ProvisionError {
    /// Stable short code used in JSON output.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingBaseImage { .. } | Self::PreconditionFailed(_) => "precondition_failed",
            Self::ExternalToolFailed { .. } => "external_tool_failed",
            Self::UserAborted => "user_aborted",
            Self::SignalInterrupted => "signal_interrupted",
        }
    }

    /// Build an `ExternalToolFailed` from raw process output.
    #[must_use]
    pub fn tool_failed(tool: &str, code: Option<i32>, stderr: &[u8]) -> Self {
        Self::ExternalToolFailed {
            tool: tool.to_string(),
            code,
            stderr: String::from_utf8_lossy(stderr).trim().to_string(),
        }
    }
}

#[allow(clippy::ref_option)] // called from the thiserror attribute with a field reference
fn exit_suffix(code: &Option<i32>) -> String {
    code.map_or_else(
        || " (terminated by signal)".to_string(),
        |c| format!(" (exit code {c})"),
    )
}

fn stderr_summary(stderr: &str) -> &str {
    if stderr.is_empty() {
        "no diagnostic output"
    } else {
        stderr
    }
}

// ── Transaction errors ────────────────────────────────────────────────────────

/// Misuse of a provisioning transaction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("transaction already owns managed entity '{existing}', refusing to track '{requested}'")]
    ManagedEntityAlreadySet { existing: String, requested: String },
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors from validating a VM configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid VM name '{0}': must match ^[a-zA-Z0-9][a-zA-Z0-9_.-]{{0,62}}$")]
    InvalidVmName(String),

    #[error("Invalid hostname '{0}': must be a valid RFC 1123 host label")]
    InvalidHostname(String),

    #[error("Invalid username '{0}': must match ^[a-z_][a-z0-9_-]{{0,31}}$")]
    InvalidUsername(String),

    #[error("Invalid disk size '{0}': expected a number with optional K/M/G/T suffix, e.g. 20G")]
    InvalidDiskSize(String),

    #[error("Invalid {field}: {value} (must be between {min} and {max})")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("Invalid DNS server '{0}': expected an IP address")]
    InvalidDnsServer(String),

    #[error("Custom DNS mode requires at least one --dns-server")]
    MissingDnsServers,

    #[error("Password must not be empty")]
    EmptyPassword,

    #[error("Invalid network name '{0}'")]
    InvalidNetwork(String),
}
