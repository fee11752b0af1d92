//! Forwarding channel descriptions.
//!
//! A [`ChannelSpec`] names one remote endpoint (namespace + pod name) and the
//! local/remote port pair a forwarding process should bridge. The textual
//! form accepted on the command line is `namespace/name:local:remote`.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length of a namespace or endpoint name (DNS-1123 label/subdomain).
const MAX_NAME_LEN: usize = 253;

/// Static description of one forwarding channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelSpec {
    /// Namespace the remote endpoint lives in.
    pub namespace: String,
    /// Name of the remote endpoint (pod).
    pub name: String,
    /// Port bound on the local host.
    pub local_port: u16,
    /// Port on the remote endpoint.
    pub remote_port: u16,
}

/// Errors produced when parsing or validating a [`ChannelSpec`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelSpecError {
    #[error("malformed channel '{0}': expected namespace/name:local_port:remote_port")]
    Malformed(String),

    #[error("channel {field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("invalid channel {field} '{value}': use lowercase letters, digits, '-' and '.'")]
    InvalidName { field: &'static str, value: String },

    #[error("invalid port '{0}': must be a number between 1 and 65535")]
    InvalidPort(String),

    #[error("local port {0} is used by more than one channel")]
    DuplicateLocalPort(u16),
}

impl ChannelSpec {
    /// Build and validate a channel spec.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        local_port: u16,
        remote_port: u16,
    ) -> Result<Self, ChannelSpecError> {
        let spec = Self {
            namespace: namespace.into(),
            name: name.into(),
            local_port,
            remote_port,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Check every field. Specs loaded from config files go through here
    /// before the supervisor accepts them.
    pub fn validate(&self) -> Result<(), ChannelSpecError> {
        validate_name("namespace", &self.namespace)?;
        validate_name("name", &self.name)?;
        if self.local_port == 0 {
            return Err(ChannelSpecError::InvalidPort("0".to_string()));
        }
        if self.remote_port == 0 {
            return Err(ChannelSpecError::InvalidPort("0".to_string()));
        }
        Ok(())
    }

    /// Short human label: the endpoint name up to its first `-`
    /// (`postgres-ss-0` → `postgres`).
    #[must_use]
    pub fn service_label(&self) -> &str {
        self.name.split('-').next().unwrap_or(&self.name)
    }

    /// Resource reference understood by the forwarding tool (`pod/<name>`).
    #[must_use]
    pub fn target(&self) -> String {
        format!("pod/{}", self.name)
    }

    /// Port mapping argument (`<local>:<remote>`).
    #[must_use]
    pub fn port_mapping(&self) -> String {
        format!("{}:{}", self.local_port, self.remote_port)
    }
}

impl fmt::Display for ChannelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}:{}:{}",
            self.namespace, self.name, self.local_port, self.remote_port
        )
    }
}

impl FromStr for ChannelSpec {
    type Err = ChannelSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ChannelSpecError::Malformed(s.to_string());
        let (namespace, rest) = s.split_once('/').ok_or_else(malformed)?;
        let mut parts = rest.split(':');
        let (Some(name), Some(local), Some(remote), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };
        ChannelSpec::new(namespace, name, parse_port(local)?, parse_port(remote)?)
    }
}

fn parse_port(value: &str) -> Result<u16, ChannelSpecError> {
    value
        .parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| ChannelSpecError::InvalidPort(value.to_string()))
}

fn validate_name(field: &'static str, value: &str) -> Result<(), ChannelSpecError> {
    if value.is_empty() {
        return Err(ChannelSpecError::EmptyField { field });
    }
    let valid_chars = value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    let valid_edges = value
        .chars()
        .next()
        .zip(value.chars().last())
        .is_some_and(|(a, b)| a.is_ascii_alphanumeric() && b.is_ascii_alphanumeric());
    if !valid_chars || !valid_edges || value.len() > MAX_NAME_LEN {
        return Err(ChannelSpecError::InvalidName {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Validate a full channel set: every spec on its own, and no two specs
/// binding the same local port.
pub fn validate_channels(specs: &[ChannelSpec]) -> Result<(), ChannelSpecError> {
    let mut seen = HashSet::new();
    for spec in specs {
        spec.validate()?;
        if !seen.insert(spec.local_port) {
            return Err(ChannelSpecError::DuplicateLocalPort(spec.local_port));
        }
    }
    Ok(())
}

/// Channels forwarded when neither the config file nor the command line
/// provides any.
#[must_use]
pub fn default_channels() -> Vec<ChannelSpec> {
    [
        ("postgres-ns", "postgres-ss-0", 5432, 5432),
        ("redis-ns", "redis-ss-0", 6379, 6379),
        ("rabbitmq-ns", "rabbitmq-ss-0", 5672, 5672),
        ("kafka-ns", "kafka-cluster-kafka-node-pool-0", 9092, 9094),
    ]
    .into_iter()
    .map(|(namespace, name, local_port, remote_port)| ChannelSpec {
        namespace: namespace.to_string(),
        name: name.to_string(),
        local_port,
        remote_port,
    })
    .collect()
}
