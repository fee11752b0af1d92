//! Domain layer: pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`
//! sockets. All functions are synchronous and take data in, returning data out.

pub mod cloud_init;
pub mod config;
pub mod error;
pub mod layout;
pub mod resource;

pub use config::{DnsMode, KeySource, KvmkitConfig, VmConfig, VmDefaults};
pub use error::{ConfigError, ProvisionError, TransactionError};
pub use layout::KvmLayout;
pub use resource::{ResourceHandle, ResourceKind, RollbackReport, UndoOutcome, UndoRecord};
