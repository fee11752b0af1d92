//! Application layer: port trait definitions and use-case orchestration.
//!
//! This module depends only on `crate::domain`: never on `crate::infra`,
//! `crate::commands`, or `crate::output`.

pub mod abort;
pub mod ports;
pub mod services;

pub use abort::{AbortSignal, AbortTrigger, abort_pair};
pub use ports::{
    ChannelProcess, CommandRunner, ConfigStore, Confirmer, DiskTool, ForwardLauncher, ImageStore,
    InstanceManager, KeyGenerator, LocalFs, ProgressReporter, ProvisionToolchain, SeedBuilder,
};
