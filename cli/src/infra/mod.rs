//! Infrastructure layer: concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process execution, filesystem
//! access, image download, libvirt and kubectl adapters, and signal handling.
//!
//! Imports from `crate::domain` and `crate::application` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod command_runner;
pub mod config;
pub mod fs;
pub mod image;
pub mod kubectl;
pub mod libvirt;
pub mod network;
pub mod signals;
