//! Command implementations

pub mod config;
pub mod create;
pub mod download;
pub mod forward;
pub mod images;
pub mod setup;
pub mod version;
