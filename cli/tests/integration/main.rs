//! Integration tests for the kvmkit CLI
//!
//! These tests spawn the actual binary and test end-to-end behavior.
//! None of them touch libvirt, kubectl or the network.

mod config_command;
