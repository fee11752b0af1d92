//! Unit tests for the kvmkit CLI
//!
//! These tests use mocked dependencies and run fast without external I/O.

mod architecture;
mod mocks;
mod transaction_tests;
