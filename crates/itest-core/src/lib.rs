//! Shared plumbing for the integration-test crates: tracing setup and config loading.

pub mod config;
pub mod tracing;
