//! Disposable TLS-secured mock gRPC server for integration tests.
//!
//! A [`ServerHarness`] provisions a throwaway self-signed certificate, binds a
//! listener, serves the mocked contracts on a background task and tears all of
//! it down again on [`ServerHarness::stop`].

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod harness;
pub mod service;

pub use config::HarnessConfig;
pub use credentials::{CertOptions, CredentialPair};
pub use error::{CredentialError, HarnessError};
pub use harness::{HarnessState, ServeOutcome, ServerHarness};
pub use service::{MockAuctioneer, MockSwapServer};
