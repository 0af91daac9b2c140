//! HashiCorp Vault client for vaultify.
//!
//! Provides Kubernetes login, session restoration from a persisted auth
//! secret, logical reads, and lease renewal processes consumed through
//! [`LeaseRenewer`].

pub mod client;
pub mod config;
pub mod error;
pub mod renewal;
pub mod secrets;

pub use client::VaultClient;
pub use config::VaultConfig;
pub use error::{VaultError, VaultResult};
pub use renewal::{LeaseRenewer, RenewalEvent, RenewalHandle, RenewalSender};
pub use secrets::{LeaseInfo, Secret, SecretAuth, SecretData};
