//! vaultify renders configuration files from Vault secrets and keeps the
//! leases of those secrets alive.
//!
//! # Modules
//!
//! - `secrets`: secret readers and the persisted secret snapshot
//! - `tracker`: records the secrets a render pass fetched
//! - `template`: Jinja rendering with a `vault` lookup function
//! - `leases`: concurrent lease renewal with a single outcome
//! - `commands`: the `template`, `renew-leases` and `run` subcommands
//! - `metrics`, `http`: Prometheus counters and health endpoints
//! - `config`, `shutdown`: CLI options and signal handling

pub mod commands;
pub mod config;
pub mod error;
pub mod http;
pub mod leases;
pub mod metrics;
pub mod secrets;
pub mod shutdown;
pub mod template;
pub mod tracker;

pub use config::{Cli, Command, ConfigError};
pub use error::{LeaseError, SecretError, TemplateError, VaultifyError};
pub use leases::{LeaseIdentity, LeaseOrchestrator, RenewalSet};
pub use metrics::{LeaseMetrics, NoopMetrics, PrometheusMetrics};
pub use secrets::{MapSecretReader, SecretReader, SecretSnapshot, VaultSecretReader};
pub use template::TemplateRenderer;
pub use tracker::SecretTracker;
