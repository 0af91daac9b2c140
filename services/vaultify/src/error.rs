//! Error types for vaultify.

use crate::config::ConfigError;
use crate::leases::LeaseIdentity;
use std::path::PathBuf;
use thiserror::Error;
use vault_client::VaultError;
use vaultify_common::Retryable;

/// Secret lookup errors raised by readers and the tracker.
#[derive(Error, Debug)]
pub enum SecretError {
    /// The template called `vault` without a name.
    #[error("you need to pass a name to the 'vault' function")]
    EmptyName,

    /// No secret exists under the requested name.
    #[error("secret not found: {0}")]
    NotFound(String),

    /// The broker failed to answer.
    #[error(transparent)]
    Broker(VaultError),
}

impl SecretError {
    /// True if the lookup failed because the secret does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<VaultError> for SecretError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::SecretNotFound(path) => Self::NotFound(path),
            other => Self::Broker(other),
        }
    }
}

/// Template rendering errors.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// Reading a template or writing its output failed.
    #[error("{}: {source}", .path.display())]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The template could not be parsed or evaluated.
    #[error("failed to render {template}: {source}")]
    Render {
        /// Template name
        template: String,
        /// Engine error
        source: minijinja::Error,
    },

    /// A `vault` lookup inside the template failed.
    #[error("failed to render {template}: {source}")]
    Lookup {
        /// Template name
        template: String,
        /// Lookup error
        source: SecretError,
    },

    /// A directory template needs a directory to render into.
    #[error("cannot render directory {} to stdout, set an output path", .0.display())]
    DirectoryToStdout(PathBuf),

    /// The blocking render task panicked or was cancelled.
    #[error("render task failed: {0}")]
    Task(String),
}

impl TemplateError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

/// Terminal outcome of a renewal task.
#[derive(Error, Debug)]
pub enum LeaseError {
    /// The renewal process stopped with an error.
    #[error("{identity} lease renewal failed: {source}")]
    Failed {
        /// Failing renewal task
        identity: LeaseIdentity,
        /// Error reported by the broker client
        source: VaultError,
    },

    /// The lease can no longer be extended.
    #[error("{identity} lease can no longer be renewed")]
    Expired {
        /// Finished renewal task
        identity: LeaseIdentity,
    },
}

impl LeaseError {
    /// Build the outcome for a finished renewal process.
    #[must_use]
    pub fn new(identity: LeaseIdentity, error: Option<VaultError>) -> Self {
        match error {
            Some(source) => Self::Failed { identity, source },
            None => Self::Expired { identity },
        }
    }

    /// The renewal task that produced this outcome.
    #[must_use]
    pub const fn identity(&self) -> &LeaseIdentity {
        match self {
            Self::Failed { identity, .. } | Self::Expired { identity } => identity,
        }
    }

    /// True if Vault answered a renewal without any data.
    #[must_use]
    pub const fn is_no_secret_data(&self) -> bool {
        matches!(self, Self::Failed { source, .. } if source.is_no_secret_data())
    }
}

/// Top-level error of a vaultify command.
#[derive(Error, Debug)]
pub enum VaultifyError {
    /// Invalid command line or environment.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Login or session setup failed.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// Rendering failed.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// A lease could not be kept alive.
    #[error(transparent)]
    Lease(#[from] LeaseError),

    /// Reading or writing the secrets file failed.
    #[error("{}: {source}", .path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The secrets file is not valid JSON.
    #[error("invalid secrets file {}: {source}", .path.display())]
    SecretsFile {
        /// File involved
        path: PathBuf,
        /// Parse error
        source: serde_json::Error,
    },

    /// Metrics registration or the metrics server failed.
    #[error("metrics: {0}")]
    Metrics(String),
}

impl From<prometheus::Error> for VaultifyError {
    fn from(err: prometheus::Error) -> Self {
        Self::Metrics(err.to_string())
    }
}

impl Retryable for VaultifyError {
    /// Only an empty renewal answer restarts the render and renew cycle.
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Lease(e) if e.is_no_secret_data())
    }
}

/// Result type for vaultify commands.
pub type Result<T> = std::result::Result<T, VaultifyError>;
