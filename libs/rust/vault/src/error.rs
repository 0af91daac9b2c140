//! Vault error types using thiserror 2.0.
//!
//! Provides Vault-specific errors with retryability classification
//! and integration with platform common errors.

use thiserror::Error;
use vaultify_common::{PlatformError, Retryable};

/// Vault-specific errors.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Vault server unavailable
    #[error("Vault unavailable: {0}")]
    Unavailable(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Secret not found
    #[error("Secret not found at path: {0}")]
    SecretNotFound(String),

    /// Lease renewal failed
    #[error("Lease renewal failed: {0}")]
    LeaseRenewalFailed(String),

    /// Vault answered a renewal without any secret data
    #[error("returned empty secret data")]
    NoSecretData,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Rate limited
    #[error("Rate limited")]
    RateLimited,

    /// Platform error
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Result type for Vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

impl VaultError {
    /// Check if error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::RateLimited | Self::Http(_))
    }

    /// Check if Vault returned no data for a renewal.
    #[must_use]
    pub const fn is_no_secret_data(&self) -> bool {
        matches!(self, Self::NoSecretData)
    }

    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create an authentication failed error.
    #[must_use]
    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::AuthenticationFailed(msg.into())
    }

    /// Create a secret not found error.
    #[must_use]
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::SecretNotFound(path.into())
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

impl Retryable for VaultError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }
}
