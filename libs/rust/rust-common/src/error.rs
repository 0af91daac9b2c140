//! Centralized error types shared by the vaultify crates.
//!
//! Errors raised by the plumbing in this crate (HTTP client construction,
//! tracing setup) carry a retryability classification so callers can decide
//! whether a failed operation is worth repeating.

use crate::retry::Retryable;
use thiserror::Error;

/// Common error type for platform operations.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// HTTP client failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlatformError {
    /// Check if this error is retryable.
    ///
    /// Only connection failures and timeouts of the HTTP client are
    /// transient.
    ///
    /// # Examples
    ///
    /// ```
    /// use vaultify_common::PlatformError;
    ///
    /// let err = PlatformError::internal("tracing already initialised");
    /// assert!(!err.is_retryable());
    /// ```
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Internal(_) => false,
        }
    }

    /// Create an internal error with the given message.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl Retryable for PlatformError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }
}
