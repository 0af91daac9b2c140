//! Vault client configuration.

use crate::error::{VaultError, VaultResult};
use std::time::Duration;
use url::Url;
use vaultify_common::HttpConfig;

/// Default Kubernetes service account token location.
pub const DEFAULT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Vault client configuration.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Vault server address
    pub addr: String,
    /// Kubernetes auth role name
    pub role: String,
    /// Mount path of the Kubernetes auth method
    pub auth_mount_path: String,
    /// Service account token path
    pub token_path: String,
    /// Request timeout
    pub timeout: Duration,
    /// Maximum retry attempts for transient request failures
    pub max_retries: u32,
    /// Base retry delay
    pub retry_delay: Duration,
    /// Minimum interval between requests, `None` disables rate limiting
    pub rate_limit: Option<Duration>,
    /// Requests allowed in a burst when rate limiting
    pub rate_limit_burst: u32,
    /// Skip TLS certificate verification
    pub tls_skip_verify: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            addr: std::env::var("VAULT_ADDR")
                .unwrap_or_else(|_| "https://127.0.0.1:8200".to_string()),
            role: std::env::var("VAULT_ROLE").unwrap_or_default(),
            auth_mount_path: "auth/kubernetes".to_string(),
            token_path: DEFAULT_TOKEN_PATH.to_string(),
            timeout: Duration::from_secs(60),
            max_retries: 2,
            retry_delay: Duration::from_millis(1000),
            rate_limit: None,
            rate_limit_burst: 1,
            tls_skip_verify: std::env::var("VAULT_SKIP_VERIFY")
                .is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true")),
        }
    }
}

impl VaultConfig {
    /// Create a new configuration.
    #[must_use]
    pub fn new(addr: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            role: role.into(),
            ..Default::default()
        }
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set maximum retries for transient failures.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the service account token path.
    #[must_use]
    pub fn with_token_path(mut self, path: impl Into<String>) -> Self {
        self.token_path = path.into();
        self
    }

    /// Set the Kubernetes auth mount path.
    #[must_use]
    pub fn with_auth_mount_path(mut self, path: impl Into<String>) -> Self {
        self.auth_mount_path = path.into().trim_matches('/').to_string();
        self
    }

    /// Enable rate limiting; a zero interval or burst disables it.
    #[must_use]
    pub const fn with_rate_limit(mut self, interval: Duration, burst: u32) -> Self {
        if interval.is_zero() || burst == 0 {
            self.rate_limit = None;
        } else {
            self.rate_limit = Some(interval);
            self.rate_limit_burst = burst;
        }
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfig`] for an unparsable address or a
    /// zero timeout.
    pub fn validate(&self) -> VaultResult<()> {
        let url = Url::parse(&self.addr)
            .map_err(|e| VaultError::invalid_config(format!("address '{}': {e}", self.addr)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(VaultError::invalid_config(format!(
                "address '{}' must use http or https",
                self.addr
            )));
        }
        if self.timeout.is_zero() {
            return Err(VaultError::invalid_config("timeout must be greater than 0"));
        }
        Ok(())
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.addr.trim_end_matches('/')
    }

    /// HTTP client settings derived from this configuration.
    #[must_use]
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig::default()
            .with_timeout(self.timeout)
            .with_tls_skip_verify(self.tls_skip_verify)
    }
}
