//! Vault HTTP client with retries, rate limiting and lease watching.

use crate::{
    config::VaultConfig,
    error::{VaultError, VaultResult},
    renewal::{LeaseRenewer, RenewalEvent, RenewalHandle, RenewalSender, renewal_interval},
    secrets::Secret,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, Method};
use secrecy::{ExposeSecret, SecretString};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use vaultify_common::{RetryConfig, RetryPolicy, build_http_client};

/// Vault client bound to one authenticated session.
///
/// Cloning is cheap; clones share the HTTP pool, rate limiter and token.
#[derive(Clone)]
pub struct VaultClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient").finish_non_exhaustive()
    }
}

struct ClientInner {
    config: VaultConfig,
    transport: Transport,
    token: SecretString,
    role: String,
    auth_secret: Secret,
}

/// HTTP plumbing shared by the login request and the authenticated client.
struct Transport {
    http: Client,
    retry: RetryPolicy,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl VaultClient {
    /// Log in with the Kubernetes auth method using the configured role.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the service account
    /// token cannot be read or Vault rejects the login.
    #[instrument(skip(config), fields(role = %config.role))]
    pub async fn login(config: VaultConfig) -> VaultResult<Self> {
        config.validate()?;
        if config.role.is_empty() {
            return Err(VaultError::invalid_config("role must not be empty"));
        }
        let transport = Transport::new(&config)?;

        let jwt = tokio::fs::read_to_string(&config.token_path)
            .await
            .map_err(|e| VaultError::auth_failed(format!("{}: {e}", config.token_path)))?;

        let url = format!("{}/v1/{}/login", config.base_url(), config.auth_mount_path);
        let body = serde_json::json!({
            "role": config.role,
            "jwt": jwt.trim(),
        });

        let secret = transport
            .send(Method::POST, &url, None, Some(&body), &config.auth_mount_path)
            .await
            .map_err(|e| match e {
                VaultError::PermissionDenied(msg) | VaultError::SecretNotFound(msg) => {
                    VaultError::auth_failed(msg)
                }
                other => other,
            })?
            .ok_or_else(|| VaultError::auth_failed("empty login response"))?;

        let role = config.role.clone();
        let client = Self::from_parts(config, transport, secret, role)?;
        info!(
            ttl_secs = client.inner.auth_secret.effective_lease_duration(),
            "Authenticated with Vault"
        );
        Ok(client)
    }

    /// Restore a session from a previously persisted auth secret.
    ///
    /// The role is read from the token metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the secret has no
    /// auth block.
    pub fn from_auth_secret(config: VaultConfig, auth_secret: Secret) -> VaultResult<Self> {
        config.validate()?;
        let role = auth_secret
            .token_role()
            .map_or_else(|| config.role.clone(), str::to_string);
        let transport = Transport::new(&config)?;
        Self::from_parts(config, transport, auth_secret, role)
    }

    fn from_parts(
        config: VaultConfig,
        transport: Transport,
        auth_secret: Secret,
        role: String,
    ) -> VaultResult<Self> {
        let token = auth_secret
            .auth
            .as_ref()
            .map(|auth| auth.client_token.clone())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| VaultError::auth_failed("secret carries no client token"))?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                token: SecretString::from(token),
                role,
                auth_secret,
            }),
        })
    }

    /// The login secret of this session.
    #[must_use]
    pub fn auth_secret(&self) -> &Secret {
        &self.inner.auth_secret
    }

    /// Read a secret from any logical path.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::SecretNotFound`] if the path holds no data.
    #[instrument(skip(self))]
    pub async fn read(&self, path: &str) -> VaultResult<Secret> {
        debug!(path, "Reading secret");
        self.request(Method::GET, path, None)
            .await?
            .ok_or_else(|| VaultError::not_found(path))
    }

    /// Renew the session token. `None` means Vault answered without data.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn renew_token(&self, increment: u64) -> VaultResult<Option<Secret>> {
        let body = serde_json::json!({ "increment": increment });
        self.request(Method::POST, "auth/token/renew-self", Some(&body))
            .await
            .map_err(|e| VaultError::LeaseRenewalFailed(e.to_string()))
    }

    /// Renew a lease. `None` means Vault answered without data.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn renew_lease(&self, lease_id: &str, increment: u64) -> VaultResult<Option<Secret>> {
        let body = serde_json::json!({
            "lease_id": lease_id,
            "increment": increment,
        });
        self.request(Method::PUT, "sys/leases/renew", Some(&body))
            .await
            .map_err(|e| VaultError::LeaseRenewalFailed(e.to_string()))
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> VaultResult<Option<Secret>> {
        let inner = &self.inner;
        let url = format!("{}/v1/{}", inner.config.base_url(), path.trim_start_matches('/'));
        inner
            .transport
            .send(method, &url, Some(&inner.token), body, path)
            .await
    }
}

impl Transport {
    fn new(config: &VaultConfig) -> VaultResult<Self> {
        let http = build_http_client(&config.http_config())?;
        let retry = RetryPolicy::new(
            RetryConfig::default()
                .with_max_retries(config.max_retries)
                .with_initial_delay(config.retry_delay),
        );
        let limiter = config.rate_limit.and_then(|interval| {
            let burst = NonZeroU32::new(config.rate_limit_burst)?;
            Quota::with_period(interval).map(|quota| RateLimiter::direct(quota.allow_burst(burst)))
        });
        Ok(Self {
            http,
            retry,
            limiter,
        })
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        token: Option<&SecretString>,
        body: Option<&serde_json::Value>,
        path: &str,
    ) -> VaultResult<Option<Secret>> {
        self.retry
            .execute(|| {
                let method = method.clone();
                async move {
                    if let Some(limiter) = &self.limiter {
                        limiter.until_ready().await;
                    }
                    let result = self.do_request(method, url, token, body, path).await;
                    if let Err(e) = &result {
                        if e.is_retryable() {
                            warn!(path, error = %e, "Vault request failed, may retry");
                        }
                    }
                    result
                }
            })
            .await
    }

    async fn do_request(
        &self,
        method: Method,
        url: &str,
        token: Option<&SecretString>,
        body: Option<&serde_json::Value>,
        path: &str,
    ) -> VaultResult<Option<Secret>> {
        let mut request = self.http.request(method, url);
        if let Some(token) = token {
            request = request.header("X-Vault-Token", token.expose_secret());
        }
        if let Some(b) = body {
            request = request.json(b);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VaultError::unavailable(e.to_string()))?;

        let status = response.status();
        match status.as_u16() {
            404 => return Err(VaultError::not_found(path)),
            401 | 403 => return Err(VaultError::PermissionDenied(path.to_string())),
            429 => return Err(VaultError::RateLimited),
            s if s >= 500 => {
                let text = response.text().await.unwrap_or_default();
                return Err(VaultError::unavailable(format!("Status {status}: {text}")));
            }
            _ if !status.is_success() => {
                let text = response.text().await.unwrap_or_default();
                return Err(VaultError::unavailable(format!("Status {status}: {text}")));
            }
            _ => {}
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }
}

impl LeaseRenewer for VaultClient {
    fn role(&self) -> &str {
        &self.inner.role
    }

    fn watch(&self, secret: &Secret) -> RenewalHandle {
        let (sender, handle) = RenewalHandle::channel(1);
        tokio::spawn(watch_lease(self.clone(), secret.clone(), sender));
        handle
    }
}

/// Renew `secret` until it can no longer be extended, renewal fails or the
/// handle is stopped. The first renewal happens immediately.
async fn watch_lease(client: VaultClient, secret: Secret, sender: RenewalSender) {
    let increment = secret.effective_lease_duration();

    loop {
        if sender.is_stopped() {
            return;
        }

        let renewal = if secret.is_auth() {
            client.renew_token(increment).await
        } else {
            client.renew_lease(&secret.lease_id, increment).await
        };

        let renewed = match renewal {
            Ok(Some(renewed)) if !secret.is_auth() || renewed.is_auth() => renewed,
            Ok(_) => {
                sender.send(RenewalEvent::Done(Some(VaultError::NoSecretData))).await;
                return;
            }
            Err(e) => {
                sender.send(RenewalEvent::Done(Some(e))).await;
                return;
            }
        };

        let renewable = renewed.is_renewable();
        let lease_duration = renewed.effective_lease_duration();
        if !sender.send(RenewalEvent::Renewed(renewed)).await {
            return;
        }
        if !renewable || lease_duration == 0 {
            sender.send(RenewalEvent::Done(None)).await;
            return;
        }

        tokio::select! {
            () = sender.stopped() => return,
            () = tokio::time::sleep(renewal_interval(lease_duration)) => {}
        }
    }
}
