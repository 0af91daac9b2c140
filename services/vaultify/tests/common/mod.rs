//! Shared fixtures for vaultify integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use vault_client::{
    LeaseRenewer, RenewalEvent, RenewalHandle, Secret, SecretAuth, SecretData, VaultError,
};
use vaultify::{SecretError, SecretReader};

pub const ROLE: &str = "test-role";

/// One scripted reaction of a fake renewal process.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    /// Report a renewal, with or without Vault warnings
    Renew { warnings: bool },
    /// Vault answered without data
    NoData,
    /// Vault rejected the renewal
    Fail,
    /// The lease reached its max TTL
    Expire,
    /// The process disappears without a final event
    Vanish,
    /// Pause for this many milliseconds before the next step
    Sleep(u64),
}

/// Renewer replaying scripts keyed by lease id (`auth` for the token).
///
/// After its script a process idles until it is stopped.
#[derive(Default)]
pub struct FakeRenewer {
    scripts: Mutex<HashMap<String, Vec<Step>>>,
    watched: AtomicUsize,
    stopped: Arc<AtomicUsize>,
}

impl FakeRenewer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, key: &str, steps: &[Step]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(key.to_string(), steps.to_vec());
        self
    }

    pub fn watched(&self) -> usize {
        self.watched.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl LeaseRenewer for FakeRenewer {
    fn role(&self) -> &str {
        ROLE
    }

    fn watch(&self, secret: &Secret) -> RenewalHandle {
        self.watched.fetch_add(1, Ordering::SeqCst);
        let key = if secret.is_auth() {
            "auth"
        } else {
            secret.lease_id.as_str()
        };
        let steps = self
            .scripts
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default();

        let (sender, handle) = RenewalHandle::channel(steps.len() + 1);
        let stopped = Arc::clone(&self.stopped);
        let renewed = secret.clone();

        tokio::spawn(async move {
            for step in steps {
                let event = match step {
                    Step::Renew { warnings } => {
                        let mut secret = renewed.clone();
                        if warnings {
                            secret.warnings = vec!["TTL exceeded max_ttl".to_string()];
                        }
                        RenewalEvent::Renewed(secret)
                    }
                    Step::NoData => RenewalEvent::Done(Some(VaultError::NoSecretData)),
                    Step::Fail => RenewalEvent::Done(Some(VaultError::LeaseRenewalFailed(
                        "lease not found".to_string(),
                    ))),
                    Step::Expire => RenewalEvent::Done(None),
                    Step::Vanish => {
                        stopped.fetch_add(1, Ordering::SeqCst);
                        return;
                    }
                    Step::Sleep(millis) => {
                        tokio::time::sleep(Duration::from_millis(millis)).await;
                        continue;
                    }
                };
                if !sender.send(event).await {
                    break;
                }
            }
            sender.stopped().await;
            stopped.fetch_add(1, Ordering::SeqCst);
        });

        handle
    }
}

/// Reader returning a renewable lease for every name.
pub struct LeasedReader;

#[async_trait]
impl SecretReader for LeasedReader {
    async fn get(&self, name: &str) -> Result<Secret, SecretError> {
        let mut secret = leased(&format!("lease-{}", name.replace('/', "-")));
        secret.data = data(json!({ "username": "app", "password": "pw" }));
        Ok(secret)
    }

    fn auth_secret(&self) -> Option<Secret> {
        Some(auth_secret())
    }
}

pub fn data(value: serde_json::Value) -> SecretData {
    serde_json::from_value(value).unwrap()
}

pub fn leased(lease_id: &str) -> Secret {
    Secret {
        lease_id: lease_id.to_string(),
        lease_duration: 60,
        renewable: true,
        ..Secret::default()
    }
}

pub fn static_secret() -> Secret {
    Secret::from_data(data(json!({ "attribute1": "value1" })))
}

pub fn auth_secret() -> Secret {
    Secret {
        auth: Some(SecretAuth {
            client_token: "s.token".to_string(),
            accessor: "accessor".to_string(),
            lease_duration: 3600,
            renewable: true,
            ..SecretAuth::default()
        }),
        ..Secret::default()
    }
}

/// Wait until `condition` holds, failing the test after a few seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
