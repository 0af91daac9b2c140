use super::SecretReader;
use crate::error::SecretError;
use async_trait::async_trait;
use vault_client::{Secret, VaultClient};

/// Reader backed by an authenticated Vault session.
#[derive(Clone)]
pub struct VaultSecretReader {
    client: VaultClient,
}

impl VaultSecretReader {
    /// Serve lookups through `client`.
    #[must_use]
    pub const fn new(client: VaultClient) -> Self {
        Self { client }
    }

    /// The underlying session.
    #[must_use]
    pub const fn client(&self) -> &VaultClient {
        &self.client
    }
}

#[async_trait]
impl SecretReader for VaultSecretReader {
    async fn get(&self, name: &str) -> Result<Secret, SecretError> {
        Ok(self.client.read(name).await?)
    }

    fn auth_secret(&self) -> Option<Secret> {
        Some(self.client.auth_secret().clone())
    }
}
