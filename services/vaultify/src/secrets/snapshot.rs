use crate::error::{Result, VaultifyError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use vault_client::Secret;

/// Every secret fetched during one render pass, plus the session's auth
/// secret.
///
/// This is also the on-disk format handed from `template` to
/// `renew-leases`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretSnapshot {
    /// Login secret of the session
    #[serde(default)]
    pub auth_secret: Option<Secret>,
    /// Fetched secrets by name
    #[serde(default)]
    pub secrets: BTreeMap<String, Secret>,
}

impl SecretSnapshot {
    /// Secrets whose lease can be renewed, in name order.
    pub fn renewable(&self) -> impl Iterator<Item = (&str, &Secret)> {
        self.secrets
            .iter()
            .filter(|(_, secret)| secret.renewable)
            .map(|(name, secret)| (name.as_str(), secret))
    }

    /// Names of all tracked secrets.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.secrets.keys().map(String::as_str)
    }

    /// Number of tracked secrets, not counting the auth secret.
    #[must_use]
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    /// True if no secret was fetched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Persist the snapshot as JSON, readable by the owner only.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(|source| VaultifyError::SecretsFile {
            path: path.to_path_buf(),
            source,
        })?;
        let io_err = |source| VaultifyError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(path).await.map_err(io_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(io_err)?;
        }
        file.write_all(&json).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;

        info!(path = %path.display(), secrets = self.len(), "Wrote secrets file");
        Ok(())
    }

    /// Load a snapshot written by [`SecretSnapshot::write`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn read(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await.map_err(|source| VaultifyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot: Self =
            serde_json::from_slice(&bytes).map_err(|source| VaultifyError::SecretsFile {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), secrets = snapshot.len(), "Read secrets file");
        Ok(snapshot)
    }
}
