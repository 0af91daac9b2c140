use crate::config::{ConfigError, RenewLeasesOptions, VaultOptions};
use crate::error::Result;
use crate::leases::LeaseOrchestrator;
use crate::metrics::LeaseMetrics;
use crate::secrets::SecretSnapshot;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vault_client::VaultClient;

/// Renew the leases recorded by an earlier `template` run.
///
/// The session is restored from the recorded auth secret, so no login
/// happens.
///
/// # Errors
///
/// Returns an error if the secrets file is unusable or a lease stops being
/// renewable.
pub async fn renew_leases(
    vault: &VaultOptions,
    options: &RenewLeasesOptions,
    metrics: Arc<dyn LeaseMetrics>,
    shutdown: CancellationToken,
) -> Result<()> {
    let path = options.validate()?;
    let snapshot = SecretSnapshot::read(path).await?;
    let auth_secret = snapshot
        .auth_secret
        .clone()
        .ok_or_else(|| ConfigError::InvalidValue {
            name: "--secrets-file",
            reason: "no auth secret recorded".to_string(),
        })?;

    let client = VaultClient::from_auth_secret(vault.vault_config(), auth_secret)?;
    info!(path = %path.display(), secrets = snapshot.len(), "Renewing recorded leases");

    LeaseOrchestrator::new(Arc::new(client), metrics)
        .start(&snapshot, &shutdown)
        .wait()
        .await?;
    Ok(())
}
