use super::LeaseIdentity;
use super::task::RenewalTask;
use crate::error::LeaseError;
use crate::metrics::LeaseMetrics;
use crate::secrets::SecretSnapshot;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use vault_client::LeaseRenewer;

/// Starts renewal tasks for the leases of a snapshot.
#[derive(Clone)]
pub struct LeaseOrchestrator {
    renewer: Arc<dyn LeaseRenewer>,
    metrics: Arc<dyn LeaseMetrics>,
}

impl LeaseOrchestrator {
    /// Renew through `renewer`, reporting to `metrics`.
    #[must_use]
    pub fn new(renewer: Arc<dyn LeaseRenewer>, metrics: Arc<dyn LeaseMetrics>) -> Self {
        Self { renewer, metrics }
    }

    /// Start one task for the auth secret, if any, and one per renewable
    /// secret. Non-renewable secrets are skipped.
    ///
    /// The tasks stop when `shutdown` is cancelled or once the returned set
    /// has an outcome.
    #[must_use]
    pub fn start(&self, snapshot: &SecretSnapshot, shutdown: &CancellationToken) -> RenewalSet {
        let leases: Vec<_> = snapshot
            .auth_secret
            .iter()
            .map(|secret| (LeaseIdentity::Auth, secret))
            .chain(
                snapshot
                    .renewable()
                    .map(|(name, secret)| (LeaseIdentity::secret(name), secret)),
            )
            .collect();

        let cancel = shutdown.child_token();
        let (outcome_tx, outcome_rx) = mpsc::channel(leases.len().max(1));
        let role = self.renewer.role().to_string();

        let identities = leases
            .into_iter()
            .map(|(identity, secret)| {
                let task = RenewalTask {
                    identity: identity.clone(),
                    role: role.clone(),
                    handle: self.renewer.watch(secret),
                    metrics: Arc::clone(&self.metrics),
                    cancel: cancel.clone(),
                    outcome: outcome_tx.clone(),
                };
                tokio::spawn(task.run());
                identity
            })
            .collect::<Vec<_>>();

        info!(
            role = %role,
            tasks = identities.len(),
            skipped = snapshot.len() - snapshot.renewable().count(),
            "Started lease renewal"
        );

        RenewalSet {
            identities,
            outcome: outcome_rx,
            cancel,
        }
    }
}

/// Running renewal tasks of one snapshot.
pub struct RenewalSet {
    identities: Vec<LeaseIdentity>,
    outcome: mpsc::Receiver<LeaseError>,
    cancel: CancellationToken,
}

impl RenewalSet {
    /// Leases being renewed, auth first.
    #[must_use]
    pub fn identities(&self) -> &[LeaseIdentity] {
        &self.identities
    }

    /// Number of renewal tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    /// True if nothing needed renewing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Wait until shutdown or until the first task stops.
    ///
    /// Remaining tasks are told to stop but not awaited.
    ///
    /// # Errors
    ///
    /// Returns the error of the first task that stopped.
    pub async fn wait(mut self) -> Result<(), LeaseError> {
        let outcome = tokio::select! {
            biased;

            () = self.cancel.cancelled() => {
                info!("Shutdown triggered, stopping lease renewal");
                Ok(())
            }
            Some(err) = self.outcome.recv() => {
                error!(lease = %err.identity(), error = %err, "Lease renewal stopped");
                Err(err)
            }
        };

        self.cancel.cancel();
        outcome
    }
}
