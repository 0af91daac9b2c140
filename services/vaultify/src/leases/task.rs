use super::LeaseIdentity;
use crate::error::LeaseError;
use crate::metrics::LeaseMetrics;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info, trace, warn};
use vault_client::{RenewalEvent, RenewalHandle, Secret, VaultError};

/// Drives one renewal process and reports how it ended.
pub(super) struct RenewalTask {
    pub(super) identity: LeaseIdentity,
    pub(super) role: String,
    pub(super) handle: RenewalHandle,
    pub(super) metrics: Arc<dyn LeaseMetrics>,
    pub(super) cancel: CancellationToken,
    pub(super) outcome: mpsc::Sender<LeaseError>,
}

impl RenewalTask {
    pub(super) async fn run(mut self) {
        debug!(lease = %self.identity, "Starting lease renewal");

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    info!(lease = %self.identity, "Shutdown triggered, stopping lease renewal");
                    self.handle.stop();
                    return;
                }
                event = self.handle.next_event() => match event {
                    Some(RenewalEvent::Renewed(secret)) => self.renewed(&secret),
                    Some(RenewalEvent::Done(error)) => {
                        self.finish(error);
                        return;
                    }
                    None => {
                        self.finish(Some(VaultError::LeaseRenewalFailed(
                            "renewal process exited".to_string(),
                        )));
                        return;
                    }
                },
            }
        }
    }

    fn renewed(&self, secret: &Secret) {
        let warnings = secret.has_warnings();
        match &self.identity {
            LeaseIdentity::Auth => self.metrics.auth_lease_renewed(&self.role, warnings),
            LeaseIdentity::Secret(name) => {
                self.metrics.secret_lease_renewed(&self.role, name, warnings);
            }
        }

        if tracing::enabled!(Level::TRACE) {
            let info = serde_json::to_string_pretty(&secret.lease_info()).unwrap_or_default();
            trace!(lease = %self.identity, lease_info = %info, "Successfully renewed lease");
        } else if tracing::enabled!(Level::DEBUG) {
            debug!(
                lease = %self.identity,
                lease_id = secret.lease_info().lease_id,
                "Successfully renewed lease"
            );
        } else {
            info!(lease = %self.identity, "Successfully renewed lease");
        }

        if warnings {
            warn!(lease = %self.identity, warnings = ?secret.warnings, "Lease renewal returned warnings");
        }
    }

    fn finish(&self, error: Option<VaultError>) {
        match &self.identity {
            LeaseIdentity::Auth => self.metrics.auth_lease_failed(&self.role),
            LeaseIdentity::Secret(name) => self.metrics.secret_lease_failed(&self.role, name),
        }
        warn!(lease = %self.identity, "Lease renewer done");

        match self.outcome.try_send(LeaseError::new(self.identity.clone(), error)) {
            Ok(()) => {}
            Err(TrySendError::Closed(err)) => {
                debug!(lease = %self.identity, error = %err, "Outcome already decided");
            }
            Err(TrySendError::Full(err)) => {
                warn!(lease = %self.identity, error = %err, "Outcome channel full, dropping error");
            }
        }
    }
}
