//! Lease renewal processes.
//!
//! A renewal process keeps one lease (or the client token) alive and
//! reports through a [`RenewalHandle`]: every successful renewal yields
//! [`RenewalEvent::Renewed`], and the process ends with exactly one
//! [`RenewalEvent::Done`]. Dropping or stopping the handle ends the process
//! without a `Done` event.

use crate::error::VaultError;
use crate::secrets::Secret;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Event emitted by a renewal process.
#[derive(Debug)]
pub enum RenewalEvent {
    /// The lease was extended; carries Vault's renewal response
    Renewed(Secret),
    /// The process ended; `None` when the lease can no longer be extended
    Done(Option<VaultError>),
}

/// Capability of starting renewal processes for fetched leases.
pub trait LeaseRenewer: Send + Sync {
    /// Role the session was established with, used as a metrics label.
    fn role(&self) -> &str;

    /// Start renewing `secret`, which is either a leased secret or the
    /// session's auth secret.
    fn watch(&self, secret: &Secret) -> RenewalHandle;
}

/// Consumer side of a renewal process.
#[derive(Debug)]
pub struct RenewalHandle {
    events: mpsc::Receiver<RenewalEvent>,
    stop: CancellationToken,
}

/// Producer side of a renewal process.
#[derive(Debug, Clone)]
pub struct RenewalSender {
    events: mpsc::Sender<RenewalEvent>,
    stop: CancellationToken,
}

impl RenewalHandle {
    /// Create a connected sender/handle pair.
    #[must_use]
    pub fn channel(buffer: usize) -> (RenewalSender, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let stop = CancellationToken::new();
        (
            RenewalSender {
                events: tx,
                stop: stop.clone(),
            },
            Self { events: rx, stop },
        )
    }

    /// Wait for the next event; `None` once the process has gone away.
    pub async fn next_event(&mut self) -> Option<RenewalEvent> {
        self.events.recv().await
    }

    /// Ask the process to stop.
    pub fn stop(&self) {
        self.stop.cancel();
    }
}

impl Drop for RenewalHandle {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

impl RenewalSender {
    /// Deliver an event; returns false if the handle is gone or stopped.
    pub async fn send(&self, event: RenewalEvent) -> bool {
        if self.stop.is_cancelled() {
            return false;
        }
        self.events.send(event).await.is_ok()
    }

    /// Resolves when the consumer stopped the process.
    pub fn stopped(&self) -> WaitForCancellationFuture<'_> {
        self.stop.cancelled()
    }

    /// True once the consumer stopped the process.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}

/// Delay before the next renewal of a lease lasting `lease_duration` seconds.
///
/// Renews after two thirds of the lease, never sooner than one second.
#[must_use]
pub fn renewal_interval(lease_duration: u64) -> Duration {
    let millis = lease_duration.saturating_mul(2000) / 3;
    Duration::from_millis(millis).max(Duration::from_secs(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_flow_to_handle() {
        let (tx, mut handle) = RenewalHandle::channel(4);
        assert!(tx.send(RenewalEvent::Renewed(Secret::default())).await);
        assert!(tx.send(RenewalEvent::Done(None)).await);

        assert!(matches!(handle.next_event().await, Some(RenewalEvent::Renewed(_))));
        assert!(matches!(handle.next_event().await, Some(RenewalEvent::Done(None))));
    }

    #[tokio::test]
    async fn test_stop_is_observed_by_sender() {
        let (tx, handle) = RenewalHandle::channel(1);
        assert!(!tx.is_stopped());
        handle.stop();
        tx.stopped().await;
        assert!(!tx.send(RenewalEvent::Done(None)).await);
    }

    #[tokio::test]
    async fn test_drop_stops_process() {
        let (tx, handle) = RenewalHandle::channel(1);
        drop(handle);
        assert!(tx.is_stopped());
    }

    #[tokio::test]
    async fn test_handle_ends_when_sender_dropped() {
        let (tx, mut handle) = RenewalHandle::channel(1);
        drop(tx);
        assert!(handle.next_event().await.is_none());
    }

    #[test]
    fn test_renewal_interval() {
        assert_eq!(renewal_interval(900), Duration::from_secs(600));
        assert_eq!(renewal_interval(0), Duration::from_secs(1));
        assert_eq!(renewal_interval(1), Duration::from_secs(1));
    }
}
