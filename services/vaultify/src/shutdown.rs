//! Graceful shutdown.
//!
//! A single [`CancellationToken`] is cancelled on SIGINT or SIGTERM. Renewal
//! tasks and the metrics server watch child tokens of it; background tasks
//! are tracked in a [`JoinSet`] so they can be drained on exit.

use std::future::Future;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Shutdown coordinator for graceful termination
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: JoinSet<()>,
}

impl ShutdownCoordinator {
    /// Creates a new shutdown coordinator
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: JoinSet::new(),
        }
    }

    /// Token cancelled when shutdown starts.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the token once SIGINT or SIGTERM arrives.
    pub fn cancel_on_signal(&mut self) {
        let token = self.token();
        self.spawn("signal-handler", async move {
            wait_for_signal().await;
            token.cancel();
        });
    }

    /// Spawns a background task that will be tracked
    pub fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.token();
        self.tasks.spawn(async move {
            tokio::select! {
                () = future => {
                    info!(task = name, "Background task completed");
                }
                () = token.cancelled() => {
                    info!(task = name, "Background task cancelled by shutdown");
                }
            }
        });
    }

    /// Spawns a tracked task that watches the token itself.
    ///
    /// The task is not dropped on cancellation; shutdown waits for it to
    /// finish its own cleanup, up to the shutdown timeout.
    pub fn spawn_graceful<F>(&mut self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(async move {
            future.await;
            info!(task = name, "Background task completed");
        });
    }

    /// Cancel the token and wait for tracked tasks, aborting them after
    /// `timeout`.
    pub async fn shutdown(mut self, timeout: Duration) {
        self.token.cancel();

        let drained = tokio::time::timeout(timeout, async {
            while let Some(result) = self.tasks.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "Task failed during shutdown");
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("Shutdown timeout reached, aborting remaining tasks");
            self.tasks.abort_all();
        }
    }

    /// Returns the number of tracked tasks
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for SIGTERM or SIGINT
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
