//! Subcommand implementations.

mod renew_leases;
mod run;
mod template;

pub use renew_leases::renew_leases;
pub use run::{render_and_renew, retry_on_empty_data, run};
pub use template::template;

use crate::config::{Cli, Command, MetricsOptions};
use crate::error::Result;
use crate::http;
use crate::metrics::PrometheusMetrics;
use crate::shutdown::ShutdownCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run the selected subcommand until it finishes or a signal arrives.
///
/// # Errors
///
/// Returns the subcommand's error. Configuration errors are returned before
/// Vault is contacted.
pub async fn execute(cli: Cli) -> Result<()> {
    let mut coordinator = ShutdownCoordinator::new();
    coordinator.cancel_on_signal();

    let result = dispatch(&cli, &mut coordinator).await;

    coordinator.shutdown(SHUTDOWN_TIMEOUT).await;
    result
}

async fn dispatch(cli: &Cli, coordinator: &mut ShutdownCoordinator) -> Result<()> {
    match &cli.command {
        Command::Template(options) => template(&cli.vault, options).await,
        Command::RenewLeases(options) => {
            let metrics = start_metrics(coordinator, &options.metrics)?;
            renew_leases(&cli.vault, options, metrics, coordinator.token()).await
        }
        Command::Run(options) => {
            let metrics = start_metrics(coordinator, &options.metrics)?;
            run(&cli.vault, options, metrics, coordinator.token()).await
        }
    }
}

/// Register the metrics and, if an address is set, serve them.
fn start_metrics(
    coordinator: &mut ShutdownCoordinator,
    options: &MetricsOptions,
) -> Result<Arc<PrometheusMetrics>> {
    options.validate()?;
    let metrics = Arc::new(PrometheusMetrics::new()?);

    if let Some(addr) = options.metrics_address {
        let router = http::router(Arc::clone(&metrics), &options.metrics_path);
        let token = coordinator.token();
        coordinator.spawn_graceful("metrics-server", async move {
            if let Err(e) = http::serve(addr, router, token).await {
                error!(error = %e, "Metrics server failed");
            }
        });
    }

    Ok(metrics)
}
