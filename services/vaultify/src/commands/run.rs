use crate::config::{RunOptions, VaultOptions};
use crate::error::Result;
use crate::leases::LeaseOrchestrator;
use crate::metrics::LeaseMetrics;
use crate::secrets::{SecretReader, VaultSecretReader};
use crate::template::TemplateRenderer;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vault_client::{LeaseRenewer, VaultClient};
use vaultify_common::{RetryConfig, RetryPolicy};

/// Log in, render, and keep every lease alive until shutdown.
///
/// An empty renewal answer from Vault restarts the whole cycle with a fresh
/// login, up to `--renewal-retries` times.
///
/// # Errors
///
/// Returns an error if the options are invalid, login or rendering fails, or
/// a lease stops being renewable.
pub async fn run(
    vault: &VaultOptions,
    options: &RunOptions,
    metrics: Arc<dyn LeaseMetrics>,
    shutdown: CancellationToken,
) -> Result<()> {
    let (template, output) = options.validate(vault)?;
    let policy = RetryPolicy::new(RetryConfig::fixed(
        options.renewal_retries,
        options.retry_delay,
    ));
    let (template, output, shutdown) = (&template, &output, &shutdown);

    retry_on_empty_data(&policy, shutdown, move |attempt| {
        let metrics = Arc::clone(&metrics);
        async move {
            if attempt > 0 {
                info!(attempt, "Restarting render and lease renewal");
            }
            let client = VaultClient::login(vault.vault_config()).await?;
            let reader = Arc::new(VaultSecretReader::new(client.clone()));
            render_and_renew(reader, Arc::new(client), metrics, template, output, shutdown).await
        }
    })
    .await
}

/// Render `template` into `output`, then renew the leases of every secret
/// used until shutdown or the first renewal stops.
///
/// # Errors
///
/// Returns the rendering error or the first renewal error.
pub async fn render_and_renew(
    reader: Arc<dyn SecretReader>,
    renewer: Arc<dyn LeaseRenewer>,
    metrics: Arc<dyn LeaseMetrics>,
    template: &Path,
    output: &Path,
    shutdown: &CancellationToken,
) -> Result<()> {
    let snapshot = TemplateRenderer::new(reader)
        .render_path(template, Some(output))
        .await?;
    info!(
        template = %template.display(),
        output = %output.display(),
        secrets = snapshot.len(),
        "Rendered templates"
    );

    LeaseOrchestrator::new(renewer, metrics)
        .start(&snapshot, shutdown)
        .wait()
        .await?;
    Ok(())
}

/// Call `attempt` until it succeeds, fails with an error that is not
/// retryable, or the policy's retries are used up.
///
/// `attempt` gets the number of restarts so far. Waiting between attempts
/// ends early, with `Ok`, when `shutdown` is cancelled.
///
/// # Errors
///
/// Returns the last error of `attempt`.
pub async fn retry_on_empty_data<F, Fut>(
    policy: &RetryPolicy,
    shutdown: &CancellationToken,
    mut attempt: F,
) -> Result<()>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut retries = 0;
    loop {
        match attempt(retries).await {
            Err(err) if policy.should_retry(&err, retries) => {
                retries += 1;
                let delay = policy.delay_for_attempt(retries);
                warn!(
                    error = %err,
                    retry = retries,
                    max_retries = policy.max_retries(),
                    delay_secs = delay.as_secs(),
                    "Vault returned no secret data, restarting"
                );
                tokio::select! {
                    () = shutdown.cancelled() => return Ok(()),
                    () = tokio::time::sleep(delay) => {}
                }
            }
            result => return result,
        }
    }
}
