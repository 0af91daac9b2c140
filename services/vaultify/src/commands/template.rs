use crate::config::{TemplateOptions, VaultOptions};
use crate::error::Result;
use crate::secrets::{MapSecretReader, SecretReader, VaultSecretReader};
use crate::template::TemplateRenderer;
use std::sync::Arc;
use tracing::info;
use vault_client::VaultClient;

/// Render once, optionally recording the fetched secrets.
///
/// With `--var` the secrets come from the command line and Vault is never
/// contacted.
///
/// # Errors
///
/// Returns an error if the options are invalid, login fails or rendering
/// fails.
pub async fn template(vault: &VaultOptions, options: &TemplateOptions) -> Result<()> {
    let template = options.validate(vault)?;

    let reader: Arc<dyn SecretReader> = if options.is_static() {
        Arc::new(options.vars.iter().cloned().collect::<MapSecretReader>())
    } else {
        let client = VaultClient::login(vault.vault_config()).await?;
        Arc::new(VaultSecretReader::new(client))
    };

    let output = options.source.output();
    let snapshot = TemplateRenderer::new(reader)
        .render_path(&template, output)
        .await?;

    if let Some(path) = &options.secrets_output_file {
        snapshot.write(path).await?;
    }

    info!(
        template = %template.display(),
        secrets = snapshot.len(),
        "Rendered templates"
    );
    if output.is_some() {
        println!("OK");
    }
    Ok(())
}
