//! Command line and environment configuration.
//!
//! Every flag can also be set through the environment, and a `.env` file in
//! the working directory is loaded first. Options are validated before any
//! request reaches Vault.

use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use vault_client::config::DEFAULT_TOKEN_PATH;
use vault_client::{SecretData, VaultConfig};

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Missing required option
    #[error("Missing required configuration: {0}")]
    MissingRequired(&'static str),

    /// Template file does not exist or is not a regular file
    #[error("Invalid template file {}: {reason}", .path.display())]
    InvalidTemplateFile {
        /// Offending path
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// Invalid option value
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue {
        /// Option name
        name: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Render templates from Vault secrets and keep their leases alive.
#[derive(Parser, Debug)]
#[command(name = "vaultify", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v warn, -vv info, -vvv debug, -vvvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log as JSON
    #[arg(long, env = "VAULTIFY_JSON_LOGS", global = true)]
    pub json_logs: bool,

    #[command(flatten)]
    pub vault: VaultOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// vaultify subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render templates once
    Template(TemplateOptions),
    /// Renew the leases recorded in a secrets file
    RenewLeases(RenewLeasesOptions),
    /// Render templates and keep their leases alive
    Run(RunOptions),
}

impl Command {
    /// Subcommand name as typed on the command line.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Template(_) => "template",
            Self::RenewLeases(_) => "renew-leases",
            Self::Run(_) => "run",
        }
    }

    /// Help text of this subcommand.
    #[must_use]
    pub fn usage(&self) -> String {
        let mut cli = Cli::command();
        match cli.find_subcommand_mut(self.name()) {
            Some(subcommand) => subcommand.render_help().to_string(),
            None => cli.render_help().to_string(),
        }
    }
}

/// Vault connection options.
#[derive(Args, Debug, Clone)]
pub struct VaultOptions {
    /// Vault address
    #[arg(long = "vault", env = "VAULT_ADDR", global = true, default_value = "https://127.0.0.1:8200")]
    pub address: String,

    /// Kubernetes auth role
    #[arg(long, env = "VAULT_ROLE", global = true)]
    pub role: Option<String>,

    /// Mount path of the Kubernetes auth method
    #[arg(long, env = "VAULT_AUTH_PATH", global = true, default_value = "auth/kubernetes")]
    pub auth_path: String,

    /// Service account token used to log in
    #[arg(long, env = "VAULT_K8S_TOKEN_PATH", global = true, default_value = DEFAULT_TOKEN_PATH)]
    pub token_path: String,

    /// Vault client timeout in seconds
    #[arg(long, env = "VAULT_CLIENT_TIMEOUT", global = true, default_value = "60", value_parser = parse_seconds)]
    pub timeout: Duration,

    /// Retries of failed Vault requests
    #[arg(long, env = "VAULT_MAX_RETRIES", global = true, default_value_t = 2)]
    pub max_retries: u32,

    /// Minimum interval between Vault requests in milliseconds
    #[arg(long, env = "VAULT_RATE_LIMIT", global = true, value_parser = parse_millis)]
    pub rate_limit: Option<Duration>,

    /// Requests allowed in a burst above the rate limit
    #[arg(long, env = "VAULT_RATE_LIMIT_BURST", global = true, default_value_t = 1)]
    pub rate_limit_burst: u32,

    /// Skip TLS verification of the Vault server
    #[arg(long, env = "VAULT_SKIP_VERIFY", global = true)]
    pub tls_skip_verify: bool,
}

impl VaultOptions {
    /// Client configuration for these options.
    #[must_use]
    pub fn vault_config(&self) -> VaultConfig {
        let mut config = VaultConfig::new(&self.address, self.role.clone().unwrap_or_default())
            .with_timeout(self.timeout)
            .with_max_retries(self.max_retries)
            .with_token_path(&self.token_path)
            .with_auth_mount_path(&self.auth_path);
        if let Some(interval) = self.rate_limit {
            config = config.with_rate_limit(interval, self.rate_limit_burst);
        }
        config.tls_skip_verify = self.tls_skip_verify;
        config
    }

    /// Check the options needed to log in.
    ///
    /// # Errors
    ///
    /// Returns an error if no role is set or the client config is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.role.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingRequired("--role"));
        }
        self.vault_config()
            .validate()
            .map_err(|e| ConfigError::InvalidValue {
                name: "--vault",
                reason: e.to_string(),
            })
    }
}

/// Where templates are read from and rendered to.
#[derive(Args, Debug, Clone, Default)]
pub struct TemplateSource {
    /// Template file to render (deprecated, use --template-path)
    #[arg(long)]
    pub template_file: Option<PathBuf>,

    /// Template file or directory to render
    #[arg(long)]
    pub template_path: Option<PathBuf>,

    /// Rendered output file or directory
    #[arg(long)]
    pub output_path: Option<PathBuf>,
}

impl TemplateSource {
    /// Resolve the template path, honouring the deprecated alias.
    ///
    /// # Errors
    ///
    /// Returns an error if no template is given or the alias does not point
    /// to a regular file.
    pub fn template(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.template_file {
            check_regular_file(path)?;
            return Ok(path.clone());
        }
        self.template_path
            .clone()
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or(ConfigError::MissingRequired("--template-path"))
    }

    /// Output path, if one was given.
    #[must_use]
    pub fn output(&self) -> Option<&Path> {
        self.output_path
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }

    fn required_output(&self) -> Result<&Path, ConfigError> {
        self.output().ok_or(ConfigError::MissingRequired("--output-path"))
    }
}

fn check_regular_file(path: &Path) -> Result<(), ConfigError> {
    let metadata = std::fs::metadata(path).map_err(|e| ConfigError::InvalidTemplateFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if !metadata.is_file() {
        return Err(ConfigError::InvalidTemplateFile {
            path: path.to_path_buf(),
            reason: "not a regular file".to_string(),
        });
    }
    Ok(())
}

/// Options of `template`.
#[derive(Args, Debug, Clone, Default)]
pub struct TemplateOptions {
    #[command(flatten)]
    pub source: TemplateSource,

    /// File recording the fetched secrets for `renew-leases`
    #[arg(long)]
    pub secrets_output_file: Option<PathBuf>,

    /// Static secret as name=<json object>, replaces Vault lookups
    #[arg(long = "var", value_parser = parse_var)]
    pub vars: Vec<(String, SecretData)>,
}

impl TemplateOptions {
    /// True if secrets come from `--var` instead of Vault.
    #[must_use]
    pub fn is_static(&self) -> bool {
        !self.vars.is_empty()
    }

    /// Validate the options and return the template path.
    ///
    /// # Errors
    ///
    /// Returns the first invalid or missing option.
    pub fn validate(&self, vault: &VaultOptions) -> Result<PathBuf, ConfigError> {
        let template = self.source.template()?;
        if self.is_static() {
            return Ok(template);
        }
        self.source.required_output()?;
        if self.secrets_output_file.is_none() {
            return Err(ConfigError::MissingRequired("--secrets-output-file"));
        }
        vault.validate()?;
        Ok(template)
    }
}

/// Metrics and health endpoint options.
#[derive(Args, Debug, Clone)]
pub struct MetricsOptions {
    /// Address serving metrics and health endpoints
    #[arg(long, env = "VAULTIFY_METRICS_ADDRESS")]
    pub metrics_address: Option<SocketAddr>,

    /// Path of the metrics endpoint
    #[arg(long, env = "VAULTIFY_METRICS_PATH", default_value = "/metrics")]
    pub metrics_path: String,
}

impl Default for MetricsOptions {
    fn default() -> Self {
        Self {
            metrics_address: None,
            metrics_path: "/metrics".to_string(),
        }
    }
}

impl MetricsOptions {
    /// Check the metrics path can be routed.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, contains route
    /// parameters or wildcards, or clashes with a health endpoint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidValue {
            name: "--metrics-path",
            reason: reason.to_string(),
        };
        if !self.metrics_path.starts_with('/') || self.metrics_path.len() < 2 {
            return Err(invalid("must start with '/' and name a path"));
        }
        let dynamic = self
            .metrics_path
            .split('/')
            .any(|segment| segment.starts_with([':', '*']) || segment.contains(['{', '}']));
        if dynamic {
            return Err(invalid("must be a literal path without ':', '*', '{' or '}'"));
        }
        if matches!(self.metrics_path.as_str(), "/healthz" | "/readyz") {
            return Err(invalid("clashes with a health endpoint"));
        }
        Ok(())
    }
}

/// Options of `renew-leases`.
#[derive(Args, Debug, Clone, Default)]
pub struct RenewLeasesOptions {
    /// Secrets file written by `template --secrets-output-file`
    #[arg(long)]
    pub secrets_file: Option<PathBuf>,

    #[command(flatten)]
    pub metrics: MetricsOptions,
}

impl RenewLeasesOptions {
    /// Validate the options and return the secrets file.
    ///
    /// # Errors
    ///
    /// Returns the first invalid or missing option.
    pub fn validate(&self) -> Result<&Path, ConfigError> {
        self.metrics.validate()?;
        self.secrets_file
            .as_deref()
            .ok_or(ConfigError::MissingRequired("--secrets-file"))
    }
}

/// Options of `run`.
#[derive(Args, Debug, Clone)]
pub struct RunOptions {
    #[command(flatten)]
    pub source: TemplateSource,

    #[command(flatten)]
    pub metrics: MetricsOptions,

    /// Restarts after Vault answered a renewal without data
    #[arg(long, env = "VAULTIFY_RENEWAL_RETRIES", default_value_t = 3)]
    pub renewal_retries: u32,

    /// Seconds to wait before such a restart
    #[arg(long, env = "VAULTIFY_RETRY_DELAY", default_value = "10", value_parser = parse_seconds)]
    pub retry_delay: Duration,
}

impl RunOptions {
    /// Validate the options and return template and output paths.
    ///
    /// # Errors
    ///
    /// Returns the first invalid or missing option.
    pub fn validate(&self, vault: &VaultOptions) -> Result<(PathBuf, PathBuf), ConfigError> {
        let template = self.source.template()?;
        let output = self.source.required_output()?.to_path_buf();
        self.metrics.validate()?;
        vault.validate()?;
        Ok((template, output))
    }
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    value
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| format!("expected whole seconds: {e}"))
}

fn parse_millis(value: &str) -> Result<Duration, String> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| format!("expected milliseconds: {e}"))
}

fn parse_var(value: &str) -> Result<(String, SecretData), String> {
    let (name, json) = value
        .split_once('=')
        .ok_or_else(|| "expected name=<json object>".to_string())?;
    if name.is_empty() {
        return Err("secret name must not be empty".to_string());
    }
    let data = serde_json::from_str::<SecretData>(json)
        .map_err(|e| format!("{name}: expected a JSON object: {e}"))?;
    Ok((name.to_string(), data))
}
