//! Lease renewal metrics.
//!
//! The orchestrator reports through the [`LeaseMetrics`] trait. The
//! Prometheus implementation owns its registry so the HTTP endpoint can
//! encode exactly what was registered here.

use prometheus::{CounterVec, Encoder, Opts, Registry, TextEncoder};

const NAMESPACE: &str = "vaultify";

/// Sink for renewal outcomes.
pub trait LeaseMetrics: Send + Sync {
    /// The session token was renewed.
    fn auth_lease_renewed(&self, role: &str, warnings: bool);

    /// The session token renewal stopped.
    fn auth_lease_failed(&self, role: &str);

    /// A secret lease was renewed.
    fn secret_lease_renewed(&self, role: &str, secret: &str, warnings: bool);

    /// A secret lease renewal stopped.
    fn secret_lease_failed(&self, role: &str, secret: &str);
}

/// Metrics sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl LeaseMetrics for NoopMetrics {
    fn auth_lease_renewed(&self, _role: &str, _warnings: bool) {}
    fn auth_lease_failed(&self, _role: &str) {}
    fn secret_lease_renewed(&self, _role: &str, _secret: &str, _warnings: bool) {}
    fn secret_lease_failed(&self, _role: &str, _secret: &str) {}
}

/// Prometheus counters for lease renewal.
pub struct PrometheusMetrics {
    registry: Registry,
    /// Build information, always 1
    pub build_info: CounterVec,
    /// Successful token renewals
    pub auth_lease_renewed: CounterVec,
    /// Stopped token renewals
    pub auth_lease_renewal_failed: CounterVec,
    /// Successful secret lease renewals
    pub secret_lease_renewed: CounterVec,
    /// Stopped secret lease renewals
    pub secret_lease_renewal_failed: CounterVec,
}

impl PrometheusMetrics {
    /// Creates the counters in a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns an error if a metric cannot be registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let build_info = register(
            &registry,
            Opts::new("build_info", "Build information"),
            &["version", "rustc", "commit_hash"],
        )?;
        build_info
            .with_label_values(&[
                env!("CARGO_PKG_VERSION"),
                option_env!("VAULTIFY_RUSTC_VERSION").unwrap_or("unknown"),
                option_env!("VAULTIFY_COMMIT_HASH").unwrap_or("unknown"),
            ])
            .inc();

        let auth_lease_renewed = register(
            &registry,
            Opts::new("auth_lease_renewed", "Number of successful auth token renewals"),
            &["role", "warnings"],
        )?;
        let auth_lease_renewal_failed = register(
            &registry,
            Opts::new("auth_lease_renewal_failed", "Number of failed auth token renewals"),
            &["role"],
        )?;
        let secret_lease_renewed = register(
            &registry,
            Opts::new("secret_lease_renewed", "Number of successful secret lease renewals"),
            &["role", "secret", "warnings"],
        )?;
        let secret_lease_renewal_failed = register(
            &registry,
            Opts::new("secret_lease_renewal_failed", "Number of failed secret lease renewals"),
            &["role", "secret"],
        )?;

        Ok(Self {
            registry,
            build_info,
            auth_lease_renewed,
            auth_lease_renewal_failed,
            secret_lease_renewed,
            secret_lease_renewal_failed,
        })
    }

    /// Registry holding all vaultify metrics.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encode all metrics in the Prometheus text format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn register(registry: &Registry, opts: Opts, labels: &[&str]) -> Result<CounterVec, prometheus::Error> {
    let counter = CounterVec::new(opts.namespace(NAMESPACE), labels)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

const fn warnings_label(warnings: bool) -> &'static str {
    if warnings { "true" } else { "false" }
}

impl LeaseMetrics for PrometheusMetrics {
    fn auth_lease_renewed(&self, role: &str, warnings: bool) {
        self.auth_lease_renewed
            .with_label_values(&[role, warnings_label(warnings)])
            .inc();
    }

    fn auth_lease_failed(&self, role: &str) {
        self.auth_lease_renewal_failed.with_label_values(&[role]).inc();
    }

    fn secret_lease_renewed(&self, role: &str, secret: &str, warnings: bool) {
        self.secret_lease_renewed
            .with_label_values(&[role, secret, warnings_label(warnings)])
            .inc();
    }

    fn secret_lease_failed(&self, role: &str, secret: &str) {
        self.secret_lease_renewal_failed
            .with_label_values(&[role, secret])
            .inc();
    }
}
