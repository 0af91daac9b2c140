//! Shared library for cross-cutting concerns in vaultify crates.
//!
//! This crate provides centralized implementations for:
//! - Error types with retryability classification
//! - HTTP client configuration and building
//! - Retry policies with exponential or fixed backoff
//! - Tracing subscriber initialisation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod http;
pub mod retry;
pub mod tracing_config;

pub use error::PlatformError;
pub use http::{HttpConfig, build_http_client};
pub use retry::{RetryConfig, RetryPolicy, Retryable};
pub use tracing_config::{TracingConfig, init_tracing};
