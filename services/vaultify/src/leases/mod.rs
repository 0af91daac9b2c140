//! Lease renewal orchestration.
//!
//! One renewal task runs per renewable lease: the session token plus every
//! renewable secret fetched while rendering. The first task that stops
//! decides the outcome for all of them.

mod orchestrator;
mod task;

pub use orchestrator::{LeaseOrchestrator, RenewalSet};

use std::fmt;

/// Which lease a renewal task keeps alive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LeaseIdentity {
    /// The session token.
    Auth,
    /// A secret, by the name it was fetched under.
    Secret(String),
}

impl LeaseIdentity {
    /// Identity of the secret fetched as `name`.
    pub fn secret(name: impl Into<String>) -> Self {
        Self::Secret(name.into())
    }
}

impl fmt::Display for LeaseIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth => f.write_str("auth"),
            Self::Secret(name) => f.write_str(name),
        }
    }
}
