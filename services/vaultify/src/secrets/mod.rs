//! Secret readers and the persisted secret snapshot.
//!
//! A [`SecretReader`] answers the `vault(name)` lookups of a template. The
//! static [`MapSecretReader`] serves values given on the command line, the
//! live [`VaultSecretReader`] reads them from a Vault session.

mod map;
mod snapshot;
mod vault;

pub use map::MapSecretReader;
pub use snapshot::SecretSnapshot;
pub use vault::VaultSecretReader;

use crate::error::SecretError;
use async_trait::async_trait;
use vault_client::Secret;

/// Source of named secrets.
#[async_trait]
pub trait SecretReader: Send + Sync {
    /// Fetch the current value of the secret called `name`.
    async fn get(&self, name: &str) -> Result<Secret, SecretError>;

    /// Secret used to authenticate the session, if there is one.
    fn auth_secret(&self) -> Option<Secret>;
}
