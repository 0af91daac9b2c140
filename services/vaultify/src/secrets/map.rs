use super::SecretReader;
use crate::error::SecretError;
use async_trait::async_trait;
use std::collections::HashMap;
use vault_client::{Secret, SecretData};

/// In-memory reader for offline rendering and tests.
#[derive(Debug, Clone, Default)]
pub struct MapSecretReader {
    values: HashMap<String, SecretData>,
}

impl MapSecretReader {
    /// Create a reader serving `values`.
    #[must_use]
    pub const fn new(values: HashMap<String, SecretData>) -> Self {
        Self { values }
    }

    /// Add or replace the secret `name`.
    #[must_use]
    pub fn with_secret(mut self, name: impl Into<String>, data: SecretData) -> Self {
        self.values.insert(name.into(), data);
        self
    }

    /// Number of secrets served.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the reader serves no secrets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, SecretData)> for MapSecretReader {
    fn from_iter<I: IntoIterator<Item = (String, SecretData)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[async_trait]
impl SecretReader for MapSecretReader {
    async fn get(&self, name: &str) -> Result<Secret, SecretError> {
        self.values
            .get(name)
            .map(|data| Secret::from_data(data.clone()))
            .ok_or_else(|| SecretError::NotFound(name.to_string()))
    }

    fn auth_secret(&self) -> Option<Secret> {
        None
    }
}
