//! Records every secret a render pass fetched.

use crate::error::SecretError;
use crate::secrets::{SecretReader, SecretSnapshot};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use vault_client::Secret;

/// Secret reader wrapper that remembers what it handed out.
///
/// The last fetch of a name wins. The auth secret is captured once when the
/// tracker is created.
pub struct SecretTracker {
    reader: Arc<dyn SecretReader>,
    auth_secret: Option<Secret>,
    secrets: Mutex<BTreeMap<String, Secret>>,
}

impl SecretTracker {
    /// Track lookups made through `reader`.
    #[must_use]
    pub fn new(reader: Arc<dyn SecretReader>) -> Self {
        let auth_secret = reader.auth_secret();
        Self {
            reader,
            auth_secret,
            secrets: Mutex::new(BTreeMap::new()),
        }
    }

    /// Fetch `name` and record the result.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::EmptyName`] for an empty name without calling
    /// the reader, or the reader's error.
    pub async fn get(&self, name: &str) -> Result<Secret, SecretError> {
        if name.is_empty() {
            return Err(SecretError::EmptyName);
        }

        let secret = self.reader.get(name).await?;
        debug!(name, renewable = secret.renewable, "Fetched secret");
        self.secrets.lock().insert(name.to_string(), secret.clone());
        Ok(secret)
    }

    /// Copy of everything tracked so far.
    #[must_use]
    pub fn snapshot(&self) -> SecretSnapshot {
        SecretSnapshot {
            auth_secret: self.auth_secret.clone(),
            secrets: self.secrets.lock().clone(),
        }
    }

    /// Consume the tracker and return what it recorded.
    #[must_use]
    pub fn into_snapshot(self) -> SecretSnapshot {
        SecretSnapshot {
            auth_secret: self.auth_secret,
            secrets: self.secrets.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::MapSecretReader;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vault_client::SecretData;

    fn data(key: &str, value: &str) -> SecretData {
        let mut data = SecretData::new();
        data.insert(key.to_string(), json!(value));
        data
    }

    struct CountingReader {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SecretReader for CountingReader {
        async fn get(&self, name: &str) -> Result<Secret, SecretError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(SecretError::NotFound(name.to_string()))
        }

        fn auth_secret(&self) -> Option<Secret> {
            Some(Secret::default())
        }
    }

    #[tokio::test]
    async fn test_records_fetched_secrets() {
        let reader = MapSecretReader::default()
            .with_secret("secret/a", data("k", "a"))
            .with_secret("secret/b", data("k", "b"));
        let tracker = SecretTracker::new(Arc::new(reader));

        tracker.get("secret/a").await.unwrap();
        tracker.get("secret/a").await.unwrap();

        let snapshot = tracker.into_snapshot();
        assert_eq!(snapshot.names().collect::<Vec<_>>(), vec!["secret/a"]);
        assert!(snapshot.auth_secret.is_none());
    }

    #[tokio::test]
    async fn test_failed_lookup_is_not_recorded() {
        let tracker = SecretTracker::new(Arc::new(MapSecretReader::default()));

        let err = tracker.get("secret/missing").await.unwrap_err();

        assert!(err.is_not_found());
        assert!(tracker.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_empty_name_skips_reader() {
        let reader = Arc::new(CountingReader {
            calls: AtomicUsize::new(0),
        });
        let tracker = SecretTracker::new(reader.clone());

        let err = tracker.get("").await.unwrap_err();

        assert!(matches!(err, SecretError::EmptyName));
        assert_eq!(reader.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_auth_secret_captured_at_construction() {
        let reader = Arc::new(CountingReader {
            calls: AtomicUsize::new(0),
        });
        let tracker = SecretTracker::new(reader);
        assert!(tracker.snapshot().auth_secret.is_some());
    }
}
