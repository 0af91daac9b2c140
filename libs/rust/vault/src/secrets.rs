//! Secret types as returned by the Vault HTTP API.
//!
//! A [`Secret`] is the generic response envelope of every logical read,
//! login and renewal. Data values and client tokens never appear in `Debug`
//! output.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute map carried by a secret.
pub type SecretData = Map<String, Value>;

/// Vault response envelope.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    /// Request id assigned by Vault
    #[serde(default, deserialize_with = "null_as_default")]
    pub request_id: String,
    /// Lease id, empty for non-leased data
    #[serde(default, deserialize_with = "null_as_default")]
    pub lease_id: String,
    /// Lease duration in seconds
    #[serde(default)]
    pub lease_duration: u64,
    /// Whether the lease can be renewed
    #[serde(default)]
    pub renewable: bool,
    /// Secret payload
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: SecretData,
    /// Warnings attached by Vault, e.g. a lease approaching its max TTL
    #[serde(default, deserialize_with = "null_as_default")]
    pub warnings: Vec<String>,
    /// Authentication block of login and token renewal responses
    #[serde(default)]
    pub auth: Option<SecretAuth>,
}

/// Authentication information of a login response.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretAuth {
    /// Token used for subsequent requests
    pub client_token: String,
    /// Token accessor
    #[serde(default, deserialize_with = "null_as_default")]
    pub accessor: String,
    /// Policies attached to the token
    #[serde(default, deserialize_with = "null_as_default")]
    pub policies: Vec<String>,
    /// Token policies
    #[serde(default, deserialize_with = "null_as_default")]
    pub token_policies: Vec<String>,
    /// Auth method metadata (contains `role` for Kubernetes logins)
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: BTreeMap<String, String>,
    /// Token TTL in seconds
    #[serde(default)]
    pub lease_duration: u64,
    /// Whether the token can be renewed
    #[serde(default)]
    pub renewable: bool,
    /// Identity entity id
    #[serde(default, deserialize_with = "null_as_default")]
    pub entity_id: String,
}

/// Lease metadata of a secret, without its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaseInfo<'a> {
    /// Request id
    pub request_id: &'a str,
    /// Lease id, or the token accessor for auth secrets
    pub lease_id: &'a str,
    /// Lease duration in seconds
    pub lease_duration: u64,
    /// Whether the lease can be renewed
    pub renewable: bool,
    /// Vault warnings
    pub warnings: &'a [String],
}

impl Secret {
    /// Create a non-leased secret holding `data`.
    #[must_use]
    pub fn from_data(data: SecretData) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// True if this secret carries an authentication block.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        self.auth.is_some()
    }

    /// True if Vault attached any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Renewability of the lease, taken from the auth block for tokens.
    #[must_use]
    pub fn is_renewable(&self) -> bool {
        self.auth.as_ref().map_or(self.renewable, |auth| auth.renewable)
    }

    /// Lease duration in seconds, taken from the auth block for tokens.
    #[must_use]
    pub fn effective_lease_duration(&self) -> u64 {
        self.auth
            .as_ref()
            .map_or(self.lease_duration, |auth| auth.lease_duration)
    }

    /// Role stored in the token metadata of a Kubernetes login.
    #[must_use]
    pub fn token_role(&self) -> Option<&str> {
        self.auth
            .as_ref()
            .and_then(|auth| auth.metadata.get("role"))
            .map(String::as_str)
    }

    /// Lease metadata suitable for logging.
    #[must_use]
    pub fn lease_info(&self) -> LeaseInfo<'_> {
        let lease_id = match &self.auth {
            Some(auth) => auth.accessor.as_str(),
            None => self.lease_id.as_str(),
        };
        LeaseInfo {
            request_id: &self.request_id,
            lease_id,
            lease_duration: self.effective_lease_duration(),
            renewable: self.is_renewable(),
            warnings: &self.warnings,
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.data.keys().map(String::as_str).collect();
        f.debug_struct("Secret")
            .field("request_id", &self.request_id)
            .field("lease_id", &self.lease_id)
            .field("lease_duration", &self.lease_duration)
            .field("renewable", &self.renewable)
            .field("data", &format_args!("[REDACTED] {keys:?}"))
            .field("warnings", &self.warnings)
            .field("auth", &self.auth)
            .finish()
    }
}

impl fmt::Debug for SecretAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretAuth")
            .field("client_token", &"[REDACTED]")
            .field("accessor", &self.accessor)
            .field("policies", &self.policies)
            .field("metadata", &self.metadata)
            .field("lease_duration", &self.lease_duration)
            .field("renewable", &self.renewable)
            .finish_non_exhaustive()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
