//! External (third-party) identities linked to local users.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::UserName;

/// Composite primary key of an [`ExternalIdentity`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExternalIdentityKey {
    /// Id assigned by the provider.
    pub external_id: String,
    /// Provider name, e.g. `"github"`.
    pub provider_name: String,
    /// Local user the identity belongs to.
    pub local_user_name: UserName,
}

impl fmt::Display for ExternalIdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}@{}",
            self.provider_name, self.external_id, self.local_user_name
        )
    }
}

/// A third-party identity mapped to a local user. Not used for resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    /// Id assigned by the provider.
    pub external_id: String,
    /// Provider name.
    pub provider_name: String,
    /// Local user the identity belongs to.
    pub local_user_name: UserName,
    /// User name at the provider.
    #[serde(default)]
    pub external_user_name: String,
    /// OAuth access token.
    #[serde(default)]
    pub access_token: String,
    /// Secondary token (e.g. refresh token).
    #[serde(default)]
    pub alt_token: String,
    /// OAuth1 token secret.
    #[serde(default)]
    pub token_secret: String,
}

impl ExternalIdentity {
    /// Creates an identity with empty token fields.
    pub fn new(
        external_id: impl Into<String>,
        provider_name: impl Into<String>,
        local_user_name: impl Into<UserName>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            provider_name: provider_name.into(),
            local_user_name: local_user_name.into(),
            external_user_name: String::new(),
            access_token: String::new(),
            alt_token: String::new(),
            token_secret: String::new(),
        }
    }

    /// Returns the composite key.
    pub fn key(&self) -> ExternalIdentityKey {
        ExternalIdentityKey {
            external_id: self.external_id.clone(),
            provider_name: self.provider_name.clone(),
            local_user_name: self.local_user_name.clone(),
        }
    }
}
