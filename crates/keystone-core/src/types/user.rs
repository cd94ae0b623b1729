//! User records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::UserName;

/// Account status flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// Account is usable.
    #[default]
    Active,
    /// Account exists but has been suspended by an administrator.
    Suspended,
}

/// A local user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique user name.
    pub user_name: UserName,
    /// Contact email.
    pub email: String,
    /// Account status.
    #[serde(default)]
    pub status: UserStatus,
    /// When the account was created.
    pub registered_at: DateTime<Utc>,
    /// Last successful login, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Creates an active user registered now.
    pub fn new(user_name: impl Into<UserName>, email: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            email: email.into(),
            status: UserStatus::Active,
            registered_at: Utc::now(),
            last_login_at: None,
        }
    }

    /// Returns `true` if the account is active.
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Input for creating a user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUser {
    /// Unique user name.
    pub user_name: String,
    /// Contact email.
    pub email: String,
    /// Initial status.
    #[serde(default)]
    pub status: UserStatus,
}

impl NewUser {
    /// Creates input for an active user.
    pub fn new(user_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            email: email.into(),
            status: UserStatus::Active,
        }
    }
}
