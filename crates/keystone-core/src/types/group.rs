//! Group records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::ids::GroupId;

/// A named set of users that can hold permissions and own resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// Store-allocated id.
    pub id: GroupId,
    /// Unique group name.
    pub group_name: String,
    /// Free-form description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Number of members. Maintained by the store; caller-supplied values
    /// are overwritten on commit.
    #[serde(default)]
    pub member_count: u64,
    /// App-wide permission names this group may be granted.
    #[serde(default)]
    pub possible_permissions: BTreeSet<String>,
    /// When the group was created.
    pub created_at: DateTime<Utc>,
}

impl Group {
    /// Creates an empty group with no allowed permissions.
    pub fn new(id: GroupId, group_name: impl Into<String>) -> Self {
        Self {
            id,
            group_name: group_name.into(),
            description: None,
            member_count: 0,
            possible_permissions: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }

    /// Returns `true` if `perm_name` is in the allow-list.
    pub fn allows_permission(&self, perm_name: &str) -> bool {
        self.possible_permissions.contains(perm_name)
    }
}

/// Input for creating a group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewGroup {
    /// Unique group name.
    pub group_name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// App-wide permission names the group may be granted.
    #[serde(default)]
    pub possible_permissions: BTreeSet<String>,
}

impl NewGroup {
    /// Creates input for a group with the given name.
    pub fn new(group_name: impl Into<String>) -> Self {
        Self {
            group_name: group_name.into(),
            ..Default::default()
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the allow-list of app-wide permissions.
    pub fn with_possible_permissions<I, S>(mut self, perms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.possible_permissions = perms.into_iter().map(Into::into).collect();
        self
    }
}
