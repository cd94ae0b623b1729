//! Resource records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{GroupId, ResourceId, ResourceType, UserName};
use super::principal::Owner;
use crate::error::Result;

/// A typed, owned object that permissions can be granted on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Store-allocated id.
    pub id: ResourceId,
    /// Display name.
    pub resource_name: String,
    /// Type tag.
    pub resource_type: ResourceType,
    /// Owning user or group. Always set for stored resources.
    pub owner: Option<Owner>,
    /// Parent in the resource hierarchy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ResourceId>,
    /// When the resource was created.
    pub created_at: DateTime<Utc>,
}

impl Resource {
    /// Creates a top-level resource.
    pub fn new(
        id: ResourceId,
        resource_name: impl Into<String>,
        resource_type: impl Into<ResourceType>,
        owner: Owner,
    ) -> Self {
        Self {
            id,
            resource_name: resource_name.into(),
            resource_type: resource_type.into(),
            owner: Some(owner),
            parent_id: None,
            created_at: Utc::now(),
        }
    }

    /// Sets the parent resource.
    pub fn with_parent(mut self, parent_id: ResourceId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Returns `true` if `user_name` is the owning user.
    pub fn is_owned_by_user(&self, user_name: &UserName) -> bool {
        self.owner.as_ref().and_then(Owner::as_user) == Some(user_name)
    }

    /// Returns the owning group, if a group owns this resource.
    pub fn owner_group(&self) -> Option<GroupId> {
        self.owner.as_ref().and_then(Owner::as_group)
    }
}

/// Input for creating a resource.
///
/// Mirrors the two nullable owner columns; exactly one must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewResource {
    /// Display name.
    pub resource_name: String,
    /// Type tag.
    pub resource_type: String,
    /// Owning user.
    #[serde(default)]
    pub owner_user_name: Option<UserName>,
    /// Owning group.
    #[serde(default)]
    pub owner_group_id: Option<GroupId>,
    /// Parent resource.
    #[serde(default)]
    pub parent_id: Option<ResourceId>,
}

impl NewResource {
    /// Creates input for a resource of the given type.
    pub fn new(resource_name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            resource_name: resource_name.into(),
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    /// Sets the owning user.
    pub fn owned_by_user(mut self, user_name: impl Into<UserName>) -> Self {
        self.owner_user_name = Some(user_name.into());
        self
    }

    /// Sets the owning group.
    pub fn owned_by_group(mut self, group_id: GroupId) -> Self {
        self.owner_group_id = Some(group_id);
        self
    }

    /// Sets the parent resource.
    pub fn under(mut self, parent_id: ResourceId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Resolves the owner columns into a single [`Owner`].
    pub fn owner(&self) -> Result<Owner> {
        Owner::from_parts(self.owner_user_name.clone(), self.owner_group_id)
    }
}
