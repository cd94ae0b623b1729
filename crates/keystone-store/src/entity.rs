//! Generic entity envelope and natural keys used by the store contract.

use keystone_core::{
    ExternalIdentity, ExternalIdentityKey, Group, GroupId, Resource, ResourceId, User, UserName,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Any stored entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    /// A user row.
    User(User),
    /// A group row.
    Group(Group),
    /// A resource row.
    Resource(Resource),
    /// An external identity row.
    ExternalIdentity(ExternalIdentity),
}

impl Entity {
    /// The natural key of this entity.
    pub fn key(&self) -> EntityKey {
        match self {
            Self::User(user) => EntityKey::User(user.user_name.clone()),
            Self::Group(group) => EntityKey::Group(group.id),
            Self::Resource(resource) => EntityKey::Resource(resource.id),
            Self::ExternalIdentity(identity) => EntityKey::ExternalIdentity(identity.key()),
        }
    }

    /// Entity kind name used in errors and logs.
    pub fn kind(&self) -> &'static str {
        self.key().kind()
    }
}

/// Lookup key for [`Entity`] values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    /// User by name.
    User(UserName),
    /// Group by id.
    Group(GroupId),
    /// Group by its unique name.
    GroupName(String),
    /// Resource by id.
    Resource(ResourceId),
    /// External identity by composite key.
    ExternalIdentity(ExternalIdentityKey),
}

impl EntityKey {
    /// Entity kind name used in errors and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Group(_) | Self::GroupName(_) => "group",
            Self::Resource(_) => "resource",
            Self::ExternalIdentity(_) => "external identity",
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(name) => write!(f, "{name}"),
            Self::Group(id) => write!(f, "{id}"),
            Self::GroupName(name) => write!(f, "{name}"),
            Self::Resource(id) => write!(f, "{id}"),
            Self::ExternalIdentity(key) => write!(f, "{key}"),
        }
    }
}

impl From<User> for Entity {
    fn from(user: User) -> Self {
        Self::User(user)
    }
}

impl From<Group> for Entity {
    fn from(group: Group) -> Self {
        Self::Group(group)
    }
}

impl From<Resource> for Entity {
    fn from(resource: Resource) -> Self {
        Self::Resource(resource)
    }
}

impl From<ExternalIdentity> for Entity {
    fn from(identity: ExternalIdentity) -> Self {
        Self::ExternalIdentity(identity)
    }
}
