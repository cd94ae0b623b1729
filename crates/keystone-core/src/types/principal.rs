//! Principals: anything that can hold permissions or own resources.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{GroupId, UserName};
use crate::error::{Error, Result};

/// A user or a group.
///
/// Ordering puts users before groups, which keeps grant listings stable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Principal {
    /// A single user.
    User(UserName),
    /// A group of users.
    Group(GroupId),
}

/// Resource owner. Ownership is exclusive: one user or one group.
pub type Owner = Principal;

impl Principal {
    /// Shorthand for a user principal.
    pub fn user(name: impl Into<UserName>) -> Self {
        Self::User(name.into())
    }

    /// Shorthand for a group principal.
    pub fn group(id: GroupId) -> Self {
        Self::Group(id)
    }

    /// Builds an owner from the two nullable owner columns of a resource.
    ///
    /// Exactly one side must be set.
    ///
    /// # Examples
    ///
    /// ```
    /// use keystone_core::{GroupId, Owner, UserName};
    ///
    /// let owner = Owner::from_parts(Some(UserName::new("alice")), None).unwrap();
    /// assert!(owner.as_user().is_some());
    ///
    /// assert!(Owner::from_parts(Some(UserName::new("alice")), Some(GroupId::new(1))).is_err());
    /// assert!(Owner::from_parts(None, None).is_err());
    /// ```
    pub fn from_parts(user: Option<UserName>, group: Option<GroupId>) -> Result<Self> {
        match (user, group) {
            (Some(user), None) => Ok(Self::User(user)),
            (None, Some(group)) => Ok(Self::Group(group)),
            (Some(_), Some(_)) => Err(Error::validation_field(
                "owner",
                "resource cannot be owned by both a user and a group",
            )),
            (None, None) => Err(Error::validation_field("owner", "resource must have an owner")),
        }
    }

    /// Returns the user name for a user principal.
    pub fn as_user(&self) -> Option<&UserName> {
        match self {
            Self::User(name) => Some(name),
            Self::Group(_) => None,
        }
    }

    /// Returns the group id for a group principal.
    pub fn as_group(&self) -> Option<GroupId> {
        match self {
            Self::User(_) => None,
            Self::Group(id) => Some(*id),
        }
    }

    /// Entity kind name used in errors and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Group(_) => "group",
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(name) => write!(f, "user:{name}"),
            Self::Group(id) => write!(f, "group:{id}"),
        }
    }
}

impl From<UserName> for Principal {
    fn from(name: UserName) -> Self {
        Self::User(name)
    }
}

impl From<GroupId> for Principal {
    fn from(id: GroupId) -> Self {
        Self::Group(id)
    }
}
