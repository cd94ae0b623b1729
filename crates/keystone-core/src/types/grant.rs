//! Grants and memberships.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{GroupId, ResourceId, ResourceType, UserName};
use super::principal::Principal;

/// What a grant applies to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "target", rename_all = "snake_case")]
pub enum GrantScope {
    /// App-wide capability, independent of any resource.
    App,
    /// Every current and future resource of a type.
    ResourceType(ResourceType),
    /// One resource instance.
    Resource(ResourceId),
}

impl GrantScope {
    /// Returns `true` for resource-type and resource-instance scopes.
    pub fn is_resource_scoped(&self) -> bool {
        !matches!(self, Self::App)
    }
}

impl fmt::Display for GrantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::App => write!(f, "app"),
            Self::ResourceType(t) => write!(f, "type:{t}"),
            Self::Resource(id) => write!(f, "resource:{id}"),
        }
    }
}

/// A stored `(principal, perm_name, scope)` tuple.
///
/// The whole tuple is the key: granting it twice stores it once.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Grant {
    /// Holder of the permission.
    pub principal: Principal,
    /// Free-form permission name.
    pub perm_name: String,
    /// Scope of the grant.
    pub scope: GrantScope,
}

impl Grant {
    /// Creates a grant.
    pub fn new(principal: Principal, perm_name: impl Into<String>, scope: GrantScope) -> Self {
        Self {
            principal,
            perm_name: perm_name.into(),
            scope,
        }
    }

    /// App-wide grant.
    pub fn app(principal: Principal, perm_name: impl Into<String>) -> Self {
        Self::new(principal, perm_name, GrantScope::App)
    }

    /// Grant on a single resource.
    pub fn resource(principal: Principal, perm_name: impl Into<String>, id: ResourceId) -> Self {
        Self::new(principal, perm_name, GrantScope::Resource(id))
    }

    /// Wildcard grant on every resource of a type.
    pub fn resource_type(
        principal: Principal,
        perm_name: impl Into<String>,
        resource_type: impl Into<ResourceType>,
    ) -> Self {
        Self::new(
            principal,
            perm_name,
            GrantScope::ResourceType(resource_type.into()),
        )
    }
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} on {}", self.principal, self.perm_name, self.scope)
    }
}

/// A user's membership in a group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Membership {
    /// Member.
    pub user_name: UserName,
    /// Group.
    pub group_id: GroupId,
}

impl Membership {
    /// Creates a membership pair.
    pub fn new(user_name: impl Into<UserName>, group_id: GroupId) -> Self {
        Self {
            user_name: user_name.into(),
            group_id,
        }
    }
}
