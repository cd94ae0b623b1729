//! Storage abstraction traits.
//!
//! The persistence collaborator is split in two:
//!
//! - [`EntityStore`]: the handle callers hold. Hands out snapshots, applies
//!   atomic [`WriteBatch`]es, and allocates ids.
//! - [`StoreReader`]: an immutable, consistent view returned by
//!   [`EntityStore::snapshot`]. Every read of one logical operation goes
//!   through one reader so it never mixes pre- and post-commit state.

use async_trait::async_trait;
use keystone_core::{
    ExternalIdentity, ExternalIdentityKey, Grant, GrantScope, Group, GroupId, Membership, Owner,
    Principal, Resource, ResourceId, ResourceType, Result, User, UserName,
};
use std::sync::Arc;

use crate::batch::WriteBatch;
use crate::entity::{Entity, EntityKey};

// ============================================================================
// Filters
// ============================================================================

/// Filter for [`StoreReader::list_users`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserFilter {
    /// Restrict to these user names.
    pub user_names: Option<Vec<UserName>>,
    /// Case-insensitive substring of the user name.
    pub name_contains: Option<String>,
    /// Case-insensitive exact email.
    pub email: Option<String>,
}

impl UserFilter {
    /// Returns `true` if `user` passes the filter.
    pub fn matches(&self, user: &User) -> bool {
        if let Some(names) = &self.user_names {
            if !names.contains(&user.user_name) {
                return false;
            }
        }
        if let Some(needle) = &self.name_contains {
            let haystack = user.user_name.as_str().to_lowercase();
            if !haystack.contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if let Some(email) = &self.email {
            if !user.email.eq_ignore_ascii_case(email) {
                return false;
            }
        }
        true
    }
}

/// Parent constraint for [`ResourceFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentFilter {
    /// Only top-level resources.
    Root,
    /// Only direct children of this resource.
    Of(ResourceId),
}

/// Filter for [`StoreReader::list_resources`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceFilter {
    /// Restrict to these ids.
    pub ids: Option<Vec<ResourceId>>,
    /// Restrict to these types.
    pub types: Option<Vec<ResourceType>>,
    /// Restrict to resources owned by this principal.
    pub owner: Option<Owner>,
    /// Restrict by parent.
    pub parent: Option<ParentFilter>,
}

impl ResourceFilter {
    /// Returns `true` if `resource` passes the filter.
    pub fn matches(&self, resource: &Resource) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.contains(&resource.id) {
                return false;
            }
        }
        if let Some(types) = &self.types {
            if !types.contains(&resource.resource_type) {
                return false;
            }
        }
        if let Some(owner) = &self.owner {
            if resource.owner.as_ref() != Some(owner) {
                return false;
            }
        }
        match self.parent {
            Some(ParentFilter::Root) => resource.parent_id.is_none(),
            Some(ParentFilter::Of(parent)) => resource.parent_id == Some(parent),
            None => true,
        }
    }
}

/// Filter for [`StoreReader::list_external_identities`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalIdentityFilter {
    /// Restrict to one local user.
    pub local_user_name: Option<UserName>,
    /// Restrict to one provider-assigned id.
    pub external_id: Option<String>,
    /// Restrict to one provider.
    pub provider_name: Option<String>,
}

impl ExternalIdentityFilter {
    /// Returns `true` if `identity` passes the filter.
    pub fn matches(&self, identity: &ExternalIdentity) -> bool {
        self.local_user_name
            .as_ref()
            .is_none_or(|name| *name == identity.local_user_name)
            && self
                .external_id
                .as_ref()
                .is_none_or(|id| *id == identity.external_id)
            && self
                .provider_name
                .as_ref()
                .is_none_or(|p| *p == identity.provider_name)
    }
}

/// Side of the membership relation to query from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipSubject {
    /// Groups of a user, ordered by group name.
    User(UserName),
    /// Members of a group, ordered by user name.
    Group(GroupId),
}

/// Scope filter for grant queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantFilter {
    /// Every grant.
    All,
    /// App-wide grants only.
    App,
    /// Resource-type and resource-instance grants.
    Resources,
    /// Grants with exactly this scope.
    Exact(GrantScope),
    /// Grants that apply to one resource: instance grants on it plus
    /// wildcard grants on its type.
    Target {
        /// The resource.
        resource_id: ResourceId,
        /// Its type.
        resource_type: ResourceType,
    },
}

impl GrantFilter {
    /// Returns `true` if a grant with `scope` passes the filter.
    pub fn matches(&self, scope: &GrantScope) -> bool {
        match self {
            Self::All => true,
            Self::App => matches!(scope, GrantScope::App),
            Self::Resources => scope.is_resource_scoped(),
            Self::Exact(expected) => expected == scope,
            Self::Target {
                resource_id,
                resource_type,
            } => match scope {
                GrantScope::App => false,
                GrantScope::ResourceType(t) => t == resource_type,
                GrantScope::Resource(id) => id == resource_id,
            },
        }
    }
}

/// Id sequences allocated by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sequence {
    /// Group ids.
    Group,
    /// Resource ids.
    Resource,
}

// ============================================================================
// Traits
// ============================================================================

/// Consistent, read-only view of the store.
///
/// A "not found" lookup is `Ok(None)`; errors mean the backend failed.
#[async_trait]
pub trait StoreReader: Send + Sync {
    /// Fetch an entity by natural key.
    async fn find_by_key(&self, key: &EntityKey) -> Result<Option<Entity>>;

    /// Users matching `filter`, ordered by user name.
    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>>;

    /// All groups, ordered by group name.
    async fn list_groups(&self) -> Result<Vec<Group>>;

    /// Resources matching `filter`, ordered by id.
    async fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Resource>>;

    /// External identities matching `filter`.
    async fn list_external_identities(
        &self,
        filter: &ExternalIdentityFilter,
    ) -> Result<Vec<ExternalIdentity>>;

    /// Memberships seen from one side. See [`MembershipSubject`] for ordering.
    async fn query_memberships(&self, subject: &MembershipSubject) -> Result<Vec<Membership>>;

    /// Grants held by `principal` whose scope passes `filter`, in key order.
    async fn query_grants(&self, principal: &Principal, filter: &GrantFilter) -> Result<Vec<Grant>>;

    /// Grants held by anyone whose scope passes `filter`, in key order.
    async fn query_grants_any_principal(&self, filter: &GrantFilter) -> Result<Vec<Grant>>;

    /// Fetch a user by name.
    async fn find_user(&self, user_name: &UserName) -> Result<Option<User>> {
        match self.find_by_key(&EntityKey::User(user_name.clone())).await? {
            Some(Entity::User(user)) => Ok(Some(user)),
            _ => Ok(None),
        }
    }

    /// Fetch a group by id.
    async fn find_group(&self, id: GroupId) -> Result<Option<Group>> {
        match self.find_by_key(&EntityKey::Group(id)).await? {
            Some(Entity::Group(group)) => Ok(Some(group)),
            _ => Ok(None),
        }
    }

    /// Fetch a group by its unique name.
    async fn find_group_by_name(&self, group_name: &str) -> Result<Option<Group>> {
        match self
            .find_by_key(&EntityKey::GroupName(group_name.to_string()))
            .await?
        {
            Some(Entity::Group(group)) => Ok(Some(group)),
            _ => Ok(None),
        }
    }

    /// Fetch a resource by id.
    async fn find_resource(&self, id: ResourceId) -> Result<Option<Resource>> {
        match self.find_by_key(&EntityKey::Resource(id)).await? {
            Some(Entity::Resource(resource)) => Ok(Some(resource)),
            _ => Ok(None),
        }
    }

    /// Fetch an external identity by composite key.
    async fn find_external_identity(
        &self,
        key: &ExternalIdentityKey,
    ) -> Result<Option<ExternalIdentity>> {
        match self
            .find_by_key(&EntityKey::ExternalIdentity(key.clone()))
            .await?
        {
            Some(Entity::ExternalIdentity(identity)) => Ok(Some(identity)),
            _ => Ok(None),
        }
    }
}

/// Abstract entity store.
///
/// Implementations provide different persistence strategies:
/// - [`MemoryStore`](crate::memory::MemoryStore): copy-on-write tables in memory
///
/// Constraint checks (uniqueness, referential integrity, the group
/// allow-list, `member_count`) and cascades run inside [`commit`](Self::commit),
/// so a failing batch leaves the store unchanged.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Backend name for diagnostics.
    fn name(&self) -> &str;

    /// A consistent read view of the current committed state.
    async fn snapshot(&self) -> Result<Arc<dyn StoreReader>>;

    /// Apply every mutation in `batch`, or none of them.
    async fn commit(&self, batch: WriteBatch) -> Result<()>;

    /// Allocate the next id from `sequence`. Ids are never reused.
    async fn next_id(&self, sequence: Sequence) -> Result<i64>;
}
