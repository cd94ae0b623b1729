//! Resource ownership and hierarchy.
//!
//! Every resource has exactly one owner (a user or a group) and at most one
//! parent. The store rejects cycles, so walks here always terminate on a
//! well-behaved backend; a cycle reported by a faulty backend is a storage
//! error.

use keystone_core::types::ensure_not_blank;
use keystone_core::{Error, Owner, Principal, Resource, ResourceId, ResourceType, Result};
use keystone_store::{EntityStore, Mutation, ParentFilter, ResourceFilter, StoreReader};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use crate::resolution::{EffectivePermissions, ResolutionEngine, ResolveOptions};

/// Ancestors of `resource`, nearest first.
pub(crate) async fn ancestors_in(
    reader: &dyn StoreReader,
    resource: &Resource,
) -> Result<Vec<Resource>> {
    let mut ancestors = Vec::new();
    let mut seen = BTreeSet::from([resource.id]);
    let mut next = resource.parent_id;
    while let Some(parent_id) = next {
        if !seen.insert(parent_id) {
            return Err(Error::storage(format!(
                "resource hierarchy cycle at {parent_id}"
            )));
        }
        let parent = reader.find_resource(parent_id).await?.ok_or_else(|| {
            Error::storage(format!(
                "resource {} references missing parent {parent_id}",
                resource.id
            ))
        })?;
        next = parent.parent_id;
        ancestors.push(parent);
    }
    Ok(ancestors)
}

/// Descendants of `id`, breadth-first.
async fn descendants_in(reader: &dyn StoreReader, id: ResourceId) -> Result<Vec<Resource>> {
    let mut found = Vec::new();
    let mut seen = BTreeSet::from([id]);
    let mut queue = VecDeque::from([id]);
    while let Some(current) = queue.pop_front() {
        let filter = ResourceFilter {
            parent: Some(ParentFilter::Of(current)),
            ..Default::default()
        };
        for child in reader.list_resources(&filter).await? {
            if seen.insert(child.id) {
                queue.push_back(child.id);
                found.push(child);
            }
        }
    }
    Ok(found)
}

/// Narrows [`OwnershipGraph::resources_with_possible_perms`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionFilter {
    /// Keep resources where any of these names is held. `None` keeps any
    /// resource with a non-empty effective set.
    pub perm_names: Option<Vec<String>>,
    /// Candidate resource ids.
    pub resource_ids: Option<Vec<ResourceId>>,
    /// Candidate resource types.
    pub resource_types: Option<Vec<ResourceType>>,
    /// Resolution switches.
    pub options: ResolveOptions,
}

impl PermissionFilter {
    /// Matches any held permission on any resource.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires one of these permission names.
    pub fn perms<I, S>(mut self, perm_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.perm_names = Some(perm_names.into_iter().map(Into::into).collect());
        self
    }

    /// Restricts candidates to these ids.
    pub fn ids(mut self, ids: impl IntoIterator<Item = ResourceId>) -> Self {
        self.resource_ids = Some(ids.into_iter().collect());
        self
    }

    /// Restricts candidates to these types.
    pub fn types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ResourceType>,
    {
        self.resource_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Enables hierarchy inheritance.
    pub fn inheriting(mut self) -> Self {
        self.options.inherit = true;
        self
    }

    fn keeps(&self, permissions: &EffectivePermissions) -> bool {
        match &self.perm_names {
            Some(names) => names.iter().any(|n| permissions.contains(n)),
            None => !permissions.is_empty(),
        }
    }
}

/// A resource together with what a principal may do to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourcePermissions {
    /// The resource.
    pub resource: Resource,
    /// The principal's effective set on it.
    pub permissions: EffectivePermissions,
}

/// Ownership and parent/child operations on resources.
#[derive(Clone)]
pub struct OwnershipGraph {
    store: Arc<dyn EntityStore>,
    engine: ResolutionEngine,
}

impl OwnershipGraph {
    /// Creates a graph over `store`, resolving through `engine`.
    pub fn new(store: Arc<dyn EntityStore>, engine: ResolutionEngine) -> Self {
        Self { store, engine }
    }

    async fn require(&self, reader: &dyn StoreReader, id: ResourceId) -> Result<Resource> {
        reader
            .find_resource(id)
            .await?
            .ok_or_else(|| Error::not_found("resource", id))
    }

    /// Reads a resource back after a write.
    async fn reload(&self, id: ResourceId) -> Result<Resource> {
        let reader = self.store.snapshot().await?;
        self.require(reader.as_ref(), id).await
    }

    /// Transfers ownership. The new owner must exist.
    pub async fn set_owner(&self, id: ResourceId, owner: Owner) -> Result<Resource> {
        if let Principal::User(name) = &owner {
            ensure_not_blank("owner_user_name", name.as_str())?;
        }
        let described = owner.to_string();
        self.store
            .commit(Mutation::SetOwner { id, owner }.into())
            .await?;
        log::info!("Resource {id} is now owned by {described}");
        self.reload(id).await
    }

    /// Current owner of a resource.
    pub async fn owner_of(&self, id: ResourceId) -> Result<Option<Owner>> {
        let reader = self.store.snapshot().await?;
        Ok(self.require(reader.as_ref(), id).await?.owner)
    }

    /// Resources owned directly by `principal`, ordered by id.
    pub async fn resources_owned_by(&self, principal: &Principal) -> Result<Vec<Resource>> {
        let reader = self.store.snapshot().await?;
        let filter = ResourceFilter {
            owner: Some(principal.clone()),
            ..Default::default()
        };
        reader.list_resources(&filter).await
    }

    /// Moves a resource under `parent`, or to the top level with `None`.
    ///
    /// # Errors
    ///
    /// `Validation` if the parent does not exist or the move would create a
    /// cycle.
    pub async fn set_parent(&self, id: ResourceId, parent: Option<ResourceId>) -> Result<Resource> {
        self.store
            .commit(Mutation::SetParent { id, parent }.into())
            .await?;
        log::info!(
            "Resource {id} moved under {}",
            parent.map_or_else(|| "root".to_string(), |p| p.to_string())
        );
        self.reload(id).await
    }

    /// Direct children, ordered by id.
    pub async fn children(&self, id: ResourceId) -> Result<Vec<Resource>> {
        let reader = self.store.snapshot().await?;
        self.require(reader.as_ref(), id).await?;
        let filter = ResourceFilter {
            parent: Some(ParentFilter::Of(id)),
            ..Default::default()
        };
        reader.list_resources(&filter).await
    }

    /// Ancestors, nearest first.
    pub async fn ancestors(&self, id: ResourceId) -> Result<Vec<Resource>> {
        let reader = self.store.snapshot().await?;
        let resource = self.require(reader.as_ref(), id).await?;
        ancestors_in(reader.as_ref(), &resource).await
    }

    /// All descendants, breadth-first.
    pub async fn descendants(&self, id: ResourceId) -> Result<Vec<Resource>> {
        let reader = self.store.snapshot().await?;
        self.require(reader.as_ref(), id).await?;
        descendants_in(reader.as_ref(), id).await
    }

    /// Resources on which `principal` holds any of the filter's permission
    /// names, each with its effective set, ordered by id.
    pub async fn resources_with_possible_perms(
        &self,
        principal: &Principal,
        filter: &PermissionFilter,
    ) -> Result<Vec<ResourcePermissions>> {
        let reader = self.store.snapshot().await?;
        let holders = self.engine.holders_of(reader.as_ref(), principal).await?;
        let candidates = ResourceFilter {
            ids: filter.resource_ids.clone(),
            types: filter.resource_types.clone(),
            ..Default::default()
        };

        let mut found = Vec::new();
        for resource in reader.list_resources(&candidates).await? {
            let permissions = self
                .engine
                .resolve_resource(reader.as_ref(), principal, &holders, &resource, filter.options)
                .await?;
            if filter.keeps(&permissions) {
                found.push(ResourcePermissions {
                    resource,
                    permissions,
                });
            }
        }
        log::debug!(
            "{principal} holds matching permissions on {} resource(s)",
            found.len()
        );
        Ok(found)
    }
}

impl std::fmt::Debug for OwnershipGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnershipGraph")
            .field("store", &self.store.name())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
