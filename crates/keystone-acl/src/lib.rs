//! # keystone-acl
//!
//! Services over a Keystone [`EntityStore`]:
//!
//! - [`EntityService`]: users, groups, resources, external identities
//! - [`MembershipIndex`]: group membership from either side
//! - [`OwnershipGraph`]: resource owners and the parent/child hierarchy
//! - [`GrantTables`]: app, resource-type, and resource grants
//! - [`ResolutionEngine`]: effective permission sets with provenance
//!
//! [`AccessControl`] bundles all five over one store and configuration.

#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

pub mod entities;
pub mod grants;
pub mod membership;
pub mod ownership;
pub mod resolution;
pub mod resolvable;

pub use entities::EntityService;
pub use grants::GrantTables;
pub use membership::MembershipIndex;
pub use ownership::{OwnershipGraph, PermissionFilter, ResourcePermissions};
pub use resolution::{
    EffectivePermissions, PermissionSource, PermissionTuple, ResolutionEngine, ResolveOptions,
    Target, UsersForPermFilter,
};
pub use resolvable::PermissionResolvable;

use keystone_core::{KeystoneConfig, Result};
use keystone_store::{EntityStore, MemoryStore};
use std::sync::Arc;

/// All Keystone services over one store and configuration.
#[derive(Clone)]
pub struct AccessControl {
    config: Arc<KeystoneConfig>,
    entities: EntityService,
    memberships: MembershipIndex,
    ownership: OwnershipGraph,
    grants: GrantTables,
    resolution: ResolutionEngine,
}

impl AccessControl {
    /// Builds the services after validating `config`.
    pub fn new(store: Arc<dyn EntityStore>, config: KeystoneConfig) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let resolution = ResolutionEngine::new(store.clone(), config.clone());
        log::debug!(
            "Keystone ready on store '{}' with {} resource type(s)",
            store.name(),
            config.resource_types.len()
        );
        Ok(Self {
            entities: EntityService::new(store.clone()),
            memberships: MembershipIndex::new(store.clone()),
            ownership: OwnershipGraph::new(store.clone(), resolution.clone()),
            grants: GrantTables::new(store, config.clone()),
            resolution,
            config,
        })
    }

    /// Builds the services over a fresh [`MemoryStore`].
    pub fn in_memory(config: KeystoneConfig) -> Result<Self> {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    /// The validated configuration.
    pub fn config(&self) -> &KeystoneConfig {
        &self.config
    }

    /// Entity CRUD.
    pub fn entities(&self) -> &EntityService {
        &self.entities
    }

    /// Group membership.
    pub fn memberships(&self) -> &MembershipIndex {
        &self.memberships
    }

    /// Ownership and hierarchy.
    pub fn ownership(&self) -> &OwnershipGraph {
        &self.ownership
    }

    /// Grants.
    pub fn grants(&self) -> &GrantTables {
        &self.grants
    }

    /// Permission resolution.
    pub fn resolution(&self) -> &ResolutionEngine {
        &self.resolution
    }
}

impl std::fmt::Debug for AccessControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessControl")
            .field("resolution", &self.resolution)
            .finish()
    }
}
