//! Permission grant tables.
//!
//! A grant is a `(principal, perm_name, scope)` row. Granting twice is a
//! no-op and so is revoking an absent grant. Group app-wide grants must stay
//! inside the group's `possible_permissions`; the store enforces that on
//! commit.

use keystone_core::types::ensure_not_blank;
use keystone_core::{Grant, GrantScope, KeystoneConfig, Principal, ResourceId, ResourceType, Result};
use keystone_store::{EntityStore, GrantFilter, Mutation};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Grants and revokes permissions.
#[derive(Clone)]
pub struct GrantTables {
    store: Arc<dyn EntityStore>,
    config: Arc<KeystoneConfig>,
    /// Permission names per registered resource type, checked at commit.
    declared: Arc<BTreeMap<ResourceType, BTreeSet<String>>>,
}

impl GrantTables {
    /// Creates grant tables over `store`.
    pub fn new(store: Arc<dyn EntityStore>, config: Arc<KeystoneConfig>) -> Self {
        let declared = config
            .resource_types
            .iter()
            .map(|(t, settings)| (t.clone(), settings.permissions.clone()))
            .collect();
        Self {
            store,
            config,
            declared: Arc::new(declared),
        }
    }

    /// Stores a grant.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a blank permission name
    /// - `NotFound` if the principal or scoped resource does not exist
    /// - `Validation` for a group app grant outside its allow-list, or, with
    ///   `strict_resource_permissions`, a name the resource type does not
    ///   define
    pub async fn grant(
        &self,
        principal: Principal,
        perm_name: impl Into<String>,
        scope: GrantScope,
    ) -> Result<Grant> {
        let grant = Grant::new(principal, perm_name, scope);
        ensure_not_blank("perm_name", &grant.perm_name)?;
        let mutation = if self.config.resolution.strict_resource_permissions {
            Mutation::PutDeclaredGrant {
                grant: grant.clone(),
                declared: self.declared.clone(),
            }
        } else {
            Mutation::PutGrant(grant.clone())
        };
        self.store.commit(mutation.into()).await?;
        log::info!("Granted {grant}");
        Ok(grant)
    }

    /// App-wide grant.
    pub async fn grant_app(
        &self,
        principal: Principal,
        perm_name: impl Into<String>,
    ) -> Result<Grant> {
        self.grant(principal, perm_name, GrantScope::App).await
    }

    /// Grant on one resource.
    pub async fn grant_resource(
        &self,
        principal: Principal,
        perm_name: impl Into<String>,
        resource_id: ResourceId,
    ) -> Result<Grant> {
        self.grant(principal, perm_name, GrantScope::Resource(resource_id))
            .await
    }

    /// Wildcard grant on every resource of a type.
    pub async fn grant_resource_type(
        &self,
        principal: Principal,
        perm_name: impl Into<String>,
        resource_type: impl Into<ResourceType>,
    ) -> Result<Grant> {
        self.grant(
            principal,
            perm_name,
            GrantScope::ResourceType(resource_type.into()),
        )
        .await
    }

    /// Removes a grant. Absent grants are ignored.
    pub async fn revoke(
        &self,
        principal: Principal,
        perm_name: impl Into<String>,
        scope: GrantScope,
    ) -> Result<()> {
        let grant = Grant::new(principal, perm_name, scope);
        ensure_not_blank("perm_name", &grant.perm_name)?;
        self.store
            .commit(Mutation::RemoveGrant(grant.clone()).into())
            .await?;
        log::info!("Revoked {grant}");
        Ok(())
    }

    /// Returns `true` if exactly this grant is stored.
    pub async fn has_grant(&self, grant: &Grant) -> Result<bool> {
        let reader = self.store.snapshot().await?;
        let rows = reader
            .query_grants(&grant.principal, &GrantFilter::Exact(grant.scope.clone()))
            .await?;
        Ok(rows.iter().any(|g| g.perm_name == grant.perm_name))
    }

    /// Grants held directly by `principal`.
    pub async fn grants_for(&self, principal: &Principal, filter: &GrantFilter) -> Result<Vec<Grant>> {
        let reader = self.store.snapshot().await?;
        reader.query_grants(principal, filter).await
    }
}

impl std::fmt::Debug for GrantTables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantTables")
            .field("store", &self.store.name())
            .field(
                "strict",
                &self.config.resolution.strict_resource_permissions,
            )
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
