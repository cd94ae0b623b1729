//! Permission queries attached to principals.

use async_trait::async_trait;
use keystone_core::{Group, Principal, ResourceId, Result, User};

use crate::ownership::{OwnershipGraph, PermissionFilter, ResourcePermissions};
use crate::resolution::{EffectivePermissions, ResolutionEngine, ResolveOptions, Target};

/// Anything that can hold permissions.
///
/// Implemented for [`User`] and [`Group`]; every method delegates to the
/// resolution engine with [`principal`](Self::principal) as the subject.
#[async_trait]
pub trait PermissionResolvable: Send + Sync {
    /// This entity as a principal.
    fn principal(&self) -> Principal;

    /// App-wide effective permissions.
    async fn permissions(&self, engine: &ResolutionEngine) -> Result<EffectivePermissions> {
        engine
            .effective(&self.principal(), &Target::App, ResolveOptions::default())
            .await
    }

    /// Effective permissions on one resource.
    async fn resource_permissions(
        &self,
        engine: &ResolutionEngine,
        resource_id: ResourceId,
        options: ResolveOptions,
    ) -> Result<EffectivePermissions> {
        engine
            .effective(&self.principal(), &Target::Resource(resource_id), options)
            .await
    }

    /// Resources this entity holds matching permissions on.
    async fn resources_with_perms(
        &self,
        graph: &OwnershipGraph,
        filter: &PermissionFilter,
    ) -> Result<Vec<ResourcePermissions>> {
        graph
            .resources_with_possible_perms(&self.principal(), filter)
            .await
    }
}

impl PermissionResolvable for User {
    fn principal(&self) -> Principal {
        Principal::User(self.user_name.clone())
    }
}

impl PermissionResolvable for Group {
    fn principal(&self) -> Principal {
        Principal::Group(self.id)
    }
}
