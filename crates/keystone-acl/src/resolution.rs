//! Permission resolution engine.
//!
//! Computes the effective permission set of a principal for a target as the
//! union of:
//!
//! 1. Direct grants held by the principal for that target
//! 2. Grants held by every group the user belongs to
//! 3. Ownership: the owner of a resource (a user, or any member of an owning
//!    group) holds every permission name configured for the resource type
//! 4. With [`ResolveOptions::inherit`], instance grants and ownership of
//!    ancestors whose type is inheritable, nearest first, stopping at the
//!    first ancestor that is not
//!
//! There are no deny grants; the result is a pure union of allows. Every
//! read of one resolution goes through a single store snapshot.

use keystone_core::types::ensure_not_blank;
use keystone_core::{
    Error, GrantScope, GroupId, KeystoneConfig, Principal, Resource, ResourceId, ResourceType,
    Result, UserName,
};
use keystone_store::{EntityStore, GrantFilter, MembershipSubject, StoreReader};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::ownership::ancestors_in;

// ============================================================================
// Types
// ============================================================================

/// What permissions are resolved against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum Target {
    /// Application-wide permissions.
    App,
    /// Wildcard grants on a resource type. Ownership does not apply.
    ResourceType(ResourceType),
    /// One resource instance.
    Resource(ResourceId),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::App => write!(f, "app"),
            Self::ResourceType(t) => write!(f, "type:{t}"),
            Self::Resource(id) => write!(f, "resource:{id}"),
        }
    }
}

impl From<ResourceId> for Target {
    fn from(id: ResourceId) -> Self {
        Self::Resource(id)
    }
}

/// Per-call resolution switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Include what inheritable ancestors pass down.
    pub inherit: bool,
}

impl ResolveOptions {
    /// Options with hierarchy inheritance enabled.
    pub fn inheriting() -> Self {
        Self { inherit: true }
    }
}

/// Where a permission came from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PermissionSource {
    /// An app-wide grant.
    App,
    /// A wildcard grant on a resource type.
    ResourceType(ResourceType),
    /// An instance grant on this resource.
    Resource(ResourceId),
    /// Ownership of this resource.
    Owner(ResourceId),
}

impl PermissionSource {
    fn from_scope(scope: &GrantScope) -> Self {
        match scope {
            GrantScope::App => Self::App,
            GrantScope::ResourceType(t) => Self::ResourceType(t.clone()),
            GrantScope::Resource(id) => Self::Resource(*id),
        }
    }
}

/// One permission held, with provenance.
///
/// `group_id` is set when the permission reaches the user through a group.
/// For a group principal `user_name` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PermissionTuple {
    /// Permission name.
    pub perm_name: String,
    /// The user holding it, if resolved for a user.
    pub user_name: Option<UserName>,
    /// The group it flows through, if any.
    pub group_id: Option<GroupId>,
    /// Grant or ownership that produced it.
    pub source: PermissionSource,
    /// `true` if it was passed down by an ancestor resource.
    pub inherited: bool,
}

impl PermissionTuple {
    /// Returns `true` if this tuple comes from ownership.
    pub fn is_ownership(&self) -> bool {
        matches!(self.source, PermissionSource::Owner(_))
    }
}

/// Resolved permission set of one principal for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectivePermissions {
    principal: Principal,
    target: Target,
    is_owner: bool,
    tuples: Vec<PermissionTuple>,
}

impl EffectivePermissions {
    /// The principal resolved for.
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// The target resolved against.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Returns `true` if the principal owns the target resource directly or
    /// through an owning group.
    pub fn is_owner(&self) -> bool {
        self.is_owner
    }

    /// All tuples, sorted and deduplicated.
    pub fn tuples(&self) -> &[PermissionTuple] {
        &self.tuples
    }

    /// Consumes the set, returning its tuples.
    pub fn into_tuples(self) -> Vec<PermissionTuple> {
        self.tuples
    }

    /// Distinct permission names.
    pub fn names(&self) -> BTreeSet<String> {
        self.tuples.iter().map(|t| t.perm_name.clone()).collect()
    }

    /// Returns `true` if `perm_name` is held.
    pub fn contains(&self, perm_name: &str) -> bool {
        self.tuples.iter().any(|t| t.perm_name == perm_name)
    }

    /// Returns `true` if nothing is held.
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }
}

/// Options for [`ResolutionEngine::users_for_perm`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsersForPermFilter {
    /// Keep only tuples for these users. Group-only tuples are kept.
    pub user_names: Option<Vec<UserName>>,
    /// Keep only group-derived tuples for these groups.
    pub group_ids: Option<Vec<GroupId>>,
    /// Report group grants once per group instead of per member.
    pub limit_group_permissions: bool,
    /// Resolution switches.
    pub options: ResolveOptions,
}

// ============================================================================
// Holdings
// ============================================================================

/// The principals whose grants count for a resolution.
pub(crate) enum Holders {
    Any,
    Only(BTreeSet<Principal>),
}

impl Holders {
    fn includes(&self, principal: &Principal) -> bool {
        match self {
            Self::Any => true,
            Self::Only(set) => set.contains(principal),
        }
    }

    fn iter(&self) -> impl Iterator<Item = &Principal> {
        let set = match self {
            Self::Any => None,
            Self::Only(set) => Some(set),
        };
        set.into_iter().flatten()
    }
}

/// A permission attached to one principal on a resource.
struct Holding {
    principal: Principal,
    perm_name: String,
    source: PermissionSource,
    inherited: bool,
}

// ============================================================================
// ResolutionEngine
// ============================================================================

/// Resolves effective permissions against an [`EntityStore`].
#[derive(Clone)]
pub struct ResolutionEngine {
    store: Arc<dyn EntityStore>,
    config: Arc<KeystoneConfig>,
}

impl ResolutionEngine {
    /// Creates an engine over `store` using the resource types in `config`.
    pub fn new(store: Arc<dyn EntityStore>, config: Arc<KeystoneConfig>) -> Self {
        Self { store, config }
    }

    /// The configuration in use.
    pub fn config(&self) -> &KeystoneConfig {
        &self.config
    }

    /// Effective permissions of `principal` for `target`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the principal or target resource does not exist. Any
    /// store failure fails the whole call.
    pub async fn effective(
        &self,
        principal: &Principal,
        target: &Target,
        options: ResolveOptions,
    ) -> Result<EffectivePermissions> {
        let reader = self.store.snapshot().await?;
        let holders = self.holders_of(reader.as_ref(), principal).await?;
        let resolved = match target {
            Target::Resource(id) => {
                let resource = reader
                    .find_resource(*id)
                    .await?
                    .ok_or_else(|| Error::not_found("resource", id))?;
                self.resolve_resource(reader.as_ref(), principal, &holders, &resource, options)
                    .await?
            }
            Target::App | Target::ResourceType(_) => {
                self.resolve_scoped(reader.as_ref(), principal, &holders, target)
                    .await?
            }
        };
        log::debug!(
            "Resolved {} permission(s) for {principal} on {target}",
            resolved.tuples.len()
        );
        Ok(resolved)
    }

    /// Returns `true` if `principal` holds `perm_name` on `target`.
    pub async fn has_permission(
        &self,
        principal: &Principal,
        perm_name: &str,
        target: &Target,
        options: ResolveOptions,
    ) -> Result<bool> {
        ensure_not_blank("perm_name", perm_name)?;
        Ok(self
            .effective(principal, target, options)
            .await?
            .contains(perm_name))
    }

    /// Every user holding `perm_name` (or any permission, if `None`) on a
    /// resource, sorted by user name then permission.
    ///
    /// Group grants and group ownership expand to one tuple per member unless
    /// `limit_group_permissions` is set.
    pub async fn users_for_perm(
        &self,
        resource_id: ResourceId,
        perm_name: Option<&str>,
        filter: &UsersForPermFilter,
    ) -> Result<Vec<PermissionTuple>> {
        if let Some(perm) = perm_name {
            ensure_not_blank("perm_name", perm)?;
        }
        let reader = self.store.snapshot().await?;
        let resource = reader
            .find_resource(resource_id)
            .await?
            .ok_or_else(|| Error::not_found("resource", resource_id))?;

        let holdings = self
            .holdings_on(reader.as_ref(), &resource, filter.options, &Holders::Any)
            .await?;

        let mut members: BTreeMap<GroupId, Vec<UserName>> = BTreeMap::new();
        let mut tuples = BTreeSet::new();
        for holding in holdings {
            if perm_name.is_some_and(|p| p != holding.perm_name) {
                continue;
            }
            match &holding.principal {
                Principal::User(name) => {
                    tuples.insert(PermissionTuple {
                        perm_name: holding.perm_name,
                        user_name: Some(name.clone()),
                        group_id: None,
                        source: holding.source,
                        inherited: holding.inherited,
                    });
                }
                Principal::Group(group_id) => {
                    if filter
                        .group_ids
                        .as_ref()
                        .is_some_and(|ids| !ids.contains(group_id))
                    {
                        continue;
                    }
                    if filter.limit_group_permissions {
                        tuples.insert(PermissionTuple {
                            perm_name: holding.perm_name,
                            user_name: None,
                            group_id: Some(*group_id),
                            source: holding.source,
                            inherited: holding.inherited,
                        });
                        continue;
                    }
                    if !members.contains_key(group_id) {
                        let names = reader
                            .query_memberships(&MembershipSubject::Group(*group_id))
                            .await?
                            .into_iter()
                            .map(|m| m.user_name)
                            .collect();
                        members.insert(*group_id, names);
                    }
                    for user_name in members.get(group_id).into_iter().flatten() {
                        tuples.insert(PermissionTuple {
                            perm_name: holding.perm_name.clone(),
                            user_name: Some(user_name.clone()),
                            group_id: Some(*group_id),
                            source: holding.source.clone(),
                            inherited: holding.inherited,
                        });
                    }
                }
            }
        }

        let mut result: Vec<PermissionTuple> = tuples
            .into_iter()
            .filter(|t| match (&filter.user_names, &t.user_name) {
                (Some(names), Some(user)) => names.contains(user),
                _ => true,
            })
            .collect();
        result.sort_by(|a, b| {
            a.user_name
                .cmp(&b.user_name)
                .then_with(|| a.perm_name.cmp(&b.perm_name))
                .then_with(|| a.cmp(b))
        });
        log::debug!(
            "Found {} holder tuple(s) on resource {resource_id}",
            result.len()
        );
        Ok(result)
    }

    // ------------------------------------------------------------------------
    // Snapshot-scoped helpers
    // ------------------------------------------------------------------------

    /// The principal itself plus, for a user, every group it belongs to.
    pub(crate) async fn holders_of(
        &self,
        reader: &dyn StoreReader,
        principal: &Principal,
    ) -> Result<Holders> {
        let mut set = BTreeSet::new();
        match principal {
            Principal::User(name) => {
                ensure_not_blank("user_name", name.as_str())?;
                if reader.find_user(name).await?.is_none() {
                    return Err(Error::not_found("user", name));
                }
                for membership in reader
                    .query_memberships(&MembershipSubject::User(name.clone()))
                    .await?
                {
                    set.insert(Principal::Group(membership.group_id));
                }
            }
            Principal::Group(id) => {
                if reader.find_group(*id).await?.is_none() {
                    return Err(Error::not_found("group", id));
                }
            }
        }
        set.insert(principal.clone());
        Ok(Holders::Only(set))
    }

    async fn resolve_scoped(
        &self,
        reader: &dyn StoreReader,
        principal: &Principal,
        holders: &Holders,
        target: &Target,
    ) -> Result<EffectivePermissions> {
        let (filter, source) = match target {
            Target::ResourceType(t) => (
                GrantFilter::Exact(GrantScope::ResourceType(t.clone())),
                PermissionSource::ResourceType(t.clone()),
            ),
            _ => (GrantFilter::App, PermissionSource::App),
        };

        let mut tuples = BTreeSet::new();
        for holder in holders.iter() {
            for grant in reader.query_grants(holder, &filter).await? {
                tuples.insert(tuple_for(
                    principal,
                    holder,
                    grant.perm_name,
                    source.clone(),
                    false,
                ));
            }
        }
        Ok(EffectivePermissions {
            principal: principal.clone(),
            target: target.clone(),
            is_owner: false,
            tuples: tuples.into_iter().collect(),
        })
    }

    pub(crate) async fn resolve_resource(
        &self,
        reader: &dyn StoreReader,
        principal: &Principal,
        holders: &Holders,
        resource: &Resource,
        options: ResolveOptions,
    ) -> Result<EffectivePermissions> {
        let is_owner = resource
            .owner
            .as_ref()
            .is_some_and(|owner| holders.includes(owner));
        let tuples: BTreeSet<PermissionTuple> = self
            .holdings_on(reader, resource, options, holders)
            .await?
            .into_iter()
            .map(|h| tuple_for(principal, &h.principal, h.perm_name, h.source, h.inherited))
            .collect();
        Ok(EffectivePermissions {
            principal: principal.clone(),
            target: Target::Resource(resource.id),
            is_owner,
            tuples: tuples.into_iter().collect(),
        })
    }

    /// Grants and ownership on `resource` (and, when inheriting, on its
    /// inheritable ancestors) held by anyone in `holders`.
    async fn holdings_on(
        &self,
        reader: &dyn StoreReader,
        resource: &Resource,
        options: ResolveOptions,
        holders: &Holders,
    ) -> Result<Vec<Holding>> {
        let mut holdings = Vec::new();
        let target_filter = GrantFilter::Target {
            resource_id: resource.id,
            resource_type: resource.resource_type.clone(),
        };
        for grant in reader.query_grants_any_principal(&target_filter).await? {
            if holders.includes(&grant.principal) {
                holdings.push(Holding {
                    source: PermissionSource::from_scope(&grant.scope),
                    principal: grant.principal,
                    perm_name: grant.perm_name,
                    inherited: false,
                });
            }
        }
        self.push_ownership(&mut holdings, resource, &resource.resource_type, holders, false);

        if options.inherit {
            for ancestor in ancestors_in(reader, resource).await? {
                if !self.config.is_inheritable(&ancestor.resource_type) {
                    break;
                }
                let filter = GrantFilter::Exact(GrantScope::Resource(ancestor.id));
                for grant in reader.query_grants_any_principal(&filter).await? {
                    if holders.includes(&grant.principal) {
                        holdings.push(Holding {
                            source: PermissionSource::Resource(ancestor.id),
                            principal: grant.principal,
                            perm_name: grant.perm_name,
                            inherited: true,
                        });
                    }
                }
                self.push_ownership(
                    &mut holdings,
                    &ancestor,
                    &resource.resource_type,
                    holders,
                    true,
                );
            }
        }
        Ok(holdings)
    }

    /// Owner of `owned` receives every permission configured for
    /// `perm_type`.
    fn push_ownership(
        &self,
        holdings: &mut Vec<Holding>,
        owned: &Resource,
        perm_type: &ResourceType,
        holders: &Holders,
        inherited: bool,
    ) {
        let Some(owner) = owned.owner.as_ref().filter(|o| holders.includes(o)) else {
            return;
        };
        let Some(perms) = self.config.permissions_for(perm_type) else {
            log::warn!(
                "Resource type '{perm_type}' is not registered; owner {owner} of resource {} gets no permissions",
                owned.id
            );
            return;
        };
        holdings.extend(perms.iter().map(|perm| Holding {
            principal: owner.clone(),
            perm_name: perm.clone(),
            source: PermissionSource::Owner(owned.id),
            inherited,
        }));
    }
}

impl fmt::Debug for ResolutionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionEngine")
            .field("store", &self.store.name())
            .field("resource_types", &self.config.resource_types.len())
            .finish()
    }
}

fn tuple_for(
    principal: &Principal,
    holder: &Principal,
    perm_name: String,
    source: PermissionSource,
    inherited: bool,
) -> PermissionTuple {
    PermissionTuple {
        perm_name,
        user_name: principal.as_user().cloned(),
        group_id: holder.as_group(),
        source,
        inherited,
    }
}

// ============================================================================
// Tests
// ============================================================================
