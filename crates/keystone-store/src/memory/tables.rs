//! In-memory tables and the mutation rules applied to them.
//!
//! `Tables::apply` is where every data-model invariant lives: natural-key
//! uniqueness, referential integrity, the group allow-list, exclusive
//! resource ownership, an acyclic hierarchy, `member_count`, and the delete
//! cascades.

use chrono::{DateTime, Utc};
use keystone_core::types::ensure_not_blank;
use keystone_core::{
    Error, ExternalIdentity, ExternalIdentityKey, Grant, GrantScope, Group, GroupId, Membership,
    Owner, Principal, Resource, ResourceId, ResourceType, Result, User, UserName,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::batch::Mutation;
use crate::entity::{Entity, EntityKey};

/// How a put treats an existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PutMode {
    Insert,
    Update,
    Upsert,
}

impl PutMode {
    fn check(self, exists: bool, kind: &'static str, key: impl ToString) -> Result<()> {
        match (self, exists) {
            (PutMode::Insert, true) => Err(Error::validation(format!(
                "{kind} '{}' already exists",
                key.to_string()
            ))),
            (PutMode::Update, false) => Err(Error::not_found(kind, key)),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Tables {
    pub(crate) users: BTreeMap<UserName, User>,
    pub(crate) groups: BTreeMap<GroupId, Group>,
    pub(crate) group_names: BTreeMap<String, GroupId>,
    pub(crate) resources: BTreeMap<ResourceId, Resource>,
    pub(crate) identities: BTreeMap<ExternalIdentityKey, ExternalIdentity>,
    pub(crate) memberships: BTreeSet<Membership>,
    pub(crate) grants: BTreeSet<Grant>,
}

/// Serializable form of [`Tables`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct TablesDump {
    pub(crate) users: Vec<User>,
    pub(crate) groups: Vec<Group>,
    pub(crate) resources: Vec<Resource>,
    pub(crate) identities: Vec<ExternalIdentity>,
    pub(crate) memberships: Vec<Membership>,
    pub(crate) grants: Vec<Grant>,
}

impl Tables {
    pub(crate) fn apply(&mut self, mutation: Mutation) -> Result<()> {
        match mutation {
            Mutation::Insert(entity) => self.put(entity, PutMode::Insert),
            Mutation::Update(entity) => self.put(entity, PutMode::Update),
            Mutation::Upsert(entity) => self.put(entity, PutMode::Upsert),
            Mutation::Delete(key) => self.delete(key),
            Mutation::AddMembership(membership) => self.add_membership(membership),
            Mutation::RemoveMembership(membership) => {
                self.remove_membership(&membership);
                Ok(())
            }
            Mutation::PutGrant(grant) => self.put_grant(grant),
            Mutation::PutDeclaredGrant { grant, declared } => {
                self.check_declared(&grant, &declared)?;
                self.put_grant(grant)
            }
            Mutation::RemoveGrant(grant) => {
                self.grants.remove(&grant);
                Ok(())
            }
            Mutation::SetOwner { id, owner } => self.set_owner(id, owner),
            Mutation::SetParent { id, parent } => self.set_parent(id, parent),
            Mutation::RecordLogin { user_name, at } => self.record_login(&user_name, at),
        }
    }

    // ------------------------------------------------------------------------
    // Puts
    // ------------------------------------------------------------------------

    fn put(&mut self, entity: Entity, mode: PutMode) -> Result<()> {
        match entity {
            Entity::User(user) => self.put_user(user, mode),
            Entity::Group(group) => self.put_group(group, mode),
            Entity::Resource(resource) => self.put_resource(resource, mode),
            Entity::ExternalIdentity(identity) => self.put_identity(identity, mode),
        }
    }

    fn put_user(&mut self, user: User, mode: PutMode) -> Result<()> {
        ensure_not_blank("user_name", user.user_name.as_str())?;
        mode.check(
            self.users.contains_key(&user.user_name),
            "user",
            &user.user_name,
        )?;
        self.users.insert(user.user_name.clone(), user);
        Ok(())
    }

    fn put_group(&mut self, mut group: Group, mode: PutMode) -> Result<()> {
        ensure_not_blank("group_name", &group.group_name)?;
        mode.check(self.groups.contains_key(&group.id), "group", group.id)?;

        if let Some(other) = self.group_names.get(&group.group_name) {
            if *other != group.id {
                return Err(Error::validation_field(
                    "group_name",
                    format!("group '{}' already exists", group.group_name),
                ));
            }
        }

        let principal = Principal::Group(group.id);
        if let Some(orphaned) = self.grants.iter().find(|g| {
            g.principal == principal
                && g.scope == GrantScope::App
                && !group.allows_permission(&g.perm_name)
        }) {
            return Err(Error::validation_field(
                "possible_permissions",
                format!(
                    "group '{}' still holds '{}', which the new allow-list excludes",
                    group.group_name, orphaned.perm_name
                ),
            ));
        }

        if let Some(previous) = self.groups.get(&group.id) {
            self.group_names.remove(&previous.group_name);
        }
        group.member_count = self.count_members(group.id);
        self.group_names.insert(group.group_name.clone(), group.id);
        self.groups.insert(group.id, group);
        Ok(())
    }

    fn put_resource(&mut self, resource: Resource, mode: PutMode) -> Result<()> {
        ensure_not_blank("resource_type", resource.resource_type.as_str())?;
        mode.check(
            self.resources.contains_key(&resource.id),
            "resource",
            resource.id,
        )?;

        match &resource.owner {
            None => {
                return Err(Error::validation_field(
                    "owner",
                    "resource must have an owner",
                ));
            }
            Some(owner) if !self.principal_exists(owner) => {
                return Err(Error::validation_field(
                    "owner",
                    format!("owner {owner} does not exist"),
                ));
            }
            Some(_) => {}
        }

        if let Some(parent_id) = resource.parent_id {
            self.check_parent(resource.id, parent_id)?;
        }

        self.resources.insert(resource.id, resource);
        Ok(())
    }

    fn check_parent(&self, id: ResourceId, parent_id: ResourceId) -> Result<()> {
        let mut cursor = Some(parent_id);
        let mut seen = BTreeSet::new();
        while let Some(current) = cursor {
            if current == id {
                return Err(Error::validation_field(
                    "parent_id",
                    format!("making {parent_id} the parent of {id} would create a cycle"),
                ));
            }
            if !seen.insert(current) {
                break;
            }
            let Some(node) = self.resources.get(&current) else {
                return Err(Error::validation_field(
                    "parent_id",
                    format!("parent resource {current} does not exist"),
                ));
            };
            cursor = node.parent_id;
        }
        Ok(())
    }

    fn put_identity(&mut self, identity: ExternalIdentity, mode: PutMode) -> Result<()> {
        ensure_not_blank("external_id", &identity.external_id)?;
        ensure_not_blank("provider_name", &identity.provider_name)?;
        if !self.users.contains_key(&identity.local_user_name) {
            return Err(Error::validation_field(
                "local_user_name",
                format!("user '{}' does not exist", identity.local_user_name),
            ));
        }
        let key = identity.key();
        mode.check(
            self.identities.contains_key(&key),
            "external identity",
            &key,
        )?;
        self.identities.insert(key, identity);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Field updates
    // ------------------------------------------------------------------------

    fn set_owner(&mut self, id: ResourceId, owner: Owner) -> Result<()> {
        if !self.resources.contains_key(&id) {
            return Err(Error::not_found("resource", id));
        }
        if !self.principal_exists(&owner) {
            return Err(Error::validation_field(
                "owner",
                format!("owner {owner} does not exist"),
            ));
        }
        if let Some(resource) = self.resources.get_mut(&id) {
            resource.owner = Some(owner);
        }
        Ok(())
    }

    fn set_parent(&mut self, id: ResourceId, parent: Option<ResourceId>) -> Result<()> {
        if !self.resources.contains_key(&id) {
            return Err(Error::not_found("resource", id));
        }
        if let Some(parent_id) = parent {
            self.check_parent(id, parent_id)?;
        }
        if let Some(resource) = self.resources.get_mut(&id) {
            resource.parent_id = parent;
        }
        Ok(())
    }

    fn record_login(&mut self, user_name: &UserName, at: DateTime<Utc>) -> Result<()> {
        let Some(user) = self.users.get_mut(user_name) else {
            return Err(Error::not_found("user", user_name));
        };
        user.last_login_at = Some(at);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Deletes
    // ------------------------------------------------------------------------

    fn delete(&mut self, key: EntityKey) -> Result<()> {
        match key {
            EntityKey::User(name) => {
                if !self.users.contains_key(&name) {
                    return Err(Error::not_found("user", name));
                }
                self.delete_user(&name);
            }
            EntityKey::Group(id) => {
                if !self.groups.contains_key(&id) {
                    return Err(Error::not_found("group", id));
                }
                self.delete_group(id);
            }
            EntityKey::GroupName(name) => {
                let Some(id) = self.group_names.get(&name).copied() else {
                    return Err(Error::not_found("group", name));
                };
                self.delete_group(id);
            }
            EntityKey::Resource(id) => {
                if !self.resources.contains_key(&id) {
                    return Err(Error::not_found("resource", id));
                }
                self.delete_resource(id);
            }
            EntityKey::ExternalIdentity(key) => {
                if self.identities.remove(&key).is_none() {
                    return Err(Error::not_found("external identity", key));
                }
            }
        }
        Ok(())
    }

    fn delete_user(&mut self, name: &UserName) {
        let memberships: Vec<Membership> = self
            .memberships
            .iter()
            .filter(|m| &m.user_name == name)
            .cloned()
            .collect();
        for membership in &memberships {
            self.remove_membership(membership);
        }

        let principal = Principal::User(name.clone());
        self.grants.retain(|g| g.principal != principal);
        self.identities.retain(|_, i| &i.local_user_name != name);
        self.delete_owned_by(&principal);
        self.users.remove(name);
    }

    fn delete_group(&mut self, id: GroupId) {
        self.memberships.retain(|m| m.group_id != id);
        let principal = Principal::Group(id);
        self.grants.retain(|g| g.principal != principal);
        self.delete_owned_by(&principal);
        if let Some(group) = self.groups.remove(&id) {
            self.group_names.remove(&group.group_name);
        }
    }

    /// Deletes what `owner` owns. Descendants owned by someone else are
    /// detached to the top level instead of deleted.
    fn delete_owned_by(&mut self, owner: &Principal) {
        let owned: Vec<ResourceId> = self
            .resources
            .values()
            .filter(|r| r.owner.as_ref() == Some(owner))
            .map(|r| r.id)
            .collect();
        for id in owned {
            // An earlier iteration may already have removed it as a descendant.
            if !self.resources.contains_key(&id) {
                continue;
            }
            let (doomed, detached) = self.owned_subtree(id, owner);
            for foreign in detached {
                if let Some(resource) = self.resources.get_mut(&foreign) {
                    resource.parent_id = None;
                }
            }
            for gone in doomed {
                self.resources.remove(&gone);
                self.grants.retain(|g| g.scope != GrantScope::Resource(gone));
            }
        }
    }

    /// Walks down from `id` through resources owned by `owner`. Returns the
    /// visited resources and the foreign-owned children where the walk
    /// stopped.
    fn owned_subtree(
        &self,
        id: ResourceId,
        owner: &Principal,
    ) -> (Vec<ResourceId>, Vec<ResourceId>) {
        let mut doomed = Vec::new();
        let mut detached = Vec::new();
        let mut queue = VecDeque::from([id]);
        let mut seen = BTreeSet::new();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            doomed.push(current);
            for child in self
                .resources
                .values()
                .filter(|r| r.parent_id == Some(current))
            {
                if child.owner.as_ref() == Some(owner) {
                    queue.push_back(child.id);
                } else {
                    detached.push(child.id);
                }
            }
        }
        (doomed, detached)
    }

    fn delete_resource(&mut self, id: ResourceId) {
        for doomed in self.subtree(id) {
            self.resources.remove(&doomed);
            self.grants
                .retain(|g| g.scope != GrantScope::Resource(doomed));
        }
    }

    /// `id` followed by all of its descendants, breadth-first.
    pub(crate) fn subtree(&self, id: ResourceId) -> Vec<ResourceId> {
        let mut order = Vec::new();
        let mut queue = VecDeque::from([id]);
        let mut seen = BTreeSet::new();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            order.push(current);
            queue.extend(
                self.resources
                    .values()
                    .filter(|r| r.parent_id == Some(current))
                    .map(|r| r.id),
            );
        }
        order
    }

    // ------------------------------------------------------------------------
    // Memberships and grants
    // ------------------------------------------------------------------------

    fn add_membership(&mut self, membership: Membership) -> Result<()> {
        if !self.users.contains_key(&membership.user_name) {
            return Err(Error::not_found("user", &membership.user_name));
        }
        let Some(group) = self.groups.get_mut(&membership.group_id) else {
            return Err(Error::not_found("group", membership.group_id));
        };
        if self.memberships.insert(membership) {
            group.member_count += 1;
        }
        Ok(())
    }

    fn remove_membership(&mut self, membership: &Membership) {
        if self.memberships.remove(membership) {
            if let Some(group) = self.groups.get_mut(&membership.group_id) {
                group.member_count = group.member_count.saturating_sub(1);
            }
        }
    }

    fn put_grant(&mut self, grant: Grant) -> Result<()> {
        ensure_not_blank("perm_name", &grant.perm_name)?;

        match &grant.principal {
            Principal::User(name) if !self.users.contains_key(name) => {
                return Err(Error::not_found("user", name));
            }
            Principal::Group(id) => {
                let Some(group) = self.groups.get(id) else {
                    return Err(Error::not_found("group", id));
                };
                if grant.scope == GrantScope::App && !group.allows_permission(&grant.perm_name) {
                    return Err(Error::validation_field(
                        "perm_name",
                        format!(
                            "'{}' is not in the possible permissions of group '{}'",
                            grant.perm_name, group.group_name
                        ),
                    ));
                }
            }
            Principal::User(_) => {}
        }

        match &grant.scope {
            GrantScope::App => {}
            GrantScope::ResourceType(resource_type) => {
                ensure_not_blank("resource_type", resource_type.as_str())?;
            }
            GrantScope::Resource(id) => {
                if !self.resources.contains_key(id) {
                    return Err(Error::not_found("resource", id));
                }
            }
        }

        self.grants.insert(grant);
        Ok(())
    }

    /// Rejects resource-scoped names the resource type does not declare.
    fn check_declared(
        &self,
        grant: &Grant,
        declared: &BTreeMap<ResourceType, BTreeSet<String>>,
    ) -> Result<()> {
        let resource_type = match &grant.scope {
            GrantScope::App => return Ok(()),
            GrantScope::ResourceType(t) => t,
            GrantScope::Resource(id) => match self.resources.get(id) {
                Some(resource) => &resource.resource_type,
                None => return Err(Error::not_found("resource", id)),
            },
        };
        match declared.get(resource_type) {
            Some(names) if !names.contains(&grant.perm_name) => Err(Error::validation_field(
                "perm_name",
                format!(
                    "'{}' is not a permission of resource type '{resource_type}'",
                    grant.perm_name
                ),
            )),
            _ => Ok(()),
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn principal_exists(&self, principal: &Principal) -> bool {
        match principal {
            Principal::User(name) => self.users.contains_key(name),
            Principal::Group(id) => self.groups.contains_key(id),
        }
    }

    fn count_members(&self, id: GroupId) -> u64 {
        self.memberships.iter().filter(|m| m.group_id == id).count() as u64
    }

    /// Returns `true` if every group's `member_count` matches its memberships.
    pub(crate) fn member_counts_consistent(&self) -> bool {
        self.groups
            .values()
            .all(|g| g.member_count == self.count_members(g.id))
    }

    pub(crate) fn max_group_id(&self) -> i64 {
        self.groups.keys().last().map(|id| id.get()).unwrap_or(0)
    }

    pub(crate) fn max_resource_id(&self) -> i64 {
        self.resources.keys().last().map(|id| id.get()).unwrap_or(0)
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    pub(crate) fn to_dump(&self) -> TablesDump {
        TablesDump {
            users: self.users.values().cloned().collect(),
            groups: self.groups.values().cloned().collect(),
            resources: self.resources.values().cloned().collect(),
            identities: self.identities.values().cloned().collect(),
            memberships: self.memberships.iter().cloned().collect(),
            grants: self.grants.iter().cloned().collect(),
        }
    }

    /// Rebuilds tables from a dump, re-checking every invariant.
    ///
    /// Rows are inserted raw first so that resources may reference parents
    /// that appear later in the dump, then validated as a whole.
    pub(crate) fn from_dump(dump: TablesDump) -> Result<Self> {
        let mut tables = Tables::default();
        for user in dump.users {
            tables.put_user(user, PutMode::Insert)?;
        }
        for group in dump.groups {
            tables.put_group(group, PutMode::Insert)?;
        }
        for resource in dump.resources {
            if tables.resources.insert(resource.id, resource).is_some() {
                return Err(Error::validation("snapshot contains duplicate resource ids"));
            }
        }
        let resources: Vec<Resource> = tables.resources.values().cloned().collect();
        for resource in resources {
            tables.put_resource(resource, PutMode::Upsert)?;
        }
        for identity in dump.identities {
            tables.put_identity(identity, PutMode::Insert)?;
        }
        for membership in dump.memberships {
            tables.add_membership(membership)?;
        }
        for grant in dump.grants {
            tables.put_grant(grant)?;
        }
        Ok(tables)
    }
}
