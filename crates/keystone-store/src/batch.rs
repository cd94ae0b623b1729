//! Atomic write batches.
//!
//! Every logical write goes through one [`WriteBatch`]: the store either
//! applies all of its mutations or none of them.

use chrono::{DateTime, Utc};
use keystone_core::{Grant, Membership, Owner, ResourceId, ResourceType, UserName};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::entity::{Entity, EntityKey};

/// A single write against the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Create an entity; fails if its natural key already exists.
    Insert(Entity),
    /// Replace an existing entity; fails with NotFound if absent.
    Update(Entity),
    /// Create or replace an entity.
    Upsert(Entity),
    /// Delete an entity and everything that cascades from it.
    Delete(EntityKey),
    /// Add a membership (idempotent).
    AddMembership(Membership),
    /// Remove a membership (no-op if absent).
    RemoveMembership(Membership),
    /// Store a grant (idempotent).
    PutGrant(Grant),
    /// Store a grant whose name must be declared for the resource type it
    /// applies to. Types missing from `declared` accept any name.
    PutDeclaredGrant {
        /// The grant.
        grant: Grant,
        /// Permission names per registered resource type.
        declared: Arc<BTreeMap<ResourceType, BTreeSet<String>>>,
    },
    /// Remove a grant (no-op if absent).
    RemoveGrant(Grant),
    /// Transfer a resource to a new owner, leaving its other fields as
    /// committed.
    SetOwner {
        /// The resource.
        id: ResourceId,
        /// The new owner; must exist.
        owner: Owner,
    },
    /// Move a resource under `parent`, or to the top level with `None`.
    SetParent {
        /// The resource.
        id: ResourceId,
        /// The new parent; must exist and not be a descendant.
        parent: Option<ResourceId>,
    },
    /// Stamp a user's last login.
    RecordLogin {
        /// The user.
        user_name: UserName,
        /// Login time.
        at: DateTime<Utc>,
    },
}

impl Mutation {
    /// Short operation name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::Update(_) => "update",
            Self::Upsert(_) => "upsert",
            Self::Delete(_) => "delete",
            Self::AddMembership(_) => "add_membership",
            Self::RemoveMembership(_) => "remove_membership",
            Self::PutGrant(_) => "put_grant",
            Self::PutDeclaredGrant { .. } => "put_declared_grant",
            Self::RemoveGrant(_) => "remove_grant",
            Self::SetOwner { .. } => "set_owner",
            Self::SetParent { .. } => "set_parent",
            Self::RecordLogin { .. } => "record_login",
        }
    }
}

/// Ordered list of mutations applied atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    mutations: Vec<Mutation>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a mutation.
    pub fn push(&mut self, mutation: Mutation) -> &mut Self {
        self.mutations.push(mutation);
        self
    }

    /// Appends a mutation, builder style.
    pub fn with(mut self, mutation: Mutation) -> Self {
        self.mutations.push(mutation);
        self
    }

    /// Number of mutations.
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// Returns `true` if the batch has no mutations.
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Iterates mutations in application order.
    pub fn iter(&self) -> impl Iterator<Item = &Mutation> {
        self.mutations.iter()
    }
}

impl From<Mutation> for WriteBatch {
    fn from(mutation: Mutation) -> Self {
        Self {
            mutations: vec![mutation],
        }
    }
}

impl IntoIterator for WriteBatch {
    type Item = Mutation;
    type IntoIter = std::vec::IntoIter<Mutation>;

    fn into_iter(self) -> Self::IntoIter {
        self.mutations.into_iter()
    }
}
