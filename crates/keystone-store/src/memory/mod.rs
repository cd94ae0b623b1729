//! In-memory entity store.
//!
//! [`MemoryStore`] keeps all tables behind one `Arc` and treats them as
//! immutable: a commit clones the current tables, applies the batch to the
//! clone, and swaps it in only if every mutation succeeded. Snapshots are
//! just clones of the `Arc`, so readers always see one committed state.
//!
//! # Persistence
//!
//! [`save_snapshot`](MemoryStore::save_snapshot) and
//! [`load_snapshot`](MemoryStore::load_snapshot) write and read a JSON
//! dump. Loading re-checks every invariant.
//!
//! # Limitations
//!
//! - Each commit copies every table: O(n) per write
//! - All data must fit in memory

mod tables;

use async_trait::async_trait;
use keystone_core::{
    Error, ExternalIdentity, Grant, Group, Membership, Principal, Resource, Result, User,
};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

use crate::batch::WriteBatch;
use crate::entity::{Entity, EntityKey};
use crate::traits::{
    EntityStore, ExternalIdentityFilter, GrantFilter, MembershipSubject, ResourceFilter, Sequence,
    StoreReader, UserFilter,
};
use tables::{Tables, TablesDump};

/// Copy-on-write in-memory [`EntityStore`].
pub struct MemoryStore {
    name: String,
    state: RwLock<Arc<Tables>>,
    group_seq: AtomicI64,
    resource_seq: AtomicI64,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::from_tables("memory", Tables::default())
    }

    /// Creates an empty store with a diagnostic name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self::from_tables(name, Tables::default())
    }

    fn from_tables(name: impl Into<String>, tables: Tables) -> Self {
        let group_seq = AtomicI64::new(tables.max_group_id());
        let resource_seq = AtomicI64::new(tables.max_resource_id());
        Self {
            name: name.into(),
            state: RwLock::new(Arc::new(tables)),
            group_seq,
            resource_seq,
        }
    }

    /// Writes the committed state to `path` as JSON.
    pub async fn save_snapshot(&self, path: &Path) -> Result<()> {
        let tables = self.state.read().await.clone();
        let json = serde_json::to_string_pretty(&tables.to_dump())?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            let exists = tokio::fs::try_exists(parent)
                .await
                .map_err(|e| Error::io_with_path(e, parent))?;
            if !exists {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::io_with_path(e, parent))?;
            }
        }
        tokio::fs::write(path, json)
            .await
            .map_err(|e| Error::io_with_path(e, path))?;

        log::debug!(
            "Saved store '{}': {} users, {} groups, {} resources to {}",
            self.name,
            tables.users.len(),
            tables.groups.len(),
            tables.resources.len(),
            path.display()
        );
        Ok(())
    }

    /// Loads a store from a JSON snapshot written by
    /// [`save_snapshot`](Self::save_snapshot).
    ///
    /// Returns `Ok(None)` if the file does not exist.
    pub async fn load_snapshot(path: &Path) -> Result<Option<Self>> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|e| Error::io_with_path(e, path))?;
        if !exists {
            return Ok(None);
        }
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::io_with_path(e, path))?;
        let dump: TablesDump = serde_json::from_str(&json)?;
        let tables = Tables::from_dump(dump)?;

        log::debug!(
            "Loaded store snapshot: {} users, {} groups, {} resources from {}",
            tables.users.len(),
            tables.groups.len(),
            tables.resources.len(),
            path.display()
        );
        Ok(Some(Self::from_tables("memory", tables)))
    }

    /// Returns `true` if every group's `member_count` matches its live
    /// membership count.
    pub async fn member_counts_consistent(&self) -> bool {
        self.state.read().await.member_counts_consistent()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn snapshot(&self) -> Result<Arc<dyn StoreReader>> {
        let tables = self.state.read().await.clone();
        Ok(Arc::new(MemorySnapshot { tables }))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let count = batch.len();
        let mut guard = self.state.write().await;
        let mut next = Tables::clone(&guard);
        for mutation in batch {
            let op = mutation.name();
            next.apply(mutation).inspect_err(|e| {
                log::debug!("Store '{}' rejected batch at {op}: {e}", self.name);
            })?;
        }
        // Explicit ids in the batch must never be handed out again.
        self.group_seq.fetch_max(next.max_group_id(), Ordering::SeqCst);
        self.resource_seq
            .fetch_max(next.max_resource_id(), Ordering::SeqCst);
        *guard = Arc::new(next);
        log::debug!("Store '{}' committed {count} mutation(s)", self.name);
        Ok(())
    }

    async fn next_id(&self, sequence: Sequence) -> Result<i64> {
        let counter = match sequence {
            Sequence::Group => &self.group_seq,
            Sequence::Resource => &self.resource_seq,
        };
        Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

// ============================================================================
// MemorySnapshot
// ============================================================================

/// Immutable view over one committed version of the tables.
struct MemorySnapshot {
    tables: Arc<Tables>,
}

#[async_trait]
impl StoreReader for MemorySnapshot {
    async fn find_by_key(&self, key: &EntityKey) -> Result<Option<Entity>> {
        let t = &self.tables;
        let found = match key {
            EntityKey::User(name) => t.users.get(name).cloned().map(Entity::User),
            EntityKey::Group(id) => t.groups.get(id).cloned().map(Entity::Group),
            EntityKey::GroupName(name) => t
                .group_names
                .get(name)
                .and_then(|id| t.groups.get(id))
                .cloned()
                .map(Entity::Group),
            EntityKey::Resource(id) => t.resources.get(id).cloned().map(Entity::Resource),
            EntityKey::ExternalIdentity(key) => t
                .identities
                .get(key)
                .cloned()
                .map(Entity::ExternalIdentity),
        };
        Ok(found)
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>> {
        Ok(self
            .tables
            .users
            .values()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect())
    }

    async fn list_groups(&self) -> Result<Vec<Group>> {
        let t = &self.tables;
        Ok(t.group_names
            .values()
            .filter_map(|id| t.groups.get(id))
            .cloned()
            .collect())
    }

    async fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Resource>> {
        Ok(self
            .tables
            .resources
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn list_external_identities(
        &self,
        filter: &ExternalIdentityFilter,
    ) -> Result<Vec<ExternalIdentity>> {
        Ok(self
            .tables
            .identities
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect())
    }

    async fn query_memberships(&self, subject: &MembershipSubject) -> Result<Vec<Membership>> {
        let t = &self.tables;
        let memberships = match subject {
            MembershipSubject::User(name) => {
                let mut found: Vec<Membership> = t
                    .memberships
                    .iter()
                    .filter(|m| &m.user_name == name)
                    .cloned()
                    .collect();
                found.sort_by(|a, b| {
                    let name_of = |m: &Membership| {
                        t.groups
                            .get(&m.group_id)
                            .map(|g| g.group_name.clone())
                            .unwrap_or_default()
                    };
                    name_of(a).cmp(&name_of(b))
                });
                found
            }
            // Set order is (user_name, group_id), so this is name-ordered.
            MembershipSubject::Group(id) => t
                .memberships
                .iter()
                .filter(|m| m.group_id == *id)
                .cloned()
                .collect(),
        };
        Ok(memberships)
    }

    async fn query_grants(&self, principal: &Principal, filter: &GrantFilter) -> Result<Vec<Grant>> {
        Ok(self
            .tables
            .grants
            .iter()
            .filter(|g| &g.principal == principal && filter.matches(&g.scope))
            .cloned()
            .collect())
    }

    async fn query_grants_any_principal(&self, filter: &GrantFilter) -> Result<Vec<Grant>> {
        Ok(self
            .tables
            .grants
            .iter()
            .filter(|g| filter.matches(&g.scope))
            .cloned()
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================
