//! Common test utilities and harness for Keystone integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use keystone_acl::AccessControl;
use keystone_core::{
    Error, ExternalIdentity, Grant, Group, GroupId, KeystoneConfig, Membership, NewGroup,
    NewResource, NewUser, Principal, Resource, ResourceId, ResourceTypeConfig, Result, User,
    UserName,
};
use keystone_store::{
    Entity, EntityKey, EntityStore, ExternalIdentityFilter, GrantFilter, MemoryStore,
    MembershipSubject, ResourceFilter, Sequence, StoreReader, UserFilter, WriteBatch,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Resource types used across the suite.
///
/// - `folder`: view/edit/share, inheritable
/// - `document`: view/edit/delete
/// - `archive`: view, not inheritable
pub fn test_config() -> KeystoneConfig {
    KeystoneConfig::default()
        .with_resource_type(
            "folder",
            ResourceTypeConfig::new(["view", "edit", "share"]).inheritable(),
        )
        .with_resource_type("document", ResourceTypeConfig::new(["view", "edit", "delete"]))
        .with_resource_type("archive", ResourceTypeConfig::new(["view"]))
}

/// Test harness for integration tests.
pub struct TestHarness {
    /// The store behind every service.
    pub store: Arc<FailingStore>,
    /// All services.
    pub acl: AccessControl,
}

impl TestHarness {
    /// Creates a harness with [`test_config`].
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Creates a harness with a custom configuration.
    pub fn with_config(config: KeystoneConfig) -> Self {
        let store = Arc::new(FailingStore::new());
        let acl = AccessControl::new(store.clone(), config).unwrap();
        Self { store, acl }
    }

    /// Creates users with `name@example.com` emails.
    pub async fn users(&self, names: &[&str]) {
        for name in names {
            self.acl
                .entities()
                .create_user(NewUser::new(*name, format!("{name}@example.com")))
                .await
                .unwrap();
        }
    }

    /// Creates a group allowing `perms` app-wide.
    pub async fn group(&self, name: &str, perms: &[&str]) -> Group {
        self.acl
            .entities()
            .create_group(NewGroup::new(name).with_possible_permissions(perms.iter().copied()))
            .await
            .unwrap()
    }

    /// Adds each user to `group`.
    pub async fn join(&self, group: GroupId, names: &[&str]) {
        for name in names {
            self.acl
                .memberships()
                .add_user_to_group(&UserName::new(*name), group)
                .await
                .unwrap();
        }
    }

    /// Creates a resource owned by `owner`, optionally under `parent`.
    pub async fn resource(
        &self,
        name: &str,
        resource_type: &str,
        owner: Principal,
        parent: Option<ResourceId>,
    ) -> Resource {
        let mut new = NewResource::new(name, resource_type);
        match owner {
            Principal::User(user) => new = new.owned_by_user(user),
            Principal::Group(group) => new = new.owned_by_group(group),
        }
        if let Some(parent) = parent {
            new = new.under(parent);
        }
        self.acl.entities().create_resource(new).await.unwrap()
    }

    /// Current member count of a group.
    pub async fn member_count(&self, group: GroupId) -> u64 {
        self.acl
            .entities()
            .group(group)
            .await
            .unwrap()
            .unwrap()
            .member_count
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Shorthand for a user principal.
pub fn user(name: &str) -> Principal {
    Principal::user(name)
}

/// Shorthand for a group principal.
pub fn group(id: GroupId) -> Principal {
    Principal::group(id)
}

// ============================================================================
// FailingStore
// ============================================================================

/// A [`MemoryStore`] whose grant and membership reads can be made to fail
/// and whose snapshots can be made slow.
pub struct FailingStore {
    inner: MemoryStore,
    fail_reads: Arc<AtomicBool>,
    snapshot_delay_ms: AtomicU64,
}

impl FailingStore {
    /// Creates a healthy store.
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::with_name("failing"),
            fail_reads: Arc::new(AtomicBool::new(false)),
            snapshot_delay_ms: AtomicU64::new(0),
        }
    }

    /// Delays every snapshot by `ms` milliseconds, widening the window
    /// between a service's read and its commit.
    pub fn slow_snapshots(&self, ms: u64) {
        self.snapshot_delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Makes subsequent grant and membership queries fail.
    pub fn break_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    /// Restores normal reads.
    pub fn heal(&self) {
        self.fail_reads.store(false, Ordering::SeqCst);
    }

    /// Whether member counts match memberships.
    pub async fn member_counts_consistent(&self) -> bool {
        self.inner.member_counts_consistent().await
    }
}

#[async_trait]
impl EntityStore for FailingStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn snapshot(&self) -> Result<Arc<dyn StoreReader>> {
        let inner = self.inner.snapshot().await?;
        let delay = self.snapshot_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(Arc::new(FailingReader {
            inner,
            fail_reads: self.fail_reads.clone(),
        }))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.inner.commit(batch).await
    }

    async fn next_id(&self, sequence: Sequence) -> Result<i64> {
        self.inner.next_id(sequence).await
    }
}

struct FailingReader {
    inner: Arc<dyn StoreReader>,
    fail_reads: Arc<AtomicBool>,
}

impl FailingReader {
    fn check(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::storage("connection reset"));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreReader for FailingReader {
    async fn find_by_key(&self, key: &EntityKey) -> Result<Option<Entity>> {
        self.inner.find_by_key(key).await
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>> {
        self.inner.list_users(filter).await
    }

    async fn list_groups(&self) -> Result<Vec<Group>> {
        self.inner.list_groups().await
    }

    async fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Resource>> {
        self.inner.list_resources(filter).await
    }

    async fn list_external_identities(
        &self,
        filter: &ExternalIdentityFilter,
    ) -> Result<Vec<ExternalIdentity>> {
        self.inner.list_external_identities(filter).await
    }

    async fn query_memberships(&self, subject: &MembershipSubject) -> Result<Vec<Membership>> {
        self.check()?;
        self.inner.query_memberships(subject).await
    }

    async fn query_grants(&self, principal: &Principal, filter: &GrantFilter) -> Result<Vec<Grant>> {
        self.check()?;
        self.inner.query_grants(principal, filter).await
    }

    async fn query_grants_any_principal(&self, filter: &GrantFilter) -> Result<Vec<Grant>> {
        self.check()?;
        self.inner.query_grants_any_principal(filter).await
    }
}
