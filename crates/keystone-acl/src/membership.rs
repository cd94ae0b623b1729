//! Group membership index.
//!
//! One membership relation, queried from either side. The store keeps each
//! group's `member_count` in step with it.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use keystone_core::types::ensure_not_blank;
use keystone_core::{Error, Group, GroupId, Membership, Result, User, UserName};
use keystone_query::{Page, PageRequest, PageSource, paginate_source};
use keystone_store::{EntityStore, MembershipSubject, Mutation, StoreReader, UserFilter};
use std::collections::VecDeque;
use std::sync::Arc;

/// Membership operations.
#[derive(Clone)]
pub struct MembershipIndex {
    store: Arc<dyn EntityStore>,
}

impl MembershipIndex {
    /// Creates an index over `store`.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Adds `user_name` to a group. Adding twice is a no-op.
    ///
    /// # Errors
    ///
    /// `NotFound` if the user or group does not exist.
    pub async fn add_user_to_group(&self, user_name: &UserName, group_id: GroupId) -> Result<()> {
        ensure_not_blank("user_name", user_name.as_str())?;
        self.store
            .commit(Mutation::AddMembership(Membership::new(user_name.clone(), group_id)).into())
            .await?;
        log::info!("Added {user_name} to group {group_id}");
        Ok(())
    }

    /// Removes `user_name` from a group. Removing an absent membership is a
    /// no-op.
    pub async fn remove_user_from_group(
        &self,
        user_name: &UserName,
        group_id: GroupId,
    ) -> Result<()> {
        ensure_not_blank("user_name", user_name.as_str())?;
        self.store
            .commit(
                Mutation::RemoveMembership(Membership::new(user_name.clone(), group_id)).into(),
            )
            .await?;
        log::info!("Removed {user_name} from group {group_id}");
        Ok(())
    }

    /// Returns `true` if the user belongs to the group.
    pub async fn is_member(&self, user_name: &UserName, group_id: GroupId) -> Result<bool> {
        ensure_not_blank("user_name", user_name.as_str())?;
        let reader = self.store.snapshot().await?;
        Ok(reader
            .query_memberships(&MembershipSubject::User(user_name.clone()))
            .await?
            .iter()
            .any(|m| m.group_id == group_id))
    }

    /// Groups of a user, ordered by group name.
    pub async fn groups_for_user(&self, user_name: &UserName) -> Result<Vec<Group>> {
        ensure_not_blank("user_name", user_name.as_str())?;
        let reader = self.store.snapshot().await?;
        let mut groups = Vec::new();
        for membership in reader
            .query_memberships(&MembershipSubject::User(user_name.clone()))
            .await?
        {
            if let Some(group) = reader.find_group(membership.group_id).await? {
                groups.push(group);
            }
        }
        Ok(groups)
    }

    /// Members of a group, ordered by user name, loaded eagerly.
    pub async fn users_for_group(&self, group_id: GroupId) -> Result<Vec<User>> {
        let reader = self.store.snapshot().await?;
        let names = member_names(reader.as_ref(), group_id).await?;
        if names.is_empty() {
            return Ok(Vec::new());
        }
        reader
            .list_users(&UserFilter {
                user_names: Some(names),
                ..Default::default()
            })
            .await
    }

    /// Members of a group, ordered by user name, fetched lazily in batches of
    /// `batch_size`.
    ///
    /// The stream reads from one snapshot taken on first poll.
    pub fn users_for_group_stream(
        &self,
        group_id: GroupId,
        batch_size: usize,
    ) -> BoxStream<'static, Result<User>> {
        let cursor = MemberCursor {
            store: self.store.clone(),
            group_id,
            batch_size: batch_size.max(1),
            state: None,
        };
        stream::try_unfold(cursor, |mut cursor| async move {
            let batch = cursor.next_batch().await?;
            Ok::<_, Error>(batch.map(|users| (users, cursor)))
        })
        .map_ok(|users| stream::iter(users.into_iter().map(Ok::<User, Error>)))
        .try_flatten()
        .boxed()
    }

    /// One page of a group's members, ordered by user name.
    ///
    /// `user_names` restricts the page to those members. A supplied
    /// `request.item_count` skips counting.
    pub async fn user_paginator(
        &self,
        group_id: GroupId,
        request: PageRequest,
        user_names: Option<Vec<UserName>>,
    ) -> Result<Page<User>> {
        let reader = self.store.snapshot().await?;
        let mut names = member_names(reader.as_ref(), group_id).await?;
        if let Some(only) = user_names {
            names.retain(|n| only.contains(n));
        }
        let source = MemberSource { reader, names };
        paginate_source(&source, request).await
    }
}

impl std::fmt::Debug for MembershipIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembershipIndex")
            .field("store", &self.store.name())
            .finish()
    }
}

/// Member names of an existing group, ordered by user name.
async fn member_names(reader: &dyn StoreReader, group_id: GroupId) -> Result<Vec<UserName>> {
    if reader.find_group(group_id).await?.is_none() {
        return Err(Error::not_found("group", group_id));
    }
    Ok(reader
        .query_memberships(&MembershipSubject::Group(group_id))
        .await?
        .into_iter()
        .map(|m| m.user_name)
        .collect())
}

// ============================================================================
// Lazy and paged member loading
// ============================================================================

struct MemberCursor {
    store: Arc<dyn EntityStore>,
    group_id: GroupId,
    batch_size: usize,
    state: Option<(Arc<dyn StoreReader>, VecDeque<UserName>)>,
}

impl MemberCursor {
    async fn next_batch(&mut self) -> Result<Option<Vec<User>>> {
        if self.state.is_none() {
            let reader = self.store.snapshot().await?;
            let names = member_names(reader.as_ref(), self.group_id).await?;
            self.state = Some((reader, names.into()));
        }
        let Some((reader, pending)) = self.state.as_mut() else {
            return Ok(None);
        };
        if pending.is_empty() {
            return Ok(None);
        }
        let take = self.batch_size.min(pending.len());
        let chunk: Vec<UserName> = pending.drain(..take).collect();
        let users = reader
            .list_users(&UserFilter {
                user_names: Some(chunk),
                ..Default::default()
            })
            .await?;
        Ok(Some(users))
    }
}

struct MemberSource {
    reader: Arc<dyn StoreReader>,
    names: Vec<UserName>,
}

#[async_trait]
impl PageSource for MemberSource {
    type Item = User;

    async fn count(&self) -> Result<usize> {
        Ok(self.names.len())
    }

    async fn fetch(&self, offset: usize, limit: usize) -> Result<Vec<User>> {
        let chunk: Vec<UserName> = self.names.iter().skip(offset).take(limit).cloned().collect();
        if chunk.is_empty() {
            return Ok(Vec::new());
        }
        self.reader
            .list_users(&UserFilter {
                user_names: Some(chunk),
                ..Default::default()
            })
            .await
    }
}

// ============================================================================
// Tests
// ============================================================================
