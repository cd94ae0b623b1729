//! Fluent query builders over a [`StoreReader`].
//!
//! Each builder narrows one listing of the store and returns either the
//! whole result ([`fetch`](UserQuery::fetch)) or one page of it
//! ([`page`](UserQuery::page)).

use keystone_core::{
    Group, Owner, Resource, ResourceId, ResourceType, Result, User, UserName, UserStatus,
};
use keystone_store::{ParentFilter, ResourceFilter, StoreReader, UserFilter};
use serde::{Deserialize, Serialize};

use crate::page::{Page, PageRequest, paginate};

/// Result ordering for query builders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Natural key order.
    #[default]
    Ascending,
    /// Reverse natural key order.
    Descending,
}

impl SortOrder {
    fn apply<T>(self, mut items: Vec<T>) -> Vec<T> {
        if self == Self::Descending {
            items.reverse();
        }
        items
    }
}

// ============================================================================
// UserQuery
// ============================================================================

/// Users ordered by user name.
#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    filter: UserFilter,
    status: Option<UserStatus>,
    order: SortOrder,
}

impl UserQuery {
    /// Matches every user.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to the given user names.
    pub fn names<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<UserName>,
    {
        self.filter.user_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Case-insensitive substring of the user name.
    pub fn name_contains(mut self, needle: impl Into<String>) -> Self {
        self.filter.name_contains = Some(needle.into());
        self
    }

    /// Case-insensitive exact email.
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.filter.email = Some(email.into());
        self
    }

    /// Restricts to one account status.
    pub fn status(mut self, status: UserStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the result order.
    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Runs the query.
    pub async fn fetch(&self, reader: &dyn StoreReader) -> Result<Vec<User>> {
        let mut users = reader.list_users(&self.filter).await?;
        if let Some(status) = self.status {
            users.retain(|u| u.status == status);
        }
        Ok(self.order.apply(users))
    }

    /// Runs the query and returns one page.
    pub async fn page(&self, reader: &dyn StoreReader, request: PageRequest) -> Result<Page<User>> {
        paginate(self.fetch(reader).await?, request)
    }
}

// ============================================================================
// GroupQuery
// ============================================================================

/// Groups ordered by group name.
#[derive(Debug, Clone, Default)]
pub struct GroupQuery {
    name_contains: Option<String>,
    allowing: Option<String>,
    order: SortOrder,
}

impl GroupQuery {
    /// Matches every group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Case-insensitive substring of the group name.
    pub fn name_contains(mut self, needle: impl Into<String>) -> Self {
        self.name_contains = Some(needle.into().to_lowercase());
        self
    }

    /// Only groups whose allow-list contains `perm_name`.
    pub fn allowing(mut self, perm_name: impl Into<String>) -> Self {
        self.allowing = Some(perm_name.into());
        self
    }

    /// Sets the result order.
    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    fn matches(&self, group: &Group) -> bool {
        self.name_contains
            .as_ref()
            .is_none_or(|needle| group.group_name.to_lowercase().contains(needle))
            && self
                .allowing
                .as_ref()
                .is_none_or(|perm| group.allows_permission(perm))
    }

    /// Runs the query.
    pub async fn fetch(&self, reader: &dyn StoreReader) -> Result<Vec<Group>> {
        let mut groups = reader.list_groups().await?;
        groups.retain(|g| self.matches(g));
        Ok(self.order.apply(groups))
    }

    /// Runs the query and returns one page.
    pub async fn page(
        &self,
        reader: &dyn StoreReader,
        request: PageRequest,
    ) -> Result<Page<Group>> {
        paginate(self.fetch(reader).await?, request)
    }
}

// ============================================================================
// ResourceQuery
// ============================================================================

/// Resources ordered by id.
#[derive(Debug, Clone, Default)]
pub struct ResourceQuery {
    filter: ResourceFilter,
    name_contains: Option<String>,
    order: SortOrder,
}

impl ResourceQuery {
    /// Matches every resource.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to the given ids.
    pub fn ids(mut self, ids: impl IntoIterator<Item = ResourceId>) -> Self {
        self.filter.ids = Some(ids.into_iter().collect());
        self
    }

    /// Restricts to the given types.
    pub fn types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ResourceType>,
    {
        self.filter.types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Only resources owned by `owner`.
    pub fn owned_by(mut self, owner: impl Into<Owner>) -> Self {
        self.filter.owner = Some(owner.into());
        self
    }

    /// Only top-level resources.
    pub fn roots(mut self) -> Self {
        self.filter.parent = Some(ParentFilter::Root);
        self
    }

    /// Only direct children of `parent`.
    pub fn children_of(mut self, parent: ResourceId) -> Self {
        self.filter.parent = Some(ParentFilter::Of(parent));
        self
    }

    /// Case-insensitive substring of the resource name.
    pub fn name_contains(mut self, needle: impl Into<String>) -> Self {
        self.name_contains = Some(needle.into().to_lowercase());
        self
    }

    /// Sets the result order.
    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Runs the query.
    pub async fn fetch(&self, reader: &dyn StoreReader) -> Result<Vec<Resource>> {
        let mut resources = reader.list_resources(&self.filter).await?;
        if let Some(needle) = &self.name_contains {
            resources.retain(|r| r.resource_name.to_lowercase().contains(needle));
        }
        Ok(self.order.apply(resources))
    }

    /// Runs the query and returns one page.
    pub async fn page(
        &self,
        reader: &dyn StoreReader,
        request: PageRequest,
    ) -> Result<Page<Resource>> {
        paginate(self.fetch(reader).await?, request)
    }
}

// ============================================================================
// Tests
// ============================================================================
