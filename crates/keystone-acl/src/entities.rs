//! Entity service: CRUD for users, groups, resources, and external
//! identities.
//!
//! Lookups return `Ok(None)` when nothing matches and fail only for
//! malformed input or a store failure. Writes go through one atomic batch
//! each; constraint violations surface from the store's commit.

use chrono::Utc;
use keystone_core::types::ensure_not_blank;
use keystone_core::{
    Error, ExternalIdentity, ExternalIdentityKey, Group, GroupId, NewGroup, NewResource, NewUser,
    Resource, ResourceId, Result, User, UserName,
};
use keystone_store::{
    EntityKey, EntityStore, ExternalIdentityFilter, Mutation, Sequence, StoreReader, UserFilter,
};
use std::sync::Arc;

/// Create, read, update, and delete entities.
#[derive(Clone)]
pub struct EntityService {
    store: Arc<dyn EntityStore>,
}

impl EntityService {
    /// Creates a service over `store`.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    async fn reader(&self) -> Result<Arc<dyn StoreReader>> {
        self.store.snapshot().await
    }

    // ------------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------------

    /// Registers a user.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a blank name or email, `Validation` if the name
    /// is taken.
    pub async fn create_user(&self, new: NewUser) -> Result<User> {
        let user_name = UserName::parse(new.user_name)?;
        ensure_not_blank("email", &new.email)?;
        let mut user = User::new(user_name, new.email);
        user.status = new.status;
        self.store
            .commit(Mutation::Insert(user.clone().into()).into())
            .await?;
        log::info!("Created user {}", user.user_name);
        Ok(user)
    }

    /// Fetches a user by name.
    pub async fn user(&self, user_name: &UserName) -> Result<Option<User>> {
        ensure_not_blank("user_name", user_name.as_str())?;
        self.reader().await?.find_user(user_name).await
    }

    /// Fetches a user by email, case-insensitively.
    pub async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        ensure_not_blank("email", email)?;
        let filter = UserFilter {
            email: Some(email.to_string()),
            ..Default::default()
        };
        Ok(self.reader().await?.list_users(&filter).await?.into_iter().next())
    }

    /// Fetches the named users that exist, ordered by name.
    pub async fn users_by_names(&self, user_names: &[UserName]) -> Result<Vec<User>> {
        let filter = UserFilter {
            user_names: Some(user_names.to_vec()),
            ..Default::default()
        };
        self.reader().await?.list_users(&filter).await
    }

    /// Replaces a user's stored fields.
    pub async fn update_user(&self, user: User) -> Result<User> {
        ensure_not_blank("user_name", user.user_name.as_str())?;
        ensure_not_blank("email", &user.email)?;
        self.store
            .commit(Mutation::Update(user.clone().into()).into())
            .await?;
        log::info!("Updated user {}", user.user_name);
        Ok(user)
    }

    /// Stamps the user's last login with the current time.
    pub async fn record_login(&self, user_name: &UserName) -> Result<User> {
        ensure_not_blank("user_name", user_name.as_str())?;
        self.store
            .commit(
                Mutation::RecordLogin {
                    user_name: user_name.clone(),
                    at: Utc::now(),
                }
                .into(),
            )
            .await?;
        self.user(user_name)
            .await?
            .ok_or_else(|| Error::not_found("user", user_name))
    }

    /// Deletes a user with its memberships, direct grants, identities, and
    /// the resources it owns.
    pub async fn delete_user(&self, user_name: &UserName) -> Result<()> {
        ensure_not_blank("user_name", user_name.as_str())?;
        self.store
            .commit(Mutation::Delete(EntityKey::User(user_name.clone())).into())
            .await?;
        log::info!("Deleted user {user_name}");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------------

    /// Creates a group with a freshly allocated id.
    pub async fn create_group(&self, new: NewGroup) -> Result<Group> {
        ensure_not_blank("group_name", &new.group_name)?;
        let id = GroupId::new(self.store.next_id(Sequence::Group).await?);
        let mut group = Group::new(id, new.group_name);
        group.description = new.description;
        group.possible_permissions = new.possible_permissions;
        self.store
            .commit(Mutation::Insert(group.clone().into()).into())
            .await?;
        log::info!("Created group {} ({id})", group.group_name);
        Ok(group)
    }

    /// Fetches a group by id.
    pub async fn group(&self, id: GroupId) -> Result<Option<Group>> {
        self.reader().await?.find_group(id).await
    }

    /// Fetches a group by its unique name.
    pub async fn group_by_name(&self, group_name: &str) -> Result<Option<Group>> {
        ensure_not_blank("group_name", group_name)?;
        self.reader().await?.find_group_by_name(group_name).await
    }

    /// Every group, ordered by name.
    pub async fn all_groups(&self) -> Result<Vec<Group>> {
        self.reader().await?.list_groups().await
    }

    /// Replaces a group's stored fields. `member_count` is owned by the
    /// store; the returned group carries the stored value.
    ///
    /// # Errors
    ///
    /// `Validation` if the new name is taken or the allow-list would drop a
    /// permission the group still holds app-wide.
    pub async fn update_group(&self, group: Group) -> Result<Group> {
        ensure_not_blank("group_name", &group.group_name)?;
        let id = group.id;
        self.store
            .commit(Mutation::Update(group.into()).into())
            .await?;
        log::info!("Updated group {id}");
        self.reader()
            .await?
            .find_group(id)
            .await?
            .ok_or_else(|| Error::not_found("group", id))
    }

    /// Deletes a group with its memberships, grants, and owned resources.
    pub async fn delete_group(&self, id: GroupId) -> Result<()> {
        self.store
            .commit(Mutation::Delete(EntityKey::Group(id)).into())
            .await?;
        log::info!("Deleted group {id}");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------------

    /// Creates a resource with a freshly allocated id.
    ///
    /// # Errors
    ///
    /// `Validation` unless exactly one existing owner is given, or if the
    /// parent does not exist.
    pub async fn create_resource(&self, new: NewResource) -> Result<Resource> {
        ensure_not_blank("resource_name", &new.resource_name)?;
        ensure_not_blank("resource_type", &new.resource_type)?;
        let owner = new.owner()?;
        let id = ResourceId::new(self.store.next_id(Sequence::Resource).await?);
        let mut resource = Resource::new(id, new.resource_name, new.resource_type, owner);
        resource.parent_id = new.parent_id;
        self.store
            .commit(Mutation::Insert(resource.clone().into()).into())
            .await?;
        log::info!(
            "Created {} resource {id} '{}'",
            resource.resource_type,
            resource.resource_name
        );
        Ok(resource)
    }

    /// Fetches a resource by id.
    pub async fn resource(&self, id: ResourceId) -> Result<Option<Resource>> {
        self.reader().await?.find_resource(id).await
    }

    /// Replaces a resource's stored fields.
    pub async fn update_resource(&self, resource: Resource) -> Result<Resource> {
        ensure_not_blank("resource_name", &resource.resource_name)?;
        self.store
            .commit(Mutation::Update(resource.clone().into()).into())
            .await?;
        log::info!("Updated resource {}", resource.id);
        Ok(resource)
    }

    /// Deletes a resource, its descendants, and every grant on them.
    pub async fn delete_resource(&self, id: ResourceId) -> Result<()> {
        self.store
            .commit(Mutation::Delete(EntityKey::Resource(id)).into())
            .await?;
        log::info!("Deleted resource {id}");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // External identities
    // ------------------------------------------------------------------------

    /// Links (or refreshes) an external identity for a local user.
    pub async fn link_identity(&self, identity: ExternalIdentity) -> Result<ExternalIdentity> {
        ensure_not_blank("external_id", &identity.external_id)?;
        ensure_not_blank("provider_name", &identity.provider_name)?;
        self.store
            .commit(Mutation::Upsert(identity.clone().into()).into())
            .await?;
        log::info!("Linked identity {}", identity.key());
        Ok(identity)
    }

    /// Finds an identity by provider-assigned id and provider.
    pub async fn identity_by_external_id_and_provider(
        &self,
        external_id: &str,
        provider_name: &str,
    ) -> Result<Option<ExternalIdentity>> {
        let reader = self.reader().await?;
        find_identity(reader.as_ref(), external_id, provider_name).await
    }

    /// Finds the local user behind an external identity.
    pub async fn user_by_external_id_and_provider(
        &self,
        external_id: &str,
        provider_name: &str,
    ) -> Result<Option<User>> {
        let reader = self.reader().await?;
        match find_identity(reader.as_ref(), external_id, provider_name).await? {
            Some(identity) => reader.find_user(&identity.local_user_name).await,
            None => Ok(None),
        }
    }

    /// Every identity linked to a user.
    pub async fn identities_for_user(&self, user_name: &UserName) -> Result<Vec<ExternalIdentity>> {
        ensure_not_blank("user_name", user_name.as_str())?;
        let filter = ExternalIdentityFilter {
            local_user_name: Some(user_name.clone()),
            ..Default::default()
        };
        self.reader().await?.list_external_identities(&filter).await
    }

    /// Removes an identity link.
    pub async fn unlink_identity(&self, key: &ExternalIdentityKey) -> Result<()> {
        self.store
            .commit(Mutation::Delete(EntityKey::ExternalIdentity(key.clone())).into())
            .await?;
        log::info!("Unlinked identity {key}");
        Ok(())
    }
}

impl std::fmt::Debug for EntityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityService")
            .field("store", &self.store.name())
            .finish()
    }
}

async fn find_identity(
    reader: &dyn StoreReader,
    external_id: &str,
    provider_name: &str,
) -> Result<Option<ExternalIdentity>> {
    ensure_not_blank("external_id", external_id)?;
    ensure_not_blank("provider_name", provider_name)?;
    let filter = ExternalIdentityFilter {
        external_id: Some(external_id.to_string()),
        provider_name: Some(provider_name.to_string()),
        ..Default::default()
    };
    Ok(reader
        .list_external_identities(&filter)
        .await?
        .into_iter()
        .next())
}

// ============================================================================
// Tests
// ============================================================================
