//! Entity and relation types for the authorization model.

mod grant;
mod group;
mod identity;
mod ids;
mod principal;
mod proptests;
mod resource;
mod user;

pub use grant::{Grant, GrantScope, Membership};
pub use group::{Group, NewGroup};
pub use identity::{ExternalIdentity, ExternalIdentityKey};
pub use ids::{GroupId, ResourceId, ResourceType, UserName, ensure_not_blank};
pub use principal::{Owner, Principal};
pub use resource::{NewResource, Resource};
pub use user::{NewUser, User, UserStatus};
