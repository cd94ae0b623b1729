//! Keystone Core: shared types, errors, and configuration.
//!
//! This crate provides the foundational types used across all Keystone crates.
//! It has no internal Keystone dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error taxonomy and Result alias
//! - [`types`]: Users, groups, resources, identities, principals, and grants
//! - [`config`]: Resource type registry and engine settings

#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod types;

// Re-export key types at crate root for convenience
pub use config::{KeystoneConfig, PaginationConfig, ResolutionConfig, ResourceTypeConfig};
pub use error::{Error, Result};
pub use types::{
    ExternalIdentity, ExternalIdentityKey, Grant, GrantScope, Group, GroupId, Membership,
    NewGroup, NewResource, NewUser, Owner, Principal, Resource, ResourceId, ResourceType, User,
    UserName, UserStatus,
};
