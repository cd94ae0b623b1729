//! # keystone-store
//!
//! Persistence contract for Keystone entities.
//!
//! This crate provides:
//! - The [`EntityStore`] / [`StoreReader`] traits
//! - Atomic [`WriteBatch`]es of [`Mutation`]s
//! - A copy-on-write in-memory backend ([`MemoryStore`]) with JSON snapshots
//!
//! Every data-model invariant is enforced inside [`EntityStore::commit`], so
//! higher layers never observe a half-applied write.

#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

pub mod batch;
pub mod entity;
pub mod memory;
pub mod traits;

pub use batch::{Mutation, WriteBatch};
pub use entity::{Entity, EntityKey};
pub use memory::MemoryStore;
pub use traits::{
    EntityStore, ExternalIdentityFilter, GrantFilter, MembershipSubject, ParentFilter,
    ResourceFilter, Sequence, StoreReader, UserFilter,
};
