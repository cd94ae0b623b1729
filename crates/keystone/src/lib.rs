//! Keystone authorization model: umbrella crate.
//!
//! This crate re-exports all Keystone components for convenience.
//! Use feature flags to enable specific functionality.

#![doc = include_str!("../README.md")]

pub use keystone_core as core;
pub use keystone_store as store;

#[cfg(feature = "query")]
pub use keystone_query as query;

#[cfg(feature = "acl")]
pub use keystone_acl as acl;

#[cfg(feature = "acl")]
pub use keystone_acl::AccessControl;

pub use keystone_core::{Error, KeystoneConfig, Result};
