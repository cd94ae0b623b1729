//! # keystone-query
//!
//! Listing helpers for Keystone.
//!
//! - [`paginate`] / [`paginate_source`]: 1-based page/offset pagination with
//!   clamping and an optional precomputed total
//! - [`UserQuery`], [`GroupQuery`], [`ResourceQuery`]: filtered, ordered
//!   listings over a [`StoreReader`](keystone_store::StoreReader)

#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

pub mod builders;
pub mod page;

mod proptests;

pub use builders::{GroupQuery, ResourceQuery, SortOrder, UserQuery};
pub use page::{Page, PageRequest, PageSource, paginate, paginate_source};
