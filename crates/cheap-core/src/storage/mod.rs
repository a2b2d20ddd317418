//! Storage layer for CHEAP catalogs.
//!
//! Catalogs are persisted as rows of a relational layout behind the
//! [`StorageAdapter`] trait. [`SledAdapter`] keeps every table in one sled
//! tree and applies each batch of [`RowOp`]s in a single transaction.

mod adapter;
mod config;
mod rows;
mod sled_adapter;

pub mod key;

pub use adapter::StorageAdapter;
pub use config::StorageConfig;
pub use key::current_timestamp;
pub use rows::{
    AspectDefRow, AspectRow, CatalogRow, DirectoryEntryRow, EntityRow, HierarchyEntityRow,
    HierarchyRow, PropertyDefRow, PropertyValueRow, RowId, RowOp,
};
pub use sled_adapter::SledAdapter;
