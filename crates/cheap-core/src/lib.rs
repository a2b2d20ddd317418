//! CHEAP Core - Catalog, Hierarchy, Entity, Aspect and Property model.
//!
//! This crate provides the definition layer with its canonical FNV-1a schema
//! hash, the runtime model of entities, aspects and hierarchies, catalogs,
//! and a store persisting catalogs through a relational row mapping.

pub mod canonical;
pub mod catalog;
pub mod def;
pub mod error;
pub mod hash;
pub mod hierarchy;
pub mod mapping;
pub mod model;
pub mod storage;
pub mod store;

pub use catalog::{
    is_reserved, AddHierarchy, Catalog, CatalogOptions, ASPECT_DEFS_DIRECTORY,
    HIERARCHIES_DIRECTORY,
};
pub use def::{
    AspectDef, AspectFlags, CatalogDef, HierarchyDef, HierarchyType, PropertyDef, PropertyFlags,
    PropertyType, Species, RESERVED_PREFIX,
};
pub use error::Error;
pub use hash::{fnv1a64, Fnv1a};
pub use hierarchy::{AspectMapHierarchy, EntityDirectory, EntityList, EntitySet, Hierarchy};
pub use model::{Aspect, EntityId, PropertyValue, ScalarValue, ENTITY_ID_SIZE};
pub use storage::{SledAdapter, StorageAdapter, StorageConfig};
pub use store::{SharedStore, Store};
