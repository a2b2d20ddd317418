//! Definition registry: property, aspect, hierarchy and catalog definitions.
//!
//! Definitions are immutable values built through validating constructors.
//! Their identity across systems is the FNV-1a hash of the canonical form in
//! [`crate::canonical`].

mod aspect;
mod catalog;
mod hierarchy;
mod property;
mod types;

pub use aspect::{AspectDef, AspectFlags};
pub use catalog::{CatalogDef, RESERVED_PREFIX};
pub use hierarchy::HierarchyDef;
pub use property::{PropertyDef, PropertyFlags};
pub use types::{HierarchyType, PropertyType, Species};

pub(crate) use catalog::check_unreserved;
