//! The storage collaborator boundary.

use super::rows::{
    AspectDefRow, AspectRow, CatalogRow, DirectoryEntryRow, EntityRow, HierarchyEntityRow,
    HierarchyRow, PropertyDefRow, PropertyValueRow, RowId, RowOp,
};
use crate::error::Error;

/// Persists and fetches rows of the relational layout.
///
/// Adapters keep referential integrity (the cascades documented on
/// [`RowOp`]) but never validate schema; that happens before any write is
/// issued. Failures are returned as they are, without retries.
pub trait StorageAdapter: Send + Sync {
    /// Apply operations atomically and in order: all of them or none.
    fn apply(&self, ops: &[RowOp]) -> Result<(), Error>;

    fn fetch_catalog(&self, id: &RowId) -> Result<Option<CatalogRow>, Error>;

    fn list_catalogs(&self) -> Result<Vec<CatalogRow>, Error>;

    fn fetch_entity(&self, id: &RowId) -> Result<Option<EntityRow>, Error>;

    /// Aspect defs of a catalog with their property defs.
    fn fetch_aspect_defs(
        &self,
        catalog_id: &RowId,
    ) -> Result<Vec<(AspectDefRow, Vec<PropertyDefRow>)>, Error>;

    fn fetch_hierarchies(&self, catalog_id: &RowId) -> Result<Vec<HierarchyRow>, Error>;

    /// Aspects of one aspect def in a catalog with their property values.
    fn fetch_aspects(
        &self,
        catalog_id: &RowId,
        aspect_def_id: &RowId,
    ) -> Result<Vec<(AspectRow, Vec<PropertyValueRow>)>, Error>;

    fn fetch_members(&self, hierarchy_id: &RowId) -> Result<Vec<HierarchyEntityRow>, Error>;

    fn fetch_entries(&self, hierarchy_id: &RowId) -> Result<Vec<DirectoryEntryRow>, Error>;

    /// Make applied operations durable.
    fn flush(&self) -> Result<(), Error>;
}
