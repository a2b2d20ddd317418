//! Row types of the persisted relational layout.
//!
//! Ids are raw UUID bytes. Timestamps are microseconds since the Unix epoch.
//! Rows are stored with rkyv.

use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};

use crate::error::Error;

/// Raw id bytes of an entity, catalog, aspect def or hierarchy.
pub type RowId = [u8; 16];

/// `catalogs` row.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct CatalogRow {
    pub id: RowId,
    /// Species name, e.g. `SOURCE`.
    pub species: String,
    pub uri: Option<String>,
    pub upstream: Option<RowId>,
    pub version: u64,
    pub strict: bool,
    /// The catalog def in its JSON wire form.
    pub catalog_def: String,
    pub created_at: u64,
    pub updated_at: u64,
}

/// `entities` row.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct EntityRow {
    pub id: RowId,
    pub created_at: u64,
}

/// `aspect_defs` row, unique on (catalog_id, name).
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct AspectDefRow {
    pub id: RowId,
    pub catalog_id: RowId,
    pub name: String,
    pub readable: bool,
    pub writable: bool,
    pub can_add_properties: bool,
    pub can_remove_properties: bool,
    pub created_at: u64,
}

/// `property_defs` row, unique on (aspect_def_id, name).
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct PropertyDefRow {
    pub id: RowId,
    pub aspect_def_id: RowId,
    pub name: String,
    /// Declaration order within the aspect def.
    pub position: u32,
    pub type_code: u8,
    /// `value_json` of the default, when there is one.
    pub default_value: Option<String>,
    pub has_default_value: bool,
    pub readable: bool,
    pub writable: bool,
    pub nullable: bool,
    pub removable: bool,
    pub multivalued: bool,
}

/// `aspects` row, unique on (catalog_id, entity_id, aspect_def_id).
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct AspectRow {
    pub id: RowId,
    pub catalog_id: RowId,
    pub entity_id: RowId,
    pub aspect_def_id: RowId,
    pub created_at: u64,
    pub updated_at: u64,
}

/// `property_values` row, unique on (aspect_id, property_name).
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct PropertyValueRow {
    pub id: RowId,
    pub aspect_id: RowId,
    pub property_name: String,
    pub value_json: String,
}

/// `hierarchies` row, unique on (catalog_id, name).
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct HierarchyRow {
    pub id: RowId,
    pub catalog_id: RowId,
    pub name: String,
    /// Hierarchy type ordinal.
    pub hierarchy_type: u8,
    pub version: u64,
    /// Set for aspect maps only.
    pub aspect_def_id: Option<RowId>,
    pub created_at: u64,
}

/// `hierarchy_entities` row. `position` is set for entity lists only.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct HierarchyEntityRow {
    pub id: RowId,
    pub hierarchy_id: RowId,
    pub entity_id: RowId,
    pub position: Option<u64>,
}

/// `hierarchy_directory` row, unique on (hierarchy_id, entry_name).
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct DirectoryEntryRow {
    pub id: RowId,
    pub hierarchy_id: RowId,
    pub entry_name: String,
    pub entity_id: RowId,
}

macro_rules! impl_row_codec {
    ($($row:ty),* $(,)?) => {
        $(
            impl $row {
                /// Serialize the row to bytes using rkyv.
                pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
                    rkyv::to_bytes::<rkyv::rancor::Error>(self)
                        .map(|v| v.to_vec())
                        .map_err(|e| Error::Serialization(e.to_string()))
                }

                /// Deserialize a row from bytes using rkyv.
                pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
                    // sled values carry no alignment guarantee.
                    let mut aligned = AlignedVec::<16>::with_capacity(bytes.len());
                    aligned.extend_from_slice(bytes);
                    rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
                        .map_err(|e| Error::Deserialization(e.to_string()))
                }
            }
        )*
    };
}

impl_row_codec! {
    CatalogRow,
    EntityRow,
    AspectDefRow,
    PropertyDefRow,
    AspectRow,
    PropertyValueRow,
    HierarchyRow,
    HierarchyEntityRow,
    DirectoryEntryRow,
}

/// One write against the row layout. A slice of operations is applied
/// atomically, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOp {
    /// Upsert a catalog. The stored `created_at` is kept.
    PutCatalog(CatalogRow),
    /// Delete a catalog with its aspect defs, aspects, hierarchies and
    /// memberships, then the catalog's own entity.
    DeleteCatalog { id: RowId },
    /// Insert an entity unless it exists.
    PutEntity(EntityRow),
    /// Delete an entity with its aspects and every membership referencing it.
    DeleteEntity { id: RowId },
    /// Upsert an aspect def and replace its property defs. An aspect def id
    /// owned by another catalog is rejected.
    PutAspectDef {
        def: AspectDefRow,
        properties: Vec<PropertyDefRow>,
    },
    /// Upsert a hierarchy. A different hierarchy previously stored under the
    /// same name loses its memberships.
    PutHierarchy(HierarchyRow),
    /// Delete a hierarchy and its memberships.
    DeleteHierarchy { catalog_id: RowId, name: String },
    /// Upsert an aspect and replace all of its property values. An existing
    /// aspect keeps its id.
    PutAspect {
        aspect: AspectRow,
        values: Vec<PropertyValueRow>,
    },
    /// Delete an aspect and its property values.
    DeleteAspect {
        catalog_id: RowId,
        aspect_def_id: RowId,
        entity_id: RowId,
    },
    /// Upsert a membership: keyed by entity for sets and aspect maps, by
    /// position when `position` is set.
    PutMember(HierarchyEntityRow),
    /// Delete an entity-keyed membership.
    DeleteMember { hierarchy_id: RowId, entity_id: RowId },
    /// Rewrite the tail of an entity list: every position from `from` on is
    /// dropped and `rows` are written at `from`, `from + 1`, and so on.
    ReplaceMembers {
        hierarchy_id: RowId,
        from: u64,
        rows: Vec<HierarchyEntityRow>,
    },
    /// Upsert a directory entry.
    PutEntry(DirectoryEntryRow),
    /// Delete a directory entry.
    DeleteEntry { hierarchy_id: RowId, entry_name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_roundtrip() {
        let row = HierarchyRow {
            id: [1; 16],
            catalog_id: [2; 16],
            name: "queue".to_string(),
            hierarchy_type: 0,
            version: 3,
            aspect_def_id: None,
            created_at: 42,
        };
        let bytes = row.to_bytes().unwrap();
        assert_eq!(HierarchyRow::from_bytes(&bytes).unwrap(), row);
    }

    #[test]
    fn test_unaligned_input() {
        let row = PropertyValueRow {
            id: [3; 16],
            aspect_id: [4; 16],
            property_name: "age".to_string(),
            value_json: "30".to_string(),
        };
        let bytes = row.to_bytes().unwrap();
        let mut shifted = vec![0u8];
        shifted.extend_from_slice(&bytes);
        assert_eq!(PropertyValueRow::from_bytes(&shifted[1..]).unwrap(), row);
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(CatalogRow::from_bytes(&[1, 2, 3]).is_err());
    }
}
