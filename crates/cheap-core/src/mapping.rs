//! Mapping between the in-memory model and storage rows.
//!
//! Aspect defs are stored relationally, one row per property def, and
//! property values as JSON text. The catalog's nominal definition is kept
//! whole on the catalog row. The reserved directories are derived and never
//! stored; they are rebuilt when a catalog is loaded.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use crate::catalog::{is_reserved, Catalog, CatalogOptions};
use crate::def::{
    AspectDef, AspectFlags, CatalogDef, HierarchyType, PropertyDef, PropertyFlags, PropertyType,
    Species,
};
use crate::error::Error;
use crate::hierarchy::{AspectMapHierarchy, EntityDirectory, EntityList, EntitySet, Hierarchy};
use crate::model::{Aspect, EntityId, PropertyValue};
use crate::storage::{
    current_timestamp, AspectDefRow, AspectRow, CatalogRow, DirectoryEntryRow, EntityRow,
    HierarchyEntityRow, HierarchyRow, PropertyDefRow, PropertyValueRow, RowOp, StorageAdapter,
};

/// Catalog row for a catalog at `version`.
pub fn catalog_row(catalog: &Catalog, version: u64) -> Result<CatalogRow, Error> {
    let catalog_def =
        serde_json::to_string(catalog.def()).map_err(|e| Error::Serialization(e.to_string()))?;
    let now = current_timestamp();
    Ok(CatalogRow {
        id: *catalog.id().as_bytes(),
        species: catalog.species().as_str().to_string(),
        uri: catalog.uri().map(str::to_string),
        upstream: catalog.upstream().map(|id| *id.as_bytes()),
        version,
        strict: catalog.is_strict(),
        catalog_def,
        created_at: now,
        updated_at: now,
    })
}

/// Entity row created now.
pub fn entity_row(entity: EntityId) -> EntityRow {
    EntityRow {
        id: *entity.as_bytes(),
        created_at: current_timestamp(),
    }
}

/// Write an aspect def with its property defs.
pub fn put_aspect_def(catalog_id: EntityId, def: &AspectDef) -> Result<RowOp, Error> {
    let flags = def.flags();
    let row = AspectDefRow {
        id: *def.id().as_bytes(),
        catalog_id: *catalog_id.as_bytes(),
        name: def.name().to_string(),
        readable: flags.readable,
        writable: flags.writable,
        can_add_properties: flags.can_add_properties,
        can_remove_properties: flags.can_remove_properties,
        created_at: current_timestamp(),
    };
    let properties = def
        .properties()
        .iter()
        .enumerate()
        .map(|(position, property)| property_def_row(def, position as u32, property))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RowOp::PutAspectDef {
        def: row,
        properties,
    })
}

fn property_def_row(
    def: &AspectDef,
    position: u32,
    property: &PropertyDef,
) -> Result<PropertyDefRow, Error> {
    let flags = property.flags();
    let default_value = property
        .default_value()
        .map(PropertyValue::to_value_json)
        .transpose()?;
    // Property defs have no identity of their own; derive a stable row id.
    let mut id = *def.id().as_bytes();
    id[12..].copy_from_slice(&position.to_be_bytes());
    Ok(PropertyDefRow {
        id,
        aspect_def_id: *def.id().as_bytes(),
        name: property.name().to_string(),
        position,
        type_code: property.property_type().code(),
        has_default_value: default_value.is_some(),
        default_value,
        readable: flags.readable,
        writable: flags.writable,
        nullable: flags.nullable,
        removable: flags.removable,
        multivalued: flags.multivalued,
    })
}

/// Hierarchy row for a hierarchy at `version`.
pub fn hierarchy_row(hierarchy: &Hierarchy, version: u64) -> HierarchyRow {
    HierarchyRow {
        id: *hierarchy.id().as_bytes(),
        catalog_id: *hierarchy.catalog_id().as_bytes(),
        name: hierarchy.name().to_string(),
        hierarchy_type: hierarchy.hierarchy_type().code(),
        version,
        aspect_def_id: hierarchy
            .as_aspect_map()
            .map(|map| *map.def().id().as_bytes()),
        created_at: current_timestamp(),
    }
}

/// Membership row of an entity in a set or aspect map, or at a list position.
pub fn member_row(
    hierarchy_id: EntityId,
    entity: EntityId,
    position: Option<u64>,
) -> HierarchyEntityRow {
    HierarchyEntityRow {
        id: *EntityId::new().as_bytes(),
        hierarchy_id: *hierarchy_id.as_bytes(),
        entity_id: *entity.as_bytes(),
        position,
    }
}

/// Rewrite a list from position `from` on with `entities`, the list's new
/// tail.
pub fn list_tail(
    list_id: EntityId,
    from: usize,
    entities: impl IntoIterator<Item = EntityId>,
) -> RowOp {
    let from = from as u64;
    RowOp::ReplaceMembers {
        hierarchy_id: *list_id.as_bytes(),
        from,
        rows: entities
            .into_iter()
            .enumerate()
            .map(|(offset, entity)| member_row(list_id, entity, Some(from + offset as u64)))
            .collect(),
    }
}

/// Directory entry row binding `key` to an entity.
pub fn entry_row(hierarchy_id: EntityId, key: &str, entity: EntityId) -> DirectoryEntryRow {
    DirectoryEntryRow {
        id: *EntityId::new().as_bytes(),
        hierarchy_id: *hierarchy_id.as_bytes(),
        entry_name: key.to_string(),
        entity_id: *entity.as_bytes(),
    }
}

/// Write an aspect with all of its property values, filed under the aspect
/// def it is stored for.
pub fn put_aspect(
    catalog_id: EntityId,
    aspect_def_id: EntityId,
    aspect: &Aspect,
) -> Result<RowOp, Error> {
    let now = current_timestamp();
    let row = AspectRow {
        id: *EntityId::new().as_bytes(),
        catalog_id: *catalog_id.as_bytes(),
        entity_id: *aspect.entity_id().as_bytes(),
        aspect_def_id: *aspect_def_id.as_bytes(),
        created_at: now,
        updated_at: now,
    };
    let values = aspect
        .values()
        .map(|(name, value)| {
            Ok(PropertyValueRow {
                id: *EntityId::new().as_bytes(),
                aspect_id: row.id,
                property_name: name.to_string(),
                value_json: value.to_value_json()?,
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;
    Ok(RowOp::PutAspect {
        aspect: row,
        values,
    })
}

/// Every write needed to store a catalog that is not stored yet, its own
/// entity included.
pub fn create_catalog_ops(catalog: &Catalog) -> Result<Vec<RowOp>, Error> {
    let mut ops = vec![
        RowOp::PutEntity(entity_row(catalog.id())),
        RowOp::PutCatalog(catalog_row(catalog, catalog.version())?),
    ];
    for def in catalog.aspect_defs() {
        ops.push(put_aspect_def(catalog.id(), def)?);
    }
    for hierarchy in catalog.hierarchies() {
        if !is_reserved(hierarchy.name()) {
            ops.push(RowOp::PutHierarchy(hierarchy_row(hierarchy, hierarchy.version())));
        }
    }
    Ok(ops)
}

/// Rebuild a catalog from its stored rows.
pub fn load_catalog(adapter: &dyn StorageAdapter, row: CatalogRow) -> Result<Catalog, Error> {
    let id = EntityId::from_bytes(row.id);
    let def: CatalogDef = serde_json::from_str(&row.catalog_def)
        .map_err(|e| Error::Deserialization(e.to_string()))?;
    let mut options = CatalogOptions::new()
        .species(row.species.parse::<Species>()?)
        .def(def)
        .strict(row.strict);
    if let Some(uri) = row.uri {
        options = options.uri(uri);
    }
    if let Some(upstream) = row.upstream {
        options = options.upstream(EntityId::from_bytes(upstream));
    }

    let mut defs = BTreeMap::new();
    for (def_row, property_rows) in adapter.fetch_aspect_defs(&row.id)? {
        let def = aspect_def_from_rows(def_row, property_rows)?;
        defs.insert(*def.id().as_bytes(), Arc::new(def));
    }

    let mut hierarchies = Vec::new();
    for hierarchy_row in adapter.fetch_hierarchies(&row.id)? {
        hierarchies.push(hierarchy_from_row(adapter, &defs, hierarchy_row)?);
    }

    debug!(
        catalog = %id,
        version = row.version,
        hierarchies = hierarchies.len(),
        "catalog loaded"
    );
    Ok(Catalog::restore(id, options, row.version, hierarchies))
}

fn aspect_def_from_rows(
    row: AspectDefRow,
    mut property_rows: Vec<PropertyDefRow>,
) -> Result<AspectDef, Error> {
    property_rows.sort_by_key(|p| p.position);
    let properties = property_rows
        .into_iter()
        .map(|p| {
            let property_type = PropertyType::from_code(p.type_code)?;
            let default_value = match (p.has_default_value, p.default_value) {
                (false, _) => None,
                (true, Some(text)) => Some(PropertyValue::from_value_json(
                    property_type,
                    p.multivalued,
                    &text,
                )?),
                (true, None) => Some(PropertyValue::Null),
            };
            let flags = PropertyFlags {
                readable: p.readable,
                writable: p.writable,
                nullable: p.nullable,
                removable: p.removable,
                multivalued: p.multivalued,
            };
            PropertyDef::build(p.name, property_type, flags, default_value)
        })
        .collect::<Result<Vec<_>, _>>()?;
    let flags = AspectFlags {
        readable: row.readable,
        writable: row.writable,
        can_add_properties: row.can_add_properties,
        can_remove_properties: row.can_remove_properties,
    };
    AspectDef::build(EntityId::from_bytes(row.id), row.name, properties, flags)
}

fn hierarchy_from_row(
    adapter: &dyn StorageAdapter,
    defs: &BTreeMap<[u8; 16], Arc<AspectDef>>,
    row: HierarchyRow,
) -> Result<Hierarchy, Error> {
    let id = EntityId::from_bytes(row.id);
    let catalog_id = EntityId::from_bytes(row.catalog_id);
    let hierarchy = match HierarchyType::from_code(row.hierarchy_type)? {
        HierarchyType::EntityList => {
            let mut members = adapter.fetch_members(&row.id)?;
            members.sort_by_key(|m| m.position);
            let entities = members
                .into_iter()
                .map(|m| EntityId::from_bytes(m.entity_id))
                .collect();
            Hierarchy::List(EntityList::restore(id, row.name, catalog_id, row.version, entities))
        }
        HierarchyType::EntitySet => {
            let members: BTreeSet<EntityId> = adapter
                .fetch_members(&row.id)?
                .into_iter()
                .map(|m| EntityId::from_bytes(m.entity_id))
                .collect();
            Hierarchy::Set(EntitySet::restore(id, row.name, catalog_id, row.version, members))
        }
        HierarchyType::EntityDirectory => {
            let entries = adapter
                .fetch_entries(&row.id)?
                .into_iter()
                .map(|e| (e.entry_name, EntityId::from_bytes(e.entity_id)))
                .collect();
            Hierarchy::Directory(EntityDirectory::restore(
                id,
                row.name,
                catalog_id,
                row.version,
                entries,
            ))
        }
        HierarchyType::AspectMap => {
            let def_id = row.aspect_def_id.ok_or_else(|| {
                Error::Deserialization(format!("aspect map {} has no aspect def", row.name))
            })?;
            let def = defs
                .get(&def_id)
                .cloned()
                .ok_or_else(|| Error::not_found("aspect def", EntityId::from_bytes(def_id)))?;
            let mut aspects = BTreeMap::new();
            for (aspect_row, value_rows) in adapter.fetch_aspects(&row.catalog_id, &def_id)? {
                let entity = EntityId::from_bytes(aspect_row.entity_id);
                aspects.insert(entity, aspect_from_rows(entity, &def, value_rows)?);
            }
            Hierarchy::AspectMap(AspectMapHierarchy::restore(
                id,
                catalog_id,
                row.version,
                def,
                aspects,
            ))
        }
    };
    Ok(hierarchy)
}

fn aspect_from_rows(
    entity: EntityId,
    def: &Arc<AspectDef>,
    value_rows: Vec<PropertyValueRow>,
) -> Result<Aspect, Error> {
    let mut values = BTreeMap::new();
    for v in value_rows {
        let property = def
            .property(&v.property_name)
            .ok_or_else(|| Error::not_found("property", &v.property_name))?;
        let value = PropertyValue::from_value_json(
            property.property_type(),
            property.is_multivalued(),
            &v.value_json,
        )?;
        values.insert(v.property_name, value);
    }
    Aspect::restore(entity, Arc::clone(def), values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AspectDef {
        AspectDef::new(
            "Sample",
            [
                PropertyDef::new("flag", PropertyType::Boolean)
                    .unwrap()
                    .with_default(true)
                    .unwrap(),
                PropertyDef::new("tags", PropertyType::String)
                    .unwrap()
                    .with_flags(PropertyFlags::default().multivalued())
                    .unwrap()
                    .with_default(PropertyValue::array(["x", "y"]))
                    .unwrap(),
                PropertyDef::new("note", PropertyType::Blob)
                    .unwrap()
                    .with_flags(PropertyFlags::default().nullable().removable())
                    .unwrap()
                    .with_default(PropertyValue::Null)
                    .unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_aspect_def_rows_restore_definition() {
        let def = sample();
        let catalog_id = EntityId::new();
        let RowOp::PutAspectDef { def: row, properties } = put_aspect_def(catalog_id, &def).unwrap()
        else {
            panic!("expected an aspect def write");
        };
        assert_eq!(row.catalog_id, *catalog_id.as_bytes());
        assert_eq!(properties.len(), 3);
        assert_eq!(properties[1].default_value.as_deref(), Some("[\"x\",\"y\"]"));
        assert_eq!(properties[2].default_value.as_deref(), Some("null"));

        // Stored order is irrelevant; positions restore declaration order.
        let mut shuffled = properties.clone();
        shuffled.reverse();
        let restored = aspect_def_from_rows(row, shuffled).unwrap();
        assert_eq!(restored.id(), def.id());
        assert_eq!(restored.hash(), def.hash());
        assert!(restored.same_definition(&def));
    }

    #[test]
    fn test_property_def_ids_are_distinct() {
        let def = sample();
        let RowOp::PutAspectDef { properties, .. } = put_aspect_def(EntityId::new(), &def).unwrap()
        else {
            panic!("expected an aspect def write");
        };
        let ids: BTreeSet<_> = properties.iter().map(|p| p.id).collect();
        assert_eq!(ids.len(), properties.len());
    }

    #[test]
    fn test_aspect_values_restore() {
        let def = Arc::new(sample());
        let entity = EntityId::new();
        let aspect =
            Aspect::new(entity, def.clone(), [("flag", PropertyValue::from(false))]).unwrap();
        let op = put_aspect(EntityId::new(), def.id(), &aspect).unwrap();
        let RowOp::PutAspect { aspect: row, values } = op else {
            panic!("expected an aspect write");
        };
        assert_eq!(row.entity_id, *entity.as_bytes());
        assert_eq!(values.len(), 3);

        let restored = aspect_from_rows(entity, &def, values).unwrap();
        assert_eq!(restored, aspect);
    }

    #[test]
    fn test_unknown_property_value_rejected() {
        let def = Arc::new(sample());
        let rows = vec![PropertyValueRow {
            id: [0; 16],
            aspect_id: [1; 16],
            property_name: "missing".to_string(),
            value_json: "1".to_string(),
        }];
        assert!(matches!(
            aspect_from_rows(EntityId::new(), &def, rows),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_list_tail_positions_start_at_from() {
        let list = EntityId::new();
        let (a, b) = (EntityId::new(), EntityId::new());
        let RowOp::ReplaceMembers {
            hierarchy_id,
            from,
            rows,
        } = list_tail(list, 3, [a, b])
        else {
            panic!("expected a tail rewrite");
        };
        assert_eq!(hierarchy_id, *list.as_bytes());
        assert_eq!(from, 3);
        let placed: Vec<_> = rows.iter().map(|r| (r.entity_id, r.position)).collect();
        assert_eq!(
            placed,
            vec![(*a.as_bytes(), Some(3)), (*b.as_bytes(), Some(4))]
        );
        assert!(rows.iter().all(|r| r.hierarchy_id == *list.as_bytes()));
    }
}
