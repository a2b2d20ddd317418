//! Persistent catalog store.
//!
//! Every mutation is validated against the in-memory catalog first, then
//! written through the storage adapter in one atomic batch, and only then
//! applied in memory. A failed write leaves the in-memory state untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, instrument};

use crate::catalog::{is_reserved, AddHierarchy, Catalog, CatalogOptions};
use crate::def::{AspectDef, HierarchyDef};
use crate::error::Error;
use crate::hierarchy::{
    check_key, AspectMapHierarchy, EntityDirectory, EntityList, EntitySet, Hierarchy,
};
use crate::mapping;
use crate::model::{Aspect, EntityId};
use crate::storage::{RowOp, SledAdapter, StorageAdapter, StorageConfig};

/// Store shared between threads.
pub type SharedStore = Arc<RwLock<Store>>;

/// Catalogs held in memory and persisted through a [`StorageAdapter`].
pub struct Store {
    adapter: Arc<dyn StorageAdapter>,
    catalogs: BTreeMap<EntityId, Catalog>,
}

impl Store {
    /// Open a sled-backed store and load every stored catalog.
    #[instrument(skip(config), fields(path = %config.path.display()))]
    pub fn open(config: &StorageConfig) -> Result<Self, Error> {
        let adapter = SledAdapter::open(config)?;
        Self::with_adapter(Arc::new(adapter))
    }

    /// Create a store over any adapter and load every stored catalog.
    pub fn with_adapter(adapter: Arc<dyn StorageAdapter>) -> Result<Self, Error> {
        let mut catalogs = BTreeMap::new();
        for row in adapter.list_catalogs()? {
            let catalog = mapping::load_catalog(adapter.as_ref(), row)?;
            catalogs.insert(catalog.id(), catalog);
        }
        info!(catalogs = catalogs.len(), "store opened");
        Ok(Self { adapter, catalogs })
    }

    /// Wrap the store for sharing between threads.
    pub fn into_shared(self) -> SharedStore {
        Arc::new(RwLock::new(self))
    }

    /// The storage adapter behind the store.
    pub fn adapter(&self) -> &Arc<dyn StorageAdapter> {
        &self.adapter
    }

    /// Make every applied write durable.
    pub fn flush(&self) -> Result<(), Error> {
        self.adapter.flush()
    }

    /// Flush and release the store.
    pub fn close(self) -> Result<(), Error> {
        self.adapter.flush()?;
        info!(catalogs = self.catalogs.len(), "store closed");
        Ok(())
    }

    // Entities

    /// Create and persist a new entity.
    pub fn create_entity(&self) -> Result<EntityId, Error> {
        let entity = EntityId::new();
        self.adapter
            .apply(&[RowOp::PutEntity(mapping::entity_row(entity))])?;
        Ok(entity)
    }

    /// Whether an entity is stored.
    pub fn entity_exists(&self, entity: EntityId) -> Result<bool, Error> {
        Ok(self.adapter.fetch_entity(entity.as_bytes())?.is_some())
    }

    /// Delete an entity with its aspects and every membership referencing
    /// it. Catalogs are deleted with [`Store::delete_catalog`].
    pub fn delete_entity(&mut self, entity: EntityId) -> Result<(), Error> {
        if self.catalogs.contains_key(&entity) {
            return Err(Error::ReferentialIntegrity(format!(
                "entity {} is a catalog",
                entity
            )));
        }
        if !self.entity_exists(entity)? {
            return Err(Error::not_found("entity", entity));
        }
        let mut ops = vec![RowOp::DeleteEntity {
            id: *entity.as_bytes(),
        }];
        let referencing = self.stage_purge(entity, &mut ops);
        self.adapter.apply(&ops)?;
        self.finish_purge(entity, &referencing);
        debug!(%entity, "entity deleted");
        Ok(())
    }

    /// Queue the writes that drop `entity` from every other loaded catalog:
    /// the shifted tail of each list holding it, and one version bump per
    /// hierarchy holding it. Returns the ids of those catalogs.
    fn stage_purge(&self, entity: EntityId, ops: &mut Vec<RowOp>) -> Vec<EntityId> {
        let mut referencing = Vec::new();
        for catalog in self.catalogs.values() {
            if catalog.id() == entity {
                continue;
            }
            let mut referenced = false;
            let holding = catalog
                .hierarchies()
                .filter(|h| !is_reserved(h.name()) && h.contains_entity(entity));
            for hierarchy in holding {
                referenced = true;
                if let Some(list) = hierarchy.as_list() {
                    if let Some(first) = list.position(entity) {
                        let tail = list.as_slice()[first..]
                            .iter()
                            .copied()
                            .filter(|e| *e != entity);
                        ops.push(mapping::list_tail(list.id(), first, tail));
                    }
                }
                ops.push(next_version_row(hierarchy));
            }
            if referenced {
                referencing.push(catalog.id());
            }
        }
        referencing
    }

    /// Apply a purge staged by [`Store::stage_purge`] in memory.
    fn finish_purge(&mut self, entity: EntityId, referencing: &[EntityId]) {
        for id in referencing {
            if let Some(catalog) = self.catalogs.get_mut(id) {
                catalog.purge_entity(entity);
            }
        }
    }

    fn require_entity(&self, entity: EntityId) -> Result<(), Error> {
        if self.entity_exists(entity)? {
            Ok(())
        } else {
            Err(Error::ReferentialIntegrity(format!(
                "entity {} does not exist",
                entity
            )))
        }
    }

    // Catalogs

    /// Create and persist a catalog pre-populated from `options.def`.
    #[instrument(skip(self, options), fields(species = %options.species, strict = options.strict))]
    pub fn create_catalog(&mut self, options: CatalogOptions) -> Result<EntityId, Error> {
        let catalog = Catalog::new(EntityId::new(), options)?;
        let id = catalog.id();
        self.adapter.apply(&mapping::create_catalog_ops(&catalog)?)?;
        let hash = format!("{:016x}", catalog.hash());
        info!(catalog = %id, %hash, "catalog created");
        self.catalogs.insert(id, catalog);
        Ok(id)
    }

    /// A loaded catalog.
    pub fn catalog(&self, id: EntityId) -> Option<&Catalog> {
        self.catalogs.get(&id)
    }

    /// All catalogs in id order.
    pub fn catalogs(&self) -> impl Iterator<Item = &Catalog> {
        self.catalogs.values()
    }

    /// Re-read a catalog from storage, replacing the in-memory copy.
    pub fn load_catalog(&mut self, id: EntityId) -> Result<&Catalog, Error> {
        let row = self
            .adapter
            .fetch_catalog(id.as_bytes())?
            .ok_or_else(|| Error::not_found("catalog", id))?;
        let catalog = mapping::load_catalog(self.adapter.as_ref(), row)?;
        self.catalogs.insert(id, catalog);
        self.get(id)
    }

    /// Delete a catalog with everything it holds, and drop its entity from
    /// other catalogs.
    pub fn delete_catalog(&mut self, id: EntityId) -> Result<Catalog, Error> {
        self.get(id)?;
        let mut ops = vec![RowOp::DeleteCatalog { id: *id.as_bytes() }];
        let referencing = self.stage_purge(id, &mut ops);
        self.adapter.apply(&ops)?;
        self.finish_purge(id, &referencing);
        let removed = self
            .catalogs
            .remove(&id)
            .ok_or_else(|| Error::not_found("catalog", id))?;
        info!(catalog = %id, "catalog deleted");
        Ok(removed)
    }

    /// Fail unless the catalog is still at `expected`.
    pub fn check_version(&self, id: EntityId, expected: u64) -> Result<(), Error> {
        let actual = self.get(id)?.version();
        if actual != expected {
            return Err(Error::VersionConflict { expected, actual });
        }
        Ok(())
    }

    fn get(&self, id: EntityId) -> Result<&Catalog, Error> {
        self.catalogs
            .get(&id)
            .ok_or_else(|| Error::not_found("catalog", id))
    }

    fn get_mut(&mut self, id: EntityId) -> Result<&mut Catalog, Error> {
        self.catalogs
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("catalog", id))
    }

    // Structure

    /// Register an aspect def in a catalog. Idempotent for an identical,
    /// already registered def.
    pub fn extend(
        &mut self,
        catalog_id: EntityId,
        def: AspectDef,
    ) -> Result<&AspectMapHierarchy, Error> {
        let name = def.name().to_string();
        let catalog = self.get(catalog_id)?;
        if catalog.needs_extension(&def)? {
            let map = catalog.owned_aspect_map(def);
            let ops = [
                mapping::put_aspect_def(catalog_id, aspect_map(&map)?.def())?,
                RowOp::PutHierarchy(mapping::hierarchy_row(&map, map.version())),
                RowOp::PutCatalog(mapping::catalog_row(catalog, catalog.version() + 2)?),
            ];
            self.adapter.apply(&ops)?;
            self.get_mut(catalog_id)?.install_extension(map);
        }
        self.get(catalog_id)?
            .aspects(&name)
            .ok_or_else(|| Error::not_found("aspect map", &name))
    }

    /// Add or replace a List, Set or Directory. A name held by an aspect map
    /// is left alone and reported as [`AddHierarchy::Preserved`].
    pub fn add_hierarchy(
        &mut self,
        catalog_id: EntityId,
        def: &HierarchyDef,
    ) -> Result<AddHierarchy, Error> {
        let hierarchy = Hierarchy::from_def(def, catalog_id)?;
        let catalog = self.get(catalog_id)?;
        if !catalog.contains_aspects(def.name()) {
            catalog.validate_hierarchy(&hierarchy)?;
            let ops = [
                RowOp::PutHierarchy(mapping::hierarchy_row(&hierarchy, hierarchy.version())),
                RowOp::PutCatalog(mapping::catalog_row(catalog, catalog.version() + 1)?),
            ];
            self.adapter.apply(&ops)?;
        }
        self.get_mut(catalog_id)?.add_hierarchy(hierarchy)
    }

    /// Remove a List, Set or Directory with its memberships.
    pub fn remove_hierarchy(
        &mut self,
        catalog_id: EntityId,
        name: &str,
    ) -> Result<Hierarchy, Error> {
        let catalog = self.get(catalog_id)?;
        catalog.validate_removal(name)?;
        let ops = [
            RowOp::DeleteHierarchy {
                catalog_id: *catalog_id.as_bytes(),
                name: name.to_string(),
            },
            RowOp::PutCatalog(mapping::catalog_row(catalog, catalog.version() + 1)?),
        ];
        self.adapter.apply(&ops)?;
        self.get_mut(catalog_id)?.remove_hierarchy(name)
    }

    // Aspects

    /// Store an aspect in the aspect map of its def, replacing any aspect the
    /// entity already had there.
    pub fn attach_aspect(
        &mut self,
        catalog_id: EntityId,
        aspect: Aspect,
    ) -> Result<Option<Aspect>, Error> {
        let entity = aspect.entity_id();
        let name = aspect.def().name().to_string();
        let hierarchy = self.aspect_hierarchy(catalog_id, &name)?;
        let map = aspect_map(hierarchy)?;
        map.check(entity, &aspect)?;
        self.require_entity(entity)?;
        let ops = [
            mapping::put_aspect(catalog_id, map.def().id(), &aspect)?,
            RowOp::PutMember(mapping::member_row(map.id(), entity, None)),
            RowOp::PutHierarchy(mapping::hierarchy_row(hierarchy, map.version() + 1)),
        ];
        self.adapter.apply(&ops)?;
        self.get_mut(catalog_id)?
            .aspects_mut(&name)
            .ok_or_else(|| Error::not_found("aspect map", &name))?
            .put(entity, aspect)
    }

    /// Remove an entity's aspect from an aspect map.
    pub fn detach_aspect(
        &mut self,
        catalog_id: EntityId,
        aspect_def: &str,
        entity: EntityId,
    ) -> Result<Aspect, Error> {
        let hierarchy = self.aspect_hierarchy(catalog_id, aspect_def)?;
        let map = aspect_map(hierarchy)?;
        if !map.contains(entity) {
            return Err(Error::not_found("aspect", entity));
        }
        let ops = [
            RowOp::DeleteAspect {
                catalog_id: *catalog_id.as_bytes(),
                aspect_def_id: *map.def().id().as_bytes(),
                entity_id: *entity.as_bytes(),
            },
            RowOp::DeleteMember {
                hierarchy_id: *map.id().as_bytes(),
                entity_id: *entity.as_bytes(),
            },
            RowOp::PutHierarchy(mapping::hierarchy_row(hierarchy, map.version() + 1)),
        ];
        self.adapter.apply(&ops)?;
        self.get_mut(catalog_id)?
            .aspects_mut(aspect_def)
            .and_then(|map| map.remove(entity))
            .ok_or_else(|| Error::not_found("aspect", entity))
    }

    /// An entity's aspect of the named def.
    pub fn aspect(
        &self,
        catalog_id: EntityId,
        aspect_def: &str,
        entity: EntityId,
    ) -> Result<&Aspect, Error> {
        aspect_map(self.aspect_hierarchy(catalog_id, aspect_def)?)?
            .get(entity)
            .ok_or_else(|| Error::not_found("aspect", entity))
    }

    fn aspect_hierarchy(&self, catalog_id: EntityId, name: &str) -> Result<&Hierarchy, Error> {
        self.get(catalog_id)?
            .hierarchy(name)
            .filter(|h| h.as_aspect_map().is_some())
            .ok_or_else(|| Error::not_found("aspect map", name))
    }

    // Membership

    /// Add an entity at the end of a list.
    pub fn list_append(
        &mut self,
        catalog_id: EntityId,
        name: &str,
        entity: EntityId,
    ) -> Result<(), Error> {
        self.require_entity(entity)?;
        let hierarchy = self.member_hierarchy(catalog_id, name)?;
        let list = list_ref(hierarchy)?;
        let position = list.len() as u64;
        let ops = [
            RowOp::PutMember(mapping::member_row(list.id(), entity, Some(position))),
            next_version_row(hierarchy),
        ];
        self.commit(catalog_id, name, &ops, |h| {
            list_mut(h)?.append(entity);
            Ok(())
        })
    }

    /// Insert an entity at `pos`, shifting later entries.
    pub fn list_insert(
        &mut self,
        catalog_id: EntityId,
        name: &str,
        pos: usize,
        entity: EntityId,
    ) -> Result<(), Error> {
        self.require_entity(entity)?;
        let hierarchy = self.member_hierarchy(catalog_id, name)?;
        let list = list_ref(hierarchy)?;
        list.check_insert(pos)?;
        let tail = std::iter::once(entity).chain(list.as_slice()[pos..].iter().copied());
        let ops = [
            mapping::list_tail(list.id(), pos, tail),
            next_version_row(hierarchy),
        ];
        self.commit(catalog_id, name, &ops, |h| list_mut(h)?.insert(pos, entity))
    }

    /// Remove the entity at `pos`, shifting later entries down.
    pub fn list_remove_at(
        &mut self,
        catalog_id: EntityId,
        name: &str,
        pos: usize,
    ) -> Result<EntityId, Error> {
        let hierarchy = self.member_hierarchy(catalog_id, name)?;
        let list = list_ref(hierarchy)?;
        list.check_index(pos)?;
        let tail = list.as_slice()[pos + 1..].iter().copied();
        let ops = [
            mapping::list_tail(list.id(), pos, tail),
            next_version_row(hierarchy),
        ];
        self.commit(catalog_id, name, &ops, |h| list_mut(h)?.remove_at(pos))
    }

    /// Remove every occurrence of an entity from a list.
    pub fn list_remove(
        &mut self,
        catalog_id: EntityId,
        name: &str,
        entity: EntityId,
    ) -> Result<usize, Error> {
        let hierarchy = self.member_hierarchy(catalog_id, name)?;
        let list = list_ref(hierarchy)?;
        let first = match list.position(entity) {
            Some(first) => first,
            None => return Ok(0),
        };
        let tail = list.as_slice()[first..]
            .iter()
            .copied()
            .filter(|e| *e != entity);
        let ops = [
            mapping::list_tail(list.id(), first, tail),
            next_version_row(hierarchy),
        ];
        self.commit(catalog_id, name, &ops, |h| Ok(list_mut(h)?.remove_all(entity)))
    }

    /// Returns false if the entity was already a member.
    pub fn set_add(
        &mut self,
        catalog_id: EntityId,
        name: &str,
        entity: EntityId,
    ) -> Result<bool, Error> {
        self.require_entity(entity)?;
        let hierarchy = self.member_hierarchy(catalog_id, name)?;
        let set = set_ref(hierarchy)?;
        if set.contains(entity) {
            return Ok(false);
        }
        let ops = [
            RowOp::PutMember(mapping::member_row(set.id(), entity, None)),
            next_version_row(hierarchy),
        ];
        self.commit(catalog_id, name, &ops, |h| Ok(set_mut(h)?.add(entity)))
    }

    /// Returns false if the entity was not a member.
    pub fn set_remove(
        &mut self,
        catalog_id: EntityId,
        name: &str,
        entity: EntityId,
    ) -> Result<bool, Error> {
        let hierarchy = self.member_hierarchy(catalog_id, name)?;
        let set = set_ref(hierarchy)?;
        if !set.contains(entity) {
            return Ok(false);
        }
        let ops = [
            RowOp::DeleteMember {
                hierarchy_id: *set.id().as_bytes(),
                entity_id: *entity.as_bytes(),
            },
            next_version_row(hierarchy),
        ];
        self.commit(catalog_id, name, &ops, |h| Ok(set_mut(h)?.remove(entity)))
    }

    /// Bind a key to an entity, returning the entity it was bound to.
    pub fn directory_put(
        &mut self,
        catalog_id: EntityId,
        name: &str,
        key: &str,
        entity: EntityId,
    ) -> Result<Option<EntityId>, Error> {
        check_key(key)?;
        self.require_entity(entity)?;
        let hierarchy = self.member_hierarchy(catalog_id, name)?;
        let directory = directory_ref(hierarchy)?;
        let ops = [
            RowOp::PutEntry(mapping::entry_row(directory.id(), key, entity)),
            next_version_row(hierarchy),
        ];
        self.commit(catalog_id, name, &ops, |h| directory_mut(h)?.put(key, entity))
    }

    /// Unbind a key, returning the entity it was bound to.
    pub fn directory_remove(
        &mut self,
        catalog_id: EntityId,
        name: &str,
        key: &str,
    ) -> Result<Option<EntityId>, Error> {
        let hierarchy = self.member_hierarchy(catalog_id, name)?;
        let directory = directory_ref(hierarchy)?;
        if !directory.contains_key(key) {
            return Ok(None);
        }
        let ops = [
            RowOp::DeleteEntry {
                hierarchy_id: *directory.id().as_bytes(),
                entry_name: key.to_string(),
            },
            next_version_row(hierarchy),
        ];
        self.commit(catalog_id, name, &ops, |h| Ok(directory_mut(h)?.remove(key)))
    }

    /// A user hierarchy open to membership edits.
    fn member_hierarchy(&self, catalog_id: EntityId, name: &str) -> Result<&Hierarchy, Error> {
        if is_reserved(name) {
            return Err(Error::AccessDenied(format!("hierarchy {} is reserved", name)));
        }
        self.get(catalog_id)?
            .hierarchy(name)
            .ok_or_else(|| Error::not_found("hierarchy", name))
    }

    /// Persist `ops`, then apply the matching change to the in-memory
    /// hierarchy.
    fn commit<T>(
        &mut self,
        catalog_id: EntityId,
        name: &str,
        ops: &[RowOp],
        change: impl FnOnce(&mut Hierarchy) -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.adapter.apply(ops)?;
        let hierarchy = self
            .get_mut(catalog_id)?
            .hierarchy_mut(name)
            .ok_or_else(|| Error::not_found("hierarchy", name))?;
        change(hierarchy)
    }
}

/// Hierarchy row carrying the version a single edit moves it to.
fn next_version_row(hierarchy: &Hierarchy) -> RowOp {
    RowOp::PutHierarchy(mapping::hierarchy_row(hierarchy, hierarchy.version() + 1))
}

fn aspect_map(hierarchy: &Hierarchy) -> Result<&AspectMapHierarchy, Error> {
    hierarchy.as_aspect_map().ok_or_else(|| mismatch(hierarchy, "an aspect map"))
}

fn list_ref(hierarchy: &Hierarchy) -> Result<&EntityList, Error> {
    hierarchy.as_list().ok_or_else(|| mismatch(hierarchy, "an entity list"))
}

fn set_ref(hierarchy: &Hierarchy) -> Result<&EntitySet, Error> {
    hierarchy.as_set().ok_or_else(|| mismatch(hierarchy, "an entity set"))
}

fn directory_ref(hierarchy: &Hierarchy) -> Result<&EntityDirectory, Error> {
    hierarchy
        .as_directory()
        .ok_or_else(|| mismatch(hierarchy, "an entity directory"))
}

fn list_mut(hierarchy: &mut Hierarchy) -> Result<&mut EntityList, Error> {
    match hierarchy {
        Hierarchy::List(list) => Ok(list),
        other => Err(mismatch(other, "an entity list")),
    }
}

fn set_mut(hierarchy: &mut Hierarchy) -> Result<&mut EntitySet, Error> {
    match hierarchy {
        Hierarchy::Set(set) => Ok(set),
        other => Err(mismatch(other, "an entity set")),
    }
}

fn directory_mut(hierarchy: &mut Hierarchy) -> Result<&mut EntityDirectory, Error> {
    match hierarchy {
        Hierarchy::Directory(directory) => Ok(directory),
        other => Err(mismatch(other, "an entity directory")),
    }
}

fn mismatch(hierarchy: &Hierarchy, expected: &str) -> Error {
    Error::TypeMismatch(format!(
        "hierarchy {} is a {}, not {}",
        hierarchy.name(),
        hierarchy.hierarchy_type(),
        expected
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::def::{HierarchyType, PropertyDef, PropertyType};
    use crate::storage::{
        AspectDefRow, AspectRow, CatalogRow, DirectoryEntryRow, EntityRow, HierarchyEntityRow,
        HierarchyRow, PropertyDefRow, PropertyValueRow, RowId,
    };

    fn memory_store() -> Store {
        Store::open(&StorageConfig::temporary()).unwrap()
    }

    fn person() -> AspectDef {
        AspectDef::new(
            "Person",
            [
                PropertyDef::new("firstName", PropertyType::String).unwrap(),
                PropertyDef::new("age", PropertyType::Int).unwrap(),
            ],
        )
        .unwrap()
    }

    /// Adapter keeping the last batch it applied.
    struct RecordingAdapter {
        inner: SledAdapter,
        last: parking_lot::Mutex<Vec<RowOp>>,
    }

    impl StorageAdapter for RecordingAdapter {
        fn apply(&self, ops: &[RowOp]) -> Result<(), Error> {
            *self.last.lock() = ops.to_vec();
            self.inner.apply(ops)
        }

        fn fetch_catalog(&self, id: &RowId) -> Result<Option<CatalogRow>, Error> {
            self.inner.fetch_catalog(id)
        }

        fn list_catalogs(&self) -> Result<Vec<CatalogRow>, Error> {
            self.inner.list_catalogs()
        }

        fn fetch_entity(&self, id: &RowId) -> Result<Option<EntityRow>, Error> {
            self.inner.fetch_entity(id)
        }

        fn fetch_aspect_defs(
            &self,
            catalog_id: &RowId,
        ) -> Result<Vec<(AspectDefRow, Vec<PropertyDefRow>)>, Error> {
            self.inner.fetch_aspect_defs(catalog_id)
        }

        fn fetch_hierarchies(&self, catalog_id: &RowId) -> Result<Vec<HierarchyRow>, Error> {
            self.inner.fetch_hierarchies(catalog_id)
        }

        fn fetch_aspects(
            &self,
            catalog_id: &RowId,
            aspect_def_id: &RowId,
        ) -> Result<Vec<(AspectRow, Vec<PropertyValueRow>)>, Error> {
            self.inner.fetch_aspects(catalog_id, aspect_def_id)
        }

        fn fetch_members(&self, hierarchy_id: &RowId) -> Result<Vec<HierarchyEntityRow>, Error> {
            self.inner.fetch_members(hierarchy_id)
        }

        fn fetch_entries(&self, hierarchy_id: &RowId) -> Result<Vec<DirectoryEntryRow>, Error> {
            self.inner.fetch_entries(hierarchy_id)
        }

        fn flush(&self) -> Result<(), Error> {
            self.inner.flush()
        }
    }

    fn recording_store() -> (Store, Arc<RecordingAdapter>) {
        let adapter = Arc::new(RecordingAdapter {
            inner: SledAdapter::open(&StorageConfig::temporary()).unwrap(),
            last: parking_lot::Mutex::new(Vec::new()),
        });
        let store = Store::with_adapter(adapter.clone()).unwrap();
        (store, adapter)
    }

    fn member_writes(ops: &[RowOp]) -> usize {
        ops.iter()
            .map(|op| match op {
                RowOp::PutMember(_) => 1,
                RowOp::ReplaceMembers { rows, .. } => rows.len(),
                _ => 0,
            })
            .sum()
    }

    #[test]
    fn test_list_edits_write_only_the_changed_tail() {
        let (mut store, adapter) = recording_store();
        let catalog = store.create_catalog(CatalogOptions::new()).unwrap();
        let queue = HierarchyDef::new("queue", HierarchyType::EntityList).unwrap();
        store.add_hierarchy(catalog, &queue).unwrap();
        let entities: Vec<_> = (0..5).map(|_| store.create_entity().unwrap()).collect();

        for e in &entities {
            store.list_append(catalog, "queue", *e).unwrap();
            assert_eq!(member_writes(&adapter.last.lock()), 1);
        }
        assert!(matches!(
            adapter.last.lock()[0],
            RowOp::PutMember(HierarchyEntityRow {
                position: Some(4),
                ..
            })
        ));

        // Positions 3 and 4 shift down; earlier ones are untouched.
        store.list_remove_at(catalog, "queue", 3).unwrap();
        match &adapter.last.lock()[0] {
            RowOp::ReplaceMembers { from, rows, .. } => {
                assert_eq!(*from, 3);
                assert_eq!(rows.len(), 1);
            }
            other => panic!("expected a tail rewrite, got {:?}", other),
        }

        store.delete_entity(entities[1]).unwrap();
        let expected = vec![entities[0], entities[2], entities[4]];
        let list = store.catalog(catalog).unwrap().hierarchy("queue").unwrap();
        assert_eq!(list.as_list().unwrap().as_slice(), expected.as_slice());
        assert_eq!(list.version(), 7);
        assert_eq!(member_writes(&adapter.last.lock()), 2);

        let reloaded = store.load_catalog(catalog).unwrap();
        let list = reloaded.hierarchy("queue").unwrap();
        assert_eq!(list.as_list().unwrap().as_slice(), expected.as_slice());
        assert_eq!(list.version(), 7);
    }

    #[test]
    fn test_noop_edits_write_nothing() {
        let (mut store, adapter) = recording_store();
        let catalog = store.create_catalog(CatalogOptions::new()).unwrap();
        let byname = HierarchyDef::new("byName", HierarchyType::EntityDirectory).unwrap();
        store.add_hierarchy(catalog, &byname).unwrap();
        let queue = HierarchyDef::new("queue", HierarchyType::EntityList).unwrap();
        store.add_hierarchy(catalog, &queue).unwrap();
        let e = store.create_entity().unwrap();
        adapter.last.lock().clear();

        assert_eq!(store.directory_remove(catalog, "byName", "ann").unwrap(), None);
        assert_eq!(store.list_remove(catalog, "queue", e).unwrap(), 0);
        assert!(adapter.last.lock().is_empty());
        assert!(matches!(
            store.list_insert(catalog, "queue", 1, e),
            Err(Error::NotFound { .. })
        ));
        assert!(adapter.last.lock().is_empty());
    }

    #[test]
    fn test_membership_ops_check_hierarchy_type() {
        let mut store = memory_store();
        let catalog = store.create_catalog(CatalogOptions::new()).unwrap();
        let tags = HierarchyDef::new("tags", HierarchyType::EntitySet).unwrap();
        store.add_hierarchy(catalog, &tags).unwrap();
        let e = store.create_entity().unwrap();

        assert!(matches!(
            store.list_append(catalog, "tags", e),
            Err(Error::TypeMismatch(_))
        ));
        assert!(matches!(
            store.set_add(catalog, "missing", e),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            store.directory_put(catalog, crate::catalog::HIERARCHIES_DIRECTORY, "x", e),
            Err(Error::AccessDenied(_))
        ));
    }

    #[test]
    fn test_unchanged_set_skips_version_bump() {
        let mut store = memory_store();
        let catalog = store.create_catalog(CatalogOptions::new()).unwrap();
        let tags = HierarchyDef::new("tags", HierarchyType::EntitySet).unwrap();
        store.add_hierarchy(catalog, &tags).unwrap();
        let e = store.create_entity().unwrap();

        assert!(store.set_add(catalog, "tags", e).unwrap());
        assert!(!store.set_add(catalog, "tags", e).unwrap());
        let set = store.catalog(catalog).unwrap().hierarchy("tags").unwrap();
        assert_eq!(set.version(), 1);
        assert_eq!(store.catalog(catalog).unwrap().version(), 1);
    }

    #[test]
    fn test_missing_entity_rejected() {
        let mut store = memory_store();
        let catalog = store.create_catalog(CatalogOptions::new()).unwrap();
        store.extend(catalog, person()).unwrap();
        let def = store.catalog(catalog).unwrap().aspect_def("Person").unwrap().clone();
        let ghost = EntityId::new();
        let aspect = Aspect::new(
            ghost,
            def,
            [("firstName", crate::model::PropertyValue::from("Ann")), ("age", 3i64.into())],
        )
        .unwrap();
        assert!(matches!(
            store.attach_aspect(catalog, aspect),
            Err(Error::ReferentialIntegrity(_))
        ));
        assert!(store.catalog(catalog).unwrap().aspects("Person").unwrap().is_empty());
    }

    #[test]
    fn test_catalog_entity_cannot_be_deleted_directly() {
        let mut store = memory_store();
        let catalog = store.create_catalog(CatalogOptions::new()).unwrap();
        assert!(store.entity_exists(catalog).unwrap());
        assert!(matches!(
            store.delete_entity(catalog),
            Err(Error::ReferentialIntegrity(_))
        ));
        store.delete_catalog(catalog).unwrap();
        assert!(!store.entity_exists(catalog).unwrap());
        assert!(matches!(
            store.check_version(catalog, 0),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_check_version() {
        let mut store = memory_store();
        let catalog = store.create_catalog(CatalogOptions::new()).unwrap();
        store.check_version(catalog, 0).unwrap();
        store.extend(catalog, person()).unwrap();
        assert!(matches!(
            store.check_version(catalog, 0),
            Err(Error::VersionConflict { expected: 0, actual: 2 })
        ));
    }
}
