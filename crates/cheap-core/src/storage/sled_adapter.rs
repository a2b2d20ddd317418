//! sled implementation of the storage adapter.

use std::collections::BTreeMap;

use sled::transaction::TransactionError;
use sled::{Db, Tree};
use tracing::{debug, info};

use super::adapter::StorageAdapter;
use super::key::{
    position_key, reference_key, row_key, ASPECT, ASPECT_DEF, ASPECT_DEF_OWNER, CATALOG, ENTITY,
    ENTRY, HIERARCHY, ID_PREFIX_LEN, MEMBER, PROPERTY_DEF, PROPERTY_VALUE, REFERENCE,
};
use super::rows::{
    AspectDefRow, AspectRow, CatalogRow, DirectoryEntryRow, EntityRow, HierarchyEntityRow,
    HierarchyRow, PropertyDefRow, PropertyValueRow, RowId, RowOp,
};
use super::StorageConfig;
use crate::error::Error;

/// Tree holding every table.
const ROWS_TREE: &str = "cheap:rows";

/// Storage adapter over a sled database.
pub struct SledAdapter {
    /// The underlying sled database.
    db: Db,

    /// Tree for all rows, keyed as described in [`super::key`].
    rows: Tree,
}

impl SledAdapter {
    /// Open or create the database described by `config`.
    pub fn open(config: &StorageConfig) -> Result<Self, Error> {
        let db = config.to_sled_config().open()?;
        let rows = db.open_tree(ROWS_TREE)?;
        info!(
            path = %config.path.display(),
            temporary = config.temporary,
            recovered = db.was_recovered(),
            "storage opened"
        );
        Ok(Self { db, rows })
    }

    /// Check if the database was recovered from a previous crash.
    pub fn was_recovered(&self) -> bool {
        self.db.was_recovered()
    }

    /// Get database size in bytes.
    pub fn size_on_disk(&self) -> Result<u64, Error> {
        Ok(self.db.size_on_disk()?)
    }

    fn get_row<T>(
        &self,
        key: &[u8],
        decode: fn(&[u8]) -> Result<T, Error>,
    ) -> Result<Option<T>, Error> {
        match self.rows.get(key)? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn scan_rows<T>(
        &self,
        prefix: &[u8],
        decode: fn(&[u8]) -> Result<T, Error>,
    ) -> Result<Vec<T>, Error> {
        self.rows
            .scan_prefix(prefix)
            .map(|item| {
                let (_, bytes) = item?;
                decode(&bytes)
            })
            .collect()
    }
}

impl StorageAdapter for SledAdapter {
    fn apply(&self, ops: &[RowOp]) -> Result<(), Error> {
        let mut staging = Staging::new(&self.rows);
        for op in ops {
            staging.stage(op)?;
        }
        let writes = staging.commit()?;
        debug!(ops = ops.len(), writes, "rows applied");
        Ok(())
    }

    fn fetch_catalog(&self, id: &RowId) -> Result<Option<CatalogRow>, Error> {
        self.get_row(&row_key(CATALOG, &[id]), CatalogRow::from_bytes)
    }

    fn list_catalogs(&self) -> Result<Vec<CatalogRow>, Error> {
        self.scan_rows(&[CATALOG], CatalogRow::from_bytes)
    }

    fn fetch_entity(&self, id: &RowId) -> Result<Option<EntityRow>, Error> {
        self.get_row(&row_key(ENTITY, &[id]), EntityRow::from_bytes)
    }

    fn fetch_aspect_defs(
        &self,
        catalog_id: &RowId,
    ) -> Result<Vec<(AspectDefRow, Vec<PropertyDefRow>)>, Error> {
        let defs = self.scan_rows(&row_key(ASPECT_DEF, &[catalog_id]), AspectDefRow::from_bytes)?;
        defs.into_iter()
            .map(|def| {
                let mut properties = self
                    .scan_rows(&row_key(PROPERTY_DEF, &[&def.id]), PropertyDefRow::from_bytes)?;
                properties.sort_by_key(|p| p.position);
                Ok((def, properties))
            })
            .collect()
    }

    fn fetch_hierarchies(&self, catalog_id: &RowId) -> Result<Vec<HierarchyRow>, Error> {
        self.scan_rows(&row_key(HIERARCHY, &[catalog_id]), HierarchyRow::from_bytes)
    }

    fn fetch_aspects(
        &self,
        catalog_id: &RowId,
        aspect_def_id: &RowId,
    ) -> Result<Vec<(AspectRow, Vec<PropertyValueRow>)>, Error> {
        let aspects = self.scan_rows(
            &row_key(ASPECT, &[catalog_id, aspect_def_id]),
            AspectRow::from_bytes,
        )?;
        aspects
            .into_iter()
            .map(|aspect| {
                let values = self.scan_rows(
                    &row_key(PROPERTY_VALUE, &[&aspect.id]),
                    PropertyValueRow::from_bytes,
                )?;
                Ok((aspect, values))
            })
            .collect()
    }

    fn fetch_members(&self, hierarchy_id: &RowId) -> Result<Vec<HierarchyEntityRow>, Error> {
        self.scan_rows(&row_key(MEMBER, &[hierarchy_id]), HierarchyEntityRow::from_bytes)
    }

    fn fetch_entries(&self, hierarchy_id: &RowId) -> Result<Vec<DirectoryEntryRow>, Error> {
        self.scan_rows(&row_key(ENTRY, &[hierarchy_id]), DirectoryEntryRow::from_bytes)
    }

    fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }
}

/// Pending writes layered over the tree. Reads see staged writes, so later
/// operations of a batch observe earlier ones.
struct Staging<'a> {
    tree: &'a Tree,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a> Staging<'a> {
    fn new(tree: &'a Tree) -> Self {
        Self {
            tree,
            writes: BTreeMap::new(),
        }
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        if let Some(staged) = self.writes.get(key) {
            return Ok(staged.clone());
        }
        Ok(self.tree.get(key)?.map(|v| v.to_vec()))
    }

    fn scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        self.scan_from(prefix, prefix)
    }

    /// Rows under `prefix` whose keys sort at or after `start`.
    fn scan_from(&self, prefix: &[u8], start: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        let mut merged = BTreeMap::new();
        for item in self.tree.range(start.to_vec()..) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            merged.insert(key.to_vec(), value.to_vec());
        }
        for (key, staged) in self.writes.range(start.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match staged {
                Some(value) => merged.insert(key.clone(), value.clone()),
                None => merged.remove(key),
            };
        }
        Ok(merged.into_iter().collect())
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.writes.insert(key, Some(value));
    }

    fn delete(&mut self, key: Vec<u8>) {
        self.writes.insert(key, None);
    }

    /// Delete every row under a prefix, returning the deleted rows.
    fn delete_prefix(&mut self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
        let rows = self.scan(prefix)?;
        let mut values = Vec::with_capacity(rows.len());
        for (key, value) in rows {
            self.delete(key);
            values.push(value);
        }
        Ok(values)
    }

    /// Write an aspect, membership or directory entry row and index the
    /// entity it references.
    fn put_linked(&mut self, key: Vec<u8>, entity: &RowId, value: Vec<u8>) -> Result<(), Error> {
        self.unlink(&key)?;
        self.put(reference_key(entity, &key), Vec::new());
        self.put(key, value);
        Ok(())
    }

    /// Drop the reference index entry of the row at `key`. Returns the row.
    fn unlink(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let old = self.get(key)?;
        if let Some(bytes) = &old {
            let entity = referenced_entity(key, bytes)?;
            self.delete(reference_key(&entity, key));
        }
        Ok(old)
    }

    /// Delete a row written with [`Staging::put_linked`]. Returns the row.
    fn delete_linked(&mut self, key: Vec<u8>) -> Result<Option<Vec<u8>>, Error> {
        let old = self.unlink(&key)?;
        if old.is_some() {
            self.delete(key);
        }
        Ok(old)
    }

    /// [`Staging::delete_linked`] for every row under `prefix` from `start`.
    fn delete_linked_from(&mut self, prefix: &[u8], start: &[u8]) -> Result<(), Error> {
        for (key, value) in self.scan_from(prefix, start)? {
            let entity = referenced_entity(&key, &value)?;
            self.delete(reference_key(&entity, &key));
            self.delete(key);
        }
        Ok(())
    }

    /// Delete an aspect row with its property values.
    fn delete_aspect(&mut self, key: Vec<u8>) -> Result<(), Error> {
        if let Some(bytes) = self.delete_linked(key)? {
            let aspect = AspectRow::from_bytes(&bytes)?;
            self.delete_prefix(&row_key(PROPERTY_VALUE, &[&aspect.id]))?;
        }
        Ok(())
    }

    fn stage(&mut self, op: &RowOp) -> Result<(), Error> {
        match op {
            RowOp::PutCatalog(row) => {
                let key = row_key(CATALOG, &[&row.id]);
                let mut row = row.clone();
                if let Some(old) = self.get(&key)? {
                    row.created_at = CatalogRow::from_bytes(&old)?.created_at;
                }
                self.put(key, row.to_bytes()?);
            }
            RowOp::DeleteCatalog { id } => {
                self.delete(row_key(CATALOG, &[id]));
                for bytes in self.delete_prefix(&row_key(ASPECT_DEF, &[id]))? {
                    let def = AspectDefRow::from_bytes(&bytes)?;
                    self.delete_prefix(&row_key(PROPERTY_DEF, &[&def.id]))?;
                    self.delete(row_key(ASPECT_DEF_OWNER, &[&def.id]));
                }
                for (key, _) in self.scan(&row_key(ASPECT, &[id]))? {
                    self.delete_aspect(key)?;
                }
                for bytes in self.delete_prefix(&row_key(HIERARCHY, &[id]))? {
                    let hierarchy = HierarchyRow::from_bytes(&bytes)?;
                    self.delete_memberships(&hierarchy.id)?;
                }
                self.delete_entity(id)?;
            }
            RowOp::PutEntity(row) => {
                let key = row_key(ENTITY, &[&row.id]);
                if self.get(&key)?.is_none() {
                    self.put(key, row.to_bytes()?);
                }
            }
            RowOp::DeleteEntity { id } => self.delete_entity(id)?,
            RowOp::PutAspectDef { def, properties } => {
                let owner_key = row_key(ASPECT_DEF_OWNER, &[&def.id]);
                if let Some(owner) = self.get(&owner_key)? {
                    if owner.as_slice() != def.catalog_id.as_slice() {
                        return Err(Error::ReferentialIntegrity(format!(
                            "aspect def {} ({}) is owned by another catalog",
                            def.name,
                            hex::encode(def.id)
                        )));
                    }
                }
                let key = row_key(ASPECT_DEF, &[&def.catalog_id, def.name.as_bytes()]);
                let mut def = def.clone();
                if let Some(old) = self.get(&key)? {
                    let old = AspectDefRow::from_bytes(&old)?;
                    if old.id == def.id {
                        def.created_at = old.created_at;
                    } else {
                        self.delete(row_key(ASPECT_DEF_OWNER, &[&old.id]));
                    }
                    self.delete_prefix(&row_key(PROPERTY_DEF, &[&old.id]))?;
                }
                self.delete_prefix(&row_key(PROPERTY_DEF, &[&def.id]))?;
                for property in properties {
                    let mut property = property.clone();
                    property.aspect_def_id = def.id;
                    self.put(
                        row_key(PROPERTY_DEF, &[&def.id, property.name.as_bytes()]),
                        property.to_bytes()?,
                    );
                }
                self.put(owner_key, def.catalog_id.to_vec());
                self.put(key, def.to_bytes()?);
            }
            RowOp::PutHierarchy(row) => {
                let key = row_key(HIERARCHY, &[&row.catalog_id, row.name.as_bytes()]);
                let mut row = row.clone();
                if let Some(old) = self.get(&key)? {
                    let old = HierarchyRow::from_bytes(&old)?;
                    if old.id == row.id {
                        row.created_at = old.created_at;
                    } else {
                        self.delete_memberships(&old.id)?;
                    }
                }
                self.put(key, row.to_bytes()?);
            }
            RowOp::DeleteHierarchy { catalog_id, name } => {
                let key = row_key(HIERARCHY, &[catalog_id, name.as_bytes()]);
                if let Some(old) = self.get(&key)? {
                    let old = HierarchyRow::from_bytes(&old)?;
                    self.delete_memberships(&old.id)?;
                    self.delete(key);
                }
            }
            RowOp::PutAspect { aspect, values } => {
                let key = row_key(
                    ASPECT,
                    &[&aspect.catalog_id, &aspect.aspect_def_id, &aspect.entity_id],
                );
                let mut aspect = aspect.clone();
                if let Some(old) = self.get(&key)? {
                    let old = AspectRow::from_bytes(&old)?;
                    aspect.id = old.id;
                    aspect.created_at = old.created_at;
                }
                self.delete_prefix(&row_key(PROPERTY_VALUE, &[&aspect.id]))?;
                for value in values {
                    let mut value = value.clone();
                    value.aspect_id = aspect.id;
                    self.put(
                        row_key(PROPERTY_VALUE, &[&aspect.id, value.property_name.as_bytes()]),
                        value.to_bytes()?,
                    );
                }
                self.put_linked(key, &aspect.entity_id, aspect.to_bytes()?)?;
            }
            RowOp::DeleteAspect {
                catalog_id,
                aspect_def_id,
                entity_id,
            } => self.delete_aspect(row_key(ASPECT, &[catalog_id, aspect_def_id, entity_id]))?,
            RowOp::PutMember(row) => {
                let key = match row.position {
                    Some(position) => position_key(&row.hierarchy_id, position),
                    None => row_key(MEMBER, &[&row.hierarchy_id, &row.entity_id]),
                };
                let mut row = row.clone();
                if let Some(old) = self.get(&key)? {
                    row.id = HierarchyEntityRow::from_bytes(&old)?.id;
                }
                self.put_linked(key, &row.entity_id, row.to_bytes()?)?;
            }
            RowOp::DeleteMember {
                hierarchy_id,
                entity_id,
            } => {
                self.delete_linked(row_key(MEMBER, &[hierarchy_id, entity_id]))?;
            }
            RowOp::ReplaceMembers {
                hierarchy_id,
                from,
                rows,
            } => {
                self.delete_linked_from(
                    &row_key(MEMBER, &[hierarchy_id]),
                    &position_key(hierarchy_id, *from),
                )?;
                for (offset, row) in rows.iter().enumerate() {
                    let position = from + offset as u64;
                    let mut row = row.clone();
                    row.hierarchy_id = *hierarchy_id;
                    row.position = Some(position);
                    self.put_linked(
                        position_key(hierarchy_id, position),
                        &row.entity_id,
                        row.to_bytes()?,
                    )?;
                }
            }
            RowOp::PutEntry(row) => {
                let key = row_key(ENTRY, &[&row.hierarchy_id, row.entry_name.as_bytes()]);
                let mut row = row.clone();
                if let Some(old) = self.get(&key)? {
                    row.id = DirectoryEntryRow::from_bytes(&old)?.id;
                }
                self.put_linked(key, &row.entity_id, row.to_bytes()?)?;
            }
            RowOp::DeleteEntry {
                hierarchy_id,
                entry_name,
            } => {
                self.delete_linked(row_key(ENTRY, &[hierarchy_id, entry_name.as_bytes()]))?;
            }
        }
        Ok(())
    }

    fn delete_memberships(&mut self, hierarchy_id: &RowId) -> Result<(), Error> {
        let members = row_key(MEMBER, &[hierarchy_id]);
        self.delete_linked_from(&members, &members)?;
        let entries = row_key(ENTRY, &[hierarchy_id]);
        self.delete_linked_from(&entries, &entries)?;
        Ok(())
    }

    /// Delete an entity row, its aspects, and every membership and directory
    /// entry that references it.
    fn delete_entity(&mut self, id: &RowId) -> Result<(), Error> {
        self.delete(row_key(ENTITY, &[id]));
        for (reference, _) in self.scan(&row_key(REFERENCE, &[id]))? {
            let key = reference[ID_PREFIX_LEN..].to_vec();
            if key.first() == Some(&ASPECT) {
                self.delete_aspect(key)?;
            } else {
                self.delete_linked(key)?;
            }
        }
        Ok(())
    }

    /// Write every staged change in one transaction. Returns the number of
    /// keys written.
    fn commit(self) -> Result<usize, Error> {
        if self.writes.is_empty() {
            return Ok(0);
        }
        let writes = self.writes;
        let result: Result<(), TransactionError<Error>> = self.tree.transaction(|tx| {
            for (key, value) in &writes {
                match value {
                    Some(value) => {
                        tx.insert(key.as_slice(), value.as_slice())?;
                    }
                    None => {
                        tx.remove(key.as_slice())?;
                    }
                }
            }
            Ok(())
        });

        match result {
            Ok(()) => Ok(writes.len()),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(Error::Storage(e)),
        }
    }
}

/// Entity referenced by a row of the aspects, members or entries table.
fn referenced_entity(key: &[u8], bytes: &[u8]) -> Result<RowId, Error> {
    match key.first() {
        Some(&ASPECT) => Ok(AspectRow::from_bytes(bytes)?.entity_id),
        Some(&MEMBER) => Ok(HierarchyEntityRow::from_bytes(bytes)?.entity_id),
        Some(&ENTRY) => Ok(DirectoryEntryRow::from_bytes(bytes)?.entity_id),
        _ => Err(Error::InvalidData(format!(
            "row {} does not reference an entity",
            hex::encode(key)
        ))),
    }
}
