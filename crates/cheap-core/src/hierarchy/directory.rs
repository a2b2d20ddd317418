//! Keyed entity directory.

use std::collections::BTreeMap;

use crate::error::Error;
use crate::model::EntityId;

/// Mapping from unique, non-empty string keys to entities. Several keys may
/// point at the same entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDirectory {
    id: EntityId,
    name: String,
    catalog_id: EntityId,
    version: u64,
    entries: BTreeMap<String, EntityId>,
}

impl EntityDirectory {
    /// Create an empty directory owned by a catalog.
    pub fn new(name: impl Into<String>, catalog_id: EntityId) -> Self {
        Self::restore(EntityId::new(), name.into(), catalog_id, 0, BTreeMap::new())
    }

    pub(crate) fn restore(
        id: EntityId,
        name: String,
        catalog_id: EntityId,
        version: u64,
        entries: BTreeMap<String, EntityId>,
    ) -> Self {
        Self {
            id,
            name,
            catalog_id,
            version,
            entries,
        }
    }

    /// Hierarchy id.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Hierarchy name within its catalog.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Catalog owning this directory.
    pub fn catalog_id(&self) -> EntityId {
        self.catalog_id
    }

    /// Bumped on every put and effective removal.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no key is bound.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entity bound to `key`.
    pub fn get(&self, key: &str) -> Option<EntityId> {
        self.entries.get(key).copied()
    }

    /// Whether `key` is bound.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether any key points at the entity.
    pub fn contains_entity(&self, entity: EntityId) -> bool {
        self.entries.values().any(|e| *e == entity)
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, EntityId)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Bind a key, returning the entity it pointed at before.
    pub fn put(
        &mut self,
        key: impl Into<String>,
        entity: EntityId,
    ) -> Result<Option<EntityId>, Error> {
        let key = key.into();
        check_key(&key)?;
        Ok(self.bind(key, entity))
    }

    /// Bind a key already known to be valid.
    pub(crate) fn bind(&mut self, key: String, entity: EntityId) -> Option<EntityId> {
        let previous = self.entries.insert(key, entity);
        self.version += 1;
        previous
    }

    /// Unbind a key, returning the entity it pointed at.
    pub fn remove(&mut self, key: &str) -> Option<EntityId> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.version += 1;
        }
        removed
    }

    /// Unbind every key pointing at an entity. Returns the number removed.
    pub fn remove_entity(&mut self, entity: EntityId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| *e != entity);
        let removed = before - self.entries.len();
        if removed > 0 {
            self.version += 1;
        }
        removed
    }
}

pub(crate) fn check_key(key: &str) -> Result<(), Error> {
    if key.is_empty() {
        return Err(Error::InvalidData("directory key must not be empty".to_string()));
    }
    Ok(())
}
