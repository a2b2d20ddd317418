//! Ordered entity list.

use crate::error::Error;
use crate::model::EntityId;

/// Ordered sequence of entity references. Duplicates are allowed and
/// positions are dense, 0-based indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityList {
    id: EntityId,
    name: String,
    catalog_id: EntityId,
    version: u64,
    entities: Vec<EntityId>,
}

impl EntityList {
    /// Create an empty list owned by a catalog.
    pub fn new(name: impl Into<String>, catalog_id: EntityId) -> Self {
        Self::restore(EntityId::new(), name.into(), catalog_id, 0, Vec::new())
    }

    pub(crate) fn restore(
        id: EntityId,
        name: String,
        catalog_id: EntityId,
        version: u64,
        entities: Vec<EntityId>,
    ) -> Self {
        Self {
            id,
            name,
            catalog_id,
            version,
            entities,
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

    /// Catalog owning this list.
    pub fn catalog_id(&self) -> EntityId {
        self.catalog_id
    }

    /// Bumped on every effective change.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of entries, duplicates included.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True when the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity at a position.
    pub fn get(&self, pos: usize) -> Option<EntityId> {
        self.entities.get(pos).copied()
    }

    /// First position of an entity.
    pub fn position(&self, entity: EntityId) -> Option<usize> {
        self.entities.iter().position(|e| *e == entity)
    }

    /// Whether `entity` appears at least once.
    pub fn contains(&self, entity: EntityId) -> bool {
        self.entities.contains(&entity)
    }

    /// Entities in stored order.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter().copied()
    }

    /// Entries in list order.
    pub fn as_slice(&self) -> &[EntityId] {
        &self.entities
    }

    /// Add an entity at the end.
    pub fn append(&mut self, entity: EntityId) {
        self.entities.push(entity);
        self.version += 1;
    }

    /// Insert an entity at `pos`, shifting later entries. `pos == len`
    /// appends.
    pub fn insert(&mut self, pos: usize, entity: EntityId) -> Result<(), Error> {
        self.check_insert(pos)?;
        self.entities.insert(pos, entity);
        self.version += 1;
        Ok(())
    }

    /// Remove the entity at `pos`, shifting later entries down.
    pub fn remove_at(&mut self, pos: usize) -> Result<EntityId, Error> {
        self.check_index(pos)?;
        let removed = self.entities.remove(pos);
        self.version += 1;
        Ok(removed)
    }

    /// Fail unless `pos` is a valid insertion point, `0..=len`.
    pub fn check_insert(&self, pos: usize) -> Result<(), Error> {
        if pos > self.entities.len() {
            return Err(self.out_of_range(pos));
        }
        Ok(())
    }

    /// Fail unless `pos` holds an entity.
    pub fn check_index(&self, pos: usize) -> Result<(), Error> {
        if pos >= self.entities.len() {
            return Err(self.out_of_range(pos));
        }
        Ok(())
    }

    fn out_of_range(&self, pos: usize) -> Error {
        Error::not_found("list position", format!("{}[{}]", self.name, pos))
    }

    /// Remove every occurrence of an entity. Returns the number removed.
    pub fn remove_all(&mut self, entity: EntityId) -> usize {
        let before = self.entities.len();
        self.entities.retain(|e| *e != entity);
        let removed = before - self.entities.len();
        if removed > 0 {
            self.version += 1;
        }
        removed
    }
}
