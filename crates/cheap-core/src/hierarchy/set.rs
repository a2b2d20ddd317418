//! Unordered entity set.

use std::collections::BTreeSet;

use crate::model::EntityId;

/// Membership-only collection; adding a member twice has no effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySet {
    id: EntityId,
    name: String,
    catalog_id: EntityId,
    version: u64,
    members: BTreeSet<EntityId>,
}

impl EntitySet {
    /// Create an empty set owned by a catalog.
    pub fn new(name: impl Into<String>, catalog_id: EntityId) -> Self {
        Self::restore(EntityId::new(), name.into(), catalog_id, 0, BTreeSet::new())
    }

    pub(crate) fn restore(
        id: EntityId,
        name: String,
        catalog_id: EntityId,
        version: u64,
        members: BTreeSet<EntityId>,
    ) -> Self {
        Self {
            id,
            name,
            catalog_id,
            version,
            members,
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

    /// Catalog owning this set.
    pub fn catalog_id(&self) -> EntityId {
        self.catalog_id
    }

    /// Bumped on every effective add or remove.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True when the set has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether `entity` is a member.
    pub fn contains(&self, entity: EntityId) -> bool {
        self.members.contains(&entity)
    }

    /// Members in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.members.iter().copied()
    }

    /// Add a member. Returns false if it was already present.
    pub fn add(&mut self, entity: EntityId) -> bool {
        let added = self.members.insert(entity);
        if added {
            self.version += 1;
        }
        added
    }

    /// Remove a member. Returns false if it was absent.
    pub fn remove(&mut self, entity: EntityId) -> bool {
        let removed = self.members.remove(&entity);
        if removed {
            self.version += 1;
        }
        removed
    }
}
