//! System-owned index of the aspects of one aspect def.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::def::AspectDef;
use crate::error::Error;
use crate::model::{Aspect, EntityId};

/// Every aspect of one aspect def in a catalog, keyed by owning entity.
///
/// The hierarchy is named after its aspect def. Attaching an aspect to an
/// entity means putting it here.
#[derive(Debug, Clone)]
pub struct AspectMapHierarchy {
    id: EntityId,
    catalog_id: EntityId,
    version: u64,
    def: Arc<AspectDef>,
    aspects: BTreeMap<EntityId, Aspect>,
}

impl AspectMapHierarchy {
    /// Create an empty map bound to an aspect def.
    pub fn new(def: Arc<AspectDef>, catalog_id: EntityId) -> Self {
        Self::restore(EntityId::new(), catalog_id, 0, def, BTreeMap::new())
    }

    pub(crate) fn restore(
        id: EntityId,
        catalog_id: EntityId,
        version: u64,
        def: Arc<AspectDef>,
        aspects: BTreeMap<EntityId, Aspect>,
    ) -> Self {
        Self {
            id,
            catalog_id,
            version,
            def,
            aspects,
        }
    }

    /// Hierarchy id.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Map name, always the aspect def name.
    pub fn name(&self) -> &str {
        self.def.name()
    }

    /// Catalog owning this map.
    pub fn catalog_id(&self) -> EntityId {
        self.catalog_id
    }

    /// Bumped on every attach or detach.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The bound aspect def.
    pub fn def(&self) -> &Arc<AspectDef> {
        &self.def
    }

    /// Number of attached aspects.
    pub fn len(&self) -> usize {
        self.aspects.len()
    }

    /// True when no aspect is attached.
    pub fn is_empty(&self) -> bool {
        self.aspects.is_empty()
    }

    /// Aspect attached to `entity`.
    pub fn get(&self, entity: EntityId) -> Option<&Aspect> {
        self.aspects.get(&entity)
    }

    /// Whether `entity` has an aspect here.
    pub fn contains(&self, entity: EntityId) -> bool {
        self.aspects.contains_key(&entity)
    }

    /// (entity, aspect) pairs in entity order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Aspect)> {
        self.aspects.iter().map(|(e, a)| (*e, a))
    }

    /// Check that an aspect may be stored under `entity`.
    pub fn check(&self, entity: EntityId, aspect: &Aspect) -> Result<(), Error> {
        let def = aspect.def();
        if !Arc::ptr_eq(def, &self.def) && !def.same_definition(&self.def) {
            return Err(Error::TypeMismatch(format!(
                "aspect of {} ({:016x}) does not match map {} ({:016x})",
                def.name(),
                def.hash(),
                self.def.name(),
                self.def.hash()
            )));
        }
        if aspect.entity_id() != entity {
            return Err(Error::InvalidData(format!(
                "aspect belongs to {}, not {}",
                aspect.entity_id(),
                entity
            )));
        }
        Ok(())
    }

    /// Store an aspect, returning the one it replaced.
    pub fn put(&mut self, entity: EntityId, aspect: Aspect) -> Result<Option<Aspect>, Error> {
        self.check(entity, &aspect)?;
        let previous = self.aspects.insert(entity, aspect);
        self.version += 1;
        Ok(previous)
    }

    /// Remove the aspect of an entity.
    pub fn remove(&mut self, entity: EntityId) -> Option<Aspect> {
        let removed = self.aspects.remove(&entity);
        if removed.is_some() {
            self.version += 1;
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::def::{PropertyDef, PropertyType};

    fn def(name: &str, ty: PropertyType) -> Arc<AspectDef> {
        Arc::new(AspectDef::new(name, [PropertyDef::new("value", ty).unwrap()]).unwrap())
    }

    #[test]
    fn test_put_get_remove() {
        let bound = def("Score", PropertyType::Int);
        let mut map = AspectMapHierarchy::new(bound.clone(), EntityId::new());
        let e = EntityId::new();
        let aspect = Aspect::new(e, bound, [("value", 7i64)]).unwrap();

        assert!(map.put(e, aspect.clone()).unwrap().is_none());
        assert_eq!(map.get(e), Some(&aspect));
        assert_eq!(map.iter().count(), 1);
        assert!(map.remove(e).is_some());
        assert!(map.remove(e).is_none());
        assert_eq!(map.version(), 2);
    }

    #[test]
    fn test_equivalent_def_is_accepted() {
        let bound = def("Score", PropertyType::Int);
        let twin = def("Score", PropertyType::Int);
        let mut map = AspectMapHierarchy::new(bound, EntityId::new());
        let e = EntityId::new();
        let aspect = Aspect::new(e, twin, [("value", 1i64)]).unwrap();
        assert!(map.put(e, aspect).is_ok());
    }

    #[test]
    fn test_mismatched_aspect_rejected() {
        let mut map = AspectMapHierarchy::new(def("Score", PropertyType::Int), EntityId::new());
        let e = EntityId::new();

        let other = Aspect::new(e, def("Score", PropertyType::Double), [("value", 1.0)]).unwrap();
        assert!(matches!(map.put(e, other), Err(Error::TypeMismatch(_))));

        let renamed = Aspect::new(e, def("Rank", PropertyType::Int), [("value", 1i64)]).unwrap();
        assert!(matches!(map.put(e, renamed), Err(Error::TypeMismatch(_))));

        let foreign =
            Aspect::new(EntityId::new(), map.def().clone(), [("value", 1i64)]).unwrap();
        assert!(matches!(map.put(e, foreign), Err(Error::InvalidData(_))));
        assert!(map.is_empty());
        assert_eq!(map.version(), 0);
    }
}
