//! Hierarchies: named, catalog-scoped containers of entities.
//!
//! The four variants form the closed [`Hierarchy`] enum. Each carries the id
//! of its owning catalog rather than a reference to it, and a version that
//! increments on every effective mutation.

mod aspect_map;
mod directory;
mod list;
mod set;

pub use aspect_map::AspectMapHierarchy;
pub use directory::EntityDirectory;
pub use list::EntityList;
pub use set::EntitySet;

pub(crate) use directory::check_key;

use std::sync::Arc;

use crate::def::{AspectDef, HierarchyDef, HierarchyType};
use crate::error::Error;
use crate::model::EntityId;

/// A hierarchy of any variant.
#[derive(Debug, Clone)]
pub enum Hierarchy {
    List(EntityList),
    Set(EntitySet),
    Directory(EntityDirectory),
    AspectMap(AspectMapHierarchy),
}

impl Hierarchy {
    /// Create an empty List, Set or Directory from its definition. Aspect
    /// maps need an aspect def; see [`Hierarchy::aspect_map`].
    pub fn from_def(def: &HierarchyDef, catalog_id: EntityId) -> Result<Self, Error> {
        let name = def.name();
        match def.hierarchy_type() {
            HierarchyType::EntityList => Ok(Hierarchy::List(EntityList::new(name, catalog_id))),
            HierarchyType::EntitySet => Ok(Hierarchy::Set(EntitySet::new(name, catalog_id))),
            HierarchyType::EntityDirectory => {
                Ok(Hierarchy::Directory(EntityDirectory::new(name, catalog_id)))
            }
            HierarchyType::AspectMap => Err(Error::InvalidData(format!(
                "aspect map {} must be created from an aspect def",
                name
            ))),
        }
    }

    /// Create an empty aspect map for an aspect def.
    pub fn aspect_map(def: Arc<AspectDef>, catalog_id: EntityId) -> Self {
        Hierarchy::AspectMap(AspectMapHierarchy::new(def, catalog_id))
    }

    /// Hierarchy id.
    pub fn id(&self) -> EntityId {
        match self {
            Hierarchy::List(h) => h.id(),
            Hierarchy::Set(h) => h.id(),
            Hierarchy::Directory(h) => h.id(),
            Hierarchy::AspectMap(h) => h.id(),
        }
    }

    /// Name within the owning catalog.
    pub fn name(&self) -> &str {
        match self {
            Hierarchy::List(h) => h.name(),
            Hierarchy::Set(h) => h.name(),
            Hierarchy::Directory(h) => h.name(),
            Hierarchy::AspectMap(h) => h.name(),
        }
    }

    /// Owning catalog.
    pub fn catalog_id(&self) -> EntityId {
        match self {
            Hierarchy::List(h) => h.catalog_id(),
            Hierarchy::Set(h) => h.catalog_id(),
            Hierarchy::Directory(h) => h.catalog_id(),
            Hierarchy::AspectMap(h) => h.catalog_id(),
        }
    }

    /// Current version of the underlying hierarchy.
    pub fn version(&self) -> u64 {
        match self {
            Hierarchy::List(h) => h.version(),
            Hierarchy::Set(h) => h.version(),
            Hierarchy::Directory(h) => h.version(),
            Hierarchy::AspectMap(h) => h.version(),
        }
    }

    /// Kind of hierarchy.
    pub fn hierarchy_type(&self) -> HierarchyType {
        match self {
            Hierarchy::List(_) => HierarchyType::EntityList,
            Hierarchy::Set(_) => HierarchyType::EntitySet,
            Hierarchy::Directory(_) => HierarchyType::EntityDirectory,
            Hierarchy::AspectMap(_) => HierarchyType::AspectMap,
        }
    }

    /// Name and type as a definition.
    pub fn def(&self) -> Result<HierarchyDef, Error> {
        HierarchyDef::new(self.name(), self.hierarchy_type())
    }

    /// Entries, members, keys or aspects held.
    pub fn len(&self) -> usize {
        match self {
            Hierarchy::List(h) => h.len(),
            Hierarchy::Set(h) => h.len(),
            Hierarchy::Directory(h) => h.len(),
            Hierarchy::AspectMap(h) => h.len(),
        }
    }

    /// True when nothing is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the entity is referenced anywhere in the hierarchy.
    pub fn contains_entity(&self, entity: EntityId) -> bool {
        match self {
            Hierarchy::List(h) => h.contains(entity),
            Hierarchy::Set(h) => h.contains(entity),
            Hierarchy::Directory(h) => h.contains_entity(entity),
            Hierarchy::AspectMap(h) => h.contains(entity),
        }
    }

    /// Drop every reference to an entity. Returns whether anything changed.
    pub(crate) fn purge_entity(&mut self, entity: EntityId) -> bool {
        match self {
            Hierarchy::List(h) => h.remove_all(entity) > 0,
            Hierarchy::Set(h) => h.remove(entity),
            Hierarchy::Directory(h) => h.remove_entity(entity) > 0,
            Hierarchy::AspectMap(h) => h.remove(entity).is_some(),
        }
    }

    pub fn as_list(&self) -> Option<&EntityList> {
        match self {
            Hierarchy::List(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&EntitySet> {
        match self {
            Hierarchy::Set(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_directory(&self) -> Option<&EntityDirectory> {
        match self {
            Hierarchy::Directory(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_aspect_map(&self) -> Option<&AspectMapHierarchy> {
        match self {
            Hierarchy::AspectMap(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut EntityList> {
        match self {
            Hierarchy::List(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_set_mut(&mut self) -> Option<&mut EntitySet> {
        match self {
            Hierarchy::Set(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_directory_mut(&mut self) -> Option<&mut EntityDirectory> {
        match self {
            Hierarchy::Directory(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_aspect_map_mut(&mut self) -> Option<&mut AspectMapHierarchy> {
        match self {
            Hierarchy::AspectMap(h) => Some(h),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_def_variants() {
        let catalog = EntityId::new();
        for ty in [
            HierarchyType::EntityList,
            HierarchyType::EntitySet,
            HierarchyType::EntityDirectory,
        ] {
            let def = HierarchyDef::new("h", ty).unwrap();
            let hierarchy = Hierarchy::from_def(&def, catalog).unwrap();
            assert_eq!(hierarchy.hierarchy_type(), ty);
            assert_eq!(hierarchy.catalog_id(), catalog);
            assert_eq!(hierarchy.def().unwrap(), def);
            assert!(hierarchy.is_empty());
        }
        let map = HierarchyDef::new("h", HierarchyType::AspectMap).unwrap();
        assert!(Hierarchy::from_def(&map, catalog).is_err());
    }

    #[test]
    fn test_purge_entity() {
        let e = EntityId::new();
        let mut dir = Hierarchy::Directory(EntityDirectory::new("d", EntityId::new()));
        if let Some(d) = dir.as_directory_mut() {
            d.put("x", e).unwrap();
        }
        assert!(dir.contains_entity(e));
        assert!(dir.purge_entity(e));
        assert!(!dir.purge_entity(e));
        assert!(!dir.contains_entity(e));
    }
}
