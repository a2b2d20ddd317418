//! Catalogs: the top-level containers of hierarchies and aspect defs.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::def::{check_unreserved, AspectDef, CatalogDef, HierarchyType, Species, RESERVED_PREFIX};
use crate::error::Error;
use crate::hierarchy::{AspectMapHierarchy, EntityDirectory, Hierarchy};
use crate::model::EntityId;

/// Reserved directory from hierarchy name to hierarchy id.
pub const HIERARCHIES_DIRECTORY: &str = "cheap.hierarchies";

/// Reserved directory from aspect def name to aspect def id.
pub const ASPECT_DEFS_DIRECTORY: &str = "cheap.aspect_defs";

/// Whether a hierarchy name belongs to the system.
pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

/// Options for creating a catalog.
#[derive(Debug, Clone, Default)]
pub struct CatalogOptions {
    /// Role relative to the upstream.
    pub species: Species,
    /// Where the catalog lives, if anywhere.
    pub uri: Option<String>,
    /// Catalog this one derives from. Provenance only.
    pub upstream: Option<EntityId>,
    /// Definitions to pre-populate, and the limit of a strict catalog.
    pub def: CatalogDef,
    /// Reject aspect defs and hierarchies outside `def`.
    pub strict: bool,
}

impl CatalogOptions {
    /// Options for an open SOURCE catalog with an empty definition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the species.
    pub fn species(mut self, species: Species) -> Self {
        self.species = species;
        self
    }

    /// Set the location.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the upstream catalog.
    pub fn upstream(mut self, upstream: EntityId) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Set the definition to pre-populate.
    pub fn def(mut self, def: CatalogDef) -> Self {
        self.def = def;
        self
    }

    /// Restrict the catalog to its definition.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Outcome of [`Catalog::add_hierarchy`].
#[derive(Debug)]
pub enum AddHierarchy {
    /// The name was free.
    Added,
    /// The named hierarchy was replaced; it is handed back.
    Replaced(Hierarchy),
    /// The name belongs to an aspect map, which is never replaced. The
    /// incoming hierarchy is handed back untouched.
    Preserved(Hierarchy),
}

/// A catalog: hierarchies, aspect maps and the two reserved directories.
///
/// The version counts structural changes: +2 per registered aspect def
/// (the def and its map), +1 per added or replaced hierarchy, +1 per removed
/// hierarchy. Membership edits only bump the edited hierarchy's own version.
///
/// Registered aspect defs are owned by the catalog: each gets an id of its
/// own, so one def template can seed any number of catalogs.
#[derive(Debug, Clone)]
pub struct Catalog {
    id: EntityId,
    species: Species,
    uri: Option<String>,
    upstream: Option<EntityId>,
    strict: bool,
    version: u64,
    def: CatalogDef,
    hierarchies: BTreeMap<String, Hierarchy>,
}

impl Catalog {
    /// Create a catalog pre-populated from `options.def`, at version 0.
    pub fn new(id: EntityId, options: CatalogOptions) -> Result<Self, Error> {
        let mut catalog = Self::empty(id, options, 0);
        let aspect_defs: Vec<AspectDef> = catalog.def.aspect_defs().cloned().collect();
        for def in aspect_defs {
            let map = catalog.owned_aspect_map(def);
            catalog.register(map);
        }
        let hierarchy_defs: Vec<_> = catalog.def.hierarchy_defs().cloned().collect();
        for def in &hierarchy_defs {
            catalog.register(Hierarchy::from_def(def, id)?);
        }
        Ok(catalog)
    }

    /// Create a catalog from a definition with default options.
    pub fn from_def(id: EntityId, def: CatalogDef, strict: bool) -> Result<Self, Error> {
        Self::new(id, CatalogOptions::new().def(def).strict(strict))
    }

    /// Rebuild a stored catalog from its hierarchies.
    pub(crate) fn restore(
        id: EntityId,
        options: CatalogOptions,
        version: u64,
        hierarchies: impl IntoIterator<Item = Hierarchy>,
    ) -> Self {
        let mut catalog = Self::empty(id, options, version);
        for hierarchy in hierarchies {
            catalog.register(hierarchy);
        }
        catalog
    }

    fn empty(id: EntityId, options: CatalogOptions, version: u64) -> Self {
        let mut hierarchies = BTreeMap::new();
        for name in [HIERARCHIES_DIRECTORY, ASPECT_DEFS_DIRECTORY] {
            hierarchies.insert(
                name.to_string(),
                Hierarchy::Directory(EntityDirectory::new(name, id)),
            );
        }
        Self {
            id,
            species: options.species,
            uri: options.uri,
            upstream: options.upstream,
            strict: options.strict,
            version,
            def: options.def,
            hierarchies,
        }
    }

    /// Catalog id, which is also the id of the catalog's own entity.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Role relative to the upstream.
    pub fn species(&self) -> Species {
        self.species
    }

    /// Location, if any.
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// Catalog this one derives from.
    pub fn upstream(&self) -> Option<EntityId> {
        self.upstream
    }

    /// Whether registrations are limited to the definition.
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Structural version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The nominal definition.
    pub fn def(&self) -> &CatalogDef {
        &self.def
    }

    /// Hash of the nominal definition.
    pub fn hash(&self) -> u64 {
        self.def.hash()
    }

    /// Look up a hierarchy, reserved ones included.
    pub fn hierarchy(&self, name: &str) -> Option<&Hierarchy> {
        self.hierarchies.get(name)
    }

    /// Mutable access to a hierarchy. Reserved hierarchies are not
    /// reachable.
    pub fn hierarchy_mut(&mut self, name: &str) -> Option<&mut Hierarchy> {
        if is_reserved(name) {
            return None;
        }
        self.hierarchies.get_mut(name)
    }

    /// All hierarchies in name order, reserved ones included.
    pub fn hierarchies(&self) -> impl Iterator<Item = &Hierarchy> {
        self.hierarchies.values()
    }

    /// The aspect map of an aspect def.
    pub fn aspects(&self, name: &str) -> Option<&AspectMapHierarchy> {
        self.hierarchies.get(name).and_then(Hierarchy::as_aspect_map)
    }

    /// Mutable access to the aspect map of an aspect def.
    pub fn aspects_mut(&mut self, name: &str) -> Option<&mut AspectMapHierarchy> {
        self.hierarchies
            .get_mut(name)
            .and_then(Hierarchy::as_aspect_map_mut)
    }

    /// Whether an aspect def of this name is registered.
    pub fn contains_aspects(&self, name: &str) -> bool {
        self.aspects(name).is_some()
    }

    /// Every registered aspect def. A superset of the nominal definition's.
    pub fn aspect_defs(&self) -> impl Iterator<Item = &Arc<AspectDef>> {
        self.hierarchies
            .values()
            .filter_map(Hierarchy::as_aspect_map)
            .map(AspectMapHierarchy::def)
    }

    /// A registered aspect def by name.
    pub fn aspect_def(&self, name: &str) -> Option<&Arc<AspectDef>> {
        self.aspects(name).map(AspectMapHierarchy::def)
    }

    /// Check that a hierarchy may be added under its name. Callers handle
    /// names held by aspect maps first; see [`AddHierarchy::Preserved`].
    pub fn validate_hierarchy(&self, hierarchy: &Hierarchy) -> Result<(), Error> {
        let name = hierarchy.name();
        if is_reserved(name) {
            return Err(Error::AccessDenied(format!("hierarchy {} is reserved", name)));
        }
        if hierarchy.catalog_id() != self.id {
            return Err(Error::InvalidData(format!(
                "hierarchy {} belongs to catalog {}",
                name,
                hierarchy.catalog_id()
            )));
        }
        if hierarchy.hierarchy_type() == HierarchyType::AspectMap {
            return Err(Error::InvalidData(format!(
                "aspect map {} can only be created by extend",
                name
            )));
        }
        if self.strict && !self.def.contains_hierarchy_def(&hierarchy.def()?) {
            return Err(Error::StrictViolation(format!(
                "hierarchy {} ({}) is not in the catalog def",
                name,
                hierarchy.hierarchy_type()
            )));
        }
        Ok(())
    }

    /// Add or replace a hierarchy. Aspect maps are never replaced.
    pub fn add_hierarchy(&mut self, hierarchy: Hierarchy) -> Result<AddHierarchy, Error> {
        if self.contains_aspects(hierarchy.name()) {
            debug!(catalog = %self.id, name = hierarchy.name(), "aspect map preserved");
            return Ok(AddHierarchy::Preserved(hierarchy));
        }
        self.validate_hierarchy(&hierarchy)?;
        let outcome = match self.register(hierarchy) {
            Some(previous) => AddHierarchy::Replaced(previous),
            None => AddHierarchy::Added,
        };
        self.version += 1;
        Ok(outcome)
    }

    /// Check that a hierarchy may be removed.
    pub fn validate_removal(&self, name: &str) -> Result<&Hierarchy, Error> {
        if is_reserved(name) {
            return Err(Error::AccessDenied(format!("hierarchy {} is reserved", name)));
        }
        let hierarchy = self
            .hierarchies
            .get(name)
            .ok_or_else(|| Error::not_found("hierarchy", name))?;
        if hierarchy.hierarchy_type() == HierarchyType::AspectMap {
            return Err(Error::AccessDenied(format!(
                "aspect map {} cannot be removed",
                name
            )));
        }
        Ok(hierarchy)
    }

    /// Remove a List, Set or Directory hierarchy.
    pub fn remove_hierarchy(&mut self, name: &str) -> Result<Hierarchy, Error> {
        self.validate_removal(name)?;
        let removed = self
            .unregister(name)
            .ok_or_else(|| Error::not_found("hierarchy", name))?;
        self.version += 1;
        Ok(removed)
    }

    /// Whether `extend(def)` would register something new.
    ///
    /// Fails when the name is held by a different def or by another
    /// hierarchy, or when a strict catalog's definition lacks the def.
    pub fn needs_extension(&self, def: &AspectDef) -> Result<bool, Error> {
        check_unreserved(def.name())?;
        if let Some(existing) = self.hierarchies.get(def.name()) {
            return match existing.as_aspect_map() {
                Some(map) if map.def().same_definition(def) => Ok(false),
                Some(_) => Err(Error::duplicate("aspect def", def.name())),
                None => Err(Error::duplicate("hierarchy", def.name())),
            };
        }
        if self.strict && !self.def.contains_aspect_def(def) {
            return Err(Error::StrictViolation(format!(
                "aspect def {} is not in the catalog def",
                def.name()
            )));
        }
        Ok(true)
    }

    /// Register an aspect def and create its aspect map. Idempotent for an
    /// already registered, identical def.
    pub fn extend(&mut self, def: AspectDef) -> Result<&AspectMapHierarchy, Error> {
        let name = def.name().to_string();
        if self.needs_extension(&def)? {
            let map = self.owned_aspect_map(def);
            self.install_extension(map);
        }
        self.aspects(&name)
            .ok_or_else(|| Error::not_found("aspect map", &name))
    }

    /// Aspect map for a def registered in this catalog, under a fresh def id.
    pub(crate) fn owned_aspect_map(&self, def: AspectDef) -> Hierarchy {
        Hierarchy::aspect_map(Arc::new(def.with_id(EntityId::new())), self.id)
    }

    /// Register an aspect map checked with [`Catalog::needs_extension`].
    pub(crate) fn install_extension(&mut self, map: Hierarchy) {
        let name = map.name().to_string();
        self.register(map);
        // One for the aspect def, one for its map.
        self.version += 2;
        debug!(catalog = %self.id, aspect_def = %name, version = self.version, "catalog extended");
    }

    /// Drop every reference to an entity. Returns the names of the
    /// hierarchies that changed.
    pub(crate) fn purge_entity(&mut self, entity: EntityId) -> Vec<String> {
        let mut changed = Vec::new();
        for (name, hierarchy) in self.hierarchies.iter_mut() {
            if !is_reserved(name) && hierarchy.purge_entity(entity) {
                changed.push(name.clone());
            }
        }
        changed
    }

    fn register(&mut self, hierarchy: Hierarchy) -> Option<Hierarchy> {
        let name = hierarchy.name().to_string();
        let id = hierarchy.id();
        let aspect_def_id = hierarchy.as_aspect_map().map(|map| map.def().id());
        let previous = self.hierarchies.insert(name.clone(), hierarchy);
        if let Some(index) = self.directory_mut(HIERARCHIES_DIRECTORY) {
            index.bind(name.clone(), id);
        }
        if let Some(def_id) = aspect_def_id {
            if let Some(index) = self.directory_mut(ASPECT_DEFS_DIRECTORY) {
                index.bind(name, def_id);
            }
        }
        previous
    }

    fn unregister(&mut self, name: &str) -> Option<Hierarchy> {
        let removed = self.hierarchies.remove(name)?;
        if let Some(index) = self.directory_mut(HIERARCHIES_DIRECTORY) {
            index.remove(name);
        }
        Some(removed)
    }

    fn directory_mut(&mut self, name: &str) -> Option<&mut EntityDirectory> {
        self.hierarchies
            .get_mut(name)
            .and_then(Hierarchy::as_directory_mut)
    }
}
