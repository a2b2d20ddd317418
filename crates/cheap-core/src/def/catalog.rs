//! Catalog definitions.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use super::{AspectDef, HierarchyDef, HierarchyType};
use crate::canonical::{self, CanonicalReader, CanonicalWriter};
use crate::error::Error;
use crate::hash::fnv1a64;

/// Name prefix owned by the system hierarchies of every catalog.
pub const RESERVED_PREFIX: &str = "cheap.";

/// Check that a user-chosen hierarchy or aspect def name is not reserved.
pub(crate) fn check_unreserved(name: &str) -> Result<(), Error> {
    if name.starts_with(RESERVED_PREFIX) {
        return Err(Error::InvalidData(format!(
            "name {} uses the reserved prefix {}",
            name, RESERVED_PREFIX
        )));
    }
    Ok(())
}

/// Descriptive, hashable template of the aspect defs and hierarchies a
/// catalog holds.
///
/// Every aspect def becomes an aspect map of the same name in the catalog,
/// so aspect def and hierarchy names share one namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "CatalogDefWire", into = "CatalogDefWire")]
pub struct CatalogDef {
    aspect_defs: BTreeMap<String, AspectDef>,
    hierarchy_defs: BTreeMap<String, HierarchyDef>,
    hash: OnceLock<u64>,
}

impl CatalogDef {
    /// Create an empty definition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an aspect def. Adding an identical def again is a no-op.
    pub fn with_aspect_def(mut self, def: AspectDef) -> Result<Self, Error> {
        check_unreserved(def.name())?;
        if let Some(existing) = self.aspect_defs.get(def.name()) {
            if existing.same_definition(&def) {
                return Ok(self);
            }
            return Err(Error::duplicate("aspect def", def.name()));
        }
        if self.hierarchy_defs.contains_key(def.name()) {
            return Err(Error::duplicate("hierarchy", def.name()));
        }
        self.aspect_defs.insert(def.name().to_string(), def);
        self.hash = OnceLock::new();
        Ok(self)
    }

    /// Add a hierarchy def. Aspect maps are implied by aspect defs and cannot
    /// be listed directly.
    pub fn with_hierarchy_def(mut self, def: HierarchyDef) -> Result<Self, Error> {
        check_unreserved(def.name())?;
        if def.hierarchy_type() == HierarchyType::AspectMap {
            return Err(Error::InvalidData(format!(
                "hierarchy {} cannot be declared as an aspect map",
                def.name()
            )));
        }
        if let Some(existing) = self.hierarchy_defs.get(def.name()) {
            if *existing == def {
                return Ok(self);
            }
            return Err(Error::duplicate("hierarchy", def.name()));
        }
        if self.aspect_defs.contains_key(def.name()) {
            return Err(Error::duplicate("hierarchy", def.name()));
        }
        self.hierarchy_defs.insert(def.name().to_string(), def);
        self.hash = OnceLock::new();
        Ok(self)
    }

    /// Aspect defs in name order.
    pub fn aspect_defs(&self) -> impl Iterator<Item = &AspectDef> {
        self.aspect_defs.values()
    }

    /// Hierarchy defs in name order.
    pub fn hierarchy_defs(&self) -> impl Iterator<Item = &HierarchyDef> {
        self.hierarchy_defs.values()
    }

    /// Aspect def by name.
    pub fn aspect_def(&self, name: &str) -> Option<&AspectDef> {
        self.aspect_defs.get(name)
    }

    /// Hierarchy def by name.
    pub fn hierarchy_def(&self, name: &str) -> Option<&HierarchyDef> {
        self.hierarchy_defs.get(name)
    }

    /// Whether a def with the same name and canonical hash is listed.
    pub fn contains_aspect_def(&self, def: &AspectDef) -> bool {
        self.aspect_defs
            .get(def.name())
            .is_some_and(|existing| existing.same_definition(def))
    }

    /// Whether a hierarchy of the same name and type is listed.
    pub fn contains_hierarchy_def(&self, def: &HierarchyDef) -> bool {
        self.hierarchy_defs.get(def.name()) == Some(def)
    }

    /// True when the def declares nothing.
    pub fn is_empty(&self) -> bool {
        self.aspect_defs.is_empty() && self.hierarchy_defs.is_empty()
    }

    /// Canonical FNV-1a hash, computed once.
    pub fn hash(&self) -> u64 {
        *self.hash.get_or_init(|| fnv1a64(&self.to_canonical_bytes()))
    }

    /// Encode to the canonical byte form.
    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        let mut writer = CanonicalWriter::new();
        canonical::encode_catalog_def(&mut writer, self);
        writer.into_bytes()
    }

    /// Decode the canonical byte form. Aspect defs get fresh ids.
    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut reader = CanonicalReader::new(bytes);
        let def = canonical::decode_catalog_def(&mut reader)?;
        reader.finish()?;
        Ok(def)
    }
}

impl PartialEq for CatalogDef {
    fn eq(&self, other: &Self) -> bool {
        self.to_canonical_bytes() == other.to_canonical_bytes()
    }
}

#[derive(Serialize, Deserialize)]
struct CatalogDefWire {
    #[serde(default)]
    aspect_defs: Vec<AspectDef>,
    #[serde(default)]
    hierarchy_defs: Vec<HierarchyDef>,
}

impl From<CatalogDef> for CatalogDefWire {
    fn from(def: CatalogDef) -> Self {
        Self {
            aspect_defs: def.aspect_defs.into_values().collect(),
            hierarchy_defs: def.hierarchy_defs.into_values().collect(),
        }
    }
}

impl TryFrom<CatalogDefWire> for CatalogDef {
    type Error = Error;

    fn try_from(wire: CatalogDefWire) -> Result<Self, Self::Error> {
        let def = wire
            .aspect_defs
            .into_iter()
            .try_fold(CatalogDef::new(), CatalogDef::with_aspect_def)?;
        wire.hierarchy_defs
            .into_iter()
            .try_fold(def, CatalogDef::with_hierarchy_def)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::def::{AspectFlags, PropertyDef, PropertyFlags, PropertyType};
    use crate::model::PropertyValue;

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

    fn address() -> AspectDef {
        AspectDef::new(
            "Address",
            [PropertyDef::new("city", PropertyType::String).unwrap()],
        )
        .unwrap()
    }

    #[test]
    fn test_hash_ignores_insertion_order() {
        let by_name = HierarchyDef::new("byName", HierarchyType::EntityDirectory).unwrap();
        let a = CatalogDef::new()
            .with_aspect_def(person())
            .unwrap()
            .with_aspect_def(address())
            .unwrap()
            .with_hierarchy_def(HierarchyDef::new("people", HierarchyType::EntitySet).unwrap())
            .unwrap()
            .with_hierarchy_def(by_name.clone())
            .unwrap();
        let b = CatalogDef::new()
            .with_hierarchy_def(by_name)
            .unwrap()
            .with_aspect_def(address())
            .unwrap()
            .with_hierarchy_def(HierarchyDef::new("people", HierarchyType::EntitySet).unwrap())
            .unwrap()
            .with_aspect_def(person())
            .unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_sensitive_to_every_field() {
        let base = CatalogDef::new().with_aspect_def(person()).unwrap();
        let variants = [
            AspectDef::new(
                "Person",
                [
                    PropertyDef::new("firstName", PropertyType::String).unwrap(),
                    PropertyDef::new("age", PropertyType::Double).unwrap(),
                ],
            )
            .unwrap(),
            AspectDef::new(
                "Person",
                [
                    PropertyDef::new("firstName", PropertyType::String).unwrap(),
                    PropertyDef::build(
                        "age",
                        PropertyType::Int,
                        PropertyFlags::default().nullable(),
                        None,
                    )
                    .unwrap(),
                ],
            )
            .unwrap(),
            AspectDef::new(
                "Person",
                [
                    PropertyDef::new("firstName", PropertyType::String).unwrap(),
                    PropertyDef::new("years", PropertyType::Int).unwrap(),
                ],
            )
            .unwrap(),
            AspectDef::new(
                "Person",
                [
                    PropertyDef::new("firstName", PropertyType::String).unwrap(),
                    PropertyDef::new("age", PropertyType::Int)
                        .unwrap()
                        .with_default(0i64)
                        .unwrap(),
                ],
            )
            .unwrap(),
            person().with_flags(AspectFlags::default().extensible()),
            AspectDef::new(
                "People",
                [
                    PropertyDef::new("firstName", PropertyType::String).unwrap(),
                    PropertyDef::new("age", PropertyType::Int).unwrap(),
                ],
            )
            .unwrap(),
        ];
        for variant in variants {
            let other = CatalogDef::new().with_aspect_def(variant).unwrap();
            assert_ne!(base.hash(), other.hash());
        }

        let with_set = base
            .clone()
            .with_hierarchy_def(HierarchyDef::new("h", HierarchyType::EntitySet).unwrap())
            .unwrap();
        let with_list = base
            .with_hierarchy_def(HierarchyDef::new("h", HierarchyType::EntityList).unwrap())
            .unwrap();
        assert_ne!(with_set.hash(), with_list.hash());
    }

    #[test]
    fn test_pinned_hash_vectors() {
        assert_eq!(CatalogDef::new().to_canonical_bytes(), vec![0u8; 8]);
        assert_eq!(CatalogDef::new().hash(), 0xa8c7f832281a39c5);

        let def = CatalogDef::new()
            .with_aspect_def(person())
            .unwrap()
            .with_hierarchy_def(HierarchyDef::new("people", HierarchyType::EntitySet).unwrap())
            .unwrap();
        assert_eq!(def.hash(), 0xff05e9ecf4d697e8);

        let defaults = CatalogDef::new()
            .with_aspect_def(
                AspectDef::new(
                    "Sample",
                    [
                        PropertyDef::new("flag", PropertyType::Boolean)
                            .unwrap()
                            .with_default(true)
                            .unwrap(),
                        PropertyDef::build(
                            "tags",
                            PropertyType::String,
                            PropertyFlags::default().multivalued(),
                            Some(PropertyValue::array(["x", "y"])),
                        )
                        .unwrap(),
                        PropertyDef::build(
                            "note",
                            PropertyType::Blob,
                            PropertyFlags::default().nullable().removable(),
                            Some(PropertyValue::Null),
                        )
                        .unwrap(),
                    ],
                )
                .unwrap(),
            )
            .unwrap();
        assert_eq!(defaults.hash(), 0x251e330be076418a);
    }

    #[test]
    fn test_name_collisions() {
        let def = CatalogDef::new().with_aspect_def(person()).unwrap();
        // Identical def again is idempotent.
        let def = def.with_aspect_def(person()).unwrap();
        let other_person = AspectDef::new("Person", Vec::<PropertyDef>::new()).unwrap();
        let shadow = HierarchyDef::new("Person", HierarchyType::EntityList).unwrap();
        assert!(matches!(
            def.clone().with_aspect_def(other_person),
            Err(Error::DuplicateName { .. })
        ));
        assert!(matches!(
            def.clone().with_hierarchy_def(shadow),
            Err(Error::DuplicateName { .. })
        ));
        assert!(matches!(
            def.clone()
                .with_hierarchy_def(HierarchyDef::new("map", HierarchyType::AspectMap).unwrap()),
            Err(Error::InvalidData(_))
        ));
        assert!(matches!(
            def.with_hierarchy_def(
                HierarchyDef::new("cheap.hierarchies", HierarchyType::EntityDirectory).unwrap()
            ),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn test_canonical_and_json_round_trip() {
        let def = CatalogDef::new()
            .with_aspect_def(person())
            .unwrap()
            .with_hierarchy_def(HierarchyDef::new("queue", HierarchyType::EntityList).unwrap())
            .unwrap();
        let decoded = CatalogDef::from_canonical_bytes(&def.to_canonical_bytes()).unwrap();
        assert_eq!(decoded.hash(), def.hash());

        let json = serde_json::to_string(&def).unwrap();
        let back: CatalogDef = serde_json::from_str(&json).unwrap();
        assert_eq!(back.hash(), def.hash());
        assert_eq!(
            back.aspect_def("Person").map(AspectDef::id),
            def.aspect_def("Person").map(AspectDef::id)
        );
    }
}
