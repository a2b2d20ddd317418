//! Aspect definitions.

use std::collections::HashSet;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use super::PropertyDef;
use crate::canonical::{self, CanonicalReader, CanonicalWriter};
use crate::error::Error;
use crate::hash::fnv1a64;
use crate::model::EntityId;

const READABLE: u8 = 0x01;
const WRITABLE: u8 = 0x02;
const CAN_ADD_PROPERTIES: u8 = 0x04;
const CAN_REMOVE_PROPERTIES: u8 = 0x08;

/// Access and evolution flags of an aspect definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AspectFlags {
    /// Aspects of this type may be read.
    pub readable: bool,
    /// Aspects of this type may be changed after creation.
    pub writable: bool,
    /// Properties may be added to the definition later.
    pub can_add_properties: bool,
    /// Properties may be removed from the definition later.
    pub can_remove_properties: bool,
}

impl Default for AspectFlags {
    fn default() -> Self {
        Self {
            readable: true,
            writable: true,
            can_add_properties: false,
            can_remove_properties: false,
        }
    }
}

impl AspectFlags {
    /// Forbid changes to aspects after creation.
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    /// Allow adding properties.
    pub fn extensible(mut self) -> Self {
        self.can_add_properties = true;
        self
    }

    /// Allow removing properties.
    pub fn reducible(mut self) -> Self {
        self.can_remove_properties = true;
        self
    }

    /// The canonical flag byte.
    pub fn bits(self) -> u8 {
        let mut bits = 0;
        if self.readable {
            bits |= READABLE;
        }
        if self.writable {
            bits |= WRITABLE;
        }
        if self.can_add_properties {
            bits |= CAN_ADD_PROPERTIES;
        }
        if self.can_remove_properties {
            bits |= CAN_REMOVE_PROPERTIES;
        }
        bits
    }

    /// Parse a canonical flag byte, rejecting unknown bits.
    pub fn from_bits(bits: u8) -> Result<Self, Error> {
        let known = READABLE | WRITABLE | CAN_ADD_PROPERTIES | CAN_REMOVE_PROPERTIES;
        if bits & !known != 0 {
            return Err(Error::Deserialization(format!(
                "unknown aspect flag bits {:#04x}",
                bits & !known
            )));
        }
        Ok(Self {
            readable: bits & READABLE != 0,
            writable: bits & WRITABLE != 0,
            can_add_properties: bits & CAN_ADD_PROPERTIES != 0,
            can_remove_properties: bits & CAN_REMOVE_PROPERTIES != 0,
        })
    }
}

/// Named schema grouping an ordered set of property definitions.
///
/// The id is a local identity. Two definitions are equal when their
/// canonical forms are equal, whatever their ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "AspectDefWire", into = "AspectDefWire")]
pub struct AspectDef {
    id: EntityId,
    name: String,
    properties: Vec<PropertyDef>,
    flags: AspectFlags,
    hash: OnceLock<u64>,
}

impl AspectDef {
    /// Create a definition with a fresh id and default flags.
    pub fn new(
        name: impl Into<String>,
        properties: impl IntoIterator<Item = PropertyDef>,
    ) -> Result<Self, Error> {
        Self::build(EntityId::new(), name, properties, AspectFlags::default())
    }

    /// Create a fully specified definition.
    pub fn build(
        id: EntityId,
        name: impl Into<String>,
        properties: impl IntoIterator<Item = PropertyDef>,
        flags: AspectFlags,
    ) -> Result<Self, Error> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidData("aspect def name must not be empty".to_string()));
        }
        let properties: Vec<PropertyDef> = properties.into_iter().collect();
        let mut seen = HashSet::with_capacity(properties.len());
        for property in &properties {
            if !seen.insert(property.name()) {
                return Err(Error::duplicate("property", property.name()));
            }
        }
        Ok(Self {
            id,
            name,
            properties,
            flags,
            hash: OnceLock::new(),
        })
    }

    /// Replace the flags.
    pub fn with_flags(self, flags: AspectFlags) -> Self {
        Self {
            flags,
            hash: OnceLock::new(),
            ..self
        }
    }

    /// Rebind to another id. Ids are not part of the canonical form.
    pub fn with_id(mut self, id: EntityId) -> Self {
        self.id = id;
        self
    }

    /// Entity id of this def.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Aspect def name, unique within a catalog.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Access and mutability flags.
    pub fn flags(&self) -> AspectFlags {
        self.flags
    }

    /// Whether aspects of this def may be read.
    pub fn is_readable(&self) -> bool {
        self.flags.readable
    }

    /// Whether aspects of this def may be written.
    pub fn is_writable(&self) -> bool {
        self.flags.writable
    }

    /// Whether properties may be added to the def later.
    pub fn can_add_properties(&self) -> bool {
        self.flags.can_add_properties
    }

    /// Whether properties may be removed from the def later.
    pub fn can_remove_properties(&self) -> bool {
        self.flags.can_remove_properties
    }

    /// Properties in declaration order.
    pub fn properties(&self) -> &[PropertyDef] {
        &self.properties
    }

    /// Look up a property by name.
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name() == name)
    }

    /// Canonical FNV-1a hash, computed once.
    pub fn hash(&self) -> u64 {
        *self.hash.get_or_init(|| fnv1a64(&self.to_canonical_bytes()))
    }

    /// Same name and same canonical hash.
    pub fn same_definition(&self, other: &AspectDef) -> bool {
        self.name == other.name && self.hash() == other.hash()
    }

    /// Encode to the canonical byte form.
    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        let mut writer = CanonicalWriter::new();
        canonical::encode_aspect_def(&mut writer, self);
        writer.into_bytes()
    }

    /// Decode the canonical byte form under a fresh id. Properties come back
    /// in name order.
    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut reader = CanonicalReader::new(bytes);
        let def = canonical::decode_aspect_def(&mut reader)?;
        reader.finish()?;
        Ok(def)
    }

    /// A copy with one more property. Keeps the id.
    pub fn with_added_property(&self, property: PropertyDef) -> Result<Self, Error> {
        if !self.flags.can_add_properties {
            return Err(Error::AccessDenied(format!(
                "aspect def {} does not allow adding properties",
                self.name
            )));
        }
        let properties = self.properties.iter().cloned().chain(std::iter::once(property));
        Self::build(self.id, self.name.clone(), properties, self.flags)
    }

    /// A copy without the named property. Keeps the id.
    pub fn without_property(&self, name: &str) -> Result<Self, Error> {
        if !self.flags.can_remove_properties {
            return Err(Error::AccessDenied(format!(
                "aspect def {} does not allow removing properties",
                self.name
            )));
        }
        if self.property(name).is_none() {
            return Err(Error::not_found("property", name));
        }
        let properties = self.properties.iter().filter(|p| p.name() != name).cloned();
        Self::build(self.id, self.name.clone(), properties, self.flags)
    }
}

impl PartialEq for AspectDef {
    fn eq(&self, other: &Self) -> bool {
        self.to_canonical_bytes() == other.to_canonical_bytes()
    }
}

fn default_true() -> bool {
    true
}

#[derive(Serialize, Deserialize)]
struct AspectDefWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<EntityId>,
    name: String,
    #[serde(default = "default_true")]
    readable: bool,
    #[serde(default = "default_true")]
    writable: bool,
    #[serde(default)]
    can_add_properties: bool,
    #[serde(default)]
    can_remove_properties: bool,
    #[serde(default)]
    properties: Vec<PropertyDef>,
}

impl From<AspectDef> for AspectDefWire {
    fn from(def: AspectDef) -> Self {
        Self {
            id: Some(def.id),
            name: def.name,
            readable: def.flags.readable,
            writable: def.flags.writable,
            can_add_properties: def.flags.can_add_properties,
            can_remove_properties: def.flags.can_remove_properties,
            properties: def.properties,
        }
    }
}

impl TryFrom<AspectDefWire> for AspectDef {
    type Error = Error;

    fn try_from(wire: AspectDefWire) -> Result<Self, Self::Error> {
        let flags = AspectFlags {
            readable: wire.readable,
            writable: wire.writable,
            can_add_properties: wire.can_add_properties,
            can_remove_properties: wire.can_remove_properties,
        };
        AspectDef::build(wire.id.unwrap_or_default(), wire.name, wire.properties, flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::def::{PropertyFlags, PropertyType};

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

    #[test]
    fn test_duplicate_property_rejected() {
        let result = AspectDef::new(
            "Person",
            [
                PropertyDef::new("age", PropertyType::Int).unwrap(),
                PropertyDef::new("age", PropertyType::String).unwrap(),
            ],
        );
        assert!(matches!(result, Err(Error::DuplicateName { kind: "property", .. })));
    }

    #[test]
    fn test_equality_ignores_id_and_order() {
        let a = person();
        let b = AspectDef::new(
            "Person",
            [
                PropertyDef::new("age", PropertyType::Int).unwrap(),
                PropertyDef::new("firstName", PropertyType::String).unwrap(),
            ],
        )
        .unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a, b);
        assert_eq!(a.hash(), b.hash());
        assert!(a.same_definition(&b));
    }

    #[test]
    fn test_flags_change_hash() {
        let a = person();
        let b = person().with_flags(AspectFlags::default().read_only());
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_canonical_round_trip() {
        let def = AspectDef::new(
            "Mixed",
            [
                PropertyDef::new("name", PropertyType::String).unwrap(),
                PropertyDef::build(
                    "scores",
                    PropertyType::Double,
                    PropertyFlags::default().multivalued().removable(),
                    Some(crate::model::PropertyValue::array([1.5, 2.0])),
                )
                .unwrap(),
                PropertyDef::build(
                    "token",
                    PropertyType::Uuid,
                    PropertyFlags::default().nullable().read_only(),
                    Some(crate::model::PropertyValue::Null),
                )
                .unwrap(),
            ],
        )
        .unwrap();
        let decoded = AspectDef::from_canonical_bytes(&def.to_canonical_bytes()).unwrap();
        assert_eq!(decoded.hash(), def.hash());
        assert_eq!(decoded.properties().len(), 3);

        let mut bytes = def.to_canonical_bytes();
        bytes.push(0);
        assert!(matches!(
            AspectDef::from_canonical_bytes(&bytes),
            Err(Error::Deserialization(_))
        ));
        assert!(AspectDef::from_canonical_bytes(&bytes[..bytes.len() - 4]).is_err());
    }

    #[test]
    fn test_schema_evolution_flags() {
        let def = person();
        let extra = PropertyDef::new("email", PropertyType::String).unwrap();
        assert!(matches!(
            def.with_added_property(extra.clone()),
            Err(Error::AccessDenied(_))
        ));

        let open = def.with_flags(AspectFlags::default().extensible().reducible());
        let grown = open.with_added_property(extra).unwrap();
        assert_eq!(grown.id(), open.id());
        assert_eq!(grown.properties().len(), 3);
        assert_ne!(grown.hash(), open.hash());

        let shrunk = grown.without_property("age").unwrap();
        assert!(shrunk.property("age").is_none());
        assert!(matches!(
            shrunk.without_property("age"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_json_wire_form() {
        let def = person();
        let json = serde_json::to_string(&def).unwrap();
        let back: AspectDef = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id(), def.id());
        assert_eq!(back, def);
    }
}
