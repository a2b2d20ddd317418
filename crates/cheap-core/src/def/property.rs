//! Property definitions.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as Json;

use super::PropertyType;
use crate::error::Error;
use crate::model::PropertyValue;

const READABLE: u8 = 0x01;
const WRITABLE: u8 = 0x02;
const NULLABLE: u8 = 0x04;
const REMOVABLE: u8 = 0x08;
const MULTIVALUED: u8 = 0x10;

/// Access and shape flags of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyFlags {
    /// Values may be read.
    pub readable: bool,
    /// Values may be changed after the aspect is created.
    pub writable: bool,
    /// Null is a legal value.
    pub nullable: bool,
    /// The value may be unset.
    pub removable: bool,
    /// The value is a sequence of scalars.
    pub multivalued: bool,
}

impl Default for PropertyFlags {
    fn default() -> Self {
        Self {
            readable: true,
            writable: true,
            nullable: false,
            removable: false,
            multivalued: false,
        }
    }
}

impl PropertyFlags {
    /// Allow null values.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Allow unsetting the value.
    pub fn removable(mut self) -> Self {
        self.removable = true;
        self
    }

    /// Make the value a sequence.
    pub fn multivalued(mut self) -> Self {
        self.multivalued = true;
        self
    }

    /// Forbid changes after creation.
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    /// Forbid reads.
    pub fn hidden(mut self) -> Self {
        self.readable = false;
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
        if self.nullable {
            bits |= NULLABLE;
        }
        if self.removable {
            bits |= REMOVABLE;
        }
        if self.multivalued {
            bits |= MULTIVALUED;
        }
        bits
    }

    /// Parse a canonical flag byte, rejecting unknown bits.
    pub fn from_bits(bits: u8) -> Result<Self, Error> {
        let known = READABLE | WRITABLE | NULLABLE | REMOVABLE | MULTIVALUED;
        if bits & !known != 0 {
            return Err(Error::Deserialization(format!(
                "unknown property flag bits {:#04x}",
                bits & !known
            )));
        }
        Ok(Self {
            readable: bits & READABLE != 0,
            writable: bits & WRITABLE != 0,
            nullable: bits & NULLABLE != 0,
            removable: bits & REMOVABLE != 0,
            multivalued: bits & MULTIVALUED != 0,
        })
    }
}

/// Immutable schema of one named, typed slot of an aspect.
///
/// A default of `Some(PropertyValue::Null)` is an explicit null default and
/// differs from having no default at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PropertyDefWire", into = "PropertyDefWire")]
pub struct PropertyDef {
    name: String,
    property_type: PropertyType,
    default_value: Option<PropertyValue>,
    flags: PropertyFlags,
}

impl PropertyDef {
    /// Create a property with default flags and no default value.
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Result<Self, Error> {
        Self::build(name, property_type, PropertyFlags::default(), None)
    }

    /// Create a fully specified property, validating the default against the
    /// type and flags.
    pub fn build(
        name: impl Into<String>,
        property_type: PropertyType,
        flags: PropertyFlags,
        default_value: Option<PropertyValue>,
    ) -> Result<Self, Error> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidData("property name must not be empty".to_string()));
        }
        let def = Self {
            name,
            property_type,
            default_value,
            flags,
        };
        if let Some(default) = &def.default_value {
            def.check_value(default)?;
        }
        Ok(def)
    }

    /// Replace the flags. The default value must still fit.
    pub fn with_flags(self, flags: PropertyFlags) -> Result<Self, Error> {
        Self::build(self.name, self.property_type, flags, self.default_value)
    }

    /// Set the default value.
    pub fn with_default(self, value: impl Into<PropertyValue>) -> Result<Self, Error> {
        Self::build(self.name, self.property_type, self.flags, Some(value.into()))
    }

    /// Drop the default value.
    pub fn without_default(mut self) -> Self {
        self.default_value = None;
        self
    }

    /// Property name, unique within its aspect def.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared value type.
    pub fn property_type(&self) -> PropertyType {
        self.property_type
    }

    /// Access and cardinality flags.
    pub fn flags(&self) -> PropertyFlags {
        self.flags
    }

    /// Value used when an aspect omits this property.
    pub fn default_value(&self) -> Option<&PropertyValue> {
        self.default_value.as_ref()
    }

    /// True when a default value is declared.
    pub fn has_default_value(&self) -> bool {
        self.default_value.is_some()
    }

    /// Whether values may be read.
    pub fn is_readable(&self) -> bool {
        self.flags.readable
    }

    /// Whether values may be written after creation.
    pub fn is_writable(&self) -> bool {
        self.flags.writable
    }

    /// Whether null is an accepted value.
    pub fn is_nullable(&self) -> bool {
        self.flags.nullable
    }

    /// Whether the property may be left out of an aspect.
    pub fn is_removable(&self) -> bool {
        self.flags.removable
    }

    /// Whether values are arrays of the declared type.
    pub fn is_multivalued(&self) -> bool {
        self.flags.multivalued
    }

    /// Check a value against the type, nullable and multivalued contract.
    pub fn check_value(&self, value: &PropertyValue) -> Result<(), Error> {
        value
            .check(self.property_type, self.flags.nullable, self.flags.multivalued)
            .map_err(|reason| Error::TypeMismatch(format!("property {}: {}", self.name, reason)))
    }
}

fn default_true() -> bool {
    true
}

/// Present-but-null deserializes to `Some(Json::Null)`; absent stays `None`.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Json>, D::Error> {
    Json::deserialize(deserializer).map(Some)
}

#[derive(Serialize, Deserialize)]
struct PropertyDefWire {
    name: String,
    #[serde(rename = "type")]
    property_type: PropertyType,
    #[serde(default = "default_true")]
    readable: bool,
    #[serde(default = "default_true")]
    writable: bool,
    #[serde(default)]
    nullable: bool,
    #[serde(default)]
    removable: bool,
    #[serde(default)]
    multivalued: bool,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    default_value: Option<Json>,
}

impl From<PropertyDef> for PropertyDefWire {
    fn from(def: PropertyDef) -> Self {
        Self {
            default_value: def.default_value.as_ref().map(PropertyValue::to_json),
            name: def.name,
            property_type: def.property_type,
            readable: def.flags.readable,
            writable: def.flags.writable,
            nullable: def.flags.nullable,
            removable: def.flags.removable,
            multivalued: def.flags.multivalued,
        }
    }
}

impl TryFrom<PropertyDefWire> for PropertyDef {
    type Error = Error;

    fn try_from(wire: PropertyDefWire) -> Result<Self, Self::Error> {
        let flags = PropertyFlags {
            readable: wire.readable,
            writable: wire.writable,
            nullable: wire.nullable,
            removable: wire.removable,
            multivalued: wire.multivalued,
        };
        let default_value = wire
            .default_value
            .map(|json| PropertyValue::from_json(wire.property_type, flags.multivalued, &json))
            .transpose()?;
        PropertyDef::build(wire.name, wire.property_type, flags, default_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let def = PropertyDef::new("firstName", PropertyType::String).unwrap();
        assert!(def.is_readable() && def.is_writable());
        assert!(!def.is_nullable() && !def.is_removable() && !def.is_multivalued());
        assert!(!def.has_default_value());
        assert_eq!(def.flags().bits(), 0x03);
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(
            PropertyDef::new("", PropertyType::Int),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn test_default_is_validated() {
        let def = PropertyDef::new("age", PropertyType::Int).unwrap();
        assert!(def.clone().with_default(30i64).is_ok());
        assert!(matches!(
            def.clone().with_default("thirty"),
            Err(Error::TypeMismatch(_))
        ));
        assert!(matches!(
            def.clone().with_default(PropertyValue::Null),
            Err(Error::TypeMismatch(_))
        ));

        let nullable = def.with_flags(PropertyFlags::default().nullable()).unwrap();
        let nullable = nullable.with_default(PropertyValue::Null).unwrap();
        assert_eq!(nullable.default_value(), Some(&PropertyValue::Null));

        // Dropping nullability invalidates the null default.
        assert!(nullable.with_flags(PropertyFlags::default()).is_err());
    }

    #[test]
    fn test_flag_bits() {
        let flags = PropertyFlags::default().nullable().multivalued().read_only();
        assert_eq!(flags.bits(), 0x01 | 0x04 | 0x10);
        assert_eq!(PropertyFlags::from_bits(flags.bits()).unwrap(), flags);
        assert!(PropertyFlags::from_bits(0x20).is_err());
    }

    #[test]
    fn test_json_wire_form() {
        let def: PropertyDef = serde_json::from_value(json!({
            "name": "tags",
            "type": "STRING",
            "multivalued": true,
            "default_value": ["a"]
        }))
        .unwrap();
        assert!(def.is_multivalued());
        assert_eq!(def.default_value(), Some(&PropertyValue::array(["a"])));

        let null_default: PropertyDef = serde_json::from_value(json!({
            "name": "nick",
            "type": "STRING",
            "nullable": true,
            "default_value": null
        }))
        .unwrap();
        assert_eq!(null_default.default_value(), Some(&PropertyValue::Null));
        let back = serde_json::to_value(&null_default).unwrap();
        assert_eq!(back["default_value"], json!(null));

        assert!(serde_json::from_value::<PropertyDef>(json!({
            "name": "x",
            "type": "DECIMAL"
        }))
        .is_err());
        assert!(serde_json::from_value::<PropertyDef>(json!({
            "name": "x",
            "type": "INT",
            "default_value": "1"
        }))
        .is_err());
    }
}
