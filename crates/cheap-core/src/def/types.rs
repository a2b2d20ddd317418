//! Closed enumerations shared by the definition registry.
//!
//! The ordinals returned by `code()` are part of the canonical byte layout and
//! of the persisted `type_code` column. New variants may only be appended.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Property data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyType {
    /// UTF-8 string.
    String,
    /// 64-bit signed integer.
    Int,
    /// 64-bit floating point (finite values only).
    Double,
    /// Boolean value.
    Boolean,
    /// UUID (128-bit identifier).
    Uuid,
    /// Binary data.
    Blob,
}

impl PropertyType {
    /// All property types in ordinal order.
    pub const ALL: [PropertyType; 6] = [
        PropertyType::String,
        PropertyType::Int,
        PropertyType::Double,
        PropertyType::Boolean,
        PropertyType::Uuid,
        PropertyType::Blob,
    ];

    /// The fixed type code.
    pub fn code(self) -> u8 {
        match self {
            PropertyType::String => 0,
            PropertyType::Int => 1,
            PropertyType::Double => 2,
            PropertyType::Boolean => 3,
            PropertyType::Uuid => 4,
            PropertyType::Blob => 5,
        }
    }

    /// Resolve a type code, rejecting unknown codes.
    pub fn from_code(code: u8) -> Result<Self, Error> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or_else(|| Error::Deserialization(format!("unknown property type code {}", code)))
    }

    /// The canonical upper-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            PropertyType::String => "STRING",
            PropertyType::Int => "INT",
            PropertyType::Double => "DOUBLE",
            PropertyType::Boolean => "BOOLEAN",
            PropertyType::Uuid => "UUID",
            PropertyType::Blob => "BLOB",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::Deserialization(format!("unknown property type {:?}", s)))
    }
}

/// The four hierarchy variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HierarchyType {
    /// Ordered sequence, duplicates allowed.
    EntityList,
    /// Unordered membership.
    EntitySet,
    /// Unique string key to entity.
    EntityDirectory,
    /// System-owned index of every aspect of one AspectDef.
    AspectMap,
}

impl HierarchyType {
    /// All hierarchy types in ordinal order.
    pub const ALL: [HierarchyType; 4] = [
        HierarchyType::EntityList,
        HierarchyType::EntitySet,
        HierarchyType::EntityDirectory,
        HierarchyType::AspectMap,
    ];

    /// The fixed type ordinal.
    pub fn code(self) -> u8 {
        match self {
            HierarchyType::EntityList => 0,
            HierarchyType::EntitySet => 1,
            HierarchyType::EntityDirectory => 2,
            HierarchyType::AspectMap => 3,
        }
    }

    /// Resolve a type ordinal, rejecting unknown ordinals.
    pub fn from_code(code: u8) -> Result<Self, Error> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or_else(|| Error::Deserialization(format!("unknown hierarchy type code {}", code)))
    }

    /// The canonical upper-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            HierarchyType::EntityList => "ENTITY_LIST",
            HierarchyType::EntitySet => "ENTITY_SET",
            HierarchyType::EntityDirectory => "ENTITY_DIRECTORY",
            HierarchyType::AspectMap => "ASPECT_MAP",
        }
    }
}

impl fmt::Display for HierarchyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HierarchyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::Deserialization(format!("unknown hierarchy type {:?}", s)))
    }
}

/// Role of a catalog relative to its upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Species {
    /// Authoritative origin of its data.
    #[default]
    Source,
    /// Write-only destination.
    Sink,
    /// Read-only copy of an upstream.
    Mirror,
    /// Partial, evictable copy of an upstream.
    Cache,
    /// Writable copy that does not track its upstream.
    Clone,
    /// Writable copy that diverged from its upstream.
    Fork,
}

impl Species {
    /// All species.
    pub const ALL: [Species; 6] = [
        Species::Source,
        Species::Sink,
        Species::Mirror,
        Species::Cache,
        Species::Clone,
        Species::Fork,
    ];

    /// The canonical upper-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Species::Source => "SOURCE",
            Species::Sink => "SINK",
            Species::Mirror => "MIRROR",
            Species::Cache => "CACHE",
            Species::Clone => "CLONE",
            Species::Fork => "FORK",
        }
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Species {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| Error::Deserialization(format!("unknown species {:?}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_codes_are_stable() {
        let codes: Vec<u8> = PropertyType::ALL.iter().map(|t| t.code()).collect();
        assert_eq!(codes, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(HierarchyType::AspectMap.code(), 3);
    }

    #[test]
    fn test_unknown_codes_rejected() {
        assert!(PropertyType::from_code(6).is_err());
        assert!(HierarchyType::from_code(4).is_err());
        assert_eq!(PropertyType::from_code(2).unwrap(), PropertyType::Double);
    }

    #[test]
    fn test_names_round_trip() {
        for ty in PropertyType::ALL {
            assert_eq!(ty.as_str().parse::<PropertyType>().unwrap(), ty);
        }
        assert!("FLOAT".parse::<PropertyType>().is_err());
        assert_eq!("cache".parse::<Species>().unwrap(), Species::Cache);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&PropertyType::Int).unwrap();
        assert_eq!(json, "\"INT\"");
        let json = serde_json::to_string(&HierarchyType::EntityDirectory).unwrap();
        assert_eq!(json, "\"ENTITY_DIRECTORY\"");
        assert!(serde_json::from_str::<PropertyType>("\"DECIMAL\"").is_err());
    }
}
