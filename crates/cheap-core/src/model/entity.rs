//! Entity identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// Size of an entity ID in bytes (UUID).
pub const ENTITY_ID_SIZE: usize = 16;

/// Globally unique, opaque entity identifier.
///
/// Entities carry no data beyond this id; catalogs, aspect defs and
/// hierarchies are identified with the same type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Allocate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap raw UUID bytes.
    pub fn from_bytes(bytes: [u8; ENTITY_ID_SIZE]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Read an id from a slice of exactly 16 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        Uuid::from_slice(bytes)
            .map(Self)
            .map_err(|e| Error::Deserialization(format!("invalid entity id: {}", e)))
    }

    /// Raw UUID bytes.
    pub fn as_bytes(&self) -> &[u8; ENTITY_ID_SIZE] {
        self.0.as_bytes()
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for EntityId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0.hyphenated())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for EntityId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::Deserialization(format!("invalid entity id {:?}: {}", s, e)))
    }
}
