//! Hierarchy definitions.

use serde::{Deserialize, Serialize};

use super::HierarchyType;
use crate::error::Error;

/// Name and variant of a hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "HierarchyDefWire", into = "HierarchyDefWire")]
pub struct HierarchyDef {
    name: String,
    hierarchy_type: HierarchyType,
}

impl HierarchyDef {
    /// Create a hierarchy definition. The name must not be empty.
    pub fn new(name: impl Into<String>, hierarchy_type: HierarchyType) -> Result<Self, Error> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidData("hierarchy name must not be empty".to_string()));
        }
        Ok(Self {
            name,
            hierarchy_type,
        })
    }

    /// Hierarchy name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind of hierarchy to create.
    pub fn hierarchy_type(&self) -> HierarchyType {
        self.hierarchy_type
    }
}

#[derive(Serialize, Deserialize)]
struct HierarchyDefWire {
    name: String,
    #[serde(rename = "type")]
    hierarchy_type: HierarchyType,
}

impl From<HierarchyDef> for HierarchyDefWire {
    fn from(def: HierarchyDef) -> Self {
        Self {
            name: def.name,
            hierarchy_type: def.hierarchy_type,
        }
    }
}

impl TryFrom<HierarchyDefWire> for HierarchyDef {
    type Error = Error;

    fn try_from(wire: HierarchyDefWire) -> Result<Self, Self::Error> {
        HierarchyDef::new(wire.name, wire.hierarchy_type)
    }
}
