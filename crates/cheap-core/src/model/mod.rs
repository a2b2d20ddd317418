//! Entities, property values and aspects.

mod aspect;
mod entity;
mod value;

pub use aspect::Aspect;
pub use entity::{EntityId, ENTITY_ID_SIZE};
pub use value::{PropertyValue, ScalarValue};
