//! Aspect instances.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{EntityId, PropertyValue};
use crate::def::{AspectDef, PropertyDef};
use crate::error::Error;

/// An instance of an aspect def attached to one entity.
///
/// Every stored value has passed its property's type, nullable and
/// multivalued check.
#[derive(Debug, Clone)]
pub struct Aspect {
    entity_id: EntityId,
    def: Arc<AspectDef>,
    values: BTreeMap<String, PropertyValue>,
}

impl Aspect {
    /// Create an aspect from the supplied values.
    ///
    /// Omitted properties take their default, or null when nullable.
    pub fn new<K, V>(
        entity_id: EntityId,
        def: Arc<AspectDef>,
        values: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Self, Error>
    where
        K: Into<String>,
        V: Into<PropertyValue>,
    {
        let mut supplied = BTreeMap::new();
        for (name, value) in values {
            let name = name.into();
            let value = value.into();
            lookup(&def, &name)?.check_value(&value)?;
            supplied.insert(name, value);
        }

        for property in def.properties() {
            if supplied.contains_key(property.name()) {
                continue;
            }
            let filled = match property.default_value() {
                Some(default) => default.clone(),
                None if property.is_nullable() => PropertyValue::Null,
                None => {
                    return Err(Error::TypeMismatch(format!(
                        "missing required property {} of {}",
                        property.name(),
                        def.name()
                    )))
                }
            };
            supplied.insert(property.name().to_string(), filled);
        }

        Ok(Self {
            entity_id,
            def,
            values: supplied,
        })
    }

    /// Rebuild a stored aspect. Values are checked, missing ones stay unset.
    pub(crate) fn restore(
        entity_id: EntityId,
        def: Arc<AspectDef>,
        values: BTreeMap<String, PropertyValue>,
    ) -> Result<Self, Error> {
        for (name, value) in &values {
            lookup(&def, name)?.check_value(value)?;
        }
        Ok(Self {
            entity_id,
            def,
            values,
        })
    }

    /// Entity this aspect is attached to.
    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    /// Def the values conform to.
    pub fn def(&self) -> &Arc<AspectDef> {
        &self.def
    }

    /// Read a property value.
    pub fn get(&self, name: &str) -> Result<&PropertyValue, Error> {
        let property = lookup(&self.def, name)?;
        if !self.def.is_readable() || !property.is_readable() {
            return Err(Error::AccessDenied(format!(
                "property {} of {} is not readable",
                name,
                self.def.name()
            )));
        }
        self.values
            .get(name)
            .ok_or_else(|| Error::not_found("property value", name))
    }

    /// Change a property value, returning the previous one.
    pub fn set(
        &mut self,
        name: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<Option<PropertyValue>, Error> {
        let property = lookup(&self.def, name)?;
        if !self.def.is_writable() || !property.is_writable() {
            return Err(Error::AccessDenied(format!(
                "property {} of {} is not writable",
                name,
                self.def.name()
            )));
        }
        let value = value.into();
        property.check_value(&value)?;
        Ok(self.values.insert(name.to_string(), value))
    }

    /// Remove a property value, returning it.
    pub fn unset(&mut self, name: &str) -> Result<Option<PropertyValue>, Error> {
        let property = lookup(&self.def, name)?;
        if !property.is_removable() {
            return Err(Error::AccessDenied(format!(
                "property {} of {} is not removable",
                name,
                self.def.name()
            )));
        }
        Ok(self.values.remove(name))
    }

    /// Whether a value is present for the property.
    pub fn is_set(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// All present values in name order, ignoring readability.
    pub fn values(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl PartialEq for Aspect {
    fn eq(&self, other: &Self) -> bool {
        self.entity_id == other.entity_id
            && self.def.same_definition(&other.def)
            && self.values == other.values
    }
}

fn lookup<'a>(def: &'a AspectDef, name: &str) -> Result<&'a PropertyDef, Error> {
    def.property(name)
        .ok_or_else(|| Error::not_found("property", format!("{}.{}", def.name(), name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::def::{AspectFlags, PropertyFlags, PropertyType};

    fn person() -> Arc<AspectDef> {
        Arc::new(
            AspectDef::new(
                "Person",
                [
                    PropertyDef::new("firstName", PropertyType::String).unwrap(),
                    PropertyDef::new("age", PropertyType::Int).unwrap(),
                    PropertyDef::build(
                        "nick",
                        PropertyType::String,
                        PropertyFlags::default().nullable().removable(),
                        None,
                    )
                    .unwrap(),
                    PropertyDef::build(
                        "tags",
                        PropertyType::String,
                        PropertyFlags::default().multivalued(),
                        Some(PropertyValue::array(Vec::<String>::new())),
                    )
                    .unwrap(),
                    PropertyDef::build(
                        "ssn",
                        PropertyType::String,
                        PropertyFlags::default().hidden().read_only().nullable(),
                        None,
                    )
                    .unwrap(),
                ],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_construction_fills_defaults() {
        let aspect = Aspect::new(
            EntityId::new(),
            person(),
            [("firstName", PropertyValue::from("Ann")), ("age", 30i64.into())],
        )
        .unwrap();
        assert_eq!(aspect.get("firstName").unwrap().as_str(), Some("Ann"));
        assert_eq!(aspect.get("age").unwrap().as_int(), Some(30));
        assert!(aspect.get("nick").unwrap().is_null());
        assert_eq!(aspect.get("tags").unwrap().as_array(), Some(&[][..]));
    }

    #[test]
    fn test_construction_validates() {
        let missing = Aspect::new(EntityId::new(), person(), [("firstName", "Ann")]);
        assert!(matches!(missing, Err(Error::TypeMismatch(_))));

        let wrong_type = Aspect::new(
            EntityId::new(),
            person(),
            [("firstName", PropertyValue::from("Ann")), ("age", "30".into())],
        );
        assert!(matches!(wrong_type, Err(Error::TypeMismatch(_))));

        let unknown = Aspect::new(
            EntityId::new(),
            person(),
            [("firstName", PropertyValue::from("Ann")), ("height", 1.8.into())],
        );
        assert!(matches!(unknown, Err(Error::NotFound { .. })));

        let bare_scalar = Aspect::new(
            EntityId::new(),
            person(),
            [
                ("firstName", PropertyValue::from("Ann")),
                ("age", 30i64.into()),
                ("tags", "solo".into()),
            ],
        );
        assert!(matches!(bare_scalar, Err(Error::TypeMismatch(_))));
    }

    #[test]
    fn test_set_and_unset() {
        let mut aspect = Aspect::new(
            EntityId::new(),
            person(),
            [("firstName", PropertyValue::from("Ann")), ("age", 30i64.into())],
        )
        .unwrap();

        let previous = aspect.set("age", 31i64).unwrap();
        assert_eq!(previous.and_then(|v| v.as_int()), Some(30));
        assert!(matches!(
            aspect.set("age", PropertyValue::Null),
            Err(Error::TypeMismatch(_))
        ));
        assert!(matches!(aspect.set("ssn", "x"), Err(Error::AccessDenied(_))));
        assert!(matches!(aspect.get("ssn"), Err(Error::AccessDenied(_))));

        assert!(matches!(aspect.unset("age"), Err(Error::AccessDenied(_))));
        assert!(aspect.unset("nick").unwrap().is_some());
        assert!(matches!(aspect.get("nick"), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_read_only_aspect_def() {
        let def = Arc::new(
            AspectDef::new(
                "Stamp",
                [PropertyDef::new("at", PropertyType::Int).unwrap()],
            )
            .unwrap()
            .with_flags(AspectFlags::default().read_only()),
        );
        let mut aspect = Aspect::new(EntityId::new(), def, [("at", 1i64)]).unwrap();
        assert!(matches!(aspect.set("at", 2i64), Err(Error::AccessDenied(_))));
        assert_eq!(aspect.get("at").unwrap().as_int(), Some(1));
    }
}
