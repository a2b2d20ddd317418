//! Typed property values.
//!
//! The closed [`PropertyType`] enumeration drives the value shape: a value is
//! null, a single scalar, or an array of scalars of one type. The JSON forms
//! here are the canonical `value_json` column encoding.

use serde_json::{Number, Value as Json};
use uuid::Uuid;

use crate::def::PropertyType;
use crate::error::Error;

/// A single typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// UTF-8 string.
    String(String),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Double(f64),
    /// Boolean value.
    Boolean(bool),
    /// UUID.
    Uuid(Uuid),
    /// Binary data.
    Blob(Vec<u8>),
}

/// The value held by one property of an aspect.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Explicit null.
    Null,
    /// A single scalar (single-valued properties).
    Scalar(ScalarValue),
    /// A sequence of scalars (multivalued properties).
    Array(Vec<ScalarValue>),
}

impl ScalarValue {
    /// The property type this scalar belongs to.
    pub fn property_type(&self) -> PropertyType {
        match self {
            ScalarValue::String(_) => PropertyType::String,
            ScalarValue::Int(_) => PropertyType::Int,
            ScalarValue::Double(_) => PropertyType::Double,
            ScalarValue::Boolean(_) => PropertyType::Boolean,
            ScalarValue::Uuid(_) => PropertyType::Uuid,
            ScalarValue::Blob(_) => PropertyType::Blob,
        }
    }

    /// Check the scalar against a property type.
    fn check(&self, ty: PropertyType) -> Result<(), String> {
        if self.property_type() != ty {
            return Err(format!("expected {}, found {}", ty, self.property_type()));
        }
        if let ScalarValue::Double(d) = self {
            if !d.is_finite() {
                return Err(format!("non-finite DOUBLE {}", d));
            }
        }
        Ok(())
    }

    /// Canonical JSON form.
    pub fn to_json(&self) -> Json {
        match self {
            ScalarValue::String(s) => Json::String(s.clone()),
            ScalarValue::Int(i) => Json::Number((*i).into()),
            // Stored doubles are finite; see `check`.
            ScalarValue::Double(d) => Number::from_f64(*d).map(Json::Number).unwrap_or(Json::Null),
            ScalarValue::Boolean(b) => Json::Bool(*b),
            ScalarValue::Uuid(u) => Json::String(u.hyphenated().to_string()),
            ScalarValue::Blob(b) => Json::String(hex::encode(b)),
        }
    }

    /// Decode the canonical JSON form for the given type.
    pub fn from_json(ty: PropertyType, json: &Json) -> Result<Self, Error> {
        let mismatch = || Error::Deserialization(format!("expected {} value, found {}", ty, json));
        let value = match ty {
            PropertyType::String => {
                ScalarValue::String(json.as_str().ok_or_else(mismatch)?.to_string())
            }
            PropertyType::Int => ScalarValue::Int(json.as_i64().ok_or_else(mismatch)?),
            PropertyType::Double => ScalarValue::Double(json.as_f64().ok_or_else(mismatch)?),
            PropertyType::Boolean => ScalarValue::Boolean(json.as_bool().ok_or_else(mismatch)?),
            PropertyType::Uuid => {
                let text = json.as_str().ok_or_else(mismatch)?;
                ScalarValue::Uuid(
                    Uuid::parse_str(text).map_err(|e| Error::Deserialization(e.to_string()))?,
                )
            }
            PropertyType::Blob => {
                let text = json.as_str().ok_or_else(mismatch)?;
                ScalarValue::Blob(
                    hex::decode(text).map_err(|e| Error::Deserialization(e.to_string()))?,
                )
            }
        };
        Ok(value)
    }
}

impl PropertyValue {
    /// Build an array value from anything convertible to scalars.
    pub fn array<T: Into<ScalarValue>>(items: impl IntoIterator<Item = T>) -> Self {
        PropertyValue::Array(items.into_iter().map(Into::into).collect())
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    /// Get the scalar, if single-valued.
    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            PropertyValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Get the elements, if multivalued.
    pub fn as_array(&self) -> Option<&[ScalarValue]> {
        match self {
            PropertyValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Scalar(ScalarValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Scalar(ScalarValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as f64.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            PropertyValue::Scalar(ScalarValue::Double(d)) => Some(*d),
            _ => None,
        }
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Scalar(ScalarValue::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    /// Check the value against a property's type, nullable and multivalued
    /// contract. Returns a description of the first violation.
    pub(crate) fn check(
        &self,
        ty: PropertyType,
        nullable: bool,
        multivalued: bool,
    ) -> Result<(), String> {
        match (self, multivalued) {
            (PropertyValue::Null, _) if nullable => Ok(()),
            (PropertyValue::Null, _) => Err("null for a non-nullable property".to_string()),
            (PropertyValue::Scalar(s), false) => s.check(ty),
            (PropertyValue::Array(items), true) => {
                items.iter().try_for_each(|s| s.check(ty))
            }
            (PropertyValue::Scalar(_), true) => {
                Err("scalar for a multivalued property".to_string())
            }
            (PropertyValue::Array(_), false) => {
                Err("array for a single-valued property".to_string())
            }
        }
    }

    /// Canonical JSON form.
    pub fn to_json(&self) -> Json {
        match self {
            PropertyValue::Null => Json::Null,
            PropertyValue::Scalar(s) => s.to_json(),
            PropertyValue::Array(items) => {
                Json::Array(items.iter().map(ScalarValue::to_json).collect())
            }
        }
    }

    /// Decode the canonical JSON form for a property shape.
    pub fn from_json(ty: PropertyType, multivalued: bool, json: &Json) -> Result<Self, Error> {
        match (json, multivalued) {
            (Json::Null, _) => Ok(PropertyValue::Null),
            (Json::Array(items), true) => items
                .iter()
                .map(|item| ScalarValue::from_json(ty, item))
                .collect::<Result<Vec<_>, _>>()
                .map(PropertyValue::Array),
            (Json::Array(_), false) => Err(Error::Deserialization(
                "array for a single-valued property".to_string(),
            )),
            (_, true) => Err(Error::Deserialization(
                "scalar for a multivalued property".to_string(),
            )),
            (other, false) => ScalarValue::from_json(ty, other).map(PropertyValue::Scalar),
        }
    }

    /// Encode as the `value_json` column text.
    pub fn to_value_json(&self) -> Result<String, Error> {
        serde_json::to_string(&self.to_json()).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Decode `value_json` column text.
    pub fn from_value_json(ty: PropertyType, multivalued: bool, text: &str) -> Result<Self, Error> {
        let json: Json =
            serde_json::from_str(text).map_err(|e| Error::Deserialization(e.to_string()))?;
        Self::from_json(ty, multivalued, &json)
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ScalarValue {
                fn from(v: $ty) -> Self {
                    ScalarValue::$variant(v.into())
                }
            }

            impl From<$ty> for PropertyValue {
                fn from(v: $ty) -> Self {
                    PropertyValue::Scalar(ScalarValue::$variant(v.into()))
                }
            }
        )*
    };
}

impl_from_scalar! {
    String => String,
    &str => String,
    i64 => Int,
    i32 => Int,
    f64 => Double,
    bool => Boolean,
    Uuid => Uuid,
    Vec<u8> => Blob,
}

impl From<ScalarValue> for PropertyValue {
    fn from(v: ScalarValue) -> Self {
        PropertyValue::Scalar(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_check_shapes() {
        let name = PropertyValue::from("Ann");
        assert!(name.check(PropertyType::String, false, false).is_ok());
        assert!(name.check(PropertyType::Int, false, false).is_err());
        assert!(name.check(PropertyType::String, false, true).is_err());

        let tags = PropertyValue::array(["a", "b"]);
        assert!(tags.check(PropertyType::String, false, true).is_ok());
        assert!(tags.check(PropertyType::String, false, false).is_err());

        assert!(PropertyValue::Null.check(PropertyType::Int, true, false).is_ok());
        assert!(PropertyValue::Null.check(PropertyType::Int, false, false).is_err());
    }

    #[test]
    fn test_non_finite_double_rejected() {
        let nan = PropertyValue::from(f64::NAN);
        assert!(nan.check(PropertyType::Double, false, false).is_err());
        let inf = PropertyValue::array([1.0, f64::INFINITY]);
        assert!(inf.check(PropertyType::Double, false, true).is_err());
    }

    #[test]
    fn test_canonical_json() {
        assert_eq!(PropertyValue::from(30i64).to_json(), json!(30));
        assert_eq!(PropertyValue::from(vec![0xdeu8, 0xad]).to_json(), json!("dead"));
        assert_eq!(PropertyValue::array([1i64, 2]).to_json(), json!([1, 2]));
        assert_eq!(PropertyValue::Null.to_value_json().unwrap(), "null");
    }

    #[test]
    fn test_from_json_uses_declared_type() {
        let uuid = Uuid::new_v4();
        let decoded =
            PropertyValue::from_json(PropertyType::Uuid, false, &json!(uuid.to_string())).unwrap();
        assert_eq!(decoded, PropertyValue::from(uuid));

        // Integers are valid doubles, strings are not.
        let decoded = PropertyValue::from_json(PropertyType::Double, false, &json!(2)).unwrap();
        assert_eq!(decoded.as_double(), Some(2.0));
        assert!(PropertyValue::from_json(PropertyType::Double, false, &json!("2")).is_err());

        assert!(PropertyValue::from_json(PropertyType::Int, true, &json!(1)).is_err());
        assert!(PropertyValue::from_json(PropertyType::Int, false, &json!([1])).is_err());
    }

    #[test]
    fn test_value_json_text() {
        let value = PropertyValue::array([true, false]);
        let text = value.to_value_json().unwrap();
        assert_eq!(text, "[true,false]");
        let decoded = PropertyValue::from_value_json(PropertyType::Boolean, true, &text).unwrap();
        assert_eq!(decoded, value);
    }
}
