//! Canonical byte layout of definitions.
//!
//! This layout is the input of the definition hashes and must be identical in
//! every implementation. All integers are big-endian; strings are a `u32` byte
//! length followed by UTF-8 bytes.
//!
//! ```text
//! CatalogDef   := u32 count, AspectDef* (by name)  u32 count, HierarchyDef* (by name)
//! AspectDef    := str name, u8 aspect flags, u32 count, PropertyDef* (by name)
//! PropertyDef  := str name, u8 type code, u8 property flags,
//!                 u8 default tag (0 none, 1 value, 2 null), [Value]
//! Value        := Scalar | u32 count, Scalar*        (multivalued)
//! Scalar       := STRING str | INT i64 | DOUBLE f64 bits | BOOLEAN u8
//!               | UUID 16 bytes | BLOB u32 len, bytes
//! HierarchyDef := str name, u8 hierarchy type
//! ```
//!
//! Names sort by byte order. Ids never appear in the canonical form.

use uuid::Uuid;

use crate::def::{
    AspectDef, AspectFlags, CatalogDef, HierarchyDef, HierarchyType, PropertyDef, PropertyFlags,
    PropertyType,
};
use crate::error::Error;
use crate::model::{EntityId, PropertyValue, ScalarValue};

const DEFAULT_NONE: u8 = 0;
const DEFAULT_VALUE: u8 = 1;
const DEFAULT_NULL: u8 = 2;

/// Append-only canonical byte buffer.
#[derive(Debug, Default)]
pub struct CanonicalWriter {
    buf: Vec<u8>,
}

impl CanonicalWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write one byte.
    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Write a big-endian u32.
    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Write a big-endian u64.
    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Write length-prefixed bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    /// Write a length-prefixed UTF-8 string.
    pub fn put_str(&mut self, s: &str) {
        self.put_bytes(s.as_bytes());
    }

    /// Write raw bytes without a prefix.
    pub fn put_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Finish and return the bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over canonical bytes.
#[derive(Debug)]
pub struct CanonicalReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> CanonicalReader<'a> {
    /// Start reading at the beginning of `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                Error::Deserialization(format!("truncated canonical input at offset {}", self.pos))
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Read one byte.
    pub fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    /// Read a big-endian u32.
    pub fn u32(&mut self) -> Result<u32, Error> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(buf))
    }

    /// Read a big-endian u64.
    pub fn u64(&mut self) -> Result<u64, Error> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(buf))
    }

    /// Read length-prefixed bytes.
    pub fn bytes(&mut self) -> Result<&'a [u8], Error> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn str(&mut self) -> Result<String, Error> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::Deserialization(format!("invalid UTF-8 in canonical input: {}", e)))
    }

    /// Read raw bytes without a prefix.
    pub fn raw(&mut self, n: usize) -> Result<&'a [u8], Error> {
        self.take(n)
    }

    /// Fail if any input is left.
    pub fn finish(self) -> Result<(), Error> {
        if self.pos == self.bytes.len() {
            Ok(())
        } else {
            Err(Error::Deserialization(format!(
                "{} trailing bytes after canonical input",
                self.bytes.len() - self.pos
            )))
        }
    }
}

/// Encode one scalar.
pub fn encode_scalar(w: &mut CanonicalWriter, value: &ScalarValue) {
    match value {
        ScalarValue::String(s) => w.put_str(s),
        ScalarValue::Int(i) => w.put_u64(*i as u64),
        ScalarValue::Double(d) => w.put_u64(d.to_bits()),
        ScalarValue::Boolean(b) => w.put_u8(u8::from(*b)),
        ScalarValue::Uuid(u) => w.put_raw(u.as_bytes()),
        ScalarValue::Blob(b) => w.put_bytes(b),
    }
}

/// Decode one scalar of a known type.
pub fn decode_scalar(r: &mut CanonicalReader<'_>, ty: PropertyType) -> Result<ScalarValue, Error> {
    let value = match ty {
        PropertyType::String => ScalarValue::String(r.str()?),
        PropertyType::Int => ScalarValue::Int(r.u64()? as i64),
        PropertyType::Double => ScalarValue::Double(f64::from_bits(r.u64()?)),
        PropertyType::Boolean => match r.u8()? {
            0 => ScalarValue::Boolean(false),
            1 => ScalarValue::Boolean(true),
            other => {
                return Err(Error::Deserialization(format!("invalid BOOLEAN byte {}", other)))
            }
        },
        PropertyType::Uuid => {
            let bytes = r.raw(16)?;
            ScalarValue::Uuid(
                Uuid::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))?,
            )
        }
        PropertyType::Blob => ScalarValue::Blob(r.bytes()?.to_vec()),
    };
    Ok(value)
}

/// Encode a property definition.
pub fn encode_property_def(w: &mut CanonicalWriter, def: &PropertyDef) {
    w.put_str(def.name());
    w.put_u8(def.property_type().code());
    w.put_u8(def.flags().bits());
    match def.default_value() {
        None => w.put_u8(DEFAULT_NONE),
        Some(PropertyValue::Null) => w.put_u8(DEFAULT_NULL),
        Some(PropertyValue::Scalar(s)) => {
            w.put_u8(DEFAULT_VALUE);
            encode_scalar(w, s);
        }
        Some(PropertyValue::Array(items)) => {
            w.put_u8(DEFAULT_VALUE);
            w.put_u32(items.len() as u32);
            for item in items {
                encode_scalar(w, item);
            }
        }
    }
}

/// Decode a property definition.
pub fn decode_property_def(r: &mut CanonicalReader<'_>) -> Result<PropertyDef, Error> {
    let name = r.str()?;
    let ty = PropertyType::from_code(r.u8()?)?;
    let flags = PropertyFlags::from_bits(r.u8()?)?;
    let default = match r.u8()? {
        DEFAULT_NONE => None,
        DEFAULT_NULL => Some(PropertyValue::Null),
        DEFAULT_VALUE if flags.multivalued => {
            let count = r.u32()?;
            let items = (0..count)
                .map(|_| decode_scalar(r, ty))
                .collect::<Result<Vec<_>, _>>()?;
            Some(PropertyValue::Array(items))
        }
        DEFAULT_VALUE => Some(PropertyValue::Scalar(decode_scalar(r, ty)?)),
        other => {
            return Err(Error::Deserialization(format!("invalid default tag {}", other)));
        }
    };
    PropertyDef::build(name, ty, flags, default)
}

/// Encode an aspect definition. Properties are written sorted by name.
pub fn encode_aspect_def(w: &mut CanonicalWriter, def: &AspectDef) {
    w.put_str(def.name());
    w.put_u8(def.flags().bits());
    let mut properties: Vec<&PropertyDef> = def.properties().iter().collect();
    properties.sort_by(|a, b| a.name().cmp(b.name()));
    w.put_u32(properties.len() as u32);
    for property in properties {
        encode_property_def(w, property);
    }
}

/// Decode an aspect definition under a fresh id.
pub fn decode_aspect_def(r: &mut CanonicalReader<'_>) -> Result<AspectDef, Error> {
    let name = r.str()?;
    let flags = AspectFlags::from_bits(r.u8()?)?;
    let count = r.u32()?;
    let properties = (0..count)
        .map(|_| decode_property_def(r))
        .collect::<Result<Vec<_>, _>>()?;
    AspectDef::build(EntityId::new(), name, properties, flags)
}

/// Encode a hierarchy definition.
pub fn encode_hierarchy_def(w: &mut CanonicalWriter, def: &HierarchyDef) {
    w.put_str(def.name());
    w.put_u8(def.hierarchy_type().code());
}

/// Decode a hierarchy definition.
pub fn decode_hierarchy_def(r: &mut CanonicalReader<'_>) -> Result<HierarchyDef, Error> {
    let name = r.str()?;
    let ty = HierarchyType::from_code(r.u8()?)?;
    HierarchyDef::new(name, ty)
}

/// Encode a catalog definition: the aspect stream, then the hierarchy stream.
pub fn encode_catalog_def(w: &mut CanonicalWriter, def: &CatalogDef) {
    // Both iterators yield in name order.
    w.put_u32(def.aspect_defs().count() as u32);
    for aspect in def.aspect_defs() {
        encode_aspect_def(w, aspect);
    }
    w.put_u32(def.hierarchy_defs().count() as u32);
    for hierarchy in def.hierarchy_defs() {
        encode_hierarchy_def(w, hierarchy);
    }
}

/// Decode a catalog definition.
pub fn decode_catalog_def(r: &mut CanonicalReader<'_>) -> Result<CatalogDef, Error> {
    let mut def = CatalogDef::new();
    let aspect_count = r.u32()?;
    for _ in 0..aspect_count {
        def = def.with_aspect_def(decode_aspect_def(r)?)?;
    }
    let hierarchy_count = r.u32()?;
    for _ in 0..hierarchy_count {
        def = def.with_hierarchy_def(decode_hierarchy_def(r)?)?;
    }
    Ok(def)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_layout() {
        let mut w = CanonicalWriter::new();
        w.put_str("ab");
        w.put_u8(7);
        assert_eq!(w.into_bytes(), vec![0, 0, 0, 2, b'a', b'b', 7]);
    }

    #[test]
    fn test_property_def_layout() {
        let def = PropertyDef::new("age", PropertyType::Int).unwrap();
        let mut w = CanonicalWriter::new();
        encode_property_def(&mut w, &def);
        // name, INT, readable|writable, no default
        assert_eq!(
            w.into_bytes(),
            vec![0, 0, 0, 3, b'a', b'g', b'e', 1, 0x03, 0]
        );
    }

    #[test]
    fn test_reader_rejects_truncation_and_trailing() {
        let mut r = CanonicalReader::new(&[0, 0, 0, 5, b'a']);
        assert!(r.str().is_err());

        let r = CanonicalReader::new(&[1]);
        assert!(r.finish().is_err());
    }

    #[test]
    fn test_scalar_round_trip() {
        let values = [
            ScalarValue::String("héllo".into()),
            ScalarValue::Int(-42),
            ScalarValue::Double(2.5),
            ScalarValue::Boolean(true),
            ScalarValue::Uuid(Uuid::new_v4()),
            ScalarValue::Blob(vec![0, 255, 7]),
        ];
        for value in values {
            let mut w = CanonicalWriter::new();
            encode_scalar(&mut w, &value);
            let bytes = w.into_bytes();
            let mut r = CanonicalReader::new(&bytes);
            assert_eq!(decode_scalar(&mut r, value.property_type()).unwrap(), value);
            r.finish().unwrap();
        }
    }

    #[test]
    fn test_invalid_boolean_byte() {
        let mut r = CanonicalReader::new(&[2]);
        assert!(decode_scalar(&mut r, PropertyType::Boolean).is_err());
    }
}
