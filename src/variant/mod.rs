//! GVariant-compatible serialization
//!
//! every metadata object, delta superblock and delta part is stored in this
//! format. only normal-form data is accepted on the way in, which makes the
//! encoding of a given value unique and therefore safe to checksum.

mod framing;
mod ty;

pub use ty::{VariantType, MAX_DEPTH};

use crate::error::{Error, Result};

/// a typed value
///
/// `ay` is always represented as `Bytes`.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    String(String),
    ObjectPath(String),
    Signature(String),
    Variant(Box<Value>),
    Bytes(Vec<u8>),
    /// element type plus elements
    Array(VariantType, Vec<Value>),
    Tuple(Vec<Value>),
    DictEntry(Box<Value>, Box<Value>),
}

impl Value {
    /// the type of this value
    pub fn value_type(&self) -> VariantType {
        match self {
            Value::Bool(_) => VariantType::Bool,
            Value::Byte(_) => VariantType::Byte,
            Value::Int16(_) => VariantType::Int16,
            Value::UInt16(_) => VariantType::UInt16,
            Value::Int32(_) => VariantType::Int32,
            Value::UInt32(_) => VariantType::UInt32,
            Value::Int64(_) => VariantType::Int64,
            Value::UInt64(_) => VariantType::UInt64,
            Value::Double(_) => VariantType::Double,
            Value::String(_) => VariantType::String,
            Value::ObjectPath(_) => VariantType::ObjectPath,
            Value::Signature(_) => VariantType::Signature,
            Value::Variant(_) => VariantType::Variant,
            Value::Bytes(_) => VariantType::array_of(VariantType::Byte),
            Value::Array(elem, _) => VariantType::array_of(elem.clone()),
            Value::Tuple(members) => {
                VariantType::Tuple(members.iter().map(|m| m.value_type()).collect())
            }
            Value::DictEntry(k, v) => {
                VariantType::DictEntry(Box::new(k.value_type()), Box::new(v.value_type()))
            }
        }
    }

    /// wrap in a `v`
    pub fn boxed(self) -> Value {
        Value::Variant(Box::new(self))
    }

    /// serialize in normal form
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        framing::write(self, &mut out);
        out
    }

    /// deserialize `data` as `ty`, rejecting anything not in normal form
    pub fn from_bytes(ty: &VariantType, data: &[u8]) -> Result<Value> {
        let value = framing::read(ty, data, 0)?;
        if value.to_bytes() != data {
            return Err(Error::NonCanonical(ty.signature()));
        }
        Ok(value)
    }

    /// like `from_bytes`, with the type given as a signature
    pub fn from_bytes_sig(sig: &str, data: &[u8]) -> Result<Value> {
        Self::from_bytes(&VariantType::parse(sig)?, data)
    }

    pub fn into_tuple(self, n: usize) -> Result<Vec<Value>> {
        match self {
            Value::Tuple(members) if members.len() == n => Ok(members),
            other => Err(mismatch("tuple", &other)),
        }
    }

    pub fn into_array(self) -> Result<Vec<Value>> {
        match self {
            Value::Array(_, items) => Ok(items),
            other => Err(mismatch("array", &other)),
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            Value::Bytes(b) => Ok(b),
            other => Err(mismatch("ay", &other)),
        }
    }

    pub fn into_string(self) -> Result<String> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(mismatch("s", &other)),
        }
    }

    pub fn into_dict_entry(self) -> Result<(Value, Value)> {
        match self {
            Value::DictEntry(k, v) => Ok((*k, *v)),
            other => Err(mismatch("dict entry", &other)),
        }
    }

    pub fn into_variant(self) -> Result<Value> {
        match self {
            Value::Variant(inner) => Ok(*inner),
            other => Err(mismatch("v", &other)),
        }
    }

    pub fn as_u8(&self) -> Result<u8> {
        match self {
            Value::Byte(b) => Ok(*b),
            other => Err(mismatch("y", other)),
        }
    }

    pub fn as_u32(&self) -> Result<u32> {
        match self {
            Value::UInt32(v) => Ok(*v),
            other => Err(mismatch("u", other)),
        }
    }

    pub fn as_u64(&self) -> Result<u64> {
        match self {
            Value::UInt64(v) => Ok(*v),
            other => Err(mismatch("t", other)),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::ObjectPath(s) | Value::Signature(s) => Some(s),
            _ => None,
        }
    }
}

fn mismatch(expected: &str, got: &Value) -> Error {
    Error::invalid_variant(format!(
        "expected {}, found value of type {}",
        expected,
        got.value_type()
    ))
}

/// an `a{sv}` dictionary
///
/// entries keep their wire order so that decoding and re-encoding a
/// dictionary written by another producer is byte-identical.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VariantDict {
    entries: Vec<(String, Value)>,
}

impl VariantDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// set `key`, replacing an existing entry in place
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Array(
            dict_entry_type(),
            self.entries
                .iter()
                .map(|(k, v)| {
                    Value::DictEntry(
                        Box::new(Value::String(k.clone())),
                        Box::new(v.clone().boxed()),
                    )
                })
                .collect(),
        )
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let mut entries = Vec::new();
        for item in value.into_array()? {
            let (k, v) = item.into_dict_entry()?;
            entries.push((k.into_string()?, v.into_variant()?));
        }
        Ok(Self { entries })
    }
}

fn dict_entry_type() -> VariantType {
    VariantType::DictEntry(Box::new(VariantType::String), Box::new(VariantType::Variant))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dict_insert_replaces() {
        let mut d = VariantDict::new();
        d.insert("b", Value::UInt32(1));
        d.insert("a", Value::UInt32(2));
        d.insert("b", Value::UInt32(3));
        let keys: Vec<_> = d.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(d.get("b"), Some(&Value::UInt32(3)));
    }

    #[test]
    fn test_dict_roundtrip_preserves_order() {
        let mut d = VariantDict::new();
        d.insert("zeta", Value::String("last".into()));
        d.insert("alpha", Value::UInt64(7));
        let bytes = d.to_value().to_bytes();
        let parsed = Value::from_bytes_sig("a{sv}", &bytes).unwrap();
        let back = VariantDict::from_value(parsed).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn test_accessor_mismatch() {
        assert!(Value::UInt32(1).as_u64().is_err());
        assert!(Value::String("x".into()).into_bytes().is_err());
        assert_eq!(Value::String("x".into()).as_str(), Some("x"));
    }
}
