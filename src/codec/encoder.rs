//! Native value → [`Object`] encoder.
//!
//! A `serde::Serializer` that builds the object graph directly. Integers are
//! widened to 64 bits and floats to doubles; narrowing only happens on decode.

use std::collections::HashMap;

use serde::ser::{self, Impossible, Serialize};

use super::object::{Object, FD_TOKEN, RAW_DICTIONARY_TOKEN};
use super::remote_error::{ERROR_KEY, ERROR_TOKEN};
use crate::error::{Result, XpcError};

/// Prefix reserved for codec metadata such as the `_error` marker.
pub const RESERVED_PREFIX: char = '_';

/// Encode a value into an [`Object`].
pub fn to_object<T: Serialize + ?Sized>(value: &T) -> Result<Object> {
    value.serialize(Encoder::default())
}

/// Check a struct member's wire key against the reserved prefix.
pub(crate) fn check_wire_key(key: &str) -> Result<()> {
    if key.starts_with(RESERVED_PREFIX) {
        return Err(XpcError::InvalidFieldName(key.to_string()));
    }
    Ok(())
}

#[derive(Default)]
pub(crate) struct Encoder {
    /// Set only while re-encoding an already-built dictionary object.
    raw_dictionary: bool,
}

fn unsupported(kind: &str) -> XpcError {
    XpcError::UnsupportedType(kind.to_string())
}

impl ser::Serializer for Encoder {
    type Ok = Object;
    type Error = XpcError;

    type SerializeSeq = ArrayEncoder;
    type SerializeTuple = ArrayEncoder;
    type SerializeTupleStruct = ArrayEncoder;
    type SerializeTupleVariant = Impossible<Object, XpcError>;
    type SerializeMap = RawDictionaryEncoder;
    type SerializeStruct = DictionaryEncoder;
    type SerializeStructVariant = Impossible<Object, XpcError>;

    fn serialize_bool(self, v: bool) -> Result<Object> {
        Ok(Object::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Object> {
        Ok(Object::Int64(v.into()))
    }

    fn serialize_i16(self, v: i16) -> Result<Object> {
        Ok(Object::Int64(v.into()))
    }

    fn serialize_i32(self, v: i32) -> Result<Object> {
        Ok(Object::Int64(v.into()))
    }

    fn serialize_i64(self, v: i64) -> Result<Object> {
        Ok(Object::Int64(v))
    }

    fn serialize_i128(self, _v: i128) -> Result<Object> {
        Err(unsupported("i128"))
    }

    fn serialize_u8(self, v: u8) -> Result<Object> {
        Ok(Object::UInt64(v.into()))
    }

    fn serialize_u16(self, v: u16) -> Result<Object> {
        Ok(Object::UInt64(v.into()))
    }

    fn serialize_u32(self, v: u32) -> Result<Object> {
        Ok(Object::UInt64(v.into()))
    }

    fn serialize_u64(self, v: u64) -> Result<Object> {
        Ok(Object::UInt64(v))
    }

    fn serialize_u128(self, _v: u128) -> Result<Object> {
        Err(unsupported("u128"))
    }

    fn serialize_f32(self, v: f32) -> Result<Object> {
        Ok(Object::Double(v.into()))
    }

    fn serialize_f64(self, v: f64) -> Result<Object> {
        Ok(Object::Double(v))
    }

    fn serialize_char(self, v: char) -> Result<Object> {
        Ok(Object::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Object> {
        Ok(Object::String(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Object> {
        Ok(Object::Array(
            v.iter().map(|b| Object::UInt64((*b).into())).collect(),
        ))
    }

    fn serialize_none(self) -> Result<Object> {
        Ok(Object::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Object> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Object> {
        Ok(Object::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Object> {
        Ok(Object::dictionary())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Object> {
        Ok(Object::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<Object> {
        match name {
            FD_TOKEN => match value.serialize(Encoder::default())? {
                Object::Int64(raw) => i32::try_from(raw)
                    .map(|raw| Object::FileHandle(super::Fd::from_raw(raw)))
                    .map_err(|_| unsupported("fd out of range")),
                other => Err(XpcError::TypeMismatch {
                    expected: "raw file descriptor".to_string(),
                    found: other.kind().to_string(),
                }),
            },
            ERROR_TOKEN => encode_structured_error(value),
            RAW_DICTIONARY_TOKEN => value.serialize(Encoder {
                raw_dictionary: true,
            }),
            _ => value.serialize(self),
        }
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Object> {
        Err(unsupported("enum newtype variant"))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<ArrayEncoder> {
        Ok(ArrayEncoder {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<ArrayEncoder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<ArrayEncoder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(unsupported("enum tuple variant"))
    }

    fn serialize_map(self, len: Option<usize>) -> Result<RawDictionaryEncoder> {
        if !self.raw_dictionary {
            return Err(unsupported("map"));
        }
        Ok(RawDictionaryEncoder {
            entries: HashMap::with_capacity(len.unwrap_or(0)),
            key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<DictionaryEncoder> {
        Ok(DictionaryEncoder {
            entries: HashMap::with_capacity(len),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(unsupported("enum struct variant"))
    }

    fn is_human_readable(&self) -> bool {
        false
    }
}

/// `StructuredError` serializes as `(message, error)`; the error's own fields
/// land next to the `_error` marker, or the message alone if it has none.
fn encode_structured_error<T: Serialize + ?Sized>(value: &T) -> Result<Object> {
    let parts = match value.serialize(Encoder::default())? {
        Object::Array(parts) => parts,
        other => {
            return Err(XpcError::TypeMismatch {
                expected: "error message and fields".to_string(),
                found: other.kind().to_string(),
            })
        }
    };

    let mut parts = parts.into_iter();
    let message = match parts.next() {
        Some(Object::String(message)) => message,
        _ => return Err(unsupported("error without a message")),
    };

    match parts.next() {
        Some(Object::Dictionary(mut fields)) => {
            fields.insert(ERROR_KEY.to_string(), Object::String(message));
            Ok(Object::Dictionary(fields))
        }
        _ => Ok(Object::String(message)),
    }
}

pub(crate) struct ArrayEncoder {
    items: Vec<Object>,
}

impl ArrayEncoder {
    fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.items.push(value.serialize(Encoder::default())?);
        Ok(())
    }
}

impl ser::SerializeSeq for ArrayEncoder {
    type Ok = Object;
    type Error = XpcError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Object> {
        Ok(Object::Array(self.items))
    }
}

impl ser::SerializeTuple for ArrayEncoder {
    type Ok = Object;
    type Error = XpcError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Object> {
        Ok(Object::Array(self.items))
    }
}

impl ser::SerializeTupleStruct for ArrayEncoder {
    type Ok = Object;
    type Error = XpcError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Object> {
        Ok(Object::Array(self.items))
    }
}

pub(crate) struct DictionaryEncoder {
    entries: HashMap<String, Object>,
}

impl ser::SerializeStruct for DictionaryEncoder {
    type Ok = Object;
    type Error = XpcError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<()> {
        check_wire_key(key)?;
        let item = value.serialize(Encoder::default())?;
        self.entries.insert(key.to_string(), item);
        Ok(())
    }

    fn skip_field(&mut self, _key: &'static str) -> Result<()> {
        Ok(())
    }

    fn end(self) -> Result<Object> {
        Ok(Object::Dictionary(self.entries))
    }
}

pub(crate) struct RawDictionaryEncoder {
    entries: HashMap<String, Object>,
    key: Option<String>,
}

impl ser::SerializeMap for RawDictionaryEncoder {
    type Ok = Object;
    type Error = XpcError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<()> {
        match key.serialize(Encoder::default())? {
            Object::String(key) => {
                self.key = Some(key);
                Ok(())
            }
            other => Err(XpcError::TypeMismatch {
                expected: "string key".to_string(),
                found: other.kind().to_string(),
            }),
        }
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let key = self
            .key
            .take()
            .ok_or_else(|| XpcError::Codec("dictionary value without a key".to_string()))?;
        self.entries.insert(key, value.serialize(Encoder::default())?);
        Ok(())
    }

    fn end(self) -> Result<Object> {
        Ok(Object::Dictionary(self.entries))
    }
}
