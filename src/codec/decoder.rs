//! [`Object`] → native value decoder.
//!
//! The object's runtime kind drives decoding; the target type only selects
//! the integer width and whether an array fills a fixed or a growable
//! container. Integer narrowing wraps (two's complement), a missing struct
//! field or a `Null` yields the target's zero value.

use std::collections::HashMap;

use serde::de::value::{BorrowedStrDeserializer, I32Deserializer, StrDeserializer};
use serde::de::{self, DeserializeOwned, DeserializeSeed, Deserializer, IntoDeserializer, Visitor};

use super::object::{Object, FD_TOKEN};
use super::remote_error::{ERROR_KEY, ERROR_TOKEN};
use crate::error::{Result, XpcError};

/// Decode an [`Object`] into `T`.
pub fn from_object<T: DeserializeOwned>(obj: &Object) -> Result<T> {
    serde::Deserialize::deserialize(ObjectDeserializer::new(obj))
}

fn mismatch(expected: &str, found: &Object) -> XpcError {
    XpcError::TypeMismatch {
        expected: expected.to_string(),
        found: found.kind().to_string(),
    }
}

pub(crate) struct ObjectDeserializer<'de> {
    obj: &'de Object,
}

impl<'de> ObjectDeserializer<'de> {
    pub(crate) fn new(obj: &'de Object) -> Self {
        Self { obj }
    }
}

macro_rules! decode_integer {
    ($($method:ident => $visit:ident($ty:ty),)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
                match *self.obj {
                    Object::Int64(v) => visitor.$visit(v as $ty),
                    Object::UInt64(v) => visitor.$visit(v as $ty),
                    Object::Null => ZeroDeserializer.$method(visitor),
                    ref other => Err(mismatch(stringify!($ty), other)),
                }
            }
        )*
    };
}

impl<'de> Deserializer<'de> for ObjectDeserializer<'de> {
    type Error = XpcError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.obj {
            Object::Null => visitor.visit_unit(),
            Object::Bool(v) => visitor.visit_bool(*v),
            Object::Int64(v) => visitor.visit_i64(*v),
            Object::UInt64(v) => visitor.visit_u64(*v),
            Object::Double(v) => visitor.visit_f64(*v),
            Object::String(s) => visitor.visit_borrowed_str(s),
            Object::Array(items) => visitor.visit_seq(ArrayAccess::new(items, 0)),
            Object::Dictionary(_) => Err(XpcError::UnsupportedTarget(
                "dictionary into an untyped value".to_string(),
            )),
            Object::FileHandle(fd) => visitor.visit_i32(fd.as_raw()),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.obj {
            Object::Bool(v) => visitor.visit_bool(*v),
            Object::Null => visitor.visit_bool(false),
            other => Err(mismatch("bool", other)),
        }
    }

    decode_integer! {
        deserialize_i8 => visit_i8(i8),
        deserialize_i16 => visit_i16(i16),
        deserialize_i32 => visit_i32(i32),
        deserialize_i64 => visit_i64(i64),
        deserialize_u8 => visit_u8(u8),
        deserialize_u16 => visit_u16(u16),
        deserialize_u32 => visit_u32(u32),
        deserialize_u64 => visit_u64(u64),
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.obj {
            Object::Double(v) => visitor.visit_f32(*v as f32),
            Object::Null => visitor.visit_f32(0.0),
            other => Err(mismatch("f32", other)),
        }
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.obj {
            Object::Double(v) => visitor.visit_f64(*v),
            Object::Null => visitor.visit_f64(0.0),
            other => Err(mismatch("f64", other)),
        }
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.obj {
            Object::String(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => visitor.visit_char(c),
                    _ => Err(mismatch("char", self.obj)),
                }
            }
            Object::Null => visitor.visit_char('\0'),
            other => Err(mismatch("char", other)),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.obj {
            Object::String(s) => visitor.visit_borrowed_str(s),
            Object::Null => visitor.visit_borrowed_str(""),
            other => Err(mismatch("string", other)),
        }
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.obj {
            Object::Array(items) => {
                let bytes = items
                    .iter()
                    .map(|item| match *item {
                        Object::Int64(v) => Ok(v as u8),
                        Object::UInt64(v) => Ok(v as u8),
                        ref other => Err(mismatch("byte", other)),
                    })
                    .collect::<Result<Vec<u8>>>()?;
                visitor.visit_byte_buf(bytes)
            }
            Object::Null => visitor.visit_bytes(&[]),
            other => Err(mismatch("byte array", other)),
        }
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.obj {
            Object::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.obj {
            Object::Null => visitor.visit_unit(),
            other => Err(mismatch("null", other)),
        }
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        match self.obj {
            Object::Null | Object::Dictionary(_) => visitor.visit_unit(),
            other => Err(mismatch("dictionary", other)),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        match (name, self.obj) {
            (_, Object::Null) => ZeroDeserializer.deserialize_newtype_struct(name, visitor),
            (FD_TOKEN, Object::FileHandle(fd)) => {
                let raw: I32Deserializer<XpcError> = fd.as_raw().into_deserializer();
                visitor.visit_newtype_struct(raw)
            }
            (FD_TOKEN, other) => Err(mismatch("fd", other)),
            (ERROR_TOKEN, Object::String(message)) => visitor.visit_borrowed_str(message),
            (ERROR_TOKEN, Object::Dictionary(entries)) => match entries.get(ERROR_KEY) {
                // Structured fields next to the marker are not read back.
                Some(Object::String(message)) => visitor.visit_borrowed_str(message),
                _ => Err(mismatch("dictionary with an _error message", self.obj)),
            },
            (ERROR_TOKEN, other) => Err(mismatch("error", other)),
            _ => visitor.visit_newtype_struct(self),
        }
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.obj {
            Object::Array(items) => visitor.visit_seq(ArrayAccess::new(items, 0)),
            Object::Null => ZeroDeserializer.deserialize_seq(visitor),
            other => Err(mismatch("array", other)),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value> {
        match self.obj {
            Object::Array(items) => {
                let filled = items.len().min(len);
                visitor.visit_seq(ArrayAccess::new(&items[..filled], len - filled))
            }
            Object::Null => ZeroDeserializer.deserialize_tuple(len, visitor),
            other => Err(mismatch("array", other)),
        }
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_tuple(len, visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.obj {
            Object::Dictionary(_) => Err(XpcError::UnsupportedTarget(
                "dictionary into a map".to_string(),
            )),
            Object::Null => ZeroDeserializer.deserialize_map(visitor),
            other => Err(mismatch("dictionary", other)),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match self.obj {
            Object::Dictionary(entries) => visitor.visit_map(StructAccess::new(fields, Some(entries))),
            Object::Null => ZeroDeserializer.deserialize_struct(name, fields, visitor),
            other => Err(mismatch("dictionary", other)),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match self.obj {
            Object::String(s) => {
                let variant: StrDeserializer<'_, XpcError> = s.as_str().into_deserializer();
                visitor.visit_enum(variant)
            }
            Object::Null => ZeroDeserializer.deserialize_enum(name, variants, visitor),
            other => Err(mismatch("string", other)),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn is_human_readable(&self) -> bool {
        false
    }
}

/// Yields array elements, then `padding` zero values.
struct ArrayAccess<'de> {
    items: std::slice::Iter<'de, Object>,
    padding: usize,
}

impl<'de> ArrayAccess<'de> {
    fn new(items: &'de [Object], padding: usize) -> Self {
        Self {
            items: items.iter(),
            padding,
        }
    }
}

impl<'de> de::SeqAccess<'de> for ArrayAccess<'de> {
    type Error = XpcError;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        if let Some(item) = self.items.next() {
            return seed.deserialize(ObjectDeserializer::new(item)).map(Some);
        }
        if self.padding > 0 {
            self.padding -= 1;
            return seed.deserialize(ZeroDeserializer).map(Some);
        }
        Ok(None)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.items.len() + self.padding)
    }
}

/// Walks the target's declared fields in order, looking each up by wire key.
struct StructAccess<'de> {
    fields: std::slice::Iter<'static, &'static str>,
    entries: Option<&'de HashMap<String, Object>>,
    current: Option<&'static str>,
}

impl<'de> StructAccess<'de> {
    fn new(fields: &'static [&'static str], entries: Option<&'de HashMap<String, Object>>) -> Self {
        Self {
            fields: fields.iter(),
            entries,
            current: None,
        }
    }
}

impl<'de> de::MapAccess<'de> for StructAccess<'de> {
    type Error = XpcError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        let Some(field) = self.fields.next() else {
            return Ok(None);
        };
        self.current = Some(field);
        seed.deserialize(BorrowedStrDeserializer::new(field)).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        let found = self
            .current
            .take()
            .and_then(|field| self.entries.and_then(|entries| entries.get(field)));
        match found {
            Some(obj) => seed.deserialize(ObjectDeserializer::new(obj)),
            None => seed.deserialize(ZeroDeserializer),
        }
    }
}

/// Produces the zero value of whatever the target asks for.
pub(crate) struct ZeroDeserializer;

macro_rules! zero_scalar {
    ($($method:ident => $visit:ident($zero:expr),)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
                visitor.$visit($zero)
            }
        )*
    };
}

impl<'de> Deserializer<'de> for ZeroDeserializer {
    type Error = XpcError;

    zero_scalar! {
        deserialize_bool => visit_bool(false),
        deserialize_i8 => visit_i8(0),
        deserialize_i16 => visit_i16(0),
        deserialize_i32 => visit_i32(0),
        deserialize_i64 => visit_i64(0),
        deserialize_u8 => visit_u8(0),
        deserialize_u16 => visit_u16(0),
        deserialize_u32 => visit_u32(0),
        deserialize_u64 => visit_u64(0),
        deserialize_f32 => visit_f32(0.0),
        deserialize_f64 => visit_f64(0.0),
        deserialize_char => visit_char('\0'),
        deserialize_str => visit_borrowed_str(""),
        deserialize_string => visit_borrowed_str(""),
        deserialize_identifier => visit_borrowed_str(""),
        deserialize_bytes => visit_borrowed_bytes(&[]),
        deserialize_byte_buf => visit_borrowed_bytes(&[]),
    }

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_none()
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_seq(ArrayAccess::new(&[], 0))
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value> {
        visitor.visit_seq(ArrayAccess::new(&[], len))
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_tuple(len, visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_map(StructAccess::new(&[], None))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_map(StructAccess::new(fields, None))
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match variants.first() {
            Some(first) => {
                let variant: StrDeserializer<'_, XpcError> = (*first).into_deserializer();
                visitor.visit_enum(variant)
            }
            None => Err(XpcError::UnsupportedTarget(format!("empty enum {name}"))),
        }
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn is_human_readable(&self) -> bool {
        false
    }
}
