//! The dynamic object model understood by the transport.
//!
//! Exactly nine kinds are representable. Everything the codec produces or
//! consumes is one of them.

use std::collections::HashMap;
use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

/// Newtype-struct name the encoder recognises as a file descriptor.
pub(crate) const FD_TOKEN: &str = "$xpcwire::Fd";

/// A tagged, self-describing value carried by the transport.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Object {
    #[default]
    Null,
    Bool(bool),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    String(String),
    Array(Vec<Object>),
    Dictionary(HashMap<String, Object>),
    FileHandle(Fd),
}

/// Runtime tag of an [`Object`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Null,
    Bool,
    Int64,
    UInt64,
    Double,
    String,
    Array,
    Dictionary,
    FileHandle,
}

impl ObjectKind {
    /// Name used by the transport for this kind.
    pub fn name(self) -> &'static str {
        match self {
            ObjectKind::Null => "null",
            ObjectKind::Bool => "bool",
            ObjectKind::Int64 => "int64",
            ObjectKind::UInt64 => "uint64",
            ObjectKind::Double => "double",
            ObjectKind::String => "string",
            ObjectKind::Array => "array",
            ObjectKind::Dictionary => "dictionary",
            ObjectKind::FileHandle => "fd",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Object {
    /// Create an empty dictionary.
    pub fn dictionary() -> Self {
        Object::Dictionary(HashMap::new())
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Null => ObjectKind::Null,
            Object::Bool(_) => ObjectKind::Bool,
            Object::Int64(_) => ObjectKind::Int64,
            Object::UInt64(_) => ObjectKind::UInt64,
            Object::Double(_) => ObjectKind::Double,
            Object::String(_) => ObjectKind::String,
            Object::Array(_) => ObjectKind::Array,
            Object::Dictionary(_) => ObjectKind::Dictionary,
            Object::FileHandle(_) => ObjectKind::FileHandle,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Object::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Object::UInt64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Object::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Object]> {
        match self {
            Object::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&HashMap<String, Object>> {
        match self {
            Object::Dictionary(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_fd(&self) -> Option<Fd> {
        match self {
            Object::FileHandle(fd) => Some(*fd),
            _ => None,
        }
    }

    /// Look up a dictionary entry. Returns `None` for non-dictionaries.
    pub fn get(&self, key: &str) -> Option<&Object> {
        self.as_dictionary().and_then(|entries| entries.get(key))
    }
}

impl From<bool> for Object {
    fn from(v: bool) -> Self {
        Object::Bool(v)
    }
}

impl From<i64> for Object {
    fn from(v: i64) -> Self {
        Object::Int64(v)
    }
}

impl From<u64> for Object {
    fn from(v: u64) -> Self {
        Object::UInt64(v)
    }
}

impl From<f64> for Object {
    fn from(v: f64) -> Self {
        Object::Double(v)
    }
}

impl From<&str> for Object {
    fn from(v: &str) -> Self {
        Object::String(v.to_string())
    }
}

impl From<String> for Object {
    fn from(v: String) -> Self {
        Object::String(v)
    }
}

impl From<Vec<Object>> for Object {
    fn from(v: Vec<Object>) -> Self {
        Object::Array(v)
    }
}

impl From<HashMap<String, Object>> for Object {
    fn from(v: HashMap<String, Object>) -> Self {
        Object::Dictionary(v)
    }
}

impl From<Fd> for Object {
    fn from(v: Fd) -> Self {
        Object::FileHandle(v)
    }
}

/// Objects serialize as themselves, so a pre-built object passes through the
/// encoder unchanged. Other formats (JSON in logs) see plain values.
impl Serialize for Object {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Object::Null => serializer.serialize_unit(),
            Object::Bool(b) => serializer.serialize_bool(*b),
            Object::Int64(v) => serializer.serialize_i64(*v),
            Object::UInt64(v) => serializer.serialize_u64(*v),
            Object::Double(v) => serializer.serialize_f64(*v),
            Object::String(s) => serializer.serialize_str(s),
            Object::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Object::Dictionary(entries) => {
                // Dictionaries are not maps to the encoder, so they go through
                // the raw-dictionary token instead of serialize_map there.
                serializer.serialize_newtype_struct(RAW_DICTIONARY_TOKEN, &RawDictionary(entries))
            }
            Object::FileHandle(fd) => fd.serialize(serializer),
        }
    }
}

/// Newtype-struct name the encoder recognises as an already-built dictionary.
pub(crate) const RAW_DICTIONARY_TOKEN: &str = "$xpcwire::Dictionary";

pub(crate) struct RawDictionary<'a>(pub(crate) &'a HashMap<String, Object>);

impl Serialize for RawDictionary<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl fmt::Display for Object {
    /// Renders the object as JSON, for logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "<{}>", self.kind()),
        }
    }
}

/// A raw file descriptor carried as [`Object::FileHandle`].
///
/// The codec only tags the value; duplicating the descriptor when it crosses
/// a process boundary is the transport's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Fd(i32);

impl Fd {
    pub fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> i32 {
        self.0
    }

    /// Tag an open file. The file must stay open while the descriptor is in flight.
    #[cfg(unix)]
    pub fn from_file(file: &std::fs::File) -> Self {
        use std::os::fd::AsRawFd;
        Self(file.as_raw_fd())
    }

    /// Duplicate the descriptor into a new, independently owned file.
    #[cfg(unix)]
    pub fn try_clone_file(&self) -> std::io::Result<std::fs::File> {
        use std::os::fd::BorrowedFd;

        if self.0 < 0 {
            return Err(std::io::Error::from_raw_os_error(9)); // EBADF
        }
        // SAFETY: descriptors only reach an Fd from an open file or from the
        // transport, and the borrow lives only for the duration of the dup.
        let borrowed = unsafe { BorrowedFd::borrow_raw(self.0) };
        Ok(std::fs::File::from(borrowed.try_clone_to_owned()?))
    }
}

impl Serialize for Fd {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(FD_TOKEN, &self.0)
    }
}

impl<'de> Deserialize<'de> for Fd {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FdVisitor;

        impl<'de> Visitor<'de> for FdVisitor {
            type Value = Fd;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a file descriptor")
            }

            fn visit_newtype_struct<D: Deserializer<'de>>(
                self,
                deserializer: D,
            ) -> Result<Fd, D::Error> {
                i32::deserialize(deserializer).map(Fd)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Fd, E> {
                i32::try_from(v)
                    .map(Fd)
                    .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Fd, E> {
                i32::try_from(v)
                    .map(Fd)
                    .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
            }
        }

        deserializer.deserialize_newtype_struct(FD_TOKEN, FdVisitor)
    }
}
