//! Errors carried as message values.
//!
//! On the wire an error is either a bare string or a dictionary with a
//! reserved `_error` entry holding the rendered message. Structured fields
//! travel next to the marker but are not read back: decoding always yields a
//! message-only [`RemoteError`].

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Dictionary key holding the rendered error message.
pub const ERROR_KEY: &str = "_error";

/// Newtype-struct name the encoder and decoder treat as an error value.
pub(crate) const ERROR_TOKEN: &str = "$xpcwire::Error";

/// A message-only error received from (or sent to) a peer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Error)]
#[error("{message}")]
pub struct RemoteError {
    message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for RemoteError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for RemoteError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl Serialize for RemoteError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.message)
    }
}

impl<'de> Deserialize<'de> for RemoteError {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MessageVisitor;

        impl<'de> Visitor<'de> for MessageVisitor {
            type Value = RemoteError;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an error message")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<RemoteError, E> {
                Ok(RemoteError::new(v))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<RemoteError, E> {
                Ok(RemoteError::new(v))
            }

            fn visit_newtype_struct<D: Deserializer<'de>>(
                self,
                deserializer: D,
            ) -> Result<RemoteError, D::Error> {
                String::deserialize(deserializer).map(RemoteError::new)
            }
        }

        deserializer.deserialize_newtype_struct(ERROR_TOKEN, MessageVisitor)
    }
}

/// An error whose public fields travel alongside the message.
///
/// `E` encodes next to the `_error` marker when it serializes as a struct;
/// any other shape degrades to the bare message string.
///
/// # Example
///
/// ```
/// use serde::Serialize;
/// use xpcwire::codec::{DynamicCodec, StructuredError, ERROR_KEY};
///
/// #[derive(Debug, Serialize, thiserror::Error)]
/// #[error("quota exceeded")]
/// struct QuotaError {
///     limit: u32,
/// }
///
/// let obj = DynamicCodec::encode(&StructuredError::new(QuotaError { limit: 10 })).unwrap();
/// assert_eq!(obj.get(ERROR_KEY).and_then(|v| v.as_str()), Some("quota exceeded"));
/// assert_eq!(obj.get("limit").and_then(|v| v.as_u64()), Some(10));
/// ```
#[derive(Debug, Clone)]
pub struct StructuredError<E>(E);

impl<E> StructuredError<E> {
    pub fn new(error: E) -> Self {
        Self(error)
    }

    pub fn inner(&self) -> &E {
        &self.0
    }

    pub fn into_inner(self) -> E {
        self.0
    }
}

impl<E: fmt::Display> fmt::Display for StructuredError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<E: std::error::Error> std::error::Error for StructuredError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl<E> From<StructuredError<E>> for RemoteError
where
    E: fmt::Display,
{
    fn from(err: StructuredError<E>) -> Self {
        RemoteError::new(err.to_string())
    }
}

impl<E: fmt::Display + Serialize> Serialize for StructuredError<E> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(ERROR_TOKEN, &(self.0.to_string(), &self.0))
    }
}
