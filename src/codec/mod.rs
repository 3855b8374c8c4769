//! Codec module - native values to and from the transport's object model.
//!
//! - [`Object`] - the nine dynamic kinds the transport understands
//! - [`DynamicCodec`] - encode any `Serialize` value, decode into any `DeserializeOwned`
//! - [`RemoteError`] / [`StructuredError`] - errors carried as values
//!
//! # Design
//!
//! The codec is a serde data format. Derived `Serialize`/`Deserialize` impls
//! provide the field table of a struct: `#[serde(rename = "...")]` sets the
//! wire key and `#[serde(skip)]` hides a member. Wire keys starting with `_`
//! are reserved for codec metadata.
//!
//! # Example
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use xpcwire::codec::DynamicCodec;
//!
//! #[derive(Serialize, Deserialize, Debug, PartialEq)]
//! struct AddRequest {
//!     #[serde(rename = "FirstNumber")]
//!     first: i64,
//!     #[serde(rename = "SecondNumber")]
//!     second: i64,
//! }
//!
//! let obj = DynamicCodec::encode(&AddRequest { first: 1, second: 2 }).unwrap();
//! assert_eq!(obj.get("FirstNumber").and_then(|v| v.as_i64()), Some(1));
//!
//! let back: AddRequest = DynamicCodec::decode(&obj).unwrap();
//! assert_eq!(back, AddRequest { first: 1, second: 2 });
//! ```

mod decoder;
mod encoder;
mod object;
mod remote_error;

pub use decoder::from_object;
pub use encoder::{to_object, RESERVED_PREFIX};
pub use object::{Fd, Object, ObjectKind};
pub use remote_error::{RemoteError, StructuredError, ERROR_KEY};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, XpcError};

/// Dynamic object codec.
///
/// Encoding widens (all signed integers become `Int64`, all unsigned
/// `UInt64`); decoding narrows with wraparound.
pub struct DynamicCodec;

impl DynamicCodec {
    /// Encode a value into an [`Object`].
    ///
    /// # Errors
    ///
    /// - [`XpcError::UnsupportedType`] for maps, data-carrying enum variants
    ///   and 128-bit integers
    /// - [`XpcError::InvalidFieldName`] if a wire key starts with `_`
    ///
    /// No partial object is returned on failure.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Object> {
        to_object(value)
    }

    /// Decode an [`Object`] into `T`.
    ///
    /// # Errors
    ///
    /// - [`XpcError::TypeMismatch`] if the object's kind cannot fill the target
    /// - [`XpcError::UnsupportedTarget`] for a dictionary into a map
    pub fn decode<T: DeserializeOwned>(obj: &Object) -> Result<T> {
        from_object(obj)
    }

    /// Encode a message payload, which must be a struct.
    ///
    /// # Errors
    ///
    /// [`XpcError::PayloadMustBeStruct`] if the value does not encode to a
    /// dictionary, plus any [`encode`](Self::encode) error.
    pub fn encode_payload<T: Serialize + ?Sized>(value: &T) -> Result<Object> {
        let obj = to_object(value)?;
        match obj.kind() {
            ObjectKind::Dictionary => Ok(obj),
            kind => Err(XpcError::PayloadMustBeStruct(kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Inner {
        name: String,
        tags: Vec<String>,
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Outer {
        id: u32,
        #[serde(rename = "Ratio")]
        ratio: f64,
        inner: Inner,
        maybe: Option<i16>,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    enum Color {
        Red,
        Green,
    }

    #[test]
    fn test_scalar_round_trip() {
        fn round_trip<T>(value: T)
        where
            T: Serialize + DeserializeOwned + PartialEq + std::fmt::Debug,
        {
            let obj = DynamicCodec::encode(&value).unwrap();
            let back: T = DynamicCodec::decode(&obj).unwrap();
            assert_eq!(back, value);
        }

        round_trip(true);
        round_trip(false);
        round_trip(0i8);
        round_trip(i8::MIN);
        round_trip(i8::MAX);
        round_trip(i16::MIN);
        round_trip(i16::MAX);
        round_trip(i32::MIN);
        round_trip(i32::MAX);
        round_trip(i64::MIN);
        round_trip(i64::MAX);
        round_trip(u8::MIN);
        round_trip(u8::MAX);
        round_trip(u16::MIN);
        round_trip(u16::MAX);
        round_trip(u32::MIN);
        round_trip(u32::MAX);
        round_trip(u64::MIN);
        round_trip(u64::MAX);
        round_trip(1.5f32);
        round_trip(-0.25f64);
        round_trip(String::new());
        round_trip("hello".to_string());
        round_trip('x');
    }

    #[test]
    fn test_encode_widens_integers() {
        assert_eq!(DynamicCodec::encode(&-5i8).unwrap(), Object::Int64(-5));
        assert_eq!(DynamicCodec::encode(&5u16).unwrap(), Object::UInt64(5));
        assert_eq!(DynamicCodec::encode(&2.5f32).unwrap(), Object::Double(2.5));
    }

    #[test]
    fn test_decode_narrows_with_wraparound() {
        let small = DynamicCodec::encode(&-7i8).unwrap();
        assert_eq!(DynamicCodec::decode::<i32>(&small).unwrap(), -7);

        assert_eq!(DynamicCodec::decode::<u8>(&Object::Int64(300)).unwrap(), 44);
        assert_eq!(DynamicCodec::decode::<i8>(&Object::UInt64(255)).unwrap(), -1);
    }

    #[test]
    fn test_nested_struct_round_trip() {
        let value = Outer {
            id: 7,
            ratio: 0.5,
            inner: Inner {
                name: "john".into(),
                tags: vec!["a".into(), "b".into()],
            },
            maybe: Some(-3),
        };

        let obj = DynamicCodec::encode(&value).unwrap();
        assert_eq!(obj.get("Ratio"), Some(&Object::Double(0.5)));
        assert_eq!(
            obj.get("inner").and_then(|i| i.get("name")),
            Some(&Object::from("john"))
        );

        let back: Outer = DynamicCodec::decode(&obj).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_none_encodes_as_null() {
        let obj = DynamicCodec::encode(&Outer::default()).unwrap();
        assert_eq!(obj.get("maybe"), Some(&Object::Null));
    }

    #[test]
    fn test_fixed_array_truncates_and_pads() {
        let five = DynamicCodec::encode(&vec![1i32, 2, 3, 4, 5]).unwrap();
        let three: [i32; 3] = DynamicCodec::decode(&five).unwrap();
        assert_eq!(three, [1, 2, 3]);

        let two = DynamicCodec::encode(&[9u8, 8]).unwrap();
        let four: [u8; 4] = DynamicCodec::decode(&two).unwrap();
        assert_eq!(four, [9, 8, 0, 0]);

        let all: Vec<i32> = DynamicCodec::decode(&five).unwrap();
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn test_missing_field_is_zero() {
        let mut entries = HashMap::new();
        entries.insert("id".to_string(), Object::UInt64(3));
        let obj = Object::from(entries);

        let decoded: Outer = DynamicCodec::decode(&obj).unwrap();
        assert_eq!(decoded.id, 3);
        assert_eq!(decoded.ratio, 0.0);
        assert_eq!(decoded.inner, Inner::default());
        assert_eq!(decoded.maybe, None);
    }

    #[test]
    fn test_null_decodes_to_zero() {
        assert_eq!(DynamicCodec::decode::<i64>(&Object::Null).unwrap(), 0);
        assert_eq!(DynamicCodec::decode::<String>(&Object::Null).unwrap(), "");
        assert_eq!(DynamicCodec::decode::<Option<u8>>(&Object::Null).unwrap(), None);
        assert_eq!(DynamicCodec::decode::<Color>(&Object::Null).unwrap(), Color::Red);
    }

    #[test]
    fn test_reserved_prefix_rejected() {
        #[derive(Serialize)]
        struct Sneaky {
            #[serde(rename = "_foo")]
            foo: i32,
        }

        let err = DynamicCodec::encode(&Sneaky { foo: 1 }).unwrap_err();
        assert!(matches!(err, XpcError::InvalidFieldName(ref key) if key == "_foo"));
    }

    #[test]
    fn test_ordinary_fields_never_produce_error_marker() {
        let obj = DynamicCodec::encode(&Outer::default()).unwrap();
        assert!(obj.get(ERROR_KEY).is_none());
    }

    #[test]
    fn test_skipped_member_is_ignored() {
        #[derive(Debug, Serialize, Deserialize)]
        struct WithHidden {
            visible: u8,
            #[serde(skip)]
            hidden: HashMap<String, String>,
        }

        let mut hidden = HashMap::new();
        hidden.insert("k".into(), "v".into());
        let obj = DynamicCodec::encode(&WithHidden { visible: 1, hidden }).unwrap();
        assert_eq!(obj.as_dictionary().map(HashMap::len), Some(1));

        let back: WithHidden = DynamicCodec::decode(&obj).unwrap();
        assert!(back.hidden.is_empty());
    }

    #[test]
    fn test_unsupported_types_rejected() {
        #[derive(Serialize)]
        struct WithMap {
            counts: HashMap<String, u32>,
        }

        #[derive(Serialize)]
        enum Shape {
            Circle(f64),
        }

        #[derive(Serialize)]
        struct WithShape {
            shape: Shape,
        }

        let err = DynamicCodec::encode(&WithMap {
            counts: HashMap::new(),
        })
        .unwrap_err();
        assert!(matches!(err, XpcError::UnsupportedType(ref kind) if kind == "map"));

        let err = DynamicCodec::encode(&WithShape {
            shape: Shape::Circle(1.0),
        })
        .unwrap_err();
        assert!(matches!(err, XpcError::UnsupportedType(_)));

        assert!(matches!(
            DynamicCodec::encode(&1u128),
            Err(XpcError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_unit_enum_is_variant_name() {
        let obj = DynamicCodec::encode(&Color::Green).unwrap();
        assert_eq!(obj, Object::from("Green"));
        assert_eq!(DynamicCodec::decode::<Color>(&obj).unwrap(), Color::Green);
    }

    #[test]
    fn test_type_mismatch() {
        let err = DynamicCodec::decode::<i32>(&Object::from("nope")).unwrap_err();
        match err {
            XpcError::TypeMismatch { found, .. } => assert_eq!(found, "string"),
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(matches!(
            DynamicCodec::decode::<i64>(&Object::Double(1.0)),
            Err(XpcError::TypeMismatch { .. })
        ));
        assert!(matches!(
            DynamicCodec::decode::<Inner>(&Object::Array(vec![])),
            Err(XpcError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_dictionary_into_map_unsupported() {
        let obj = DynamicCodec::encode(&Inner::default()).unwrap();
        let err = DynamicCodec::decode::<HashMap<String, String>>(&obj).unwrap_err();
        assert!(matches!(err, XpcError::UnsupportedTarget(_)));
    }

    #[test]
    fn test_error_asymmetry() {
        #[derive(Debug, Serialize, thiserror::Error)]
        #[error("value is too large")]
        struct TooLarge {
            val: i32,
        }

        let obj = DynamicCodec::encode(&StructuredError::new(TooLarge { val: 10 })).unwrap();
        assert_eq!(obj.get(ERROR_KEY), Some(&Object::from("value is too large")));
        assert_eq!(obj.get("val"), Some(&Object::Int64(10)));

        let back: RemoteError = DynamicCodec::decode(&obj).unwrap();
        assert_eq!(back.message(), "value is too large");
    }

    #[test]
    fn test_message_only_error_is_bare_string() {
        let obj = DynamicCodec::encode(&RemoteError::new("plain failure")).unwrap();
        assert_eq!(obj, Object::from("plain failure"));

        let back: RemoteError = DynamicCodec::decode(&obj).unwrap();
        assert_eq!(back.message(), "plain failure");

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let obj = DynamicCodec::encode(&StructuredError::new(io.to_string())).unwrap();
        assert_eq!(obj, Object::from("disk on fire"));
    }

    #[test]
    fn test_error_field_inside_struct() {
        #[derive(Debug, Serialize, Deserialize)]
        struct Response {
            #[serde(rename = "Err")]
            err: Option<RemoteError>,
        }

        let obj = DynamicCodec::encode(&Response {
            err: Some(RemoteError::new("bad input")),
        })
        .unwrap();
        let back: Response = DynamicCodec::decode(&obj).unwrap();
        assert_eq!(back.err.map(|e| e.message().to_string()).as_deref(), Some("bad input"));

        let empty: Response = DynamicCodec::decode(&Object::dictionary()).unwrap();
        assert!(empty.err.is_none());
    }

    #[test]
    fn test_dictionary_without_marker_is_not_an_error() {
        let obj = DynamicCodec::encode(&Inner::default()).unwrap();
        assert!(matches!(
            DynamicCodec::decode::<RemoteError>(&obj),
            Err(XpcError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_fd_round_trip() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Transfer {
            file: Fd,
        }

        let obj = DynamicCodec::encode(&Transfer {
            file: Fd::from_raw(5),
        })
        .unwrap();
        assert_eq!(obj.get("file"), Some(&Object::FileHandle(Fd::from_raw(5))));

        let back: Transfer = DynamicCodec::decode(&obj).unwrap();
        assert_eq!(back.file.as_raw(), 5);

        assert!(matches!(
            DynamicCodec::decode::<Fd>(&Object::Int64(5)),
            Err(XpcError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_object_passes_through_encoder() {
        let mut entries = HashMap::new();
        entries.insert("_error".to_string(), Object::from("kept"));
        entries.insert(
            "list".to_string(),
            Object::Array(vec![Object::UInt64(1), Object::Null]),
        );
        let obj = Object::from(entries);

        assert_eq!(DynamicCodec::encode(&obj).unwrap(), obj);
    }

    #[test]
    fn test_payload_must_be_struct() {
        let err = DynamicCodec::encode_payload(&42i32).unwrap_err();
        assert!(matches!(err, XpcError::PayloadMustBeStruct(ObjectKind::Int64)));

        let err = DynamicCodec::encode_payload(&vec![1u8]).unwrap_err();
        assert!(matches!(err, XpcError::PayloadMustBeStruct(ObjectKind::Array)));

        assert!(DynamicCodec::encode_payload(&Inner::default()).is_ok());
    }

    #[test]
    fn test_unit_and_newtype_structs() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Ping;

        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Meters(u32);

        assert_eq!(DynamicCodec::encode(&Ping).unwrap(), Object::dictionary());
        assert_eq!(
            DynamicCodec::decode::<Ping>(&Object::dictionary()).unwrap(),
            Ping
        );
        assert_eq!(DynamicCodec::encode(&Meters(4)).unwrap(), Object::UInt64(4));
        assert_eq!(
            DynamicCodec::decode::<Meters>(&Object::UInt64(4)).unwrap(),
            Meters(4)
        );
    }

    #[test]
    fn test_tuple_is_array() {
        let obj = DynamicCodec::encode(&(1i8, "two", 3.0f64)).unwrap();
        assert_eq!(obj.as_array().map(<[Object]>::len), Some(3));

        let back: (i8, String, f64) = DynamicCodec::decode(&obj).unwrap();
        assert_eq!(back, (1, "two".to_string(), 3.0));
    }
}
