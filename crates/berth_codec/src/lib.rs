//! # Berth Codec
//!
//! Binary encoding for entity records stored in Berth buckets.
//!
//! Records are `serde` types written as CBOR (RFC 8949) through `ciborium`.
//! Struct fields are encoded by name, so adding a field with a
//! `#[serde(default)]` keeps older records readable. There is no version
//! header; a bucket whose record layout changes incompatibly needs an
//! external migration.
//!
//! ```
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Machine {
//!     name: String,
//!     cpus: u32,
//! }
//!
//! let bytes = berth_codec::encode(&Machine { name: "web-1".into(), cpus: 2 }).unwrap();
//! let back: Machine = berth_codec::decode(&bytes).unwrap();
//! assert_eq!(back.name, "web-1");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;

pub use error::{CodecError, CodecResult};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes `value` to CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::EncodingFailed`] if serialization fails.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buf)
}

/// Decodes one value from `bytes`, rejecting trailing data.
///
/// # Errors
///
/// Returns [`CodecError::DecodingFailed`] for malformed input or a shape
/// mismatch, and [`CodecError::TrailingBytes`] if the input holds more than
/// one value.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    let mut reader = bytes;
    let value = ciborium::de::from_reader(&mut reader)
        .map_err(|e| CodecError::decoding_failed(e.to_string()))?;
    if !reader.is_empty() {
        return Err(CodecError::TrailingBytes {
            remaining: reader.len(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Record {
        id: String,
        labels: BTreeMap<String, String>,
        parent: Option<String>,
        #[serde(with = "serde_bytes")]
        payload: Vec<u8>,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Extended {
        id: String,
        #[serde(default)]
        added_later: u64,
    }

    fn record() -> impl Strategy<Value = Record> {
        (
            "[a-zA-Z0-9]{1,16}",
            proptest::collection::btree_map("[a-z]{1,8}", "[a-z0-9]{0,8}", 0..4),
            proptest::option::of("[a-z0-9-]{1,12}"),
            proptest::collection::vec(any::<u8>(), 0..128),
        )
            .prop_map(|(id, labels, parent, payload)| Record {
                id,
                labels,
                parent,
                payload,
            })
    }

    proptest! {
        #[test]
        fn record_roundtrip(record in record()) {
            let bytes = encode(&record).unwrap();
            prop_assert_eq!(decode::<Record>(&bytes).unwrap(), record.clone());
            prop_assert_eq!(encode(&record.clone()).unwrap(), bytes);
        }
    }

    #[test]
    fn payload_is_a_byte_string() {
        let record = Record {
            id: "x".into(),
            labels: BTreeMap::new(),
            parent: None,
            payload: vec![7, 8],
        };
        let bytes = encode(&record).unwrap();
        assert!(bytes.windows(3).any(|w| w == [0x42, 7, 8]));
    }

    #[test]
    fn garbage_is_a_decoding_error() {
        let err = decode::<Record>(&[0xff, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, CodecError::DecodingFailed { .. }));
    }

    #[test]
    fn truncated_input_is_a_decoding_error() {
        let bytes = encode(&Extended {
            id: "abcdef".into(),
            added_later: 7,
        })
        .unwrap();
        let err = decode::<Extended>(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(err, CodecError::DecodingFailed { .. }));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = encode(&"one").unwrap();
        bytes.extend(encode(&"two").unwrap());
        assert!(matches!(
            decode::<String>(&bytes),
            Err(CodecError::TrailingBytes { .. })
        ));
    }

    #[test]
    fn missing_defaulted_field_decodes() {
        #[derive(Serialize)]
        struct Old {
            id: String,
        }
        let bytes = encode(&Old { id: "p1".into() }).unwrap();
        let upgraded: Extended = decode(&bytes).unwrap();
        assert_eq!(upgraded.added_later, 0);
    }
}
