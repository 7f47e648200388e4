//! Value codec for the hybrid engine.
//!
//! Arbitrary structured values (primitives, sequences, mappings, null) are
//! carried as `serde_json::Value` and encoded as UTF-8 JSON text. The
//! contract is round-trip identity within this crate, not canonical bytes
//! across implementations.

use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::Value;

/// Encode a value for encryption. Unsupported inputs (maps with non-string
/// keys, values whose `Serialize` impl fails) are rejected with
/// `FormatConversion` before any primitive runs.
pub fn to_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| Error::format_with("serialize", "value is not representable", e))
}

/// Decode a previously serialized value.
pub fn from_bytes(bytes: &[u8]) -> Result<Value> {
    serde_json::from_slice(bytes)
        .map_err(|e| Error::format_with("deserialize", "payload is not valid serialized data", e))
}
