//! Registry operations and their resolution.
//!
//! A registry is a log whose payloads are [`RegistryOp`]s. Replaying the
//! operations in the log's total order and keeping the last put per key
//! gives every replica holding the same operations the same map.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A single registry write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryOp<V> {
    Put { key: String, value: V },
}

impl<V: Serialize + DeserializeOwned> RegistryOp<V> {
    pub fn put(key: impl Into<String>, value: V) -> Self {
        Self::Put {
            key: key.into(),
            value,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } => key,
        }
    }

    /// Encode as an entry payload.
    pub fn encode(&self) -> Result<Vec<u8>, CoreError> {
        encode_payload(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        decode_payload(bytes)
    }
}

/// Replay operations (already in total order) into the resolved map.
pub fn resolve<V>(ops: impl IntoIterator<Item = RegistryOp<V>>) -> BTreeMap<String, V> {
    let mut map = BTreeMap::new();
    for op in ops {
        match op {
            RegistryOp::Put { key, value } => {
                map.insert(key, value);
            }
        }
    }
    map
}

/// Encode any serializable value as a CBOR payload.
pub fn encode_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| CoreError::EncodingError(e.to_string()))?;
    Ok(buf)
}

/// Decode a CBOR payload.
pub fn decode_payload<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CoreError> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_put_wins() {
        let resolved = resolve(vec![
            RegistryOp::put("general", 1u32),
            RegistryOp::put("random", 2u32),
            RegistryOp::put("general", 3u32),
        ]);
        assert_eq!(resolved.get("general"), Some(&3));
        assert_eq!(resolved.get("random"), Some(&2));
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn test_op_payload_decodes() {
        let op = RegistryOp::put("alice", "half-key".to_string());
        let bytes = op.encode().unwrap();
        let back = RegistryOp::<String>::decode(&bytes).unwrap();
        assert_eq!(back.key(), "alice");
        assert_eq!(back, op);
    }

    #[test]
    fn test_garbage_payload_rejected() {
        assert!(RegistryOp::<String>::decode(&[0xff, 0x00]).is_err());
    }
}
