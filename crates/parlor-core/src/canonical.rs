//! Canonical CBOR encoding for entries.
//!
//! RFC 8949 core deterministic encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! Entry ids are hashes of these bytes, so two peers must produce identical
//! encodings for the same entry.

use ciborium::value::{Integer, Value};

use crate::crypto::{Blake3Hash, PeerId, Signature};
use crate::entry::{Entry, EntryHeader};
use crate::error::CoreError;
use crate::types::{EntryId, LogAddress};

/// Header field keys. Keys 0-23 encode as single bytes.
mod keys {
    pub const VERSION: u64 = 0;
    pub const LOG: u64 = 1;
    pub const AUTHOR: u64 = 2;
    pub const TIMESTAMP: u64 = 3;
    pub const HEADS: u64 = 4;
    pub const PAYLOAD_HASH: u64 = 5;
}

/// Length of the trailing signature in [`canonical_bytes`].
const SIGNATURE_LEN: usize = 64;

/// Encode an entry header to canonical CBOR bytes.
pub fn canonical_header_bytes(header: &EntryHeader) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, &header_to_cbor_value(header));
    buf
}

/// Encode an entire entry.
///
/// Format: canonical_header || payload || signature
pub fn canonical_bytes(entry: &Entry) -> Vec<u8> {
    let mut buf = canonical_header_bytes(&entry.header);
    buf.extend_from_slice(&entry.payload);
    buf.extend_from_slice(&entry.signature.0);
    buf
}

/// The message an entry's signature covers (header || payload).
pub fn signed_message(entry: &Entry) -> Vec<u8> {
    let mut buf = canonical_header_bytes(&entry.header);
    buf.extend_from_slice(&entry.payload);
    buf
}

fn header_to_cbor_value(header: &EntryHeader) -> Value {
    let heads = header
        .heads
        .iter()
        .map(|h| Value::Bytes(h.0.to_vec()))
        .collect();

    Value::Map(vec![
        (int(keys::VERSION), Value::Integer(header.version.into())),
        (int(keys::LOG), Value::Bytes(header.log.0.to_vec())),
        (int(keys::AUTHOR), Value::Bytes(header.author.0.to_vec())),
        (int(keys::TIMESTAMP), Value::Integer(header.timestamp.into())),
        (int(keys::HEADS), Value::Array(heads)),
        (
            int(keys::PAYLOAD_HASH),
            Value::Bytes(header.payload_hash.0.to_vec()),
        ),
    ])
}

fn int(key: u64) -> Value {
    Value::Integer(key.into())
}

fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => {
            encode_uint(buf, 2, b.len() as u64);
            buf.extend_from_slice(b);
        }
        Value::Text(s) => {
            encode_uint(buf, 3, s.len() as u64);
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Array(arr) => {
            encode_uint(buf, 4, arr.len() as u64);
            for item in arr {
                encode_value_to(buf, item);
            }
        }
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        // Headers are built above from integers, bytes and arrays only.
        _ => unreachable!("unsupported CBOR value in entry header"),
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: Integer) {
    let n: i128 = i.into();
    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Encode an unsigned argument with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a map with keys sorted by their encoded bytes.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}

/// Decode an entry from its canonical bytes.
pub fn decode_entry(bytes: &[u8]) -> Result<Entry, CoreError> {
    let mut cursor = std::io::Cursor::new(bytes);
    let value: Value =
        ciborium::from_reader(&mut cursor).map_err(|e| CoreError::DecodingError(e.to_string()))?;
    let header = cbor_value_to_header(&value)?;

    let header_len = cursor.position() as usize;
    if canonical_header_bytes(&header).len() != header_len {
        return Err(CoreError::MalformedEntry("header is not canonical".into()));
    }

    let remaining = &bytes[header_len..];
    if remaining.len() < SIGNATURE_LEN {
        return Err(CoreError::MalformedEntry(
            "insufficient bytes for signature".into(),
        ));
    }

    let payload_len = remaining.len() - SIGNATURE_LEN;
    let sig_bytes: [u8; 64] = remaining[payload_len..]
        .try_into()
        .map_err(|_| CoreError::MalformedEntry("invalid signature length".into()))?;

    Ok(Entry {
        header,
        payload: remaining[..payload_len].to_vec().into(),
        signature: Signature(sig_bytes),
    })
}

fn cbor_value_to_header(value: &Value) -> Result<EntryHeader, CoreError> {
    let map = match value {
        Value::Map(m) => m,
        _ => return Err(CoreError::MalformedEntry("expected map".into())),
    };

    let get = |key: u64| -> Option<&Value> {
        map.iter()
            .find(|(k, _)| match k {
                Value::Integer(i) => i128::from(*i) == key as i128,
                _ => false,
            })
            .map(|(_, v)| v)
    };

    let version = match get(keys::VERSION) {
        Some(Value::Integer(i)) => u8::try_from(*i)
            .map_err(|_| CoreError::MalformedEntry("invalid version".into()))?,
        _ => return Err(CoreError::MalformedEntry("missing version".into())),
    };

    let log = LogAddress(bytes32(get(keys::LOG), "log")?);
    let author = PeerId(bytes32(get(keys::AUTHOR), "author")?);

    let timestamp = match get(keys::TIMESTAMP) {
        Some(Value::Integer(i)) => i64::try_from(*i)
            .map_err(|_| CoreError::MalformedEntry("invalid timestamp".into()))?,
        _ => return Err(CoreError::MalformedEntry("missing timestamp".into())),
    };

    let heads = match get(keys::HEADS) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| bytes32(Some(item), "head").map(EntryId))
            .collect::<Result<Vec<_>, _>>()?,
        _ => return Err(CoreError::MalformedEntry("missing heads".into())),
    };

    let payload_hash = Blake3Hash(bytes32(get(keys::PAYLOAD_HASH), "payload_hash")?);

    Ok(EntryHeader {
        version,
        log,
        author,
        timestamp,
        heads,
        payload_hash,
    })
}

fn bytes32(value: Option<&Value>, field: &str) -> Result<[u8; 32], CoreError> {
    match value {
        Some(Value::Bytes(b)) if b.len() == 32 => {
            let mut arr = [0u8; 32];
            arr.copy_from_slice(b);
            Ok(arr)
        }
        _ => Err(CoreError::MalformedEntry(format!("invalid {}", field))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Identity;
    use crate::entry::EntryBuilder;
    use crate::types::LogKind;

    fn sample_entry(heads: Vec<EntryId>) -> Entry {
        let identity = Identity::from_seed(&[0x42; 32]);
        EntryBuilder::new(LogAddress::derive(LogKind::Channel, "general"))
            .timestamp(1_736_870_400_000)
            .heads(heads)
            .payload(b"hello world".to_vec())
            .sign(&identity)
    }

    #[test]
    fn test_canonical_encoding_deterministic() {
        let entry = sample_entry(vec![]);
        assert_eq!(canonical_bytes(&entry), canonical_bytes(&entry));
    }

    #[test]
    fn test_integer_encoding() {
        let mut buf = Vec::new();
        encode_uint(&mut buf, 0, 23);
        assert_eq!(buf, vec![0x17]);

        buf.clear();
        encode_uint(&mut buf, 0, 24);
        assert_eq!(buf, vec![0x18, 24]);

        buf.clear();
        encode_uint(&mut buf, 0, 256);
        assert_eq!(buf, vec![0x19, 0x01, 0x00]);
    }

    #[test]
    fn test_decode_with_heads() {
        let heads = vec![EntryId::from_bytes([1; 32]), EntryId::from_bytes([2; 32])];
        let entry = sample_entry(heads);
        let decoded = decode_entry(&canonical_bytes(&entry)).unwrap();

        assert_eq!(decoded, entry);
        assert_eq!(decoded.compute_id(), entry.compute_id());
    }

    #[test]
    fn test_decode_rejects_truncated() {
        let entry = sample_entry(vec![]);
        let bytes = canonical_bytes(&entry);
        let header_len = canonical_header_bytes(&entry.header).len();
        assert!(decode_entry(&bytes[..header_len + 10]).is_err());
    }

    #[test]
    fn test_map_key_ordering() {
        let mut buf = Vec::new();
        let entries = vec![
            (int(5), Value::Integer(50.into())),
            (int(0), Value::Integer(0.into())),
        ];
        encode_map_canonical(&mut buf, &entries);
        assert_eq!(buf, vec![0xa2, 0x00, 0x00, 0x05, 0x18, 50]);
    }
}
