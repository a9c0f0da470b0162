//! Primitive payload codecs
//!
//! Strings are length-prefixed (u32 BE) UTF-8, floats are big-endian IEEE-754
//! and JSON documents are plain UTF-8 text. Decoders take a buffer plus
//! offset and return the offset just past what they consumed.

use bytes::BufMut;
use serde::{de::DeserializeOwned, Serialize};

use datalink_core::{LinkError, LinkResult};

/// Ensure `needed` bytes are available at `offset`
#[inline]
fn require(buf: &[u8], offset: usize, needed: usize) -> LinkResult<()> {
    let available = buf.len().saturating_sub(offset);
    if available < needed {
        return Err(LinkError::TruncatedData {
            expected: needed,
            actual: available,
        });
    }
    Ok(())
}

/// Read a big-endian u32
pub fn unpack_u32(buf: &[u8], offset: usize) -> LinkResult<(usize, u32)> {
    require(buf, offset, 4)?;
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    Ok((offset + 4, u32::from_be_bytes(bytes)))
}

/// Length-prefixed UTF-8 string
pub fn pack_string(s: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + s.len());
    put_string(&mut buf, s);
    buf
}

/// Append a length-prefixed string to a buffer
pub fn put_string(buf: &mut impl BufMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

/// Read a length-prefixed string
pub fn unpack_string(buf: &[u8], offset: usize) -> LinkResult<(usize, String)> {
    let (offset, len) = unpack_u32(buf, offset)?;
    let len = len as usize;
    require(buf, offset, len)?;

    let s = std::str::from_utf8(&buf[offset..offset + len])
        .map_err(|e| LinkError::MalformedPayload(format!("invalid UTF-8 string: {e}")))?;
    Ok((offset + len, s.to_string()))
}

/// Pack floats as big-endian f32
pub fn pack_floats(values: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * 4);
    put_floats(&mut buf, values);
    buf
}

/// Append big-endian f32 values to a buffer
pub fn put_floats(buf: &mut impl BufMut, values: &[f32]) {
    for v in values {
        buf.put_f32(*v);
    }
}

/// Read `count` big-endian f32 values
pub fn unpack_floats(buf: &[u8], offset: usize, count: usize) -> LinkResult<(usize, Vec<f32>)> {
    require(buf, offset, count * 4)?;
    let values = buf[offset..offset + count * 4]
        .chunks_exact(4)
        .map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok((offset + count * 4, values))
}

/// Serialize a document to UTF-8 JSON bytes
pub fn encode_json<T: Serialize + ?Sized>(doc: &T) -> LinkResult<Vec<u8>> {
    serde_json::to_vec(doc).map_err(|e| LinkError::MalformedPayload(e.to_string()))
}

/// Parse UTF-8 JSON bytes into a document
pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> LinkResult<T> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| LinkError::MalformedPayload(format!("invalid UTF-8 payload: {e}")))?;
    serde_json::from_str(text).map_err(|e| LinkError::MalformedPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    #[test]
    fn test_string_layout() {
        let bytes = pack_string("Kevin");
        assert_eq!(&bytes[..4], &[0, 0, 0, 5]);
        assert_eq!(&bytes[4..], b"Kevin");
    }

    #[test]
    fn test_empty_string() {
        let bytes = pack_string("");
        assert_eq!(bytes, vec![0, 0, 0, 0]);
        assert_eq!(unpack_string(&bytes, 0).unwrap(), (4, String::new()));
    }

    #[test]
    fn test_multibyte_length_is_bytes() {
        let bytes = pack_string("Zoë");
        assert_eq!(&bytes[..4], &[0, 0, 0, 4]);
        assert_eq!(unpack_string(&bytes, 0).unwrap().1, "Zoë");
    }

    #[test]
    fn test_string_truncated() {
        let mut bytes = pack_string("truncated");
        bytes.truncate(8);
        assert!(matches!(
            unpack_string(&bytes, 0),
            Err(LinkError::TruncatedData {
                expected: 9,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_string_at_offset() {
        let mut buf = pack_string("first");
        buf.extend(pack_string("second"));
        let (offset, a) = unpack_string(&buf, 0).unwrap();
        let (end, b) = unpack_string(&buf, offset).unwrap();
        assert_eq!(a, "first");
        assert_eq!(b, "second");
        assert_eq!(end, buf.len());
    }

    #[test]
    fn test_invalid_utf8_string() {
        let buf = [0, 0, 0, 2, 0xC3, 0x28];
        assert!(matches!(
            unpack_string(&buf, 0),
            Err(LinkError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_floats_big_endian() {
        let bytes = pack_floats(&[1.0, -2.5]);
        assert_eq!(&bytes[..4], &1.0f32.to_be_bytes());
        let (end, values) = unpack_floats(&bytes, 0, 2).unwrap();
        assert_eq!(end, 8);
        assert_eq!(values, vec![1.0, -2.5]);
        assert!(unpack_floats(&bytes, 4, 2).is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let doc = json!({
            "Application": "Blender",
            "Version": "4.1.0",
            "nested": { "list": [1, 2.5, null, true] }
        });
        let bytes = encode_json(&doc).unwrap();
        let back: Value = decode_json(&bytes).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_json_malformed() {
        assert!(matches!(
            decode_json::<Value>(b"{not json"),
            Err(LinkError::MalformedPayload(_))
        ));
        assert!(matches!(
            decode_json::<Value>(&[0xFF, 0xFE]),
            Err(LinkError::MalformedPayload(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_string_roundtrip(s in ".*") {
            let bytes = pack_string(&s);
            let (end, back) = unpack_string(&bytes, 0).unwrap();
            prop_assert_eq!(end, bytes.len());
            prop_assert_eq!(back, s);
        }

        #[test]
        fn prop_json_map_roundtrip(map in proptest::collection::btree_map(".{0,12}", any::<i64>(), 0..8)) {
            let bytes = encode_json(&map).unwrap();
            let back: std::collections::BTreeMap<String, i64> = decode_json(&bytes).unwrap();
            prop_assert_eq!(back, map);
        }
    }
}
