//! Versioned binary envelope for engine-opaque values.
//!
//! OTHER/STRUCT/REF column values are engine- or runtime-specific blobs
//! that no dialect-neutral text form exists for. They are carried through
//! the catalog inside this envelope and then base64-encoded like any other
//! binary value.
//!
//! Wire layout (big-endian):
//!
//! ```text
//! +------+---------+------+-------------+----------+
//! | 'S'  | 'F'     | ver  | kind        | len: u32 |  payload...
//! +------+---------+------+-------------+----------+
//! ```
//!
//! Version 1 is the first and current version. This format intentionally
//! replaces the native object serialization of earlier tooling; catalogs
//! produced with a native-serialization envelope are not readable and fail
//! with a malformed-value error on the magic check.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{FerryError, Result};
use crate::types::SqlTypeCode;

const MAGIC: [u8; 2] = *b"SF";
const VERSION: u8 = 1;
const HEADER_LEN: usize = 2 + 1 + 1 + 4;

/// Which opaque column class the payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpaqueKind {
    Other = 0,
    Struct = 1,
    Ref = 2,
}

impl OpaqueKind {
    /// Envelope kind for an opaque column's type code.
    pub fn for_type(code: SqlTypeCode) -> Option<OpaqueKind> {
        match code {
            SqlTypeCode::Other => Some(OpaqueKind::Other),
            SqlTypeCode::Struct => Some(OpaqueKind::Struct),
            SqlTypeCode::Ref => Some(OpaqueKind::Ref),
            _ => None,
        }
    }

    fn from_tag(tag: u8) -> Option<OpaqueKind> {
        match tag {
            0 => Some(OpaqueKind::Other),
            1 => Some(OpaqueKind::Struct),
            2 => Some(OpaqueKind::Ref),
            _ => None,
        }
    }
}

/// A decoded envelope: kind tag plus raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub kind: OpaqueKind,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn new(kind: OpaqueKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }

    /// Encode to the versioned wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_slice(&MAGIC);
        buf.put_u8(VERSION);
        buf.put_u8(self.kind as u8);
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
        buf.to_vec()
    }

    /// Decode from the wire form, validating magic, version, kind and
    /// payload length.
    pub fn decode(column: &str, bytes: &[u8]) -> Result<Envelope> {
        if bytes.len() < HEADER_LEN {
            return Err(FerryError::malformed(column, "opaque envelope truncated"));
        }
        let mut buf = bytes;
        let mut magic = [0u8; 2];
        buf.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(FerryError::malformed(
                column,
                "opaque envelope magic mismatch (legacy native-serialization catalogs are not supported)",
            ));
        }
        let version = buf.get_u8();
        if version != VERSION {
            return Err(FerryError::malformed(
                column,
                format!("unsupported envelope version {}", version),
            ));
        }
        let tag = buf.get_u8();
        let kind = OpaqueKind::from_tag(tag)
            .ok_or_else(|| FerryError::malformed(column, format!("unknown envelope kind {}", tag)))?;
        let len = buf.get_u32() as usize;
        if buf.remaining() != len {
            return Err(FerryError::malformed(
                column,
                format!("envelope length {} does not match payload {}", len, buf.remaining()),
            ));
        }
        Ok(Envelope::new(kind, buf.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let envelope = Envelope::new(OpaqueKind::Struct, vec![0, 1, 2, 0, 255]);
        let encoded = envelope.encode();
        let decoded = Envelope::decode("c", &encoded).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_empty_payload() {
        let envelope = Envelope::new(OpaqueKind::Other, Vec::new());
        let decoded = Envelope::decode("c", &envelope.encode()).unwrap();
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_rejects_foreign_magic() {
        // A Java native-serialization stream starts with 0xAC 0xED.
        let legacy = [0xACu8, 0xED, 0x00, 0x05, 0x73, 0x72, 0x00, 0x10, 0x00];
        let err = Envelope::decode("c", &legacy).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_rejects_bad_length() {
        let mut encoded = Envelope::new(OpaqueKind::Ref, vec![1, 2, 3]).encode();
        encoded.truncate(encoded.len() - 1);
        assert!(Envelope::decode("c", &encoded).is_err());
    }
}
