//! The three on-wire header shapes (spec §3 / §4.5), layered directly on top
//! of the plaintext payload produced by `steambot-transport`'s encrypted
//! connection.
//!
//! Simple header: `u32 msgType`.
//! Extended header: `u32 msgType | u8 hdrsize=36 | u16 hdrversion=2 | u64
//! targetJobId | u64 sourceJobId | u8 hdrCanary=239 | u64 steamId | i32
//! sessionId`.
//! Protobuf header: `u32 msgType|0x80000000 | u32 protoHdrSize | <serialized
//! CMsgProtoBufHeader> | <serialized body>`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message as _;

use crate::proto::CMsgProtoBufHeader;

pub const PROTO_MASK: u32 = 0x8000_0000;
pub const EXTENDED_HEADER_SIZE: u8 = 36;
pub const EXTENDED_HEADER_VERSION: u16 = 2;
pub const EXTENDED_HEADER_CANARY: u8 = 239;

/// Sentinel for "no job id", used in both the extended and protobuf headers.
pub const JOBID_NONE: u64 = u64::MAX;

#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    #[error("short read: need at least {need} bytes, got {got}")]
    ShortRead { need: usize, got: usize },
    #[error("extended header canary mismatch: expected {expected}, got {actual}")]
    BadCanary { expected: u8, actual: u8 },
    #[error("message type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: u32, actual: u32 },
    #[error("protobuf framing expected a protobuf-tagged message, got plain msgType {0}")]
    NotProtobuf(u32),
    #[error("protobuf header decode failed: {0}")]
    ProtoDecode(#[from] prost::DecodeError),
}

/// Reads the low 31 bits of the leading `u32`, the part that identifies the
/// message regardless of header shape.
pub fn peek_msg_type(bytes: &[u8]) -> Result<u32, HeaderError> {
    if bytes.len() < 4 {
        return Err(HeaderError::ShortRead {
            need: 4,
            got: bytes.len(),
        });
    }
    let raw = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    Ok(raw & !PROTO_MASK)
}

/// True if the leading `u32`'s top bit marks a protobuf-framed message.
pub fn is_protobuf(bytes: &[u8]) -> Result<bool, HeaderError> {
    if bytes.len() < 4 {
        return Err(HeaderError::ShortRead {
            need: 4,
            got: bytes.len(),
        });
    }
    let raw = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    Ok(raw & PROTO_MASK != 0)
}

pub fn encode_simple(msg_type: u32, body: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(4 + body.len());
    out.put_u32_le(msg_type);
    out.put_slice(body);
    out.freeze()
}

pub fn decode_simple(bytes: &[u8], expected_msg_type: u32) -> Result<Bytes, HeaderError> {
    if bytes.len() < 4 {
        return Err(HeaderError::ShortRead {
            need: 4,
            got: bytes.len(),
        });
    }
    let msg_type = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    if msg_type != expected_msg_type {
        return Err(HeaderError::TypeMismatch {
            expected: expected_msg_type,
            actual: msg_type,
        });
    }
    Ok(Bytes::copy_from_slice(&bytes[4..]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedHeader {
    pub msg_type: u32,
    pub target_job_id: u64,
    pub source_job_id: u64,
    pub steam_id: u64,
    pub session_id: i32,
}

pub fn encode_extended(header: &ExtendedHeader, body: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(36 + body.len());
    out.put_u32_le(header.msg_type);
    out.put_u8(EXTENDED_HEADER_SIZE);
    out.put_u16_le(EXTENDED_HEADER_VERSION);
    out.put_u64_le(header.target_job_id);
    out.put_u64_le(header.source_job_id);
    out.put_u8(EXTENDED_HEADER_CANARY);
    out.put_u64_le(header.steam_id);
    out.put_i32_le(header.session_id);
    out.put_slice(body);
    out.freeze()
}

pub fn decode_extended(bytes: &[u8]) -> Result<(ExtendedHeader, Bytes), HeaderError> {
    if bytes.len() < 36 {
        return Err(HeaderError::ShortRead {
            need: 36,
            got: bytes.len(),
        });
    }
    let mut cursor = &bytes[..];
    let msg_type = cursor.get_u32_le();
    let _hdrsize = cursor.get_u8();
    let _hdrversion = cursor.get_u16_le();
    let target_job_id = cursor.get_u64_le();
    let source_job_id = cursor.get_u64_le();
    let canary = cursor.get_u8();
    if canary != EXTENDED_HEADER_CANARY {
        return Err(HeaderError::BadCanary {
            expected: EXTENDED_HEADER_CANARY,
            actual: canary,
        });
    }
    let steam_id = cursor.get_u64_le();
    let session_id = cursor.get_i32_le();
    Ok((
        ExtendedHeader {
            msg_type,
            target_job_id,
            source_job_id,
            steam_id,
            session_id,
        },
        Bytes::copy_from_slice(cursor),
    ))
}

pub fn encode_protobuf(msg_type: u32, header: &CMsgProtoBufHeader, body: &[u8]) -> Bytes {
    let header_bytes = header.encode_to_vec();
    let mut out = BytesMut::with_capacity(8 + header_bytes.len() + body.len());
    out.put_u32_le(msg_type | PROTO_MASK);
    out.put_u32_le(header_bytes.len() as u32);
    out.put_slice(&header_bytes);
    out.put_slice(body);
    out.freeze()
}

pub fn decode_protobuf(bytes: &[u8]) -> Result<(u32, CMsgProtoBufHeader, Bytes), HeaderError> {
    if bytes.len() < 8 {
        return Err(HeaderError::ShortRead {
            need: 8,
            got: bytes.len(),
        });
    }
    let raw_type = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    if raw_type & PROTO_MASK == 0 {
        return Err(HeaderError::NotProtobuf(raw_type));
    }
    let msg_type = raw_type & !PROTO_MASK;
    let header_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
    if bytes.len() < 8 + header_size {
        return Err(HeaderError::ShortRead {
            need: 8 + header_size,
            got: bytes.len(),
        });
    }
    let header = CMsgProtoBufHeader::decode(&bytes[8..8 + header_size])?;
    let body = Bytes::copy_from_slice(&bytes[8 + header_size..]);
    Ok((msg_type, header, body))
}

/// Builds the reply header for a request/response pair: copies
/// `jobid_source` into `jobid_target` per spec §4.5/§9, leaving everything
/// else at its default.
pub fn reply_header(request: &CMsgProtoBufHeader) -> CMsgProtoBufHeader {
    CMsgProtoBufHeader {
        jobid_target: request.jobid_source,
        ..Default::default()
    }
}

/// Umbrella over the three header shapes, for call sites that don't care
/// which one they got (e.g. logging, dispatch-by-msg-type).
#[derive(Debug, Clone)]
pub enum Header {
    Simple { msg_type: u32 },
    Extended(ExtendedHeader),
    Protobuf { msg_type: u32, header: CMsgProtoBufHeader },
}

impl Header {
    pub fn msg_type(&self) -> u32 {
        match self {
            Header::Simple { msg_type } => *msg_type,
            Header::Extended(header) => header.msg_type,
            Header::Protobuf { msg_type, .. } => *msg_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_header_roundtrip() {
        let encoded = encode_simple(42, b"payload");
        let body = decode_simple(&encoded, 42).unwrap();
        assert_eq!(&body[..], b"payload");
    }

    #[test]
    fn simple_header_rejects_wrong_type() {
        let encoded = encode_simple(42, b"payload");
        assert!(matches!(
            decode_simple(&encoded, 7),
            Err(HeaderError::TypeMismatch { expected: 7, actual: 42 })
        ));
    }

    #[test]
    fn extended_header_roundtrip() {
        let header = ExtendedHeader {
            msg_type: 123,
            target_job_id: JOBID_NONE,
            source_job_id: 99,
            steam_id: 0x0110_0001_2345_6789,
            session_id: 7,
        };
        let encoded = encode_extended(&header, b"body bytes");
        let (decoded, body) = decode_extended(&encoded).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(&body[..], b"body bytes");
    }

    #[test]
    fn extended_header_detects_bad_canary() {
        let header = ExtendedHeader {
            msg_type: 1,
            target_job_id: 0,
            source_job_id: 0,
            steam_id: 0,
            session_id: 0,
        };
        let mut encoded = encode_extended(&header, b"").to_vec();
        encoded[23] = 0; // canary byte (offset 4+1+2+8+8)
        assert!(matches!(
            decode_extended(&encoded),
            Err(HeaderError::BadCanary { .. })
        ));
    }

    #[test]
    fn protobuf_header_roundtrip_and_job_id_propagation() {
        let request_header = CMsgProtoBufHeader {
            steamid: Some(0xABCD),
            client_sessionid: Some(3),
            jobid_source: Some(555),
            ..Default::default()
        };
        let encoded = encode_protobuf(5514, &request_header, b"body");
        assert!(is_protobuf(&encoded).unwrap());
        assert_eq!(peek_msg_type(&encoded).unwrap(), 5514);

        let (msg_type, decoded_header, body) = decode_protobuf(&encoded).unwrap();
        assert_eq!(msg_type, 5514);
        assert_eq!(decoded_header.steamid, Some(0xABCD));
        assert_eq!(&body[..], b"body");

        let reply = reply_header(&decoded_header);
        assert_eq!(reply.jobid_target, Some(555));
    }
}
