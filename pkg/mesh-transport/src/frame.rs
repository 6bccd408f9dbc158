//! Bit-exact wire framing (spec.md §6): every frame is
//! `u32 total_length | u8 version | u8 frame_type | u16 header_length |
//!  u32 payload_length | header_bytes | payload_bytes`, all integers big
//! endian. `total_length` covers everything that follows it (version through
//! payload) so a reader can size one `read_exact` call after the first four
//! bytes.
//!
//! The header is a length-prefixed sequence of small typed key/value pairs
//! carrying `(from_node, to_node_or_broadcast, stream_id?, seq?,
//! correlation_id?, auth_tag)`, mirroring the teacher's own length-prefixed
//! HTTP/2 HPACK framing style (`pkg/http/src/hpack`) without adopting its
//! dynamic table machinery, which this mesh protocol has no use for.

use std::convert::TryInto;

use mesh_common::errors::{format_err, Result};
use mesh_common::ids::{NodeId, StreamId};

pub const WIRE_VERSION: u8 = 1;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FrameType {
    Data = 0,
    Control = 1,
    Ping = 2,
    Pong = 3,
    Close = 4,
    /// Link-level credit replenishment (spec.md §4.A). Never surfaced past
    /// `Link::recv`; `mesh-service` never sees one.
    Grant = 5,
}

impl FrameType {
    fn from_u8(v: u8) -> Result<Self> {
        Ok(match v {
            0 => FrameType::Data,
            1 => FrameType::Control,
            2 => FrameType::Ping,
            3 => FrameType::Pong,
            4 => FrameType::Close,
            5 => FrameType::Grant,
            other => return Err(format_err!("unknown frame_type {}", other)),
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct FrameHeader {
    pub from_node: Option<NodeId>,
    /// `None` means broadcast (spec.md §6: `to_node_or_broadcast`).
    pub to_node: Option<NodeId>,
    pub stream_id: Option<StreamId>,
    pub seq: Option<u64>,
    pub correlation_id: Option<u64>,
    pub auth_tag: Option<Vec<u8>>,
}

#[derive(Clone, Debug)]
pub struct Frame {
    pub frame_type: FrameType,
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

// Header key ids.
const KEY_FROM_NODE: u8 = 0;
const KEY_TO_NODE: u8 = 1;
const KEY_STREAM_ID: u8 = 2;
const KEY_SEQ: u8 = 3;
const KEY_CORRELATION_ID: u8 = 4;
const KEY_AUTH_TAG: u8 = 5;

fn encode_header(h: &FrameHeader) -> Vec<u8> {
    let mut out = Vec::new();
    let mut put = |key: u8, value: &[u8]| {
        out.push(key);
        out.extend_from_slice(&(value.len() as u16).to_be_bytes());
        out.extend_from_slice(value);
    };

    if let Some(n) = h.from_node {
        put(KEY_FROM_NODE, &n.to_bytes());
    }
    // Broadcast is represented as a zero-length value for KEY_TO_NODE so the
    // key is always present and unambiguous on the wire.
    match h.to_node {
        Some(n) => put(KEY_TO_NODE, &n.to_bytes()),
        None => put(KEY_TO_NODE, &[]),
    }
    if let Some(s) = h.stream_id {
        put(KEY_STREAM_ID, &s.to_bytes());
    }
    if let Some(seq) = h.seq {
        put(KEY_SEQ, &seq.to_be_bytes());
    }
    if let Some(cid) = h.correlation_id {
        put(KEY_CORRELATION_ID, &cid.to_be_bytes());
    }
    if let Some(tag) = &h.auth_tag {
        put(KEY_AUTH_TAG, tag);
    }

    out
}

fn decode_header(mut buf: &[u8]) -> Result<FrameHeader> {
    let mut h = FrameHeader::default();
    while !buf.is_empty() {
        if buf.len() < 3 {
            return Err(format_err!("truncated frame header entry"));
        }
        let key = buf[0];
        let len = u16::from_be_bytes([buf[1], buf[2]]) as usize;
        buf = &buf[3..];
        if buf.len() < len {
            return Err(format_err!("truncated frame header value"));
        }
        let value = &buf[..len];
        buf = &buf[len..];

        match key {
            KEY_FROM_NODE => h.from_node = Some(NodeId::from_bytes(value.try_into()?)),
            KEY_TO_NODE => {
                h.to_node = if value.is_empty() {
                    None
                } else {
                    Some(NodeId::from_bytes(value.try_into()?))
                }
            }
            KEY_STREAM_ID => h.stream_id = Some(StreamId::from_bytes(value.try_into()?)),
            KEY_SEQ => h.seq = Some(u64::from_be_bytes(value.try_into()?)),
            KEY_CORRELATION_ID => h.correlation_id = Some(u64::from_be_bytes(value.try_into()?)),
            KEY_AUTH_TAG => h.auth_tag = Some(value.to_vec()),
            _ => {
                // Unknown keys are forward-compatible: skip rather than error.
            }
        }
    }
    Ok(h)
}

impl Frame {
    pub fn encode(&self) -> Vec<u8> {
        let header_bytes = encode_header(&self.header);
        let mut out = Vec::with_capacity(12 + header_bytes.len() + self.payload.len());

        let total_length = (1 + 1 + 2 + 4 + header_bytes.len() + self.payload.len()) as u32;
        out.extend_from_slice(&total_length.to_be_bytes());
        out.push(WIRE_VERSION);
        out.push(self.frame_type as u8);
        out.extend_from_slice(&(header_bytes.len() as u16).to_be_bytes());
        out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&header_bytes);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decodes a frame from a buffer that starts with the `total_length`
    /// prefix and contains at least that many bytes beyond it. Returns the
    /// frame and the number of bytes consumed, or `None` if `buf` doesn't yet
    /// contain a full frame.
    pub fn decode(buf: &[u8]) -> Result<Option<(Frame, usize)>> {
        if buf.len() < 4 {
            return Ok(None);
        }
        let total_length = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
        if buf.len() < 4 + total_length {
            return Ok(None);
        }

        let body = &buf[4..4 + total_length];
        if body.len() < 8 {
            return Err(format_err!("frame too short for fixed header"));
        }
        let version = body[0];
        if version != WIRE_VERSION {
            return Err(format_err!("protocol_mismatch: version {}", version));
        }
        let frame_type = FrameType::from_u8(body[1])?;
        let header_length = u16::from_be_bytes(body[2..4].try_into().unwrap()) as usize;
        let payload_length = u32::from_be_bytes(body[4..8].try_into().unwrap()) as usize;

        let header_start = 8;
        let header_end = header_start + header_length;
        let payload_end = header_end + payload_length;
        if body.len() < payload_end {
            return Err(format_err!("frame length fields inconsistent with body"));
        }

        let header = decode_header(&body[header_start..header_end])?;
        let payload = body[header_end..payload_end].to_vec();

        Ok(Some((
            Frame {
                frame_type,
                header,
                payload,
            },
            4 + total_length,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_unicast_data_frame() {
        let frame = Frame {
            frame_type: FrameType::Data,
            header: FrameHeader {
                from_node: Some(NodeId(1)),
                to_node: Some(NodeId(2)),
                stream_id: Some(StreamId(9)),
                seq: Some(42),
                correlation_id: None,
                auth_tag: Some(vec![0xAB, 0xCD]),
            },
            payload: b"hello".to_vec(),
        };

        let bytes = frame.encode();
        let (decoded, consumed) = Frame::decode(&bytes).unwrap().unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded.header.from_node, Some(NodeId(1)));
        assert_eq!(decoded.header.to_node, Some(NodeId(2)));
        assert_eq!(decoded.header.seq, Some(42));
        assert_eq!(decoded.payload, b"hello");
    }

    #[test]
    fn broadcast_to_node_round_trips_as_none() {
        let frame = Frame {
            frame_type: FrameType::Control,
            header: FrameHeader {
                from_node: Some(NodeId(1)),
                to_node: None,
                ..Default::default()
            },
            payload: vec![],
        };
        let bytes = frame.encode();
        let (decoded, _) = Frame::decode(&bytes).unwrap().unwrap();
        assert_eq!(decoded.header.to_node, None);
    }

    #[test]
    fn decode_reports_incomplete_frame() {
        let frame = Frame {
            frame_type: FrameType::Ping,
            header: FrameHeader::default(),
            payload: vec![1, 2, 3],
        };
        let bytes = frame.encode();
        assert!(Frame::decode(&bytes[..bytes.len() - 1]).unwrap().is_none());
    }

    #[test]
    fn rejects_mismatched_version() {
        let frame = Frame {
            frame_type: FrameType::Ping,
            header: FrameHeader::default(),
            payload: vec![],
        };
        let mut bytes = frame.encode();
        bytes[4] = 7; // version byte
        assert!(Frame::decode(&bytes).is_err());
    }
}
