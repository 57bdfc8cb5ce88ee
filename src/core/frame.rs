//! # Length-Prefixed Framing
//!
//! ```text
//! [Length(4, big-endian, includes itself)] [SDP record(N)]
//! ```
//!
//! [`split_record`] is the building block for record-oriented message
//! strategies: it inspects the front of a reassembly buffer and reports whether
//! a whole frame is there, what it decoded to, or why the stream is unusable.
//! [`FrameCodec`] exposes the same framing as a `tokio_util` codec for plain
//! clients that do not need the session pipeline.

use crate::core::sdp::{self, Packer, Record};
use crate::error::{constants, ProtocolError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Size of the length prefix
pub const HEADER_LEN: usize = 4;

/// Outcome of unmarshaling the front of a receive buffer.
#[derive(Debug)]
pub enum Unmarshaled<M> {
    /// More bytes are needed.
    Incomplete,
    /// `n` bytes were consumed without producing a message.
    Consumed(usize),
    /// A complete message of `len` bytes keyed by `id`.
    Message { len: usize, id: u32, msg: M },
    /// A complete frame of `len` bytes that failed to decode. The frame is
    /// skipped and the error reported.
    Malformed { len: usize, error: ProtocolError },
    /// The stream can no longer be framed; the session is closed.
    Violation(ProtocolError),
}

impl<M> Unmarshaled<M> {
    /// Derive the message id from the decoded message.
    pub fn with_id<F: FnOnce(&M) -> u32>(self, f: F) -> Self {
        match self {
            Unmarshaled::Message { len, msg, .. } => {
                let id = f(&msg);
                Unmarshaled::Message { len, id, msg }
            }
            other => other,
        }
    }
}

/// Read the length prefix, if all four bytes are present.
pub fn frame_len(buf: &[u8]) -> Option<usize> {
    let header: [u8; HEADER_LEN] = buf.get(..HEADER_LEN)?.try_into().ok()?;
    Some(u32::from_be_bytes(header) as usize)
}

/// Prefix `payload` with its frame length.
pub fn pack_frame(payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len());
    frame.put_u32(total_len(payload.len()));
    frame.put_slice(payload);
    frame.freeze()
}

/// Encode `record` straight into a frame.
pub fn encode_frame<T: Record>(record: &T) -> Bytes {
    let mut packer = Packer::with_capacity(64);
    packer.pack_raw(&[0u8; HEADER_LEN]);
    record.pack_value(&mut packer, 0);
    let mut frame = packer.into_vec();
    let len = total_len(frame.len() - HEADER_LEN);
    frame[..HEADER_LEN].copy_from_slice(&len.to_be_bytes());
    Bytes::from(frame)
}

// Lengths beyond u32 saturate; every receiver rejects them as oversized.
fn total_len(payload: usize) -> u32 {
    u32::try_from(payload + HEADER_LEN).unwrap_or(u32::MAX)
}

/// Try to cut one framed record off the front of `buf`.
///
/// The returned message id is `0`; use [`Unmarshaled::with_id`] to key it.
pub fn split_record<T: Record>(buf: &[u8], max_frame: usize) -> Unmarshaled<T> {
    let Some(len) = frame_len(buf) else {
        return Unmarshaled::Incomplete;
    };
    if len < HEADER_LEN {
        return Unmarshaled::Violation(ProtocolError::InvalidFrame(
            constants::ERR_FRAME_TOO_SHORT,
        ));
    }
    if len > max_frame {
        return Unmarshaled::Violation(ProtocolError::OversizedFrame(len));
    }
    if buf.len() < len {
        return Unmarshaled::Incomplete;
    }
    match sdp::decode::<T>(&buf[HEADER_LEN..len]) {
        Ok(msg) => Unmarshaled::Message { len, id: 0, msg },
        Err(e) => Unmarshaled::Malformed {
            len,
            error: e.into(),
        },
    }
}

/// `tokio_util` codec yielding frame payloads (without the length prefix).
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame: usize,
}

impl FrameCodec {
    pub fn new(max_frame: usize) -> Self {
        Self { max_frame }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(crate::config::MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(len) = frame_len(src) else {
            return Ok(None);
        };
        if len < HEADER_LEN {
            return Err(ProtocolError::InvalidFrame(constants::ERR_FRAME_TOO_SHORT));
        }
        if len > self.max_frame {
            return Err(ProtocolError::OversizedFrame(len));
        }
        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }
        let mut frame = src.split_to(len);
        frame.advance(HEADER_LEN);
        Ok(Some(frame.freeze()))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = item.len() + HEADER_LEN;
        if len > self.max_frame {
            return Err(ProtocolError::OversizedFrame(len));
        }
        dst.reserve(len);
        dst.put_u32(total_len(item.len()));
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::sdp_record;

    sdp_record! {
        #[derive(Debug, Clone, Default, PartialEq)]
        struct Ping {
            kind: u32,
            body: String,
        }
    }

    fn ping(kind: u32, body: &str) -> Ping {
        Ping {
            kind,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_length_includes_header() {
        let frame = pack_frame(b"abc");
        assert_eq!(&frame[..], &[0, 0, 0, 7, b'a', b'b', b'c']);
        assert_eq!(frame_len(&frame), Some(7));
        assert_eq!(frame_len(&frame[..3]), None);
    }

    #[test]
    fn test_encode_frame_matches_pack_frame() {
        let msg = ping(3, "hi");
        assert_eq!(encode_frame(&msg), pack_frame(&sdp::encode(&msg)));
    }

    #[test]
    fn test_two_frames_and_a_partial() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&encode_frame(&ping(1, "one")));
        buf.extend_from_slice(&encode_frame(&ping(2, "two")));
        let third = encode_frame(&ping(3, "three"));
        buf.extend_from_slice(&third[..third.len() - 2]);

        let mut offset = 0;
        let mut kinds = Vec::new();
        loop {
            match split_record::<Ping>(&buf[offset..], 1024).with_id(|m| m.kind) {
                Unmarshaled::Message { len, id, msg } => {
                    assert_eq!(id, msg.kind);
                    kinds.push(id);
                    offset += len;
                }
                Unmarshaled::Incomplete => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(kinds, vec![1, 2]);
        assert_eq!(buf.len() - offset, third.len() - 2);
    }

    #[test]
    fn test_violations() {
        assert!(matches!(
            split_record::<Ping>(&[0, 0, 0, 2], 1024),
            Unmarshaled::Violation(ProtocolError::InvalidFrame(_))
        ));
        assert!(matches!(
            split_record::<Ping>(&[0, 0, 4, 1], 1024),
            Unmarshaled::Violation(ProtocolError::OversizedFrame(1025))
        ));
    }

    #[test]
    fn test_malformed_frame_is_skippable() {
        let frame = pack_frame(&[0x40, 0x05]);
        match split_record::<Ping>(&frame, 1024) {
            Unmarshaled::Malformed { len, error } => {
                assert_eq!(len, frame.len());
                assert!(matches!(error, ProtocolError::Codec(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_codec_round_trip_and_partial() {
        let mut codec = FrameCodec::new(64);
        let mut buf = BytesMut::new();
        codec.encode(Bytes::from_static(b"hello"), &mut buf).unwrap();
        let whole = buf.clone();

        let mut partial = BytesMut::from(&whole[..5]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
        assert_eq!(partial.len(), 5);

        let payload = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&payload[..], b"hello");
        assert!(buf.is_empty());

        assert!(codec
            .encode(Bytes::from(vec![0u8; 61]), &mut BytesMut::new())
            .is_err());
    }
}
