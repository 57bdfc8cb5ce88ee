use super::{SdpValue, WireType, INLINE_TAG_LIMIT};
use bytes::Bytes;

/// Write-only SDP buffer.
///
/// A packer is used for exactly one encode operation; read it back with
/// [`Unpacker`](super::Unpacker) over the finished bytes.
#[derive(Debug, Default, Clone)]
pub struct Packer {
    buf: Vec<u8>,
}

impl Packer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Append an unsigned base-128 varint.
    #[inline]
    pub fn pack_number(&mut self, mut x: u64) {
        while x >= 0x80 {
            self.buf.push((x as u8 & 0x7f) | 0x80);
            x >>= 7;
        }
        self.buf.push(x as u8);
    }

    /// Append a header byte, spilling large tags into a trailing varint.
    #[inline]
    pub fn pack_header(&mut self, tag: u32, wire: WireType) {
        let header = wire.nibble() << 4;
        if tag < INLINE_TAG_LIMIT {
            self.buf.push(header | tag as u8);
        } else {
            self.buf.push(header | 0x0f);
            self.pack_number(u64::from(tag));
        }
    }

    /// Append raw bytes with no header or length.
    pub fn pack_raw(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Append a length-prefixed byte string (no header).
    pub fn pack_string(&mut self, data: &[u8]) {
        self.pack_number(data.len() as u64);
        self.pack_raw(data);
    }

    /// Append `value` under `tag`.
    ///
    /// Zero values are skipped entirely unless `require` is set.
    pub fn pack<T: SdpValue>(&mut self, tag: u32, value: &T, require: bool) {
        if !require && value.is_zero() {
            return;
        }
        value.pack_value(self, tag);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.buf)
    }
}
