use super::{SdpError, SdpValue, WireType, MAX_DEPTH};

/// Read-only SDP cursor over a borrowed buffer.
#[derive(Debug, Clone)]
pub struct Unpacker<'a> {
    buf: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Unpacker<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            depth: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Read an unsigned base-128 varint.
    ///
    /// The cursor only moves when a complete number was read.
    pub fn unpack_number(&mut self) -> Result<u64, SdpError> {
        let mut x = 0u64;
        let mut shift = 0u32;
        let mut i = self.pos;
        loop {
            let b = *self.buf.get(i).ok_or(SdpError::UnexpectedEof)?;
            i += 1;
            // the tenth group may only contribute the top bit
            if shift == 63 && b > 1 {
                return Err(SdpError::Overflow);
            }
            x |= u64::from(b & 0x7f) << shift;
            if b < 0x80 {
                self.pos = i;
                return Ok(x);
            }
            shift += 7;
            if shift > 63 {
                return Err(SdpError::Overflow);
            }
        }
    }

    /// Read a header byte and, for spilled tags, the trailing tag varint.
    pub fn unpack_header(&mut self) -> Result<(u32, WireType), SdpError> {
        let header = *self.buf.get(self.pos).ok_or(SdpError::UnexpectedEof)?;
        let wire = WireType::from_nibble(header >> 4)?;
        self.pos += 1;
        let tag = u32::from(header & 0x0f);
        if tag == 0x0f {
            let tag = self.unpack_number()?;
            return u32::try_from(tag)
                .map(|tag| (tag, wire))
                .map_err(|_| SdpError::Overflow);
        }
        Ok((tag, wire))
    }

    /// Borrow the next `n` raw bytes.
    pub fn unpack_raw(&mut self, n: usize) -> Result<&'a [u8], SdpError> {
        let end = self.pos.checked_add(n).ok_or(SdpError::UnexpectedEof)?;
        let bytes = self.buf.get(self.pos..end).ok_or(SdpError::UnexpectedEof)?;
        self.pos = end;
        Ok(bytes)
    }

    /// Read a length-prefixed byte string (no header).
    pub fn unpack_string(&mut self) -> Result<&'a [u8], SdpError> {
        let len = self.unpack_length()?;
        self.unpack_raw(len)
    }

    /// Read a varint used as a length or element count.
    ///
    /// Every element occupies at least one byte, so a count larger than the
    /// remaining input can never be satisfied.
    pub fn unpack_length(&mut self) -> Result<usize, SdpError> {
        let len = self.unpack_number()?;
        match usize::try_from(len) {
            Ok(len) if len <= self.remaining() => Ok(len),
            _ => Err(SdpError::UnexpectedEof),
        }
    }

    /// Read the next header and its value, ignoring the tag.
    ///
    /// This is how positional values (sequence elements, map entries, RPC
    /// arguments) are read.
    pub fn unpack<T: SdpValue>(&mut self) -> Result<T, SdpError> {
        let (_, wire) = self.unpack_header()?;
        let mut value = T::default();
        value.unpack_value(self, wire)?;
        Ok(value)
    }

    /// Skip one value of the given wire type, recursing into containers.
    pub fn skip(&mut self, wire: WireType) -> Result<(), SdpError> {
        match wire {
            WireType::PositiveInt | WireType::NegativeInt | WireType::Float | WireType::Double => {
                self.unpack_number()?;
            }
            WireType::String => {
                self.unpack_string()?;
            }
            WireType::Vector => {
                let count = self.unpack_length()?;
                self.enter()?;
                for _ in 0..count {
                    self.skip_field()?;
                }
                self.leave();
            }
            WireType::Map => {
                let count = self.unpack_length()?;
                self.enter()?;
                for _ in 0..count {
                    self.skip_field()?;
                    self.skip_field()?;
                }
                self.leave();
            }
            WireType::StructBegin => {
                self.enter()?;
                loop {
                    let (_, wire) = self.unpack_header()?;
                    if wire == WireType::StructEnd {
                        break;
                    }
                    self.skip(wire)?;
                }
                self.leave();
            }
            WireType::StructEnd => {}
        }
        Ok(())
    }

    /// Skip a header and the value it introduces.
    pub fn skip_field(&mut self) -> Result<(), SdpError> {
        let (_, wire) = self.unpack_header()?;
        self.skip(wire)
    }

    pub(crate) fn enter(&mut self) -> Result<(), SdpError> {
        if self.depth >= MAX_DEPTH {
            return Err(SdpError::DepthExceeded(MAX_DEPTH));
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}
