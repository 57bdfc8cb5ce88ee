use super::{Packer, SdpError, SdpValue, Unpacker, WireType};

/// Schema entry for one record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDesc {
    pub name: &'static str,
    /// Explicit wire tag. `None` means the field is matched by position.
    pub tag: Option<u32>,
    /// Required fields are written even when they hold their zero value.
    pub required: bool,
}

/// A struct with a compile-time SDP schema, normally produced by
/// [`sdp_record!`](crate::sdp_record).
pub trait Record: SdpValue {
    const FIELDS: &'static [FieldDesc];

    /// Write every field (without the surrounding record markers).
    fn pack_fields(&self, packer: &mut Packer);

    /// Decode the value of field `index` (a position in [`Record::FIELDS`]).
    ///
    /// Out-of-range indices skip the value.
    fn unpack_field(
        &mut self,
        index: usize,
        unpacker: &mut Unpacker<'_>,
        wire: WireType,
    ) -> Result<(), SdpError>;

    /// Map a wire tag to a field index.
    ///
    /// An explicit tag wins. Otherwise the tag is taken as a position, but only
    /// if the field at that position has no explicit tag of its own.
    fn field_index(tag: u32) -> Option<usize> {
        if let Some(index) = Self::FIELDS.iter().position(|f| f.tag == Some(tag)) {
            return Some(index);
        }
        let index = usize::try_from(tag).ok()?;
        match Self::FIELDS.get(index) {
            Some(field) if field.tag.is_none() => Some(index),
            _ => None,
        }
    }
}

/// Write `record` as a record-begin header, its fields, and the end marker.
pub fn pack_record<T: Record>(record: &T, packer: &mut Packer, tag: u32) {
    packer.pack_header(tag, WireType::StructBegin);
    record.pack_fields(packer);
    packer.pack_header(0, WireType::StructEnd);
}

/// Read fields until the end marker, skipping any tag the schema does not know.
pub fn unpack_record<T: Record>(
    record: &mut T,
    unpacker: &mut Unpacker<'_>,
    wire: WireType,
) -> Result<(), SdpError> {
    if wire != WireType::StructBegin {
        return Err(SdpError::TypeMismatch {
            expected: "record",
            found: wire,
        });
    }
    unpacker.enter()?;
    loop {
        let (tag, wire) = unpacker.unpack_header()?;
        if wire == WireType::StructEnd {
            break;
        }
        match T::field_index(tag) {
            Some(index) => record.unpack_field(index, unpacker, wire)?,
            None => unpacker.skip(wire)?,
        }
    }
    unpacker.leave();
    Ok(())
}
