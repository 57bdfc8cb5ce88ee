//! # SDP Codec
//!
//! Self-describing tag/type/length binary encoding.
//!
//! Every value is preceded by a header byte:
//!
//! ```text
//!  7   6   5   4   3   2   1   0
//! [  wire type    ][   field tag   ]
//! ```
//!
//! A field tag of `15` means the real tag follows as a varint. Integers are
//! base-128 varints (low group first, continuation bit `0x80`); negative integers
//! carry their magnitude under a distinct wire type. Floats are their IEEE-754 bit
//! pattern written as a varint. Strings are a varint length followed by raw bytes;
//! sequences and maps are a varint count followed by the elements (element tags are
//! always `0`). Records open with a record-begin header and close with the one-byte
//! marker `0x80`.
//!
//! Decoding a record skips any field whose tag it does not know, including whole
//! nested structures, so older readers keep working against newer writers.
//!
//! ## Usage
//! ```rust
//! use stnet::core::sdp;
//! use stnet::sdp_record;
//!
//! sdp_record! {
//!     #[derive(Debug, Clone, Default, PartialEq)]
//!     pub struct Login {
//!         pub user: String => { tag: 0, required: true },
//!         pub level: u32 => { tag: 1 },
//!         pub scores: Vec<i64>,
//!     }
//! }
//!
//! let login = Login { user: "ann".into(), level: 3, scores: vec![-1, 2] };
//! let bytes = sdp::encode(&login);
//! let back: Login = sdp::decode(&bytes).unwrap();
//! assert_eq!(login, back);
//! ```

mod pack;
mod record;
mod unpack;
mod value;

#[cfg(test)]
mod tests;

pub use pack::Packer;
pub use record::{pack_record, unpack_record, FieldDesc, Record};
pub use unpack::Unpacker;
pub use value::SdpValue;

use thiserror::Error;

/// Header byte of the record-end marker (wire type 8, tag 0).
pub const STRUCT_END_MARKER: u8 = 0x80;

/// Field tags at or above this value are written as a varint after the header.
pub const INLINE_TAG_LIMIT: u32 = 15;

/// Maximum nesting of sequences, maps and records accepted while decoding.
pub const MAX_DEPTH: usize = 64;

/// Type nibble of an SDP header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    PositiveInt = 0,
    NegativeInt = 1,
    Float = 2,
    Double = 3,
    String = 4,
    Vector = 5,
    Map = 6,
    StructBegin = 7,
    StructEnd = 8,
}

impl WireType {
    /// Decode the high nibble of a header byte.
    pub fn from_nibble(nibble: u8) -> Result<Self, SdpError> {
        Ok(match nibble {
            0 => WireType::PositiveInt,
            1 => WireType::NegativeInt,
            2 => WireType::Float,
            3 => WireType::Double,
            4 => WireType::String,
            5 => WireType::Vector,
            6 => WireType::Map,
            7 => WireType::StructBegin,
            8 => WireType::StructEnd,
            other => return Err(SdpError::InvalidWireType(other)),
        })
    }

    pub fn nibble(self) -> u8 {
        self as u8
    }
}

/// Errors raised while encoding or decoding SDP data.
///
/// A codec error aborts the one decode call that produced it and nothing else.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdpError {
    #[error("Not enough data")]
    UnexpectedEof,

    #[error("Integer overflow")]
    Overflow,

    #[error("Invalid wire type {0}")]
    InvalidWireType(u8),

    #[error("Type mismatch: expected {expected}, found {found:?}")]
    TypeMismatch {
        expected: &'static str,
        found: WireType,
    },

    #[error("Invalid UTF-8 in string field")]
    InvalidUtf8,

    #[error("Nesting deeper than {0} levels")]
    DepthExceeded(usize),
}

/// Encode a record as a top-level value (record-begin header with tag 0).
pub fn encode<T: Record>(value: &T) -> Vec<u8> {
    let mut packer = Packer::new();
    value.pack_value(&mut packer, 0);
    packer.into_vec()
}

/// Decode a top-level record into a fresh value.
pub fn decode<T: Record>(data: &[u8]) -> Result<T, SdpError> {
    let mut target = T::default();
    decode_into(&mut target, data)?;
    Ok(target)
}

/// Decode a top-level record into an existing value.
///
/// Fields absent from `data` keep whatever value `target` already holds.
pub fn decode_into<T: Record>(target: &mut T, data: &[u8]) -> Result<(), SdpError> {
    let mut unpacker = Unpacker::new(data);
    let (_, wire) = unpacker.unpack_header()?;
    target.unpack_value(&mut unpacker, wire)
}

/// Declare a struct together with its SDP schema.
///
/// Each field may carry `=> { tag: N, required: true }`. Fields without an explicit
/// tag use their position in the declaration. Required fields are always written,
/// the rest are omitted when they hold their zero value.
#[macro_export]
macro_rules! sdp_record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $fname:ident : $fty:ty
                $( => { $( tag: $tag:literal )? $(,)? $( required: $req:literal )? $(,)? } )?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $fvis $fname: $fty,
            )*
        }

        impl $crate::core::sdp::Record for $name {
            const FIELDS: &'static [$crate::core::sdp::FieldDesc] = &[
                $(
                    $crate::core::sdp::FieldDesc {
                        name: stringify!($fname),
                        tag: $crate::__sdp_explicit_tag!($( $( $tag )? )?),
                        required: $crate::__sdp_required!($( $( $req )? )?),
                    },
                )*
            ];

            #[allow(unused_assignments, unused_mut, unused_variables)]
            fn pack_fields(&self, packer: &mut $crate::core::sdp::Packer) {
                let mut index: u32 = 0;
                $(
                    packer.pack(
                        $crate::__sdp_field_tag!(index; $( $( $tag )? )?),
                        &self.$fname,
                        $crate::__sdp_required!($( $( $req )? )?),
                    );
                    index += 1;
                )*
            }

            #[allow(unused_assignments, unused_mut, unused_variables)]
            fn unpack_field(
                &mut self,
                index: usize,
                unpacker: &mut $crate::core::sdp::Unpacker<'_>,
                wire: $crate::core::sdp::WireType,
            ) -> ::std::result::Result<(), $crate::core::sdp::SdpError> {
                let mut position = 0usize;
                $(
                    if index == position {
                        return $crate::core::sdp::SdpValue::unpack_value(&mut self.$fname, unpacker, wire);
                    }
                    position += 1;
                )*
                unpacker.skip(wire)
            }
        }

        impl $crate::core::sdp::SdpValue for $name {
            fn is_zero(&self) -> bool {
                false
            }

            fn pack_value(&self, packer: &mut $crate::core::sdp::Packer, tag: u32) {
                $crate::core::sdp::pack_record(self, packer, tag)
            }

            fn unpack_value(
                &mut self,
                unpacker: &mut $crate::core::sdp::Unpacker<'_>,
                wire: $crate::core::sdp::WireType,
            ) -> ::std::result::Result<(), $crate::core::sdp::SdpError> {
                $crate::core::sdp::unpack_record(self, unpacker, wire)
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __sdp_explicit_tag {
    () => {
        ::std::option::Option::None
    };
    ($tag:literal) => {
        ::std::option::Option::Some($tag)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __sdp_field_tag {
    ($index:ident;) => {
        $index
    };
    ($index:ident; $tag:literal) => {
        $tag
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __sdp_required {
    () => {
        false
    };
    ($req:literal) => {
        $req
    };
}
