use super::{Packer, SdpError, Unpacker, WireType};
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// A value with an SDP wire representation.
///
/// `pack_value` writes the header and the body; `unpack_value` is called after
/// the header has been read and receives its wire type.
pub trait SdpValue: Default {
    /// Whether the value is omitted when its field is not required.
    fn is_zero(&self) -> bool;

    fn pack_value(&self, packer: &mut Packer, tag: u32);

    fn unpack_value(&mut self, unpacker: &mut Unpacker<'_>, wire: WireType)
        -> Result<(), SdpError>;
}

fn mismatch(expected: &'static str, found: WireType) -> SdpError {
    SdpError::TypeMismatch { expected, found }
}

impl SdpValue for bool {
    fn is_zero(&self) -> bool {
        !*self
    }

    fn pack_value(&self, packer: &mut Packer, tag: u32) {
        packer.pack_header(tag, WireType::PositiveInt);
        packer.pack_number(u64::from(*self));
    }

    fn unpack_value(
        &mut self,
        unpacker: &mut Unpacker<'_>,
        wire: WireType,
    ) -> Result<(), SdpError> {
        match wire {
            WireType::PositiveInt => {
                *self = unpacker.unpack_number()? > 0;
                Ok(())
            }
            other => Err(mismatch("bool", other)),
        }
    }
}

macro_rules! impl_unsigned {
    ($($ty:ty),*) => {$(
        impl SdpValue for $ty {
            fn is_zero(&self) -> bool {
                *self == 0
            }

            fn pack_value(&self, packer: &mut Packer, tag: u32) {
                packer.pack_header(tag, WireType::PositiveInt);
                packer.pack_number(*self as u64);
            }

            fn unpack_value(
                &mut self,
                unpacker: &mut Unpacker<'_>,
                wire: WireType,
            ) -> Result<(), SdpError> {
                match wire {
                    WireType::PositiveInt => {
                        let v = unpacker.unpack_number()?;
                        *self = <$ty>::try_from(v).map_err(|_| SdpError::Overflow)?;
                        Ok(())
                    }
                    other => Err(mismatch(stringify!($ty), other)),
                }
            }
        }
    )*};
}

macro_rules! impl_signed {
    ($($ty:ty),*) => {$(
        impl SdpValue for $ty {
            fn is_zero(&self) -> bool {
                *self == 0
            }

            fn pack_value(&self, packer: &mut Packer, tag: u32) {
                if *self < 0 {
                    packer.pack_header(tag, WireType::NegativeInt);
                } else {
                    packer.pack_header(tag, WireType::PositiveInt);
                }
                packer.pack_number(self.unsigned_abs() as u64);
            }

            fn unpack_value(
                &mut self,
                unpacker: &mut Unpacker<'_>,
                wire: WireType,
            ) -> Result<(), SdpError> {
                let v = match wire {
                    WireType::PositiveInt => i128::from(unpacker.unpack_number()?),
                    WireType::NegativeInt => -i128::from(unpacker.unpack_number()?),
                    other => return Err(mismatch(stringify!($ty), other)),
                };
                *self = <$ty>::try_from(v).map_err(|_| SdpError::Overflow)?;
                Ok(())
            }
        }
    )*};
}

impl_unsigned!(u8, u16, u32, u64, usize);
impl_signed!(i8, i16, i32, i64, isize);

impl SdpValue for f32 {
    fn is_zero(&self) -> bool {
        self.to_bits() == 0
    }

    fn pack_value(&self, packer: &mut Packer, tag: u32) {
        packer.pack_header(tag, WireType::Float);
        packer.pack_number(u64::from(self.to_bits()));
    }

    fn unpack_value(
        &mut self,
        unpacker: &mut Unpacker<'_>,
        wire: WireType,
    ) -> Result<(), SdpError> {
        match wire {
            WireType::Float => {
                let bits = u32::try_from(unpacker.unpack_number()?).map_err(|_| SdpError::Overflow)?;
                *self = f32::from_bits(bits);
            }
            WireType::Double => {
                *self = f64::from_bits(unpacker.unpack_number()?) as f32;
            }
            other => return Err(mismatch("f32", other)),
        }
        Ok(())
    }
}

impl SdpValue for f64 {
    fn is_zero(&self) -> bool {
        self.to_bits() == 0
    }

    fn pack_value(&self, packer: &mut Packer, tag: u32) {
        packer.pack_header(tag, WireType::Double);
        packer.pack_number(self.to_bits());
    }

    fn unpack_value(
        &mut self,
        unpacker: &mut Unpacker<'_>,
        wire: WireType,
    ) -> Result<(), SdpError> {
        match wire {
            WireType::Double => {
                *self = f64::from_bits(unpacker.unpack_number()?);
            }
            WireType::Float => {
                let bits = u32::try_from(unpacker.unpack_number()?).map_err(|_| SdpError::Overflow)?;
                *self = f64::from(f32::from_bits(bits));
            }
            other => return Err(mismatch("f64", other)),
        }
        Ok(())
    }
}

impl SdpValue for String {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn pack_value(&self, packer: &mut Packer, tag: u32) {
        packer.pack_header(tag, WireType::String);
        packer.pack_string(self.as_bytes());
    }

    fn unpack_value(
        &mut self,
        unpacker: &mut Unpacker<'_>,
        wire: WireType,
    ) -> Result<(), SdpError> {
        match wire {
            WireType::String => {
                let raw = unpacker.unpack_string()?;
                let text = std::str::from_utf8(raw).map_err(|_| SdpError::InvalidUtf8)?;
                self.clear();
                self.push_str(text);
                Ok(())
            }
            other => Err(mismatch("string", other)),
        }
    }
}

/// Opaque bytes travel with the string wire type.
impl SdpValue for Bytes {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn pack_value(&self, packer: &mut Packer, tag: u32) {
        packer.pack_header(tag, WireType::String);
        packer.pack_string(self);
    }

    fn unpack_value(
        &mut self,
        unpacker: &mut Unpacker<'_>,
        wire: WireType,
    ) -> Result<(), SdpError> {
        match wire {
            WireType::String => {
                *self = Bytes::copy_from_slice(unpacker.unpack_string()?);
                Ok(())
            }
            other => Err(mismatch("bytes", other)),
        }
    }
}

impl<T: SdpValue> SdpValue for Vec<T> {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn pack_value(&self, packer: &mut Packer, tag: u32) {
        packer.pack_header(tag, WireType::Vector);
        packer.pack_number(self.len() as u64);
        for item in self {
            packer.pack(0, item, true);
        }
    }

    fn unpack_value(
        &mut self,
        unpacker: &mut Unpacker<'_>,
        wire: WireType,
    ) -> Result<(), SdpError> {
        if wire != WireType::Vector {
            return Err(mismatch("sequence", wire));
        }
        let count = unpacker.unpack_length()?;
        unpacker.enter()?;
        self.clear();
        self.reserve(count);
        for _ in 0..count {
            self.push(unpacker.unpack()?);
        }
        unpacker.leave();
        Ok(())
    }
}

macro_rules! impl_map {
    ($map:ident, $($bound:path),+) => {
        impl<K, V> SdpValue for $map<K, V>
        where
            K: SdpValue $(+ $bound)+,
            V: SdpValue,
        {
            fn is_zero(&self) -> bool {
                self.is_empty()
            }

            fn pack_value(&self, packer: &mut Packer, tag: u32) {
                packer.pack_header(tag, WireType::Map);
                packer.pack_number(self.len() as u64);
                for (key, value) in self {
                    packer.pack(0, key, true);
                    packer.pack(0, value, true);
                }
            }

            fn unpack_value(
                &mut self,
                unpacker: &mut Unpacker<'_>,
                wire: WireType,
            ) -> Result<(), SdpError> {
                if wire != WireType::Map {
                    return Err(mismatch("map", wire));
                }
                let count = unpacker.unpack_length()?;
                unpacker.enter()?;
                self.clear();
                for _ in 0..count {
                    let key: K = unpacker.unpack()?;
                    let value: V = unpacker.unpack()?;
                    self.insert(key, value);
                }
                unpacker.leave();
                Ok(())
            }
        }
    };
}

impl_map!(HashMap, Eq, Hash);
impl_map!(BTreeMap, Ord);
