use crate::core::sdp::{Packer, SdpError, SdpValue, Unpacker};
use bytes::Bytes;

/// Positional argument (or return value) list of an RPC function.
///
/// Implemented for tuples of up to eight [`SdpValue`]s. Element `i` is packed
/// under tag `i + 1` and always emitted, zero or not; decoding reads the
/// elements back in order and ignores their tags.
pub trait RpcArgs: Sized + Send + 'static {
    fn pack_args(&self, packer: &mut Packer);

    fn unpack_args(unpacker: &mut Unpacker<'_>) -> Result<Self, SdpError>;

    fn to_payload(&self) -> Bytes {
        let mut packer = Packer::new();
        self.pack_args(&mut packer);
        packer.into_bytes()
    }

    fn from_payload(data: &[u8]) -> Result<Self, SdpError> {
        Self::unpack_args(&mut Unpacker::new(data))
    }
}

macro_rules! impl_rpc_args {
    ($($name:ident : $idx:tt),*) => {
        impl<$($name: SdpValue + Send + 'static),*> RpcArgs for ($($name,)*) {
            #[allow(unused_variables)]
            fn pack_args(&self, packer: &mut Packer) {
                $( packer.pack($idx + 1, &self.$idx, true); )*
            }

            #[allow(unused_variables)]
            fn unpack_args(unpacker: &mut Unpacker<'_>) -> Result<Self, SdpError> {
                Ok(($( unpacker.unpack::<$name>()?, )*))
            }
        }
    };
}

impl_rpc_args!();
impl_rpc_args!(A: 0);
impl_rpc_args!(A: 0, B: 1);
impl_rpc_args!(A: 0, B: 1, C: 2);
impl_rpc_args!(A: 0, B: 1, C: 2, D: 3);
impl_rpc_args!(A: 0, B: 1, C: 2, D: 3, E: 4);
impl_rpc_args!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
impl_rpc_args!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
impl_rpc_args!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);
