pub use crate::{
    error::*,
    hash::*,
    immutable::ImmutableTree,
    mutable::MutableTree,
    options::Options,
    proof::{Direction, LeafProof, Proof, Step},
    store::{MemoryStore, NodeStore},
    view::TreeView,
};

pub trait FromBytes
where
    Self: Sized,
{
    fn from_bytes(bytes: &[u8]) -> Result<Self>;
}

pub trait ToBytes {
    type Output: AsRef<[u8]>;

    /// Converts the value to a representation in bytes.
    fn to_bytes(&self) -> Self::Output;
}

pub trait FromHex
where
    Self: Sized,
{
    fn from_hex(hex: &str) -> Result<Self>;
}

pub trait ToHex {
    fn to_hex(&self) -> String;
}

impl<T: ToBytes> ToHex for T {
    fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

impl<T: FromBytes> FromHex for T {
    fn from_hex(hex: &str) -> Result<Self> {
        T::from_bytes(&hex::decode(hex)?)
    }
}
