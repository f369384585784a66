use std::fmt::{Display, Formatter};
use std::hash::{Hash as StdHash, Hasher};

use digest::{consts::U32, Digest};
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;

use crate::{error::Result, ToBytes};

#[cfg(not(any(feature = "blake3", feature = "sha2", feature = "blake2")))]
compile_error!("at least one of the `blake3`, `sha2` or `blake2` features must be enabled");

/// The digest used when a tree is created without naming one explicitly.
#[cfg(feature = "blake3")]
pub type DefaultDigest = blake3::Hasher;

#[cfg(all(not(feature = "blake3"), feature = "sha2"))]
pub type DefaultDigest = sha2::Sha256;

#[cfg(all(not(feature = "blake3"), not(feature = "sha2"), feature = "blake2"))]
pub type DefaultDigest = blake2::Blake2s256;

/// A digest whose output fits a [`Hash`] exactly.
///
/// Implemented for every [`Digest`] with a 32 byte output, so a shorter or longer digest is
/// rejected when the tree type is named:
///
/// ```compile_fail
/// use merkle_avl::prelude::*;
///
/// let tree = MutableTree::<sha2::Sha512, MemoryStore>::new();
/// ```
pub trait Digest32: Digest<OutputSize = U32> {}

impl<D: Digest<OutputSize = U32>> Digest32 for D {}

const LEAF_TAG: u8 = 0x00;
const INNER_TAG: u8 = 0x01;

/// A 32 byte digest, used for node hashes and tree roots.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Hash([u8; 32]);

impl Display for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Arbitrary for Hash {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        any::<[u8; 32]>().prop_map(Hash::new).boxed()
    }
}

impl StdHash for Hash {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl Hash {
    /// Creates a new Hash from any type that can be converted into [u8; 32].
    pub fn new<T: Into<[u8; 32]>>(data: T) -> Self {
        Hash(data.into())
    }

    /// Builds a hash from a slice of exactly 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        Ok(Hash(slice.try_into()?))
    }

    /// Returns a zero hash (all bytes set to 0).
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Creates a new Hash from a hexadecimal string.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let bytes = hex::decode(hex)?;

        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength.into());
        }

        Self::from_slice(&bytes)
    }

    pub fn digest<D: Digest32>(data: &[u8]) -> Self {
        let mut hasher = D::new();
        hasher.update(data);
        Hash::new(hasher.finalize())
    }

    /// The root hash of a tree holding no keys.
    pub fn empty<D: Digest32>() -> Self {
        Self::digest::<D>(&[])
    }

    /// Commitment of a leaf: `0x00 || len(key) || key || len(value) || value || 0 || 1`.
    pub fn leaf<D: Digest32>(key: &[u8], value: &[u8]) -> Self {
        let mut hasher = D::new();
        hasher.update([LEAF_TAG]);
        update_prefixed(&mut hasher, key);
        update_prefixed(&mut hasher, value);
        hasher.update([0u8]);
        hasher.update(1u64.to_be_bytes());
        Hash::new(hasher.finalize())
    }

    /// Commitment of an inner node:
    /// `0x01 || left || right || len(split_key) || split_key || height || size`.
    pub fn inner<D: Digest32>(
        left: &Hash,
        right: &Hash,
        split_key: &[u8],
        height: u8,
        size: u64,
    ) -> Self {
        let mut hasher = D::new();
        hasher.update([INNER_TAG]);
        hasher.update(left.as_ref());
        hasher.update(right.as_ref());
        update_prefixed(&mut hasher, split_key);
        hasher.update([height]);
        hasher.update(size.to_be_bytes());
        Hash::new(hasher.finalize())
    }
}

fn update_prefixed<D: Digest>(hasher: &mut D, data: &[u8]) {
    hasher.update((data.len() as u64).to_be_bytes());
    hasher.update(data);
}

impl Default for Hash {
    fn default() -> Self {
        Hash::zero()
    }
}

impl From<[u8; 32]> for Hash {
    fn from(array: [u8; 32]) -> Self {
        Hash(array)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Hash> for [u8; 32] {
    fn from(val: Hash) -> Self {
        val.0
    }
}

impl ToBytes for Hash {
    type Output = [u8; 32];

    fn to_bytes(&self) -> Self::Output {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToHex;

    type Blake3 = blake3::Hasher;

    #[test_strategy::proptest(fork = false)]
    fn test_hex_roundtrip(hash: Hash) {
        prop_assert_eq!(hash, Hash::from_hex(&hash.to_hex())?);
    }

    #[test]
    fn test_from_hex_rejects_short_input() {
        assert!(Hash::from_hex("abcd").is_err());
    }

    #[test_strategy::proptest(fork = false)]
    fn test_leaf_length_prefix_separates_key_and_value(key: Vec<u8>, value: Vec<u8>) {
        prop_assume!(!value.is_empty());

        let mut shifted_key = key.clone();
        shifted_key.push(value[0]);

        prop_assert_ne!(
            Hash::leaf::<Blake3>(&key, &value),
            Hash::leaf::<Blake3>(&shifted_key, &value[1..])
        );
    }

    #[test_strategy::proptest(fork = false)]
    fn test_leaf_and_inner_are_domain_separated(left: Hash, right: Hash) {
        let inner = Hash::inner::<Blake3>(&left, &right, &[], 1, 2);
        prop_assert_ne!(inner, Hash::leaf::<Blake3>(left.as_ref(), right.as_ref()));
    }

    #[test]
    fn test_empty_is_digest_of_nothing() {
        assert_eq!(Hash::empty::<Blake3>(), Hash::new(*blake3::hash(&[]).as_bytes()));
    }

    #[test]
    fn test_digest_keeps_the_full_output() {
        let expected: [u8; 32] = sha2::Sha256::digest(b"abc").into();
        assert_eq!(Hash::digest::<sha2::Sha256>(b"abc").to_bytes(), expected);
    }

    #[test]
    fn test_from_slice_requires_exact_length() {
        let bytes = [7u8; 64];

        assert!(Hash::from_slice(&bytes[..16]).is_err());
        assert!(Hash::from_slice(&bytes).is_err());
        assert_eq!(Hash::from_slice(&bytes[..32]).unwrap(), Hash::new([7u8; 32]));
    }
}
