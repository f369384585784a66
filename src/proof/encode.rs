//! Byte encoding of proofs.
//!
//! Integers are big-endian, byte strings carry a `u64` length prefix and optional values a
//! one byte tag. Decoding rejects unknown tags, short input and trailing bytes.

use super::{Direction, LeafProof, Proof, Step};
use crate::{node::write_prefixed, prelude::*};

const EXISTENCE: u8 = 0x00;
const NON_EXISTENCE: u8 = 0x01;

impl ToBytes for Proof {
    type Output = Vec<u8>;

    fn to_bytes(&self) -> Self::Output {
        let mut bytes = Vec::new();

        match self {
            Proof::Existence(leaf) => {
                bytes.push(EXISTENCE);
                write_leaf(&mut bytes, leaf);
            }
            Proof::NonExistence { key, left, right } => {
                bytes.push(NON_EXISTENCE);
                write_prefixed(&mut bytes, key);
                write_optional_leaf(&mut bytes, left.as_ref());
                write_optional_leaf(&mut bytes, right.as_ref());
            }
        }

        bytes
    }
}

impl FromBytes for Proof {
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader { bytes };

        let proof = match reader.u8()? {
            EXISTENCE => Proof::Existence(reader.leaf()?),
            NON_EXISTENCE => Proof::NonExistence {
                key: reader.bytes()?,
                left: reader.optional_leaf()?,
                right: reader.optional_leaf()?,
            },
            tag => {
                return Err(Error::FailedDeserialization(format!(
                    "unknown proof tag {tag:#04x}"
                )))
            }
        };

        reader.finish()?;
        Ok(proof)
    }
}

fn write_leaf(bytes: &mut Vec<u8>, leaf: &LeafProof) {
    write_prefixed(bytes, &leaf.key);
    write_prefixed(bytes, &leaf.value);
    bytes.extend_from_slice(&(leaf.path.len() as u64).to_be_bytes());

    for step in &leaf.path {
        bytes.push(match step.direction {
            Direction::Left => 0,
            Direction::Right => 1,
        });
        bytes.push(step.height);
        bytes.extend_from_slice(&step.size.to_be_bytes());
        write_prefixed(bytes, &step.split_key);
        bytes.extend_from_slice(step.sibling.as_ref());
    }
}

fn write_optional_leaf(bytes: &mut Vec<u8>, leaf: Option<&LeafProof>) {
    match leaf {
        None => bytes.push(0),
        Some(leaf) => {
            bytes.push(1);
            write_leaf(bytes, leaf);
        }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.bytes.len() < len {
            return Err(Error::FailedDeserialization(format!(
                "expected {len} more bytes, found {}",
                self.bytes.len()
            )));
        }

        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into()?))
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        let len = usize::try_from(self.u64()?)?;
        Ok(self.take(len)?.to_vec())
    }

    fn hash(&mut self) -> Result<Hash> {
        Hash::from_slice(self.take(32)?)
    }

    fn direction(&mut self) -> Result<Direction> {
        match self.u8()? {
            0 => Ok(Direction::Left),
            1 => Ok(Direction::Right),
            tag => Err(Error::FailedDeserialization(format!(
                "unknown direction tag {tag:#04x}"
            ))),
        }
    }

    fn leaf(&mut self) -> Result<LeafProof> {
        let key = self.bytes()?;
        let value = self.bytes()?;
        let steps = self.u64()?;

        // Not preallocated: the count is untrusted.
        let mut path = Vec::new();
        for _ in 0..steps {
            path.push(Step {
                direction: self.direction()?,
                height: self.u8()?,
                size: self.u64()?,
                split_key: self.bytes()?,
                sibling: self.hash()?,
            });
        }

        Ok(LeafProof { key, value, path })
    }

    fn optional_leaf(&mut self) -> Result<Option<LeafProof>> {
        match self.u8()? {
            0 => Ok(None),
            1 => Ok(Some(self.leaf()?)),
            tag => Err(Error::FailedDeserialization(format!(
                "unknown option tag {tag:#04x}"
            ))),
        }
    }

    fn finish(self) -> Result<()> {
        if self.bytes.is_empty() {
            Ok(())
        } else {
            Err(Error::FailedDeserialization(format!(
                "{} trailing bytes after proof",
                self.bytes.len()
            )))
        }
    }
}
