use std::{array::TryFromSliceError, num::TryFromIntError};

use thiserror::Error as ThisError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error coming out of a [`NodeStore`](crate::store::NodeStore), kept as-is so callers
/// can downcast it back to the store's own error type.
pub type StorageError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("version {0} does not exist")]
    VersionNotFound(u64),

    #[error("cannot delete latest saved version {0}")]
    ActiveVersion(u64),

    #[error("no version can follow version {0}")]
    VersionOverflow(u64),

    #[error("invalid version range [{from}, {to})")]
    InvalidVersionRange { from: u64, to: u64 },

    #[error("node store error: {0}")]
    Storage(#[source] StorageError),

    #[error("failed to deserialize: {0}")]
    FailedDeserialization(String),

    #[error("tree invariant violated: {0}")]
    InvariantViolation(String),
}

impl Error {
    /// Wraps an error raised by a node store without altering it.
    pub fn storage<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Storage(Box::new(error))
    }
}

impl From<hex::FromHexError> for Error {
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn from(error: hex::FromHexError) -> Self {
        Error::FailedDeserialization(format!("{}", error))
    }
}

impl From<TryFromIntError> for Error {
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn from(error: TryFromIntError) -> Self {
        Error::FailedDeserialization(format!("invalid number format: {}", error))
    }
}

impl From<TryFromSliceError> for Error {
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn from(error: TryFromSliceError) -> Self {
        Error::FailedDeserialization(format!("invalid slice format: {}", error))
    }
}
