//! Error types for the distribution library.
//!
//! Balancing preconditions (`AlreadyInBalancing`, `NotRequired`) are not
//! errors; they are reported through [`crate::maps::BalancingResult`].

use thiserror::Error;

/// Result type alias for the distribution library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while computing or tracking bucket ownership.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Bucket id outside of `[0, total)`.
    #[error("invalid bucket id {id}, cluster has {total} buckets")]
    InvalidBucket { id: usize, total: usize },

    /// An operation that needs at least one member found none.
    #[error("no members left to own buckets")]
    NoMembers,

    /// No bucket map has been installed yet.
    #[error("bucket map not installed")]
    MapNotInstalled,

    /// A map does not hold the configured number of buckets.
    #[error("bucket count mismatch: expected {expected}, got {actual}")]
    BucketCountMismatch { expected: usize, actual: usize },

    /// Key routing kept failing after all retries.
    #[error("routing failed after {attempts} attempts")]
    RoutingFailed { attempts: u32 },

    /// A bounded wait for a bucket status expired.
    #[error("timed out waiting on bucket {bucket_id}")]
    WaitTimeout { bucket_id: usize },

    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Whether a routing attempt that failed with this error may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::InvalidBucket { .. } | Error::BucketCountMismatch { .. })
    }
}
