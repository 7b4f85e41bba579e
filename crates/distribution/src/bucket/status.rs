//! Bucket transfer status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transfer state of a single bucket.
///
/// ```text
/// Functional ──rebalance──▶ NeedTransfer ──lock──▶ UnderStateTransfer
///     ▲                                                   │
///     └───────────────────────release─────────────────────┘
/// ```
///
/// Discriminants are distinct bits so several states can be awaited at once
/// through a [`StatusLatch`](super::StatusLatch).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BucketStatus {
    /// Stable: served by its owner, no transfer pending.
    Functional = 1,
    /// Locked by the new owner while data is being copied.
    UnderStateTransfer = 2,
    /// Assigned a new temporary owner that has not locked it yet.
    NeedTransfer = 4,
}

impl BucketStatus {
    /// Bit of this status inside a latch mask.
    #[inline]
    pub const fn bit(self) -> u8 {
        self as u8
    }

    /// Whether the bucket can be picked as rebalancing currency.
    #[inline]
    pub fn is_movable(self) -> bool {
        self != BucketStatus::UnderStateTransfer
    }
}

impl fmt::Display for BucketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BucketStatus::Functional => "Functional",
            BucketStatus::UnderStateTransfer => "UnderStateTransfer",
            BucketStatus::NeedTransfer => "NeedTransfer",
        };
        f.write_str(name)
    }
}
