//! Status latch used to block until a bucket reaches a given status.

use crate::bucket::status::BucketStatus;
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Bitset of [`BucketStatus`] bits with blocking waits.
///
/// Waiters re-check their mask on every wake-up; a change always wakes all
/// of them.
#[derive(Debug, Default)]
pub struct StatusLatch {
    bits: Mutex<u8>,
    changed: Condvar,
}

impl StatusLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch initialised to a single status.
    pub fn with_status(status: BucketStatus) -> Self {
        Self {
            bits: Mutex::new(status.bit()),
            changed: Condvar::new(),
        }
    }

    /// Current raw bits.
    pub fn bits(&self) -> u8 {
        *self.bits.lock()
    }

    /// Set the bits in `set`, clear the bits in `unset`, wake all waiters.
    pub fn set_status_bit(&self, set: u8, unset: u8) {
        let mut bits = self.bits.lock();
        *bits = (*bits | set) & !(unset & !set);
        self.changed.notify_all();
    }

    /// Replace the latch content with exactly `status`.
    pub fn set_status(&self, status: BucketStatus) {
        let mut bits = self.bits.lock();
        *bits = status.bit();
        self.changed.notify_all();
    }

    pub fn is_any_bits_set(&self, mask: u8) -> bool {
        *self.bits.lock() & mask != 0
    }

    /// Block until any bit of `mask` is set.
    ///
    /// Returns `false` if `timeout` elapsed first; `None` waits forever.
    pub fn wait_for_any(&self, mask: u8, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut bits = self.bits.lock();
        while *bits & mask == 0 {
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut bits, deadline).timed_out() {
                        return *bits & mask != 0;
                    }
                }
                None => self.changed.wait(&mut bits),
            }
        }
        true
    }
}
