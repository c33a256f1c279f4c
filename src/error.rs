//! Error types for the queue and the pool.
//!
//! Queue outcomes are plain return values (`bool`, `Option`, or
//! `Result<(), QueueFull<T>>`) so the hot path never unwinds. Pool errors
//! are off the hot path and carry a little more context.

use thiserror::Error;

/// A push was rejected because every usable slot is occupied.
///
/// The rejected value is handed back so the caller can retry or drop it.
#[derive(Error, Clone, Copy, PartialEq, Eq)]
#[error("ring buffer is full")]
pub struct QueueFull<T>(pub T);

impl<T> QueueFull<T> {
    /// Recover the value that could not be pushed.
    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

// Manual impl so `T` does not need to be `Debug` for `unwrap_err()` and friends.
impl<T> std::fmt::Debug for QueueFull<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("QueueFull(..)")
    }
}

/// Failures reported by [`ObjectPool`](crate::pool::ObjectPool).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// Every slot is checked out. The pool never grows.
    #[error("object pool exhausted: all {capacity} slots are in use")]
    Exhausted {
        /// Fixed capacity of the pool
        capacity: usize,
    },

    /// The handle was not issued by this pool, or points outside it.
    ///
    /// This is a caller bug, not a load condition.
    #[error("handle for slot {index} does not belong to this pool")]
    InvalidHandle {
        /// Slot index carried by the rejected handle
        index: u32,
    },
}
