//! Object Pool - fixed-capacity slot allocator.
//!
//! All slots are constructed once at startup in a single contiguous block.
//! `allocate` and `deallocate` only push and pop a `u32` free-list, so the
//! steady state never touches the global allocator.
//!
//! Every method that changes the free-list takes `&mut self`. Share a pool
//! across threads only behind your own lock, or keep one pool per thread.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, error, warn};

use crate::error::PoolError;

/// Source of per-pool ids, so handles from another pool are recognised.
static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(0);

/// Ticket for one checked-out slot.
///
/// Carries the slot index plus the id of the issuing pool. Deliberately not
/// `Clone`/`Copy`: [`ObjectPool::deallocate`] consumes it, so a slot cannot
/// be returned twice.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    index: u32,
    pool_id: u64,
}

impl PoolHandle {
    /// Slot index inside the issuing pool.
    #[inline]
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

/// Pre-allocated pool of `T` slots with O(1) allocate and deallocate.
pub struct ObjectPool<T> {
    /// Contiguous block of pre-constructed slots
    slots: Box<[T]>,

    /// Stack of free slot indices (last freed, first reused)
    free: Vec<u32>,

    /// Identifies handles issued by this pool
    pool_id: u64,
}

impl<T: Default> ObjectPool<T> {
    /// Create a pool of `size` default-valued slots.
    ///
    /// # Panics
    /// Panics if `size` is zero or does not fit in a `u32` index.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "ObjectPool size must be positive");
        assert!(size < u32::MAX as usize, "ObjectPool size must fit in a u32 index");

        let slots = (0..size).map(|_| T::default()).collect::<Vec<_>>();

        // Reversed so the first allocations come out as 0, 1, 2, ...
        let free = (0..size as u32).rev().collect();

        let pool_id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        debug!(pool_id, size, "object pool created");

        Self {
            slots: slots.into_boxed_slice(),
            free,
            pool_id,
        }
    }

    /// Check out a free slot.
    ///
    /// The slot holds `T::default()`: slots are reset when they are returned,
    /// so no field of a previous occupant is ever visible.
    ///
    /// # Errors
    /// [`PoolError::Exhausted`] when every slot is in use.
    ///
    /// # Complexity
    /// O(1) - pops the free-list
    #[inline]
    pub fn allocate(&mut self) -> Result<PoolHandle, PoolError> {
        match self.free.pop() {
            Some(index) => Ok(PoolHandle {
                index,
                pool_id: self.pool_id,
            }),
            None => {
                warn!(
                    pool_id = self.pool_id,
                    capacity = self.capacity(),
                    "object pool exhausted"
                );
                Err(PoolError::Exhausted {
                    capacity: self.capacity(),
                })
            }
        }
    }

    /// Check out a slot and move `value` into it.
    ///
    /// # Errors
    /// [`PoolError::Exhausted`] when every slot is in use; `value` is dropped.
    #[inline]
    pub fn insert(&mut self, value: T) -> Result<PoolHandle, PoolError> {
        let handle = self.allocate()?;
        self.slots[handle.index()] = value;
        Ok(handle)
    }

    /// Return a slot to the pool.
    ///
    /// The slot is reset to `T::default()` and becomes the next one handed
    /// out by [`allocate`](Self::allocate).
    ///
    /// # Errors
    /// [`PoolError::InvalidHandle`] if the handle came from another pool or
    /// its index is outside `[0, capacity)`. That is a caller bug.
    ///
    /// # Complexity
    /// O(1) - pushes the free-list
    #[inline]
    pub fn deallocate(&mut self, handle: PoolHandle) -> Result<(), PoolError> {
        let index = self.validate(&handle)?;
        self.slots[index] = T::default();
        self.free.push(handle.index);
        Ok(())
    }

    /// Rewrite every free slot so its pages are resident before the hot
    /// path runs. Checked-out slots are left alone.
    pub fn warm_up(&mut self) {
        for &index in &self.free {
            self.slots[index as usize] = std::hint::black_box(T::default());
        }
    }
}

impl<T> ObjectPool<T> {
    /// Shared access to a checked-out slot. `None` for a foreign handle.
    #[inline]
    pub fn get(&self, handle: &PoolHandle) -> Option<&T> {
        self.owns(handle).then(|| &self.slots[handle.index()])
    }

    /// Exclusive access to a checked-out slot. `None` for a foreign handle.
    #[inline]
    pub fn get_mut(&mut self, handle: &PoolHandle) -> Option<&mut T> {
        if self.owns(handle) {
            Some(&mut self.slots[handle.index()])
        } else {
            None
        }
    }

    /// Total number of slots. Fixed at construction.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots currently checked out.
    #[inline]
    pub fn allocated(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Number of slots ready to be allocated.
    #[inline]
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// True if nothing is checked out.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.free.len() == self.slots.len()
    }

    /// True if every slot is checked out.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    #[inline]
    fn owns(&self, handle: &PoolHandle) -> bool {
        handle.pool_id == self.pool_id && handle.index() < self.slots.len()
    }

    fn validate(&self, handle: &PoolHandle) -> Result<usize, PoolError> {
        if self.owns(handle) {
            Ok(handle.index())
        } else {
            error!(
                pool_id = self.pool_id,
                handle_pool_id = handle.pool_id,
                index = handle.index,
                "deallocate called with a handle this pool did not issue"
            );
            Err(PoolError::InvalidHandle {
                index: handle.index,
            })
        }
    }
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("pool_id", &self.pool_id)
            .field("capacity", &self.capacity())
            .field("allocated", &self.allocated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{Order, Side};

    #[test]
    fn test_pool_creation() {
        let pool: ObjectPool<Order> = ObjectPool::new(100);
        assert_eq!(pool.capacity(), 100);
        assert_eq!(pool.allocated(), 0);
        assert_eq!(pool.available(), 100);
        assert!(pool.is_empty());
        assert!(!pool.is_full());
    }

    #[test]
    fn test_pool_exhaustion_and_reuse() {
        let mut pool: ObjectPool<Order> = ObjectPool::new(2);

        let first = pool.allocate().expect("Should allocate");
        let second = pool.allocate().expect("Should allocate");
        assert_ne!(first.index(), second.index());
        assert!(pool.is_full());

        assert_eq!(
            pool.allocate(),
            Err(PoolError::Exhausted { capacity: 2 })
        );

        let freed = first.index();
        pool.deallocate(first).expect("Should deallocate");
        assert_eq!(pool.allocated(), 1);

        let third = pool.allocate().expect("Should allocate after free");
        assert_eq!(third.index(), freed, "last freed slot is reused first");

        pool.deallocate(second).unwrap();
        pool.deallocate(third).unwrap();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let mut pool: ObjectPool<Order> = ObjectPool::new(2);
        let mut other: ObjectPool<Order> = ObjectPool::new(8);

        let foreign = other.allocate().unwrap();
        assert_eq!(foreign.index(), 0);
        assert!(pool.get(&foreign).is_none());
        assert!(pool.get_mut(&foreign).is_none());
        assert_eq!(
            pool.deallocate(foreign),
            Err(PoolError::InvalidHandle { index: 0 })
        );

        // Out-of-range index from a bigger pool
        let far = (0..5).map(|_| other.allocate().unwrap()).last().unwrap();
        assert_eq!(far.index(), 5);
        assert_eq!(
            pool.deallocate(far),
            Err(PoolError::InvalidHandle { index: 5 })
        );
        assert!(pool.is_empty());
    }

    #[test]
    fn test_pool_ids_are_distinct() {
        let pools: Vec<ObjectPool<u64>> = (0..64).map(|_| ObjectPool::new(1)).collect();
        let mut ids: Vec<u64> = pools.iter().map(|p| p.pool_id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), pools.len());

        // Every pool hands out index 0; only the issuer accepts it back
        let mut first = ObjectPool::<u64>::new(1);
        let mut second = ObjectPool::<u64>::new(1);
        let handle = second.allocate().unwrap();
        assert!(first.get(&handle).is_none());
        assert!(second.deallocate(handle).is_ok());
        assert!(first.allocate().is_ok());
    }

    #[test]
    fn test_pool_get_set() {
        let mut pool: ObjectPool<Order> = ObjectPool::new(10);
        let handle = pool.allocate().unwrap();

        let order = pool.get_mut(&handle).unwrap();
        order.id = 12345;
        order.price = 10_050_000;
        order.qty = 100;
        order.side = Side::Ask;

        let order = pool.get(&handle).unwrap();
        assert_eq!(order.id, 12345);
        assert_eq!(order.price, 10_050_000);
        assert_eq!(order.qty, 100);
        assert_eq!(order.side, Side::Ask);
    }

    #[test]
    fn test_deallocate_resets_slot() {
        let mut pool: ObjectPool<Order> = ObjectPool::new(1);
        let handle = pool.insert(Order::new(7, 10_000, 50, Side::Ask)).unwrap();
        assert_eq!(pool.get(&handle).unwrap().id, 7);

        pool.deallocate(handle).unwrap();

        let handle = pool.allocate().unwrap();
        assert_eq!(*pool.get(&handle).unwrap(), Order::default());
    }

    #[test]
    fn test_first_allocations_ascend() {
        let mut pool: ObjectPool<u64> = ObjectPool::new(4);
        let indices: Vec<usize> = (0..4).map(|_| pool.allocate().unwrap().index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_insert_when_exhausted() {
        let mut pool: ObjectPool<u64> = ObjectPool::new(1);
        let _held = pool.insert(1).unwrap();
        assert_eq!(pool.insert(2), Err(PoolError::Exhausted { capacity: 1 }));
    }

    #[test]
    #[should_panic(expected = "size must be positive")]
    fn test_zero_size_panics() {
        let _ = ObjectPool::<u64>::new(0);
    }

    #[test]
    fn test_pool_warm_up() {
        let mut pool: ObjectPool<Order> = ObjectPool::new(1000);
        pool.warm_up(); // Should not panic
        assert!(pool.is_empty());
    }
}
