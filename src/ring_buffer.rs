//! Ring Buffer - lock-free single-producer/single-consumer queue.
//!
//! Moves values from the gateway thread to the matching thread without
//! locks and without allocating after construction.
//!
//! # Index Discipline
//!
//! | Field  | Written by | Read by (other side) |
//! |--------|------------|----------------------|
//! | `head` | producer   | consumer, `Acquire`  |
//! | `tail` | consumer   | producer, `Acquire`  |
//!
//! Every store to `head` or `tail` is `Release`. The producer writes a slot
//! before publishing `head`; the consumer reads a slot before publishing
//! `tail`. One slot is always kept empty: the queue is empty iff
//! `head == tail` and full iff `(head + 1) % capacity == tail`, so at most
//! `capacity - 1` values are live at once.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::ops::Deref;
use std::sync::atomic::{fence, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::QueueFull;

/// Size of the line the hot indices are padded to.
pub const CACHE_LINE: usize = 64;

/// Aligns and pads a value to its own cache line.
#[repr(align(64))]
#[derive(Default)]
pub struct CachePadded<T> {
    value: T,
}

impl<T> CachePadded<T> {
    #[inline]
    pub const fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T> Deref for CachePadded<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.value
    }
}

// Compile-time assertion: a padded index fills exactly one line
const _: () = assert!(
    std::mem::size_of::<CachePadded<AtomicUsize>>() == CACHE_LINE,
    "CachePadded<AtomicUsize> must be exactly one cache line"
);

const _: () = assert!(
    std::mem::align_of::<CachePadded<AtomicUsize>>() == CACHE_LINE,
    "CachePadded must be cache-line aligned"
);

/// Fixed-capacity SPSC ring buffer.
///
/// Used directly, every operation takes `&mut self`, which makes it a plain
/// single-threaded FIFO. Call [`split`](Self::split) to get a [`Producer`]
/// and a [`Consumer`] that can live on different threads.
///
/// # Memory Layout
///
/// | Field   | Offset | Size | Written by |
/// |---------|--------|------|------------|
/// | `head`  | 0      | 64   | producer   |
/// | `tail`  | 64     | 64   | consumer   |
/// | `slots` | 128    | 16   | nobody     |
#[repr(C)]
pub struct RingBuffer<T> {
    /// Next write position
    head: CachePadded<AtomicUsize>,

    /// Next read position
    tail: CachePadded<AtomicUsize>,

    /// Backing storage, `capacity` slots, never reallocated
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// SAFETY: each slot is touched by one thread at a time. The producer only
// writes slots in [head, tail - 1) and the consumer only reads slots in
// [tail, head); the acquire/release pair on the indices hands a slot over.
// `Producer` and `Consumer` are not `Clone`, so there is one of each.
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T> RingBuffer<T> {
    /// Create a ring buffer with `capacity` slots.
    ///
    /// Only `capacity - 1` values fit at once; one slot stays empty to tell
    /// full from empty. A capacity of 1 gives a queue that is always full.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be positive");

        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            slots,
        }
    }

    /// Split into the producer and consumer halves.
    pub fn split(self) -> (Producer<T>, Consumer<T>) {
        let buffer = Arc::new(self);
        (
            Producer {
                buffer: Arc::clone(&buffer),
            },
            Consumer { buffer },
        )
    }

    /// Push a value. Returns `false` (and drops `value`) if the queue is full.
    #[inline]
    pub fn push(&mut self, value: T) -> bool {
        self.try_push(value).is_ok()
    }

    /// Push a value, handing it back if the queue is full.
    #[inline]
    pub fn try_push(&mut self, value: T) -> Result<(), QueueFull<T>> {
        // SAFETY: `&mut self` rules out any concurrent producer.
        unsafe { self.produce(value) }
    }

    /// Pop the oldest value, or `None` if the queue is empty.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        // SAFETY: `&mut self` rules out any concurrent consumer.
        unsafe { self.consume() }
    }

    /// Total number of slots, including the reserved one.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Maximum number of values that can be live at once.
    #[inline]
    pub fn usable_capacity(&self) -> usize {
        self.slots.len() - 1
    }

    /// Number of values currently queued.
    ///
    /// Exact when called through `&mut self` or from the side that is not
    /// racing; otherwise a snapshot.
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        self.distance(tail, head)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        self.next(head) == tail
    }

    #[inline(always)]
    fn next(&self, index: usize) -> usize {
        let next = index + 1;
        if next == self.slots.len() {
            0
        } else {
            next
        }
    }

    #[inline(always)]
    fn distance(&self, from: usize, to: usize) -> usize {
        if to >= from {
            to - from
        } else {
            self.slots.len() - from + to
        }
    }

    /// Producer half of the protocol.
    ///
    /// # Safety
    /// Must only be called by the single producer.
    #[inline(always)]
    unsafe fn produce(&self, value: T) -> Result<(), QueueFull<T>> {
        // Only the producer stores `head`, so a relaxed read is current.
        let head = self.head.load(Ordering::Relaxed);
        let next_head = self.next(head);

        if next_head == self.tail.load(Ordering::Acquire) {
            return Err(QueueFull(value));
        }

        // SAFETY: slot `head` is outside [tail, head), so the consumer is
        // not reading it, and the caller guarantees no other producer.
        unsafe {
            (*self.slots.get_unchecked(head).get()).write(value);
        }

        self.head.store(next_head, Ordering::Release);
        Ok(())
    }

    /// Consumer half of the protocol.
    ///
    /// # Safety
    /// Must only be called by the single consumer.
    #[inline(always)]
    unsafe fn consume(&self) -> Option<T> {
        // Only the consumer stores `tail`.
        let tail = self.tail.load(Ordering::Relaxed);

        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }

        // SAFETY: the acquire load of `head` observed the release store that
        // followed the write of slot `tail`, so it is initialised. The
        // producer will not reuse it until `tail` moves past it.
        let value = unsafe { (*self.slots.get_unchecked(tail).get()).assume_init_read() };

        self.tail.store(self.next(tail), Ordering::Release);
        Some(value)
    }
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        let head = *self.head.value.get_mut();
        let mut tail = *self.tail.value.get_mut();

        while tail != head {
            // SAFETY: every slot in [tail, head) holds a value nobody popped.
            unsafe {
                self.slots[tail].get_mut().assume_init_drop();
            }
            tail = self.next(tail);
        }
    }
}

impl<T> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("head", &self.head.load(Ordering::Relaxed))
            .field("tail", &self.tail.load(Ordering::Relaxed))
            .finish()
    }
}

/// The peer half is gone once this is the last reference.
#[inline]
fn abandoned<T>(buffer: &Arc<RingBuffer<T>>) -> bool {
    let alone = Arc::strong_count(buffer) < 2;
    if alone {
        // Pairs with the release decrement in the peer's `Arc` drop, so its
        // final index store is visible to the loads that follow.
        fence(Ordering::Acquire);
    }
    alone
}

/// Writing half of a split [`RingBuffer`]. Exactly one exists per buffer.
pub struct Producer<T> {
    buffer: Arc<RingBuffer<T>>,
}

impl<T> Producer<T> {
    /// Push a value. Returns `false` (and drops `value`) if the queue is full.
    ///
    /// Never blocks; retry/drop policy is up to the caller.
    #[inline]
    pub fn push(&mut self, value: T) -> bool {
        self.try_push(value).is_ok()
    }

    /// Push a value, handing it back if the queue is full.
    #[inline]
    pub fn try_push(&mut self, value: T) -> Result<(), QueueFull<T>> {
        // SAFETY: `Producer` is unique per buffer and `&mut self` serialises
        // its own calls.
        unsafe { self.buffer.produce(value) }
    }

    /// Free slots as seen by the producer. Never over-reports.
    #[inline]
    pub fn slots(&self) -> usize {
        self.buffer.usable_capacity() - self.buffer.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.buffer.is_full()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// True once the [`Consumer`] has been dropped.
    #[inline]
    pub fn is_abandoned(&self) -> bool {
        abandoned(&self.buffer)
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer").field("buffer", &self.buffer).finish()
    }
}

/// Reading half of a split [`RingBuffer`]. Exactly one exists per buffer.
pub struct Consumer<T> {
    buffer: Arc<RingBuffer<T>>,
}

impl<T> Consumer<T> {
    /// Pop the oldest value, or `None` if nothing is queued.
    ///
    /// Never blocks; an empty queue is a normal polling outcome.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        // SAFETY: `Consumer` is unique per buffer and `&mut self` serialises
        // its own calls.
        unsafe { self.buffer.consume() }
    }

    /// Values ready to pop. Never over-reports.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// True once the [`Producer`] has been dropped.
    #[inline]
    pub fn is_abandoned(&self) -> bool {
        abandoned(&self.buffer)
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer").field("buffer", &self.buffer).finish()
    }
}
