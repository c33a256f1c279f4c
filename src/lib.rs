//! # Flash-Pipe
//!
//! The two low-level primitives under a latency-sensitive order-matching
//! pipeline.
//!
//! ## Design Principles
//!
//! - **Lock-Free Handoff**: One producer, one consumer, acquire/release on two indices
//! - **Single-Writer Fields**: `head` is written only by the producer, `tail` only by the consumer
//! - **No False Sharing**: each index lives on its own 64-byte cache line
//! - **Arena Allocation**: order slots are preconstructed; no heap traffic per order
//!
//! ## Architecture
//!
//! ```text
//! [Gateway Thread] --> [SPSC Ring Buffer] --> [Matching Thread (Pinned)]
//!                                                     |
//!                                               [Matcher + ObjectPool]
//! ```
//!
//! [`RingBuffer`] and [`ObjectPool`] share no state and can be used on
//! their own; [`Pipeline`] is one way of wiring them to a [`Matcher`].

pub mod error;
pub mod ring_buffer;
pub mod pool;
pub mod order;
pub mod engine;
pub mod gateway;
pub mod pipeline;

// Re-exports for convenience
pub use error::{PoolError, QueueFull};
pub use ring_buffer::{CachePadded, Consumer, Producer, RingBuffer, CACHE_LINE};
pub use pool::{ObjectPool, PoolHandle};
pub use order::{Order, Side};
pub use engine::{Engine, Matcher};
pub use gateway::{Backpressure, Gateway};
pub use pipeline::{Pipeline, PipelineConfig};
