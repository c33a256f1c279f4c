//! Pipeline - wires a gateway to a dedicated matching thread.
//!
//! ```text
//! [Gateway (caller thread)] --> [RingBuffer<Order>] --> [Engine ("matching" thread)]
//! ```

use std::io;
use std::thread::{self, JoinHandle};

use tracing::info;

use crate::engine::{Engine, Matcher};
use crate::gateway::{Backpressure, Gateway};
use crate::order::Order;
use crate::ring_buffer::RingBuffer;

/// Knobs for [`Pipeline::spawn`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Ring buffer slots; `queue_capacity - 1` orders can be in flight
    pub queue_capacity: usize,
    /// Pin the matching thread to the last CPU core
    pub pin_matching_core: bool,
    /// Policy applied by the gateway when the queue is full
    pub backpressure: Backpressure,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 65_536,
            pin_matching_core: false,
            backpressure: Backpressure::Spin,
        }
    }
}

/// A running gateway / matching-thread pair.
pub struct Pipeline<M> {
    gateway: Gateway,
    handle: JoinHandle<(M, u64)>,
}

impl<M: Matcher + Send + 'static> Pipeline<M> {
    /// Create the queue and start the matching thread.
    ///
    /// # Errors
    /// Fails if the OS refuses to spawn the thread.
    ///
    /// # Panics
    /// Panics if `config.queue_capacity` is zero.
    pub fn spawn(config: PipelineConfig, matcher: M) -> io::Result<Self> {
        let (producer, mut consumer) = RingBuffer::<Order>::new(config.queue_capacity).split();
        let pin = config.pin_matching_core;

        let handle = thread::Builder::new()
            .name("matching".into())
            .spawn(move || {
                let mut engine = Engine::new(matcher);
                let processed = engine.run(&mut consumer, pin);
                (engine.into_matcher(), processed)
            })?;

        info!(
            queue_capacity = config.queue_capacity,
            pin = config.pin_matching_core,
            backpressure = ?config.backpressure,
            "pipeline started"
        );

        Ok(Self {
            gateway: Gateway::new(producer, config.backpressure),
            handle,
        })
    }

    /// The producer side. Call from one thread only (enforced by `&mut`).
    #[inline]
    pub fn gateway(&mut self) -> &mut Gateway {
        &mut self.gateway
    }

    /// Close the queue, wait for the matching thread to drain it, and return
    /// the matcher with the number of orders it processed.
    ///
    /// # Errors
    /// Fails if the matching thread panicked.
    pub fn join(self) -> io::Result<(M, u64)> {
        let Self { gateway, handle } = self;
        let rejected = gateway.rejected();
        drop(gateway);

        let (matcher, processed) = handle
            .join()
            .map_err(|_| io::Error::other("matching thread panicked"))?;

        info!(processed, rejected, "pipeline stopped");
        Ok((matcher, processed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Side;

    #[derive(Default)]
    struct Collect(Vec<u64>);

    impl Matcher for Collect {
        fn on_order(&mut self, order: Order) {
            self.0.push(order.id);
        }
    }

    #[test]
    fn test_pipeline_round_trip() {
        let config = PipelineConfig {
            queue_capacity: 16,
            ..PipelineConfig::default()
        };
        let mut pipeline = Pipeline::spawn(config, Collect::default()).unwrap();

        for id in 0..1_000 {
            pipeline
                .gateway()
                .submit(Order::new(id, 10_000 + id, 1, Side::Bid))
                .unwrap();
        }

        let (collected, processed) = pipeline.join().unwrap();
        assert_eq!(processed, 1_000);
        assert_eq!(collected.0, (0..1_000).collect::<Vec<_>>());
    }

    #[test]
    fn test_capacity_one_pipeline_refuses() {
        let config = PipelineConfig {
            queue_capacity: 1,
            ..PipelineConfig::default()
        };
        let mut pipeline = Pipeline::spawn(config, Collect::default()).unwrap();

        assert!(pipeline.gateway().submit(Order::new(1, 100, 1, Side::Ask)).is_err());
        assert_eq!(pipeline.gateway().rejected(), 1);

        let (collected, processed) = pipeline.join().unwrap();
        assert_eq!(processed, 0);
        assert!(collected.0.is_empty());
    }

    struct Explode;

    impl Matcher for Explode {
        fn on_order(&mut self, _order: Order) {
            panic!("matcher failure");
        }
    }

    #[test]
    fn test_matching_panic_reported_on_join() {
        let mut pipeline = Pipeline::spawn(PipelineConfig::default(), Explode).unwrap();
        pipeline
            .gateway()
            .submit(Order::new(1, 100, 1, Side::Bid))
            .unwrap();

        let err = pipeline.join().err().expect("join should fail");
        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert!(err.to_string().contains("matching thread panicked"));
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.queue_capacity, 65_536);
        assert!(!config.pin_matching_core);
        assert_eq!(config.backpressure, Backpressure::Spin);
    }
}
