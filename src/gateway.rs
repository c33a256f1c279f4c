//! Gateway - producer side of the pipeline.
//!
//! The ring buffer itself never waits. The gateway is where the caller's
//! backpressure policy is applied when the matching thread falls behind.

use tracing::debug;

use crate::error::QueueFull;
use crate::order::Order;
use crate::ring_buffer::Producer;

/// What to do when the order queue is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backpressure {
    /// Refuse the order immediately.
    Reject,
    /// Spin until the order is accepted or the consumer is gone.
    #[default]
    Spin,
    /// Spin at most this many extra attempts, then refuse.
    SpinLimit(u32),
}

/// Pushes orders into the matching queue under a [`Backpressure`] policy.
pub struct Gateway {
    producer: Producer<Order>,
    policy: Backpressure,
    /// Orders refused so far
    rejected: u64,
}

impl Gateway {
    pub fn new(producer: Producer<Order>, policy: Backpressure) -> Self {
        Self {
            producer,
            policy,
            rejected: 0,
        }
    }

    /// Submit one order to the matching thread.
    ///
    /// # Errors
    /// Returns the order inside [`QueueFull`] if the policy gave up, if the
    /// matching side has been dropped and nothing will ever drain it, or if
    /// the queue has no usable slot at all (capacity 1). The last two are
    /// refused without spinning, whatever the policy.
    #[inline]
    pub fn submit(&mut self, order: Order) -> Result<(), QueueFull<Order>> {
        if self.producer.capacity() < 2 || self.producer.is_abandoned() {
            return Err(self.refuse(order, 0));
        }

        let mut pending = match self.producer.try_push(order) {
            Ok(()) => return Ok(()),
            Err(QueueFull(order)) => order,
        };

        let budget = match self.policy {
            Backpressure::Reject => 0,
            Backpressure::Spin => u32::MAX,
            Backpressure::SpinLimit(n) => n,
        };

        let mut attempts = 0u32;
        while attempts < budget || self.policy == Backpressure::Spin {
            if self.producer.is_abandoned() {
                break;
            }
            std::hint::spin_loop();
            pending = match self.producer.try_push(pending) {
                Ok(()) => return Ok(()),
                Err(QueueFull(order)) => order,
            };
            attempts = attempts.saturating_add(1);
        }

        Err(self.refuse(pending, attempts))
    }

    #[cold]
    fn refuse(&mut self, order: Order, attempts: u32) -> QueueFull<Order> {
        self.rejected += 1;
        debug!(
            order_id = order.id,
            attempts,
            abandoned = self.producer.is_abandoned(),
            capacity = self.producer.capacity(),
            "order refused by gateway"
        );
        QueueFull(order)
    }

    /// Orders refused so far.
    #[inline]
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    #[inline]
    pub fn policy(&self) -> Backpressure {
        self.policy
    }

    /// True once the matching side has been dropped.
    #[inline]
    pub fn is_abandoned(&self) -> bool {
        self.producer.is_abandoned()
    }

    /// Give the producer half back.
    pub fn into_producer(self) -> Producer<Order> {
        self.producer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Side;
    use crate::ring_buffer::RingBuffer;
    use std::thread;

    fn order(id: u64) -> Order {
        Order::new(id, 10_000, 10, Side::Ask)
    }

    #[test]
    fn test_reject_policy() {
        let (tx, _rx) = RingBuffer::new(2).split();
        let mut gateway = Gateway::new(tx, Backpressure::Reject);

        assert!(gateway.submit(order(1)).is_ok());
        let refused = gateway.submit(order(2)).unwrap_err();
        assert_eq!(refused.into_inner().id, 2);
        assert_eq!(gateway.rejected(), 1);
    }

    #[test]
    fn test_spin_limit_gives_up() {
        let (tx, _rx) = RingBuffer::new(2).split();
        let mut gateway = Gateway::new(tx, Backpressure::SpinLimit(16));

        assert!(gateway.submit(order(1)).is_ok());
        assert!(gateway.submit(order(2)).is_err());
        assert_eq!(gateway.rejected(), 1);
    }

    #[test]
    fn test_spin_stops_when_consumer_dropped() {
        let (tx, rx) = RingBuffer::new(2).split();
        let mut gateway = Gateway::new(tx, Backpressure::Spin);

        assert!(gateway.submit(order(1)).is_ok());
        drop(rx);
        assert!(gateway.is_abandoned());
        assert!(gateway.submit(order(2)).is_err());
    }

    #[test]
    fn test_refused_after_consumer_dropped_with_room() {
        let (tx, rx) = RingBuffer::new(8).split();
        let mut gateway = Gateway::new(tx, Backpressure::Spin);
        drop(rx);

        let refused = gateway.submit(order(1)).unwrap_err();
        assert_eq!(refused.into_inner().id, 1);
        assert_eq!(gateway.rejected(), 1);

        // Nothing was left in the abandoned queue
        assert_eq!(gateway.into_producer().slots(), 7);
    }

    #[test]
    fn test_capacity_one_refused_without_spinning() {
        let (tx, _rx) = RingBuffer::new(1).split();
        let mut gateway = Gateway::new(tx, Backpressure::Spin);

        let refused = gateway.submit(order(3)).unwrap_err();
        assert_eq!(refused.into_inner().id, 3);
        assert!(gateway.submit(order(4)).is_err());
        assert_eq!(gateway.rejected(), 2);
    }

    #[test]
    fn test_spin_waits_for_consumer() {
        let (tx, mut rx) = RingBuffer::new(2).split();
        let mut gateway = Gateway::new(tx, Backpressure::Spin);

        let consumer = thread::spawn(move || {
            let mut seen = Vec::new();
            while seen.len() < 100 {
                if let Some(o) = rx.pop() {
                    seen.push(o.id);
                }
            }
            seen
        });

        for id in 0..100 {
            gateway.submit(order(id)).unwrap();
        }

        let seen = consumer.join().unwrap();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
        assert_eq!(gateway.rejected(), 0);
    }
}
