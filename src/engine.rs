//! Engine - consumer-side event loop with CPU pinning and warm-up.
//!
//! Drains the order ring buffer and hands every order to a [`Matcher`].
//! Matching itself (price/time priority, trades, cancels) lives behind
//! that trait and is not part of this crate.

use tracing::{debug, info, warn};

use crate::order::Order;
use crate::ring_buffer::Consumer;

/// The matching collaborator fed by the engine.
///
/// Orders arrive in exactly the order the gateway pushed them, with no loss
/// and no duplication.
pub trait Matcher {
    /// Handle one order.
    fn on_order(&mut self, order: Order);

    /// Pre-fault memory before the first order arrives.
    fn warm_up(&mut self) {}

    /// Called when a poll found the queue empty.
    fn on_idle(&mut self) {}
}

impl<M: Matcher + ?Sized> Matcher for Box<M> {
    #[inline]
    fn on_order(&mut self, order: Order) {
        (**self).on_order(order)
    }

    fn warm_up(&mut self) {
        (**self).warm_up()
    }

    #[inline]
    fn on_idle(&mut self) {
        (**self).on_idle()
    }
}

/// The consumer side of the pipeline.
pub struct Engine<M> {
    /// The downstream matcher
    pub matcher: M,

    /// Orders handed to the matcher so far
    processed: u64,
}

impl<M: Matcher> Engine<M> {
    pub fn new(matcher: M) -> Self {
        Self {
            matcher,
            processed: 0,
        }
    }

    /// Run the event loop until the producer is gone and the queue is empty.
    ///
    /// # Arguments
    /// * `input` - Consumer end of the order ring buffer
    /// * `pin_to_core` - Whether to pin to the last available CPU core
    ///
    /// # Returns
    /// Total number of orders processed by this engine.
    pub fn run(&mut self, input: &mut Consumer<Order>, pin_to_core: bool) -> u64 {
        if pin_to_core {
            self.pin_to_core();
        }

        self.warm_up();
        info!(capacity = input.capacity(), "matching loop started");

        // Busy-wait; the producer may push again at any moment
        loop {
            if self.poll(input) == 0 {
                // Check after an empty poll so nothing pushed before the
                // producer dropped is left behind
                if input.is_abandoned() && input.is_empty() {
                    break;
                }
                self.matcher.on_idle();
                std::hint::spin_loop();
            }
        }

        info!(processed = self.processed, "matching loop stopped");
        self.processed
    }

    /// Drain everything currently queued. Returns how many orders were handled.
    #[inline]
    pub fn poll(&mut self, input: &mut Consumer<Order>) -> usize {
        let mut count = 0;
        while let Some(order) = input.pop() {
            self.process(order);
            count += 1;
        }
        count
    }

    /// Hand a single order to the matcher.
    ///
    /// Entry point for synchronous usage (testing, benchmarks).
    #[inline]
    pub fn process(&mut self, order: Order) {
        self.matcher.on_order(order);
        self.processed += 1;
    }

    /// Pin the current thread to the last available CPU core.
    ///
    /// The last core is typically isolated from OS interrupts.
    pub fn pin_to_core(&self) -> bool {
        let Some(last_core) = core_affinity::get_core_ids().and_then(|ids| ids.last().copied())
        else {
            warn!("no core ids available, matching thread left unpinned");
            return false;
        };

        let pinned = core_affinity::set_for_current(last_core);
        if pinned {
            debug!(core = last_core.id, "matching thread pinned");
        } else {
            warn!(core = last_core.id, "failed to pin matching thread");
        }
        pinned
    }

    /// Warm up the matcher before the hot loop starts.
    pub fn warm_up(&mut self) {
        self.matcher.warm_up();
    }

    /// Orders handed to the matcher so far.
    #[inline]
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Give the matcher back.
    pub fn into_matcher(self) -> M {
        self.matcher
    }
}
