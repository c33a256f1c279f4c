use clap::Parser;
use flash_pipe::{Matcher, ObjectPool, Order, Pipeline, PipelineConfig, Side};
use hdrhistogram::Histogram;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Measure gateway submit latency through the SPSC pipeline.
#[derive(Parser, Debug)]
#[command(name = "latency-report")]
struct Args {
    /// Number of orders to push
    #[arg(long, default_value_t = 1_000_000)]
    orders: u64,

    /// Ring buffer slots
    #[arg(long, default_value_t = 65_536)]
    capacity: usize,

    /// Object pool slots on the matching side
    #[arg(long, default_value_t = 100_000)]
    pool_size: usize,

    /// Pin the matching thread to the last core
    #[arg(long)]
    pin: bool,
}

/// Parks every order in a pool slot and releases it straight away, so the
/// matching side exercises allocate/deallocate on each order.
struct PoolMatcher {
    pool: ObjectPool<Order>,
    exhausted: u64,
    invalid: u64,
    checksum: u64,
}

impl Matcher for PoolMatcher {
    fn on_order(&mut self, order: Order) {
        match self.pool.insert(order) {
            Ok(handle) => {
                if let Some(parked) = self.pool.get(&handle) {
                    self.checksum = self.checksum.wrapping_add(parked.id);
                }
                if self.pool.deallocate(handle).is_err() {
                    self.invalid += 1;
                }
            }
            Err(_) => self.exhausted += 1,
        }
    }

    fn warm_up(&mut self) {
        self.pool.warm_up();
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    println!("Preparing Latency Benchmark...");

    let config = PipelineConfig {
        queue_capacity: args.capacity,
        pin_matching_core: args.pin,
        ..PipelineConfig::default()
    };
    let matcher = PoolMatcher {
        pool: ObjectPool::new(args.pool_size),
        exhausted: 0,
        invalid: 0,
        checksum: 0,
    };

    let mut pipeline = match Pipeline::spawn(config, matcher) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            warn!(error = %e, "could not start pipeline");
            std::process::exit(1);
        }
    };

    let mut histogram = match Histogram::<u64>::new_with_bounds(1, 100_000, 3) {
        Ok(h) => h,
        Err(e) => {
            warn!(error = %e, "could not create histogram");
            std::process::exit(1);
        }
    };

    println!("Running {} iterations...", args.orders);

    let mut refused = 0u64;
    let started = Instant::now();

    for id in 1..=args.orders {
        let order = Order::new(
            id,
            10_000 + (id % 100),
            10,
            if id % 2 == 0 { Side::Bid } else { Side::Ask },
        );

        // Critical measurement section
        let start = Instant::now();
        let accepted = pipeline.gateway().submit(std::hint::black_box(order)).is_ok();
        let elapsed = start.elapsed();

        if !accepted {
            refused += 1;
        }
        // Saturate outliers instead of failing the run
        histogram.saturating_record(elapsed.as_nanos() as u64);
    }

    let total = started.elapsed();
    let (matcher, processed) = match pipeline.join() {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "matching thread failed");
            std::process::exit(1);
        }
    };
    info!(
        processed,
        refused,
        exhausted = matcher.exhausted,
        invalid = matcher.invalid,
        checksum = matcher.checksum,
        "run complete"
    );

    println!("\n=== Submit Latency Report (ns) ===");
    println!("Total Ops:  {}", args.orders);
    println!("Processed:  {}", processed);
    println!("Throughput: {:.2} ops/sec", processed as f64 / total.as_secs_f64());
    println!("----------------------------------");
    println!("Min:    {:6} ns", histogram.min());
    println!("P50:    {:6} ns", histogram.value_at_quantile(0.50));
    println!("P90:    {:6} ns", histogram.value_at_quantile(0.90));
    println!("P99:    {:6} ns", histogram.value_at_quantile(0.99));
    println!("P99.9:  {:6} ns", histogram.value_at_quantile(0.999));
    println!("P99.99: {:6} ns", histogram.value_at_quantile(0.9999));
    println!("Max:    {:6} ns", histogram.max());
    println!("----------------------------------");

    println!("\nDistribution:");
    for v in histogram.iter_log(100, 2.0) {
        let count = v.count_since_last_iteration();
        if count > 0 {
            println!("<= {:6} ns: {:10} count", v.value_iterated_to(), count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(pool_size: usize) -> PoolMatcher {
        PoolMatcher {
            pool: ObjectPool::new(pool_size),
            exhausted: 0,
            invalid: 0,
            checksum: 0,
        }
    }

    #[test]
    fn test_pool_matcher_releases_every_slot() {
        let mut m = matcher(4);
        for id in 1..=100 {
            m.on_order(Order::new(id, 10_000, 10, Side::Bid));
        }
        assert_eq!(m.invalid, 0);
        assert_eq!(m.exhausted, 0);
        assert_eq!(m.checksum, (1..=100).sum::<u64>());
        assert!(m.pool.is_empty());
    }
}
