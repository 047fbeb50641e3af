//! Times a few small operations with each of the `autorange` strategies.
//!
//! Block size selection and sampling progress are reported as `tracing` events at the debug
//! level, which the subscriber installed here prints to stdout.
//!
//! Run with: `cargo run --example autorange_basic`.

use std::collections::HashMap;
use std::hint::black_box;
use std::time::Duration;

use autorange::{AdaptiveOptions, Timer, Work};
use tracing::Level;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();

    println!("=== timeit ===");
    {
        let mut timer = Timer::builder(Work::new(|| {
            black_box(black_box(12345_u64).count_ones());
        }))
        .label("count_ones")
        .stmt("x.count_ones()")
        .build();

        match timer.timeit(1_000_000) {
            Ok(measurement) => println!("{measurement}"),
            Err(error) => println!("timeit failed: {error}"),
        }
    }

    println!("=== blocked_autorange ===");
    {
        let lookup: HashMap<u64, u64> = (0..10_000_u64)
            .map(|key| (key, key.wrapping_mul(3)))
            .collect();

        let mut timer = Timer::builder(Work::with_environment(
            lookup,
            |lookup| lookup.clone(),
            |lookup| {
                black_box(lookup.get(&black_box(5_000)));
            },
        ))
        .label("HashMap::get")
        .sub_label("10k entries")
        .build();

        match timer.blocked_autorange(Duration::from_millis(200)) {
            Ok(measurement) => println!("{measurement}"),
            Err(error) => println!("blocked_autorange failed: {error}"),
        }
    }

    println!("=== adaptive_autorange ===");
    {
        let mut timer = Timer::builder(Work::with_setup(
            || (0..1_000_u32).rev().collect::<Vec<_>>(),
            |numbers| numbers.sort_unstable(),
        ))
        .label("sort_unstable")
        .description("1000 reversed elements")
        .build();

        let options = AdaptiveOptions::new().with_max_run_time(Duration::from_secs(2));

        match timer.adaptive_autorange_with_callback(options, |number, time| {
            println!("  sample of {number} iterations took {time:?}");
        }) {
            Ok(measurement) => println!("{measurement}"),
            Err(error) => println!("adaptive_autorange failed: {error}"),
        }
    }
}
