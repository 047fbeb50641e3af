//! Block size estimation.
//!
//! Every sample has a fixed cost (reading the clock, preparing trial state, ...) that is
//! independent of how many iterations of the work it contains. To keep that cost out of the
//! results, each sample executes the work a number of times in a row (the "block size") chosen
//! so that the fixed cost is a negligible fraction of the sample duration.

use std::num::NonZero;
use std::time::Duration;

use tracing::{debug, trace};

use crate::cache::{cache_speedup, measure_uncached_runtime};
use crate::threads::ThreadScope;
use crate::{CacheEviction, Error, Result, TimedWork};

/// How many empty trials are used to determine the fixed cost of a trial.
const OVERHEAD_TRIALS: usize = 5;

/// The fixed cost of a trial may be at most this fraction of the trial duration.
const MAX_RELATIVE_OVERHEAD: f64 = 1e-4;

/// A trial must last at least this fraction of the minimum run time.
const MIN_RUN_TIME_DIVISOR: u32 = 1000;

/// Each estimation step multiplies the block size by this factor.
const GROWTH_FACTOR: u64 = 10;

/// Estimation fails if the block size has been grown this many times without settling.
///
/// The largest block ever executed is `GROWTH_FACTOR^(MAX_GROWTH_STEPS - 1)` iterations, which
/// keeps a clock that never advances from stalling the caller for long.
pub(crate) const MAX_GROWTH_STEPS: u32 = 10;

/// The outcome of block size estimation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct BlockSize {
    pub(crate) number: NonZero<u64>,

    /// `None` if the cold-cache measurement was not requested.
    pub(crate) cache_speedup: Option<f64>,
}

/// Finds the smallest power of ten that makes the fixed cost of a trial negligible.
///
/// The search stops at the first block size whose trial both keeps the fixed cost under
/// [`MAX_RELATIVE_OVERHEAD`] and lasts at least `min_run_time / 1000`. It also stops, accepting
/// the current block size, as soon as a trial lasts longer than `min_run_time` even if the
/// fixed cost is not yet negligible. The trials taken here serve as warm-up and are discarded.
///
/// If `eviction` is provided, a single cold-cache execution is measured before the search and
/// compared against the per-iteration duration of the final block.
pub(crate) fn estimate_block_size<W>(
    work: &mut W,
    scope: &ThreadScope<'_>,
    min_run_time: Duration,
    eviction: Option<&CacheEviction>,
) -> Result<BlockSize>
where
    W: TimedWork + ?Sized,
{
    let overhead = median_overhead(work);
    let uncached_time = eviction.map(|eviction| measure_uncached_runtime(work, eviction));
    let min_trial_time = min_run_time / MIN_RUN_TIME_DIVISOR;

    let block_size = scope.run(|| {
        let mut number: u64 = 1;
        let mut steps: u32 = 0;

        loop {
            let time_taken = work.time(number);
            let speedup = uncached_time.map(|uncached| cache_speedup(uncached, time_taken, number));
            let relative = relative_overhead(overhead, time_taken);

            trace!(number, ?time_taken, relative_overhead = relative, "block size candidate");

            if (relative <= MAX_RELATIVE_OVERHEAD && time_taken >= min_trial_time)
                || time_taken > min_run_time
            {
                return Ok(BlockSize {
                    number: NonZero::new(number).expect("block size starts at 1 and only grows"),
                    cache_speedup: speedup,
                });
            }

            steps = steps.saturating_add(1);

            let next = number.checked_mul(GROWTH_FACTOR);

            match next {
                Some(next) if steps < MAX_GROWTH_STEPS => number = next,
                _ => {
                    return Err(Error::MeasurementDegenerate {
                        steps,
                        last_time: time_taken,
                    });
                }
            }
        }
    })?;

    debug!(
        number = block_size.number,
        ?overhead,
        cache_speedup = block_size.cache_speedup,
        "estimated block size"
    );

    Ok(block_size)
}

fn median_overhead<W>(work: &mut W) -> Duration
where
    W: TimedWork + ?Sized,
{
    let mut trials: Vec<Duration> = (0..OVERHEAD_TRIALS).map(|_| work.time(0)).collect();
    trials.sort_unstable();

    median_of_sorted(&trials)
}

fn median_of_sorted(sorted: &[Duration]) -> Duration {
    let middle = sorted.len() / 2;

    match (sorted.get(middle.wrapping_sub(1)), sorted.get(middle)) {
        (Some(lower), Some(upper)) if sorted.len() % 2 == 0 => (*lower + *upper) / 2,
        (_, Some(middle)) => *middle,
        _ => Duration::ZERO,
    }
}

/// The fixed cost of a trial as a fraction of the trial duration.
///
/// Zero fixed cost is always negligible, even if the trial itself took no measurable time.
fn relative_overhead(overhead: Duration, time_taken: Duration) -> f64 {
    if overhead.is_zero() {
        0.0
    } else if time_taken.is_zero() {
        f64::INFINITY
    } else {
        overhead.as_secs_f64() / time_taken.as_secs_f64()
    }
}
