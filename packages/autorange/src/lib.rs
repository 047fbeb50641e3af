#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adaptive micro-benchmark timer.
//!
//! Measuring a very short operation by timing single executions is dominated by the cost of
//! reading the clock and setting up each sample. This crate instead executes the operation many
//! times in a row per sample (a "block"), choosing the block size so that this fixed cost is a
//! negligible fraction of the sample, and then keeps sampling until enough time has been spent
//! or the samples have become stable.
//!
//! The main entry point is [`Timer`], which offers three strategies:
//!
//! - [`Timer::timeit()`] - one sample of a caller-chosen number of iterations.
//! - [`Timer::blocked_autorange()`] - automatic block size, samples for a fixed minimum
//!   duration.
//! - [`Timer::adaptive_autorange()`] - automatic block size, samples until the interquartile
//!   range of the samples is small relative to their median (see [`AdaptiveOptions`]).
//!
//! The timed operation is described by a [`TimedWork`] implementation, typically a [`Work`]
//! built from closures. Results are returned as a [`Measurement`] with per-iteration statistics.
//!
//! # Operating principles
//!
//! ## Block size
//!
//! Before sampling, the timer measures the fixed cost of an empty sample and grows the block
//! size by powers of ten until that cost drops below 0.01% of the sample duration. Very slow
//! work stops the search early, accepting a block size of one.
//!
//! ## Thread count
//!
//! Work that parallelizes internally can read [`compute_threads()`] to size itself. The timer
//! sets this value (or whatever [`ThreadControl`] it is given) for the duration of sampling and
//! restores the previous value afterwards.
//!
//! ## Cache sensitivity
//!
//! Unless disabled, the timer measures one execution of the work right after evicting the
//! processor caches and reports how much slower it was than a warm execution as
//! [`Measurement::cache_speedup()`]. This is informational and does not affect sampling.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use autorange::{AdaptiveOptions, Timer, Work};
//!
//! let work = Work::new(|| {
//!     std::hint::black_box((0..100_u64).map(|x| x * x).sum::<u64>());
//! });
//!
//! let mut timer = Timer::builder(work).label("sum of squares").build();
//!
//! let measurement = timer
//!     .adaptive_autorange(AdaptiveOptions::new().with_max_run_time(Duration::from_millis(200)))
//!     .unwrap();
//!
//! println!("{measurement}");
//!
//! for warning in measurement.warnings() {
//!     println!("warning: {warning}");
//! }
//! ```

mod cache;
mod clock;
mod error;
mod estimate;
mod measurement;
mod options;
mod sampling;
mod threads;
mod timer;
mod work;

#[cfg(test)]
mod fake;

pub use cache::CacheEviction;
#[cfg(test)]
pub(crate) use clock::FakeClock;
pub use clock::{Clock, MonotonicClock};
pub use error::Error;
pub(crate) use error::Result;
#[cfg(test)]
pub(crate) use fake::FakeWork;
pub use measurement::{Measurement, Metadata, Warning};
pub use options::AdaptiveOptions;
pub use threads::{ProcessThreads, ThreadControl, compute_threads};
pub use timer::{Timer, TimerBuilder};
pub use work::{TimedWork, Work};
