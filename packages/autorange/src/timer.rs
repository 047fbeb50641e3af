use std::num::NonZero;
use std::time::Duration;

use tracing::debug;

use crate::estimate::estimate_block_size;
use crate::sampling::{LoopLimits, measurement_loop};
use crate::threads::ThreadScope;
use crate::{
    AdaptiveOptions, CacheEviction, Error, Measurement, Metadata, ProcessThreads, Result,
    ThreadControl, TimedWork,
};

/// Times a unit of work and summarizes the samples as a [`Measurement`].
///
/// Three timing strategies are available:
///
/// * [`timeit()`][Self::timeit] takes one sample of a caller-chosen number of iterations.
/// * [`blocked_autorange()`][Self::blocked_autorange] picks a block size that hides the fixed
///   cost of a sample, then takes samples until a minimum total duration has been sampled.
/// * [`adaptive_autorange()`][Self::adaptive_autorange] does the same but keeps sampling until
///   the samples are stable, within a maximum total duration.
///
/// Every strategy applies the configured thread count (see [`ThreadControl`]) while sampling
/// and restores the previous value afterwards, also when the timed work panics. Panics from
/// the timed work propagate to the caller.
///
/// Every call produces a new, independent [`Measurement`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use autorange::{Timer, Work};
///
/// let data: Vec<u64> = (0..1000).rev().collect();
///
/// let work = Work::with_environment(data, |data| data.clone(), |data| data.sort_unstable());
///
/// let mut timer = Timer::builder(work).label("sort").sub_label("1000 reversed").build();
///
/// let measurement = timer.blocked_autorange(Duration::from_millis(20)).unwrap();
///
/// println!("{measurement}");
/// ```
#[derive(Debug)]
pub struct Timer<W> {
    work: W,
    threads: Box<dyn ThreadControl>,
    num_threads: NonZero<usize>,
    metadata: Metadata,
    cache_eviction: Option<CacheEviction>,
}

impl<W> Timer<W>
where
    W: TimedWork,
{
    /// The number of iterations commonly used with [`timeit()`][Self::timeit] when the caller
    /// has no better idea.
    pub const DEFAULT_TIMEIT_NUMBER: u64 = 1_000_000;

    /// The minimum total sample duration commonly used with
    /// [`blocked_autorange()`][Self::blocked_autorange].
    pub const DEFAULT_BLOCKED_MIN_RUN_TIME: Duration = Duration::from_millis(200);

    /// Creates a timer for `work` with default settings: one thread, no labels and cache
    /// speedup measured with the default [`CacheEviction`].
    #[must_use]
    pub fn new(work: W) -> Self {
        Self::builder(work).build()
    }

    /// Starts configuring a timer for `work`.
    pub fn builder(work: W) -> TimerBuilder<W> {
        TimerBuilder::new(work)
    }

    /// The thread count applied while sampling.
    #[must_use]
    pub fn num_threads(&self) -> NonZero<usize> {
        self.num_threads
    }

    /// The labels attached to every measurement.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Takes a single sample of `number` iterations.
    ///
    /// A short warm-up of `number / 100` iterations (at least one) runs first and is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `number` is zero.
    pub fn timeit(&mut self, number: u64) -> Result<Measurement> {
        let number = NonZero::new(number).ok_or_else(|| Error::InvalidInput {
            problem: "timeit() requires at least one iteration".to_string(),
        })?;

        let Self {
            work,
            threads,
            num_threads,
            metadata,
            ..
        } = self;

        #[expect(
            clippy::integer_division,
            reason = "the warm-up length is only a rough fraction of the sample"
        )]
        let warm_up = (number.get() / 100).max(1);
        work.time(warm_up);

        let scope = ThreadScope::new(&**threads, *num_threads);
        let time = scope.run(|| work.time(number.get()));

        debug!(number, ?time, "timeit sample taken");

        Measurement::new(number, vec![time], *num_threads, metadata.clone())
    }

    /// Takes samples until at least `min_run_time` has been sampled.
    ///
    /// The block size is chosen so that the fixed cost of a sample is negligible, using
    /// `min_run_time` as the calibration budget. The returned measurement carries the cache
    /// speedup unless the timer was built with
    /// [`without_cache_speedup()`][TimerBuilder::without_cache_speedup].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MeasurementDegenerate`] if the work does not take measurable time no
    /// matter how many iterations are executed.
    pub fn blocked_autorange(&mut self, min_run_time: Duration) -> Result<Measurement> {
        self.blocked_autorange_with_callback(min_run_time, |_, _| {})
    }

    /// Like [`blocked_autorange()`][Self::blocked_autorange] but invokes `callback` with the
    /// block size and duration of every sample as soon as it is taken.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MeasurementDegenerate`] if the work does not take measurable time no
    /// matter how many iterations are executed.
    pub fn blocked_autorange_with_callback(
        &mut self,
        min_run_time: Duration,
        mut callback: impl FnMut(u64, Duration),
    ) -> Result<Measurement> {
        let limits = LoopLimits {
            min_run_time,
            max_run_time: None,
        };

        self.sample_blocks(min_run_time, limits, |_, _| true, &mut callback)
    }

    /// Takes samples until at least the minimum run time has been sampled and the samples are
    /// stable, or until more than the maximum run time has been sampled.
    ///
    /// Samples are stable once there are more than three of them and their interquartile range
    /// is below the configured fraction of their median. The block size is chosen using
    /// [`AdaptiveOptions::CALIBRATION_RUN_TIME`] as the calibration budget.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the options are invalid and
    /// [`Error::MeasurementDegenerate`] if the work does not take measurable time no matter how
    /// many iterations are executed.
    pub fn adaptive_autorange(&mut self, options: AdaptiveOptions) -> Result<Measurement> {
        self.adaptive_autorange_with_callback(options, |_, _| {})
    }

    /// Like [`adaptive_autorange()`][Self::adaptive_autorange] but invokes `callback` with the
    /// block size and duration of every sample as soon as it is taken.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the options are invalid and
    /// [`Error::MeasurementDegenerate`] if the work does not take measurable time no matter how
    /// many iterations are executed.
    pub fn adaptive_autorange_with_callback(
        &mut self,
        options: AdaptiveOptions,
        mut callback: impl FnMut(u64, Duration),
    ) -> Result<Measurement> {
        options.validate()?;

        let threshold = options.threshold();
        let num_threads = self.num_threads;
        let metadata = self.metadata.clone();

        let limits = LoopLimits {
            min_run_time: options.min_run_time(),
            max_run_time: options.max_run_time(),
        };

        self.sample_blocks(
            AdaptiveOptions::CALIBRATION_RUN_TIME,
            limits,
            move |number, times| {
                times.len() > 3
                    && Measurement::new(number, times.to_vec(), num_threads, metadata.clone())
                        .is_ok_and(|provisional| provisional.meets_confidence(threshold))
            },
            &mut callback,
        )
    }

    /// Not supported because a fixed number of repetitions chosen by the caller does not hide
    /// the fixed cost of a sample.
    ///
    /// # Errors
    ///
    /// Always returns [`Error::UnsupportedOperation`].
    #[cfg_attr(test, mutants::skip)] // Nothing to mutate besides the error itself.
    pub fn repeat(&mut self, _repeat: usize, _number: u64) -> Result<Vec<Duration>> {
        Err(Error::UnsupportedOperation {
            operation: "repeat",
            replacement: "blocked_autorange",
        })
    }

    /// Not supported because its results cannot be trusted.
    ///
    /// # Errors
    ///
    /// Always returns [`Error::UnsupportedOperation`].
    #[cfg_attr(test, mutants::skip)] // Nothing to mutate besides the error itself.
    pub fn autorange(&mut self) -> Result<Measurement> {
        Err(Error::UnsupportedOperation {
            operation: "autorange",
            replacement: "blocked_autorange",
        })
    }

    fn sample_blocks(
        &mut self,
        calibration_run_time: Duration,
        limits: LoopLimits,
        mut stop_hook: impl FnMut(NonZero<u64>, &[Duration]) -> bool,
        callback: &mut dyn FnMut(u64, Duration),
    ) -> Result<Measurement> {
        let Self {
            work,
            threads,
            num_threads,
            metadata,
            cache_eviction,
        } = self;

        let scope = ThreadScope::new(&**threads, *num_threads);

        let block = estimate_block_size(
            work,
            &scope,
            calibration_run_time,
            cache_eviction.as_ref(),
        )?;
        let number = block.number;

        let times = measurement_loop(
            &scope,
            number,
            limits,
            || work.time(number.get()),
            |times| stop_hook(number, times),
            callback,
        );

        debug!(
            number,
            samples = times.len(),
            total_time = ?times.iter().sum::<Duration>(),
            "sampling finished"
        );

        let mut measurement = Measurement::new(number, times, *num_threads, metadata.clone())?;

        if let Some(cache_speedup) = block.cache_speedup {
            measurement.set_cache_speedup(cache_speedup);
        }

        Ok(measurement)
    }
}

/// Configures a [`Timer`]. Created by [`Timer::builder()`].
#[derive(Debug)]
#[must_use]
pub struct TimerBuilder<W> {
    work: W,
    threads: Box<dyn ThreadControl>,
    num_threads: NonZero<usize>,
    metadata: Metadata,
    cache_eviction: Option<CacheEviction>,
}

impl<W> TimerBuilder<W>
where
    W: TimedWork,
{
    fn new(work: W) -> Self {
        Self {
            work,
            threads: Box::new(ProcessThreads),
            num_threads: NonZero::<usize>::MIN,
            metadata: Metadata::new(),
            cache_eviction: Some(CacheEviction::default()),
        }
    }

    /// Sets the thread count applied while sampling. Defaults to one.
    pub fn num_threads(mut self, num_threads: NonZero<usize>) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Replaces the thread control that applies the thread count. Defaults to
    /// [`ProcessThreads`].
    pub fn thread_control(mut self, threads: impl ThreadControl + 'static) -> Self {
        self.threads = Box::new(threads);
        self
    }

    /// Sets the primary label of every measurement.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.metadata = self.metadata.with_label(label);
        self
    }

    /// Sets the secondary label of every measurement.
    pub fn sub_label(mut self, sub_label: impl Into<String>) -> Self {
        self.metadata = self.metadata.with_sub_label(sub_label);
        self
    }

    /// Sets the description of every measurement.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.metadata = self.metadata.with_description(description);
        self
    }

    /// Sets the environment name of every measurement.
    pub fn env(mut self, env: impl Into<String>) -> Self {
        self.metadata = self.metadata.with_env(env);
        self
    }

    /// Sets the textual representation of the timed statement.
    pub fn stmt(mut self, stmt: impl Into<String>) -> Self {
        self.metadata = self.metadata.with_stmt(stmt);
        self
    }

    /// Replaces the cache eviction used to measure the cache speedup.
    pub fn cache_eviction(mut self, eviction: CacheEviction) -> Self {
        self.cache_eviction = Some(eviction);
        self
    }

    /// Skips the cold-cache measurement. Measurements will report no cache speedup.
    pub fn without_cache_speedup(mut self) -> Self {
        self.cache_eviction = None;
        self
    }

    /// Creates the timer.
    #[must_use]
    pub fn build(self) -> Timer<W> {
        Timer {
            work: self.work,
            threads: self.threads,
            num_threads: self.num_threads,
            metadata: self.metadata,
            cache_eviction: self.cache_eviction,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::FakeWork;
    use crate::threads::{FakeThreads, MockThreadControl};

    const TEN_MS: Duration = Duration::from_millis(10);

    fn nz(value: usize) -> NonZero<usize> {
        NonZero::new(value).unwrap()
    }

    fn timer(work: FakeWork, threads: &FakeThreads) -> Timer<FakeWork> {
        Timer::builder(work)
            .thread_control(threads.clone())
            .cache_eviction(CacheEviction::disabled())
            .build()
    }

    #[test]
    fn timeit_takes_one_sample_after_warm_up() {
        let threads = FakeThreads::new(1);
        let mut timer = timer(FakeWork::per_iteration(Duration::from_nanos(5)), &threads);

        let measurement = timer.timeit(1000).unwrap();

        assert_eq!(measurement.number_per_run().get(), 1000);
        assert_eq!(measurement.raw_times(), [Duration::from_nanos(5000)]);
        assert_eq!(timer.work.calls(), vec![10, 1000]);
    }

    #[test]
    fn timeit_warm_up_is_at_least_one_iteration() {
        let threads = FakeThreads::new(1);
        let mut timer = timer(FakeWork::per_iteration(Duration::from_nanos(5)), &threads);

        timer.timeit(7).unwrap();

        assert_eq!(timer.work.calls(), vec![1, 7]);
    }

    #[test]
    fn timeit_rejects_zero() {
        let threads = FakeThreads::new(1);
        let mut timer = timer(FakeWork::per_iteration(TEN_MS), &threads);

        let result = timer.timeit(0);

        assert!(matches!(result, Err(Error::InvalidInput { .. })));
        assert!(timer.work.calls().is_empty());
        assert!(threads.history().is_empty());
    }

    #[test]
    fn timeit_of_zero_cost_work_is_single_zero_sample() {
        let threads = FakeThreads::new(1);
        let mut timer = timer(FakeWork::per_iteration(Duration::ZERO), &threads);

        let measurement = timer.timeit(1).unwrap();

        assert_eq!(measurement.raw_times(), [Duration::ZERO]);
        assert_eq!(measurement.median(), Duration::ZERO);
    }

    #[test]
    fn timeit_scopes_only_timed_sample() {
        let threads = FakeThreads::new(4);
        let observed = Arc::new(Mutex::new(Vec::new()));

        let work = FakeWork::new({
            let threads = threads.clone();
            let observed = Arc::clone(&observed);
            move |_| {
                observed.lock().unwrap().push(threads.current());
                TEN_MS
            }
        });

        let mut timer = Timer::builder(work)
            .thread_control(threads.clone())
            .num_threads(nz(2))
            .build();

        let measurement = timer.timeit(100).unwrap();

        assert_eq!(*observed.lock().unwrap(), vec![4, 2]);
        assert_eq!(threads.current(), 4);
        assert_eq!(measurement.num_threads(), nz(2));
    }

    #[test]
    fn blocked_constant_work_takes_exact_sample_count() {
        let threads = FakeThreads::new(1);
        let mut timer = timer(FakeWork::per_iteration(TEN_MS), &threads);

        let measurement = timer
            .blocked_autorange(Timer::<FakeWork>::DEFAULT_BLOCKED_MIN_RUN_TIME)
            .unwrap();

        assert_eq!(measurement.number_per_run().get(), 1);
        assert_eq!(measurement.raw_times().len(), 20);
        assert!(measurement.raw_times().iter().all(|time| *time == TEN_MS));
        assert_eq!(measurement.median(), TEN_MS);
    }

    #[test]
    fn blocked_reports_unit_cache_speedup_for_identical_timings() {
        let threads = FakeThreads::new(1);
        let mut timer = timer(FakeWork::per_iteration(TEN_MS), &threads);

        let measurement = timer.blocked_autorange(Duration::from_millis(50)).unwrap();

        let speedup = measurement.cache_speedup().unwrap();
        assert!((speedup - 1.0).abs() < 1e-9, "speedup was {speedup}");
    }

    #[test]
    fn blocked_without_cache_speedup_skips_cold_run() {
        let threads = FakeThreads::new(1);
        let mut timer = Timer::builder(FakeWork::per_iteration(TEN_MS))
            .thread_control(threads.clone())
            .without_cache_speedup()
            .build();

        let measurement = timer.blocked_autorange(Duration::from_millis(30)).unwrap();

        assert_eq!(measurement.cache_speedup(), None);
        // Five overhead trials, one estimation trial, three samples.
        assert_eq!(timer.work.calls(), vec![0, 0, 0, 0, 0, 1, 1, 1, 1]);
    }

    #[test]
    fn blocked_callback_sees_every_sample() {
        let threads = FakeThreads::new(1);
        let mut timer = timer(FakeWork::per_iteration(TEN_MS), &threads);
        let mut seen = Vec::new();

        let measurement = timer
            .blocked_autorange_with_callback(Duration::from_millis(40), |number, time| {
                seen.push((number, time));
            })
            .unwrap();

        assert_eq!(seen, vec![(1, TEN_MS); 4]);
        assert_eq!(measurement.raw_times().len(), 4);
    }

    #[test]
    fn blocked_applies_thread_count_to_estimation_and_sampling() {
        let threads = FakeThreads::new(4);
        let mut timer = Timer::builder(FakeWork::per_iteration(TEN_MS))
            .thread_control(threads.clone())
            .num_threads(nz(2))
            .without_cache_speedup()
            .build();

        timer.blocked_autorange(Duration::from_millis(20)).unwrap();

        assert_eq!(threads.history(), vec![2, 4, 2, 4]);
        assert_eq!(threads.current(), 4);
    }

    #[test]
    fn repeated_calls_produce_independent_measurements() {
        let threads = FakeThreads::new(1);
        let mut timer = timer(FakeWork::per_iteration(TEN_MS), &threads);

        let first = timer.blocked_autorange(Duration::from_millis(30)).unwrap();
        let second = timer.blocked_autorange(Duration::from_millis(50)).unwrap();

        assert_eq!(first.raw_times().len(), 3);
        assert_eq!(second.raw_times().len(), 5);
    }

    #[test]
    fn adaptive_stable_work_stops_at_min_run_time() {
        let threads = FakeThreads::new(1);
        let mut timer = timer(FakeWork::per_iteration(Duration::from_millis(1)), &threads);

        let measurement = timer.adaptive_autorange(AdaptiveOptions::new()).unwrap();

        assert_eq!(measurement.number_per_run().get(), 1);
        assert_eq!(measurement.raw_times().len(), 10);
        assert!(measurement.meets_confidence(AdaptiveOptions::DEFAULT_THRESHOLD));
    }

    #[test]
    fn adaptive_needs_more_than_three_samples() {
        let threads = FakeThreads::new(1);
        let mut timer = timer(FakeWork::per_iteration(TEN_MS), &threads);

        let measurement = timer
            .adaptive_autorange(AdaptiveOptions::new().with_min_run_time(Duration::ZERO))
            .unwrap();

        assert_eq!(measurement.raw_times().len(), 4);
    }

    #[test]
    fn adaptive_high_variance_is_bounded_by_max_run_time() {
        let threads = FakeThreads::new(1);
        let mut toggle = false;

        let work = FakeWork::new(move |iterations| {
            if iterations == 0 {
                return Duration::ZERO;
            }

            toggle = !toggle;
            if toggle {
                Duration::from_millis(1)
            } else {
                TEN_MS
            }
        });

        let mut timer = timer(work, &threads);
        let max_run_time = Duration::from_millis(100);

        let measurement = timer
            .adaptive_autorange(AdaptiveOptions::new().with_max_run_time(max_run_time))
            .unwrap();

        let total = measurement.total_time();
        assert!(total > max_run_time);
        assert!(total <= max_run_time + TEN_MS);
        assert!(!measurement.meets_confidence(AdaptiveOptions::DEFAULT_THRESHOLD));
        assert!(measurement.has_warnings());
    }

    #[test]
    fn adaptive_zero_max_run_time_takes_single_sample() {
        let threads = FakeThreads::new(1);
        let mut timer = timer(FakeWork::per_iteration(TEN_MS), &threads);

        let measurement = timer
            .adaptive_autorange(AdaptiveOptions::new().with_max_run_time(Duration::ZERO))
            .unwrap();

        assert_eq!(measurement.raw_times().len(), 1);
    }

    #[test]
    fn adaptive_rejects_invalid_threshold_before_running() {
        let threads = FakeThreads::new(1);
        let mut timer = timer(FakeWork::per_iteration(TEN_MS), &threads);

        let result = timer.adaptive_autorange(AdaptiveOptions::new().with_threshold(-0.5));

        assert!(matches!(result, Err(Error::InvalidInput { .. })));
        assert!(timer.work.calls().is_empty());
    }

    #[test]
    fn degenerate_work_is_reported() {
        let threads = FakeThreads::new(3);
        let mut timer = Timer::builder(FakeWork::per_iteration(Duration::ZERO))
            .thread_control(threads.clone())
            .without_cache_speedup()
            .build();

        let result = timer.blocked_autorange(Duration::from_millis(10));

        assert!(matches!(result, Err(Error::MeasurementDegenerate { .. })));
        assert_eq!(threads.current(), 3);
    }

    #[test]
    fn panicking_work_restores_thread_count() {
        let threads = FakeThreads::new(4);
        let work = FakeWork::new(|iterations| {
            assert!(iterations == 0, "timed work failed");
            Duration::ZERO
        });

        let mut timer = Timer::builder(work)
            .thread_control(threads.clone())
            .num_threads(nz(2))
            .without_cache_speedup()
            .build();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            timer.blocked_autorange(Duration::from_millis(10))
        }));

        assert!(result.is_err());
        assert_eq!(threads.current(), 4);
        assert_eq!(threads.history(), vec![2, 4]);
    }

    #[test]
    fn metadata_is_attached_to_measurements() {
        let threads = FakeThreads::new(1);
        let mut timer = Timer::builder(FakeWork::per_iteration(TEN_MS))
            .thread_control(threads.clone())
            .label("label")
            .sub_label("sub")
            .description("desc")
            .env("env")
            .stmt("stmt")
            .build();

        let measurement = timer.timeit(1).unwrap();
        let metadata = measurement.metadata();

        assert_eq!(metadata, timer.metadata());
        assert_eq!(metadata.label(), Some("label"));
        assert_eq!(metadata.sub_label(), Some("sub"));
        assert_eq!(metadata.description(), Some("desc"));
        assert_eq!(metadata.env(), Some("env"));
        assert_eq!(metadata.stmt(), Some("stmt"));
    }

    #[test]
    fn defaults_to_one_thread() {
        let timer = Timer::new(FakeWork::per_iteration(TEN_MS));

        assert_eq!(timer.num_threads(), nz(1));
        assert_eq!(timer.metadata(), &Metadata::new());
    }

    #[test]
    fn legacy_strategies_always_fail_without_side_effects() {
        // The mock has no expectations, so any use of thread control would panic.
        let mut timer = Timer::builder(FakeWork::per_iteration(TEN_MS))
            .thread_control(MockThreadControl::new())
            .build();

        for (repeat, number) in [(0, 0), (5, 1_000_000), (usize::MAX, u64::MAX)] {
            assert!(matches!(
                timer.repeat(repeat, number),
                Err(Error::UnsupportedOperation {
                    operation: "repeat",
                    replacement: "blocked_autorange"
                })
            ));
        }

        assert!(matches!(
            timer.autorange(),
            Err(Error::UnsupportedOperation {
                operation: "autorange",
                ..
            })
        ));
        assert!(timer.work.calls().is_empty());
    }

    static_assertions::assert_impl_all!(Timer<FakeWork>: Send);
    static_assertions::assert_impl_all!(TimerBuilder<FakeWork>: Send);
}
