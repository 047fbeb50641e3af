use std::fmt;
use std::num::NonZero;
use std::time::Duration;

use crate::{Error, Result};

/// Confidence intervals narrower than this are not meaningful given timer resolution.
const MIN_CONFIDENCE_INTERVAL_SECS: f64 = 25e-9;

const MAX_SIGNIFICANT_FIGURES: f64 = 4.0;

/// z-score of a one-sided 95% interval.
const CONFIDENCE_Z: f64 = 1.645;

/// Descriptive labels attached to a [`Measurement`].
///
/// None of these affect how measurements are taken. They only identify the measurement when it
/// is displayed or compared by downstream tooling.
///
/// # Examples
///
/// ```
/// use autorange::Metadata;
///
/// let metadata = Metadata::new()
///     .with_label("sort")
///     .with_sub_label("1000 elements")
///     .with_stmt("data.sort()");
///
/// assert_eq!(metadata.label(), Some("sort"));
/// assert_eq!(metadata.env(), None);
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Metadata {
    label: Option<String>,
    sub_label: Option<String>,
    description: Option<String>,
    env: Option<String>,
    stmt: Option<String>,
}

impl Metadata {
    /// Creates metadata with no labels set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the primary label, typically naming what is being measured.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the secondary label, typically naming a variant of what is being measured.
    #[must_use]
    pub fn with_sub_label(mut self, sub_label: impl Into<String>) -> Self {
        self.sub_label = Some(sub_label.into());
        self
    }

    /// Sets a free-form description, e.g. the input size.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the name of the environment the measurement was taken in.
    #[must_use]
    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }

    /// Sets a textual representation of the timed statement.
    #[must_use]
    pub fn with_stmt(mut self, stmt: impl Into<String>) -> Self {
        self.stmt = Some(stmt.into());
        self
    }

    /// The primary label.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The secondary label.
    #[must_use]
    pub fn sub_label(&self) -> Option<&str> {
        self.sub_label.as_deref()
    }

    /// The free-form description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The name of the environment.
    #[must_use]
    pub fn env(&self) -> Option<&str> {
        self.env.as_deref()
    }

    /// The textual representation of the timed statement.
    #[must_use]
    pub fn stmt(&self) -> Option<&str> {
        self.stmt.as_deref()
    }

    fn title(&self) -> Option<String> {
        let parts: Vec<&str> = [self.label(), self.sub_label(), self.description()]
            .into_iter()
            .flatten()
            .collect();

        (!parts.is_empty()).then(|| parts.join(" | "))
    }
}

/// A condition that makes a [`Measurement`] less trustworthy than it appears.
#[derive(Clone, Copy, Debug, derive_more::Display, PartialEq)]
#[non_exhaustive]
pub enum Warning {
    /// So few samples were taken that the summary statistics say little.
    #[display("only {count} samples were taken, the statistics may be unreliable")]
    FewSamples {
        /// The number of samples taken.
        count: usize,
    },

    /// The samples are widely spread, which suggests interference from the environment.
    #[display(
        "the interquartile range is {:.1}% of the median, this suggests significant environmental influence",
        relative_iqr * 100.0
    )]
    HighVariance {
        /// The interquartile range as a fraction of the median.
        relative_iqr: f64,
    },
}

/// The result of timing a unit of work: a set of samples plus the statistics derived from them.
///
/// Each sample is the duration of one block of `number_per_run` iterations. All statistics
/// exposed by this type are per iteration, i.e. sample durations divided by `number_per_run`.
///
/// A measurement always has at least one sample and never changes after construction, except
/// for the informational cache speedup that the timer attaches to it.
///
/// # Examples
///
/// ```
/// use std::num::NonZero;
/// use std::time::Duration;
///
/// use autorange::{Measurement, Metadata};
///
/// let measurement = Measurement::new(
///     NonZero::new(10).unwrap(),
///     vec![Duration::from_micros(100), Duration::from_micros(110), Duration::from_micros(90)],
///     NonZero::new(1).unwrap(),
///     Metadata::new().with_label("example"),
/// )
/// .unwrap();
///
/// // Each sample covers 10 iterations, so the median iteration takes about 10 µs.
/// let median = measurement.median();
/// assert!(median > Duration::from_micros(9) && median < Duration::from_micros(11));
///
/// println!("{measurement}");
/// ```
#[derive(Clone, Debug)]
pub struct Measurement {
    number_per_run: NonZero<u64>,
    raw_times: Vec<Duration>,
    num_threads: NonZero<usize>,
    metadata: Metadata,
    cache_speedup: Option<f64>,

    // Per-iteration seconds, ascending.
    sorted_times: Vec<f64>,
    median: f64,
    mean: f64,
    p25: f64,
    p75: f64,
}

impl Measurement {
    /// Samples with an interquartile range above this fraction of the median are flagged with
    /// [`Warning::HighVariance`].
    pub const IQR_WARN_THRESHOLD: f64 = 0.1;

    /// Measurements with fewer samples than this are flagged with [`Warning::FewSamples`].
    pub const MIN_RELIABLE_SAMPLES: usize = 4;

    /// Creates a measurement from the durations of blocks of `number_per_run` iterations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `raw_times` is empty.
    pub fn new(
        number_per_run: NonZero<u64>,
        raw_times: Vec<Duration>,
        num_threads: NonZero<usize>,
        metadata: Metadata,
    ) -> Result<Self> {
        if raw_times.is_empty() {
            return Err(Error::InvalidInput {
                problem: "a measurement requires at least one sample".to_string(),
            });
        }

        #[expect(
            clippy::cast_precision_loss,
            reason = "block sizes are powers of ten far below the precision limit that matters here"
        )]
        let divisor = number_per_run.get() as f64;

        let mut sorted_times: Vec<f64> = raw_times
            .iter()
            .map(|time| time.as_secs_f64() / divisor)
            .collect();
        sorted_times.sort_unstable_by(f64::total_cmp);

        #[expect(
            clippy::cast_precision_loss,
            reason = "sample counts are far below the precision limit of f64"
        )]
        let mean = sorted_times.iter().sum::<f64>() / sorted_times.len() as f64;

        Ok(Self {
            median: quantile_of_sorted(&sorted_times, 0.5),
            p25: quantile_of_sorted(&sorted_times, 0.25),
            p75: quantile_of_sorted(&sorted_times, 0.75),
            mean,
            sorted_times,
            number_per_run,
            raw_times,
            num_threads,
            metadata,
            cache_speedup: None,
        })
    }

    /// How many iterations of the work each sample contains.
    #[must_use]
    pub fn number_per_run(&self) -> NonZero<u64> {
        self.number_per_run
    }

    /// The thread count the samples were taken under.
    #[must_use]
    pub fn num_threads(&self) -> NonZero<usize> {
        self.num_threads
    }

    /// The labels attached to the measurement.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The raw sample durations (one per block of [`number_per_run()`][Self::number_per_run]
    /// iterations) in the order they were taken.
    #[must_use]
    pub fn raw_times(&self) -> &[Duration] {
        &self.raw_times
    }

    /// The per-iteration duration of every sample, in the order the samples were taken.
    #[must_use]
    pub fn times(&self) -> Vec<Duration> {
        let number = u32::try_from(self.number_per_run.get());

        self.raw_times
            .iter()
            .map(|time| match number {
                Ok(number) => *time / number,
                Err(_) => Duration::from_secs_f64(per_iteration_secs(*time, self.number_per_run)),
            })
            .collect()
    }

    /// The total duration of all samples.
    #[must_use]
    pub fn total_time(&self) -> Duration {
        self.raw_times.iter().sum()
    }

    /// The median per-iteration duration.
    #[must_use]
    pub fn median(&self) -> Duration {
        Duration::from_secs_f64(self.median)
    }

    /// The mean per-iteration duration.
    #[must_use]
    pub fn mean(&self) -> Duration {
        Duration::from_secs_f64(self.mean)
    }

    /// The per-iteration duration at quantile `q` (clamped to `0.0..=1.0`), interpolating
    /// linearly between the closest samples.
    #[must_use]
    pub fn quantile(&self, q: f64) -> Duration {
        Duration::from_secs_f64(quantile_of_sorted(&self.sorted_times, q))
    }

    /// The interquartile range of the per-iteration durations.
    #[must_use]
    pub fn iqr(&self) -> Duration {
        Duration::from_secs_f64(self.iqr_secs())
    }

    /// Whether the spread of the samples is small enough to trust the median.
    ///
    /// This is the case when the interquartile range is less than `threshold` times the median.
    /// If the median is zero, the samples are only trusted if they are all zero.
    #[must_use]
    pub fn meets_confidence(&self, threshold: f64) -> bool {
        match self.relative_iqr() {
            Some(relative_iqr) => relative_iqr < threshold,
            None => self.iqr_secs() <= 0.0,
        }
    }

    /// A rough estimate of how many significant figures of the median are meaningful, between
    /// 1 and 4.
    ///
    /// This is derived from the spread of the samples between the first and third quartile and
    /// is by no means statistically rigorous.
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "sample counts fit in f64 exactly and the result is clamped to 1..=4"
    )]
    pub fn significant_figures(&self) -> u32 {
        let count = self.sorted_times.len();
        let lower = count / 4;
        let upper = count.saturating_mul(3).div_ceil(4);

        let interquartile = self
            .sorted_times
            .get(lower..upper)
            .filter(|points| !points.is_empty())
            .unwrap_or(&self.sorted_times);

        let point_count = interquartile.len() as f64;

        let mean = interquartile.iter().sum::<f64>() / point_count;
        let variance = interquartile
            .iter()
            .map(|point| (point - mean).powi(2))
            .sum::<f64>()
            / point_count;

        let confidence_interval = (CONFIDENCE_Z * variance.sqrt() / point_count.sqrt())
            .max(MIN_CONFIDENCE_INTERVAL_SECS);

        (self.median / confidence_interval)
            .log10()
            .floor()
            .clamp(1.0, MAX_SIGNIFICANT_FIGURES) as u32
    }

    /// Conditions that make this measurement less trustworthy than it appears.
    #[must_use]
    pub fn warnings(&self) -> Vec<Warning> {
        let mut warnings = Vec::new();

        if self.raw_times.len() < Self::MIN_RELIABLE_SAMPLES {
            warnings.push(Warning::FewSamples {
                count: self.raw_times.len(),
            });
        }

        if let Some(relative_iqr) = self.relative_iqr() {
            if relative_iqr > Self::IQR_WARN_THRESHOLD {
                warnings.push(Warning::HighVariance { relative_iqr });
            }
        }

        warnings
    }

    /// Whether [`warnings()`][Self::warnings] is non-empty.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings().is_empty()
    }

    /// How much slower a single cold-cache execution was than the mean warm execution, if this
    /// was measured.
    #[must_use]
    pub fn cache_speedup(&self) -> Option<f64> {
        self.cache_speedup
    }

    /// Attaches the cache speedup measured while estimating the block size.
    pub fn set_cache_speedup(&mut self, cache_speedup: f64) {
        self.cache_speedup = Some(cache_speedup);
    }

    fn iqr_secs(&self) -> f64 {
        (self.p75 - self.p25).max(0.0)
    }

    fn relative_iqr(&self) -> Option<f64> {
        (self.median > 0.0).then(|| self.iqr_secs() / self.median)
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(title) = self.metadata.title() {
            writeln!(f, "{title}")?;
        }

        if let Some(stmt) = self.metadata.stmt() {
            writeln!(f, "  {stmt}")?;
        }

        if let Some(env) = self.metadata.env() {
            writeln!(f, "  env: {env}")?;
        }

        writeln!(f, "  Median: {:.3?}", self.median())?;
        writeln!(
            f,
            "  IQR:    {:.3?} ({:.3?} to {:.3?})",
            self.iqr(),
            self.quantile(0.25),
            self.quantile(0.75)
        )?;
        writeln!(
            f,
            "  {} samples x {} iterations, {} threads",
            self.raw_times.len(),
            self.number_per_run,
            self.num_threads
        )?;

        if let Some(cache_speedup) = self.cache_speedup {
            writeln!(f, "  Cache speedup: {cache_speedup:.2}x")?;
        }

        for warning in self.warnings() {
            writeln!(f, "  WARNING: {warning}")?;
        }

        Ok(())
    }
}

#[expect(
    clippy::cast_precision_loss,
    reason = "block sizes are powers of ten far below the precision limit that matters here"
)]
fn per_iteration_secs(time: Duration, number: NonZero<u64>) -> f64 {
    time.as_secs_f64() / number.get() as f64
}

/// Quantile of ascending `sorted` values with linear interpolation between closest ranks.
fn quantile_of_sorted(sorted: &[f64], q: f64) -> f64 {
    let Some(last_index) = sorted.len().checked_sub(1) else {
        return 0.0;
    };

    #[expect(
        clippy::cast_precision_loss,
        reason = "sample counts are far below the precision limit of f64"
    )]
    let position = q.clamp(0.0, 1.0) * last_index as f64;

    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "position is within 0..=last_index"
    )]
    let lower_index = position.floor() as usize;
    let fraction = position - position.floor();

    let lower = sorted.get(lower_index).copied().unwrap_or_default();
    let upper = sorted
        .get(lower_index.saturating_add(1))
        .copied()
        .unwrap_or(lower);

    lower + (upper - lower) * fraction
}
