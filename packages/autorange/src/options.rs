use std::time::Duration;

use crate::{Error, Result};

/// Configures [`Timer::adaptive_autorange()`][crate::Timer::adaptive_autorange].
///
/// Sampling continues until at least `min_run_time` has been sampled and the samples meet the
/// confidence `threshold`, or until more than `max_run_time` has been sampled.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use autorange::AdaptiveOptions;
///
/// let options = AdaptiveOptions::new()
///     .with_threshold(0.05)
///     .with_max_run_time(Duration::from_secs(2));
///
/// assert_eq!(options.min_run_time(), AdaptiveOptions::DEFAULT_MIN_RUN_TIME);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdaptiveOptions {
    threshold: f64,
    min_run_time: Duration,
    max_run_time: Option<Duration>,
}

impl AdaptiveOptions {
    /// The default maximum ratio between the interquartile range and the median.
    pub const DEFAULT_THRESHOLD: f64 = 0.1;

    /// The default minimum total duration of all samples.
    pub const DEFAULT_MIN_RUN_TIME: Duration = Duration::from_millis(10);

    /// The default maximum total duration of all samples.
    pub const DEFAULT_MAX_RUN_TIME: Duration = Duration::from_secs(10);

    /// The minimum run time used when estimating the block size, independent of the
    /// configured `min_run_time`.
    pub const CALIBRATION_RUN_TIME: Duration = Duration::from_millis(50);

    /// Creates options with all defaults applied.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
            min_run_time: Self::DEFAULT_MIN_RUN_TIME,
            max_run_time: Some(Self::DEFAULT_MAX_RUN_TIME),
        }
    }

    /// Sets the maximum ratio between the interquartile range and the median of the samples
    /// for the measurement to be considered stable.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the minimum total duration of all samples.
    #[must_use]
    pub const fn with_min_run_time(mut self, min_run_time: Duration) -> Self {
        self.min_run_time = min_run_time;
        self
    }

    /// Sets the maximum total duration of all samples.
    ///
    /// Sampling stops after the first sample that takes the total over this limit, even if the
    /// measurement is not yet stable. A zero limit is a real limit, not "unlimited": sampling
    /// stops after a single sample. Use [`without_max_run_time()`][Self::without_max_run_time]
    /// to remove the limit.
    #[must_use]
    pub const fn with_max_run_time(mut self, max_run_time: Duration) -> Self {
        self.max_run_time = Some(max_run_time);
        self
    }

    /// Removes the limit on the total duration of all samples.
    ///
    /// Sampling then only ends once the measurement is stable, which may never happen on a
    /// noisy system.
    #[must_use]
    pub const fn without_max_run_time(mut self) -> Self {
        self.max_run_time = None;
        self
    }

    /// The confidence threshold.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// The minimum total duration of all samples.
    #[must_use]
    pub const fn min_run_time(&self) -> Duration {
        self.min_run_time
    }

    /// The maximum total duration of all samples, if limited.
    #[must_use]
    pub const fn max_run_time(&self) -> Option<Duration> {
        self.max_run_time
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(Error::InvalidInput {
                problem: format!(
                    "confidence threshold must be a positive finite number, got {}",
                    self.threshold
                ),
            });
        }

        Ok(())
    }
}

impl Default for AdaptiveOptions {
    fn default() -> Self {
        Self::new()
    }
}
