use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when timing a unit of work.
///
/// Panics raised by the timed work itself are not captured here. They propagate to the caller
/// unchanged, after any thread count setting applied by the timer has been restored.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller provided a value that cannot be used to take a measurement.
    #[error("invalid input: {problem}")]
    InvalidInput {
        /// A human-readable description of the problem.
        problem: String,
    },

    /// The caller used a timing strategy that is permanently disabled because its results
    /// cannot be trusted.
    #[error("`{operation}` is not supported, use `{replacement}` instead")]
    UnsupportedOperation {
        /// The name of the disabled strategy.
        operation: &'static str,

        /// The name of the strategy to use instead.
        replacement: &'static str,
    },

    /// The block size estimate kept growing without the samples ever becoming long enough
    /// to measure. This typically means the timed work (or the clock behind it) reports
    /// zero duration regardless of how many repetitions are executed.
    #[error(
        "block size estimate did not settle after {steps} steps (last sample took {last_time:?}), \
         the timed work does not appear to take measurable time"
    )]
    MeasurementDegenerate {
        /// How many block sizes were tried before giving up.
        steps: u32,

        /// The duration of the last sample taken while estimating.
        last_time: Duration,
    },
}

/// A specialized `Result` type for timing operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;
