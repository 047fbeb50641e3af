use std::num::NonZero;
use std::time::Duration;

use tracing::{debug, trace};

use crate::threads::ThreadScope;

/// Wall clock bounds of one sampling loop, measured as the sum of sample durations.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct LoopLimits {
    /// Sampling continues at least until this much time has been sampled, regardless of what
    /// the stop hook says.
    pub(crate) min_run_time: Duration,

    /// Sampling ends as soon as more than this much time has been sampled, even if neither the
    /// minimum run time nor the stop hook is satisfied.
    pub(crate) max_run_time: Option<Duration>,
}

/// Takes samples of `number` iterations each until the limits and the stop hook allow stopping.
///
/// For every sample, in order: the sample is recorded, `callback` is invoked with it, the stop
/// hook is evaluated over all samples so far and finally the maximum run time is checked. The
/// whole loop runs inside `scope`.
pub(crate) fn measurement_loop(
    scope: &ThreadScope<'_>,
    number: NonZero<u64>,
    limits: LoopLimits,
    mut time_hook: impl FnMut() -> Duration,
    mut stop_hook: impl FnMut(&[Duration]) -> bool,
    callback: &mut dyn FnMut(u64, Duration),
) -> Vec<Duration> {
    scope.run(|| {
        let mut total_time = Duration::ZERO;
        let mut can_stop = false;
        let mut times = Vec::new();

        while total_time < limits.min_run_time || !can_stop {
            let time_spent = time_hook();

            times.push(time_spent);
            total_time = total_time.saturating_add(time_spent);

            trace!(number, ?time_spent, ?total_time, "sample taken");

            callback(number.get(), time_spent);
            can_stop = stop_hook(&times);

            if let Some(max_run_time) = limits.max_run_time {
                if total_time > max_run_time {
                    debug!(
                        ?max_run_time,
                        ?total_time,
                        samples = times.len(),
                        can_stop,
                        "maximum run time exceeded, sampling stopped early"
                    );
                    break;
                }
            }
        }

        times
    })
}
