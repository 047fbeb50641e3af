//! Scripted timed work for tests.

use std::time::Duration;

use crate::TimedWork;

/// Timed work whose trial durations are computed from the requested iteration count instead of
/// being measured.
#[derive(derive_more::Debug)]
pub(crate) struct FakeWork {
    #[debug(ignore)]
    timing: Box<dyn FnMut(u64) -> Duration + Send>,

    calls: Vec<u64>,
}

impl FakeWork {
    pub(crate) fn new(timing: impl FnMut(u64) -> Duration + Send + 'static) -> Self {
        Self {
            timing: Box::new(timing),
            calls: Vec::new(),
        }
    }

    /// Every trial takes `cost` per iteration and has no fixed overhead.
    pub(crate) fn per_iteration(cost: Duration) -> Self {
        Self::with_overhead(Duration::ZERO, cost)
    }

    /// Every trial takes `overhead` plus `cost` per iteration.
    pub(crate) fn with_overhead(overhead: Duration, cost: Duration) -> Self {
        Self::new(move |iterations| overhead + scale(cost, iterations))
    }

    /// Iteration counts of every trial executed so far, in order.
    pub(crate) fn calls(&self) -> Vec<u64> {
        self.calls.clone()
    }
}

impl TimedWork for FakeWork {
    fn time(&mut self, iterations: u64) -> Duration {
        self.calls.push(iterations);
        (self.timing)(iterations)
    }
}

pub(crate) fn scale(cost: Duration, iterations: u64) -> Duration {
    let nanos = cost.as_nanos().saturating_mul(u128::from(iterations));
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn records_calls_in_order() {
        let mut work = FakeWork::per_iteration(Duration::from_micros(1));

        work.time(0);
        work.time(10);
        work.time(1);

        assert_eq!(work.calls(), vec![0, 10, 1]);
    }

    #[test]
    fn overhead_is_added_once_per_trial() {
        let mut work = FakeWork::with_overhead(Duration::from_nanos(100), Duration::from_micros(1));

        assert_eq!(work.time(0), Duration::from_nanos(100));
        assert_eq!(work.time(3), Duration::from_nanos(3_100));
    }
}
