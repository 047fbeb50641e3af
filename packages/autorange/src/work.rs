use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use crate::{Clock, MonotonicClock};

/// A unit of work that can be executed a requested number of times as one timed trial.
///
/// This is the seam between the timing strategies of [`Timer`][crate::Timer] and whatever
/// actually executes the work. Most users will use [`Work`], which executes a closure, but any
/// type that can run a trial and report its duration can be timed.
///
/// # Contract
///
/// * Every call is an independent trial. A trial must not leave behind state that changes the
///   outcome of later trials (beyond unavoidable effects like warm caches).
/// * `iterations == 0` is a valid trial. It measures only the fixed cost of starting and
///   finishing a trial and should return a small duration.
/// * The fixed cost of a trial is assumed to be roughly constant, independent of `iterations`.
pub trait TimedWork {
    /// Executes the work `iterations` times and returns the total elapsed time.
    fn time(&mut self, iterations: u64) -> Duration;
}

impl<W> TimedWork for &mut W
where
    W: TimedWork + ?Sized,
{
    fn time(&mut self, iterations: u64) -> Duration {
        W::time(self, iterations)
    }
}

impl<W> TimedWork for Box<W>
where
    W: TimedWork + ?Sized,
{
    fn time(&mut self, iterations: u64) -> Duration {
        W::time(self, iterations)
    }
}

/// Timed work defined by a setup closure and a statement closure.
///
/// Every trial first calls the setup closure to create fresh state for the trial. The setup is
/// not timed. The clock is then read, the statement is executed the requested number of times
/// against that state and the clock is read again. The state is dropped after the second
/// reading, so its cleanup is not timed either.
///
/// Any data the work needs is owned by the work itself (either captured by the closures or
/// moved in via [`with_environment()`][Work::with_environment]), so nothing a trial does is
/// visible to the code that created the work.
///
/// # Examples
///
/// ```
/// use autorange::{TimedWork, Work};
///
/// let mut work = Work::with_setup(
///     || (0..100).collect::<Vec<u64>>(),
///     |numbers| {
///         numbers.reverse();
///     },
/// );
///
/// let elapsed = work.time(1000);
/// println!("1000 reversals took {elapsed:?}");
/// ```
#[derive(derive_more::Debug)]
pub struct Work<P, F> {
    #[debug(ignore)]
    setup: P,

    #[debug(ignore)]
    statement: F,

    clock: Arc<dyn Clock>,
}

impl Work<(), ()> {
    /// Creates timed work that executes `statement` with no per-trial state.
    ///
    /// # Examples
    ///
    /// ```
    /// use autorange::{TimedWork, Work};
    ///
    /// let mut work = Work::new(|| {
    ///     std::hint::black_box(2_u64.pow(10));
    /// });
    ///
    /// work.time(100);
    /// ```
    pub fn new<G>(mut statement: G) -> Work<impl FnMut(), impl FnMut(&mut ())>
    where
        G: FnMut(),
    {
        Work::with_setup(|| (), move |_: &mut ()| statement())
    }

    /// Creates timed work that calls `setup` before every trial and executes `statement`
    /// against the state it returns.
    pub fn with_setup<S, P, F>(setup: P, statement: F) -> Work<P, F>
    where
        P: FnMut() -> S,
        F: FnMut(&mut S),
    {
        Work {
            setup,
            statement,
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    /// Creates timed work that owns `environment` and derives the state for every trial from it.
    ///
    /// The environment is moved into the work. Callers that need to keep using their own copy
    /// should pass a clone.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::collections::HashMap;
    ///
    /// use autorange::{TimedWork, Work};
    ///
    /// let lookup: HashMap<u32, u32> = (0..1000).map(|i| (i, i * 2)).collect();
    ///
    /// let mut work = Work::with_environment(
    ///     lookup,
    ///     |lookup| lookup.clone(),
    ///     |lookup| {
    ///         std::hint::black_box(lookup.get(&500));
    ///     },
    /// );
    ///
    /// work.time(10);
    /// ```
    pub fn with_environment<E, S, P, F>(
        environment: E,
        mut setup: P,
        statement: F,
    ) -> Work<impl FnMut() -> S, F>
    where
        P: FnMut(&E) -> S,
        F: FnMut(&mut S),
    {
        Work::with_setup(move || setup(&environment), statement)
    }
}

impl<P, F> Work<P, F> {
    /// Replaces the clock used to measure trials.
    ///
    /// By default, each `Work` uses a fresh [`MonotonicClock`].
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }
}

impl<S, P, F> TimedWork for Work<P, F>
where
    P: FnMut() -> S,
    F: FnMut(&mut S),
{
    fn time(&mut self, iterations: u64) -> Duration {
        let mut state = (self.setup)();

        let start = self.clock.now();

        for _ in 0..iterations {
            (self.statement)(black_box(&mut state));
        }

        let end = self.clock.now();

        drop(black_box(state));

        end.saturating_sub(start)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::FakeClock;

    const TICK: Duration = Duration::from_millis(3);

    #[test]
    fn time_is_iterations_times_statement_cost() {
        let clock = FakeClock::new();

        let mut work = Work::new({
            let clock = clock.clone();
            move || clock.advance(TICK)
        })
        .clock(clock);

        assert_eq!(work.time(0), Duration::ZERO);
        assert_eq!(work.time(1), TICK);
        assert_eq!(work.time(10), TICK * 10);
    }

    #[test]
    fn setup_is_not_timed() {
        let clock = FakeClock::new();

        let mut work = Work::with_setup(
            {
                let clock = clock.clone();
                move || clock.advance(Duration::from_secs(5))
            },
            {
                let clock = clock.clone();
                move |_: &mut ()| clock.advance(TICK)
            },
        )
        .clock(clock);

        assert_eq!(work.time(2), TICK * 2);
    }

    #[test]
    fn setup_runs_once_per_trial() {
        let setups = Rc::new(Cell::new(0_u32));

        let mut work = Work::with_setup(
            {
                let setups = Rc::clone(&setups);
                move || setups.set(setups.get() + 1)
            },
            |_: &mut ()| {},
        );

        work.time(0);
        work.time(100);
        work.time(5);

        assert_eq!(setups.get(), 3);
    }

    #[test]
    fn trials_do_not_share_state() {
        let mut observed = Vec::new();

        {
            let mut work = Work::with_setup(
                || 0_u32,
                |counter| {
                    *counter += 1;
                    observed.push(*counter);
                },
            );

            work.time(2);
            work.time(2);
        }

        assert_eq!(observed, vec![1, 2, 1, 2]);
    }

    #[test]
    fn environment_is_owned_by_work() {
        let environment = vec![1_u32, 2, 3];

        let mut work = Work::with_environment(
            environment.clone(),
            |numbers: &Vec<u32>| numbers.clone(),
            |numbers: &mut Vec<u32>| numbers.push(4),
        );

        work.time(10);

        assert_eq!(environment, vec![1, 2, 3]);
    }

    #[test]
    fn mut_ref_and_box_delegate() {
        let clock = FakeClock::new();

        let mut work = Work::new({
            let clock = clock.clone();
            move || clock.advance(TICK)
        })
        .clock(clock);

        assert_eq!((&mut work).time(2), TICK * 2);

        let mut boxed: Box<dyn TimedWork> = Box::new(work);
        assert_eq!(boxed.time(3), TICK * 3);
    }
}
