use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A monotonic time source used to measure how long timed work takes.
///
/// Readings are expressed as the time elapsed since an arbitrary origin chosen by the clock.
/// Only the difference between two readings of the same clock is meaningful. Implementations
/// must never go backwards and must not follow wall clock adjustments.
///
/// The clock is chosen once, when the timed work is constructed, and is used for every sample
/// taken from that work. To time work that completes asynchronously on some other device, use
/// [`MonotonicClock::with_synchronize()`] to wait for outstanding work before each reading.
pub trait Clock: Debug + Send + Sync {
    /// Returns the current reading of the clock.
    fn now(&self) -> Duration;
}

/// The default [`Clock`], backed by [`std::time::Instant`].
///
/// # Examples
///
/// ```
/// use autorange::{Clock, MonotonicClock};
///
/// let clock = MonotonicClock::new();
///
/// let start = clock.now();
/// std::hint::black_box((0..1000).sum::<u64>());
/// let elapsed = clock.now().saturating_sub(start);
///
/// println!("Took {elapsed:?}");
/// ```
#[derive(Clone, derive_more::Debug)]
pub struct MonotonicClock {
    origin: Instant,

    #[debug(ignore)]
    synchronize: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl MonotonicClock {
    /// Creates a clock whose origin is the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            synchronize: None,
        }
    }

    /// Creates a clock that calls `synchronize` before every reading.
    ///
    /// This is meant for work that is merely queued by the calling thread and executed
    /// elsewhere (e.g. on an accelerator). The callback must block until all queued work has
    /// completed, so that each reading includes the cost of that work.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    ///
    /// use autorange::{Clock, MonotonicClock};
    ///
    /// static SYNC_CALLS: AtomicUsize = AtomicUsize::new(0);
    ///
    /// let clock = MonotonicClock::with_synchronize(|| {
    ///     SYNC_CALLS.fetch_add(1, Ordering::Relaxed);
    /// });
    ///
    /// clock.now();
    /// assert_eq!(SYNC_CALLS.load(Ordering::Relaxed), 1);
    /// ```
    #[must_use]
    pub fn with_synchronize(synchronize: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            origin: Instant::now(),
            synchronize: Some(Arc::new(synchronize)),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        if let Some(synchronize) = &self.synchronize {
            synchronize();
        }

        self.origin.elapsed()
    }
}

impl<C> Clock for Arc<C>
where
    C: Clock + ?Sized,
{
    fn now(&self) -> Duration {
        C::now(self)
    }
}

/// Clock whose readings only change when a test advances it.
///
/// Clones share the same reading, so a test can hand one clone to the code under test and
/// advance another clone from inside the timed work.
#[cfg(test)]
#[derive(Clone, Debug, Default)]
pub(crate) struct FakeClock {
    reading: Arc<std::sync::Mutex<Duration>>,
}

#[cfg(test)]
impl FakeClock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn advance(&self, by: Duration) {
        let mut reading = self
            .reading
            .lock()
            .expect("FakeClock state lock should not be poisoned");

        *reading = reading
            .checked_add(by)
            .expect("test clock advanced past the maximum Duration");
    }
}

#[cfg(test)]
impl Clock for FakeClock {
    fn now(&self) -> Duration {
        *self
            .reading
            .lock()
            .expect("FakeClock state lock should not be poisoned")
    }
}
