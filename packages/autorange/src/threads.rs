use std::fmt::Debug;
use std::num::NonZero;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use tracing::trace;

/// Controls how many worker threads the compute runtime used by the timed work may use.
///
/// The timer applies the thread count configured on the [`Timer`][crate::Timer] before taking
/// samples and restores the previous value afterwards, so that every sample is taken under the
/// same concurrency configuration. Implement this trait to connect the timer to whatever runtime
/// your timed work uses (a custom thread pool, a math library with its own threading, ...).
///
/// The default implementation is [`ProcessThreads`].
#[cfg_attr(test, mockall::automock)]
pub trait ThreadControl: Debug + Send {
    /// Returns the explicitly configured thread count, or `None` if the runtime uses its own
    /// default.
    fn thread_count(&self) -> Option<NonZero<usize>>;

    /// Replaces the configured thread count. `None` returns the runtime to its own default.
    fn set_thread_count(&self, count: Option<NonZero<usize>>);
}

// Zero means "never set", in which case the available parallelism is reported.
static COMPUTE_THREADS: AtomicUsize = AtomicUsize::new(0);

/// Returns the process-wide compute thread count managed by [`ProcessThreads`].
///
/// Timed work that can parallelize internally should size its parallelism according to this
/// value, which the timer sets for the duration of each timing loop. If no value has ever been
/// set, this is the available parallelism of the system.
///
/// # Examples
///
/// ```
/// use std::num::NonZero;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use autorange::{Timer, Work, compute_threads};
///
/// let observed = Arc::new(AtomicUsize::new(0));
///
/// let work = Work::new({
///     let observed = Arc::clone(&observed);
///     // A real workload would spread itself over this many threads.
///     move || observed.store(compute_threads().get(), Ordering::Relaxed)
/// });
///
/// let mut timer = Timer::builder(work)
///     .num_threads(NonZero::new(2).unwrap())
///     .build();
///
/// timer.timeit(10).unwrap();
///
/// assert_eq!(observed.load(Ordering::Relaxed), 2);
/// ```
#[must_use]
pub fn compute_threads() -> NonZero<usize> {
    NonZero::new(COMPUTE_THREADS.load(Ordering::Relaxed)).unwrap_or_else(available_parallelism)
}

fn available_parallelism() -> NonZero<usize> {
    thread::available_parallelism().unwrap_or(NonZero::<usize>::MIN)
}

/// The default [`ThreadControl`], which manages the process-wide value returned by
/// [`compute_threads()`].
///
/// While no thread count is configured, [`compute_threads()`] reports the available
/// parallelism of the system. The timer returns to that state after sampling if it found it
/// there.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessThreads;

impl ThreadControl for ProcessThreads {
    fn thread_count(&self) -> Option<NonZero<usize>> {
        NonZero::new(COMPUTE_THREADS.load(Ordering::Relaxed))
    }

    fn set_thread_count(&self, count: Option<NonZero<usize>>) {
        COMPUTE_THREADS.store(count.map_or(0, NonZero::get), Ordering::Relaxed);
    }
}

/// Applies a thread count for the duration of a closure.
///
/// The previous thread count (including "not configured") is captured on entry and restored on
/// every exit path, including when the closure panics.
#[derive(Debug)]
pub(crate) struct ThreadScope<'a> {
    control: &'a dyn ThreadControl,
    count: NonZero<usize>,
}

impl<'a> ThreadScope<'a> {
    pub(crate) fn new(control: &'a dyn ThreadControl, count: NonZero<usize>) -> Self {
        Self { control, count }
    }

    pub(crate) fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        let previous = self.control.thread_count();

        trace!(count = self.count, ?previous, "applying thread count");
        self.control.set_thread_count(Some(self.count));

        let _restore = scopeguard::guard(previous, |previous| {
            trace!(?previous, "restoring thread count");
            self.control.set_thread_count(previous);
        });

        f()
    }
}

/// Thread control that remembers every value it was given.
///
/// Clones share the same state, so a test can keep one clone to inspect after handing another
/// to the code under test.
#[cfg(test)]
#[derive(Clone, Debug)]
pub(crate) struct FakeThreads {
    state: std::sync::Arc<std::sync::Mutex<FakeThreadsState>>,
}

// `None` is reported as zero by the accessors.
#[cfg(test)]
#[derive(Debug)]
struct FakeThreadsState {
    current: Option<NonZero<usize>>,
    history: Vec<Option<NonZero<usize>>>,
}

#[cfg(test)]
impl FakeThreads {
    /// Zero starts out with no thread count configured.
    pub(crate) fn new(initial: usize) -> Self {
        Self {
            state: std::sync::Arc::new(std::sync::Mutex::new(FakeThreadsState {
                current: NonZero::new(initial),
                history: Vec::new(),
            })),
        }
    }

    pub(crate) fn current(&self) -> usize {
        self.lock().current.map_or(0, NonZero::get)
    }

    /// Every value passed to `set_thread_count()`, in order.
    pub(crate) fn history(&self) -> Vec<usize> {
        self.lock()
            .history
            .iter()
            .map(|count| count.map_or(0, NonZero::get))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeThreadsState> {
        self.state
            .lock()
            .expect("FakeThreads state lock should not be poisoned")
    }
}

#[cfg(test)]
impl ThreadControl for FakeThreads {
    fn thread_count(&self) -> Option<NonZero<usize>> {
        self.lock().current
    }

    fn set_thread_count(&self, count: Option<NonZero<usize>>) {
        let mut state = self.lock();
        state.current = count;
        state.history.push(count);
    }
}
