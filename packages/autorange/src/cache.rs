use std::hint::black_box;
use std::time::Duration;

use crate::TimedWork;

const CACHE_LINE_BYTES: usize = 64;

/// Best-effort eviction of processor caches, used to measure how the timed work behaves when it
/// starts with cold caches.
///
/// Eviction works by touching a buffer large enough to displace typical L2/L3 contents. The size
/// does not need to match any particular processor exactly; the default is large enough to
/// expose cache effects on many architectures.
///
/// # Examples
///
/// ```
/// use autorange::CacheEviction;
///
/// let eviction = CacheEviction::new(8 * 1024 * 1024);
/// eviction.evict();
///
/// assert!(!CacheEviction::disabled().is_enabled());
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CacheEviction {
    size_bytes: usize,
}

impl CacheEviction {
    /// The default size of the eviction buffer (3 MiB).
    pub const DEFAULT_SIZE_BYTES: usize = 3 * 1024 * 1024;

    /// Creates an eviction strategy that touches a buffer of `size_bytes` bytes.
    #[must_use]
    pub const fn new(size_bytes: usize) -> Self {
        Self { size_bytes }
    }

    /// Creates an eviction strategy that does nothing.
    ///
    /// The cold-cache measurement is still taken but will typically show no measurable effect.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { size_bytes: 0 }
    }

    /// The size of the buffer touched on every eviction.
    #[must_use]
    pub const fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Whether eviction touches any memory at all.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.size_bytes != 0
    }

    /// Touches every cache line of a freshly allocated buffer, displacing whatever the caches
    /// held before.
    #[cfg_attr(test, mutants::skip)] // The effect on processor caches cannot be observed in tests.
    pub fn evict(&self) {
        if !self.is_enabled() {
            return;
        }

        let mut buffer = vec![0_u8; self.size_bytes];

        for line in buffer.chunks_mut(CACHE_LINE_BYTES) {
            if let Some(first) = line.first_mut() {
                *first = black_box(1);
            }
        }

        black_box(
            buffer
                .iter()
                .step_by(CACHE_LINE_BYTES)
                .fold(0_u8, |acc, byte| acc.wrapping_add(*byte)),
        );
    }
}

impl Default for CacheEviction {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SIZE_BYTES)
    }
}

/// Measures a single execution of the work right after evicting the caches.
///
/// A cheap throwaway operation runs between eviction and measurement so that one-time costs
/// of getting back into "doing work" are not attributed to the timed work.
pub(crate) fn measure_uncached_runtime<W>(work: &mut W, eviction: &CacheEviction) -> Duration
where
    W: TimedWork + ?Sized,
{
    eviction.evict();
    populate();

    work.time(1)
}

#[cfg_attr(test, mutants::skip)] // Nothing observable happens here.
fn populate() {
    black_box((0..2_u64).sum::<u64>());
    black_box(black_box(1.1_f64).tanh());
}

/// Ratio between the duration of one cold-cache execution and the mean duration of one
/// warm-cache execution in a block of `number` executions.
///
/// Zero if the block took no measurable time.
#[expect(
    clippy::cast_precision_loss,
    reason = "block sizes are powers of ten far below the precision limit that matters here"
)]
pub(crate) fn cache_speedup(uncached: Duration, block_time: Duration, number: u64) -> f64 {
    if block_time.is_zero() {
        return 0.0;
    }

    let per_iteration = block_time.as_secs_f64() / number as f64;
    uncached.as_secs_f64() / per_iteration
}
