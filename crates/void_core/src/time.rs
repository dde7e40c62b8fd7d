//! Commit timestamps and clocks
//!
//! A [`Timestamp`] is a point on a [`Clock`]'s timeline, measured from the
//! clock's origin. Client compositors stamp every batch with `clock.now()`
//! at commit time, and server resources use that stamp as the time origin
//! of any animation the batch started. Both sides must share one clock.

use core::fmt;
use core::ops::{Add, Sub};
use core::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A point in time relative to a clock origin
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(Duration);

impl Timestamp {
    /// The clock origin
    pub const ZERO: Self = Self(Duration::ZERO);

    /// Create from a duration since the origin
    #[inline]
    pub const fn from_duration(since_origin: Duration) -> Self {
        Self(since_origin)
    }

    /// Create from milliseconds since the origin
    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }

    /// Create from fractional seconds since the origin
    pub fn from_secs_f64(secs: f64) -> Self {
        Self(Duration::from_secs_f64(secs.max(0.0)))
    }

    /// Duration since the clock origin
    #[inline]
    pub const fn as_duration(&self) -> Duration {
        self.0
    }

    /// Time elapsed between `earlier` and `self`, zero if `earlier` is later
    #[inline]
    pub fn saturating_since(&self, earlier: Timestamp) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl Sub<Timestamp> for Timestamp {
    type Output = Duration;

    fn sub(self, rhs: Timestamp) -> Self::Output {
        self.saturating_since(rhs)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({:?})", self.0)
    }
}

/// Source of commit and render timestamps
pub trait Clock: Send + Sync {
    /// The current time
    fn now(&self) -> Timestamp;
}

/// Wall clock backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose origin is the moment of construction
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.origin.elapsed())
    }
}

/// A clock that only moves when told to
///
/// Used by tests and by hosts that drive composition from an external
/// timeline (offline rendering, frame stepping).
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    /// Create a clock at the origin
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current time
    pub fn set(&self, time: Timestamp) {
        self.nanos
            .store(time.as_duration().as_nanos() as u64, Ordering::SeqCst);
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(Duration::from_nanos(self.nanos.load(Ordering::SeqCst)))
    }
}
