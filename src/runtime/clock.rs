//! Monotonic time source for timers and the idle strategy of the run loop.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// A monotonic clock.
///
/// The run loop never calls `Instant::now()` or `thread::sleep` directly; it
/// goes through a `Clock` so that tests can drive time by hand.
pub trait Clock {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Block the loop thread for `duration`.
    fn sleep(
        &self,
        duration: Duration,
    );
}

/// Wall clock backed by [`Instant::now`] and [`std::thread::sleep`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(
        &self,
        duration: Duration,
    ) {
        std::thread::sleep(duration);
    }
}

/// A virtual clock that only moves when told to.
///
/// `sleep` advances the clock instead of blocking, so a drain loop waiting on
/// a timer completes instantly. Clones share the same time.
#[derive(Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Rc<Cell<Duration>>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    /// Move time forward.
    pub fn advance(
        &self,
        by: Duration,
    ) {
        self.offset.set(self.offset.get() + by);
    }

    /// Time elapsed since the clock was created.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("elapsed", &self.offset.get())
            .finish()
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now(&self) -> Instant {
        self.origin + self.offset.get()
    }

    fn sleep(
        &self,
        duration: Duration,
    ) {
        self.advance(duration);
    }
}
