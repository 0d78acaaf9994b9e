//! Time management utilities

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock source.
///
/// The update loop never uses wall time to drive logic; it is only sampled to
/// detect a scheduler that fell behind and to age timestamps read from the
/// parameter store.
pub trait Clock {
    /// Time elapsed since the Unix epoch
    fn now(&self) -> Duration;
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
    }
}

/// Manually advanced clock, shared between clones
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    /// Create a clock reading `start`
    pub fn new(start: Duration) -> Self {
        Self { now: Rc::new(Cell::new(start)) }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    /// Set the clock to an absolute reading
    pub fn set(&self, to: Duration) {
        self.now.set(to);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

/// Logical tick counter for the fixed-rate update loop.
///
/// Every call to [`TickTimer::advance`] is exactly one logical tick, whatever
/// the wall-clock gap was. Gaps longer than the lateness threshold are
/// counted and reported, never compensated for.
#[derive(Debug, Clone)]
pub struct TickTimer {
    frame: u64,
    last_tick: Option<Duration>,
    last_gap: Duration,
    late_threshold: Duration,
    late_ticks: u64,
}

impl TickTimer {
    /// Create a timer that flags gaps longer than `late_threshold`
    pub fn new(late_threshold: Duration) -> Self {
        Self {
            frame: 0,
            last_tick: None,
            last_gap: Duration::ZERO,
            late_threshold,
            late_ticks: 0,
        }
    }

    /// Advance one logical tick at wall time `now`.
    ///
    /// Returns `true` when the gap since the previous tick exceeded the threshold.
    pub fn advance(&mut self, now: Duration) -> bool {
        self.frame += 1;
        let late = match self.last_tick {
            Some(previous) => {
                self.last_gap = now.saturating_sub(previous);
                self.last_gap > self.late_threshold
            }
            None => false,
        };
        self.last_tick = Some(now);
        if late {
            self.late_ticks += 1;
        }
        late
    }

    /// Logical ticks since start
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Wall-clock gap measured at the last tick
    pub fn last_gap(&self) -> Duration {
        self.last_gap
    }

    /// Number of ticks that arrived late
    pub fn late_ticks(&self) -> u64 {
        self.late_ticks
    }
}
