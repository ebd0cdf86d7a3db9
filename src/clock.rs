//! Simulation clock
//!
//! Whole-second monotonic clock. The host scheduler owns wall time; this
//! crate only ever receives `TimeStep` values handed to it by the caller
//! and never reads the system clock.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};

/// Simulated time, in whole seconds since the scenario epoch.
pub type TimeStep = i64;

/// Render a `TimeStep` as a wall-clock timestamp for log/demo output, given
/// the scenario's real-world epoch. Sim time never drives control logic
/// (everything above is pure integer seconds), so this conversion lives at
/// the boundary only, the same role `backtest_v2::clock`'s
/// `nanos_to_datetime` plays for the teacher's nanosecond clock.
pub fn wall_clock(epoch: DateTime<Utc>, t: TimeStep) -> DateTime<Utc> {
    epoch + chrono::Duration::seconds(t)
}

/// Inverse of [`wall_clock`]: how many whole seconds after `epoch` a
/// wall-clock instant falls, clamped to zero if it precedes the epoch.
pub fn from_wall_clock(epoch: DateTime<Utc>, instant: DateTime<Utc>) -> TimeStep {
    (instant - epoch).num_seconds().max(0)
}

/// `1970-01-01T00:00:00Z`, the default scenario epoch when a demo scenario
/// doesn't name one explicitly.
pub fn unix_epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).single().expect("unix epoch is always representable")
}

/// Monotonic simulation clock, advanced by the host between passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimClock {
    now: TimeStep,
}

impl SimClock {
    #[inline]
    pub fn new(start: TimeStep) -> Self {
        Self { now: start }
    }

    #[inline]
    pub fn now(&self) -> TimeStep {
        self.now
    }

    /// Advance to `t`. Panics on backward movement; the host contract
    /// guarantees time is monotonic non-decreasing across passes.
    #[inline]
    pub fn advance_to(&mut self, t: TimeStep) {
        debug_assert!(t >= self.now, "SimClock: cannot go backward from {} to {}", self.now, t);
        self.now = t;
    }

    /// True if `t` lands exactly on a period boundary.
    #[inline]
    pub fn is_boundary(&self, t: TimeStep, period: TimeStep) -> bool {
        period > 0 && t % period == 0
    }

    /// Next period boundary at or after `self.now`.
    #[inline]
    pub fn next_boundary(&self, period: TimeStep) -> TimeStep {
        if period <= 0 {
            return self.now;
        }
        let rem = self.now % period;
        if rem == 0 {
            self.now
        } else {
            self.now + (period - rem)
        }
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Display for SimClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={}s", self.now)
    }
}

/// The three scheduling passes the host invokes per time-step (§5).
/// `AuctionEngine::clear` corresponds to `PreTopDown`; `Controller::bid`
/// corresponds to `BottomUp`; latency-ring pop and statistics refresh
/// correspond to `PostTopDown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PreTopDown,
    BottomUp,
    PostTopDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_detection() {
        let clock = SimClock::new(600);
        assert!(clock.is_boundary(600, 300));
        assert!(!clock.is_boundary(650, 300));
    }

    #[test]
    fn next_boundary_rounds_up() {
        let clock = SimClock::new(100);
        assert_eq!(clock.next_boundary(300), 300);
        let clock = SimClock::new(300);
        assert_eq!(clock.next_boundary(300), 300);
    }

    #[test]
    fn wall_clock_round_trips_through_from_wall_clock() {
        let epoch = unix_epoch();
        let instant = wall_clock(epoch, 3_600);
        assert_eq!(instant.timestamp(), 3_600);
        assert_eq!(from_wall_clock(epoch, instant), 3_600);
    }

    #[test]
    fn from_wall_clock_clamps_before_epoch_to_zero() {
        let epoch = unix_epoch();
        let earlier = wall_clock(epoch, -10);
        assert_eq!(from_wall_clock(epoch, earlier), 0);
    }

    #[test]
    #[should_panic(expected = "cannot go backward")]
    fn advance_backward_panics() {
        let mut clock = SimClock::new(600);
        clock.advance_to(300);
    }
}
