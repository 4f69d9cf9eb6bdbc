//! The wall-clock collaborator
//!
//! `spec.md` §1 treats the concrete clock source as external to the core
//! engine, the same way it treats the scheduler and hash function as
//! collaborators. Every tick computation in [`crate::membership::timing`]
//! goes through a `Clock` so tests can drive time deterministically instead
//! of sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of the current wall-clock time, in fractional seconds since
/// an arbitrary but fixed epoch.
///
/// Implementations must be monotonic enough that ticks derived from
/// `now()` never run backwards within one decay cadence; `SystemClock`
/// relies on `SystemTime`, which is sufficient for the minimum decay
/// cadence this crate schedules at (`spec.md` §4.4).
pub trait Clock: Send + Sync {
    /// Current time in fractional seconds
    fn now(&self) -> f64;
}

/// The real wall clock, backed by [`SystemTime`]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_secs_f64()
    }
}

/// A manually-advanced clock for deterministic tests
///
/// Starts at `0.0`; advance it explicitly with [`ManualClock::set`] or
/// [`ManualClock::advance`] instead of sleeping real time.
#[derive(Debug)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    /// Creates a manual clock starting at time `0.0`
    pub fn new() -> Self {
        Self::at(0.0)
    }

    /// Creates a manual clock starting at the given time
    pub fn at(t: f64) -> Self {
        Self {
            bits: AtomicU64::new(t.to_bits()),
        }
    }

    /// Sets the current time
    pub fn set(&self, t: f64) {
        self.bits.store(t.to_bits(), Ordering::SeqCst);
    }

    /// Advances the current time by `dt` seconds
    pub fn advance(&self, dt: f64) {
        self.set(self.now() + dt);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_starts_at_zero() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), 0.0);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new();
        clock.advance(1.5);
        clock.advance(0.5);
        assert_eq!(clock.now(), 2.0);
    }

    #[test]
    fn manual_clock_set_is_absolute() {
        let clock = ManualClock::new();
        clock.advance(10.0);
        clock.set(3.0);
        assert_eq!(clock.now(), 3.0);
    }

    #[test]
    fn system_clock_advances_with_real_time() {
        let clock = SystemClock;
        let t0 = clock.now();
        assert!(t0 > 0.0);
    }
}
