//! Millisecond clock sources.
//!
//! Clocks return a `u32` that wraps roughly every 49.7 days. Callers must
//! never compare two readings directly. Deadlines are kept as a start
//! reading plus a span and checked with [`span_elapsed`], which stays
//! correct across the wrap for any span in the `u32` range.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

/// A monotonic millisecond clock.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds, wrapping at `u32::MAX`.
    fn now_ms(&self) -> u32;
}

/// Milliseconds from `since` to `now`, correct across one wrap.
#[must_use]
pub const fn elapsed_ms(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

/// Whether `span_ms` has fully passed since `since`.
#[must_use]
pub const fn span_elapsed(now: u32, since: u32, span_ms: u32) -> bool {
    elapsed_ms(now, since) >= span_ms
}

/// Milliseconds of `span_ms` still to run after `since`, zero once it has
/// passed.
#[must_use]
pub const fn span_remaining(now: u32, since: u32, span_ms: u32) -> u32 {
    span_ms.saturating_sub(elapsed_ms(now, since))
}

/// Clock backed by [`Instant`], starting at zero when constructed.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock reading zero now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[allow(clippy::cast_possible_truncation)]
    fn now_ms(&self) -> u32 {
        // Truncation is the wrap.
        self.origin.elapsed().as_millis() as u32
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU32,
}

impl ManualClock {
    /// Create a clock reading `start`.
    #[must_use]
    pub const fn new(start: u32) -> Self {
        Self {
            now: AtomicU32::new(start),
        }
    }

    /// Jump to an absolute reading.
    pub fn set(&self, now: u32) {
        self.now.store(now, Ordering::Release);
    }

    /// Move forward by `delta_ms`, wrapping.
    pub fn advance(&self, delta_ms: u32) -> u32 {
        let previous = self
            .now
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |now| {
                Some(now.wrapping_add(delta_ms))
            })
            .unwrap_or_else(|now| now);
        previous.wrapping_add(delta_ms)
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::arithmetic_side_effects)]

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_manual_clock_advances_and_wraps() {
        let clock = ManualClock::new(u32::MAX - 1);
        assert_eq!(clock.advance(3), 1);
        assert_eq!(clock.now_ms(), 1);
        clock.set(500);
        assert_eq!(clock.now_ms(), 500);
    }

    #[test]
    fn test_span_elapsed_across_wrap() {
        let since = u32::MAX - 5;
        assert!(!span_elapsed(u32::MAX, since, 16));
        assert!(span_elapsed(10, since, 16));
        assert!(span_elapsed(11, since, 16));
        assert_eq!(span_remaining(u32::MAX, since, 16), 11);
    }

    #[test]
    fn test_remaining_is_zero_after_span() {
        assert_eq!(span_remaining(2_000, 0, 1_500), 0);
        assert_eq!(span_remaining(1_000, 0, 1_500), 500);
    }

    #[test]
    fn test_span_beyond_half_range_is_not_elapsed_at_start() {
        let thirty_days = 2_592_000_000_u32;
        assert!(thirty_days > 1 << 31);
        assert!(!span_elapsed(1, 0, thirty_days));
        assert_eq!(span_remaining(1, 0, thirty_days), thirty_days - 1);
        assert!(span_elapsed(thirty_days, 0, thirty_days));
    }

    #[test]
    fn test_monotonic_clock_starts_near_zero() {
        let clock = MonotonicClock::new();
        assert!(clock.now_ms() < 1_000);
    }

    proptest! {
        #[test]
        fn prop_elapsed_matches_advance(start in any::<u32>(), delta in any::<u32>()) {
            let now = start.wrapping_add(delta);
            prop_assert_eq!(elapsed_ms(now, start), delta);
        }

        #[test]
        fn prop_span_elapsed_iff_delta_covers_it(
            start in any::<u32>(),
            delta in any::<u32>(),
            span in any::<u32>(),
        ) {
            let now = start.wrapping_add(delta);
            prop_assert_eq!(span_elapsed(now, start, span), delta >= span);
            prop_assert_eq!(span_remaining(now, start, span), span.saturating_sub(delta));
        }
    }
}
