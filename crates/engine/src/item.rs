//! Timer items and the per-kind due rules.
//!
//! An item owns its callback. Pollers never call a callback while the
//! registry lock is held; instead [`TimerItem::poll`] hands back a
//! [`Firing`] that carries a clone of the callback and its argument, and the
//! poller invokes it after unlocking.

use std::fmt;
use std::sync::Arc;

use tickwork_core::clock::{elapsed_ms, span_elapsed, span_remaining};
use tickwork_core::{Category, TimerId, TimerStatus};

/// Callback for timeouts and intervals.
pub type TimerCallback = Arc<dyn Fn() + Send + Sync>;

/// Callback for second and minute countdowns; receives whole units left,
/// rounded up.
pub type UnitsCallback = Arc<dyn Fn(i32) + Send + Sync>;

/// Callback for millisecond countdowns; receives raw milliseconds left.
pub type MillisCallback = Arc<dyn Fn(u32) + Send + Sync>;

const MS_PER_SECOND: u32 = 1_000;
const MS_PER_MINUTE: u32 = 60_000;
const MS_PER_MS_TICK: u32 = 1;

/// Start, length and reference time of a countdown. A countdown that has
/// not reported yet reports on its first poll.
#[derive(Clone)]
pub(crate) struct Countdown<C> {
    started_at: u32,
    total_ms: u32,
    last_tick_at: Option<u32>,
    callback: C,
}

impl<C> Countdown<C> {
    const fn new(now: u32, total_ms: u32, callback: C) -> Self {
        Self {
            started_at: now,
            total_ms,
            last_tick_at: None,
            callback,
        }
    }

    /// Advance the reference time if a tick of `tick_ms` has elapsed.
    /// Returns the milliseconds left at this tick.
    fn tick(&mut self, now: u32, tick_ms: u32) -> Option<u32> {
        let due = self
            .last_tick_at
            .is_none_or(|last| elapsed_ms(now, last) >= tick_ms);
        if !due {
            return None;
        }
        self.last_tick_at = Some(now);
        Some(span_remaining(now, self.started_at, self.total_ms))
    }

    const fn finished(&self, now: u32) -> bool {
        span_elapsed(now, self.started_at, self.total_ms)
    }
}

/// Per-kind timing state.
#[derive(Clone)]
pub(crate) enum Schedule {
    Timeout {
        scheduled_at: u32,
        delay: u32,
        callback: TimerCallback,
    },
    Interval {
        period: u32,
        last_fire_at: u32,
        callback: TimerCallback,
    },
    Seconds(Countdown<UnitsCallback>),
    Millis(Countdown<MillisCallback>),
    Minutes(Countdown<UnitsCallback>),
}

impl Schedule {
    pub(crate) fn timeout(now: u32, delay_ms: u32, callback: TimerCallback) -> Self {
        Self::Timeout {
            scheduled_at: now,
            delay: delay_ms,
            callback,
        }
    }

    pub(crate) fn interval(now: u32, period_ms: u32, callback: TimerCallback) -> Self {
        Self::Interval {
            period: period_ms,
            last_fire_at: now,
            callback,
        }
    }

    pub(crate) fn seconds(now: u32, total_ms: u32, callback: UnitsCallback) -> Self {
        Self::Seconds(Countdown::new(now, total_ms, callback))
    }

    pub(crate) fn millis(now: u32, total_ms: u32, callback: MillisCallback) -> Self {
        Self::Millis(Countdown::new(now, total_ms, callback))
    }

    pub(crate) fn minutes(now: u32, total_ms: u32, callback: UnitsCallback) -> Self {
        Self::Minutes(Countdown::new(now, total_ms, callback))
    }

    const fn category(&self) -> Category {
        match self {
            Self::Timeout { .. } => Category::Timeout,
            Self::Interval { .. } => Category::Interval,
            Self::Seconds(_) => Category::SecondCountdown,
            Self::Millis(_) => Category::MillisecondCountdown,
            Self::Minutes(_) => Category::MinuteCountdown,
        }
    }

    /// Move the reference time to `now` so a resumed timer does not fire a
    /// burst of catch-up ticks. Timeouts keep their absolute due time.
    fn rebase(&mut self, now: u32) {
        match self {
            Self::Timeout { .. } => {}
            Self::Interval { last_fire_at, .. } => *last_fire_at = now,
            Self::Seconds(countdown) | Self::Minutes(countdown) => {
                countdown.last_tick_at = Some(now);
            }
            Self::Millis(countdown) => countdown.last_tick_at = Some(now),
        }
    }
}

/// Remaining whole units, rounded up so the display only reads 0 once no
/// time is left.
fn whole_units_left(remaining: u32, unit_ms: u32) -> i32 {
    i32::try_from(remaining.div_ceil(unit_ms)).unwrap_or(i32::MAX)
}

/// What a poll decided for one item.
pub(crate) enum Step {
    /// Not due, or not running.
    Idle,
    /// Fire and keep the item (it may have just completed).
    Fire(Firing),
    /// Fire and erase the item in this pass.
    FireOnce(Firing),
}

/// A callback extracted from the store, ready to run outside the lock.
#[derive(Clone)]
pub(crate) enum Call {
    Plain(TimerCallback),
    Units(UnitsCallback, i32),
    Millis(MillisCallback, u32),
}

/// One pending callback invocation.
#[derive(Clone)]
pub struct Firing {
    id: TimerId,
    call: Call,
}

impl Firing {
    /// Id of the timer that fired.
    #[must_use]
    pub const fn id(&self) -> TimerId {
        self.id
    }

    /// Argument handed to the callback, if the kind takes one.
    #[must_use]
    pub fn argument(&self) -> Option<i64> {
        match self.call {
            Call::Plain(_) => None,
            Call::Units(_, units) => Some(i64::from(units)),
            Call::Millis(_, ms) => Some(i64::from(ms)),
        }
    }

    /// Run the callback.
    pub fn invoke(&self) {
        match &self.call {
            Call::Plain(callback) => callback(),
            Call::Units(callback, units) => callback(*units),
            Call::Millis(callback, ms) => callback(*ms),
        }
    }
}

impl fmt::Debug for Firing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Firing")
            .field("id", &self.id)
            .field("argument", &self.argument())
            .finish_non_exhaustive()
    }
}

/// One scheduled unit of work.
#[derive(Clone)]
pub struct TimerItem {
    id: TimerId,
    status: TimerStatus,
    created_at: u32,
    schedule: Schedule,
}

impl TimerItem {
    pub(crate) const fn new(id: TimerId, created_at: u32, schedule: Schedule) -> Self {
        Self {
            id,
            status: TimerStatus::Running,
            created_at,
            schedule,
        }
    }

    /// Get the timer id.
    #[must_use]
    pub const fn id(&self) -> TimerId {
        self.id
    }

    /// Get the current status.
    #[must_use]
    pub const fn status(&self) -> TimerStatus {
        self.status
    }

    /// Get the kind of timer.
    #[must_use]
    pub const fn category(&self) -> Category {
        self.schedule.category()
    }

    /// Clock reading when the timer was scheduled.
    #[must_use]
    pub const fn created_at(&self) -> u32 {
        self.created_at
    }

    /// `Running → Paused`. Returns whether the state changed.
    pub(crate) fn pause(&mut self) -> bool {
        if self.status.is_running() {
            self.status = TimerStatus::Paused;
            true
        } else {
            false
        }
    }

    /// `Paused → Running`, rebasing the reference time. Returns whether the
    /// state changed.
    pub(crate) fn resume(&mut self, now: u32) -> bool {
        if self.status.is_paused() {
            self.status = TimerStatus::Running;
            self.schedule.rebase(now);
            true
        } else {
            false
        }
    }

    /// Flip between running and paused. Terminal items are left alone.
    /// Returns the status after the call.
    pub(crate) fn toggle(&mut self, now: u32) -> TimerStatus {
        if !self.pause() {
            self.resume(now);
        }
        self.status
    }

    /// Apply the due rule for this item's kind at `now`.
    pub(crate) fn poll(&mut self, now: u32) -> Step {
        if !self.status.is_running() {
            return Step::Idle;
        }

        let id = self.id;
        let (call, completed) = match &mut self.schedule {
            Schedule::Timeout {
                scheduled_at,
                delay,
                callback,
            } => {
                if !span_elapsed(now, *scheduled_at, *delay) {
                    return Step::Idle;
                }
                return Step::FireOnce(Firing {
                    id,
                    call: Call::Plain(Arc::clone(callback)),
                });
            }
            Schedule::Interval {
                period,
                last_fire_at,
                callback,
            } => {
                if elapsed_ms(now, *last_fire_at) < *period {
                    return Step::Idle;
                }
                *last_fire_at = now;
                (Call::Plain(Arc::clone(callback)), false)
            }
            Schedule::Seconds(countdown) => {
                let Some(left) = countdown.tick(now, MS_PER_SECOND) else {
                    return Step::Idle;
                };
                let units = whole_units_left(left, MS_PER_SECOND);
                (
                    Call::Units(Arc::clone(&countdown.callback), units),
                    countdown.finished(now),
                )
            }
            Schedule::Millis(countdown) => {
                let Some(left) = countdown.tick(now, MS_PER_MS_TICK) else {
                    return Step::Idle;
                };
                (
                    Call::Millis(Arc::clone(&countdown.callback), left),
                    countdown.finished(now),
                )
            }
            Schedule::Minutes(countdown) => {
                let Some(left) = countdown.tick(now, MS_PER_MINUTE) else {
                    return Step::Idle;
                };
                let units = whole_units_left(left, MS_PER_MINUTE);
                (
                    Call::Units(Arc::clone(&countdown.callback), units),
                    countdown.finished(now),
                )
            }
        };

        if completed {
            self.status = TimerStatus::Completed;
        }
        Step::Fire(Firing { id, call })
    }

    #[cfg(test)]
    pub(crate) fn set_status(&mut self, status: TimerStatus) {
        self.status = status;
    }
}

impl fmt::Debug for TimerItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerItem")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("category", &self.category())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::arithmetic_side_effects)]

    use std::sync::Mutex;

    use proptest::prelude::*;

    use super::*;

    fn noop() -> TimerCallback {
        Arc::new(|| {})
    }

    fn fire(step: Step) -> Firing {
        match step {
            Step::Fire(firing) | Step::FireOnce(firing) => firing,
            Step::Idle => panic!("expected a firing"),
        }
    }

    fn recording_units() -> (UnitsCallback, Arc<Mutex<Vec<i32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: UnitsCallback = Arc::new(move |units: i32| sink.lock().unwrap().push(units));
        (callback, seen)
    }

    #[test]
    fn test_timeout_fires_once_at_due_time() {
        let mut item = TimerItem::new(TimerId::from_raw(1), 0, Schedule::timeout(0, 50, noop()));
        assert!(matches!(item.poll(49), Step::Idle));
        assert!(matches!(item.poll(50), Step::FireOnce(_)));
    }

    #[test]
    fn test_timeout_due_across_clock_wrap() {
        let start = u32::MAX - 10;
        let mut item =
            TimerItem::new(TimerId::from_raw(1), start, Schedule::timeout(start, 20, noop()));
        assert!(matches!(item.poll(u32::MAX), Step::Idle));
        assert!(matches!(item.poll(9), Step::FireOnce(_)));
    }

    #[test]
    fn test_timeout_longer_than_half_clock_range_waits() {
        let thirty_days = 2_592_000_000_u32;
        let mut item =
            TimerItem::new(TimerId::from_raw(1), 0, Schedule::timeout(0, thirty_days, noop()));
        assert!(matches!(item.poll(1), Step::Idle));
        assert!(matches!(item.poll(1 << 31), Step::Idle));
        assert!(matches!(item.poll(thirty_days - 1), Step::Idle));
        assert!(matches!(item.poll(thirty_days), Step::FireOnce(_)));
    }

    #[test]
    fn test_interval_updates_reference() {
        let mut item = TimerItem::new(TimerId::from_raw(2), 0, Schedule::interval(0, 20, noop()));
        assert!(matches!(item.poll(19), Step::Idle));
        assert!(matches!(item.poll(20), Step::Fire(_)));
        assert!(matches!(item.poll(39), Step::Idle));
        assert!(matches!(item.poll(40), Step::Fire(_)));
        assert_eq!(item.status(), TimerStatus::Running);
    }

    #[test]
    fn test_paused_item_never_fires() {
        let mut item = TimerItem::new(TimerId::from_raw(3), 0, Schedule::interval(0, 5, noop()));
        assert!(item.pause());
        assert!(!item.pause());
        assert!(matches!(item.poll(100), Step::Idle));
    }

    #[test]
    fn test_resume_rebases_interval() {
        let mut item = TimerItem::new(TimerId::from_raw(4), 0, Schedule::interval(0, 20, noop()));
        assert!(item.pause());
        assert!(item.resume(1_000));
        assert!(matches!(item.poll(1_000), Step::Idle));
        assert!(matches!(item.poll(1_019), Step::Idle));
        assert!(matches!(item.poll(1_020), Step::Fire(_)));
    }

    #[test]
    fn test_toggle_alternates_and_skips_terminal() {
        let mut item = TimerItem::new(TimerId::from_raw(5), 0, Schedule::interval(0, 20, noop()));
        assert_eq!(item.toggle(0), TimerStatus::Paused);
        assert_eq!(item.toggle(0), TimerStatus::Running);
        item.set_status(TimerStatus::Completed);
        assert_eq!(item.toggle(0), TimerStatus::Completed);
    }

    #[test]
    fn test_second_countdown_rounds_up() {
        let (callback, seen) = recording_units();
        let mut item = TimerItem::new(
            TimerId::from_raw(6),
            0,
            Schedule::seconds(0, 2_500, callback),
        );

        fire(item.poll(0)).invoke();
        assert!(matches!(item.poll(999), Step::Idle));
        fire(item.poll(1_000)).invoke();
        fire(item.poll(2_000)).invoke();
        assert_eq!(item.status(), TimerStatus::Running);
        fire(item.poll(3_000)).invoke();

        assert_eq!(*seen.lock().unwrap(), vec![3, 2, 1, 0]);
        assert_eq!(item.status(), TimerStatus::Completed);
    }

    #[test]
    fn test_minute_countdown_rounds_up() {
        let (callback, seen) = recording_units();
        let mut item = TimerItem::new(
            TimerId::from_raw(7),
            0,
            Schedule::minutes(0, 150_000, callback),
        );

        fire(item.poll(0)).invoke();
        fire(item.poll(60_000)).invoke();
        fire(item.poll(120_000)).invoke();
        fire(item.poll(180_000)).invoke();

        assert_eq!(*seen.lock().unwrap(), vec![3, 2, 1, 0]);
        assert_eq!(item.status(), TimerStatus::Completed);
    }

    #[test]
    fn test_minute_countdown_longer_than_half_clock_range_keeps_running() {
        let thirty_days = 2_592_000_000_u32;
        let (callback, seen) = recording_units();
        let mut item = TimerItem::new(
            TimerId::from_raw(12),
            0,
            Schedule::minutes(0, thirty_days, callback),
        );

        fire(item.poll(1)).invoke();
        assert_eq!(item.status(), TimerStatus::Running);
        fire(item.poll(60_001)).invoke();
        assert_eq!(item.status(), TimerStatus::Running);

        assert_eq!(*seen.lock().unwrap(), vec![43_200, 43_199]);
    }

    #[test]
    fn test_resumed_countdown_waits_a_full_unit() {
        let (callback, seen) = recording_units();
        let mut item = TimerItem::new(
            TimerId::from_raw(11),
            0,
            Schedule::seconds(0, 10_000, callback),
        );

        fire(item.poll(0)).invoke();
        assert!(item.pause());
        assert!(item.resume(5_000));
        assert!(matches!(item.poll(5_000), Step::Idle));
        assert!(matches!(item.poll(5_999), Step::Idle));
        fire(item.poll(6_000)).invoke();

        assert_eq!(*seen.lock().unwrap(), vec![10, 4]);
    }

    #[test]
    fn test_millisecond_countdown_reports_raw_remaining() {
        let mut item = TimerItem::new(
            TimerId::from_raw(8),
            0,
            Schedule::millis(0, 3, Arc::new(|_: u32| {})),
        );

        assert_eq!(fire(item.poll(0)).argument(), Some(3));
        assert!(matches!(item.poll(0), Step::Idle));
        assert_eq!(fire(item.poll(1)).argument(), Some(2));
        assert_eq!(fire(item.poll(2)).argument(), Some(1));
        assert_eq!(item.status(), TimerStatus::Running);
        assert_eq!(fire(item.poll(3)).argument(), Some(0));
        assert_eq!(item.status(), TimerStatus::Completed);
    }

    #[test]
    fn test_completed_item_is_idle() {
        let mut item = TimerItem::new(
            TimerId::from_raw(9),
            0,
            Schedule::millis(0, 1, Arc::new(|_: u32| {})),
        );
        let _ = fire(item.poll(1));
        assert!(matches!(item.poll(2), Step::Idle));
    }

    #[test]
    fn test_plain_firing_has_no_argument() {
        let mut item = TimerItem::new(TimerId::from_raw(10), 0, Schedule::interval(0, 1, noop()));
        assert_eq!(fire(item.poll(1)).argument(), None);
    }

    proptest! {
        #[test]
        fn prop_units_never_zero_before_deadline(remaining in 1_u32..10_000_000) {
            prop_assert!(whole_units_left(remaining, MS_PER_SECOND) >= 1);
            prop_assert!(whole_units_left(remaining, MS_PER_MINUTE) >= 1);
        }

        #[test]
        fn prop_units_cover_remaining(remaining in 0_u32..10_000_000) {
            let units = u32::try_from(whole_units_left(remaining, MS_PER_SECOND)).unwrap();
            prop_assert!(units * MS_PER_SECOND >= remaining);
            prop_assert!(units * MS_PER_SECOND < remaining + MS_PER_SECOND);
        }
    }
}
