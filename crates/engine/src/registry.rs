//! The timer registry: scheduling and control operations over the five
//! category stores.
//!
//! Every operation takes the store lock for the shortest possible span and
//! never runs user code while holding it, so callbacks may call back into
//! the registry freely. Lookups that miss report `false` or
//! [`TimerStatus::Invalid`]; nothing here returns an error.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use strum::IntoEnumIterator;
use tickwork_core::{Category, Clock, MonotonicClock, Result, TimerId, TimerStatus};
use tracing::{debug, trace};

use crate::item::{Firing, Schedule, TimerItem};
use crate::pool::MemoryPool;
use crate::store::{LockingDiscipline, StoreSet};

/// First id handed out after construction or a reset.
const FIRST_ID: u32 = 1;

/// Shared table of all live timers.
pub struct Registry {
    clock: Arc<dyn Clock>,
    stores: StoreSet,
    next_id: AtomicU32,
}

impl Registry {
    /// Create a registry with one lock over all stores.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_discipline(clock, LockingDiscipline::Global)
    }

    /// Create a registry with the given locking discipline.
    #[must_use]
    pub fn with_discipline(clock: Arc<dyn Clock>, discipline: LockingDiscipline) -> Self {
        Self {
            clock,
            stores: StoreSet::new(discipline),
            next_id: AtomicU32::new(FIRST_ID),
        }
    }

    /// How the stores are locked.
    #[must_use]
    pub const fn discipline(&self) -> LockingDiscipline {
        self.stores.discipline()
    }

    /// Current reading of the registry's clock.
    #[must_use]
    pub fn now_ms(&self) -> u32 {
        self.clock.now_ms()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SCHEDULING
    // ═══════════════════════════════════════════════════════════════════════

    /// Run `callback` once, `delay_ms` from now.
    pub fn schedule_timeout<F>(&self, callback: F, delay_ms: u32) -> TimerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.insert(Category::Timeout, |now| {
            Schedule::timeout(now, delay_ms, Arc::new(callback))
        })
    }

    /// Run `callback` every `period_ms` until cleared.
    pub fn schedule_interval<F>(&self, callback: F, period_ms: u32) -> TimerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.insert(Category::Interval, |now| {
            Schedule::interval(now, period_ms, Arc::new(callback))
        })
    }

    /// Report whole seconds left, once per second, until `total_ms` elapses.
    pub fn schedule_second_countdown<F>(&self, callback: F, total_ms: u32) -> TimerId
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.insert(Category::SecondCountdown, |now| {
            Schedule::seconds(now, total_ms, Arc::new(callback))
        })
    }

    /// Report raw milliseconds left, once per millisecond, until `total_ms`
    /// elapses.
    pub fn schedule_ms_countdown<F>(&self, callback: F, total_ms: u32) -> TimerId
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.insert(Category::MillisecondCountdown, |now| {
            Schedule::millis(now, total_ms, Arc::new(callback))
        })
    }

    /// Report whole minutes left, once per minute, until `total_ms` elapses.
    pub fn schedule_minute_countdown<F>(&self, callback: F, total_ms: u32) -> TimerId
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.insert(Category::MinuteCountdown, |now| {
            Schedule::minutes(now, total_ms, Arc::new(callback))
        })
    }

    fn insert(&self, category: Category, build: impl FnOnce(u32) -> Schedule) -> TimerId {
        let id = self.allocate_id();
        let now = self.clock.now_ms();
        let item = TimerItem::new(id, now, build(now));
        self.stores.with_store(category, |store| store.push(item));
        trace!(category = %category, timer_id = %id, "Timer scheduled");
        id
    }

    /// Take the next id: wraps at `u32::MAX` and never yields zero.
    fn allocate_id(&self) -> TimerId {
        let taken = self
            .next_id
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |id| {
                Some(following_id(id))
            })
            .unwrap_or_else(|id| id);
        TimerId::from_raw(taken)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // CONTROL
    // ═══════════════════════════════════════════════════════════════════════

    /// Pause a running timer. Returns `false` if it is missing or not running.
    pub fn pause(&self, category: Category, id: TimerId) -> bool {
        self.stores.with_store(category, |store| {
            store.find_mut(id).is_some_and(TimerItem::pause)
        })
    }

    /// Resume a paused timer, restarting its tick reference from now.
    /// Returns `false` if it is missing or not paused.
    pub fn resume(&self, category: Category, id: TimerId) -> bool {
        let now = self.clock.now_ms();
        self.stores.with_store(category, |store| {
            store.find_mut(id).is_some_and(|item| item.resume(now))
        })
    }

    /// Flip a timer between running and paused. Returns the status after the
    /// call, or `Invalid` if the timer does not exist.
    pub fn toggle(&self, category: Category, id: TimerId) -> TimerStatus {
        let now = self.clock.now_ms();
        self.stores.with_store(category, |store| {
            store
                .find_mut(id)
                .map_or(TimerStatus::Invalid, |item| item.toggle(now))
        })
    }

    /// Remove a timer in any state. Returns `false` if it was not present.
    pub fn clear(&self, category: Category, id: TimerId) -> bool {
        let removed = self.stores.with_store(category, |store| store.remove(id));
        if removed {
            trace!(category = %category, timer_id = %id, "Timer cleared");
        }
        removed
    }

    /// Status of a timer, searching every category in lookup order.
    #[must_use]
    pub fn status(&self, id: TimerId) -> TimerStatus {
        Category::iter()
            .map(|category| self.stores.with_store(category, |store| store.status_of(id)))
            .find(|status| status.is_found())
            .unwrap_or(TimerStatus::Invalid)
    }

    /// Number of timers held for one category.
    #[must_use]
    pub fn len(&self, category: Category) -> usize {
        self.stores.with_store(category, |store| store.len())
    }

    /// Number of timers held across all categories.
    #[must_use]
    pub fn total_len(&self) -> usize {
        Category::iter().map(|category| self.len(category)).sum()
    }

    /// Whether no timers are held at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        Category::iter()
            .all(|category| self.stores.with_store(category, |store| store.is_empty()))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PER-CATEGORY WRAPPERS
    // ═══════════════════════════════════════════════════════════════════════

    /// Pause a timeout; `true` if it was running.
    pub fn pause_timeout(&self, id: TimerId) -> bool {
        self.pause(Category::Timeout, id)
    }

    /// Pause an interval; `true` if it was running.
    pub fn pause_interval(&self, id: TimerId) -> bool {
        self.pause(Category::Interval, id)
    }

    /// Pause a second countdown; `true` if it was running.
    pub fn pause_second_countdown(&self, id: TimerId) -> bool {
        self.pause(Category::SecondCountdown, id)
    }

    /// Pause a millisecond countdown; `true` if it was running.
    pub fn pause_ms_countdown(&self, id: TimerId) -> bool {
        self.pause(Category::MillisecondCountdown, id)
    }

    /// Pause a minute countdown; `true` if it was running.
    pub fn pause_minute_countdown(&self, id: TimerId) -> bool {
        self.pause(Category::MinuteCountdown, id)
    }

    /// Resume a timeout; `true` if it was paused.
    pub fn resume_timeout(&self, id: TimerId) -> bool {
        self.resume(Category::Timeout, id)
    }

    /// Resume an interval; `true` if it was paused.
    pub fn resume_interval(&self, id: TimerId) -> bool {
        self.resume(Category::Interval, id)
    }

    /// Resume a second countdown; `true` if it was paused.
    pub fn resume_second_countdown(&self, id: TimerId) -> bool {
        self.resume(Category::SecondCountdown, id)
    }

    /// Resume a millisecond countdown; `true` if it was paused.
    pub fn resume_ms_countdown(&self, id: TimerId) -> bool {
        self.resume(Category::MillisecondCountdown, id)
    }

    /// Resume a minute countdown; `true` if it was paused.
    pub fn resume_minute_countdown(&self, id: TimerId) -> bool {
        self.resume(Category::MinuteCountdown, id)
    }

    /// Clear a timeout; `true` if it existed.
    pub fn clear_timeout(&self, id: TimerId) -> bool {
        self.clear(Category::Timeout, id)
    }

    /// Same as [`Registry::clear_timeout`].
    pub fn clear_timer(&self, id: TimerId) -> bool {
        self.clear_timeout(id)
    }

    /// Clear an interval; `true` if it existed.
    pub fn clear_interval(&self, id: TimerId) -> bool {
        self.clear(Category::Interval, id)
    }

    /// Clear a second countdown; `true` if it existed.
    pub fn clear_second_countdown(&self, id: TimerId) -> bool {
        self.clear(Category::SecondCountdown, id)
    }

    /// Clear a millisecond countdown; `true` if it existed.
    pub fn clear_ms_countdown(&self, id: TimerId) -> bool {
        self.clear(Category::MillisecondCountdown, id)
    }

    /// Clear a minute countdown; `true` if it existed.
    pub fn clear_minute_countdown(&self, id: TimerId) -> bool {
        self.clear(Category::MinuteCountdown, id)
    }

    /// Toggle a timeout; `true` if it is running afterwards.
    pub fn toggle_run_status_timeout(&self, id: TimerId) -> bool {
        self.toggle(Category::Timeout, id).is_running()
    }

    /// Toggle an interval; `true` if it is running afterwards.
    pub fn toggle_run_status_interval(&self, id: TimerId) -> bool {
        self.toggle(Category::Interval, id).is_running()
    }

    /// Toggle a second countdown; `true` if it is running afterwards.
    pub fn toggle_run_status_second_countdown(&self, id: TimerId) -> bool {
        self.toggle(Category::SecondCountdown, id).is_running()
    }

    /// Toggle a millisecond countdown; `true` if it is running afterwards.
    pub fn toggle_run_status_ms_countdown(&self, id: TimerId) -> bool {
        self.toggle(Category::MillisecondCountdown, id).is_running()
    }

    /// Toggle a minute countdown; `true` if it is running afterwards.
    pub fn toggle_run_status_minute_countdown(&self, id: TimerId) -> bool {
        self.toggle(Category::MinuteCountdown, id).is_running()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ENGINE AND POLLER HOOKS
    // ═══════════════════════════════════════════════════════════════════════

    /// Reserve `additional` slots in every store from `pool`.
    pub(crate) fn reserve(&self, pool: &dyn MemoryPool, additional: usize) -> Result<()> {
        Category::iter().try_for_each(|category| {
            self.stores
                .with_store(category, |store| store.reserve(pool, additional))
        })
    }

    /// Drop every timer and restart id allocation.
    pub(crate) fn reset(&self) {
        let dropped: usize = Category::iter()
            .map(|category| {
                self.stores.with_store(category, |store| {
                    let held = store.len();
                    store.clear();
                    held
                })
            })
            .sum();
        self.next_id.store(FIRST_ID, Ordering::Release);
        debug!(dropped, "Registry reset");
    }

    /// One locked scan of `category`. Due callbacks are appended to `fired`.
    ///
    /// `run` is checked with the lock held: once it reads `false` the store
    /// is left untouched and `None` is returned, so a poller from a finished
    /// epoch cannot act on the stores of a later one.
    pub(crate) fn collect_due(
        &self,
        category: Category,
        now: u32,
        run: &AtomicBool,
        fired: &mut Vec<Firing>,
    ) -> Option<usize> {
        self.stores.with_store(category, |store| {
            run.load(Ordering::Acquire)
                .then(|| store.run_pass(now, fired))
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Arc::new(MonotonicClock::new()))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("discipline", &self.discipline())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

const fn following_id(id: u32) -> u32 {
    match id.wrapping_add(1) {
        0 => FIRST_ID,
        next => next,
    }
}
