//! Category stores and the lock that guards them.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tickwork_core::{Category, Result, TimerId, TimerStatus};

use crate::item::{Firing, Step, TimerItem};
use crate::pool::MemoryPool;

/// One value per category, addressed without indexing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByCategory<T> {
    pub timeout: T,
    pub interval: T,
    pub second_countdown: T,
    pub millisecond_countdown: T,
    pub minute_countdown: T,
}

impl<T> ByCategory<T> {
    /// Build each slot from its category.
    pub fn from_fn(mut f: impl FnMut(Category) -> T) -> Self {
        Self {
            timeout: f(Category::Timeout),
            interval: f(Category::Interval),
            second_countdown: f(Category::SecondCountdown),
            millisecond_countdown: f(Category::MillisecondCountdown),
            minute_countdown: f(Category::MinuteCountdown),
        }
    }

    #[must_use]
    pub const fn get(&self, category: Category) -> &T {
        match category {
            Category::Timeout => &self.timeout,
            Category::Interval => &self.interval,
            Category::SecondCountdown => &self.second_countdown,
            Category::MillisecondCountdown => &self.millisecond_countdown,
            Category::MinuteCountdown => &self.minute_countdown,
        }
    }

    pub const fn get_mut(&mut self, category: Category) -> &mut T {
        match category {
            Category::Timeout => &mut self.timeout,
            Category::Interval => &mut self.interval,
            Category::SecondCountdown => &mut self.second_countdown,
            Category::MillisecondCountdown => &mut self.millisecond_countdown,
            Category::MinuteCountdown => &mut self.minute_countdown,
        }
    }
}

/// The ordered items of one category.
#[derive(Debug)]
pub struct CategoryStore {
    category: Category,
    items: Vec<TimerItem>,
}

impl CategoryStore {
    #[must_use]
    pub const fn new(category: Category) -> Self {
        Self {
            category,
            items: Vec::new(),
        }
    }

    #[must_use]
    pub const fn category(&self) -> Category {
        self.category
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn push(&mut self, item: TimerItem) {
        self.items.push(item);
    }

    pub(crate) fn find(&self, id: TimerId) -> Option<&TimerItem> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub(crate) fn find_mut(&mut self, id: TimerId) -> Option<&mut TimerItem> {
        self.items.iter_mut().find(|item| item.id() == id)
    }

    pub(crate) fn status_of(&self, id: TimerId) -> TimerStatus {
        self.find(id).map_or(TimerStatus::Invalid, TimerItem::status)
    }

    pub(crate) fn remove(&mut self, id: TimerId) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id() != id);
        self.items.len() != before
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }

    pub(crate) fn reserve(&mut self, pool: &dyn MemoryPool, additional: usize) -> Result<()> {
        pool.reserve(self.category, &mut self.items, additional)
    }

    /// One scan: collect due callbacks into `fired` in store order, erase
    /// fired timeouts, and sweep every stopped or completed item. Returns
    /// how many items left the store.
    pub(crate) fn run_pass(&mut self, now: u32, fired: &mut Vec<Firing>) -> usize {
        let before = self.items.len();
        self.items.retain_mut(|item| match item.poll(now) {
            Step::Idle => !item.status().is_terminal(),
            Step::Fire(firing) => {
                fired.push(firing);
                !item.status().is_terminal()
            }
            Step::FireOnce(firing) => {
                fired.push(firing);
                false
            }
        });
        before.saturating_sub(self.items.len())
    }
}

/// How the five stores are locked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockingDiscipline {
    /// One exclusive lock over all stores. Any registry call serializes
    /// against every poller's scan.
    #[default]
    Global,
    /// One lock per store. Operations on different categories never contend.
    PerCategory,
}

/// The stores behind the chosen locking discipline.
pub(crate) enum StoreSet {
    Global(Mutex<ByCategory<CategoryStore>>),
    PerCategory(ByCategory<Mutex<CategoryStore>>),
}

impl StoreSet {
    pub(crate) fn new(discipline: LockingDiscipline) -> Self {
        match discipline {
            LockingDiscipline::Global => {
                Self::Global(Mutex::new(ByCategory::from_fn(CategoryStore::new)))
            }
            LockingDiscipline::PerCategory => Self::PerCategory(ByCategory::from_fn(|category| {
                Mutex::new(CategoryStore::new(category))
            })),
        }
    }

    pub(crate) const fn discipline(&self) -> LockingDiscipline {
        match self {
            Self::Global(_) => LockingDiscipline::Global,
            Self::PerCategory(_) => LockingDiscipline::PerCategory,
        }
    }

    /// Run `f` on one store with its lock held.
    pub(crate) fn with_store<R>(
        &self,
        category: Category,
        f: impl FnOnce(&mut CategoryStore) -> R,
    ) -> R {
        match self {
            Self::Global(stores) => {
                let mut guard = stores.lock();
                f(guard.get_mut(category))
            }
            Self::PerCategory(stores) => {
                let mut guard = stores.get(category).lock();
                f(&mut *guard)
            }
        }
    }
}
