//! Memory pools that back the category stores.
//!
//! The engine reserves an initial store capacity from one pool during
//! `init`. [`HeapPool`] is the default heap; any other pool is an
//! "alternate" pool, selected by `EngineConfig::use_alternate_pool` and
//! skipped with a warning when it reports itself unavailable.

use std::sync::atomic::{AtomicUsize, Ordering};

use tickwork_core::{Category, Error, Result};

use crate::item::TimerItem;

/// A source of store memory.
pub trait MemoryPool: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Whether the pool can serve reservations right now.
    fn is_available(&self) -> bool {
        true
    }

    /// Grow `store` so it can take `additional` more items without
    /// reallocating.
    ///
    /// # Errors
    ///
    /// Returns `Error::AllocationFailed` if the pool cannot provide the memory.
    fn reserve(&self, category: Category, store: &mut Vec<TimerItem>, additional: usize)
    -> Result<()>;
}

/// The global allocator.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapPool;

impl MemoryPool for HeapPool {
    fn name(&self) -> &'static str {
        "heap"
    }

    fn reserve(
        &self,
        category: Category,
        store: &mut Vec<TimerItem>,
        additional: usize,
    ) -> Result<()> {
        store
            .try_reserve(additional)
            .map_err(|e| Error::allocation_failed(category.to_string(), self.name(), e.to_string()))
    }
}

/// A pool with a fixed item budget shared by every store it serves.
///
/// Stands in for a dedicated memory region: reservations succeed until the
/// budget is spent. A pool built with [`BoundedPool::offline`] reports
/// itself unavailable so the engine falls back to the heap.
#[derive(Debug)]
pub struct BoundedPool {
    name: &'static str,
    capacity: usize,
    used: AtomicUsize,
    available: bool,
}

impl BoundedPool {
    /// Create a pool that can hand out `capacity` item slots in total.
    #[must_use]
    pub const fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            used: AtomicUsize::new(0),
            available: true,
        }
    }

    /// Create a pool that is not present on this system.
    #[must_use]
    pub const fn offline(name: &'static str) -> Self {
        Self {
            name,
            capacity: 0,
            used: AtomicUsize::new(0),
            available: false,
        }
    }

    /// Item slots handed out so far.
    #[must_use]
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    /// Item slots still available.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.used())
    }
}

impl MemoryPool for BoundedPool {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn reserve(
        &self,
        category: Category,
        store: &mut Vec<TimerItem>,
        additional: usize,
    ) -> Result<()> {
        if store.capacity().saturating_sub(store.len()) >= additional {
            return Ok(());
        }

        let capacity = self.capacity;
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(additional)
                    .filter(|&total| total <= capacity)
            })
            .map_err(|used| {
                Error::allocation_failed(
                    category.to_string(),
                    self.name,
                    format!(
                        "{additional} slots requested, {} of {capacity} left",
                        capacity.saturating_sub(used)
                    ),
                )
            })?;

        store.try_reserve_exact(additional).map_err(|e| {
            self.used.fetch_sub(additional, Ordering::AcqRel);
            Error::allocation_failed(category.to_string(), self.name, e.to_string())
        })
    }
}
