//! Per-category polling loop.
//!
//! A poller repeatedly scans one category store, collects the callbacks
//! that are due, releases the lock, and only then invokes them. The loop
//! runs while the run flag of its engine epoch is set.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tickwork_core::Category;
use tracing::{debug, error, trace};

use crate::item::Firing;
use crate::registry::Registry;

/// Which store a poller scans and how long it sleeps between passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollStrategy {
    pub category: Category,
    pub cadence: Duration,
}

impl PollStrategy {
    /// The standard cadence for `category`.
    #[must_use]
    pub const fn for_category(category: Category) -> Self {
        Self {
            category,
            cadence: category.cadence(),
        }
    }
}

/// Outcome of a single pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    /// Callbacks invoked.
    pub fired: usize,
    /// Items that left the store, including fired timeouts.
    pub swept: usize,
}

/// Scans one category store until its run flag is cleared.
pub struct Poller {
    registry: Arc<Registry>,
    strategy: PollStrategy,
    run: Arc<AtomicBool>,
    fired: Vec<Firing>,
}

impl Poller {
    /// Create a poller with its own run flag, already set.
    #[must_use]
    pub fn new(registry: Arc<Registry>, strategy: PollStrategy) -> Self {
        Self::with_run_flag(registry, strategy, Arc::new(AtomicBool::new(true)))
    }

    pub(crate) const fn with_run_flag(
        registry: Arc<Registry>,
        strategy: PollStrategy,
        run: Arc<AtomicBool>,
    ) -> Self {
        Self {
            registry,
            strategy,
            run,
            fired: Vec::new(),
        }
    }

    #[must_use]
    pub const fn strategy(&self) -> PollStrategy {
        self.strategy
    }

    /// Whether the loop should keep going.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.run.load(Ordering::Acquire)
    }

    /// Ask the loop to exit after its current pass.
    pub fn stop(&self) {
        self.run.store(false, Ordering::Release);
    }

    /// Flag shared with whoever owns this poller's lifetime.
    pub(crate) fn run_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.run)
    }

    /// Run one pass: scan under the lock, then invoke what was due.
    pub fn run_pass(&mut self) -> PassReport {
        let category = self.strategy.category;
        let now = self.registry.now_ms();

        let Some(swept) = self
            .registry
            .collect_due(category, now, &self.run, &mut self.fired)
        else {
            return PassReport::default();
        };

        let fired = self.fired.len();
        for firing in self.fired.drain(..) {
            invoke_guarded(category, &firing);
        }

        if fired > 0 || swept > 0 {
            trace!(category = %category, now, fired, swept, "Poll pass");
        }
        PassReport { fired, swept }
    }

    /// Poll on the current thread until stopped.
    pub fn run(mut self) {
        let category = self.strategy.category;
        debug!(category = %category, cadence_ms = self.cadence_ms(), "Poller started");

        while self.is_active() {
            self.run_pass();
            std::thread::sleep(self.strategy.cadence);
        }

        debug!(category = %category, "Poller stopped");
    }

    /// Poll as an async task until stopped.
    pub async fn run_async(mut self) {
        let category = self.strategy.category;
        debug!(category = %category, cadence_ms = self.cadence_ms(), "Poller task started");

        while self.is_active() {
            self.run_pass();
            tokio::time::sleep(self.strategy.cadence).await;
        }

        debug!(category = %category, "Poller task stopped");
    }

    fn cadence_ms(&self) -> u64 {
        u64::try_from(self.strategy.cadence.as_millis()).unwrap_or(u64::MAX)
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("strategy", &self.strategy)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

/// Invoke a callback, containing any panic so the poller survives it.
fn invoke_guarded(category: Category, firing: &Firing) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| firing.invoke())) {
        error!(
            category = %category,
            timer_id = %firing.id(),
            panic = panic_message(payload.as_ref()),
            "Timer callback panicked"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
