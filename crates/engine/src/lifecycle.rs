//! Engine lifecycle: bring the five pollers up and take them down.
//!
//! Each successful `init` starts a new epoch with its own run flag. `deinit`
//! clears that flag, joins every poller with a bounded wait, and resets the
//! registry. A poller that outlives its epoch sees its own cleared flag and
//! never touches the stores again.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoEnumIterator};
use tickwork_core::{Category, Clock, EngineConfig, MonotonicClock, Result};
use tracing::{debug, error, info, warn};

use crate::poller::{PollStrategy, Poller};
use crate::pool::{HeapPool, MemoryPool};
use crate::registry::Registry;
use crate::spawner::{JoinOutcome, TaskHandle, TaskSpawner, TaskSpec, ThreadSpawner};
use crate::store::{ByCategory, LockingDiscipline};

/// Store slots reserved per category when the engine starts.
pub const INITIAL_STORE_CAPACITY: usize = 8;

/// State of one category's poller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PollerHealth {
    /// Never started.
    #[default]
    Idle,
    Running,
    /// The execution context could not be created; this category's timers
    /// are accepted but never fire.
    SpawnFailed,
    /// Shut down by `deinit`.
    Stopped,
}

/// Statistics about one `deinit`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownStats {
    /// Pollers that exited within the grace period.
    pub joined: usize,
    /// Pollers that were detached or aborted.
    pub forced: usize,
    /// Total shutdown duration in milliseconds.
    pub duration_ms: u64,
}

struct Epoch {
    run: Arc<AtomicBool>,
    handles: Vec<Box<dyn TaskHandle>>,
    grace: Duration,
    pool: &'static str,
}

struct EngineState {
    epoch: Option<Epoch>,
    health: ByCategory<PollerHealth>,
}

/// Builder for [`Engine`].
#[must_use]
pub struct EngineBuilder {
    clock: Arc<dyn Clock>,
    spawner: Box<dyn TaskSpawner>,
    discipline: LockingDiscipline,
    alternate_pool: Option<Box<dyn MemoryPool>>,
}

impl EngineBuilder {
    fn new() -> Self {
        Self {
            clock: Arc::new(MonotonicClock::new()),
            spawner: Box::new(ThreadSpawner),
            discipline: LockingDiscipline::default(),
            alternate_pool: None,
        }
    }

    /// Clock the registry reads.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Where pollers run.
    pub fn spawner(mut self, spawner: impl TaskSpawner + 'static) -> Self {
        self.spawner = Box::new(spawner);
        self
    }

    /// How the stores are locked.
    pub fn locking(mut self, discipline: LockingDiscipline) -> Self {
        self.discipline = discipline;
        self
    }

    /// Pool used when `EngineConfig::use_alternate_pool` is set.
    pub fn alternate_pool(mut self, pool: impl MemoryPool + 'static) -> Self {
        self.alternate_pool = Some(Box::new(pool));
        self
    }

    #[must_use]
    pub fn build(self) -> Engine {
        Engine {
            registry: Arc::new(Registry::with_discipline(self.clock, self.discipline)),
            spawner: self.spawner,
            alternate_pool: self.alternate_pool,
            state: Mutex::new(EngineState {
                epoch: None,
                health: ByCategory::default(),
            }),
        }
    }
}

/// The timer engine: a registry plus the pollers that drive it.
pub struct Engine {
    registry: Arc<Registry>,
    spawner: Box<dyn TaskSpawner>,
    alternate_pool: Option<Box<dyn MemoryPool>>,
    state: Mutex<EngineState>,
}

impl Engine {
    /// Engine with the monotonic clock, OS-thread pollers and one global lock.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// The registry, for scheduling and controlling timers.
    #[must_use]
    pub const fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Reserve store memory and start the five pollers. Does nothing if the
    /// engine is already initialized.
    ///
    /// A poller that cannot be spawned is logged and reported through
    /// [`Engine::health`]; the rest of the engine still starts.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if `config` fails validation, or
    /// `Error::AllocationFailed` if the store memory cannot be reserved.
    pub fn init(&self, config: &EngineConfig) -> Result<()> {
        let mut state = self.state.lock();
        if state.epoch.is_some() {
            debug!("Timer engine already initialized");
            return Ok(());
        }

        config.validate()?;

        let pool = self.select_pool(config);
        self.registry.reserve(pool, INITIAL_STORE_CAPACITY)?;

        let run = Arc::new(AtomicBool::new(true));
        let mut handles = Vec::with_capacity(Category::COUNT);

        for category in Category::iter() {
            let spec = TaskSpec::for_category(category, config.task(category));
            let poller = Poller::with_run_flag(
                Arc::clone(&self.registry),
                PollStrategy::for_category(category),
                Arc::clone(&run),
            );

            let health = match self.spawner.spawn(&spec, poller) {
                Ok(handle) => {
                    handles.push(handle);
                    PollerHealth::Running
                }
                Err(e) => {
                    error!(
                        category = %category,
                        poller = %spec.name,
                        error = %e,
                        "Failed to spawn poller, category will not fire"
                    );
                    PollerHealth::SpawnFailed
                }
            };
            *state.health.get_mut(category) = health;
        }

        info!(
            pool = pool.name(),
            pollers = handles.len(),
            discipline = ?self.registry.discipline(),
            "Timer engine initialized"
        );

        state.epoch = Some(Epoch {
            run,
            handles,
            grace: config.shutdown_grace(),
            pool: pool.name(),
        });
        Ok(())
    }

    fn select_pool(&self, config: &EngineConfig) -> &dyn MemoryPool {
        if !config.use_alternate_pool {
            return &HeapPool;
        }

        match &self.alternate_pool {
            Some(pool) if pool.is_available() => pool.as_ref(),
            Some(pool) => {
                warn!(pool = pool.name(), "Alternate pool unavailable, using heap");
                &HeapPool
            }
            None => {
                warn!("No alternate pool configured, using heap");
                &HeapPool
            }
        }
    }

    /// Stop every poller, drop all timers and restart id allocation. Does
    /// nothing if the engine is not initialized.
    ///
    /// Each poller gets the configured grace period to exit before it is
    /// forcibly terminated.
    pub fn deinit(&self) -> ShutdownStats {
        let started = Instant::now();
        let mut state = self.state.lock();
        let Some(epoch) = state.epoch.take() else {
            return ShutdownStats::default();
        };

        info!(pollers = epoch.handles.len(), "Stopping timer engine");
        epoch.run.store(false, Ordering::Release);

        let mut stats = ShutdownStats::default();
        for handle in epoch.handles {
            let name = handle.name().to_string();
            match handle.stop_and_join(epoch.grace) {
                JoinOutcome::Joined => {
                    debug!(poller = %name, "Poller joined");
                    stats.joined = stats.joined.saturating_add(1);
                }
                JoinOutcome::Forced => {
                    warn!(
                        poller = %name,
                        grace_ms = u64::try_from(epoch.grace.as_millis()).unwrap_or(u64::MAX),
                        "Poller did not exit in time, forced"
                    );
                    stats.forced = stats.forced.saturating_add(1);
                }
            }
        }

        self.registry.reset();
        state.health = ByCategory::from_fn(|_| PollerHealth::Stopped);

        stats.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            joined = stats.joined,
            forced = stats.forced,
            duration_ms = stats.duration_ms,
            "Timer engine stopped"
        );
        stats
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.lock().epoch.is_some()
    }

    /// Health of one category's poller.
    #[must_use]
    pub fn health(&self, category: Category) -> PollerHealth {
        *self.state.lock().health.get(category)
    }

    /// Categories whose poller failed to start in the current epoch.
    #[must_use]
    pub fn degraded_categories(&self) -> Vec<Category> {
        let state = self.state.lock();
        Category::iter()
            .filter(|&category| *state.health.get(category) == PollerHealth::SpawnFailed)
            .collect()
    }

    /// Name of the pool the current epoch reserved from.
    #[must_use]
    pub fn active_pool(&self) -> Option<&'static str> {
        self.state.lock().epoch.as_ref().map(|epoch| epoch.pool)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.deinit();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}
