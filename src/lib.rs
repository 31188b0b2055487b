//! # tickwork
//!
//! Software timers for long-running programs: one-shot timeouts, repeating
//! intervals, and second, millisecond and minute countdowns. Each kind has
//! its own store and its own poller; callbacks always run with no lock
//! held, so they may schedule, pause or clear timers themselves.
//!
//! ```no_run
//! use tickwork::prelude::*;
//!
//! let engine = Engine::new();
//! engine.init(&EngineConfig::default())?;
//!
//! let registry = engine.registry();
//! registry.schedule_timeout(|| println!("fired"), 50);
//! let id = registry.schedule_second_countdown(|left| println!("{left}s left"), 10_000);
//! registry.pause_second_countdown(id);
//!
//! engine.deinit();
//! # Ok::<(), tickwork::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod logging;
pub mod prelude;

pub use tickwork_core::{
    Category, Clock, EngineConfig, Error, ManualClock, MonotonicClock, Result, ResultExt,
    TaskConfig, TimerId, TimerStatus, clock, config,
};
pub use tickwork_engine::{
    BoundedPool, Engine, EngineBuilder, HeapPool, JoinOutcome, LockingDiscipline, MemoryPool,
    PassReport, PollStrategy, Poller, PollerHealth, Registry, ShutdownStats, TaskHandle,
    TaskSpawner, TaskSpec, ThreadSpawner, TokioSpawner,
};
