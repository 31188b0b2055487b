//! # tickwork-engine
//!
//! The timer registry, the per-category pollers that drive it, and the
//! engine lifecycle that starts and stops them.
//!
//! ```no_run
//! use tickwork_core::EngineConfig;
//! use tickwork_engine::Engine;
//!
//! let engine = Engine::new();
//! engine.init(&EngineConfig::default())?;
//! let id = engine.registry().schedule_interval(|| println!("tick"), 250);
//! engine.registry().pause_interval(id);
//! engine.deinit();
//! # Ok::<(), tickwork_core::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod item;
pub mod lifecycle;
pub mod poller;
pub mod pool;
pub mod registry;
pub mod spawner;
pub mod store;

pub use item::{Firing, MillisCallback, TimerCallback, TimerItem, UnitsCallback};
pub use lifecycle::{Engine, EngineBuilder, PollerHealth, ShutdownStats};
pub use poller::{PassReport, PollStrategy, Poller};
pub use pool::{BoundedPool, HeapPool, MemoryPool};
pub use registry::Registry;
pub use spawner::{JoinOutcome, TaskHandle, TaskSpawner, TaskSpec, ThreadSpawner, TokioSpawner};
pub use store::{ByCategory, CategoryStore, LockingDiscipline};
