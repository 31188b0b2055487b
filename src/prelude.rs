//! Prelude module - common imports for tickwork
//!
//! ```rust
//! use tickwork::prelude::*;
//! ```

pub use tickwork_core::{
    Category, Clock, EngineConfig, Error, ManualClock, MonotonicClock, Result, ResultExt,
    TimerId, TimerStatus,
};
pub use tickwork_engine::{Engine, LockingDiscipline, PollerHealth, Registry, ShutdownStats};
