//! # tickwork-core
//!
//! Shared vocabulary for the tickwork timer engine: ids, statuses,
//! categories, the clock seam, configuration and the error type.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod clock;
pub mod config;
pub mod error;
pub mod result;
pub mod types;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{EngineConfig, TaskConfig};
pub use error::Error;
pub use result::{Result, ResultExt};
pub use types::{Category, TimerId, TimerStatus};
