//! Identity, status and category types shared by the registry and the pollers.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoStaticStr};

/// Unique identifier for a scheduled timer.
///
/// Ids are allocated from one counter shared by every category, so an id
/// identifies a timer without knowing its category. Zero is reserved and is
/// never handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerId(u32);

impl TimerId {
    /// The reserved id that never refers to a live timer.
    pub const INVALID: Self = Self(0);

    /// Wrap a raw id.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw id.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Check whether this id could refer to a live timer.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<TimerId> for u32 {
    fn from(id: TimerId) -> Self {
        id.0
    }
}

/// Status of a timer.
///
/// `Invalid` is never stored on an item; lookups return it when no timer
/// matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TimerStatus {
    /// No timer with the requested id.
    Invalid,
    /// Timer is live and will be polled.
    Running,
    /// Timer is live but skipped by its poller.
    Paused,
    /// Timer is waiting to be swept.
    Stopped,
    /// Countdown reached its deadline; waiting to be swept.
    Completed,
}

impl TimerStatus {
    /// Check if a timer was found.
    #[must_use]
    pub const fn is_found(self) -> bool {
        !matches!(self, Self::Invalid)
    }

    /// Check if the timer is running.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Check if the timer is paused.
    #[must_use]
    pub const fn is_paused(self) -> bool {
        matches!(self, Self::Paused)
    }

    /// Check if the timer is eligible for removal by its poller.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Completed)
    }
}

/// The five timer kinds. Each has its own store and its own poller.
///
/// Iteration order (`Category::iter()`) is the fixed lookup order used by
/// status queries.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Category {
    /// One-shot delay.
    Timeout,
    /// Repeating period.
    Interval,
    /// Countdown reporting whole seconds left.
    SecondCountdown,
    /// Countdown reporting raw milliseconds left.
    MillisecondCountdown,
    /// Countdown reporting whole minutes left.
    MinuteCountdown,
}

impl Category {
    /// Number of categories.
    pub const COUNT: usize = 5;

    /// Sleep between two passes of this category's poller.
    #[must_use]
    pub const fn cadence(self) -> Duration {
        match self {
            Self::Timeout | Self::Interval | Self::MillisecondCountdown => {
                Duration::from_millis(1)
            }
            Self::SecondCountdown => Duration::from_millis(10),
            Self::MinuteCountdown => Duration::from_millis(100),
        }
    }

    /// Name given to this category's poller execution context.
    #[must_use]
    pub const fn poller_name(self) -> &'static str {
        match self {
            Self::Timeout => "tickwork-timeout",
            Self::Interval => "tickwork-interval",
            Self::SecondCountdown => "tickwork-sec",
            Self::MillisecondCountdown => "tickwork-ms",
            Self::MinuteCountdown => "tickwork-min",
        }
    }
}
