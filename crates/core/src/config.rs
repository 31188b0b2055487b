//! Engine configuration loading and management
//!
//! # Hierarchy
//!
//! Configuration is resolved in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. TOML file (optional, missing file means defaults)
//! 3. Environment variables: `TICKWORK_*`
//!
//! # Example Config
//!
//! ```toml
//! use_alternate_pool = true
//! shutdown_grace_ms = 250
//!
//! [millisecond_countdown]
//! stack_size = 8192
//! priority = 3
//! core = 1
//! ```
//!
//! Every option has a default; an empty file is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::{Category, Error, Result};

/// Default stack for each poller: 4096 machine words.
pub const DEFAULT_STACK_SIZE: usize = 4096 * std::mem::size_of::<usize>();

/// Default poller priority.
pub const DEFAULT_PRIORITY: u8 = 1;

/// The millisecond countdown wakes up most often, so it runs one step higher.
pub const DEFAULT_MS_PRIORITY: u8 = 2;

/// Default bound on waiting for a poller to exit during shutdown.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 500;

const ENV_PREFIX: &str = "TICKWORK";

// ═══════════════════════════════════════════════════════════════════════════
// CONFIGURATION STRUCTURES
// ═══════════════════════════════════════════════════════════════════════════

/// Execution-context settings for one poller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TaskConfig {
    /// Stack size in bytes.
    pub stack_size: usize,
    /// Scheduling priority; higher runs first where the platform supports it.
    pub priority: u8,
    /// Core to pin the poller to, `None` for any core.
    pub core: Option<usize>,
}

/// Configuration applied by `Engine::init`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub timeout: TaskConfig,
    pub interval: TaskConfig,
    pub second_countdown: TaskConfig,
    pub millisecond_countdown: TaskConfig,
    pub minute_countdown: TaskConfig,
    /// Prefer the alternate memory pool for store buffers, falling back to
    /// the default heap when it is unavailable.
    pub use_alternate_pool: bool,
    /// How long `deinit` waits for each poller before forcing it down.
    pub shutdown_grace_ms: u64,
}

// ═══════════════════════════════════════════════════════════════════════════
// DEFAULT IMPLEMENTATIONS
// ═══════════════════════════════════════════════════════════════════════════

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            priority: DEFAULT_PRIORITY,
            core: None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout: TaskConfig::default(),
            interval: TaskConfig::default(),
            second_countdown: TaskConfig::default(),
            millisecond_countdown: TaskConfig {
                priority: DEFAULT_MS_PRIORITY,
                ..TaskConfig::default()
            },
            minute_countdown: TaskConfig::default(),
            use_alternate_pool: false,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// LOADING
// ═══════════════════════════════════════════════════════════════════════════

impl EngineConfig {
    /// Parse a TOML document; absent keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigParseFailed` if the document is not valid TOML
    /// or a value has the wrong type.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::config_parse_failed(e.to_string()))
    }

    /// Load a TOML file. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::config_read_failed(path, e.to_string()))?;
        let config = Self::from_toml_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TICKWORK_*` overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if a variable is set to an unparsable value.
    pub fn apply_env_vars(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `TICKWORK_*` overrides from an arbitrary lookup.
    ///
    /// Recognized keys: `TICKWORK_USE_ALTERNATE_POOL`,
    /// `TICKWORK_SHUTDOWN_GRACE_MS`, and per category
    /// `TICKWORK_<CATEGORY>_STACK_SIZE`, `_PRIORITY`, `_CORE` where
    /// `<CATEGORY>` is e.g. `SECOND_COUNTDOWN`. A core of `none` or `-1`
    /// unpins the poller.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if a variable is set to an unparsable value.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(&format!("{ENV_PREFIX}_USE_ALTERNATE_POOL")) {
            self.use_alternate_pool = parse_env("USE_ALTERNATE_POOL", &value)?;
        }

        if let Some(value) = lookup(&format!("{ENV_PREFIX}_SHUTDOWN_GRACE_MS")) {
            self.shutdown_grace_ms = parse_env("SHUTDOWN_GRACE_MS", &value)?;
        }

        for category in Category::iter() {
            let section = category.to_string().to_uppercase();
            let task = self.task_mut(category);

            let key = format!("{section}_STACK_SIZE");
            if let Some(value) = lookup(&format!("{ENV_PREFIX}_{key}")) {
                task.stack_size = parse_env(&key, &value)?;
            }

            let key = format!("{section}_PRIORITY");
            if let Some(value) = lookup(&format!("{ENV_PREFIX}_{key}")) {
                task.priority = parse_env(&key, &value)?;
            }

            let key = format!("{section}_CORE");
            if let Some(value) = lookup(&format!("{ENV_PREFIX}_{key}")) {
                task.core = match value.trim() {
                    "" | "none" | "-1" => None,
                    pinned => Some(parse_env(&key, pinned)?),
                };
            }
        }

        Ok(())
    }

    /// Check invariants the engine relies on.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` for a zero stack size or a zero grace period.
    pub fn validate(&self) -> Result<()> {
        if self.shutdown_grace_ms == 0 {
            return Err(Error::invalid_config(
                "shutdown_grace_ms must be greater than zero",
            ));
        }

        Category::iter().try_for_each(|category| {
            if self.task(category).stack_size == 0 {
                Err(Error::invalid_config(format!(
                    "{category}.stack_size must be greater than zero"
                )))
            } else {
                Ok(())
            }
        })
    }

    /// Settings for one category's poller.
    #[must_use]
    pub const fn task(&self, category: Category) -> &TaskConfig {
        match category {
            Category::Timeout => &self.timeout,
            Category::Interval => &self.interval,
            Category::SecondCountdown => &self.second_countdown,
            Category::MillisecondCountdown => &self.millisecond_countdown,
            Category::MinuteCountdown => &self.minute_countdown,
        }
    }

    /// Mutable settings for one category's poller.
    pub const fn task_mut(&mut self, category: Category) -> &mut TaskConfig {
        match category {
            Category::Timeout => &mut self.timeout,
            Category::Interval => &mut self.interval,
            Category::SecondCountdown => &mut self.second_countdown,
            Category::MillisecondCountdown => &mut self.millisecond_countdown,
            Category::MinuteCountdown => &mut self.minute_countdown,
        }
    }

    /// Shutdown grace period as a `Duration`.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::invalid_config(format!("Invalid {ENV_PREFIX}_{key} value: {e}")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.timeout.priority, 1);
        assert_eq!(config.millisecond_countdown.priority, 2);
        assert_eq!(config.interval.core, None);
        assert_eq!(config.minute_countdown.stack_size, DEFAULT_STACK_SIZE);
        assert!(!config.use_alternate_pool);
        assert_eq!(config.shutdown_grace(), Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r"
            use_alternate_pool = true

            [second_countdown]
            priority = 4
            core = 0
            ",
        )
        .unwrap();

        assert!(config.use_alternate_pool);
        assert_eq!(config.second_countdown.priority, 4);
        assert_eq!(config.second_countdown.core, Some(0));
        assert_eq!(config.second_countdown.stack_size, DEFAULT_STACK_SIZE);
        assert_eq!(config.millisecond_countdown.priority, 2);
        assert_eq!(config.shutdown_grace_ms, DEFAULT_SHUTDOWN_GRACE_MS);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let result = EngineConfig::from_toml_str("shutdown_grace_ms = \"soon\"");
        assert!(matches!(result, Err(Error::ConfigParseFailed { .. })));
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "shutdown_grace_ms = 250\n[timeout]\nstack_size = 8192").unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.shutdown_grace_ms, 250);
        assert_eq!(config.timeout.stack_size, 8192);
    }

    #[test]
    fn test_load_rejects_zero_grace() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "shutdown_grace_ms = 0").unwrap();

        let result = EngineConfig::load(file.path());
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = EngineConfig::default();
        config
            .apply_env_from(lookup_from(&[
                ("TICKWORK_USE_ALTERNATE_POOL", "true"),
                ("TICKWORK_SHUTDOWN_GRACE_MS", "120"),
                ("TICKWORK_MILLISECOND_COUNTDOWN_PRIORITY", "5"),
                ("TICKWORK_INTERVAL_CORE", "1"),
                ("TICKWORK_MINUTE_COUNTDOWN_STACK_SIZE", "2048"),
            ]))
            .unwrap();

        assert!(config.use_alternate_pool);
        assert_eq!(config.shutdown_grace_ms, 120);
        assert_eq!(config.millisecond_countdown.priority, 5);
        assert_eq!(config.interval.core, Some(1));
        assert_eq!(config.minute_countdown.stack_size, 2048);
    }

    #[test]
    fn test_env_core_none_unpins() {
        let mut config = EngineConfig::default();
        config.timeout.core = Some(1);
        config
            .apply_env_from(lookup_from(&[("TICKWORK_TIMEOUT_CORE", "-1")]))
            .unwrap();
        assert_eq!(config.timeout.core, None);
    }

    #[test]
    fn test_env_bad_value_is_invalid_config() {
        let mut config = EngineConfig::default();
        let result =
            config.apply_env_from(lookup_from(&[("TICKWORK_TIMEOUT_PRIORITY", "high")]));

        match result {
            Err(Error::InvalidConfig { reason }) => {
                assert!(reason.contains("TICKWORK_TIMEOUT_PRIORITY"));
            }
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_zero_stack() {
        let mut config = EngineConfig::default();
        config.task_mut(Category::SecondCountdown).stack_size = 0;
        let result = config.validate();
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }
}
