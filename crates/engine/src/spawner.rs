//! Execution contexts for pollers.
//!
//! The engine hands each poller to a [`TaskSpawner`] and keeps the returned
//! [`TaskHandle`]. Shutdown clears the epoch run flag, then joins every
//! handle with a bounded wait.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use strum::Display;
use tickwork_core::{Category, Error, Result, TaskConfig};
use tokio::runtime::RuntimeFlavor;
use tracing::{debug, warn};

use crate::poller::Poller;

/// Floor applied to OS thread stacks. Unwinding and log formatting on a
/// hosted platform need more room than a microcontroller task.
const MIN_THREAD_STACK: usize = 64 * 1024;

/// How often a tokio handle is checked while waiting for its task to end.
const TASK_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Everything needed to start one poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: String,
    pub category: Category,
    pub stack_size: usize,
    /// Advisory; logged but not applied on hosted platforms.
    pub priority: u8,
    /// Advisory; logged but not applied on hosted platforms.
    pub core: Option<usize>,
}

impl TaskSpec {
    #[must_use]
    pub fn for_category(category: Category, task: &TaskConfig) -> Self {
        Self {
            name: category.poller_name().to_string(),
            category,
            stack_size: task.stack_size,
            priority: task.priority,
            core: task.core,
        }
    }
}

/// How a poller came down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JoinOutcome {
    /// Exited on its own within the grace period.
    Joined,
    /// Did not exit in time and was detached or aborted.
    Forced,
}

/// A running poller.
pub trait TaskHandle: Send {
    /// Name the context was spawned with.
    fn name(&self) -> &str;

    /// Signal the poller to stop and wait up to `grace` for it to exit.
    fn stop_and_join(self: Box<Self>, grace: Duration) -> JoinOutcome;
}

/// Something that can run a poller in its own execution context.
pub trait TaskSpawner: Send + Sync {
    /// Start `poller` according to `spec`.
    ///
    /// # Errors
    ///
    /// Returns `Error::SpawnFailed` if the context cannot be created.
    fn spawn(&self, spec: &TaskSpec, poller: Poller) -> Result<Box<dyn TaskHandle>>;
}

fn log_spawn(spec: &TaskSpec, context: &str) {
    debug!(
        poller = %spec.name,
        category = %spec.category,
        stack_size = spec.stack_size,
        priority = spec.priority,
        core = ?spec.core,
        context,
        "Spawning poller"
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// OS THREADS
// ═══════════════════════════════════════════════════════════════════════════

/// Runs each poller on a named OS thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSpawner;

impl TaskSpawner for ThreadSpawner {
    fn spawn(&self, spec: &TaskSpec, poller: Poller) -> Result<Box<dyn TaskHandle>> {
        log_spawn(spec, "thread");

        let run = poller.run_flag();
        let (exit_tx, exit_rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name(spec.name.clone())
            .stack_size(spec.stack_size.max(MIN_THREAD_STACK))
            .spawn(move || {
                let _exit = ExitSignal(exit_tx);
                poller.run();
            })
            .map_err(|e| Error::spawn_failed(spec.name.as_str(), e.to_string()))?;

        Ok(Box::new(ThreadHandle {
            name: spec.name.clone(),
            run,
            exited: exit_rx,
            thread,
        }))
    }
}

/// Notifies the joiner when the poller thread unwinds or returns.
struct ExitSignal(mpsc::Sender<()>);

impl Drop for ExitSignal {
    fn drop(&mut self) {
        // The joiner may already have given up.
        let _ = self.0.send(());
    }
}

struct ThreadHandle {
    name: String,
    run: Arc<AtomicBool>,
    exited: mpsc::Receiver<()>,
    thread: thread::JoinHandle<()>,
}

impl TaskHandle for ThreadHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn stop_and_join(self: Box<Self>, grace: Duration) -> JoinOutcome {
        self.run.store(false, Ordering::Release);

        match self.exited.recv_timeout(grace) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                if self.thread.join().is_err() {
                    warn!(poller = %self.name, "Poller thread panicked");
                }
                JoinOutcome::Joined
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // Dropping the handle detaches the thread.
                JoinOutcome::Forced
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TOKIO TASKS
// ═══════════════════════════════════════════════════════════════════════════

/// Runs each poller as a task on a tokio runtime.
///
/// Joining from a multi-thread runtime worker moves the wait off the worker
/// with `block_in_place`. On a current-thread runtime the caller owns the
/// only thread, so each task is aborted at its await point without waiting.
#[derive(Debug, Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    #[must_use]
    pub const fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on.
    ///
    /// # Errors
    ///
    /// Returns `Error::SpawnFailed` when called outside a tokio runtime.
    pub fn try_current() -> Result<Self> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|e| Error::spawn_failed("tokio", e.to_string()))
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn(&self, spec: &TaskSpec, poller: Poller) -> Result<Box<dyn TaskHandle>> {
        log_spawn(spec, "tokio");

        let run = poller.run_flag();
        let task = self.handle.spawn(poller.run_async());

        Ok(Box::new(TokioHandle {
            name: spec.name.clone(),
            run,
            task,
        }))
    }
}

struct TokioHandle {
    name: String,
    run: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

impl TaskHandle for TokioHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn stop_and_join(self: Box<Self>, grace: Duration) -> JoinOutcome {
        self.run.store(false, Ordering::Release);

        match tokio::runtime::Handle::try_current().map(|handle| handle.runtime_flavor()) {
            Ok(RuntimeFlavor::CurrentThread) => self.stop_parked(),
            Ok(_) => tokio::task::block_in_place(|| self.wait(grace)),
            Err(_) => self.wait(grace),
        }
    }
}

impl TokioHandle {
    fn wait(&self, grace: Duration) -> JoinOutcome {
        let started = Instant::now();
        while !self.task.is_finished() {
            if started.elapsed() >= grace {
                self.task.abort();
                return JoinOutcome::Forced;
            }
            thread::sleep(TASK_POLL_INTERVAL);
        }
        JoinOutcome::Joined
    }

    /// The task cannot run while this thread holds the runtime, so it is
    /// suspended at an await point and aborting it stops it between passes.
    fn stop_parked(&self) -> JoinOutcome {
        if !self.task.is_finished() {
            debug!(poller = %self.name, "Aborting parked poller task");
            self.task.abort();
        }
        JoinOutcome::Joined
    }
}
