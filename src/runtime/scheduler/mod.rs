//! Task scheduler
//!
//! This module provides the [`Scheduler`]: the ready queue, the lifecycle
//! hooks, the process-wide error handler and the failure boundary every
//! task body runs inside. The tick loop that also advances timers and the
//! worker pool lives in [`crate::runtime::Runtime`].

pub mod hooks;
pub mod queue;
pub mod task;

pub use hooks::{HookFilter, HookFn, HookPhase, HookRegistry};
pub use queue::ReadyQueue;
pub use task::{
    boxed_body, IntoTaskResult, Task, TaskBody, TaskBuilder, TaskHandle, TaskId, TaskOutcome,
    TaskPriority, TaskState,
};

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::runtime::error::TaskError;

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Idle sleep between ticks when nothing is ready, in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Priority used by `submit` when no builder is given.
    #[serde(default)]
    pub default_priority: i32,
}

fn default_tick_ms() -> u64 {
    10
}

impl SchedulerConfig {
    /// Idle sleep as a duration.
    #[inline]
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            default_priority: 0,
        }
    }
}

/// Scheduler statistics.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    tasks_submitted: Cell<u64>,
    tasks_executed: Cell<u64>,
    tasks_skipped: Cell<u64>,
    tasks_failed: Cell<u64>,
    continuations: Cell<u64>,
    timers_fired: Cell<u64>,
    pool_admitted: Cell<u64>,
    ticks: Cell<u64>,
}

fn bump(counter: &Cell<u64>) {
    counter.set(counter.get() + 1);
}

impl SchedulerStats {
    /// Record a submitted task.
    #[inline]
    pub fn record_submitted(&self) {
        bump(&self.tasks_submitted);
    }

    /// Record an executed task.
    #[inline]
    pub fn record_executed(&self) {
        bump(&self.tasks_executed);
    }

    /// Record a cancelled task that was skipped at dequeue.
    #[inline]
    pub fn record_skipped(&self) {
        bump(&self.tasks_skipped);
    }

    /// Record a failed task.
    #[inline]
    pub fn record_failed(&self) {
        bump(&self.tasks_failed);
    }

    /// Record a continuation submitted for a suspended body.
    #[inline]
    pub fn record_continuation(&self) {
        bump(&self.continuations);
    }

    /// Record a timer callback handed to the ready queue.
    #[inline]
    pub fn record_timer_fired(&self) {
        bump(&self.timers_fired);
    }

    /// Record a worker pool admission.
    #[inline]
    pub fn record_admitted(&self) {
        bump(&self.pool_admitted);
    }

    /// Record one loop iteration.
    #[inline]
    pub fn record_tick(&self) {
        bump(&self.ticks);
    }

    /// Copy the counters out.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            tasks_submitted: self.tasks_submitted.get(),
            tasks_executed: self.tasks_executed.get(),
            tasks_skipped: self.tasks_skipped.get(),
            tasks_failed: self.tasks_failed.get(),
            continuations: self.continuations.get(),
            timers_fired: self.timers_fired.get(),
            pool_admitted: self.pool_admitted.get(),
            ticks: self.ticks.get(),
        }
    }
}

/// Point-in-time copy of [`SchedulerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub tasks_submitted: u64,
    pub tasks_executed: u64,
    pub tasks_skipped: u64,
    pub tasks_failed: u64,
    pub continuations: u64,
    pub timers_fired: u64,
    pub pool_admitted: u64,
    pub ticks: u64,
}

/// Loop state: `Draining` while at least one task is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Nothing ready to run.
    Idle,
    /// At least one task is ready.
    Draining,
}

/// What happened to the head of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The queue was empty.
    Empty,
    /// A cancelled task was dropped without running.
    Skipped(TaskId),
    /// A task body ran.
    Ran(TaskId),
}

/// Error handler callback.
pub type ErrorHandler = Rc<dyn Fn(&TaskError)>;

/// Ready queue plus everything that happens around a single task execution.
pub struct Scheduler {
    queue: RefCell<ReadyQueue>,
    hooks: RefCell<HookRegistry>,
    error_handler: RefCell<Option<ErrorHandler>>,
    stats: SchedulerStats,
}

impl fmt::Debug for Scheduler {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("ready", &self.queue.borrow().len())
            .field("hooks", &self.hooks.borrow().len())
            .field("error_handler", &self.error_handler.borrow().is_some())
            .finish()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self {
            queue: RefCell::new(ReadyQueue::new()),
            hooks: RefCell::new(HookRegistry::new()),
            error_handler: RefCell::new(None),
            stats: SchedulerStats::default(),
        }
    }

    /// Insert a task into the ready queue.
    pub fn submit(
        &self,
        task: Task,
    ) -> TaskHandle {
        let handle = task.handle();
        trace!(task = %task.name(), priority = task.priority().value(), "submit");
        self.stats.record_submitted();
        self.queue.borrow_mut().push(task);
        handle
    }

    /// Register a lifecycle hook.
    pub fn add_hook(
        &self,
        phase: HookPhase,
        filter: HookFilter,
        callback: HookFn,
    ) {
        self.hooks.borrow_mut().add(phase, filter, callback);
    }

    /// Install the error handler, replacing any previous one.
    pub fn on_error(
        &self,
        handler: ErrorHandler,
    ) {
        if self.error_handler.borrow_mut().replace(handler).is_some() {
            debug!("error handler replaced");
        }
    }

    /// Whether a task is waiting in the ready queue.
    #[inline]
    pub fn has_ready(&self) -> bool {
        !self.queue.borrow().is_empty()
    }

    /// Number of queued tasks, including cancelled ones not yet skipped.
    #[inline]
    pub fn ready_len(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Current loop state.
    #[inline]
    pub fn state(&self) -> LoopState {
        if self.has_ready() {
            LoopState::Draining
        } else {
            LoopState::Idle
        }
    }

    #[inline]
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Pop the head of the queue and run it.
    ///
    /// Cancelled tasks are dropped without firing hooks. Otherwise the
    /// before hooks fire, the body runs inside the failure boundary, a
    /// continuation is queued if the body suspended, and the after hooks
    /// fire whatever the outcome was.
    pub fn run_next(&self) -> Dispatch {
        // The queue borrow must end before the body runs: bodies submit.
        let popped = self.queue.borrow_mut().pop();
        let Some(mut task) = popped else {
            return Dispatch::Empty;
        };

        if task.is_cancelled() {
            trace!(task = %task.name(), "skip cancelled");
            self.stats.record_skipped();
            return Dispatch::Skipped(task.id());
        }

        self.fire_hooks(HookPhase::Before, &task);

        task.set_state(TaskState::Running);
        let result = match task.take_body() {
            Some(body) => panic::catch_unwind(AssertUnwindSafe(body))
                .unwrap_or_else(|payload| Err(TaskError::from_panic(task.name(), payload))),
            None => Ok(TaskOutcome::Complete),
        };
        self.stats.record_executed();

        match result {
            Ok(TaskOutcome::Complete) => task.set_state(TaskState::Completed),
            Ok(TaskOutcome::Suspended(next)) => {
                task.set_state(TaskState::Completed);
                self.stats.record_continuation();
                self.submit(task.continuation_builder().build(next));
            }
            Err(err) => {
                task.set_state(TaskState::Failed);
                self.stats.record_failed();
                self.report(task.name(), &err);
            }
        }

        self.fire_hooks(HookPhase::After, &task);
        Dispatch::Ran(task.id())
    }

    /// Route an error to the handler, or log it if none is installed.
    pub fn report(
        &self,
        task: &str,
        err: &TaskError,
    ) {
        let handler = self.error_handler.borrow().clone();
        match handler {
            Some(handler) => handler(err),
            None => error!(task = %task, "task failed: {}", err),
        }
    }

    fn fire_hooks(
        &self,
        phase: HookPhase,
        task: &Task,
    ) {
        let hooks = self.hooks.borrow().for_phase(phase);
        for (filter, hook) in hooks {
            if filter.matches(task) {
                hook(task);
            }
        }
    }

    /// Drop all queued tasks, hooks and the error handler.
    pub(crate) fn clear(&self) {
        let dropped = self.queue.borrow_mut().clear();
        let hooks = std::mem::take(&mut *self.hooks.borrow_mut());
        let handler = self.error_handler.borrow_mut().take();
        // Captured state may hold handles back into the runtime; drop it
        // only after every borrow above is released.
        drop(dropped);
        drop(hooks);
        drop(handler);
    }
}
