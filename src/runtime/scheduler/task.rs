//! Task definitions for the scheduler.
//!
//! A [`Task`] is one schedulable unit: a body, a name, a priority and a
//! cancellation flag. The scheduler owns the task from submission until it
//! runs once or is skipped; callers keep a [`TaskHandle`] to observe or
//! cancel it.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::runtime::error::{TaskError, TaskResult};

/// Unique task identifier.
///
/// Ids are process-unique, so tasks from independent runtimes never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Generate the next process-unique id.
    pub(crate) fn generate() -> TaskId {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        TaskId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the inner value.
    #[inline]
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(val: u64) -> Self {
        Self(val)
    }
}

impl fmt::Display for TaskId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting in the ready queue.
    Queued,
    /// Body is executing.
    Running,
    /// Body returned successfully (possibly suspending into a continuation).
    Completed,
    /// Body returned an error or panicked.
    Failed,
    /// Cancelled before it was dequeued.
    Cancelled,
}

impl TaskState {
    /// Whether the task will never run (again).
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Queued | TaskState::Running)
    }
}

/// Task priority. Higher values run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TaskPriority(pub i32);

impl TaskPriority {
    /// Background work.
    pub const LOW: TaskPriority = TaskPriority(-10);
    /// Default priority.
    pub const NORMAL: TaskPriority = TaskPriority(0);
    /// Latency-sensitive work.
    pub const HIGH: TaskPriority = TaskPriority(10);
    /// Runs ahead of everything else.
    pub const CRITICAL: TaskPriority = TaskPriority(100);

    /// Get the inner value.
    #[inline]
    pub fn value(&self) -> i32 {
        self.0
    }
}

impl From<i32> for TaskPriority {
    fn from(val: i32) -> Self {
        Self(val)
    }
}

/// What a task body produced.
pub enum TaskOutcome {
    /// The body finished.
    Complete,
    /// The body represents an unfinished computation; the scheduler submits
    /// the continuation as a new task with the same priority and name.
    Suspended(TaskBody),
}

impl fmt::Debug for TaskOutcome {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            TaskOutcome::Complete => f.write_str("Complete"),
            TaskOutcome::Suspended(_) => f.write_str("Suspended(..)"),
        }
    }
}

/// Boxed task body.
pub type TaskBody = Box<dyn FnOnce() -> TaskResult>;

/// Conversion from whatever a body returns into a [`TaskResult`].
///
/// Lets plain closures returning `()` sit next to fallible ones returning
/// `Result<(), E>` and suspending ones returning [`TaskOutcome`].
pub trait IntoTaskResult {
    /// Convert into a task result.
    fn into_task_result(self) -> TaskResult;
}

impl IntoTaskResult for () {
    #[inline]
    fn into_task_result(self) -> TaskResult {
        Ok(TaskOutcome::Complete)
    }
}

impl IntoTaskResult for TaskOutcome {
    #[inline]
    fn into_task_result(self) -> TaskResult {
        Ok(self)
    }
}

impl<T, E> IntoTaskResult for Result<T, E>
where
    T: IntoTaskResult,
    E: Into<TaskError>,
{
    #[inline]
    fn into_task_result(self) -> TaskResult {
        self.map_err(Into::into)
            .and_then(IntoTaskResult::into_task_result)
    }
}

/// Box any compatible closure as a [`TaskBody`].
pub fn boxed_body<F, R>(body: F) -> TaskBody
where
    F: FnOnce() -> R + 'static,
    R: IntoTaskResult,
{
    Box::new(move || body().into_task_result())
}

/// State shared between a queued task and its handles.
#[derive(Debug)]
struct Shared {
    cancelled: Cell<bool>,
    state: Cell<TaskState>,
}

/// A task that can be scheduled for execution.
pub struct Task {
    /// Unique task ID.
    id: TaskId,
    /// Task name, used by hook filters and logs.
    name: Rc<str>,
    /// Priority of the task.
    priority: TaskPriority,
    /// Cancellation flag and lifecycle state.
    shared: Rc<Shared>,
    /// The work to execute; taken exactly once.
    body: Option<TaskBody>,
}

impl fmt::Debug for Task {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("state", &self.state())
            .finish()
    }
}

impl Task {
    /// Create a task with the default name `task-<id>`.
    pub fn new(
        priority: TaskPriority,
        body: TaskBody,
    ) -> Self {
        TaskBuilder::new().priority(priority).build(body)
    }

    /// Get the task ID.
    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Get the task name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the priority.
    #[inline]
    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    /// Get the current state.
    #[inline]
    pub fn state(&self) -> TaskState {
        self.shared.state.get()
    }

    /// Whether the task was cancelled before it ran.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.get()
    }

    /// Cancel the task. See [`TaskHandle::cancel`].
    pub fn cancel(&self) -> bool {
        cancel_shared(&self.shared)
    }

    /// A handle sharing this task's cancellation flag and state.
    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            id: self.id,
            name: self.name.clone(),
            priority: self.priority,
            shared: self.shared.clone(),
        }
    }

    /// Builder that reproduces this task's name and priority, used for
    /// continuations.
    pub(crate) fn continuation_builder(&self) -> TaskBuilder {
        TaskBuilder {
            name: Some(self.name.clone()),
            priority: self.priority,
        }
    }

    #[inline]
    pub(crate) fn set_state(
        &self,
        state: TaskState,
    ) {
        self.shared.state.set(state);
    }

    /// Replace the body of a task that has not been submitted yet.
    #[inline]
    pub(crate) fn set_body(
        &mut self,
        body: TaskBody,
    ) {
        self.body = Some(body);
    }

    /// Take the body out of the task.
    #[inline]
    pub(crate) fn take_body(&mut self) -> Option<TaskBody> {
        self.body.take()
    }
}

fn cancel_shared(shared: &Shared) -> bool {
    if shared.state.get() != TaskState::Queued {
        return false;
    }
    shared.cancelled.set(true);
    shared.state.set(TaskState::Cancelled);
    true
}

/// Caller-side view of a submitted task.
#[derive(Clone)]
pub struct TaskHandle {
    id: TaskId,
    name: Rc<str>,
    priority: TaskPriority,
    shared: Rc<Shared>,
}

impl fmt::Debug for TaskHandle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl TaskHandle {
    /// Cancel the task if it has not started.
    ///
    /// Returns `true` if this call cancelled it. Cancelling a task that is
    /// running, finished or already cancelled has no effect.
    pub fn cancel(&self) -> bool {
        cancel_shared(&self.shared)
    }

    /// Get the task ID.
    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Get the task name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the priority.
    #[inline]
    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    /// Get the current state.
    #[inline]
    pub fn state(&self) -> TaskState {
        self.shared.state.get()
    }

    /// Whether the task was cancelled before it ran.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.get()
    }
}

/// Task builder for constructing tasks with a name and priority.
#[derive(Debug, Default, Clone)]
pub struct TaskBuilder {
    name: Option<Rc<str>>,
    priority: TaskPriority,
}

impl TaskBuilder {
    /// Create a new task builder.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the task name.
    #[inline]
    pub fn name(
        mut self,
        name: impl AsRef<str>,
    ) -> Self {
        self.name = Some(Rc::from(name.as_ref()));
        self
    }

    /// Set the task priority.
    #[inline]
    pub fn priority(
        mut self,
        priority: impl Into<TaskPriority>,
    ) -> Self {
        self.priority = priority.into();
        self
    }

    /// The configured priority.
    #[inline]
    pub fn get_priority(&self) -> TaskPriority {
        self.priority
    }

    /// Build the task with a fresh id.
    pub fn build(
        self,
        body: TaskBody,
    ) -> Task {
        let id = TaskId::generate();
        let name = self
            .name
            .unwrap_or_else(|| Rc::from(format!("task-{}", id.inner())));

        Task {
            id,
            name,
            priority: self.priority,
            shared: Rc::new(Shared {
                cancelled: Cell::new(false),
                state: Cell::new(TaskState::Queued),
            }),
            body: Some(body),
        }
    }
}
