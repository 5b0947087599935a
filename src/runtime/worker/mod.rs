//! Bounded worker pool
//!
//! A FIFO of callables behind a concurrency gate. Admission moves a
//! callable into the "running" state and turns it into an ordinary task;
//! the running count drops again when that task's body finishes, fails,
//! panics or is discarded unrun.

use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::runtime::scheduler::{TaskBody, TaskPriority};

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum number of admitted, unfinished pool tasks.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Priority of the tasks created on admission.
    #[serde(default)]
    pub priority: i32,
}

fn default_concurrency() -> usize {
    4
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            priority: 0,
        }
    }
}

/// Decrements the running count when dropped.
struct RunningGuard {
    running: Rc<Cell<usize>>,
}

impl RunningGuard {
    fn enter(
        running: &Rc<Cell<usize>>,
        peak: &Cell<usize>,
    ) -> Self {
        let now = running.get() + 1;
        running.set(now);
        if now > peak.get() {
            peak.set(now);
        }
        Self {
            running: running.clone(),
        }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.set(self.running.get().saturating_sub(1));
    }
}

/// Pending queue plus the running counter.
pub struct WorkerPool {
    queue: VecDeque<TaskBody>,
    concurrency: usize,
    priority: TaskPriority,
    running: Rc<Cell<usize>>,
    peak: Cell<usize>,
}

impl WorkerPool {
    pub fn new(config: &WorkerConfig) -> Self {
        let mut pool = Self {
            queue: VecDeque::new(),
            concurrency: 1,
            priority: TaskPriority(config.priority),
            running: Rc::new(Cell::new(0)),
            peak: Cell::new(0),
        };
        pool.set_concurrency(config.concurrency);
        pool
    }

    /// Change the limit for future admissions. Already admitted tasks are
    /// left alone when the limit shrinks. Zero is raised to one.
    pub fn set_concurrency(
        &mut self,
        n: usize,
    ) {
        if n == 0 {
            warn!("worker concurrency of 0 would never admit work; using 1");
        }
        self.concurrency = n.max(1);
    }

    /// Append a callable to the pending queue.
    pub fn add(
        &mut self,
        job: TaskBody,
    ) {
        self.queue.push_back(job);
    }

    /// Admit pending callables while slots are free.
    ///
    /// Each returned body already counts as running and releases its slot
    /// when it finishes or is dropped.
    pub fn admit(&mut self) -> Vec<TaskBody> {
        let mut admitted = Vec::new();
        while self.running.get() < self.concurrency {
            let Some(job) = self.queue.pop_front() else {
                break;
            };
            let guard = RunningGuard::enter(&self.running, &self.peak);
            admitted.push(Box::new(move || {
                let _guard = guard;
                job()
            }) as TaskBody);
        }
        admitted
    }

    /// Whether nothing is pending or running.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.running.get() == 0
    }

    /// Admitted tasks that have not finished.
    #[inline]
    pub fn running(&self) -> usize {
        self.running.get()
    }

    /// Callables waiting for a slot.
    #[inline]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Highest running count observed.
    #[inline]
    pub fn peak_running(&self) -> usize {
        self.peak.get()
    }

    /// Priority for admitted tasks.
    #[inline]
    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    /// Take every pending callable out of the queue.
    pub fn clear(&mut self) -> VecDeque<TaskBody> {
        std::mem::take(&mut self.queue)
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("pending", &self.queue.len())
            .field("running", &self.running.get())
            .field("concurrency", &self.concurrency)
            .finish()
    }
}
