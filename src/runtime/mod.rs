//! Runtime system
//!
//! The [`Runtime`] owns one scheduler context: the ready queue, the timer
//! registry, the worker pool, the remote inbox and the clock. Code running
//! inside tasks talks to the same context through a cloneable [`Handle`];
//! only the owning `Runtime` can drive the loop.
//!
//! One loop iteration ([`Runtime::run_step`]) runs the head of the ready
//! queue, then moves due timers, admitted pool work and remote submissions
//! into the ready queue.

pub mod clock;
pub mod coroutine;
pub mod error;
pub mod map;
pub mod promise;
pub mod remote;
pub mod scheduler;
pub mod timer;
pub mod worker;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::util::config::RuntimeConfig;
use clock::{Clock, SystemClock};
use coroutine::{Coroutine, CoroutineHandle};
use error::TaskError;
use map::Done;
use remote::{Inbox, RemoteHandle};
use scheduler::{
    boxed_body, HookFilter, HookPhase, IntoTaskResult, LoopState, Scheduler, SchedulerConfig,
    StatsSnapshot, Task, TaskBuilder, TaskHandle,
};
use timer::{RepeatFn, TimerId, TimerRegistry};
use worker::WorkerPool;

/// Everything one loop owns.
struct Context {
    scheduler: Scheduler,
    timers: RefCell<TimerRegistry>,
    pool: RefCell<WorkerPool>,
    inbox: Arc<Inbox>,
    clock: Rc<dyn Clock>,
    config: SchedulerConfig,
    stopped: Cell<bool>,
}

/// Cloneable reference to a runtime context.
///
/// Everything a task may do to the runtime goes through a `Handle`:
/// submitting tasks, timers, pool work and coroutines, registering hooks,
/// and requesting a stop.
#[derive(Clone)]
pub struct Handle {
    ctx: Rc<Context>,
}

/// Non-owning [`Handle`].
#[derive(Clone)]
pub struct WeakHandle {
    ctx: Weak<Context>,
}

impl WeakHandle {
    /// The handle, if the runtime is still alive.
    pub fn upgrade(&self) -> Option<Handle> {
        self.ctx.upgrade().map(|ctx| Handle { ctx })
    }
}

impl fmt::Debug for WeakHandle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("WeakHandle")
            .field("alive", &(self.ctx.strong_count() > 0))
            .finish()
    }
}

impl fmt::Debug for Handle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Handle")
            .field("scheduler", &self.ctx.scheduler)
            .field("timers", &self.ctx.timers.borrow())
            .field("pool", &self.ctx.pool.borrow())
            .finish()
    }
}

impl Handle {
    fn default_builder(&self) -> TaskBuilder {
        TaskBuilder::new().priority(self.ctx.config.default_priority)
    }

    /// Submit a body with the default priority and a generated name.
    pub fn submit<F, R>(
        &self,
        body: F,
    ) -> TaskHandle
    where
        F: FnOnce() -> R + 'static,
        R: IntoTaskResult,
    {
        self.submit_task(self.default_builder().build(boxed_body(body)))
    }

    /// Submit a body with an explicit name and/or priority.
    pub fn submit_with<F, R>(
        &self,
        builder: TaskBuilder,
        body: F,
    ) -> TaskHandle
    where
        F: FnOnce() -> R + 'static,
        R: IntoTaskResult,
    {
        self.submit_task(builder.build(boxed_body(body)))
    }

    /// Submit a task that is already built.
    pub fn submit_task(
        &self,
        task: Task,
    ) -> TaskHandle {
        self.ctx.scheduler.submit(task)
    }

    /// Register a hook for every task.
    pub fn add_hook<F>(
        &self,
        phase: HookPhase,
        callback: F,
    ) where
        F: Fn(&Task) + 'static,
    {
        self.add_hook_with(phase, HookFilter::All, callback);
    }

    /// Register a hook for the tasks matching `filter`.
    pub fn add_hook_with<F>(
        &self,
        phase: HookPhase,
        filter: impl Into<HookFilter>,
        callback: F,
    ) where
        F: Fn(&Task) + 'static,
    {
        self.ctx
            .scheduler
            .add_hook(phase, filter.into(), Rc::new(callback));
    }

    /// Install the error handler. Replaces any previous handler.
    pub fn on_error<F>(
        &self,
        handler: F,
    ) where
        F: Fn(&TaskError) + 'static,
    {
        self.ctx.scheduler.on_error(Rc::new(handler));
    }

    /// Run `body` once, `delay` from now.
    pub fn set_timeout<F, R>(
        &self,
        delay: Duration,
        body: F,
    ) -> TimerId
    where
        F: FnOnce() -> R + 'static,
        R: IntoTaskResult,
    {
        let now = self.now();
        let id = self
            .ctx
            .timers
            .borrow_mut()
            .set_timeout(now, delay, boxed_body(body));
        trace!(timer = %id, ?delay, "set_timeout");
        id
    }

    /// Run `callback` every `period` until the timer is cleared.
    pub fn set_interval<F, R>(
        &self,
        period: Duration,
        mut callback: F,
    ) -> TimerId
    where
        F: FnMut() -> R + 'static,
        R: IntoTaskResult,
    {
        let now = self.now();
        let repeat: RepeatFn = Rc::new(RefCell::new(move || callback().into_task_result()));
        let id = self
            .ctx
            .timers
            .borrow_mut()
            .set_interval(now, period, repeat);
        trace!(timer = %id, ?period, "set_interval");
        id
    }

    /// Remove a timer. Unknown or already removed ids are ignored.
    pub fn clear_timer(
        &self,
        id: TimerId,
    ) -> bool {
        self.ctx.timers.borrow_mut().cancel(id)
    }

    /// The worker pool.
    pub fn workers(&self) -> Workers<'_> {
        Workers { handle: self }
    }

    /// Start a coroutine with the default priority.
    pub fn spawn_coroutine<C>(
        &self,
        co: C,
    ) -> CoroutineHandle<C::Output>
    where
        C: Coroutine + 'static,
        C::Value: Clone + 'static,
        C::Output: 'static,
    {
        coroutine::spawn(self, self.default_builder(), co)
    }

    /// Start a coroutine with an explicit name and/or priority.
    pub fn spawn_coroutine_with<C>(
        &self,
        builder: TaskBuilder,
        co: C,
    ) -> CoroutineHandle<C::Output>
    where
        C: Coroutine + 'static,
        C::Value: Clone + 'static,
        C::Output: 'static,
    {
        coroutine::spawn(self, builder, co)
    }

    /// Map `items` through `f`, one task per item; `on_done` receives the
    /// results in input order once every item has completed.
    pub fn async_map<I, T, R, F, D>(
        &self,
        items: I,
        f: F,
        on_done: D,
    ) -> Vec<TaskHandle>
    where
        I: IntoIterator<Item = T>,
        T: 'static,
        R: 'static,
        F: Fn(T, Done<R>) + 'static,
        D: FnOnce(Vec<R>) + 'static,
    {
        map::async_map(self, items, f, on_done)
    }

    /// A `Send` handle for submitting work from other threads.
    pub fn remote(&self) -> RemoteHandle {
        RemoteHandle::new(self.ctx.inbox.clone())
    }

    /// Ask the running loop to return after the current iteration.
    pub fn stop(&self) {
        debug!("stop requested");
        self.ctx.stopped.set(true);
    }

    /// Current time on the runtime's clock.
    #[inline]
    pub fn now(&self) -> Instant {
        self.ctx.clock.now()
    }

    /// Counters since the runtime was created.
    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.scheduler.stats().snapshot()
    }

    /// Ready-queue state.
    #[inline]
    pub fn state(&self) -> LoopState {
        self.ctx.scheduler.state()
    }

    /// Whether nothing is ready, no timer is pending, the pool is idle and
    /// no remote work can arrive.
    pub fn is_idle(&self) -> bool {
        !self.ctx.scheduler.has_ready()
            && self.ctx.timers.borrow().is_idle()
            && self.ctx.pool.borrow().is_idle()
            && self.ctx.inbox.is_idle()
    }

    /// Non-owning handle, for state that must not keep the runtime alive.
    pub fn downgrade(&self) -> WeakHandle {
        WeakHandle {
            ctx: Rc::downgrade(&self.ctx),
        }
    }

    /// Move due timers into the ready queue.
    fn fire_timers(&self) {
        let now = self.now();
        let due = self.ctx.timers.borrow_mut().tick(now);
        for timer in due {
            self.ctx.scheduler.stats().record_timer_fired();
            self.submit_task(
                self.default_builder()
                    .name(timer.id.to_string())
                    .build(timer.body),
            );
        }
    }

    /// Admit pool work while slots are free.
    fn admit_pool(&self) {
        let (admitted, priority) = {
            let mut pool = self.ctx.pool.borrow_mut();
            (pool.admit(), pool.priority())
        };
        for body in admitted {
            self.ctx.scheduler.stats().record_admitted();
            self.submit_task(
                TaskBuilder::new()
                    .name("worker")
                    .priority(priority)
                    .build(body),
            );
        }
    }

    /// Move remote submissions into the ready queue.
    fn drain_inbox(&self) {
        for job in self.ctx.inbox.take() {
            self.submit_task(
                self.default_builder()
                    .name("remote")
                    .build(boxed_body(job)),
            );
        }
    }

    /// How long the loop may sleep: the tick, or less if a timer is due
    /// sooner.
    fn idle_wait(&self) -> Duration {
        let tick = self.ctx.config.tick();
        match self.ctx.timers.borrow().next_due() {
            Some(due) => due.saturating_duration_since(self.now()).min(tick),
            None => tick,
        }
    }
}

/// Worker pool view returned by [`Handle::workers`].
#[derive(Debug, Clone, Copy)]
pub struct Workers<'a> {
    handle: &'a Handle,
}

impl Workers<'_> {
    /// Change the limit for future admissions.
    pub fn set_concurrency(
        &self,
        n: usize,
    ) {
        self.handle.ctx.pool.borrow_mut().set_concurrency(n);
    }

    /// Queue a callable for admission.
    pub fn add<F, R>(
        &self,
        job: F,
    ) where
        F: FnOnce() -> R + 'static,
        R: IntoTaskResult,
    {
        self.handle.ctx.pool.borrow_mut().add(boxed_body(job));
    }

    /// Queue a callable after `delay`.
    pub fn schedule<F, R>(
        &self,
        job: F,
        delay: Duration,
    ) -> TimerId
    where
        F: FnOnce() -> R + 'static,
        R: IntoTaskResult,
    {
        let handle = self.handle.downgrade();
        self.handle.set_timeout(delay, move || {
            if let Some(handle) = handle.upgrade() {
                handle.workers().add(job);
            }
        })
    }

    /// Admit pending callables now instead of waiting for the next tick.
    pub fn run_queue(&self) {
        self.handle.admit_pool();
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.handle.ctx.pool.borrow().is_idle()
    }

    #[inline]
    pub fn running(&self) -> usize {
        self.handle.ctx.pool.borrow().running()
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.handle.ctx.pool.borrow().pending()
    }

    #[inline]
    pub fn concurrency(&self) -> usize {
        self.handle.ctx.pool.borrow().concurrency()
    }

    #[inline]
    pub fn peak_running(&self) -> usize {
        self.handle.ctx.pool.borrow().peak_running()
    }
}

/// Builder for a [`Runtime`] with a custom clock.
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    clock: Rc<dyn Clock>,
}

impl RuntimeBuilder {
    pub fn config(
        mut self,
        config: RuntimeConfig,
    ) -> Self {
        self.config = config;
        self
    }

    pub fn clock(
        mut self,
        clock: impl Clock + 'static,
    ) -> Self {
        self.clock = Rc::new(clock);
        self
    }

    pub fn build(self) -> Runtime {
        let ctx = Context {
            scheduler: Scheduler::new(),
            timers: RefCell::new(TimerRegistry::new()),
            pool: RefCell::new(WorkerPool::new(&self.config.workers)),
            inbox: Arc::new(Inbox::default()),
            clock: self.clock,
            config: self.config.scheduler,
            stopped: Cell::new(false),
        };
        debug!(
            tick_ms = ctx.config.tick_ms,
            concurrency = ctx.pool.borrow().concurrency(),
            "runtime created"
        );
        Runtime {
            handle: Handle { ctx: Rc::new(ctx) },
        }
    }
}

impl fmt::Debug for RuntimeBuilder {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("RuntimeBuilder")
            .field("config", &self.config)
            .finish()
    }
}

/// Owner of a scheduler context and the only way to run its loop.
///
/// Dereferences to [`Handle`]. Dropping the runtime clears the ready queue,
/// timers, pool, inbox, hooks and error handler, which also breaks any
/// reference cycle between queued work and the context.
pub struct Runtime {
    handle: Handle,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Runtime {
    type Target = Handle;

    fn deref(&self) -> &Handle {
        &self.handle
    }
}

impl fmt::Debug for Runtime {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_tuple("Runtime").field(&self.handle).finish()
    }
}

impl Runtime {
    /// Runtime with the default configuration and the system clock.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder {
            config: RuntimeConfig::default(),
            clock: Rc::new(SystemClock),
        }
    }

    /// A handle to give to tasks.
    #[inline]
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// One loop iteration.
    pub fn run_step(&self) -> LoopState {
        let handle = &self.handle;
        handle.ctx.scheduler.stats().record_tick();
        handle.ctx.scheduler.run_next();
        handle.fire_timers();
        handle.admit_pool();
        handle.drain_inbox();
        handle.state()
    }

    /// Run until there is nothing left to do, or until stopped.
    ///
    /// When nothing is ready, sleeps on the clock for the tick or until the
    /// next timer is due, whichever comes first.
    pub fn run(&self) {
        debug!("run");
        loop {
            self.run_step();
            if self.take_stop() || self.is_idle() {
                break;
            }
            if !self.ctx.scheduler.has_ready() {
                self.sleep(self.idle_wait());
            }
        }
    }

    /// Run until the ready queue is empty. Never sleeps; timers that are
    /// not yet due stay pending.
    pub fn drain(&self) {
        while self.ctx.scheduler.has_ready() {
            self.run_step();
            if self.take_stop() {
                break;
            }
        }
    }

    /// Run until [`Handle::stop`] is called.
    pub fn run_forever(&self) {
        debug!("run_forever");
        loop {
            self.run_step();
            if self.take_stop() {
                break;
            }
            if !self.ctx.scheduler.has_ready() {
                self.sleep(self.idle_wait());
            }
        }
    }

    /// Run until stopped or until `duration` has passed on the clock.
    pub fn run_for(
        &self,
        duration: Duration,
    ) {
        let deadline = self.now() + duration;
        debug!(?duration, "run_for");
        loop {
            self.run_step();
            if self.take_stop() {
                break;
            }
            let now = self.now();
            if now >= deadline {
                break;
            }
            if !self.ctx.scheduler.has_ready() {
                self.sleep(self.idle_wait().min(deadline - now));
            }
        }
    }

    fn take_stop(&self) -> bool {
        self.ctx.stopped.replace(false)
    }

    fn sleep(
        &self,
        wait: Duration,
    ) {
        if !wait.is_zero() {
            self.ctx.clock.sleep(wait);
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let ctx = &self.handle.ctx;
        ctx.scheduler.clear();
        let timers = std::mem::take(&mut *ctx.timers.borrow_mut());
        let pool = ctx.pool.borrow_mut().clear();
        let remote = ctx.inbox.close();
        debug!(
            timers = timers.len(),
            pool = pool.len(),
            remote = remote.len(),
            "runtime torn down"
        );
    }
}
