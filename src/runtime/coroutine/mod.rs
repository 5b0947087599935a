//! Coroutine driver
//!
//! A coroutine is an explicit step machine. The driver calls
//! [`Coroutine::resume`] once per task and decides from the returned
//! [`Step`] how the next resumption is scheduled:
//!
//! | Step | Next resumption |
//! |------|-----------------|
//! | `Yield(v)` | next turn of the loop, with `Resume::Value(v)` |
//! | `Await(p)` | when `p` settles, with its value or `Resume::Error` |
//! | `Callback(f)` | when `f`'s [`Resumer`] is invoked |
//! | `Done(out)` | never; the completion promise fulfills with `out` |
//!
//! Every resumption runs as a fresh task carrying the coroutine's name and
//! priority. An `Err` from a step ends the coroutine, rejects its completion
//! promise and is reported like any other task failure.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tracing::trace;

use crate::runtime::error::{TaskError, TaskResult};
use crate::runtime::promise::{Promise, Resolver};
use crate::runtime::scheduler::{TaskBody, TaskBuilder, TaskHandle, TaskOutcome};
use crate::runtime::WeakHandle;

/// Input to a resumption.
#[derive(Debug)]
pub enum Resume<T> {
    /// First resumption.
    Start,
    /// A yielded value coming back, an awaited value or a callback result.
    Value(T),
    /// The awaited promise rejected, or the callback reported failure.
    Error(TaskError),
}

/// What a coroutine wants after a resumption.
pub enum Step<T, O> {
    /// Resume on the next turn with this value.
    Yield(T),
    /// Resume once the promise settles.
    Await(Promise<T>),
    /// Hand a [`Resumer`] to the function; resume when it is invoked.
    Callback(Box<dyn FnOnce(Resumer<T>)>),
    /// Finished.
    Done(O),
}

impl<T, O> Step<T, O> {
    /// Box a callback step.
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(Resumer<T>) + 'static,
    {
        Step::Callback(Box::new(f))
    }
}

impl<T: fmt::Debug, O: fmt::Debug> fmt::Debug for Step<T, O> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Step::Yield(v) => f.debug_tuple("Yield").field(v).finish(),
            Step::Await(p) => f.debug_tuple("Await").field(p).finish(),
            Step::Callback(_) => f.write_str("Callback(..)"),
            Step::Done(out) => f.debug_tuple("Done").field(out).finish(),
        }
    }
}

/// A resumable computation.
pub trait Coroutine {
    /// Values passed in and out at suspension points.
    type Value;
    /// Final result.
    type Output;

    /// Run until the next suspension point.
    fn resume(
        &mut self,
        input: Resume<Self::Value>,
    ) -> Result<Step<Self::Value, Self::Output>, TaskError>;
}

/// Coroutine backed by a closure. See [`from_fn`].
pub struct FnCoroutine<F, T, O> {
    f: F,
    _marker: PhantomData<fn(T) -> O>,
}

impl<F, T, O> Coroutine for FnCoroutine<F, T, O>
where
    F: FnMut(Resume<T>) -> Result<Step<T, O>, TaskError>,
{
    type Value = T;
    type Output = O;

    fn resume(
        &mut self,
        input: Resume<T>,
    ) -> Result<Step<T, O>, TaskError> {
        (self.f)(input)
    }
}

/// Build a coroutine from a closure that keeps its own state.
pub fn from_fn<F, T, O>(f: F) -> FnCoroutine<F, T, O>
where
    F: FnMut(Resume<T>) -> Result<Step<T, O>, TaskError>,
{
    FnCoroutine {
        f,
        _marker: PhantomData,
    }
}

/// One-shot continuation handed out by [`Step::Callback`].
///
/// Dropping it without calling leaves the coroutine parked forever.
pub struct Resumer<T> {
    target: Box<dyn FnOnce(Resume<T>)>,
}

impl<T> Resumer<T> {
    /// Resume the coroutine with a value.
    pub fn resume(
        self,
        value: T,
    ) {
        (self.target)(Resume::Value(value))
    }

    /// Resume the coroutine with an error.
    pub fn fail(
        self,
        err: impl Into<TaskError>,
    ) {
        (self.target)(Resume::Error(err.into()))
    }
}

impl<T> fmt::Debug for Resumer<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str("Resumer(..)")
    }
}

/// Returned by `spawn_coroutine`.
pub struct CoroutineHandle<O> {
    /// Handle of the first step; cancelling it before it runs prevents the
    /// coroutine from starting.
    pub task: TaskHandle,
    /// Fulfills on `Done`, rejects when a step fails.
    pub completion: Promise<O>,
}

impl<O> fmt::Debug for CoroutineHandle<O> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("CoroutineHandle")
            .field("task", &self.task)
            .field("completion", &self.completion)
            .finish()
    }
}

struct Driver<C: Coroutine> {
    co: RefCell<C>,
    runtime: WeakHandle,
    builder: TaskBuilder,
    name: Rc<str>,
    completion: Resolver<C::Output>,
}

impl<C> Driver<C>
where
    C: Coroutine + 'static,
    C::Value: Clone + 'static,
    C::Output: 'static,
{
    fn body(
        self: &Rc<Self>,
        input: Resume<C::Value>,
    ) -> TaskBody {
        let driver = self.clone();
        Box::new(move || driver.step(input))
    }

    /// Queue a resumption as a new task.
    fn schedule(
        self: &Rc<Self>,
        input: Resume<C::Value>,
    ) {
        let Some(runtime) = self.runtime.upgrade() else {
            trace!(coroutine = %self.name, "runtime gone; resumption dropped");
            return;
        };
        runtime.submit_task(self.builder.clone().build(self.body(input)));
    }

    fn step(
        self: &Rc<Self>,
        input: Resume<C::Value>,
    ) -> TaskResult {
        // A panicking step must still reject the completion promise.
        let step = panic::catch_unwind(AssertUnwindSafe(|| self.co.borrow_mut().resume(input)))
            .unwrap_or_else(|payload| Err(TaskError::from_panic(&self.name, payload)));

        match step {
            Ok(Step::Yield(value)) => Ok(TaskOutcome::Suspended(self.body(Resume::Value(value)))),
            Ok(Step::Await(promise)) => {
                let on_value = self.clone();
                let on_error = self.clone();
                promise
                    .then(move |value| on_value.schedule(Resume::Value(value.clone())))
                    .catch_err(move |err| on_error.schedule(Resume::Error(err.clone())));
                Ok(TaskOutcome::Complete)
            }
            Ok(Step::Callback(thunk)) => {
                let driver = self.clone();
                thunk(Resumer {
                    target: Box::new(move |input| driver.schedule(input)),
                });
                Ok(TaskOutcome::Complete)
            }
            Ok(Step::Done(output)) => {
                trace!(coroutine = %self.name, "done");
                self.completion.resolve(output);
                Ok(TaskOutcome::Complete)
            }
            Err(err) => {
                self.completion.reject(err.clone());
                Err(err)
            }
        }
    }
}

/// Submit the first step of `co`.
pub(crate) fn spawn<C>(
    runtime: &crate::runtime::Handle,
    builder: TaskBuilder,
    co: C,
) -> CoroutineHandle<C::Output>
where
    C: Coroutine + 'static,
    C::Value: Clone + 'static,
    C::Output: 'static,
{
    let (completion, resolver) = Promise::pending();
    // The first task fixes the name every later resumption reuses.
    let mut first = builder.build(Box::new(|| Ok(TaskOutcome::Complete)));
    let driver = Rc::new(Driver {
        co: RefCell::new(co),
        runtime: runtime.downgrade(),
        builder: first.continuation_builder(),
        name: Rc::from(first.name()),
        completion: resolver,
    });
    first.set_body(driver.body(Resume::Start));
    let task = runtime.submit_task(first);

    CoroutineHandle { task, completion }
}
