//! One-shot promises
//!
//! A [`Promise`] settles exactly once, to a value or an error. Reactions
//! attached before settlement are queued and fire in attachment order when
//! it settles; reactions attached afterwards fire immediately, in the
//! caller's context. Chaining is non-transforming: `then` and `catch_err`
//! return the same promise, and sequencing several promises is done by
//! nesting.
//!
//! Promises are single-threaded (`Rc` based) and are cheap to clone; every
//! clone observes the same settlement.

mod combinators;

use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::runtime::error::TaskError;

/// Promise settlement state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

type FulfillReaction<T> = Box<dyn FnOnce(&T)>;
type RejectReaction<E> = Box<dyn FnOnce(&E)>;

enum Inner<T, E> {
    Pending {
        on_fulfilled: Vec<FulfillReaction<T>>,
        on_rejected: Vec<RejectReaction<E>>,
    },
    Fulfilled(Rc<T>),
    Rejected(Rc<E>),
}

impl<T, E> Inner<T, E> {
    fn state(&self) -> PromiseState {
        match self {
            Inner::Pending { .. } => PromiseState::Pending,
            Inner::Fulfilled(_) => PromiseState::Fulfilled,
            Inner::Rejected(_) => PromiseState::Rejected,
        }
    }
}

/// A value that becomes available later, or an error.
pub struct Promise<T, E = TaskError> {
    inner: Rc<RefCell<Inner<T, E>>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.state())
            .finish()
    }
}

impl<T: 'static, E: 'static> Promise<T, E> {
    /// Run `executor` synchronously with a resolver for the new promise.
    ///
    /// An `Err` returned by the executor, or a panic inside it, rejects the
    /// promise unless the executor already settled it.
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(Resolver<T, E>) -> Result<(), E>,
        E: From<TaskError>,
    {
        let (promise, resolver) = Self::pending();
        let settle = resolver.clone();
        let result = panic::catch_unwind(AssertUnwindSafe(move || executor(settle)))
            .unwrap_or_else(|payload| {
                Err(TaskError::from_panic("promise executor", payload).into())
            });
        if let Err(err) = result {
            resolver.reject(err);
        }
        promise
    }

    /// A pending promise and the resolver that settles it.
    pub fn pending() -> (Self, Resolver<T, E>) {
        let promise = Self {
            inner: Rc::new(RefCell::new(Inner::Pending {
                on_fulfilled: Vec::new(),
                on_rejected: Vec::new(),
            })),
        };
        let resolver = Resolver {
            promise: promise.clone(),
        };
        (promise, resolver)
    }

    /// An already fulfilled promise.
    pub fn resolved(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner::Fulfilled(Rc::new(value)))),
        }
    }

    /// An already rejected promise.
    pub fn rejected(err: E) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner::Rejected(Rc::new(err)))),
        }
    }

    /// Fulfill the promise. Returns `false` if it was already settled, in
    /// which case nothing happens.
    pub fn resolve(
        &self,
        value: T,
    ) -> bool {
        let value = Rc::new(value);
        let previous = {
            let mut inner = self.inner.borrow_mut();
            if inner.state() != PromiseState::Pending {
                return false;
            }
            std::mem::replace(&mut *inner, Inner::Fulfilled(value.clone()))
        };
        if let Inner::Pending { on_fulfilled, .. } = previous {
            for reaction in on_fulfilled {
                reaction(&value);
            }
        }
        true
    }

    /// Reject the promise. Returns `false` if it was already settled.
    pub fn reject(
        &self,
        err: E,
    ) -> bool {
        let err = Rc::new(err);
        let previous = {
            let mut inner = self.inner.borrow_mut();
            if inner.state() != PromiseState::Pending {
                return false;
            }
            std::mem::replace(&mut *inner, Inner::Rejected(err.clone()))
        };
        if let Inner::Pending { on_rejected, .. } = previous {
            for reaction in on_rejected {
                reaction(&err);
            }
        }
        true
    }

    /// React to fulfillment.
    pub fn then<F>(
        &self,
        f: F,
    ) -> &Self
    where
        F: FnOnce(&T) + 'static,
    {
        let value = {
            let mut inner = self.inner.borrow_mut();
            match &mut *inner {
                Inner::Pending { on_fulfilled, .. } => {
                    on_fulfilled.push(Box::new(f));
                    return self;
                }
                Inner::Fulfilled(value) => value.clone(),
                Inner::Rejected(_) => return self,
            }
        };
        f(&value);
        self
    }

    /// React to rejection.
    pub fn catch_err<F>(
        &self,
        f: F,
    ) -> &Self
    where
        F: FnOnce(&E) + 'static,
    {
        let err = {
            let mut inner = self.inner.borrow_mut();
            match &mut *inner {
                Inner::Pending { on_rejected, .. } => {
                    on_rejected.push(Box::new(f));
                    return self;
                }
                Inner::Rejected(err) => err.clone(),
                Inner::Fulfilled(_) => return self,
            }
        };
        f(&err);
        self
    }

}

impl<T, E> Promise<T, E> {
    #[inline]
    pub fn state(&self) -> PromiseState {
        self.inner.borrow().state()
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.state() == PromiseState::Pending
    }

    /// The fulfilled value, if any.
    pub fn value(&self) -> Option<Rc<T>> {
        match &*self.inner.borrow() {
            Inner::Fulfilled(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// The rejection, if any.
    pub fn error(&self) -> Option<Rc<E>> {
        match &*self.inner.borrow() {
            Inner::Rejected(err) => Some(err.clone()),
            _ => None,
        }
    }

    /// Whether two handles refer to the same promise.
    #[inline]
    pub fn ptr_eq(
        &self,
        other: &Self,
    ) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Settles one promise. Cloneable; the first settlement wins.
pub struct Resolver<T, E = TaskError> {
    promise: Promise<T, E>,
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("state", &self.promise.state())
            .finish()
    }
}

impl<T: 'static, E: 'static> Resolver<T, E> {
    /// Fulfill the promise; no-op once settled.
    #[inline]
    pub fn resolve(
        &self,
        value: T,
    ) -> bool {
        self.promise.resolve(value)
    }

    /// Reject the promise; no-op once settled.
    #[inline]
    pub fn reject(
        &self,
        err: E,
    ) -> bool {
        self.promise.reject(err)
    }

    #[inline]
    pub fn is_settled(&self) -> bool {
        !self.promise.is_pending()
    }

    /// The promise this resolver settles.
    #[inline]
    pub fn promise(&self) -> Promise<T, E> {
        self.promise.clone()
    }
}

#[cfg(test)]
mod tests;
