//! Combinators over several promises.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::Promise;

/// Collects one value per input position and reports when every slot is
/// filled.
struct Slots<T> {
    values: RefCell<Vec<Option<T>>>,
    remaining: Cell<usize>,
}

impl<T: Clone> Slots<T> {
    fn new(n: usize) -> Rc<Self> {
        Rc::new(Self {
            values: RefCell::new(vec![None; n]),
            remaining: Cell::new(n),
        })
    }

    /// Store `value` at `index`; returns the full vector once the last
    /// slot is filled.
    fn fill(
        &self,
        index: usize,
        value: &T,
    ) -> Option<Vec<T>> {
        {
            let mut values = self.values.borrow_mut();
            if values[index].is_some() {
                return None;
            }
            values[index] = Some(value.clone());
        }
        let left = self.remaining.get() - 1;
        self.remaining.set(left);
        if left > 0 {
            return None;
        }
        let values = std::mem::take(&mut *self.values.borrow_mut());
        Some(values.into_iter().flatten().collect())
    }
}

impl<T: Clone + 'static, E: 'static> Promise<T, E> {
    /// Invoke `callback` once every promise has fulfilled, with the values
    /// in input order.
    ///
    /// An empty input fires immediately with an empty vector. A rejection
    /// never fires the callback; use [`Promise::join_all`] to observe one.
    pub fn all<F>(
        promises: &[Promise<T, E>],
        callback: F,
    ) where
        F: FnOnce(Vec<T>) + 'static,
    {
        if promises.is_empty() {
            callback(Vec::new());
            return;
        }

        let slots = Slots::new(promises.len());
        let callback = Rc::new(RefCell::new(Some(callback)));
        for (index, promise) in promises.iter().enumerate() {
            let slots = slots.clone();
            let callback = callback.clone();
            promise.then(move |value| {
                if let Some(values) = slots.fill(index, value) {
                    let callback = callback.borrow_mut().take();
                    if let Some(callback) = callback {
                        callback(values);
                    }
                }
            });
        }
    }

    /// Invoke `callback` once, with the first value to fulfill.
    ///
    /// Rejections are ignored. An empty input never fires.
    pub fn race<F>(
        promises: &[Promise<T, E>],
        callback: F,
    ) where
        F: FnOnce(&T) + 'static,
    {
        let callback = Rc::new(RefCell::new(Some(callback)));
        for promise in promises {
            let callback = callback.clone();
            promise.then(move |value| {
                let callback = callback.borrow_mut().take();
                if let Some(callback) = callback {
                    callback(value);
                }
            });
        }
    }

    /// Invoke `callback` for every promise that fulfills, in settlement
    /// order.
    pub fn any<F>(
        promises: &[Promise<T, E>],
        callback: F,
    ) where
        F: Fn(&T) + 'static,
    {
        let callback = Rc::new(callback);
        for promise in promises {
            let callback = callback.clone();
            promise.then(move |value| callback(value));
        }
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Promise<T, E> {
    /// A promise for every value in input order that rejects with the
    /// first rejection among the inputs.
    pub fn join_all(promises: &[Promise<T, E>]) -> Promise<Vec<T>, E> {
        let (joined, resolver) = Promise::pending();
        if promises.is_empty() {
            resolver.resolve(Vec::new());
            return joined;
        }

        let slots = Slots::new(promises.len());
        for (index, promise) in promises.iter().enumerate() {
            let slots = slots.clone();
            let on_value = resolver.clone();
            let on_error = resolver.clone();
            promise
                .then(move |value| {
                    if let Some(values) = slots.fill(index, value) {
                        on_value.resolve(values);
                    }
                })
                .catch_err(move |err| {
                    on_error.reject(err.clone());
                });
        }
        joined
    }
}
