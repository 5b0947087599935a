//! Map with completion callback
//!
//! [`async_map`] runs one task per item. Each task receives a [`Done`]
//! completer for its slot; the final callback fires once every slot is
//! filled, with results in input order regardless of completion order.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::runtime::scheduler::TaskHandle;
use crate::runtime::Handle;

type OnDone<R> = Box<dyn FnOnce(Vec<R>)>;

struct MapState<R> {
    results: RefCell<Vec<Option<R>>>,
    remaining: Cell<usize>,
    on_done: RefCell<Option<OnDone<R>>>,
}

/// Completer for one item of an [`async_map`].
pub struct Done<R> {
    index: usize,
    state: Rc<MapState<R>>,
}

impl<R> Done<R> {
    /// Store the result for this item.
    pub fn complete(
        self,
        result: R,
    ) {
        let finished = {
            let mut results = self.state.results.borrow_mut();
            results[self.index] = Some(result);
            let left = self.state.remaining.get() - 1;
            self.state.remaining.set(left);
            if left > 0 {
                None
            } else {
                Some(std::mem::take(&mut *results))
            }
        };
        let Some(results) = finished else {
            return;
        };
        let on_done = self.state.on_done.borrow_mut().take();
        if let Some(on_done) = on_done {
            on_done(results.into_iter().flatten().collect());
        }
    }

    /// Input position of this item.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<R> fmt::Debug for Done<R> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Done").field("index", &self.index).finish()
    }
}

pub(crate) fn async_map<I, T, R, F, D>(
    runtime: &Handle,
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
    let items: Vec<T> = items.into_iter().collect();
    if items.is_empty() {
        on_done(Vec::new());
        return Vec::new();
    }

    let state = Rc::new(MapState {
        results: RefCell::new((0..items.len()).map(|_| None).collect()),
        remaining: Cell::new(items.len()),
        on_done: RefCell::new(Some(Box::new(on_done))),
    });
    let f = Rc::new(f);

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let done = Done {
                index,
                state: state.clone(),
            };
            let f = f.clone();
            runtime.submit(move || f(item, done))
        })
        .collect()
}
