//! Before/after observers fired around every executed task.

use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use super::task::Task;

/// When a hook fires relative to the task body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    /// Right before the body runs.
    Before,
    /// After the body returned, failed or panicked.
    After,
}

/// Hook callback.
pub type HookFn = Rc<dyn Fn(&Task)>;

/// Which tasks a hook observes.
#[derive(Clone, Default)]
pub enum HookFilter {
    /// Every task.
    #[default]
    All,
    /// Tasks whose name equals this string exactly.
    Name(String),
    /// Tasks accepted by a predicate.
    Predicate(Rc<dyn Fn(&Task) -> bool>),
}

impl HookFilter {
    /// Filter by an arbitrary predicate.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Task) -> bool + 'static,
    {
        HookFilter::Predicate(Rc::new(f))
    }

    /// Whether the filter accepts the task.
    pub fn matches(
        &self,
        task: &Task,
    ) -> bool {
        match self {
            HookFilter::All => true,
            HookFilter::Name(name) => name == task.name(),
            HookFilter::Predicate(pred) => pred(task),
        }
    }
}

impl fmt::Debug for HookFilter {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            HookFilter::All => f.write_str("All"),
            HookFilter::Name(name) => f.debug_tuple("Name").field(name).finish(),
            HookFilter::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<&str> for HookFilter {
    fn from(name: &str) -> Self {
        HookFilter::Name(name.to_string())
    }
}

impl From<String> for HookFilter {
    fn from(name: String) -> Self {
        HookFilter::Name(name)
    }
}

struct Registration {
    phase: HookPhase,
    filter: HookFilter,
    callback: HookFn,
}

/// Ordered list of hook registrations.
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Registration>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a registration.
    pub fn add(
        &mut self,
        phase: HookPhase,
        filter: HookFilter,
        callback: HookFn,
    ) {
        self.hooks.push(Registration {
            phase,
            filter,
            callback,
        });
    }

    /// Filters and callbacks registered for `phase`, in registration order.
    ///
    /// Returned by value so that the registry is not borrowed while filters
    /// and callbacks run; either may register further hooks.
    pub fn for_phase(
        &self,
        phase: HookPhase,
    ) -> SmallVec<[(HookFilter, HookFn); 4]> {
        self.hooks
            .iter()
            .filter(|h| h.phase == phase)
            .map(|h| (h.filter.clone(), h.callback.clone()))
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn clear(&mut self) {
        self.hooks.clear();
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("len", &self.hooks.len())
            .finish()
    }
}
