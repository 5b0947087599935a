//! Timer registry
//!
//! Holds pending one-shot and repeating timers. The registry itself never
//! runs callbacks: each loop iteration calls [`TimerRegistry::tick`], which
//! hands back the due callbacks as task bodies for the ready queue.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::runtime::error::TaskResult;
use crate::runtime::scheduler::TaskBody;

/// Timer identifier, assigned in increasing order per registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// Kind of timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fires once, then is removed.
    Timeout,
    /// Fires every period until cancelled.
    Interval,
}

/// Callback of a repeating timer.
pub type RepeatFn = Rc<RefCell<dyn FnMut() -> TaskResult>>;

enum Callback {
    Once(TaskBody),
    Repeat(RepeatFn),
}

struct TimerEntry {
    kind: TimerKind,
    /// `None` when the deadline is past what `Instant` can represent; such a
    /// timer never fires but stays pending until cancelled.
    due_at: Option<Instant>,
    period: Duration,
    callback: Callback,
}

/// A callback whose deadline has passed.
pub struct DueTimer {
    pub id: TimerId,
    pub kind: TimerKind,
    pub body: TaskBody,
}

impl fmt::Debug for DueTimer {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("DueTimer")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Pending timers keyed by id.
#[derive(Default)]
pub struct TimerRegistry {
    entries: BTreeMap<TimerId, TimerEntry>,
    next_id: u64,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Register a one-shot timer due at `now + delay`.
    pub fn set_timeout(
        &mut self,
        now: Instant,
        delay: Duration,
        body: TaskBody,
    ) -> TimerId {
        let id = self.allocate();
        self.entries.insert(
            id,
            TimerEntry {
                kind: TimerKind::Timeout,
                due_at: now.checked_add(delay),
                period: Duration::ZERO,
                callback: Callback::Once(body),
            },
        );
        id
    }

    /// Register a repeating timer first due at `now + period`.
    pub fn set_interval(
        &mut self,
        now: Instant,
        period: Duration,
        callback: RepeatFn,
    ) -> TimerId {
        let id = self.allocate();
        self.entries.insert(
            id,
            TimerEntry {
                kind: TimerKind::Interval,
                due_at: now.checked_add(period),
                period,
                callback: Callback::Repeat(callback),
            },
        );
        id
    }

    /// Remove a timer of either kind. Unknown or already removed ids are
    /// ignored; returns whether something was removed.
    pub fn cancel(
        &mut self,
        id: TimerId,
    ) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Collect every callback due at `now`, in ascending id order.
    ///
    /// Fired timeouts are removed. Intervals stay and move their deadline
    /// forward by exactly one period, so lateness does not accumulate.
    pub fn tick(
        &mut self,
        now: Instant,
    ) -> Vec<DueTimer> {
        let due: Vec<TimerId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.due_at.is_some_and(|due| now >= due))
            .map(|(id, _)| *id)
            .collect();

        let mut fired = Vec::with_capacity(due.len());
        for id in due {
            let Some(kind) = self.entries.get(&id).map(|entry| entry.kind) else {
                continue;
            };
            match kind {
                TimerKind::Timeout => {
                    if let Some(TimerEntry {
                        callback: Callback::Once(body),
                        ..
                    }) = self.entries.remove(&id)
                    {
                        fired.push(DueTimer {
                            id,
                            kind: TimerKind::Timeout,
                            body,
                        });
                    }
                }
                TimerKind::Interval => {
                    let Some(entry) = self.entries.get_mut(&id) else {
                        continue;
                    };
                    entry.due_at = entry.due_at.and_then(|due| due.checked_add(entry.period));
                    if let Callback::Repeat(callback) = &entry.callback {
                        let callback = callback.clone();
                        fired.push(DueTimer {
                            id,
                            kind: TimerKind::Interval,
                            body: Box::new(move || {
                                let mut f = callback.borrow_mut();
                                (&mut *f)()
                            }),
                        });
                    }
                }
            }
        }
        fired
    }

    /// Whether no timers remain.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of pending timers.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether `id` is still pending.
    #[inline]
    pub fn contains(
        &self,
        id: TimerId,
    ) -> bool {
        self.entries.contains_key(&id)
    }

    /// Earliest deadline among pending timers.
    pub fn next_due(&self) -> Option<Instant> {
        self.entries.values().filter_map(|entry| entry.due_at).min()
    }

    /// Remove every timer, returning how many were pending.
    pub fn clear(&mut self) -> usize {
        let entries = std::mem::take(&mut self.entries);
        entries.len()
    }
}

impl fmt::Debug for TimerRegistry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("TimerRegistry")
            .field("pending", &self.entries.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

#[cfg(test)]
mod tests;
