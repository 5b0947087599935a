//! Cross-thread submission
//!
//! Everything else in the runtime is confined to the loop thread. A
//! [`RemoteHandle`] is the one exception: it can be cloned into other OS
//! threads and pushes `Send` closures into a mutex-guarded inbox that the
//! loop drains into ordinary tasks once per iteration.

use std::fmt;
use std::sync::atomic::{fence, AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

/// A closure submitted from another thread.
pub type RemoteJob = Box<dyn FnOnce() + Send>;

/// Inbox shared between the loop and its remote handles.
#[derive(Default)]
pub(crate) struct Inbox {
    jobs: Mutex<Vec<RemoteJob>>,
    closed: AtomicBool,
}

impl Inbox {
    /// Take every queued job, in submission order.
    pub(crate) fn take(&self) -> Vec<RemoteJob> {
        std::mem::take(&mut *self.jobs.lock())
    }

    /// Whether no job is queued and no remote handle is alive.
    pub(crate) fn is_idle(self: &Arc<Self>) -> bool {
        // The loop's own reference is the only one left.
        let live = Arc::strong_count(self) > 1;
        // Pairs with the release decrement of a handle dropped right after
        // its last submit, so that submit is visible below.
        fence(Ordering::Acquire);
        !live && self.jobs.lock().is_empty()
    }

    /// Refuse further submissions and hand back whatever was queued.
    pub(crate) fn close(&self) -> Vec<RemoteJob> {
        let mut jobs = self.jobs.lock();
        self.closed.store(true, Ordering::Release);
        std::mem::take(&mut *jobs)
    }
}

/// Thread-safe handle for submitting work to a runtime.
#[derive(Clone)]
pub struct RemoteHandle {
    inbox: Arc<Inbox>,
}

impl RemoteHandle {
    pub(crate) fn new(inbox: Arc<Inbox>) -> Self {
        Self { inbox }
    }

    /// Queue `job` to run on the loop thread.
    ///
    /// Returns `false` if the runtime has been dropped; the job is dropped
    /// unrun.
    pub fn submit<F>(
        &self,
        job: F,
    ) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut jobs = self.inbox.jobs.lock();
        if self.inbox.closed.load(Ordering::Acquire) {
            trace!("remote submit after runtime drop");
            return false;
        }
        jobs.push(Box::new(job));
        true
    }

    /// Whether the runtime is still accepting work.
    pub fn is_closed(&self) -> bool {
        self.inbox.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for RemoteHandle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("RemoteHandle")
            .field("queued", &self.inbox.jobs.lock().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
