//! Runtime errors

use std::fmt::Display;
use std::rc::Rc;

use thiserror::Error;

/// Result of running a task body.
pub type TaskResult = Result<super::scheduler::TaskOutcome, TaskError>;

/// Errors raised by task bodies, coroutine steps and promise rejections.
///
/// Cheap to clone so that a single rejection can be delivered to every
/// `catch_err` reaction and to a coroutine awaiting the same promise.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// The body returned an error.
    #[error("{0}")]
    Failed(Rc<anyhow::Error>),

    /// The body panicked; the panic was caught at the task boundary.
    #[error("task `{task}` panicked: {message}")]
    Panicked {
        /// Name of the task that panicked
        task: String,
        /// Panic payload, if it was a string
        message: String,
    },

    /// A promise was rejected with a plain message.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl TaskError {
    /// Build a `Failed` error from any displayable message.
    pub fn msg<M>(message: M) -> Self
    where
        M: Display + std::fmt::Debug + Send + Sync + 'static,
    {
        TaskError::Failed(Rc::new(anyhow::Error::msg(message)))
    }

    /// Build a rejection reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        TaskError::Rejected(reason.into())
    }

    /// Whether the error came from a caught panic.
    #[inline]
    pub fn is_panic(&self) -> bool {
        matches!(self, TaskError::Panicked { .. })
    }

    /// Convert a caught panic payload into an error.
    pub(crate) fn from_panic(
        task: &str,
        payload: Box<dyn std::any::Any + Send>,
    ) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        TaskError::Panicked {
            task: task.to_string(),
            message,
        }
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(e: anyhow::Error) -> Self {
        TaskError::Failed(Rc::new(e))
    }
}

impl From<std::io::Error> for TaskError {
    fn from(e: std::io::Error) -> Self {
        TaskError::Failed(Rc::new(e.into()))
    }
}

impl From<String> for TaskError {
    fn from(reason: String) -> Self {
        TaskError::Rejected(reason)
    }
}

impl From<&str> for TaskError {
    fn from(reason: &str) -> Self {
        TaskError::Rejected(reason.to_string())
    }
}
