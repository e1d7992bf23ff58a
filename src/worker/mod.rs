//! Background workers — Tokio tasks with an inbound message channel and an
//! outbound event channel.
//!
//! A worker runs a [`Script`] and talks to its creator in both directions:
//!
//! - the creator sends messages with [`Worker::post_message`];
//! - the script receives them from its [`WorkerScope`] and answers with
//!   [`WorkerScope::post_message`] or [`WorkerScope::post_error`].
//!
//! A script that returns an error or panics produces one
//! [`WorkerEvent::Error`]. A terminated worker produces nothing further and
//! its event stream closes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::mpsc;

pub mod handle;
pub mod scope;
pub mod script;

pub use handle::Worker;
pub use scope::WorkerScope;
pub use script::{IntoScript, Script, ScriptFuture};

/// Boxed error returned by scripts.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Process-unique identifier of a spawned worker, used in logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Failures reported by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    #[error("worker {id} reported an error: {message}")]
    Script { id: WorkerId, message: String },

    #[error("worker {id} panicked: {message}")]
    Panicked { id: WorkerId, message: String },

    #[error("worker {id} closed without replying")]
    Closed { id: WorkerId },
}

impl WorkerError {
    /// The worker that produced this error.
    pub fn worker_id(&self) -> WorkerId {
        match self {
            Self::Script { id, .. } | Self::Panicked { id, .. } | Self::Closed { id } => *id,
        }
    }
}

/// Something a worker sent back to its creator.
#[derive(Debug)]
pub enum WorkerEvent<R> {
    Message(R),
    Error(WorkerError),
}

/// The receiving end of a worker's event channel.
#[derive(Debug)]
pub struct Events<R> {
    id: WorkerId,
    rx: mpsc::UnboundedReceiver<WorkerEvent<R>>,
}

impl<R> Events<R> {
    pub(crate) fn new(id: WorkerId, rx: mpsc::UnboundedReceiver<WorkerEvent<R>>) -> Self {
        Self { id, rx }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.id
    }

    /// Waits for the next event; `None` once the worker has finished or was
    /// terminated and every queued event was consumed.
    pub async fn next(&mut self) -> Option<WorkerEvent<R>> {
        self.rx.recv().await
    }

    /// Settles on the first event: a message resolves, an error rejects.
    ///
    /// # Errors
    ///
    /// Returns the worker's error, or [`WorkerError::Closed`] when the stream
    /// ends before anything arrives.
    pub async fn reply(mut self) -> Result<R, WorkerError> {
        match self.next().await {
            Some(WorkerEvent::Message(reply)) => Ok(reply),
            Some(WorkerEvent::Error(error)) => Err(error),
            None => Err(WorkerError::Closed { id: self.id }),
        }
    }
}

/// Locks a mutex, recovering the data if a callback panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
