//! The worker-side view of the channel pair.

use tokio::sync::mpsc;
use tracing::debug;

use super::{BoxError, WorkerError, WorkerEvent, WorkerId};

/// Handed to a script when its worker starts.
///
/// Dropping the scope (by returning from the script) closes the worker's end
/// of both channels.
#[derive(Debug)]
pub struct WorkerScope<M, R> {
    id: WorkerId,
    inbox: mpsc::UnboundedReceiver<M>,
    events: mpsc::UnboundedSender<WorkerEvent<R>>,
}

impl<M, R> WorkerScope<M, R> {
    pub(crate) fn new(
        id: WorkerId,
        inbox: mpsc::UnboundedReceiver<M>,
        events: mpsc::UnboundedSender<WorkerEvent<R>>,
    ) -> Self {
        Self { id, inbox, events }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Waits for the next message from the creator.
    ///
    /// Returns `None` once the creator dropped its handle.
    pub async fn recv(&mut self) -> Option<M> {
        self.inbox.recv().await
    }

    /// Sends a reply to the creator. Replies to a creator that has gone away
    /// are discarded.
    pub fn post_message(&self, reply: R) {
        if self.events.send(WorkerEvent::Message(reply)).is_err() {
            debug!(worker = %self.id, "reply dropped, creator gone");
        }
    }

    /// Reports an error without stopping the script.
    pub fn post_error(&self, error: impl Into<BoxError>) {
        let error = WorkerError::Script {
            id: self.id,
            message: error.into().to_string(),
        };
        if self.events.send(WorkerEvent::Error(error)).is_err() {
            debug!(worker = %self.id, "error dropped, creator gone");
        }
    }
}
