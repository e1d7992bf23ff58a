//! The creator-side handle to a running worker.

use std::any::Any;
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use super::{Events, Script, WorkerError, WorkerEvent, WorkerId, WorkerScope, lock};

type MessageCallback<R> = Arc<dyn Fn(R) + Send + Sync + 'static>;
type ErrorCallback = Arc<dyn Fn(&WorkerError) + Send + Sync + 'static>;

// Callback slots; a later registration replaces the earlier one.
struct Callbacks<R> {
    on_message: Mutex<Option<MessageCallback<R>>>,
    on_error: Mutex<Option<ErrorCallback>>,
}

impl<R> Callbacks<R> {
    fn dispatch(&self, id: WorkerId, event: WorkerEvent<R>) {
        match event {
            WorkerEvent::Message(reply) => {
                // Clone out of the slot so a callback may re-register itself.
                let callback = lock(&self.on_message).clone();
                match callback {
                    Some(callback) => callback(reply),
                    None => debug!(worker = %id, "message dropped, no callback registered"),
                }
            }
            WorkerEvent::Error(error) => {
                let callback = lock(&self.on_error).clone();
                match callback {
                    Some(callback) => callback(&error),
                    None => debug!(worker = %id, error = %error, "error dropped, no callback registered"),
                }
            }
        }
    }
}

/// A running worker.
///
/// Events can be consumed in one of two ways: by taking the raw stream with
/// [`take_events`](Self::take_events), or by registering callbacks with
/// [`on_message`](Self::on_message) / [`on_error`](Self::on_error), which
/// start a task forwarding events to them. Whichever happens first owns the
/// stream.
pub struct Worker<M, R> {
    id: WorkerId,
    script_id: u64,
    runtime: Handle,
    inbox: mpsc::UnboundedSender<M>,
    events: Mutex<Option<Events<R>>>,
    callbacks: Arc<Callbacks<R>>,
    task: AbortHandle,
    forwarder: Mutex<Option<AbortHandle>>,
}

impl<M, R> Worker<M, R>
where
    M: Send + 'static,
    R: Send + 'static,
{
    /// Spawns a worker running `script` on `runtime`.
    ///
    /// The script starts immediately. A supervisor task turns a returned error
    /// or a panic into a [`WorkerEvent::Error`]; cancellation by
    /// [`terminate`](Self::terminate) produces no event.
    pub fn spawn(script: &Script<M, R>, runtime: &Handle) -> Self {
        let id = WorkerId::next();
        let (inbox, inbox_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let scope = WorkerScope::new(id, inbox_rx, events_tx.clone());
        let task = runtime.spawn(script.call(scope));
        let abort = task.abort_handle();

        runtime.spawn(async move {
            let error = match task.await {
                Ok(Ok(())) => {
                    debug!(worker = %id, "script finished");
                    return;
                }
                Ok(Err(e)) => WorkerError::Script {
                    id,
                    message: e.to_string(),
                },
                Err(e) if e.is_panic() => WorkerError::Panicked {
                    id,
                    message: panic_message(e.into_panic()),
                },
                Err(_) => {
                    debug!(worker = %id, "script cancelled");
                    return;
                }
            };
            warn!(worker = %id, error = %error, "worker failed");
            let _ = events_tx.send(WorkerEvent::Error(error));
        });

        debug!(worker = %id, script = script.id(), "worker spawned");

        Self {
            id,
            script_id: script.id(),
            runtime: runtime.clone(),
            inbox,
            events: Mutex::new(Some(Events::new(id, events_rx))),
            callbacks: Arc::new(Callbacks {
                on_message: Mutex::new(None),
                on_error: Mutex::new(None),
            }),
            task: abort,
            forwarder: Mutex::new(None),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Id of the [`Script`] this worker was spawned from.
    pub fn script_id(&self) -> u64 {
        self.script_id
    }

    /// Sends a message to the script. Messages to a finished worker are
    /// discarded.
    pub fn post_message(&self, message: M) {
        if self.inbox.send(message).is_err() {
            debug!(worker = %self.id, "message dropped, worker finished");
        } else {
            debug!(worker = %self.id, "message posted");
        }
    }

    /// Takes the raw event stream, or `None` if it was already taken or is
    /// being forwarded to callbacks.
    pub fn take_events(&self) -> Option<Events<R>> {
        lock(&self.events).take()
    }

    /// Registers the message callback, replacing any previous one.
    pub fn on_message<F>(&self, callback: F)
    where
        F: Fn(R) + Send + Sync + 'static,
    {
        *lock(&self.callbacks.on_message) = Some(Arc::new(callback));
        self.start_forwarding();
    }

    /// Registers the error callback, replacing any previous one.
    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&WorkerError) + Send + Sync + 'static,
    {
        *lock(&self.callbacks.on_error) = Some(Arc::new(callback));
        self.start_forwarding();
    }

    /// Stops the script. Queued events are discarded and no further events
    /// are produced, even to callbacks registered afterwards.
    pub fn terminate(&self) {
        self.task.abort();
        drop(self.take_events());
        if let Some(forwarder) = lock(&self.forwarder).as_ref() {
            forwarder.abort();
        }
        debug!(worker = %self.id, "worker terminated");
    }

    fn start_forwarding(&self) {
        let Some(mut events) = self.take_events() else {
            return;
        };
        let id = self.id;
        let callbacks = Arc::clone(&self.callbacks);
        let forwarder = self.runtime.spawn(async move {
            while let Some(event) = events.next().await {
                callbacks.dispatch(id, event);
            }
            debug!(worker = %id, "event stream closed");
        });
        *lock(&self.forwarder) = Some(forwarder.abort_handle());
    }
}

impl<M, R> std::fmt::Debug for Worker<M, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("script_id", &self.script_id)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_owned(),
            Err(_) => "non-string panic payload".to_owned(),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::worker::BoxError;

    fn doubler() -> Script<u32, u32> {
        Script::new(|mut scope: WorkerScope<u32, u32>| async move {
            while let Some(n) = scope.recv().await {
                scope.post_message(n * 2);
            }
            Ok::<_, BoxError>(())
        })
    }

    #[tokio::test]
    async fn echoes_through_event_stream() {
        let worker = Worker::spawn(&doubler(), &Handle::current());
        let mut events = worker.take_events().unwrap();
        worker.post_message(21);
        assert!(matches!(events.next().await, Some(WorkerEvent::Message(42))));
        assert!(worker.take_events().is_none());
    }

    #[tokio::test]
    async fn script_error_becomes_event() {
        let script = Script::new(|_scope: WorkerScope<(), ()>| async move {
            Err::<(), BoxError>("bad input".into())
        });
        let worker = Worker::spawn(&script, &Handle::current());
        let err = worker.take_events().unwrap().reply().await.unwrap_err();
        assert_eq!(
            err,
            WorkerError::Script {
                id: worker.id(),
                message: "bad input".into()
            }
        );
    }

    #[tokio::test]
    async fn panic_becomes_event() {
        let script = Script::new(|_scope: WorkerScope<(), ()>| async move {
            let explode = true;
            if explode {
                panic!("worker exploded");
            }
            Ok::<(), BoxError>(())
        });
        let worker = Worker::spawn(&script, &Handle::current());
        let err = worker.take_events().unwrap().reply().await.unwrap_err();
        assert!(matches!(err, WorkerError::Panicked { ref message, .. } if message == "worker exploded"));
    }

    #[tokio::test]
    async fn terminate_closes_stream() {
        let script = Script::new(|_scope: WorkerScope<(), ()>| async move {
            std::future::pending::<()>().await;
            Ok::<(), BoxError>(())
        });
        let worker = Worker::spawn(&script, &Handle::current());
        let events = worker.take_events().unwrap();
        worker.terminate();
        assert_eq!(events.reply().await, Err(WorkerError::Closed { id: worker.id() }));
    }

    #[tokio::test]
    async fn terminate_discards_unforwarded_events() {
        let worker = Worker::spawn(&doubler(), &Handle::current());
        worker.post_message(1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        worker.terminate();
        assert!(worker.take_events().is_none());

        let (tx, mut rx) = mpsc::unbounded_channel();
        worker.on_message(move |n: u32| {
            let _ = tx.send(n);
        });
        let late = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(!matches!(late, Ok(Some(_))));
    }

    #[tokio::test]
    async fn callbacks_receive_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = Worker::spawn(&doubler(), &Handle::current());
        worker.on_message(move |n| {
            let _ = tx.send(n);
        });
        worker.post_message(5);
        worker.post_message(6);
        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert_eq!((first, second), (Some(10), Some(12)));
        assert!(worker.take_events().is_none());
    }
}
