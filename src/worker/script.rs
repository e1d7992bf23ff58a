//! The function a worker runs.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{BoxError, WorkerScope};

/// Heap-allocated future returned by a script body.
pub type ScriptFuture = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send>>;

/// Conversion trait for async script bodies.
///
/// Any `Fn(WorkerScope<M, R>) -> impl Future<Output = Result<(), BoxError>> + Send`
/// that is also `Send + Sync + 'static` implements this trait through the
/// blanket impl below.
pub trait IntoScript<M, R>: Send + Sync + 'static {
    /// Runs the body against a fresh scope, boxing the returned future.
    fn call(&self, scope: WorkerScope<M, R>) -> ScriptFuture;
}

impl<T, F, M, R> IntoScript<M, R> for T
where
    T: Fn(WorkerScope<M, R>) -> F + Send + Sync + 'static,
    F: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    fn call(&self, scope: WorkerScope<M, R>) -> ScriptFuture {
        Box::pin((self)(scope))
    }
}

/// A packaged script, shared by every worker spawned from it.
///
/// Cloning is cheap; all clones share one body and one id.
///
/// # Examples
///
/// ```
/// use hardworker::worker::{BoxError, Script, WorkerScope};
///
/// let script = Script::new(|mut scope: WorkerScope<Vec<u32>, u32>| async move {
///     if let Some(chunk) = scope.recv().await {
///         scope.post_message(chunk.iter().sum());
///     }
///     Ok::<_, BoxError>(())
/// });
/// assert_eq!(script.id(), script.clone().id());
/// ```
pub struct Script<M, R> {
    id: u64,
    body: Arc<dyn IntoScript<M, R>>,
}

impl<M: 'static, R: 'static> Script<M, R> {
    pub fn new(body: impl IntoScript<M, R>) -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT.fetch_add(1, Ordering::Relaxed),
            body: Arc::new(body),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn call(&self, scope: WorkerScope<M, R>) -> ScriptFuture {
        self.body.call(scope)
    }
}

impl<M, R> Clone for Script<M, R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            body: Arc::clone(&self.body),
        }
    }
}

impl<M, R> fmt::Debug for Script<M, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script").field("id", &self.id).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::worker::{WorkerEvent, WorkerId};

    #[tokio::test]
    async fn clones_share_one_body() {
        let script = Script::new(|mut scope: WorkerScope<String, usize>| async move {
            if let Some(text) = scope.recv().await {
                scope.post_message(text.len());
            }
            Ok::<_, BoxError>(())
        });
        let copy = script.clone();
        assert_eq!(copy.id(), script.id());

        let (inbox, inbox_rx) = mpsc::unbounded_channel();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        inbox.send("four".to_owned()).unwrap();
        copy.call(WorkerScope::new(WorkerId::next(), inbox_rx, events_tx))
            .await
            .unwrap();
        assert!(matches!(events_rx.recv().await, Some(WorkerEvent::Message(4))));
    }
}
