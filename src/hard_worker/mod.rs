//! The [`HardWorker`] entry point.
//!
//! A `HardWorker` owns a [`Plan`], the currently attached [`Script`] and every
//! worker it has spawned. It offers two independent ways to use workers:
//!
//! - **Batches** — [`HardWorker::post_array`] splits a slice into one chunk per
//!   planned worker, spawns a fresh worker per chunk and collects their first
//!   replies in chunk order.
//! - **A shared worker** — [`HardWorker::on_message`], [`HardWorker::on_error`]
//!   and [`HardWorker::post_message`] talk to a single long-lived worker that is
//!   created on first use.
//!
//! [`HardWorker::terminate`] stops whichever of the two is in use.

use std::sync::Mutex;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::chunk::chunk;
use crate::config::Config;
use crate::plan::{Capabilities, Plan};
use crate::worker::{IntoScript, Script, Worker, WorkerError, lock};

/// Errors produced by [`HardWorker`].
#[derive(Debug, Error)]
pub enum HardWorkerError {
    #[error("no script attached")]
    NotAttached,

    #[error("no Tokio runtime available to spawn workers on")]
    NoRuntime,

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("reply task failed: {0}")]
    Join(#[from] JoinError),
}

/// Distributes work across background workers sized to the host.
///
/// `M` is the message type workers receive and `R` the reply type they send
/// back. Batches require `M = Vec<T>`.
///
/// # Examples
///
/// ```rust,no_run
/// use hardworker::{Config, HardWorker, worker::{BoxError, WorkerScope}};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut pool = HardWorker::new(Config::new().with_multiplier(1.0));
///     pool.attach(|mut scope: WorkerScope<Vec<u64>, u64>| async move {
///         if let Some(chunk) = scope.recv().await {
///             scope.post_message(chunk.iter().sum());
///         }
///         Ok::<_, BoxError>(())
///     });
///
///     let items: Vec<u64> = (1..=1000).collect();
///     let partial_sums = pool.post_array(&items).await?;
///     assert_eq!(partial_sums.iter().sum::<u64>(), 500_500);
///     Ok(())
/// }
/// ```
pub struct HardWorker<M, R> {
    config: Config,
    plan: Plan,
    runtime: Option<Handle>,
    script: Option<Script<M, R>>,
    shared: Mutex<Option<Worker<M, R>>>,
    spawned: Mutex<Vec<Worker<M, R>>>,
}

impl<M, R> HardWorker<M, R>
where
    M: Send + 'static,
    R: Send + 'static,
{
    /// Probes the host and derives the worker plan from `config`.
    ///
    /// Call this from inside a Tokio runtime; otherwise the plan is disabled.
    pub fn new(config: Config) -> Self {
        Self::with_capabilities(config, Capabilities::detect())
    }

    /// Like [`new`](Self::new), but with the host capabilities supplied by the
    /// caller instead of probed.
    pub fn with_capabilities(config: Config, host: Capabilities) -> Self {
        let plan = Plan::derive(&config, host);
        Self {
            config,
            plan,
            runtime: Handle::try_current().ok(),
            script: None,
            shared: Mutex::new(None),
            spawned: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Packages `body` as the script every subsequently spawned worker runs,
    /// replacing any previously attached one. Workers already running keep
    /// their script.
    pub fn attach(&mut self, body: impl IntoScript<M, R>) -> Script<M, R> {
        let script = Script::new(body);
        debug!(script = script.id(), "script attached");
        self.script = Some(script.clone());
        script
    }

    /// The currently attached script, if any.
    pub fn script(&self) -> Option<&Script<M, R>> {
        self.script.as_ref()
    }

    /// Number of workers spawned by batches so far.
    pub fn worker_count(&self) -> usize {
        lock(&self.spawned).len()
    }

    /// Registers the shared worker's message callback, creating the worker on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns [`HardWorkerError::NotAttached`] or
    /// [`HardWorkerError::NoRuntime`] when the shared worker cannot be created.
    pub fn on_message<F>(&self, callback: F) -> Result<(), HardWorkerError>
    where
        F: Fn(R) + Send + Sync + 'static,
    {
        self.with_shared(|worker| worker.on_message(callback))
    }

    /// Registers the shared worker's error callback, creating the worker on
    /// first use.
    ///
    /// # Errors
    ///
    /// See [`on_message`](Self::on_message).
    pub fn on_error<F>(&self, callback: F) -> Result<(), HardWorkerError>
    where
        F: Fn(&WorkerError) + Send + Sync + 'static,
    {
        self.with_shared(|worker| worker.on_error(callback))
    }

    /// Sends `message` to the shared worker, creating it on first use.
    ///
    /// Replies are not correlated with messages; they arrive at whatever
    /// callback is registered.
    ///
    /// # Errors
    ///
    /// See [`on_message`](Self::on_message).
    pub fn post_message(&self, message: M) -> Result<(), HardWorkerError> {
        self.with_shared(|worker| worker.post_message(message))
    }

    /// Terminates workers and reports whether any were stopped.
    ///
    /// The shared worker takes precedence: when it exists only it is stopped
    /// and batch workers are left running. Handles are kept, so a second call
    /// returns `true` again.
    pub fn terminate(&self) -> bool {
        if let Some(worker) = lock(&self.shared).as_ref() {
            worker.terminate();
            info!(worker = %worker.id(), "shared worker terminated");
            return true;
        }

        let spawned = lock(&self.spawned);
        if spawned.is_empty() {
            debug!("nothing to terminate");
            return false;
        }
        for worker in spawned.iter() {
            worker.terminate();
        }
        info!(count = spawned.len(), "batch workers terminated");
        true
    }

    fn with_shared<T>(&self, f: impl FnOnce(&Worker<M, R>) -> T) -> Result<T, HardWorkerError> {
        let mut shared = lock(&self.shared);
        let worker = match shared.take() {
            Some(worker) => worker,
            None => {
                let worker = self.spawn_worker()?;
                info!(worker = %worker.id(), "shared worker created");
                worker
            }
        };
        Ok(f(shared.insert(worker)))
    }

    fn spawn_worker(&self) -> Result<Worker<M, R>, HardWorkerError> {
        let script = self.script.as_ref().ok_or(HardWorkerError::NotAttached)?;
        let runtime = self.runtime()?;
        Ok(Worker::spawn(script, &runtime))
    }

    fn runtime(&self) -> Result<Handle, HardWorkerError> {
        self.runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
            .ok_or(HardWorkerError::NoRuntime)
    }
}

impl<T, R> HardWorker<Vec<T>, R>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
{
    /// Splits `items` across the planned workers and collects one reply per
    /// chunk, in chunk order.
    ///
    /// Returns an empty vector without spawning anything when the plan says
    /// not to run. The chunk size is `round(items.len() / thread_count)`.
    ///
    /// # Errors
    ///
    /// The first worker to fail fails the whole batch with its error; the
    /// other workers are neither awaited nor stopped. A worker that ends
    /// without replying fails with [`WorkerError::Closed`].
    pub async fn post_array(&self, items: &[T]) -> Result<Vec<R>, HardWorkerError> {
        let thread_count = self.plan.thread_count();
        if thread_count < 0 {
            debug!(items = items.len(), "plan disabled, batch skipped");
            return Ok(Vec::new());
        }

        let size = (items.len() as f64 / thread_count as f64).round() as isize;
        let parts = chunk(items, size).into_parts();
        if parts.is_empty() {
            return Ok(Vec::new());
        }

        let script = self.script.as_ref().ok_or(HardWorkerError::NotAttached)?;
        let runtime = self.runtime()?;
        let total = parts.len();
        debug!(items = items.len(), chunk_size = size, chunks = total, "dispatching batch");

        let mut replies = JoinSet::new();
        for (index, part) in parts.into_iter().enumerate() {
            let worker = Worker::spawn(script, &runtime);
            let events = worker
                .take_events()
                .ok_or(WorkerError::Closed { id: worker.id() })?;
            worker.post_message(part);
            lock(&self.spawned).push(worker);
            replies.spawn_on(async move { (index, events.reply().await) }, &runtime);
        }

        let mut results: Vec<Option<R>> = (0..total).map(|_| None).collect();
        while let Some(joined) = replies.join_next().await {
            let (index, reply) = joined?;
            match reply {
                Ok(reply) => results[index] = Some(reply),
                Err(error) => {
                    warn!(chunk = index, error = %error, "batch failed");
                    return Err(error.into());
                }
            }
        }

        debug!(chunks = total, "batch complete");
        Ok(results.into_iter().flatten().collect())
    }
}

impl<M, R> std::fmt::Debug for HardWorker<M, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardWorker")
            .field("config", &self.config)
            .field("plan", &self.plan)
            .field("script", &self.script)
            .finish_non_exhaustive()
    }
}
