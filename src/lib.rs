//! # hardworker
//!
//! Split array work across background Tokio workers sized to the host.
//!
//! The worker count is derived from the logical processor count, a
//! multiplier and optional bounds; the input is chunked to match and every
//! chunk goes to its own worker. A single shared worker is also available for
//! plain message passing.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hardworker::{Config, HardWorker, worker::{BoxError, WorkerScope}};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut pool = HardWorker::new(Config::new().with_multiplier(2.0));
//!     pool.attach(|mut scope: WorkerScope<Vec<u32>, usize>| async move {
//!         if let Some(chunk) = scope.recv().await {
//!             scope.post_message(chunk.iter().filter(|n| *n % 2 == 0).count());
//!         }
//!         Ok::<_, BoxError>(())
//!     });
//!
//!     let items: Vec<u32> = (0..10_000).collect();
//!     let evens: usize = pool.post_array(&items).await?.into_iter().sum();
//!     println!("{evens} even numbers");
//!     Ok(())
//! }
//! ```

pub mod chunk;
pub mod config;
pub mod hard_worker;
pub mod plan;
pub mod worker;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use config::{Config, ConfigError};
pub use hard_worker::{HardWorker, HardWorkerError};
pub use plan::{Capabilities, Plan};
pub use worker::{Script, Worker, WorkerError, WorkerScope};
