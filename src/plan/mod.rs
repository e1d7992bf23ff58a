//! Capability probing and worker-count planning.
//!
//! [`Capabilities`] answers two questions about the host: can background
//! workers be spawned at all, and how many logical processors are reported.
//! [`Plan::derive`] turns those answers and a [`Config`] into the number of
//! workers a batch will use.

use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::config::Config;

/// Thread count signalling "do not run".
pub const DISABLED: isize = -1;

/// What the host offers for background execution.
///
/// Probing is separate from planning so the planner can be exercised with
/// arbitrary hosts in tests.
///
/// # Examples
///
/// ```
/// use hardworker::plan::Capabilities;
///
/// let host = Capabilities::new(false, Some(8));
/// assert!(!host.is_unsupported());
/// assert_eq!(host.logical_processors(), Some(8));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    unsupported: bool,
    logical_processors: Option<usize>,
}

impl Capabilities {
    pub fn new(unsupported: bool, logical_processors: Option<usize>) -> Self {
        Self {
            unsupported,
            logical_processors,
        }
    }

    /// Probes the calling thread's environment.
    ///
    /// Workers are Tokio tasks, so the host is unsupported when no runtime is
    /// reachable from here. Never panics.
    pub fn detect() -> Self {
        let unsupported = Handle::try_current().is_err();
        let logical_processors = Some(num_cpus::get()).filter(|&n| n > 0);
        debug!(unsupported, ?logical_processors, "probed host capabilities");
        Self::new(unsupported, logical_processors)
    }

    /// Returns `true` when background workers cannot be created.
    pub fn is_unsupported(&self) -> bool {
        self.unsupported
    }

    pub fn logical_processors(&self) -> Option<usize> {
        self.logical_processors
    }
}

/// The worker layout derived from a [`Config`] and the host [`Capabilities`].
///
/// A disabled plan carries only `thread_count == -1`; the remaining derived
/// fields are never computed for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    disabled: bool,
    multiplier: Option<f64>,
    navigator_thread_count: Option<usize>,
    thread_count: isize,
    max_thread: Option<usize>,
    min_thread: Option<usize>,
}

impl Plan {
    /// Derives the worker count.
    ///
    /// `max_thread` only clamps the count when the caller supplied it; when it
    /// is absent it is filled in from the computed count afterwards. Existing
    /// configurations depend on this ordering.
    ///
    /// Zero values for `multiplier`, `max_thread` and `min_thread` count as
    /// absent, as does a NaN multiplier.
    ///
    /// # Examples
    ///
    /// ```
    /// use hardworker::{Config, plan::{Capabilities, Plan}};
    ///
    /// let plan = Plan::derive(&Config::new().with_multiplier(2.0), Capabilities::new(false, Some(4)));
    /// assert_eq!(plan.thread_count(), 8);
    /// assert_eq!(plan.max_thread(), Some(8));
    ///
    /// let plan = Plan::derive(&Config::new(), Capabilities::new(true, Some(4)));
    /// assert_eq!(plan.thread_count(), -1);
    /// assert!(plan.is_disabled());
    /// ```
    pub fn derive(config: &Config, host: Capabilities) -> Self {
        if host.is_unsupported() {
            info!("background workers unsupported, plan disabled");
            return Self {
                disabled: true,
                multiplier: None,
                navigator_thread_count: None,
                thread_count: DISABLED,
                max_thread: None,
                min_thread: None,
            };
        }

        let multiplier = config
            .multiplier()
            .filter(|&m| m != 0.0 && !m.is_nan())
            .unwrap_or(1.0);
        let navigator_thread_count = host.logical_processors().unwrap_or(1);

        // `as` saturates, so infinite products stay in range.
        let mut thread_count = (navigator_thread_count as f64 * multiplier).floor() as isize;

        let supplied_max = config.max_thread().filter(|&m| m > 0);
        if let Some(max) = supplied_max {
            if thread_count > max as isize {
                thread_count = max as isize;
            }
        }

        let max_thread = supplied_max.unwrap_or(thread_count.max(0) as usize);
        let min_thread = config.min_thread().filter(|&m| m > 0).unwrap_or(1);

        if thread_count < min_thread as isize {
            thread_count = DISABLED;
        }

        info!(
            multiplier,
            navigator_thread_count,
            thread_count,
            max_thread,
            min_thread,
            "worker plan derived"
        );

        Self {
            disabled: false,
            multiplier: Some(multiplier),
            navigator_thread_count: Some(navigator_thread_count),
            thread_count,
            max_thread: Some(max_thread),
            min_thread: Some(min_thread),
        }
    }

    /// Returns `true` when the host was unsupported at construction.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns `true` when a batch would actually spawn workers.
    pub fn is_runnable(&self) -> bool {
        self.thread_count > 0
    }

    /// The planned worker count, or `-1` when batches must not run.
    pub fn thread_count(&self) -> isize {
        self.thread_count
    }

    pub fn multiplier(&self) -> Option<f64> {
        self.multiplier
    }

    pub fn navigator_thread_count(&self) -> Option<usize> {
        self.navigator_thread_count
    }

    pub fn max_thread(&self) -> Option<usize> {
        self.max_thread
    }

    pub fn min_thread(&self) -> Option<usize> {
        self.min_thread
    }
}
