//! Constructor options for [`HardWorker`](crate::HardWorker).
//!
//! Every option is optional. The JSON form keeps the option names used by the
//! browser package this crate mirrors (`multiplier`, `maxThread`, `minThread`),
//! so existing configuration files can be loaded unchanged: unknown keys are
//! ignored and the thread bounds accept any number.

use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Errors produced while loading a [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// User-supplied worker configuration.
///
/// # Examples
///
/// ```
/// use hardworker::Config;
///
/// let config = Config::from_json(r#"{ "multiplier": 2, "maxThread": 6 }"#).unwrap();
/// assert_eq!(config.multiplier(), Some(2.0));
/// assert_eq!(config.max_thread(), Some(6));
/// assert_eq!(config.min_thread(), None);
///
/// let built = Config::new().with_multiplier(0.5).with_min_thread(2);
/// assert_eq!(built.min_thread(), Some(2));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    multiplier: Option<f64>,
    #[serde(default, deserialize_with = "upper_bound")]
    max_thread: Option<usize>,
    #[serde(default, deserialize_with = "lower_bound")]
    min_thread: Option<usize>,
}

impl Config {
    /// Creates an empty configuration; every option falls back to its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration object from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] for malformed input or options of the
    /// wrong type.
    pub fn from_json(input: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Sets the factor applied to the logical processor count.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Sets the upper bound on the planned worker count.
    #[must_use]
    pub fn with_max_thread(mut self, max_thread: usize) -> Self {
        self.max_thread = Some(max_thread);
        self
    }

    /// Sets the lower bound under which the crate refuses to run.
    #[must_use]
    pub fn with_min_thread(mut self, min_thread: usize) -> Self {
        self.min_thread = Some(min_thread);
        self
    }

    pub fn multiplier(&self) -> Option<f64> {
        self.multiplier
    }

    pub fn max_thread(&self) -> Option<usize> {
        self.max_thread
    }

    pub fn min_thread(&self) -> Option<usize> {
        self.min_thread
    }
}

// A fractional maximum clamps like its floor does against an integer count.
fn upper_bound<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.and_then(|n| thread_bound(n.floor())))
}

// A fractional minimum rejects the same counts its ceiling does.
fn lower_bound<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.and_then(|n| thread_bound(n.ceil())))
}

// Bounds below one behave as if they were not set.
fn thread_bound(n: f64) -> Option<usize> {
    (n.is_finite() && n >= 1.0).then_some(n as usize)
}
