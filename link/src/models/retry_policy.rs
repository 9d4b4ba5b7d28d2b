use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reconnection budget and backoff parameters.
///
/// The delay before retry attempt `n + 1` is `base_delay_ms × 2^n`, optionally
/// capped by `max_delay_ms`.
///
/// # Example
///
/// ```rust
/// use feed_link::RetryPolicy;
///
/// let policy = RetryPolicy::new(5, 500).with_max_delay_ms(Some(10_000));
/// assert_eq!(policy.max_attempts, 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts before giving up.
    /// Default: 5. `0` disables automatic retries entirely.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    /// Default: 1000ms
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Optional ceiling on a single retry delay, in milliseconds.
    /// Default: None (pure exponential growth)
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms: None,
        }
    }

    /// Set the ceiling for a single retry delay (in milliseconds)
    pub fn with_max_delay_ms(mut self, max_delay_ms: Option<u64>) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}
