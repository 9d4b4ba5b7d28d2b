//! Exponential-backoff retry scheduling.

use std::pin::Pin;
use std::time::Duration;
use tokio::time::Sleep;

use crate::models::RetryPolicy;

/// What the scheduler decided for a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// A retry timer was armed.
    Scheduled {
        /// Delay until the timer fires.
        delay: Duration,
    },
    /// The retry budget is spent; no timer was armed.
    Exhausted {
        /// Configured attempt limit.
        max_attempts: u32,
    },
}

/// Owns the single retry timer of a client.
///
/// Arming a new timer drops the previous one, so at most one retry is ever
/// pending. The slot is cleared in the same poll that observes the timer
/// firing, and [`cancel`](Self::cancel) clears it synchronously.
#[derive(Debug)]
pub struct RetryScheduler {
    policy: RetryPolicy,
    pending: Option<Pin<Box<Sleep>>>,
    pending_delay: Option<Duration>,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            pending: None,
            pending_delay: None,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Delay before the retry that follows `retry_count` consumed retries:
    /// `base_delay × 2^retry_count`, capped by `max_delay_ms` when set.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let delay_ms = self
            .policy
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(retry_count));
        let delay_ms = match self.policy.max_delay_ms {
            Some(max) => delay_ms.min(max),
            None => delay_ms,
        };
        Duration::from_millis(delay_ms)
    }

    /// Arm a retry timer for the next attempt, replacing any pending one.
    ///
    /// Returns [`RetryDecision::Exhausted`] without arming anything when
    /// `retry_count` has reached the policy's `max_attempts`.
    pub fn schedule_retry(&mut self, retry_count: u32) -> RetryDecision {
        self.cancel();
        if retry_count >= self.policy.max_attempts {
            return RetryDecision::Exhausted {
                max_attempts: self.policy.max_attempts,
            };
        }
        let delay = self.delay_for(retry_count);
        self.pending = Some(Box::pin(tokio::time::sleep(delay)));
        self.pending_delay = Some(delay);
        RetryDecision::Scheduled { delay }
    }

    /// Drop the pending timer, if any. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.pending_delay = None;
        self.pending.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Delay the pending timer was armed with.
    pub fn pending_delay(&self) -> Option<Duration> {
        self.pending_delay
    }

    /// Resolve when the pending timer fires, clearing the slot.
    ///
    /// Never resolves while nothing is armed. Cancel-safe: dropping the
    /// future leaves the timer armed.
    pub async fn fired(&mut self) {
        match self.pending.as_mut() {
            Some(sleep) => sleep.as_mut().await,
            None => std::future::pending::<()>().await,
        }
        self.pending = None;
        self.pending_delay = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[test]
    fn starts_with_base_delay() {
        let scheduler = RetryScheduler::new(RetryPolicy::new(5, 250));
        assert_eq!(scheduler.delay_for(0), Duration::from_millis(250));
    }

    #[test]
    fn scales_exponentially_for_attempts() {
        let scheduler = RetryScheduler::new(RetryPolicy::new(5, 1000));
        let delays: Vec<u64> = (0..3).map(|n| scheduler.delay_for(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![1000, 2000, 4000]);
    }

    #[test]
    fn caps_delay_at_max_when_configured() {
        let scheduler =
            RetryScheduler::new(RetryPolicy::new(20, 1000).with_max_delay_ms(Some(4000)));
        assert_eq!(scheduler.delay_for(5), Duration::from_millis(4000));
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        let scheduler = RetryScheduler::new(RetryPolicy::new(u32::MAX, 1000));
        assert_eq!(scheduler.delay_for(200), Duration::from_millis(u64::MAX));
    }

    #[tokio::test]
    async fn exhausted_at_max_attempts() {
        let mut scheduler = RetryScheduler::new(RetryPolicy::new(3, 1000));
        assert_eq!(
            scheduler.schedule_retry(3),
            RetryDecision::Exhausted { max_attempts: 3 }
        );
        assert!(!scheduler.is_pending());
    }

    #[tokio::test]
    async fn zero_attempts_never_arms() {
        let mut scheduler = RetryScheduler::new(RetryPolicy::new(0, 1000));
        assert!(matches!(scheduler.schedule_retry(0), RetryDecision::Exhausted { .. }));
        assert!(!scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_pending_timer() {
        let mut scheduler = RetryScheduler::new(RetryPolicy::new(5, 1000));
        scheduler.schedule_retry(2);
        assert_eq!(scheduler.pending_delay(), Some(Duration::from_millis(4000)));

        let start = Instant::now();
        scheduler.schedule_retry(0);
        scheduler.fired().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1000) && elapsed < Duration::from_millis(1100));
        assert!(!scheduler.is_pending());
        assert!(scheduler.pending_delay().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_clears_slot() {
        let mut scheduler = RetryScheduler::new(RetryPolicy::new(5, 1000));
        scheduler.schedule_retry(0);
        assert!(scheduler.cancel());
        assert!(!scheduler.cancel());

        let fired = tokio::time::timeout(Duration::from_secs(60), scheduler.fired()).await;
        assert!(fired.is_err(), "cancelled timer must never fire");
    }
}
