//! # Retry Logic and Backoff Strategies
//!
//! Backoff policy used by the real-time channel when it reconnects, and by
//! anything else that retries a remote operation on a schedule.
//!
//! ## Features
//!
//! - **Fixed, Linear and Exponential** strategies, all capped
//! - **Max Attempts**: optional bound; `None` retries forever
//! - **Backoff tracker**: counts attempts and resets on success
//!
//! ## Usage
//!
//! ```rust
//! use relief_sync::client::offline::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let mut backoff = RetryPolicy::default().start();
//!
//! assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
//! assert_eq!(backoff.next_delay(), Some(Duration::from_secs(2)));
//!
//! // A successful connection starts over
//! backoff.reset();
//! assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
//! ```

use std::time::Duration;

/// Backoff strategy configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Fixed interval between retries
    Fixed {
        /// Delay before every attempt
        interval: Duration,
    },
    /// Delay grows by `step` per attempt, up to `max`
    Linear {
        /// Increment per attempt
        step: Duration,
        /// Upper bound
        max: Duration,
    },
    /// Delay doubles per attempt starting at `base`, up to `max`
    Exponential {
        /// Delay before the first retry
        base: Duration,
        /// Upper bound
        max: Duration,
    },
}

impl BackoffStrategy {
    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self {
            BackoffStrategy::Fixed { interval } => *interval,
            BackoffStrategy::Linear { step, max } => step.saturating_mul(attempt).min(*max),
            BackoffStrategy::Exponential { base, max } => {
                let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(*max)
            }
        }
    }
}

/// Retry policy: a backoff strategy plus an optional attempt bound
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// How delays grow
    pub strategy: BackoffStrategy,
    /// Maximum consecutive retries, `None` for unlimited
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential {
                base: Duration::from_secs(1),
                max: Duration::from_secs(30),
            },
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Policy with a fixed delay
    pub fn fixed(interval: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            strategy: BackoffStrategy::Fixed { interval },
            max_attempts,
        }
    }

    /// Policy with a capped exponential delay
    pub fn exponential(base: Duration, max: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            strategy: BackoffStrategy::Exponential { base, max },
            max_attempts,
        }
    }

    /// Whether retry number `attempt` (1-based) is allowed
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.strategy.delay_for(attempt)
    }

    /// Start tracking a sequence of retries
    pub fn start(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            attempt: 0,
        }
    }
}

/// Attempt counter for one retry sequence
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempt: u32,
}

impl Backoff {
    /// Delay before the next retry, or `None` once the policy gives up
    pub fn next_delay(&mut self) -> Option<Duration> {
        let next = self.attempt.saturating_add(1);
        if !self.policy.should_retry(next) {
            return None;
        }
        self.attempt = next;
        Some(self.policy.delay_for(next))
    }

    /// Retries taken since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Start over after a success
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
