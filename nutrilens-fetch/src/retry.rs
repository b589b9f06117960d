//! Retry policy with exponential backoff and jitter.
//!
//! The delay before attempt `n + 1` is `base * multiplier^(n - 1)`, capped at
//! `max_delay`, plus a uniform random extra of up to `jitter` times that
//! nominal delay. As long as `multiplier >= 1 + jitter` and the cap is not
//! reached before the last retry, delays strictly increase for every random
//! draw.

use std::time::Duration;

use nutrilens_core::ErrorKind;
use thiserror::Error;

/// Invalid retry configuration.
#[derive(Debug, Error, PartialEq)]
pub enum RetryConfigError {
    /// At least one attempt is required.
    #[error("max_attempts must be at least 1")]
    NoAttempts,

    /// Jitter must be a fraction in `[0, 1]`.
    #[error("jitter must be between 0 and 1, got {0}")]
    JitterOutOfRange(f64),

    /// The multiplier would let jitter reorder delays.
    #[error("multiplier {multiplier} must be at least 1 + jitter ({jitter})")]
    MultiplierTooSmall {
        /// Configured multiplier.
        multiplier: f64,
        /// Configured jitter.
        jitter: f64,
    },

    /// Base delay is larger than the cap.
    #[error("base delay exceeds max delay")]
    BaseExceedsMax,

    /// The cap would flatten the delays before the last retry.
    #[error("max delay {max_delay:?} is reached before attempt {max_attempts}; raise it or lower max_attempts")]
    CapReachedEarly {
        /// Configured attempt bound.
        max_attempts: u32,
        /// Configured cap.
        max_delay: Duration,
    },
}

/// Strategy for retrying failed attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryStrategy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Upper bound on the nominal delay.
    pub max_delay: Duration,
    /// Random extra as a fraction of the nominal delay.
    pub jitter: f64,
}

impl RetryStrategy {
    /// Creates a strategy with default backoff and the given attempt bound.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: 0.25,
        }
    }

    /// Disables retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the multiplier.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the jitter fraction.
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Checks that the strategy is usable and keeps delays increasing.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), RetryConfigError> {
        if self.max_attempts == 0 {
            return Err(RetryConfigError::NoAttempts);
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(RetryConfigError::JitterOutOfRange(self.jitter));
        }
        if self.max_attempts > 1 && !(self.multiplier >= 1.0 + self.jitter) {
            return Err(RetryConfigError::MultiplierTooSmall {
                multiplier: self.multiplier,
                jitter: self.jitter,
            });
        }
        if self.base_delay > self.max_delay {
            return Err(RetryConfigError::BaseExceedsMax);
        }
        if self.max_attempts > 2 {
            // Uncapped delay before the final attempt.
            let exponent = i32::try_from(self.max_attempts - 2).unwrap_or(i32::MAX);
            let last = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
            if last > self.max_delay.as_secs_f64() {
                return Err(RetryConfigError::CapReachedEarly {
                    max_attempts: self.max_attempts,
                    max_delay: self.max_delay,
                });
            }
        }
        Ok(())
    }

    /// Delay before the next attempt, without jitter.
    ///
    /// `attempts_made` is the number of attempts already completed (1-based).
    pub fn nominal_delay(&self, attempts_made: u32) -> Duration {
        let exponent = i32::try_from(attempts_made.saturating_sub(1)).unwrap_or(i32::MAX);
        let seconds = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = seconds.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// Delay before the next attempt, with jitter applied.
    pub fn delay_for_attempt(&self, attempts_made: u32) -> Duration {
        let nominal = self.nominal_delay(attempts_made);
        if self.jitter <= 0.0 {
            return nominal;
        }
        nominal + nominal.mul_f64(self.jitter * fastrand::f64())
    }

    /// Determines if a failure of `kind` should be retried after
    /// `attempts_made` attempts.
    pub fn should_retry(&self, kind: ErrorKind, attempts_made: u32) -> bool {
        kind.is_retryable() && attempts_made < self.max_attempts
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::new(3)
    }
}
