//! Retry policies: backoff, jitter, timeouts, and circuit breaker settings.

use crate::Error;
use rand::Rng;
use std::time::Duration;

/// Backoff growth curve between attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay every time.
    Fixed,
    /// Delay grows by the base each attempt: base, 2x, 3x, ...
    Linear,
    /// Delay doubles each attempt: base, 2x, 4x, 8x, ...
    Exponential,
}

/// Circuit breaker tuning carried by a retry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BreakerSettings {
    /// Consecutive-ish failure count that trips the breaker open.
    pub failure_threshold: u32,
    /// How long an open breaker rejects calls before probing again.
    pub cooldown: Duration,
    /// Probe successes required to close a half-open breaker.
    pub successes_to_close: u32,
}

impl BreakerSettings {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            successes_to_close: 3,
        }
    }
}

/// Decides whether an error is worth another attempt.
pub type RetryPredicate = fn(&Error) -> bool;

/// Full retry behavior for one class of remote operation.
///
/// `attempts` counts retries beyond the initial try, so `attempts: 3` makes
/// up to four calls. Policies are plain values; the executor interprets them.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// How the delay grows on subsequent retries.
    pub backoff: Backoff,
    /// Upper bound on any single delay, applied after jitter.
    pub max_delay: Duration,
    /// Per-attempt wait limit. The attempt itself is not cancelled when the
    /// limit passes; only the wait is abandoned.
    pub timeout: Option<Duration>,
    /// Jitter fraction. `0.1` perturbs each delay by up to ±10%.
    pub jitter: Option<f64>,
    /// Circuit breaker settings, if this operation class uses one.
    pub breaker: Option<BreakerSettings>,
    /// Retry gate. `None` retries every failure until attempts run out.
    pub retry_on: Option<RetryPredicate>,
}

impl RetryPolicy {
    /// Total number of calls this policy may make.
    pub fn total_tries(&self) -> u32 {
        self.attempts.saturating_add(1)
    }

    /// Replace the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Replace the retry budget.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Delay to sleep after `prior_failures` attempts have failed, with
    /// jitter applied and clamped to `max_delay`.
    pub fn delay_for(&self, prior_failures: u32) -> Duration {
        let unit = match self.jitter {
            Some(_) => rand::rng().random_range(-1.0..=1.0),
            None => 0.0,
        };
        self.delay_with_unit(prior_failures, unit)
    }

    /// Deterministic core of [`RetryPolicy::delay_for`]; `unit` is the jitter
    /// sample in `[-1, 1]`.
    fn delay_with_unit(&self, prior_failures: u32, unit: f64) -> Duration {
        let base = duration_to_ms(self.base_delay);
        let mut delay = match self.backoff {
            Backoff::Fixed => base,
            Backoff::Linear => base * (prior_failures as f64 + 1.0),
            Backoff::Exponential => base * 2f64.powi(prior_failures.min(52) as i32),
        };
        if let Some(fraction) = self.jitter {
            delay += delay * fraction * unit;
        }
        let clamped = delay.clamp(0.0, duration_to_ms(self.max_delay));
        Duration::from_millis(clamped as u64)
    }

    /// Whether `err` should be retried under this policy.
    pub fn should_retry(&self, err: &Error) -> bool {
        match self.retry_on {
            Some(predicate) => predicate(err),
            None => true,
        }
    }

    /// Light operations: existence checks, metadata lookups.
    pub fn fast() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
            backoff: Backoff::Linear,
            max_delay: Duration::from_secs(2),
            timeout: Some(Duration::from_secs(10)),
            jitter: Some(0.1),
            breaker: None,
            retry_on: None,
        }
    }

    /// General-purpose remote calls.
    pub fn standard() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff: Backoff::Exponential,
            max_delay: Duration::from_secs(10),
            timeout: Some(Duration::from_secs(30)),
            jitter: Some(0.1),
            breaker: Some(BreakerSettings::new(5, Duration::from_secs(60))),
            retry_on: None,
        }
    }

    /// Heavyweight operations that are expensive to repeat.
    pub fn slow() -> Self {
        Self {
            attempts: 5,
            base_delay: Duration::from_secs(2),
            backoff: Backoff::Exponential,
            max_delay: Duration::from_secs(30),
            timeout: Some(Duration::from_secs(60)),
            jitter: Some(0.2),
            breaker: Some(BreakerSettings::new(3, Duration::from_secs(120))),
            retry_on: None,
        }
    }

    /// Object uploads: long per-attempt timeout, only transient errors retried.
    pub fn upload() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff: Backoff::Exponential,
            max_delay: Duration::from_secs(15),
            timeout: Some(Duration::from_secs(300)),
            jitter: Some(0.15),
            breaker: Some(BreakerSettings::new(3, Duration::from_secs(180))),
            retry_on: Some(Error::is_retryable),
        }
    }

    /// Short network calls such as presigned URL generation.
    pub fn network() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff: Backoff::Exponential,
            max_delay: Duration::from_secs(8),
            timeout: Some(Duration::from_secs(30)),
            jitter: Some(0.1),
            breaker: Some(BreakerSettings::new(5, Duration::from_secs(60))),
            retry_on: Some(Error::is_retryable),
        }
    }

    /// Critical operations that should survive extended flakiness.
    pub fn high_availability() -> Self {
        Self {
            attempts: 5,
            base_delay: Duration::from_millis(500),
            backoff: Backoff::Exponential,
            max_delay: Duration::from_secs(20),
            timeout: Some(Duration::from_secs(45)),
            jitter: Some(0.2),
            breaker: Some(BreakerSettings::new(3, Duration::from_secs(300))),
            retry_on: Some(Error::is_retryable),
        }
    }
}

fn duration_to_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
