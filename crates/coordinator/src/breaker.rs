//! Per-operation circuit breaker.
//!
//! Breaker state is keyed by operation name, so "upload-complete-file" and
//! "generate-presigned-url" trip independently. Settings travel with each
//! call (they live on the retry policy); the breaker itself only remembers
//! counts, state, and when it last opened.

use dashmap::DashMap;
use hoist_core::retry::BreakerSettings;
use hoist_core::{Error, Result};
use tokio::time::Instant;
use tracing::{info, warn};

/// Lifecycle of one operation's breaker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls flow normally; failures are counted.
    Closed,
    /// Calls are rejected until the cooldown passes.
    Open,
    /// Probe calls are allowed; successes close, a failure reopens.
    HalfOpen,
}

#[derive(Debug)]
struct BreakerRecord {
    state: BreakerState,
    failures: u32,
    /// Probe successes while half-open.
    successes: u32,
    opened_at: Option<Instant>,
}

impl Default for BreakerRecord {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            failures: 0,
            successes: 0,
            opened_at: None,
        }
    }
}

/// Tracks failure state for every named operation.
///
/// All methods are synchronous and take `&self`; entries are locked per
/// operation name, so a check-and-transition is atomic for that operation.
#[derive(Debug, Default)]
pub struct CircuitBreaker {
    records: DashMap<String, BreakerRecord>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate a call. An open breaker rejects with [`Error::CircuitOpen`] until
    /// the cooldown has passed, at which point it moves to half-open and lets
    /// probe calls through.
    pub fn check(&self, operation: &str, settings: &BreakerSettings) -> Result<()> {
        let mut record = self.records.entry(operation.to_string()).or_default();
        match record.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let cooled_down = record
                    .opened_at
                    .is_none_or(|at| at.elapsed() >= settings.cooldown);
                if cooled_down {
                    record.state = BreakerState::HalfOpen;
                    record.failures = 0;
                    record.successes = 0;
                    info!(operation, "circuit breaker half-open, probing");
                    Ok(())
                } else {
                    Err(Error::CircuitOpen {
                        operation: operation.to_string(),
                    })
                }
            }
        }
    }

    /// Record a successful call.
    ///
    /// While closed, one success pays down one counted failure. While
    /// half-open, `successes_to_close` probe successes close the breaker.
    pub fn record_success(&self, operation: &str, settings: &BreakerSettings) {
        let mut record = self.records.entry(operation.to_string()).or_default();
        match record.state {
            BreakerState::Closed => {
                record.failures = record.failures.saturating_sub(1);
            }
            BreakerState::HalfOpen => {
                record.successes += 1;
                if record.successes >= settings.successes_to_close {
                    record.state = BreakerState::Closed;
                    record.failures = 0;
                    record.successes = 0;
                    record.opened_at = None;
                    info!(operation, "circuit breaker closed");
                }
            }
            // A success can land here when a call admitted before the trip
            // finishes after it; the cooldown keeps running.
            BreakerState::Open => {}
        }
    }

    /// Record a failed call.
    ///
    /// While closed, reaching `failure_threshold` trips the breaker open.
    /// While half-open, a single failure reopens it and resets the cooldown.
    pub fn record_failure(&self, operation: &str, settings: &BreakerSettings) {
        let mut record = self.records.entry(operation.to_string()).or_default();
        match record.state {
            BreakerState::Closed => {
                record.failures += 1;
                if record.failures >= settings.failure_threshold {
                    record.state = BreakerState::Open;
                    record.opened_at = Some(Instant::now());
                    warn!(
                        operation,
                        failures = record.failures,
                        cooldown_secs = settings.cooldown.as_secs(),
                        "circuit breaker opened"
                    );
                }
            }
            BreakerState::HalfOpen => {
                record.state = BreakerState::Open;
                record.opened_at = Some(Instant::now());
                record.successes = 0;
                warn!(operation, "circuit breaker reopened by probe failure");
            }
            BreakerState::Open => {
                record.opened_at = Some(Instant::now());
            }
        }
    }

    /// Current state for an operation. Unknown operations are closed.
    pub fn state(&self, operation: &str) -> BreakerState {
        self.records
            .get(operation)
            .map(|record| record.state)
            .unwrap_or(BreakerState::Closed)
    }

    /// Forget an operation's breaker state entirely.
    pub fn reset(&self, operation: &str) {
        self.records.remove(operation);
    }
}
