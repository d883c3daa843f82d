//! # Circuit Breaker Module
//!
//! This module implements the circuit breaker pattern for model API calls.
//! It prevents cascading failures by temporarily stopping requests when
//! meal analysis fails repeatedly.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::RecoveryConfig;

/// Circuit breaker for model API operations
///
/// Implements the circuit breaker pattern to prevent cascading failures when the
/// analysis backend degrades. Repeated failures open the circuit, requests are
/// rejected immediately, and after a timeout the circuit allows a test request.
///
/// ## State Machine
///
/// ```text
/// CLOSED ────failures ≥ threshold────► OPEN
///    ▲                                      │
///    │                                      │
///    └─────────reset timeout───────────────┘
///                    │
///                    ▼
///                 HALF-OPEN ───success───► CLOSED
///                    │
///                    └────failure───────► OPEN
/// ```
///
/// ## State Transitions
///
/// - **CLOSED → OPEN**: When failure count reaches `circuit_breaker_threshold`
/// - **OPEN → HALF-OPEN**: After `circuit_breaker_reset_secs` timeout elapses
/// - **HALF-OPEN → CLOSED**: On first successful operation
/// - **HALF-OPEN → OPEN**: On operation failure during testing
///
/// ## Thread Safety
///
/// All state mutations use `Mutex<T>`:
/// - `failure_count`: Tracks consecutive failures
/// - `last_failure_time`: Timestamp of most recent failure
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_count: Mutex<u32>,
    last_failure_time: Mutex<Option<Instant>>,
    config: RecoveryConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            failure_count: Mutex::new(0),
            last_failure_time: Mutex::new(None),
            config,
        }
    }

    /// Check if circuit breaker is open (blocking requests)
    ///
    /// Checks the failure count against the threshold; while the reset timeout has
    /// not elapsed since the last failure the circuit stays open. Once the timeout
    /// expires the counters reset so the next request can test service recovery.
    ///
    /// # Returns
    ///
    /// `true` if circuit is open and should block requests, `false` if closed
    pub fn is_open(&self) -> bool {
        let failure_count = *self
            .failure_count
            .lock()
            .expect("Failed to acquire failure count lock");
        let last_failure = *self
            .last_failure_time
            .lock()
            .expect("Failed to acquire last failure time lock");

        if failure_count >= self.config.circuit_breaker_threshold {
            if let Some(last_time) = last_failure {
                let elapsed = last_time.elapsed();
                if elapsed < Duration::from_secs(self.config.circuit_breaker_reset_secs) {
                    return true; // Circuit is still open
                }
                // Reset circuit breaker
                *self
                    .failure_count
                    .lock()
                    .expect("Failed to acquire failure count lock") = 0;
                *self
                    .last_failure_time
                    .lock()
                    .expect("Failed to acquire last failure time lock") = None;
            }
        }
        false
    }

    /// Record a failure to increment the failure counter
    ///
    /// Should be called whenever a model API call fails.
    /// Updates failure count and last failure timestamp.
    pub fn record_failure(&self) {
        *self
            .failure_count
            .lock()
            .expect("Failed to acquire failure count lock") += 1;
        *self
            .last_failure_time
            .lock()
            .expect("Failed to acquire last failure time lock") = Some(Instant::now());
    }

    /// Record a success to reset the failure counter
    ///
    /// Should be called whenever a model API call succeeds.
    /// Resets failure count and clears last failure timestamp.
    pub fn record_success(&self) {
        *self
            .failure_count
            .lock()
            .expect("Failed to acquire failure count lock") = 0;
        *self
            .last_failure_time
            .lock()
            .expect("Failed to acquire last failure time lock") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(threshold: u32, reset_secs: u64) -> RecoveryConfig {
        RecoveryConfig {
            circuit_breaker_threshold: threshold,
            circuit_breaker_reset_secs: reset_secs,
            ..RecoveryConfig::default()
        }
    }

    #[test]
    fn test_circuit_stays_closed_below_threshold() {
        let breaker = CircuitBreaker::new(test_config(3, 60));

        breaker.record_failure();
        breaker.record_failure();

        assert!(!breaker.is_open());
    }

    #[test]
    fn test_circuit_opens_at_threshold() {
        let breaker = CircuitBreaker::new(test_config(3, 60));

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_failure();

        assert!(breaker.is_open());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let breaker = CircuitBreaker::new(test_config(2, 60));

        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();

        assert!(!breaker.is_open());
    }

    #[test]
    fn test_circuit_resets_after_timeout() {
        let breaker = CircuitBreaker::new(test_config(1, 0));

        breaker.record_failure();

        // Zero reset timeout means the circuit closes again immediately
        assert!(!breaker.is_open());
    }
}
