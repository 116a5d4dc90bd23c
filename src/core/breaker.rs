//! Per-source circuit breaker.
//!
//! A source that keeps failing is skipped for a cool-down period so a dead
//! upstream does not add its timeout to every resolve. State is in-memory
//! and resets on restart.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const DEFAULT_FAIL_THRESHOLD: u32 = 3;
const DEFAULT_COOL_DOWN: Duration = Duration::from_secs(300);

#[derive(Debug, Default)]
struct SourceState {
    failures: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    fail_threshold: u32,
    cool_down: Duration,
    state: Mutex<HashMap<&'static str, SourceState>>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAIL_THRESHOLD, DEFAULT_COOL_DOWN)
    }
}

impl CircuitBreaker {
    pub fn new(fail_threshold: u32, cool_down: Duration) -> Self {
        CircuitBreaker {
            fail_threshold: fail_threshold.max(1),
            cool_down,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the source may be tried. An expired cool-down closes the
    /// circuit again.
    pub fn allow(&self, name: &'static str) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(entry) = state.get_mut(name) else {
            return true;
        };
        match entry.opened_at {
            None => true,
            Some(opened) if opened.elapsed() >= self.cool_down => {
                debug!(source = name, "circuit cool-down elapsed, closing");
                state.remove(name);
                true
            }
            Some(_) => false,
        }
    }

    pub fn on_success(&self, name: &'static str) {
        self.state.lock().unwrap().remove(name);
    }

    pub fn on_failure(&self, name: &'static str) {
        let mut state = self.state.lock().unwrap();
        let entry = state.entry(name).or_default();
        entry.failures += 1;
        if entry.failures >= self.fail_threshold && entry.opened_at.is_none() {
            warn!(
                source = name,
                failures = entry.failures,
                "opening circuit after consecutive failures"
            );
            entry.opened_at = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(300));

        breaker.on_failure("fundgz");
        breaker.on_failure("fundgz");
        assert!(breaker.allow("fundgz"));

        breaker.on_failure("fundgz");
        assert!(!breaker.allow("fundgz"));

        // Other sources are unaffected
        assert!(breaker.allow("eastmoney"));
    }

    #[test]
    fn test_success_resets_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(300));

        breaker.on_failure("fundgz");
        breaker.on_failure("fundgz");
        breaker.on_success("fundgz");
        breaker.on_failure("fundgz");
        breaker.on_failure("fundgz");
        assert!(breaker.allow("fundgz"));
    }

    #[test]
    fn test_cool_down_closes_circuit() {
        let breaker = CircuitBreaker::new(1, Duration::ZERO);

        breaker.on_failure("tushare");
        // Zero cool-down: the very next check closes the circuit again.
        assert!(breaker.allow("tushare"));
        assert!(breaker.allow("tushare"));
    }
}
