//! Session statistics tracking

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Live counters shared by the scheduler and every invocation task
#[derive(Debug, Default)]
pub struct SessionCounters {
    ticks: AtomicU64,
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl SessionCounters {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tick that dispatched `invocations` tasks
    pub fn record_tick(&self, invocations: usize) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.dispatched
            .fetch_add(invocations as u64, Ordering::Relaxed);
    }

    /// Record a successful invocation
    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed invocation
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy
    pub fn snapshot(&self, elapsed: Duration) -> SessionStats {
        SessionStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            elapsed,
        }
    }
}

/// Statistics for one session
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SessionStats {
    /// Scheduler ticks that dispatched work
    pub ticks: u64,

    /// Invocations dispatched
    pub dispatched: u64,

    /// Invocations that returned a result
    pub succeeded: u64,

    /// Invocations that failed or timed out
    pub failed: u64,

    /// Time from first tick to the end of draining
    pub elapsed: Duration,
}

impl SessionStats {
    /// Invocations that finished either way
    pub fn completed(&self) -> u64 {
        self.succeeded + self.failed
    }

    /// Get success rate (0.0 - 1.0)
    pub fn success_rate(&self) -> f64 {
        if self.completed() == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.completed() as f64
        }
    }

    /// Get error rate (0.0 - 1.0)
    pub fn error_rate(&self) -> f64 {
        if self.completed() == 0 {
            0.0
        } else {
            1.0 - self.success_rate()
        }
    }

    /// Completed invocations per second
    pub fn invocations_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.completed() as f64 / secs
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_stats_defaults() {
        let stats = SessionStats::default();
        assert_eq!(stats.ticks, 0);
        assert_eq!(stats.completed(), 0);
        assert_eq!(stats.success_rate(), 0.0);
        assert_eq!(stats.error_rate(), 0.0);
        assert_eq!(stats.invocations_per_second(), 0.0);
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = SessionCounters::new();
        counters.record_tick(4);
        counters.record_tick(4);
        for _ in 0..7 {
            counters.record_success();
        }
        counters.record_failure();

        let stats = counters.snapshot(Duration::from_secs(2));
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.dispatched, 8);
        assert_eq!(stats.succeeded, 7);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed(), 8);
        assert!((stats.success_rate() - 0.875).abs() < 0.001);
        assert!((stats.error_rate() - 0.125).abs() < 0.001);
        assert!((stats.invocations_per_second() - 4.0).abs() < 0.001);
    }

    #[test]
    fn test_counters_concurrent_updates() {
        let counters = std::sync::Arc::new(SessionCounters::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counters = std::sync::Arc::clone(&counters);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        counters.record_success();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counters.snapshot(Duration::ZERO).succeeded, 8000);
    }
}
