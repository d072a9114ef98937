//! Per-method timing registry.
//!
//! Durations are stored in microseconds, in call order.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Calls and durations recorded for one method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodTimings {
    /// Number of calls since the last reset.
    pub call_count: u64,
    /// Duration of each call in microseconds, in call order.
    pub durations_us: Vec<u64>,
}

impl MethodTimings {
    fn record(&mut self, duration_us: u64) {
        self.call_count += 1;
        self.durations_us.push(duration_us);
    }

    /// Aggregate the recorded durations.
    pub fn summary(&self) -> TimingSummary {
        let count = self.call_count;
        let sum: u64 = self.durations_us.iter().sum();
        let min = self.durations_us.iter().copied().min().unwrap_or(0);
        let max = self.durations_us.iter().copied().max().unwrap_or(0);
        let average = if self.durations_us.is_empty() {
            0.0
        } else {
            sum as f64 / self.durations_us.len() as f64
        };
        TimingSummary {
            count,
            min,
            max,
            average,
            sum,
        }
    }
}

/// Aggregated timings of one method, in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingSummary {
    pub count: u64,
    pub min: u64,
    pub max: u64,
    pub average: f64,
    pub sum: u64,
}

/// Registry of method timings keyed by method name.
#[derive(Debug, Default)]
pub struct TimingRegistry {
    methods: Mutex<HashMap<&'static str, MethodTimings>>,
}

impl TimingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call of `method`.
    pub fn record(&self, method: &'static str, elapsed: Duration) {
        let duration_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.methods
            .lock()
            .entry(method)
            .or_default()
            .record(duration_us);
    }

    /// Zero the call count and durations of `method`.
    pub fn reset(&self, method: &str) {
        if let Some(timings) = self.methods.lock().get_mut(method) {
            *timings = MethodTimings::default();
        }
    }

    /// Zero every method.
    pub fn reset_all(&self) {
        self.methods.lock().clear();
    }

    /// Snapshot of the timings of `method`.
    pub fn timings(&self, method: &str) -> MethodTimings {
        self.methods
            .lock()
            .get(method)
            .cloned()
            .unwrap_or_default()
    }

    pub fn call_count(&self, method: &str) -> u64 {
        self.methods
            .lock()
            .get(method)
            .map_or(0, |timings| timings.call_count)
    }

    pub fn summary(&self, method: &str) -> TimingSummary {
        self.methods
            .lock()
            .get(method)
            .map(MethodTimings::summary)
            .unwrap_or_default()
    }

    /// Names of all methods with at least one recorded call, sorted.
    pub fn methods(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .methods
            .lock()
            .iter()
            .filter(|(_, timings)| timings.call_count > 0)
            .map(|(name, _)| *name)
            .collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_summary() {
        let registry = TimingRegistry::new();
        registry.record("ttr", Duration::from_micros(10));
        registry.record("ttr", Duration::from_micros(30));
        registry.record("ttr", Duration::from_micros(20));

        let timings = registry.timings("ttr");
        assert_eq!(timings.call_count, 3);
        assert_eq!(timings.durations_us, vec![10, 30, 20]);

        let summary = registry.summary("ttr");
        assert_eq!(summary.count, 3);
        assert_eq!(summary.min, 10);
        assert_eq!(summary.max, 30);
        assert_eq!(summary.sum, 60);
        assert!((summary.average - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reset_single_method() {
        let registry = TimingRegistry::new();
        registry.record("idf", Duration::from_micros(5));
        registry.record("tfidf", Duration::from_micros(5));

        registry.reset("idf");

        assert_eq!(registry.call_count("idf"), 0);
        assert!(registry.timings("idf").durations_us.is_empty());
        assert_eq!(registry.call_count("tfidf"), 1);
        assert_eq!(registry.methods(), vec!["tfidf"]);
    }

    #[test]
    fn test_unknown_method_is_empty() {
        let registry = TimingRegistry::new();
        assert_eq!(registry.summary("nothing"), TimingSummary::default());
        registry.reset("nothing");
    }
}
