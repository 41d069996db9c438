//! Per-subject and system-wide verification counters.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use warden_core::{RiskScore, SubjectId, Timestamp};

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubjectMetrics {
    pub total_verifications: u64,
    pub successes: u64,
    pub failures: u64,
    pub cache_hits: u64,
    pub total_latency_ms: u64,
    pub last_risk: Option<RiskScore>,
    pub last_verified: Option<Timestamp>,
}

impl SubjectMetrics {
    /// Fraction of executed verifications that failed. Cache hits do not
    /// count as executions.
    pub fn error_rate(&self) -> f64 {
        if self.total_verifications == 0 {
            0.0
        } else {
            self.failures as f64 / self.total_verifications as f64
        }
    }

    pub fn average_latency_ms(&self) -> f64 {
        if self.total_verifications == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.total_verifications as f64
        }
    }
}

/// System-wide aggregate over all subjects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub subjects: usize,
    pub total_verifications: u64,
    pub successes: u64,
    pub failures: u64,
    pub cache_hits: u64,
    pub average_latency_ms: f64,
}

/// Periodic export payload for external dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub taken_at: Timestamp,
    pub system: SystemMetrics,
    pub subjects: HashMap<String, SubjectMetrics>,
}

// ---------------------------------------------------------------------------
// MetricsAggregator
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MetricsAggregator {
    inner: Mutex<HashMap<SubjectId, SubjectMetrics>>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_verification(
        &self,
        subject: &SubjectId,
        success: bool,
        risk: RiskScore,
        latency_ms: u64,
    ) {
        let mut map = self.inner.lock().expect("metrics lock poisoned");
        let metrics = map.entry(subject.clone()).or_default();
        metrics.total_verifications += 1;
        if success {
            metrics.successes += 1;
        } else {
            metrics.failures += 1;
        }
        metrics.total_latency_ms += latency_ms;
        metrics.last_risk = Some(risk);
        metrics.last_verified = Some(Timestamp::now());
    }

    pub fn record_cache_hit(&self, subject: &SubjectId) {
        let mut map = self.inner.lock().expect("metrics lock poisoned");
        map.entry(subject.clone()).or_default().cache_hits += 1;
    }

    pub fn subject(&self, subject: &SubjectId) -> Option<SubjectMetrics> {
        let map = self.inner.lock().expect("metrics lock poisoned");
        map.get(subject).cloned()
    }

    pub fn remove(&self, subject: &SubjectId) {
        let mut map = self.inner.lock().expect("metrics lock poisoned");
        map.remove(subject);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let map = self.inner.lock().expect("metrics lock poisoned");
        let mut system = SystemMetrics {
            subjects: map.len(),
            ..Default::default()
        };
        for metrics in map.values() {
            system.total_verifications += metrics.total_verifications;
            system.successes += metrics.successes;
            system.failures += metrics.failures;
            system.cache_hits += metrics.cache_hits;
        }
        let total_latency: u64 = map.values().map(|m| m.total_latency_ms).sum();
        system.average_latency_ms = if system.total_verifications == 0 {
            0.0
        } else {
            total_latency as f64 / system.total_verifications as f64
        };

        MetricsSnapshot {
            taken_at: Timestamp::now(),
            system,
            subjects: map
                .iter()
                .map(|(id, m)| (id.to_string(), m.clone()))
                .collect(),
        }
    }
}
