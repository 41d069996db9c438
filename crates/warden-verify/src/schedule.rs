//! Adaptive re-verification scheduling.
//!
//! Two adjustment layers operate on different time scales:
//!
//! - A slow per-subject tuning loop reacts to observed error rate and
//!   latency, shrinking the interval under a high error rate (floored at
//!   half the base interval) and growing it when error rate is low and
//!   latency is under target (capped at twice the base interval).
//! - A fast per-event adjustment sets the next due time from each
//!   individual result: halved when that result's risk exceeds 0.7,
//!   stretched by 1.5 when it is under 0.3. It does not touch the tuned
//!   interval.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use warden_core::{RiskScore, SubjectId, Timestamp};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Starting re-verification cadence for every subject.
    pub base_interval: Duration,
    /// How often the tuning loop runs.
    pub tune_interval: Duration,
    /// Error rate above which the interval shrinks.
    pub high_error_rate: f64,
    /// Error rate below which the interval may grow.
    pub low_error_rate: f64,
    /// Latency target that gates interval growth.
    pub target_latency_ms: f64,
    pub shrink_factor: f64,
    pub grow_factor: f64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(300),
            tune_interval: Duration::from_secs(300),
            high_error_rate: 0.10,
            low_error_rate: 0.02,
            target_latency_ms: 500.0,
            shrink_factor: 0.8,
            grow_factor: 1.25,
        }
    }
}

// ---------------------------------------------------------------------------
// AdaptiveSchedule
// ---------------------------------------------------------------------------

/// Per-subject cadence state. Mutated only by the tuning loop and the
/// per-event adjustment; read by the monitor's trigger check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveSchedule {
    pub subject_id: SubjectId,
    pub current_interval: Duration,
    pub base_interval: Duration,
    /// current / base, for observability.
    pub adaptation_factor: f64,
    pub next_due: Timestamp,
}

impl AdaptiveSchedule {
    fn new(subject_id: SubjectId, base_interval: Duration, now: Timestamp) -> Self {
        Self {
            subject_id,
            current_interval: base_interval,
            base_interval,
            adaptation_factor: 1.0,
            // Due immediately: a newly registered subject has never been
            // verified.
            next_due: now,
        }
    }
}

// ---------------------------------------------------------------------------
// ScheduleStore
// ---------------------------------------------------------------------------

pub struct ScheduleStore {
    inner: Mutex<HashMap<SubjectId, AdaptiveSchedule>>,
    config: ScheduleConfig,
}

impl ScheduleStore {
    pub fn new(config: ScheduleConfig) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// Create the subject's schedule if absent.
    pub fn ensure(&self, subject: &SubjectId) {
        let mut map = self.inner.lock().expect("schedule store lock poisoned");
        map.entry(subject.clone()).or_insert_with(|| {
            AdaptiveSchedule::new(subject.clone(), self.config.base_interval, Timestamp::now())
        });
    }

    pub fn remove(&self, subject: &SubjectId) {
        let mut map = self.inner.lock().expect("schedule store lock poisoned");
        map.remove(subject);
    }

    pub fn get(&self, subject: &SubjectId) -> Option<AdaptiveSchedule> {
        let map = self.inner.lock().expect("schedule store lock poisoned");
        map.get(subject).cloned()
    }

    /// Slow tuning layer. Returns the new interval when it changed.
    pub fn tune(
        &self,
        subject: &SubjectId,
        error_rate: f64,
        average_latency_ms: f64,
    ) -> Option<Duration> {
        let mut map = self.inner.lock().expect("schedule store lock poisoned");
        let schedule = map.get_mut(subject)?;

        let current = schedule.current_interval;
        let base = schedule.base_interval;
        let updated = if error_rate > self.config.high_error_rate {
            current.mul_f64(self.config.shrink_factor).max(base.mul_f64(0.5))
        } else if error_rate < self.config.low_error_rate
            && average_latency_ms < self.config.target_latency_ms
        {
            current.mul_f64(self.config.grow_factor).min(base.mul_f64(2.0))
        } else {
            current
        };

        if updated == current {
            return None;
        }
        schedule.current_interval = updated;
        schedule.adaptation_factor = updated.as_secs_f64() / base.as_secs_f64();
        Some(updated)
    }

    /// Fast per-event layer: compute and store the next due time from one
    /// result's risk score. Returns the next verification time. A subject
    /// with no schedule (deregistered mid-flight) gets a computed time
    /// but no entry is created for it.
    pub fn record_result(&self, subject: &SubjectId, risk: RiskScore, now: Timestamp) -> Timestamp {
        let mut map = self.inner.lock().expect("schedule store lock poisoned");
        let current = match map.get(subject) {
            Some(schedule) => schedule.current_interval,
            None => self.config.base_interval,
        };

        let mut adjusted = current;
        if risk.value() > 0.7 {
            adjusted = adjusted.mul_f64(0.5);
        } else if risk.value() < 0.3 {
            adjusted = adjusted.mul_f64(1.5);
        }
        let next = now.plus(adjusted);
        if let Some(schedule) = map.get_mut(subject) {
            schedule.next_due = next;
        }
        next
    }

    /// Subjects whose next verification deadline has passed.
    pub fn due_subjects(&self, now: Timestamp) -> Vec<SubjectId> {
        let map = self.inner.lock().expect("schedule store lock poisoned");
        map.values()
            .filter(|s| s.next_due <= now)
            .map(|s| s.subject_id.clone())
            .collect()
    }

    /// Push the due time one interval out when a subject is enqueued, so
    /// the next tick does not enqueue it again while the verification is
    /// still in the queue.
    pub fn mark_enqueued(&self, subject: &SubjectId, now: Timestamp) {
        let mut map = self.inner.lock().expect("schedule store lock poisoned");
        if let Some(schedule) = map.get_mut(subject) {
            schedule.next_due = now.plus(schedule.current_interval);
        }
    }
}
