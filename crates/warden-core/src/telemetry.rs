//! Telemetry event model and sink contract.
//!
//! Every verification and policy decision emits a structured event to an
//! external log/SIEM collaborator. Emission is fire-and-forget: a sink
//! failure must never fail the decision that produced the event, so the
//! sink contract is infallible at the call site and implementations are
//! expected to swallow (and at most log) their own delivery errors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Event model
// ---------------------------------------------------------------------------

/// What kind of activity an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TelemetryKind {
    VerificationCompleted,
    PolicyDecision,
    AccessDecision,
    ScheduleAdjusted,
    RuleLog,
    RuleAlert,
    Escalation,
}

impl fmt::Display for TelemetryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryKind::VerificationCompleted => write!(f, "verification_completed"),
            TelemetryKind::PolicyDecision => write!(f, "policy_decision"),
            TelemetryKind::AccessDecision => write!(f, "access_decision"),
            TelemetryKind::ScheduleAdjusted => write!(f, "schedule_adjusted"),
            TelemetryKind::RuleLog => write!(f, "rule_log"),
            TelemetryKind::RuleAlert => write!(f, "rule_alert"),
            TelemetryKind::Escalation => write!(f, "escalation"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// A structured event bound for the external audit/SIEM collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub kind: TelemetryKind,
    pub severity: Severity,
    /// Component that produced the event (e.g. "pipeline", "policy").
    pub source: String,
    pub details: String,
    pub timestamp: Timestamp,
}

impl TelemetryEvent {
    pub fn new(
        kind: TelemetryKind,
        severity: Severity,
        source: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            source: source.into(),
            details: details.into(),
            timestamp: Timestamp::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// TelemetrySink trait
// ---------------------------------------------------------------------------

/// Destination for telemetry events.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: &TelemetryEvent);
}

/// Sink that forwards events to the `tracing` subscriber.
#[derive(Debug, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&self, event: &TelemetryEvent) {
        match event.severity {
            Severity::Info => tracing::info!(
                kind = %event.kind,
                source = %event.source,
                "{}",
                event.details
            ),
            Severity::Warning => tracing::warn!(
                kind = %event.kind,
                source = %event.source,
                "{}",
                event.details
            ),
            Severity::Critical => tracing::error!(
                kind = %event.kind,
                source = %event.source,
                "{}",
                event.details
            ),
        }
    }
}

/// In-memory sink for testing.
#[derive(Default)]
pub struct InMemorySink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .expect("telemetry sink lock poisoned")
            .clone()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .expect("telemetry sink lock poisoned")
            .clear();
    }
}

impl TelemetrySink for InMemorySink {
    fn emit(&self, event: &TelemetryEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
