//! Warden Core
//!
//! Shared vocabulary for the Warden continuous-verification engine:
//! identifier newtypes, timestamps, the clamped risk score and its bucket
//! levels, the telemetry event model and sink contract, and the generic
//! TTL/capacity-bounded cache used by both the verification pipeline and
//! the policy evaluator.

pub mod cache;
pub mod telemetry;
pub mod types;

pub use cache::{CacheEntry, CacheStats, TtlCache};
pub use telemetry::{
    InMemorySink, Severity, TelemetryEvent, TelemetryKind, TelemetrySink, TracingSink,
};
pub use types::{
    RequestId, ResourceId, RiskLevel, RiskScore, RuleId, SessionId, SubjectId, Timestamp,
};
