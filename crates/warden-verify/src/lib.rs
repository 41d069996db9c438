//! Warden Verification Engine
//!
//! Continuous multi-factor verification for registered subjects. The
//! pipeline orchestrator runs pluggable method executors in timed,
//! concurrently fanned-out stages, aggregates the results into a single
//! risk score, and caches results to avoid redundant work. An adaptive
//! scheduler re-triggers verification per subject, tightening the
//! cadence when risk or error rates climb.
//!
//! Key properties:
//! - One executor contract per verification factor; factors are added by
//!   registration, never by touching the orchestrator
//! - Timeouts at method and stage granularity; a timeout or executor
//!   fault degrades to a failed method result, never an aborted pipeline
//! - Fail-closed aggregation: no evidence means maximal risk
//! - Single-writer-per-key discipline over subject state
//! - Bounded work queue and fixed worker pool for scheduled runs

pub mod builtin;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod monitor;
pub mod pipeline;
pub mod registry;
pub mod risk;
pub mod schedule;
pub mod types;

pub use builtin::{
    BehaviorExecutor, DeviceTrustExecutor, FixedOutcomeExecutor, LocationTrustExecutor,
};
pub use error::{VerifyError, VerifyResult};
pub use executor::{ExecutorRegistry, MethodExecutor};
pub use metrics::{MetricsAggregator, MetricsSnapshot, SubjectMetrics, SystemMetrics};
pub use monitor::{MonitorConfig, MonitorHandle, VerificationMonitor};
pub use pipeline::{Orchestrator, PipelineConfig, StageConfig, VerifierConfig};
pub use registry::ContextRegistry;
pub use risk::RiskWeights;
pub use schedule::{AdaptiveSchedule, ScheduleConfig, ScheduleStore};
pub use types::{
    BehaviorBaseline, DeviceContext, LocationContext, MethodKind, MethodOutcome, MethodResult,
    VerificationContext, VerificationId, VerificationResult,
};
