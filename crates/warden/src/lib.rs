//! Warden
//!
//! Decision core of a zero-trust access-control subsystem: a continuous
//! identity/risk verification engine coupled to a rule-based policy
//! evaluator. For a given subject and access request it decides allow,
//! deny, or challenge, from a fresh or recently cached multi-factor risk
//! score and a prioritized rule set.
//!
//! # Architecture
//!
//! This crate is a thin orchestrator over the subsystem crates. The
//! [`AccessEngine`] wires the verification pipeline (`warden-verify`) to
//! the policy evaluator (`warden-policy`) and applies the combining
//! rules: policy deny is absolute, and a policy allow under high live
//! risk degrades to a challenge. Cryptographic primitives, behavioral
//! models, SIEM transport, and network enforcement are external
//! collaborators reached through narrow contracts (method executors and
//! the telemetry sink).

pub mod compliance;
pub mod config;
pub mod engine;
pub mod error;
pub mod rules;

pub use compliance::{
    assess, ComplianceFramework, ComplianceReport, FrameworkReport, PolicyMapping, Requirement,
    RequirementReport, RequirementStatus,
};
pub use config::{PolicyConfig, SchedulerConfig, VerificationConfig, WardenConfig};
pub use engine::{AccessDecision, AccessEngine};
pub use error::{WardenError, WardenResult};
pub use rules::default_rules;

use std::sync::Arc;

use warden_policy::{PolicyEvaluator, PolicyStore};
use warden_verify::{
    BehaviorExecutor, DeviceTrustExecutor, ExecutorRegistry, FixedOutcomeExecutor,
    LocationTrustExecutor, MethodKind, MethodOutcome, Orchestrator,
};

/// Build an [`AccessEngine`] from configuration, with the built-in
/// reference executors and either the configured rule file or the
/// baseline rule set.
///
/// The cryptographic factor uses a deterministic stand-in here; real
/// deployments register an executor backed by their key-management
/// service through [`build_engine_with`].
pub fn build_engine(config: &WardenConfig) -> WardenResult<AccessEngine> {
    let executors = ExecutorRegistry::new()
        .with(Arc::new(DeviceTrustExecutor))
        .with(Arc::new(LocationTrustExecutor))
        .with(Arc::new(BehaviorExecutor))
        .with(Arc::new(FixedOutcomeExecutor::new(
            MethodKind::Cryptographic,
            MethodOutcome::succeeded(0.9),
        )));
    build_engine_with(config, executors)
}

/// Build an [`AccessEngine`] from configuration and a caller-provided
/// executor registry.
pub fn build_engine_with(
    config: &WardenConfig,
    executors: ExecutorRegistry,
) -> WardenResult<AccessEngine> {
    config.validate()?;

    let orchestrator = Arc::new(Orchestrator::new(config.verifier_config(), executors));

    let store = Arc::new(PolicyStore::new());
    match &config.policy.rules_path {
        Some(path) => {
            let raw = std::fs::read(path)?;
            let count = store.load_json(&raw)?;
            tracing::info!(count, path = %path.display(), "policy rules loaded");
        }
        None => {
            let count = store.load(default_rules())?;
            tracing::info!(count, "baseline policy rules loaded");
        }
    }
    let evaluator = Arc::new(PolicyEvaluator::new(store, config.evaluator_config()));

    Ok(AccessEngine::new(
        orchestrator,
        evaluator,
        config.policy.risk_threshold,
    ))
}
