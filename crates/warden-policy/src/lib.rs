//! Warden Policy Engine
//!
//! Ordered, condition/action rule engine producing allow/deny/challenge.
//! Every access request is evaluated against a copy-on-read snapshot of
//! the enabled rules, sorted by descending priority.
//!
//! Key properties:
//! - Deny-overrides combining with a critical-priority short-circuit
//! - Pre-compiled field accessors bound at rule-load time (no runtime
//!   reflection on the hot path)
//! - Eager rule validation that reports every violation at once
//! - Versioned store: updates supersede, never mutate, so in-flight
//!   evaluations keep a consistent view
//! - SHA-256 composite cache key over (subject, resource, action, scope)
//! - Resolution always terminates in exactly one of allow/deny/challenge

pub mod accessor;
pub mod engine;
pub mod error;
pub mod rule;
pub mod store;
pub mod types;

pub use accessor::{CompiledCondition, FieldAccessor};
pub use engine::{EvaluatorConfig, PolicyEvaluator};
pub use error::{PolicyError, PolicyResult};
pub use rule::{validate_rule, CompiledRule};
pub use store::PolicyStore;
pub use types::{
    AccessAction, AccessRequest, ActionKind, ConditionOperator, FieldValue, Obligation,
    PolicyAction, PolicyCondition, PolicyDecision, PolicyEvaluationResult, PolicyRule,
    PolicyViolation, RuleCategory, RuleMetadata, RuleOutcome,
};
