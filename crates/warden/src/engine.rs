//! The access engine: decision combiner and subsystem facade.
//!
//! Merges a fresh (or freshly cached) verification risk score with the
//! policy evaluator's decision:
//!
//! - a policy deny is absolute;
//! - a policy allow is downgraded to challenge when live risk is at or
//!   above the configured threshold, so policy alone never grants trust
//!   when live risk is high;
//! - overall success requires a successful verification, a non-deny
//!   decision, and risk below the critical bucket.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use warden_core::{
    RequestId, ResourceId, RiskScore, Severity, SubjectId, TelemetryEvent, TelemetryKind,
    TelemetrySink, Timestamp, TracingSink,
};
use warden_policy::{
    AccessAction, AccessRequest, FieldValue, Obligation, PolicyDecision, PolicyEvaluationResult,
    PolicyEvaluator,
};
use warden_verify::{MonitorConfig, MonitorHandle, Orchestrator, VerificationMonitor, VerificationResult};

use crate::error::WardenResult;

// ---------------------------------------------------------------------------
// AccessDecision
// ---------------------------------------------------------------------------

/// Final combined access decision, with both component results attached
/// for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessDecision {
    pub request_id: RequestId,
    pub subject_id: SubjectId,
    pub resource_id: ResourceId,
    pub decision: PolicyDecision,
    pub success: bool,
    pub risk_score: RiskScore,
    pub obligations: Vec<Obligation>,
    pub verification: VerificationResult,
    pub policy: PolicyEvaluationResult,
    pub decided_at: Timestamp,
}

// ---------------------------------------------------------------------------
// AccessEngine
// ---------------------------------------------------------------------------

pub struct AccessEngine {
    orchestrator: Arc<Orchestrator>,
    evaluator: Arc<PolicyEvaluator>,
    sink: Arc<dyn TelemetrySink>,
    risk_threshold: f64,
}

impl std::fmt::Debug for AccessEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessEngine")
            .field("risk_threshold", &self.risk_threshold)
            .finish_non_exhaustive()
    }
}

impl AccessEngine {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        evaluator: Arc<PolicyEvaluator>,
        risk_threshold: f64,
    ) -> Self {
        Self::with_sink(orchestrator, evaluator, risk_threshold, Arc::new(TracingSink))
    }

    pub fn with_sink(
        orchestrator: Arc<Orchestrator>,
        evaluator: Arc<PolicyEvaluator>,
        risk_threshold: f64,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            orchestrator,
            evaluator,
            sink,
            risk_threshold,
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn evaluator(&self) -> &Arc<PolicyEvaluator> {
        &self.evaluator
    }

    /// Decide whether `subject` may perform `action` on `resource`.
    ///
    /// Runs verification first so the policy evaluator sees the live risk
    /// score, then combines both outputs. Fails only for an unregistered
    /// subject.
    pub async fn authorize(
        &self,
        subject: &SubjectId,
        resource: ResourceId,
        action: AccessAction,
    ) -> WardenResult<AccessDecision> {
        let verification = self.orchestrator.verify_now(subject).await?;
        let risk = verification.risk_score;

        let request = self.build_request(subject, resource.clone(), action, risk);
        let policy = self.evaluator.evaluate(&request);

        let mut decision = policy.decision;
        if decision == PolicyDecision::Allow && risk.value() >= self.risk_threshold {
            // The zero-trust coupling point.
            decision = PolicyDecision::Challenge;
        }

        let success = verification.success && decision != PolicyDecision::Deny && !risk.is_critical();

        let access = AccessDecision {
            request_id: request.request_id.clone(),
            subject_id: subject.clone(),
            resource_id: resource,
            decision,
            success,
            risk_score: risk,
            obligations: policy.obligations.clone(),
            verification,
            policy,
            decided_at: Timestamp::now(),
        };

        self.sink.emit(&TelemetryEvent::new(
            TelemetryKind::AccessDecision,
            if decision == PolicyDecision::Allow {
                Severity::Info
            } else {
                Severity::Warning
            },
            "engine",
            format!(
                "subject={} resource={} decision={} risk={}",
                access.subject_id, access.resource_id, access.decision, access.risk_score
            ),
        ));

        Ok(access)
    }

    /// Build the policy evaluation context, projecting the subject's
    /// stored posture into request attributes so rules can reference it.
    fn build_request(
        &self,
        subject: &SubjectId,
        resource: ResourceId,
        action: AccessAction,
        risk: RiskScore,
    ) -> AccessRequest {
        let mut request = AccessRequest::new(subject.clone(), resource, action, risk);
        if let Some(context) = self.orchestrator.contexts().get(subject) {
            request = request.with_attribute(
                "device_managed",
                FieldValue::Bool(context.device.managed),
            );
            request = request.with_attribute(
                "device_compliant",
                FieldValue::Bool(context.device.compliant),
            );
            request = request.with_attribute("vpn", FieldValue::Bool(context.location.vpn));
            if let Some(country) = &context.location.country {
                request = request.with_attribute("country", FieldValue::text(country.clone()));
            }
        }
        request
    }

    pub fn register_subject(&self, subject: SubjectId) -> bool {
        self.orchestrator.register_subject(subject)
    }

    pub fn register_context(&self, context: warden_verify::VerificationContext) {
        self.orchestrator.register_context(context);
    }

    pub fn deregister_subject(&self, subject: &SubjectId) -> bool {
        self.orchestrator.deregister_subject(subject)
    }

    pub fn metrics_snapshot(&self) -> warden_verify::MetricsSnapshot {
        self.orchestrator.metrics().snapshot()
    }

    /// Start the background re-verification monitor.
    pub fn spawn_monitor(&self, config: MonitorConfig) -> MonitorHandle {
        VerificationMonitor::spawn(self.orchestrator.clone(), config)
    }
}
