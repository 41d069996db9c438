//! End-to-end integration test: "Does it actually work?"
//!
//! This test tells a story:
//!
//! 1. A subject (an automation agent) registers with Warden
//! 2. The pipeline verifies it across factors and scores its risk
//! 3. The policy evaluator turns risk and posture into a decision
//! 4. A second request is served from the result cache
//! 5. Live risk climbs and a policy allow degrades to a challenge
//! 6. An administrator ships a bad rule and gets every violation back
//! 7. The background monitor re-verifies on its own schedule
//! 8. Compliance reporting scores the rule coverage
//! 9. Deregistration purges the subject everywhere
//!
//! What's real: the full pipeline (stages, timeouts, aggregation), the
//! rule engine, caching, scheduling, and metrics. What's simulated: the
//! factor scorers themselves, which stand behind the executor contract
//! exactly as external HSM/model services would.

use std::sync::Arc;
use std::time::Duration;

use warden::{assess, build_engine, AccessEngine, ComplianceFramework, WardenConfig};
use warden_core::{ResourceId, RiskLevel, RuleId, SubjectId};
use warden_policy::{
    AccessAction, ActionKind, ConditionOperator, EvaluatorConfig, FieldValue, Obligation,
    PolicyAction, PolicyCondition, PolicyDecision, PolicyEvaluator, PolicyRule, PolicyStore,
    RuleCategory,
};
use warden_verify::{
    ExecutorRegistry, FixedOutcomeExecutor, MethodKind, MethodOutcome, MonitorConfig, Orchestrator,
    PipelineConfig, StageConfig, VerifierConfig,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn risk_rule(id: &str, priority: i64, operator: ConditionOperator, bound: f64, action: ActionKind) -> PolicyRule {
    PolicyRule {
        id: RuleId::new(id),
        name: format!("rule {}", id),
        category: RuleCategory::Authorization,
        priority,
        conditions: vec![PolicyCondition {
            field: "risk.score".to_string(),
            operator,
            value: FieldValue::Number(bound),
            negate: false,
        }],
        actions: vec![PolicyAction::of(action)],
        metadata: Default::default(),
        enabled: true,
        version: 1,
    }
}

/// Engine with a single deterministic cryptographic factor so the risk
/// score is exactly `1 - confidence`.
fn engine_with_confidence(confidence: f64, rules: Vec<PolicyRule>) -> AccessEngine {
    let executors = ExecutorRegistry::new().with(Arc::new(FixedOutcomeExecutor::new(
        MethodKind::Cryptographic,
        MethodOutcome::succeeded(confidence),
    )));
    let config = VerifierConfig {
        pipeline: PipelineConfig {
            stages: vec![StageConfig {
                name: "identity".to_string(),
                methods: vec![MethodKind::Cryptographic],
                timeout_ms: 500,
            }],
            fail_fast: false,
            method_timeout_ms: 200,
        },
        ..Default::default()
    };
    let orchestrator = Arc::new(Orchestrator::new(config, executors));
    let store = Arc::new(PolicyStore::new());
    store.load(rules).unwrap();
    let evaluator = Arc::new(PolicyEvaluator::new(store, EvaluatorConfig::default()));
    AccessEngine::new(orchestrator, evaluator, 0.7)
}

// ============================================================================
// Chapter 1: registration and a clean first decision
// ============================================================================

#[tokio::test]
async fn chapter_1_register_verify_allow() {
    let engine = engine_with_confidence(
        0.95,
        vec![risk_rule("allow-calm", 100, ConditionOperator::LessThan, 0.3, ActionKind::Allow)],
    );
    let subject = SubjectId::new("agent-7");
    assert!(engine.register_subject(subject.clone()));

    let decision = engine
        .authorize(&subject, ResourceId::new("db/orders"), AccessAction::Read)
        .await
        .unwrap();

    assert_eq!(decision.decision, PolicyDecision::Allow);
    assert!(decision.success);
    assert_eq!(decision.risk_score.level(), RiskLevel::Low);
    assert!(decision.obligations.contains(&Obligation::LogDecision));

    // The verification left its traces everywhere it should.
    let context = engine.orchestrator().contexts().get(&subject).unwrap();
    assert!(context.last_verified.is_some());
    assert_eq!(context.risk, decision.risk_score);
    assert!(decision.verification.next_verification > decision.verification.timestamp);
}

// ============================================================================
// Chapter 2: the cache absorbs the second request
// ============================================================================

#[tokio::test]
async fn chapter_2_second_request_hits_cache() {
    let engine = engine_with_confidence(
        0.95,
        vec![risk_rule("allow-calm", 100, ConditionOperator::LessThan, 0.3, ActionKind::Allow)],
    );
    let subject = SubjectId::new("agent-7");
    engine.register_subject(subject.clone());

    let first = engine
        .authorize(&subject, ResourceId::new("db/orders"), AccessAction::Read)
        .await
        .unwrap();
    let second = engine
        .authorize(&subject, ResourceId::new("db/orders"), AccessAction::Read)
        .await
        .unwrap();

    // Same verification run backs both decisions; no pipeline re-execution.
    assert_eq!(first.verification.id, second.verification.id);
    let metrics = engine
        .orchestrator()
        .metrics()
        .subject(&subject)
        .unwrap();
    assert_eq!(metrics.total_verifications, 1);
    assert_eq!(metrics.cache_hits, 1);
}

// ============================================================================
// Chapter 3: deny overrides, challenge under live risk
// ============================================================================

#[tokio::test]
async fn chapter_3_deny_overrides_and_risk_downgrade() {
    // Deny at priority 200 plus allow at 50: deny wins.
    let engine = engine_with_confidence(
        0.95,
        vec![
            risk_rule("allow-low", 50, ConditionOperator::LessThan, 1.0, ActionKind::Allow),
            risk_rule("deny-high", 200, ConditionOperator::LessThan, 1.0, ActionKind::Deny),
        ],
    );
    let subject = SubjectId::new("agent-7");
    engine.register_subject(subject.clone());
    let decision = engine
        .authorize(&subject, ResourceId::new("db/orders"), AccessAction::Read)
        .await
        .unwrap();
    assert_eq!(decision.decision, PolicyDecision::Deny);
    assert!(!decision.success);
    assert!(!decision.policy.violations.is_empty());

    // Confidence 0.25 -> risk 0.75: policy says allow, live risk says
    // challenge.
    let engine = engine_with_confidence(
        0.25,
        vec![risk_rule("allow-any", 100, ConditionOperator::LessThan, 1.0, ActionKind::Allow)],
    );
    let subject = SubjectId::new("agent-9");
    engine.register_subject(subject.clone());
    let decision = engine
        .authorize(&subject, ResourceId::new("db/orders"), AccessAction::Read)
        .await
        .unwrap();
    assert_eq!(decision.policy.decision, PolicyDecision::Allow);
    assert_eq!(decision.decision, PolicyDecision::Challenge);
}

// ============================================================================
// Chapter 4: administration rejects bad rules loudly
// ============================================================================

#[tokio::test]
async fn chapter_4_rule_administration() {
    let engine = engine_with_confidence(
        0.95,
        vec![risk_rule("allow-calm", 100, ConditionOperator::LessThan, 0.3, ActionKind::Allow)],
    );
    let store = engine.evaluator().store();

    // A rule with no conditions and no actions reports both problems.
    let bad = PolicyRule {
        id: RuleId::new("broken"),
        name: "broken rule".to_string(),
        category: RuleCategory::Authorization,
        priority: 1,
        conditions: vec![],
        actions: vec![],
        metadata: Default::default(),
        enabled: true,
        version: 1,
    };
    let err = store.add_rule(bad).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("at least one condition required"));
    assert!(message.contains("at least one action required"));

    // Updating supersedes: version moves forward, old Arc stays intact.
    let before = store.get(&RuleId::new("allow-calm")).unwrap();
    let mut updated = risk_rule("allow-calm", 150, ConditionOperator::LessThan, 0.4, ActionKind::Allow);
    updated.name = "allow calm subjects v2".to_string();
    let version = store.update_rule(updated).unwrap();
    assert_eq!(version, 2);
    assert_eq!(before.rule.version, 1);
    assert_eq!(store.get(&RuleId::new("allow-calm")).unwrap().rule.priority, 150);
}

// ============================================================================
// Chapter 5: the monitor re-verifies on its own
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn chapter_5_background_monitor() {
    let engine = engine_with_confidence(
        0.95,
        vec![risk_rule("allow-calm", 100, ConditionOperator::LessThan, 0.3, ActionKind::Allow)],
    );
    let subject = SubjectId::new("agent-7");
    engine.register_subject(subject.clone());

    let handle = engine.spawn_monitor(MonitorConfig {
        tick_interval: Duration::from_millis(10),
        queue_size: 8,
        workers: 2,
    });

    let mut verified = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if let Some(metrics) = engine.orchestrator().metrics().subject(&subject) {
            if metrics.total_verifications >= 1 {
                verified = true;
                break;
            }
        }
    }
    handle.shutdown().await;
    assert!(verified, "monitor never verified the due subject");

    let snapshot = engine.metrics_snapshot();
    assert!(snapshot.system.total_verifications >= 1);
    assert_eq!(snapshot.system.subjects, 1);
}

// ============================================================================
// Chapter 6: compliance coverage over the live rule store
// ============================================================================

#[tokio::test]
async fn chapter_6_compliance_report() {
    let engine = engine_with_confidence(
        0.95,
        vec![
            risk_rule("allow-calm", 100, ConditionOperator::LessThan, 0.3, ActionKind::Allow),
            risk_rule("deny-hot", 200, ConditionOperator::GreaterThan, 0.8, ActionKind::Deny),
        ],
    );

    let frameworks = vec![ComplianceFramework {
        id: "soc2".to_string(),
        name: "SOC 2".to_string(),
        requirements: vec![
            warden::Requirement {
                id: "cc6.1".to_string(),
                description: "logical access controls".to_string(),
                mappings: vec![warden::PolicyMapping {
                    rule_id: RuleId::new("deny-hot"),
                    coverage: 0.9,
                }],
            },
            warden::Requirement {
                id: "cc6.2".to_string(),
                description: "access revocation".to_string(),
                mappings: vec![],
            },
        ],
        active: true,
    }];

    let report = assess(&frameworks, engine.evaluator().store());
    assert_eq!(report.frameworks.len(), 1);
    // One of two requirements met.
    assert!((report.frameworks[0].score - 50.0).abs() < 1e-9);
    assert!((report.overall_score - 50.0).abs() < 1e-9);
}

// ============================================================================
// Chapter 7: deregistration is terminal
// ============================================================================

#[tokio::test]
async fn chapter_7_deregistration_purges() {
    let engine = engine_with_confidence(
        0.95,
        vec![risk_rule("allow-calm", 100, ConditionOperator::LessThan, 0.3, ActionKind::Allow)],
    );
    let subject = SubjectId::new("agent-7");
    engine.register_subject(subject.clone());
    engine
        .authorize(&subject, ResourceId::new("db/orders"), AccessAction::Read)
        .await
        .unwrap();

    assert!(engine.deregister_subject(&subject));
    assert!(engine.orchestrator().contexts().get(&subject).is_none());
    assert!(engine.orchestrator().schedules().get(&subject).is_none());

    let err = engine
        .authorize(&subject, ResourceId::new("db/orders"), AccessAction::Read)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not registered"));
}

// ============================================================================
// Chapter 8: the packaged engine with built-in executors
// ============================================================================

#[tokio::test]
async fn chapter_8_default_engine_end_to_end() {
    let engine = build_engine(&WardenConfig::default()).unwrap();

    let subject = SubjectId::new("agent-7");
    engine.register_subject(subject.clone());
    // Give the subject a trustworthy posture so the built-in factors
    // score it well.
    engine.orchestrator().contexts().update(&subject, |context| {
        context.device.device_id = Some("laptop-1".to_string());
        context.device.managed = true;
        context.device.compliant = true;
        context.location.country = Some("DE".to_string());
        context.baseline.typical_countries = vec!["DE".to_string()];
        context.baseline.typical_devices = vec!["laptop-1".to_string()];
    });

    let decision = engine
        .authorize(&subject, ResourceId::new("db/orders"), AccessAction::Read)
        .await
        .unwrap();

    assert_eq!(decision.decision, PolicyDecision::Allow);
    assert!(decision.success);
    assert!(decision.risk_score.level() <= RiskLevel::Medium);
    // Every configured factor produced a result.
    assert_eq!(decision.verification.method_results.len(), 4);
}
