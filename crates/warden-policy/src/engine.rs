//! Policy evaluation engine.
//!
//! Evaluates an [`AccessRequest`] against a snapshot of the enabled rules,
//! producing a three-way decision: allow, deny, or challenge. Resolution
//! follows deny-overrides: the first matched deny wins, and once a rule at
//! or above the critical priority denies, evaluation short-circuits.
//! Otherwise the first matched decisive action in priority order sets the
//! decision, and an empty match set falls back to the configured default.
//!
//! Results are cached under a SHA-256 composite key over subject, resource,
//! action, and the sorted rule scope.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use warden_core::{
    RiskLevel, RuleId, Severity, TelemetryEvent, TelemetryKind, TelemetrySink, Timestamp,
    TracingSink, TtlCache,
};

use crate::rule::CompiledRule;
use crate::store::PolicyStore;
use crate::types::{
    AccessRequest, ActionKind, Obligation, PolicyDecision, PolicyEvaluationResult,
    PolicyViolation, RuleOutcome,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Decision when no rule matches: deny (default) or allow.
    pub default_deny: bool,
    /// Priority at or above which a deny short-circuits evaluation.
    pub critical_priority: i64,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            default_deny: true,
            critical_priority: 1000,
            cache_capacity: 1024,
            cache_ttl: Duration::from_secs(60),
        }
    }
}

// ---------------------------------------------------------------------------
// PolicyEvaluator
// ---------------------------------------------------------------------------

pub struct PolicyEvaluator {
    store: Arc<PolicyStore>,
    cache: TtlCache<String, PolicyEvaluationResult>,
    sink: Arc<dyn TelemetrySink>,
    config: EvaluatorConfig,
}

impl PolicyEvaluator {
    pub fn new(store: Arc<PolicyStore>, config: EvaluatorConfig) -> Self {
        Self::with_sink(store, config, Arc::new(TracingSink))
    }

    pub fn with_sink(
        store: Arc<PolicyStore>,
        config: EvaluatorConfig,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            cache: TtlCache::new(config.cache_capacity, config.cache_ttl),
            store,
            sink,
            config,
        }
    }

    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    /// Evaluate against all enabled rules, consulting the result cache.
    pub fn evaluate(&self, request: &AccessRequest) -> PolicyEvaluationResult {
        self.evaluate_scoped(request, &[])
    }

    /// Evaluate against the given rule scope, consulting the result cache.
    pub fn evaluate_scoped(
        &self,
        request: &AccessRequest,
        scope: &[RuleId],
    ) -> PolicyEvaluationResult {
        let key = cache_key(request, scope);
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }
        let result = self.evaluate_uncached(request, scope);
        self.cache.put(key, result.clone());
        result
    }

    /// Evaluate without touching the cache. Deterministic for a fixed rule
    /// set and request.
    pub fn evaluate_uncached(
        &self,
        request: &AccessRequest,
        scope: &[RuleId],
    ) -> PolicyEvaluationResult {
        let start = Instant::now();
        let snapshot = self.store.snapshot(scope);

        let mut rule_results = Vec::with_capacity(snapshot.len());
        let mut violations = Vec::new();
        let mut obligations = vec![Obligation::LogDecision];
        let mut candidate: Option<PolicyDecision> = None;
        let mut denied = false;
        let mut matched_high_risk = false;
        let mut ratio_sum = 0.0;

        for compiled in &snapshot {
            let (matched, conditions_matched) = compiled.match_against(request);
            let conditions_total = compiled.conditions_total();

            let mut resolved_action = None;
            if matched {
                ratio_sum += conditions_matched as f64 / conditions_total as f64;
                if compiled.rule.metadata.risk_level >= RiskLevel::High {
                    matched_high_risk = true;
                }
                resolved_action = self.run_actions(compiled, request, &mut obligations);

                match resolved_action {
                    Some(ActionKind::Deny) => {
                        denied = true;
                        violations.push(PolicyViolation {
                            rule_id: compiled.rule.id.clone(),
                            rule_name: compiled.rule.name.clone(),
                            risk_level: compiled.rule.metadata.risk_level,
                            message: format!(
                                "rule '{}' denied {} on {}",
                                compiled.rule.name, request.action, request.resource_id
                            ),
                        });
                    }
                    Some(ActionKind::Allow) => {
                        if candidate.is_none() {
                            candidate = Some(PolicyDecision::Allow);
                        }
                    }
                    Some(ActionKind::Challenge) => {
                        if candidate.is_none() {
                            candidate = Some(PolicyDecision::Challenge);
                        }
                    }
                    _ => {}
                }
            }

            rule_results.push(RuleOutcome {
                rule_id: compiled.rule.id.clone(),
                matched,
                conditions_matched,
                conditions_total,
                resolved_action,
            });

            // A deny from a rule at or above the critical priority makes
            // the remaining rules unreachable.
            if denied && compiled.rule.priority >= self.config.critical_priority {
                break;
            }
        }

        let decision = if denied {
            PolicyDecision::Deny
        } else if let Some(candidate) = candidate {
            candidate
        } else if self.config.default_deny {
            PolicyDecision::Deny
        } else {
            PolicyDecision::Allow
        };

        if decision == PolicyDecision::Allow && matched_high_risk {
            obligations.push(Obligation::EnhancedMonitoring);
        }

        let confidence = if rule_results.is_empty() {
            0.0
        } else {
            ratio_sum / rule_results.len() as f64
        };

        let result = PolicyEvaluationResult {
            request_id: request.request_id.clone(),
            decision,
            confidence,
            rule_results,
            violations,
            obligations,
            evaluated_at: Timestamp::now(),
            duration_ms: start.elapsed().as_millis() as u64,
        };

        self.sink.emit(&TelemetryEvent::new(
            TelemetryKind::PolicyDecision,
            if decision == PolicyDecision::Allow {
                Severity::Info
            } else {
                Severity::Warning
            },
            "policy",
            format!(
                "subject={} resource={} action={} decision={}",
                request.subject_id, request.resource_id, request.action, decision
            ),
        ));

        result
    }

    /// Execute a matched rule's actions in order. Log/alert/escalate are
    /// side effects only; the returned value is the rule's decisive action,
    /// if it had one.
    fn run_actions(
        &self,
        compiled: &CompiledRule,
        request: &AccessRequest,
        obligations: &mut Vec<Obligation>,
    ) -> Option<ActionKind> {
        let mut decisive = None;
        for action in &compiled.rule.actions {
            match action.kind {
                ActionKind::Allow | ActionKind::Deny | ActionKind::Challenge => {
                    if decisive.is_none() {
                        decisive = Some(action.kind);
                    }
                }
                ActionKind::Log => {
                    self.sink.emit(&TelemetryEvent::new(
                        TelemetryKind::RuleLog,
                        Severity::Info,
                        "policy",
                        format!("rule '{}' matched subject={}", compiled.rule.id, request.subject_id),
                    ));
                }
                ActionKind::Alert => {
                    self.sink.emit(&TelemetryEvent::new(
                        TelemetryKind::RuleAlert,
                        Severity::Warning,
                        "policy",
                        format!(
                            "rule '{}' alert: subject={} resource={}",
                            compiled.rule.id, request.subject_id, request.resource_id
                        ),
                    ));
                }
                ActionKind::Escalate => {
                    let target = action
                        .parameters
                        .get("target")
                        .cloned()
                        .unwrap_or_else(|| "security-operations".to_string());
                    self.sink.emit(&TelemetryEvent::new(
                        TelemetryKind::Escalation,
                        Severity::Warning,
                        "policy",
                        format!("rule '{}' escalated to {}", compiled.rule.id, target),
                    ));
                    let escalation = Obligation::Escalation { target };
                    if !obligations.contains(&escalation) {
                        obligations.push(escalation);
                    }
                }
            }
        }
        decisive
    }

    /// Drop expired cached evaluations. Returns the number removed.
    pub fn sweep_cache(&self) -> usize {
        self.cache.sweep_expired()
    }

    pub fn cache_stats(&self) -> warden_core::CacheStats {
        self.cache.stats()
    }
}

/// Deterministic, collision-resistant cache key over subject, resource,
/// action, and the sorted rule scope.
fn cache_key(request: &AccessRequest, scope: &[RuleId]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.subject_id.as_str().as_bytes());
    hasher.update([0x1f]);
    hasher.update(request.resource_id.as_str().as_bytes());
    hasher.update([0x1f]);
    hasher.update(request.action.to_string().as_bytes());
    hasher.update([0x1f]);

    let mut sorted: Vec<&str> = scope.iter().map(|id| id.as_str()).collect();
    sorted.sort_unstable();
    for id in sorted {
        hasher.update(id.as_bytes());
        hasher.update([0x1e]);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AccessAction, ConditionOperator, FieldValue, PolicyAction, PolicyCondition, PolicyRule,
        RuleCategory, RuleMetadata,
    };
    use warden_core::{InMemorySink, ResourceId, RiskScore, SubjectId};

    fn make_rule(id: &str, priority: i64, actions: Vec<ActionKind>) -> PolicyRule {
        PolicyRule {
            id: RuleId::new(id),
            name: format!("rule {}", id),
            category: RuleCategory::Authorization,
            priority,
            conditions: vec![PolicyCondition {
                field: "risk.score".to_string(),
                operator: ConditionOperator::GreaterThan,
                value: FieldValue::Number(0.5),
                negate: false,
            }],
            actions: actions.into_iter().map(PolicyAction::of).collect(),
            metadata: RuleMetadata::default(),
            enabled: true,
            version: 1,
        }
    }

    fn make_request(risk: f64) -> AccessRequest {
        AccessRequest::new(
            SubjectId::new("alice"),
            ResourceId::new("api/users"),
            AccessAction::Read,
            RiskScore::new(risk),
        )
    }

    fn make_evaluator(rules: Vec<PolicyRule>) -> (PolicyEvaluator, Arc<InMemorySink>) {
        let store = Arc::new(PolicyStore::new());
        store.load(rules).unwrap();
        let sink = Arc::new(InMemorySink::new());
        let evaluator =
            PolicyEvaluator::with_sink(store, EvaluatorConfig::default(), sink.clone());
        (evaluator, sink)
    }

    #[test]
    fn test_deny_overrides_allow_regardless_of_order() {
        // allow at priority 50, deny at priority 200
        let (evaluator, _) = make_evaluator(vec![
            make_rule("allow-low", 50, vec![ActionKind::Allow]),
            make_rule("deny-high", 200, vec![ActionKind::Deny]),
        ]);
        let result = evaluator.evaluate_uncached(&make_request(0.9), &[]);
        assert_eq!(result.decision, PolicyDecision::Deny);

        // Same rules, reversed insertion order.
        let (evaluator, _) = make_evaluator(vec![
            make_rule("deny-high", 200, vec![ActionKind::Deny]),
            make_rule("allow-low", 50, vec![ActionKind::Allow]),
        ]);
        let result = evaluator.evaluate_uncached(&make_request(0.9), &[]);
        assert_eq!(result.decision, PolicyDecision::Deny);
    }

    #[test]
    fn test_deny_wins_even_at_lower_priority() {
        let (evaluator, _) = make_evaluator(vec![
            make_rule("allow-high", 200, vec![ActionKind::Allow]),
            make_rule("deny-low", 10, vec![ActionKind::Deny]),
        ]);
        let result = evaluator.evaluate_uncached(&make_request(0.9), &[]);
        assert_eq!(result.decision, PolicyDecision::Deny);
        assert_eq!(result.violations.len(), 1);
    }

    #[test]
    fn test_challenge_outranks_later_allow() {
        let (evaluator, _) = make_evaluator(vec![
            make_rule("challenge", 100, vec![ActionKind::Challenge]),
            make_rule("allow", 50, vec![ActionKind::Allow]),
        ]);
        let result = evaluator.evaluate_uncached(&make_request(0.9), &[]);
        assert_eq!(result.decision, PolicyDecision::Challenge);
    }

    #[test]
    fn test_earlier_allow_beats_later_challenge() {
        let (evaluator, _) = make_evaluator(vec![
            make_rule("allow", 100, vec![ActionKind::Allow]),
            make_rule("challenge", 50, vec![ActionKind::Challenge]),
        ]);
        let result = evaluator.evaluate_uncached(&make_request(0.9), &[]);
        assert_eq!(result.decision, PolicyDecision::Allow);
    }

    #[test]
    fn test_default_deny_when_nothing_matches() {
        let (evaluator, _) = make_evaluator(vec![make_rule(
            "allow",
            100,
            vec![ActionKind::Allow],
        )]);
        // risk 0.1 does not satisfy the > 0.5 condition
        let result = evaluator.evaluate_uncached(&make_request(0.1), &[]);
        assert_eq!(result.decision, PolicyDecision::Deny);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_default_allow_when_configured() {
        let store = Arc::new(PolicyStore::new());
        store
            .load(vec![make_rule("allow", 100, vec![ActionKind::Allow])])
            .unwrap();
        let evaluator = PolicyEvaluator::new(
            store,
            EvaluatorConfig {
                default_deny: false,
                ..Default::default()
            },
        );
        let result = evaluator.evaluate_uncached(&make_request(0.1), &[]);
        assert_eq!(result.decision, PolicyDecision::Allow);
    }

    #[test]
    fn test_critical_priority_deny_short_circuits() {
        let (evaluator, _) = make_evaluator(vec![
            make_rule("critical-deny", 2000, vec![ActionKind::Deny]),
            make_rule("unreachable", 10, vec![ActionKind::Allow]),
        ]);
        let result = evaluator.evaluate_uncached(&make_request(0.9), &[]);
        assert_eq!(result.decision, PolicyDecision::Deny);
        // The low-priority rule was never evaluated.
        assert_eq!(result.rule_results.len(), 1);
    }

    #[test]
    fn test_non_critical_deny_keeps_evaluating() {
        let (evaluator, _) = make_evaluator(vec![
            make_rule("deny", 200, vec![ActionKind::Deny]),
            make_rule("logged-anyway", 10, vec![ActionKind::Allow]),
        ]);
        let result = evaluator.evaluate_uncached(&make_request(0.9), &[]);
        assert_eq!(result.decision, PolicyDecision::Deny);
        assert_eq!(result.rule_results.len(), 2);
    }

    #[test]
    fn test_high_risk_deny_scenario() {
        // One rule: risk.score > 0.8 => deny + alert.
        let mut rule = PolicyRule {
            id: RuleId::new("high-risk-deny"),
            name: "high risk deny".to_string(),
            category: RuleCategory::Authorization,
            priority: 100,
            conditions: vec![PolicyCondition {
                field: "risk.score".to_string(),
                operator: ConditionOperator::GreaterThan,
                value: FieldValue::Number(0.8),
                negate: false,
            }],
            actions: vec![
                PolicyAction::of(ActionKind::Deny),
                PolicyAction::of(ActionKind::Alert),
            ],
            metadata: RuleMetadata::default(),
            enabled: true,
            version: 1,
        };
        rule.metadata.risk_level = RiskLevel::Critical;
        let (evaluator, sink) = make_evaluator(vec![rule]);

        let result = evaluator.evaluate_uncached(&make_request(0.9), &[]);
        assert_eq!(result.decision, PolicyDecision::Deny);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].risk_level, RiskLevel::Critical);
        assert!(result.obligations.contains(&Obligation::LogDecision));
        assert!(sink
            .events()
            .iter()
            .any(|e| e.kind == TelemetryKind::RuleAlert));
    }

    #[test]
    fn test_monitor_obligation_on_risky_allow() {
        let mut rule = make_rule("risky-allow", 100, vec![ActionKind::Allow]);
        rule.metadata.risk_level = RiskLevel::High;
        let (evaluator, _) = make_evaluator(vec![rule]);

        let result = evaluator.evaluate_uncached(&make_request(0.6), &[]);
        assert_eq!(result.decision, PolicyDecision::Allow);
        assert!(result.obligations.contains(&Obligation::EnhancedMonitoring));
    }

    #[test]
    fn test_no_monitor_obligation_on_low_risk_allow() {
        let rule = make_rule("calm-allow", 100, vec![ActionKind::Allow]);
        let (evaluator, _) = make_evaluator(vec![rule]);

        let result = evaluator.evaluate_uncached(&make_request(0.6), &[]);
        assert_eq!(result.decision, PolicyDecision::Allow);
        assert!(!result.obligations.contains(&Obligation::EnhancedMonitoring));
    }

    #[test]
    fn test_escalate_records_target() {
        let mut rule = make_rule("escalate", 100, vec![ActionKind::Deny]);
        let mut escalate = PolicyAction::of(ActionKind::Escalate);
        escalate
            .parameters
            .insert("target".to_string(), "soc-tier2".to_string());
        rule.actions.push(escalate);
        let (evaluator, sink) = make_evaluator(vec![rule]);

        let result = evaluator.evaluate_uncached(&make_request(0.9), &[]);
        assert!(result.obligations.contains(&Obligation::Escalation {
            target: "soc-tier2".to_string()
        }));
        assert!(sink
            .events()
            .iter()
            .any(|e| e.kind == TelemetryKind::Escalation));
    }

    #[test]
    fn test_confidence_mean_over_evaluated_rules() {
        // Two rules evaluated, one matches fully => 1.0 / 2 = 0.5.
        let (evaluator, _) = make_evaluator(vec![
            make_rule("matches", 100, vec![ActionKind::Allow]),
            {
                let mut rule = make_rule("no-match", 50, vec![ActionKind::Allow]);
                rule.conditions[0].value = FieldValue::Number(0.95);
                rule
            },
        ]);
        let result = evaluator.evaluate_uncached(&make_request(0.9), &[]);
        assert!((result.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let (evaluator, _) = make_evaluator(vec![
            make_rule("a", 100, vec![ActionKind::Allow]),
            make_rule("b", 100, vec![ActionKind::Challenge]),
            make_rule("c", 50, vec![ActionKind::Deny]),
        ]);
        let request = make_request(0.9);

        let first = evaluator.evaluate_uncached(&request, &[]);
        for _ in 0..10 {
            let next = evaluator.evaluate_uncached(&request, &[]);
            assert_eq!(next.decision, first.decision);
            assert_eq!(next.confidence, first.confidence);
            assert_eq!(next.rule_results.len(), first.rule_results.len());
            for (a, b) in next.rule_results.iter().zip(first.rule_results.iter()) {
                assert_eq!(a.rule_id, b.rule_id);
                assert_eq!(a.matched, b.matched);
            }
        }
    }

    #[test]
    fn test_cached_evaluation_skips_re_execution() {
        let (evaluator, sink) = make_evaluator(vec![make_rule(
            "deny",
            100,
            vec![ActionKind::Deny],
        )]);
        let request = make_request(0.9);

        let first = evaluator.evaluate(&request);
        let events_after_first = sink.events().len();
        let second = evaluator.evaluate(&request);

        assert_eq!(first.decision, second.decision);
        // No new telemetry: the second call was served from cache.
        assert_eq!(sink.events().len(), events_after_first);
        assert_eq!(evaluator.cache_stats().hits, 1);
    }

    #[test]
    fn test_cache_key_scope_order_independent() {
        let request = make_request(0.5);
        let a = cache_key(&request, &[RuleId::new("r1"), RuleId::new("r2")]);
        let b = cache_key(&request, &[RuleId::new("r2"), RuleId::new("r1")]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_cache_key_distinguishes_components() {
        let base = make_request(0.5);
        let key = cache_key(&base, &[]);

        let mut other = make_request(0.5);
        other.resource_id = ResourceId::new("api/other");
        assert_ne!(cache_key(&other, &[]), key);

        let mut other = make_request(0.5);
        other.action = AccessAction::Write;
        assert_ne!(cache_key(&other, &[]), key);

        assert_ne!(cache_key(&base, &[RuleId::new("r1")]), key);
    }

    #[test]
    fn test_empty_store_default_deny() {
        let (evaluator, _) = make_evaluator(vec![]);
        let result = evaluator.evaluate_uncached(&make_request(0.9), &[]);
        assert_eq!(result.decision, PolicyDecision::Deny);
        assert_eq!(result.confidence, 0.0);
        assert!(result.obligations.contains(&Obligation::LogDecision));
    }
}
