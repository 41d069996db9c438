use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use warden_core::{RequestId, ResourceId, RiskLevel, RiskScore, RuleId, SubjectId, Timestamp};

// ---------------------------------------------------------------------------
// FieldValue — typed tagged value resolved from the request context
// ---------------------------------------------------------------------------

/// Value a compiled field accessor resolves from an [`AccessRequest`],
/// and the literal form used in rule conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => write!(f, "{}", s),
        }
    }
}

// ---------------------------------------------------------------------------
// Conditions and actions
// ---------------------------------------------------------------------------

/// Comparison operator for a single rule condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    Regex,
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionOperator::Equals => write!(f, "equals"),
            ConditionOperator::NotEquals => write!(f, "not-equals"),
            ConditionOperator::GreaterThan => write!(f, "greater-than"),
            ConditionOperator::LessThan => write!(f, "less-than"),
            ConditionOperator::Contains => write!(f, "contains"),
            ConditionOperator::Regex => write!(f, "regex"),
        }
    }
}

/// A single condition. All of a rule's conditions must match (AND).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyCondition {
    /// Field path resolved through a pre-compiled accessor,
    /// e.g. `"risk.score"`, `"subject.id"`, `"attr.device_managed"`.
    pub field: String,
    pub operator: ConditionOperator,
    pub value: FieldValue,
    #[serde(default)]
    pub negate: bool,
}

/// Action taken when a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Allow,
    Deny,
    Challenge,
    Log,
    Alert,
    Escalate,
}

impl ActionKind {
    /// Whether this action sets a candidate decision (as opposed to the
    /// purely side-effecting log/alert/escalate actions).
    pub fn is_decisive(&self) -> bool {
        matches!(
            self,
            ActionKind::Allow | ActionKind::Deny | ActionKind::Challenge
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyAction {
    pub kind: ActionKind,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub retry_count: u32,
}

impl PolicyAction {
    pub fn of(kind: ActionKind) -> Self {
        Self {
            kind,
            parameters: HashMap::new(),
            delay_ms: 0,
            retry_count: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// PolicyRule
// ---------------------------------------------------------------------------

/// Functional grouping for administrative listing and compliance mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleCategory {
    Authentication,
    Authorization,
    DeviceTrust,
    Network,
    DataProtection,
    Compliance,
}

/// Administrative metadata carried by a rule but not evaluated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleMetadata {
    #[serde(default)]
    pub compliance_tags: Vec<String>,
    /// Risk declared by the rule author; carried into violations and the
    /// monitoring obligation.
    #[serde(default = "default_rule_risk")]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    #[serde(default)]
    pub last_review: Option<Timestamp>,
}

fn default_rule_risk() -> RiskLevel {
    RiskLevel::Medium
}

impl Default for RuleMetadata {
    fn default() -> Self {
        Self {
            compliance_tags: Vec::new(),
            risk_level: default_rule_risk(),
            created_at: None,
            last_review: None,
        }
    }
}

/// A single policy rule. Higher priority evaluates first.
///
/// A submitted rule with zero conditions or zero actions is rejected at
/// load time; superseding a rule replaces the stored value rather than
/// mutating it in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: RuleId,
    pub name: String,
    pub category: RuleCategory,
    #[serde(default)]
    pub priority: i64,
    pub conditions: Vec<PolicyCondition>,
    pub actions: Vec<PolicyAction>,
    #[serde(default)]
    pub metadata: RuleMetadata,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_version")]
    pub version: u64,
}

fn default_true() -> bool {
    true
}

fn default_version() -> u64 {
    1
}

// ---------------------------------------------------------------------------
// AccessRequest — the evaluation context
// ---------------------------------------------------------------------------

/// The operation an access request performs on the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessAction {
    Read,
    Write,
    Execute,
    Admin,
}

impl fmt::Display for AccessAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessAction::Read => write!(f, "read"),
            AccessAction::Write => write!(f, "write"),
            AccessAction::Execute => write!(f, "execute"),
            AccessAction::Admin => write!(f, "admin"),
        }
    }
}

/// Everything the evaluator can see about one access request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRequest {
    pub request_id: RequestId,
    pub subject_id: SubjectId,
    pub resource_id: ResourceId,
    pub action: AccessAction,
    /// Live risk score from the verification pipeline.
    pub risk: RiskScore,
    /// Free-form request attributes reachable via `attr.<name>` paths.
    #[serde(default)]
    pub attributes: HashMap<String, FieldValue>,
    pub timestamp: Timestamp,
}

impl AccessRequest {
    pub fn new(
        subject_id: SubjectId,
        resource_id: ResourceId,
        action: AccessAction,
        risk: RiskScore,
    ) -> Self {
        Self {
            request_id: RequestId::new(uuid_like_id()),
            subject_id,
            resource_id,
            action,
            risk,
            attributes: HashMap::new(),
            timestamp: Timestamp::now(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }
}

/// Request ids only need uniqueness within the process lifetime; a
/// counter + timestamp avoids pulling request-id generation into the
/// evaluator's dependencies.
fn uuid_like_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("req-{}-{}", Timestamp::now().seconds_since_epoch, n)
}

// ---------------------------------------------------------------------------
// Evaluation output
// ---------------------------------------------------------------------------

/// Three-way policy decision. Resolution always terminates in exactly one
/// of these; there is no "undecided".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyDecision {
    Allow,
    Deny,
    Challenge,
}

impl fmt::Display for PolicyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyDecision::Allow => write!(f, "allow"),
            PolicyDecision::Deny => write!(f, "deny"),
            PolicyDecision::Challenge => write!(f, "challenge"),
        }
    }
}

/// Per-rule evaluation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule_id: RuleId,
    pub matched: bool,
    pub conditions_matched: usize,
    pub conditions_total: usize,
    /// The rule's decisive action, when it matched and had one.
    pub resolved_action: Option<ActionKind>,
}

/// One violation per matched rule whose resolved action is deny.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub risk_level: RiskLevel,
    pub message: String,
}

/// Mandatory follow-up attached to a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Obligation {
    /// Always present: the decision must be recorded.
    LogDecision,
    /// Attached when access is allowed despite a matched high/critical rule.
    EnhancedMonitoring,
    /// Recorded by an escalate action.
    Escalation { target: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEvaluationResult {
    pub request_id: RequestId,
    pub decision: PolicyDecision,
    pub confidence: f64,
    pub rule_results: Vec<RuleOutcome>,
    pub violations: Vec<PolicyViolation>,
    pub obligations: Vec<Obligation>,
    pub evaluated_at: Timestamp,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_untagged_serde() {
        let json = r#"{"a": true, "b": 0.5, "c": "text"}"#;
        let map: HashMap<String, FieldValue> = serde_json::from_str(json).unwrap();
        assert_eq!(map["a"], FieldValue::Bool(true));
        assert_eq!(map["b"], FieldValue::Number(0.5));
        assert_eq!(map["c"], FieldValue::text("text"));
    }

    #[test]
    fn test_condition_operator_kebab_serde() {
        let json = serde_json::to_string(&ConditionOperator::GreaterThan).unwrap();
        assert_eq!(json, "\"greater-than\"");
        let back: ConditionOperator = serde_json::from_str("\"not-equals\"").unwrap();
        assert_eq!(back, ConditionOperator::NotEquals);
    }

    #[test]
    fn test_action_kind_decisive() {
        assert!(ActionKind::Allow.is_decisive());
        assert!(ActionKind::Deny.is_decisive());
        assert!(ActionKind::Challenge.is_decisive());
        assert!(!ActionKind::Log.is_decisive());
        assert!(!ActionKind::Alert.is_decisive());
        assert!(!ActionKind::Escalate.is_decisive());
    }

    #[test]
    fn test_rule_serde_defaults() {
        let json = r#"{
            "id": "r1",
            "name": "high risk deny",
            "category": "authorization",
            "conditions": [
                {"field": "risk.score", "operator": "greater-than", "value": 0.8}
            ],
            "actions": [{"kind": "deny"}]
        }"#;
        let rule: PolicyRule = serde_json::from_str(json).unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.version, 1);
        assert_eq!(rule.priority, 0);
        assert!(!rule.conditions[0].negate);
        assert_eq!(rule.metadata.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_policy_decision_display() {
        assert_eq!(PolicyDecision::Allow.to_string(), "allow");
        assert_eq!(PolicyDecision::Deny.to_string(), "deny");
        assert_eq!(PolicyDecision::Challenge.to_string(), "challenge");
    }

    #[test]
    fn test_access_request_builder() {
        let request = AccessRequest::new(
            SubjectId::new("alice"),
            ResourceId::new("db/users"),
            AccessAction::Read,
            RiskScore::new(0.2),
        )
        .with_attribute("device_managed", FieldValue::Bool(true));

        assert_eq!(request.subject_id.as_str(), "alice");
        assert_eq!(
            request.attributes["device_managed"],
            FieldValue::Bool(true)
        );
        assert!(!request.request_id.as_str().is_empty());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = AccessRequest::new(
            SubjectId::new("s"),
            ResourceId::new("r"),
            AccessAction::Read,
            RiskScore::new(0.0),
        );
        let b = AccessRequest::new(
            SubjectId::new("s"),
            ResourceId::new("r"),
            AccessAction::Read,
            RiskScore::new(0.0),
        );
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn test_obligation_serde_tagged() {
        let obligation = Obligation::Escalation {
            target: "secops".to_string(),
        };
        let json = serde_json::to_string(&obligation).unwrap();
        assert!(json.contains("\"kind\":\"escalation\""));
        let back: Obligation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, obligation);
    }
}
