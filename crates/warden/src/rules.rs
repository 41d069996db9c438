//! Baseline rule set.
//!
//! Loaded when no rule file is configured, so a fresh deployment starts
//! with sensible zero-trust posture instead of an empty store (which,
//! under default-deny, would refuse everything without explanation).

use warden_core::{RiskLevel, RuleId};
use warden_policy::{
    ActionKind, ConditionOperator, FieldValue, PolicyAction, PolicyCondition, PolicyRule,
    RuleCategory, RuleMetadata,
};

pub fn default_rules() -> Vec<PolicyRule> {
    vec![
        // Critical risk is denied outright, before anything else.
        PolicyRule {
            id: RuleId::new("critical-risk-deny"),
            name: "Critical risk denial".to_string(),
            category: RuleCategory::Authorization,
            priority: 2_000,
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
            metadata: RuleMetadata {
                compliance_tags: vec!["zero-trust".to_string()],
                risk_level: RiskLevel::Critical,
                created_at: None,
                last_review: None,
            },
            enabled: true,
            version: 1,
        },
        // Elevated risk gets challenged.
        PolicyRule {
            id: RuleId::new("high-risk-challenge"),
            name: "High risk challenge".to_string(),
            category: RuleCategory::Authentication,
            priority: 500,
            conditions: vec![PolicyCondition {
                field: "risk.score".to_string(),
                operator: ConditionOperator::GreaterThan,
                value: FieldValue::Number(0.6),
                negate: false,
            }],
            actions: vec![
                PolicyAction::of(ActionKind::Challenge),
                PolicyAction::of(ActionKind::Log),
            ],
            metadata: RuleMetadata {
                compliance_tags: vec!["zero-trust".to_string()],
                risk_level: RiskLevel::High,
                created_at: None,
                last_review: None,
            },
            enabled: true,
            version: 1,
        },
        // Unmanaged devices never get admin access.
        PolicyRule {
            id: RuleId::new("unmanaged-device-admin-deny"),
            name: "Unmanaged device admin denial".to_string(),
            category: RuleCategory::DeviceTrust,
            priority: 400,
            conditions: vec![
                PolicyCondition {
                    field: "attr.device_managed".to_string(),
                    operator: ConditionOperator::Equals,
                    value: FieldValue::Bool(false),
                    negate: false,
                },
                PolicyCondition {
                    field: "request.action".to_string(),
                    operator: ConditionOperator::Equals,
                    value: FieldValue::Text("admin".to_string()),
                    negate: false,
                },
            ],
            actions: vec![
                PolicyAction::of(ActionKind::Deny),
                PolicyAction::of(ActionKind::Log),
            ],
            metadata: RuleMetadata {
                compliance_tags: vec!["device-trust".to_string()],
                risk_level: RiskLevel::High,
                created_at: None,
                last_review: None,
            },
            enabled: true,
            version: 1,
        },
        // Everything else at acceptable risk is allowed.
        PolicyRule {
            id: RuleId::new("baseline-allow"),
            name: "Baseline allow".to_string(),
            category: RuleCategory::Authorization,
            priority: 10,
            conditions: vec![PolicyCondition {
                field: "risk.score".to_string(),
                operator: ConditionOperator::LessThan,
                value: FieldValue::Number(0.6),
                negate: false,
            }],
            actions: vec![PolicyAction::of(ActionKind::Allow)],
            metadata: RuleMetadata::default(),
            enabled: true,
            version: 1,
        },
    ]
}
