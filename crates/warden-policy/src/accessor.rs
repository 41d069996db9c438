//! Pre-compiled field accessors and condition matchers.
//!
//! Condition field paths are resolved into typed accessors when a rule is
//! loaded, not looked up dynamically at evaluation time. An unknown path
//! or an invalid regex therefore fails rule validation up front, and the
//! evaluation hot path performs no string parsing.

use regex::Regex;

use crate::types::{AccessRequest, ConditionOperator, FieldValue, PolicyCondition};

// ---------------------------------------------------------------------------
// FieldAccessor
// ---------------------------------------------------------------------------

/// Compiled form of a condition field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldAccessor {
    RiskScore,
    RiskLevel,
    SubjectId,
    ResourceId,
    Action,
    RequestId,
    Attribute(String),
}

impl FieldAccessor {
    /// Compile a field path. Recognized paths:
    /// `risk.score`, `risk.level`, `subject.id`, `resource.id`,
    /// `request.action`, `request.id`, and `attr.<name>`.
    pub fn compile(path: &str) -> Result<Self, String> {
        match path {
            "risk.score" => Ok(FieldAccessor::RiskScore),
            "risk.level" => Ok(FieldAccessor::RiskLevel),
            "subject.id" => Ok(FieldAccessor::SubjectId),
            "resource.id" => Ok(FieldAccessor::ResourceId),
            "request.action" => Ok(FieldAccessor::Action),
            "request.id" => Ok(FieldAccessor::RequestId),
            other => match other.strip_prefix("attr.") {
                Some(name) if !name.is_empty() => {
                    Ok(FieldAccessor::Attribute(name.to_string()))
                }
                _ => Err(format!("unknown field path '{}'", other)),
            },
        }
    }

    /// Resolve this accessor against a request. Attribute accessors may
    /// come back empty when the request does not carry the attribute.
    pub fn resolve(&self, request: &AccessRequest) -> Option<FieldValue> {
        match self {
            FieldAccessor::RiskScore => Some(FieldValue::Number(request.risk.value())),
            FieldAccessor::RiskLevel => Some(FieldValue::text(request.risk.level().to_string())),
            FieldAccessor::SubjectId => Some(FieldValue::text(request.subject_id.as_str())),
            FieldAccessor::ResourceId => Some(FieldValue::text(request.resource_id.as_str())),
            FieldAccessor::Action => Some(FieldValue::text(request.action.to_string())),
            FieldAccessor::RequestId => Some(FieldValue::text(request.request_id.as_str())),
            FieldAccessor::Attribute(name) => request.attributes.get(name).cloned(),
        }
    }
}

// ---------------------------------------------------------------------------
// CompiledCondition
// ---------------------------------------------------------------------------

/// A condition bound to its accessor, with any regex compiled once.
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    pub accessor: FieldAccessor,
    pub operator: ConditionOperator,
    pub expected: FieldValue,
    pub negate: bool,
    pattern: Option<Regex>,
}

impl CompiledCondition {
    pub fn compile(condition: &PolicyCondition) -> Result<Self, String> {
        let accessor = FieldAccessor::compile(&condition.field)?;

        let pattern = if condition.operator == ConditionOperator::Regex {
            let raw = condition.value.as_text().ok_or_else(|| {
                format!(
                    "condition on '{}': regex operator requires a string pattern",
                    condition.field
                )
            })?;
            Some(Regex::new(raw).map_err(|e| {
                format!("condition on '{}': invalid regex: {}", condition.field, e)
            })?)
        } else {
            None
        };

        Ok(Self {
            accessor,
            operator: condition.operator,
            expected: condition.value.clone(),
            negate: condition.negate,
            pattern,
        })
    }

    /// Evaluate against a request. A value that cannot be resolved never
    /// matches, negated or not.
    pub fn matches(&self, request: &AccessRequest) -> bool {
        let Some(actual) = self.accessor.resolve(request) else {
            return false;
        };

        let raw = match self.operator {
            ConditionOperator::Equals => values_equal(&actual, &self.expected),
            ConditionOperator::NotEquals => !values_equal(&actual, &self.expected),
            ConditionOperator::GreaterThan => match (actual.as_number(), self.expected.as_number())
            {
                (Some(a), Some(b)) => a > b,
                _ => false,
            },
            ConditionOperator::LessThan => match (actual.as_number(), self.expected.as_number()) {
                (Some(a), Some(b)) => a < b,
                _ => false,
            },
            ConditionOperator::Contains => match (actual.as_text(), self.expected.as_text()) {
                (Some(a), Some(b)) => a.contains(b),
                _ => false,
            },
            ConditionOperator::Regex => match (actual.as_text(), &self.pattern) {
                (Some(a), Some(re)) => re.is_match(a),
                _ => false,
            },
        };

        if self.negate {
            !raw
        } else {
            raw
        }
    }
}

fn values_equal(a: &FieldValue, b: &FieldValue) -> bool {
    match (a, b) {
        (FieldValue::Bool(x), FieldValue::Bool(y)) => x == y,
        (FieldValue::Number(x), FieldValue::Number(y)) => x == y,
        (FieldValue::Text(x), FieldValue::Text(y)) => x == y,
        _ => false,
    }
}
