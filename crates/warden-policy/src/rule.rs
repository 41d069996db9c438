//! Rule validation and compilation.
//!
//! Validation runs eagerly when a rule is submitted and accumulates every
//! violation rather than stopping at the first, so an administrative
//! rejection lists everything that must be fixed.

use crate::accessor::CompiledCondition;
use crate::error::{PolicyError, PolicyResult};
use crate::types::{AccessRequest, PolicyRule};

/// Upper bound on rule id/name length, matching what the audit pipeline
/// can index.
const MAX_ID_LEN: usize = 128;
const MAX_NAME_LEN: usize = 256;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a single rule for structural integrity.
///
/// Checks:
/// - Non-empty id and name, within length bounds
/// - At least one condition and at least one action
/// - Every condition field path compiles to an accessor
/// - Regex patterns compile
pub fn validate_rule(rule: &PolicyRule) -> Result<(), Vec<String>> {
    let mut violations = Vec::new();

    if rule.id.as_str().is_empty() {
        violations.push("rule id must not be empty".to_string());
    } else if rule.id.as_str().len() > MAX_ID_LEN {
        violations.push(format!("rule id exceeds {} bytes", MAX_ID_LEN));
    }

    if rule.name.is_empty() {
        violations.push("rule name must not be empty".to_string());
    } else if rule.name.len() > MAX_NAME_LEN {
        violations.push(format!("rule name exceeds {} bytes", MAX_NAME_LEN));
    }

    if rule.conditions.is_empty() {
        violations.push("at least one condition required".to_string());
    }

    if rule.actions.is_empty() {
        violations.push("at least one action required".to_string());
    }

    for condition in &rule.conditions {
        if let Err(e) = CompiledCondition::compile(condition) {
            violations.push(e);
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

// ---------------------------------------------------------------------------
// CompiledRule
// ---------------------------------------------------------------------------

/// A rule with its conditions pre-compiled, ready for the hot path.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: PolicyRule,
    conditions: Vec<CompiledCondition>,
}

impl CompiledRule {
    /// Validate and compile. Rejection carries the full violation list.
    pub fn compile(rule: PolicyRule) -> PolicyResult<Self> {
        validate_rule(&rule).map_err(PolicyError::validation)?;
        let conditions = rule
            .conditions
            .iter()
            .map(CompiledCondition::compile)
            // validate_rule already compiled each condition successfully
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| PolicyError::validation(vec![e]))?;
        Ok(Self { rule, conditions })
    }

    /// Match against a request: (all conditions matched, how many did).
    pub fn match_against(&self, request: &AccessRequest) -> (bool, usize) {
        let mut matched = 0;
        for condition in &self.conditions {
            if condition.matches(request) {
                matched += 1;
            }
        }
        (matched == self.conditions.len(), matched)
    }

    pub fn conditions_total(&self) -> usize {
        self.conditions.len()
    }
}
