//! Versioned, read-mostly rule store.
//!
//! Rules are compiled on admission and held behind `Arc`s. An update
//! supersedes the stored rule by swapping the `Arc`; the superseded
//! value is never mutated, so evaluations that snapshotted it keep a
//! consistent view. Snapshots are copy-on-read: rule add/update/remove
//! never disturbs an evaluation already in progress.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use warden_core::RuleId;

use crate::error::{PolicyError, PolicyResult};
use crate::rule::{validate_rule, CompiledRule};
use crate::types::PolicyRule;

pub struct PolicyStore {
    rules: RwLock<HashMap<RuleId, Arc<CompiledRule>>>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(HashMap::new()),
        }
    }

    /// Bulk-load rules at init. Validates every rule first and rejects the
    /// whole batch with all violations (including duplicate ids) if any
    /// rule is invalid.
    pub fn load(&self, rules: Vec<PolicyRule>) -> PolicyResult<usize> {
        let mut violations = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for rule in &rules {
            if !rule.id.as_str().is_empty() && !seen.insert(rule.id.clone()) {
                violations.push(format!("duplicate rule id: '{}'", rule.id));
            }
            if let Err(errors) = validate_rule(rule) {
                for e in errors {
                    violations.push(format!("rule '{}': {}", rule.id, e));
                }
            }
        }
        if !violations.is_empty() {
            return Err(PolicyError::validation(violations));
        }

        let count = rules.len();
        let mut map = self.rules.write().expect("policy store lock poisoned");
        for rule in rules {
            let compiled = Arc::new(CompiledRule::compile(rule)?);
            map.insert(compiled.rule.id.clone(), compiled);
        }
        tracing::debug!(count, "rule set loaded");
        Ok(count)
    }

    /// Load a rule set from raw JSON bytes.
    pub fn load_json(&self, data: &[u8]) -> PolicyResult<usize> {
        if data.is_empty() {
            return Err(PolicyError::LoadError("rule data is empty".to_string()));
        }
        let rules: Vec<PolicyRule> = serde_json::from_slice(data)
            .map_err(|e| PolicyError::LoadError(format!("JSON parse error: {}", e)))?;
        self.load(rules)
    }

    /// Serialize the current rule set to pretty JSON.
    pub fn to_json(&self) -> PolicyResult<Vec<u8>> {
        let rules: Vec<PolicyRule> = {
            let map = self.rules.read().expect("policy store lock poisoned");
            let mut rules: Vec<PolicyRule> =
                map.values().map(|c| c.rule.clone()).collect();
            rules.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
            rules
        };
        serde_json::to_vec_pretty(&rules)
            .map_err(|e| PolicyError::SerializationError(e.to_string()))
    }

    /// Add a new rule. Fails if a rule with the same id already exists.
    pub fn add_rule(&self, rule: PolicyRule) -> PolicyResult<()> {
        let compiled = Arc::new(CompiledRule::compile(rule)?);
        let mut map = self.rules.write().expect("policy store lock poisoned");
        if map.contains_key(&compiled.rule.id) {
            return Err(PolicyError::validation(vec![format!(
                "duplicate rule id: '{}'",
                compiled.rule.id
            )]));
        }
        map.insert(compiled.rule.id.clone(), compiled);
        Ok(())
    }

    /// Supersede an existing rule. The stored version is bumped past the
    /// superseded one; the old `Arc` is left untouched for in-flight
    /// evaluations.
    pub fn update_rule(&self, mut rule: PolicyRule) -> PolicyResult<u64> {
        let id = rule.id.clone();
        let mut map = self.rules.write().expect("policy store lock poisoned");
        let previous = map
            .get(&id)
            .ok_or_else(|| PolicyError::UnknownRule(id.to_string()))?;
        rule.version = rule.version.max(previous.rule.version + 1);
        let version = rule.version;
        let compiled = Arc::new(CompiledRule::compile(rule)?);
        map.insert(id, compiled);
        Ok(version)
    }

    /// Remove a rule. Returns whether it existed.
    pub fn remove_rule(&self, id: &RuleId) -> bool {
        let mut map = self.rules.write().expect("policy store lock poisoned");
        map.remove(id).is_some()
    }

    pub fn get(&self, id: &RuleId) -> Option<Arc<CompiledRule>> {
        let map = self.rules.read().expect("policy store lock poisoned");
        map.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rules.read().expect("policy store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy-on-read snapshot of the enabled rules in `scope` (all enabled
    /// rules when the scope is empty), ordered by descending priority with
    /// id as a deterministic tiebreak.
    pub fn snapshot(&self, scope: &[RuleId]) -> Vec<Arc<CompiledRule>> {
        let map = self.rules.read().expect("policy store lock poisoned");
        let mut rules: Vec<Arc<CompiledRule>> = if scope.is_empty() {
            map.values().filter(|c| c.rule.enabled).cloned().collect()
        } else {
            scope
                .iter()
                .filter_map(|id| map.get(id))
                .filter(|c| c.rule.enabled)
                .cloned()
                .collect()
        };
        rules.sort_by(|a, b| {
            b.rule
                .priority
                .cmp(&a.rule.priority)
                .then_with(|| a.rule.id.as_str().cmp(b.rule.id.as_str()))
        });
        rules
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new()
    }
}
