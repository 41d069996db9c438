//! Compliance coverage scoring.
//!
//! Each framework requirement maps to zero or more policy rules with a
//! coverage fraction. A requirement is met when its mean mapped coverage
//! reaches 0.8, partial at 0.4, and not-met below that; mappings to
//! rules that are missing or disabled contribute nothing. The framework
//! score is the met fraction as a percentage, and the overall score is
//! the mean across active frameworks.

use serde::{Deserialize, Serialize};

use warden_core::{RuleId, Timestamp};
use warden_policy::PolicyStore;

const MET_THRESHOLD: f64 = 0.8;
const PARTIAL_THRESHOLD: f64 = 0.4;

// ---------------------------------------------------------------------------
// Framework model
// ---------------------------------------------------------------------------

/// Maps a requirement to a policy rule covering some fraction of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyMapping {
    pub rule_id: RuleId,
    /// Fraction of the requirement this rule covers, in [0, 1].
    pub coverage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub mappings: Vec<PolicyMapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceFramework {
    pub id: String,
    pub name: String,
    pub requirements: Vec<Requirement>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequirementStatus {
    Met,
    Partial,
    NotMet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementReport {
    pub requirement_id: String,
    pub status: RequirementStatus,
    pub coverage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkReport {
    pub framework_id: String,
    pub name: String,
    pub requirements: Vec<RequirementReport>,
    /// met / total requirements, as a percentage.
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub generated_at: Timestamp,
    pub frameworks: Vec<FrameworkReport>,
    /// Mean framework score across active frameworks.
    pub overall_score: f64,
}

// ---------------------------------------------------------------------------
// Assessment
// ---------------------------------------------------------------------------

/// Assess the active frameworks against the current rule store.
pub fn assess(frameworks: &[ComplianceFramework], store: &PolicyStore) -> ComplianceReport {
    let mut reports = Vec::new();

    for framework in frameworks.iter().filter(|f| f.active) {
        let mut requirement_reports = Vec::new();
        let mut met = 0usize;

        for requirement in &framework.requirements {
            let coverage = requirement_coverage(requirement, store);
            let status = if coverage >= MET_THRESHOLD {
                met += 1;
                RequirementStatus::Met
            } else if coverage >= PARTIAL_THRESHOLD {
                RequirementStatus::Partial
            } else {
                RequirementStatus::NotMet
            };
            requirement_reports.push(RequirementReport {
                requirement_id: requirement.id.clone(),
                status,
                coverage,
            });
        }

        let score = if framework.requirements.is_empty() {
            100.0
        } else {
            met as f64 / framework.requirements.len() as f64 * 100.0
        };
        reports.push(FrameworkReport {
            framework_id: framework.id.clone(),
            name: framework.name.clone(),
            requirements: requirement_reports,
            score,
        });
    }

    let overall_score = if reports.is_empty() {
        0.0
    } else {
        reports.iter().map(|r| r.score).sum::<f64>() / reports.len() as f64
    };

    ComplianceReport {
        generated_at: Timestamp::now(),
        frameworks: reports,
        overall_score,
    }
}

/// Mean coverage over a requirement's mappings. A mapping to a rule that
/// is absent or disabled contributes zero.
fn requirement_coverage(requirement: &Requirement, store: &PolicyStore) -> f64 {
    if requirement.mappings.is_empty() {
        return 0.0;
    }
    let total: f64 = requirement
        .mappings
        .iter()
        .map(|m| match store.get(&m.rule_id) {
            Some(rule) if rule.rule.enabled => m.coverage.clamp(0.0, 1.0),
            _ => 0.0,
        })
        .sum();
    total / requirement.mappings.len() as f64
}
