//! Risk aggregation.
//!
//! Combines method results into a single score: each result contributes
//! its configured weight times its per-method risk, where a successful
//! method's risk is `1 - confidence` and a failed method's risk is 1.0.
//! An empty result set aggregates to maximal risk (fail-closed).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use warden_core::RiskScore;

use crate::types::{MethodKind, MethodResult};

/// Weight applied to a method kind with no configured weight.
const DEFAULT_WEIGHT: f64 = 0.05;

/// Per-kind aggregation weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskWeights {
    #[serde(default)]
    weights: HashMap<MethodKind, f64>,
    #[serde(default = "default_weight")]
    pub default_weight: f64,
}

fn default_weight() -> f64 {
    DEFAULT_WEIGHT
}

impl Default for RiskWeights {
    fn default() -> Self {
        let mut weights = HashMap::new();
        weights.insert(MethodKind::Cryptographic, 0.25);
        weights.insert(MethodKind::Device, 0.20);
        weights.insert(MethodKind::Behavioral, 0.20);
        weights.insert(MethodKind::Location, 0.15);
        weights.insert(MethodKind::Contextual, 0.10);
        weights.insert(MethodKind::Biometric, 0.10);
        Self {
            weights,
            default_weight: DEFAULT_WEIGHT,
        }
    }
}

impl RiskWeights {
    /// Uniform weights, mostly useful in tests.
    pub fn uniform(weight: f64) -> Self {
        Self {
            weights: MethodKind::ALL.iter().map(|k| (*k, weight)).collect(),
            default_weight: weight,
        }
    }

    pub fn set(&mut self, kind: MethodKind, weight: f64) {
        self.weights.insert(kind, weight);
    }

    pub fn weight(&self, kind: MethodKind) -> f64 {
        self.weights.get(&kind).copied().unwrap_or(self.default_weight)
    }

    /// Aggregate method results into one risk score.
    pub fn aggregate(&self, results: &[MethodResult]) -> RiskScore {
        if results.is_empty() {
            return RiskScore::MAXIMAL;
        }

        let mut weighted_risk = 0.0;
        let mut total_weight = 0.0;
        for result in results {
            let weight = self.weight(result.method);
            let method_risk = if result.success {
                1.0 - result.confidence
            } else {
                1.0
            };
            weighted_risk += weight * method_risk;
            total_weight += weight;
        }

        if total_weight <= 0.0 {
            return RiskScore::MAXIMAL;
        }
        RiskScore::new(weighted_risk / total_weight)
    }
}
