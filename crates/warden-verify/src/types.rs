use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use warden_core::{RiskScore, SessionId, SubjectId, Timestamp};

// ---------------------------------------------------------------------------
// MethodKind — verification factor types
// ---------------------------------------------------------------------------

/// Verification factor type. One method executor is registered per kind;
/// new factors are added by implementing the executor contract, without
/// touching the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MethodKind {
    Cryptographic,
    Behavioral,
    Contextual,
    Device,
    Location,
    Biometric,
}

impl MethodKind {
    pub const ALL: [MethodKind; 6] = [
        MethodKind::Cryptographic,
        MethodKind::Behavioral,
        MethodKind::Contextual,
        MethodKind::Device,
        MethodKind::Location,
        MethodKind::Biometric,
    ];
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodKind::Cryptographic => write!(f, "cryptographic"),
            MethodKind::Behavioral => write!(f, "behavioral"),
            MethodKind::Contextual => write!(f, "contextual"),
            MethodKind::Device => write!(f, "device"),
            MethodKind::Location => write!(f, "location"),
            MethodKind::Biometric => write!(f, "biometric"),
        }
    }
}

// ---------------------------------------------------------------------------
// Method outcomes and results
// ---------------------------------------------------------------------------

/// What an executor returns: success, confidence in [0, 1], and opaque
/// metadata for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodOutcome {
    pub success: bool,
    pub confidence: f64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl MethodOutcome {
    pub fn succeeded(confidence: f64) -> Self {
        Self {
            success: true,
            confidence,
            metadata: HashMap::new(),
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            confidence: 0.0,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Immutable record of one executor run. Produced once per execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodResult {
    pub method: MethodKind,
    pub success: bool,
    /// Clamped to [0, 1] at construction.
    pub confidence: f64,
    pub latency_ms: u64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl MethodResult {
    pub fn from_outcome(method: MethodKind, outcome: MethodOutcome, latency_ms: u64) -> Self {
        let confidence = if outcome.confidence.is_nan() {
            0.0
        } else {
            outcome.confidence.clamp(0.0, 1.0)
        };
        Self {
            method,
            success: outcome.success,
            confidence,
            latency_ms,
            metadata: outcome.metadata,
        }
    }

    /// A failed result carrying the reason. Used for timeouts, executor
    /// faults, and missing executors.
    pub fn failed(method: MethodKind, latency_ms: u64, reason: impl Into<String>) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("error".to_string(), reason.into());
        Self {
            method,
            success: false,
            confidence: 0.0,
            latency_ms,
            metadata,
        }
    }
}

// ---------------------------------------------------------------------------
// Subject context
// ---------------------------------------------------------------------------

/// Device posture known for the subject.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceContext {
    pub device_id: Option<String>,
    pub managed: bool,
    pub compliant: bool,
    pub operating_system: Option<String>,
}

/// Network/location context known for the subject.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationContext {
    pub country: Option<String>,
    pub region: Option<String>,
    pub source_ip: Option<String>,
    pub vpn: bool,
}

/// Learned baseline the behavioral and location factors compare against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BehaviorBaseline {
    pub typical_countries: Vec<String>,
    pub typical_devices: Vec<String>,
    /// Inclusive local-hour window (start, end) of normal activity.
    pub active_hours: Option<(u8, u8)>,
}

/// Per-subject mutable state owned by the context registry.
///
/// Created on registration, mutated after every verification, destroyed
/// on deregistration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationContext {
    pub subject_id: SubjectId,
    pub session_id: Option<SessionId>,
    pub risk: RiskScore,
    pub baseline: BehaviorBaseline,
    pub device: DeviceContext,
    pub location: LocationContext,
    pub last_verified: Option<Timestamp>,
}

impl VerificationContext {
    /// Fresh context for a newly registered subject. Starts at maximal
    /// risk: nothing has been verified yet.
    pub fn new(subject_id: SubjectId) -> Self {
        Self {
            subject_id,
            session_id: None,
            risk: RiskScore::MAXIMAL,
            baseline: BehaviorBaseline::default(),
            device: DeviceContext::default(),
            location: LocationContext::default(),
            last_verified: None,
        }
    }
}

// ---------------------------------------------------------------------------
// VerificationResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerificationId(pub String);

impl VerificationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VerificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Output of one pipeline run. Written to the result cache and metrics,
/// consumed by the decision combiner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub id: VerificationId,
    pub subject_id: SubjectId,
    pub timestamp: Timestamp,
    pub success: bool,
    pub risk_score: RiskScore,
    pub method_results: Vec<MethodResult>,
    pub violations: Vec<String>,
    pub recommendations: Vec<String>,
    pub latency_ms: u64,
    pub next_verification: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_kind_display() {
        assert_eq!(MethodKind::Cryptographic.to_string(), "cryptographic");
        assert_eq!(MethodKind::Device.to_string(), "device");
    }

    #[test]
    fn test_method_kind_kebab_serde() {
        let json = serde_json::to_string(&MethodKind::Cryptographic).unwrap();
        assert_eq!(json, "\"cryptographic\"");
    }

    #[test]
    fn test_method_result_clamps_confidence() {
        let result =
            MethodResult::from_outcome(MethodKind::Device, MethodOutcome::succeeded(1.7), 5);
        assert_eq!(result.confidence, 1.0);

        let result =
            MethodResult::from_outcome(MethodKind::Device, MethodOutcome::succeeded(-0.5), 5);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_method_result_nan_confidence_is_zero() {
        let result = MethodResult::from_outcome(
            MethodKind::Behavioral,
            MethodOutcome::succeeded(f64::NAN),
            1,
        );
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_failed_result_carries_reason() {
        let result = MethodResult::failed(MethodKind::Biometric, 1000, "execution timed out");
        assert!(!result.success);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.metadata["error"], "execution timed out");
    }

    #[test]
    fn test_new_context_starts_at_maximal_risk() {
        let context = VerificationContext::new(SubjectId::new("alice"));
        assert_eq!(context.risk, RiskScore::MAXIMAL);
        assert!(context.last_verified.is_none());
    }

    #[test]
    fn test_verification_ids_unique() {
        assert_ne!(VerificationId::generate(), VerificationId::generate());
    }

    #[test]
    fn test_outcome_metadata_builder() {
        let outcome = MethodOutcome::succeeded(0.9).with_metadata("country", "DE");
        assert_eq!(outcome.metadata["country"], "DE");
    }
}
