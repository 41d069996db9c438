//! Built-in reference executors.
//!
//! Simple attribute heuristics over the subject's stored context, so the
//! engine runs end-to-end without external scoring services. Production
//! deployments replace these with executors backed by key-management,
//! behavioral-model, or device-attestation services; the orchestrator
//! only sees the contract.

use async_trait::async_trait;
use chrono::Timelike;
use std::time::Duration;

use warden_core::SubjectId;

use crate::error::VerifyResult;
use crate::executor::MethodExecutor;
use crate::types::{MethodKind, MethodOutcome, VerificationContext};

// ---------------------------------------------------------------------------
// Device posture
// ---------------------------------------------------------------------------

/// Scores device trust from management and compliance state plus whether
/// the device is one the subject typically uses.
pub struct DeviceTrustExecutor;

#[async_trait]
impl MethodExecutor for DeviceTrustExecutor {
    fn kind(&self) -> MethodKind {
        MethodKind::Device
    }

    async fn execute(
        &self,
        _subject: &SubjectId,
        context: &VerificationContext,
    ) -> VerifyResult<MethodOutcome> {
        let device = &context.device;
        let mut confidence: f64 = 0.2;
        if device.managed {
            confidence += 0.35;
        }
        if device.compliant {
            confidence += 0.35;
        }
        if let Some(id) = &device.device_id {
            if context.baseline.typical_devices.iter().any(|d| d == id) {
                confidence += 0.1;
            }
        }
        let confidence = confidence.min(1.0);

        let mut outcome = if confidence >= 0.5 {
            MethodOutcome::succeeded(confidence)
        } else {
            MethodOutcome {
                success: false,
                confidence,
                metadata: Default::default(),
            }
        };
        outcome = outcome
            .with_metadata("managed", device.managed.to_string())
            .with_metadata("compliant", device.compliant.to_string());
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// Scores location trust against the subject's typical countries, with a
/// penalty for anonymizing transports.
pub struct LocationTrustExecutor;

#[async_trait]
impl MethodExecutor for LocationTrustExecutor {
    fn kind(&self) -> MethodKind {
        MethodKind::Location
    }

    async fn execute(
        &self,
        _subject: &SubjectId,
        context: &VerificationContext,
    ) -> VerifyResult<MethodOutcome> {
        let location = &context.location;
        let mut confidence = match &location.country {
            Some(country)
                if context
                    .baseline
                    .typical_countries
                    .iter()
                    .any(|c| c == country) =>
            {
                0.9
            }
            Some(_) => 0.4,
            None => 0.3,
        };
        if location.vpn {
            confidence *= 0.7;
        }

        let mut outcome = if confidence >= 0.5 {
            MethodOutcome::succeeded(confidence)
        } else {
            MethodOutcome {
                success: false,
                confidence,
                metadata: Default::default(),
            }
        };
        if let Some(country) = &location.country {
            outcome = outcome.with_metadata("country", country.clone());
        }
        outcome = outcome.with_metadata("vpn", location.vpn.to_string());
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Behavioral
// ---------------------------------------------------------------------------

/// Scores whether activity falls inside the subject's usual active-hours
/// window. With no learned window the factor stays neutral-positive.
pub struct BehaviorExecutor;

#[async_trait]
impl MethodExecutor for BehaviorExecutor {
    fn kind(&self) -> MethodKind {
        MethodKind::Behavioral
    }

    async fn execute(
        &self,
        _subject: &SubjectId,
        context: &VerificationContext,
    ) -> VerifyResult<MethodOutcome> {
        let hour = chrono::Utc::now().hour() as u8;
        let confidence = match context.baseline.active_hours {
            Some((start, end)) => {
                let within = if start <= end {
                    hour >= start && hour <= end
                } else {
                    // Window wraps midnight, e.g. (22, 6).
                    hour >= start || hour <= end
                };
                if within {
                    0.85
                } else {
                    0.45
                }
            }
            None => 0.6,
        };

        let outcome = if confidence >= 0.5 {
            MethodOutcome::succeeded(confidence)
        } else {
            MethodOutcome {
                success: false,
                confidence,
                metadata: Default::default(),
            }
        };
        Ok(outcome.with_metadata("hour", hour.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Fixed outcome — deterministic stand-in
// ---------------------------------------------------------------------------

/// Always returns a configured outcome, optionally after a delay.
///
/// Stands in for factors whose real scoring lives outside this crate
/// (cryptographic attestation, biometrics), and doubles as the test
/// double for timeout and fault behavior.
pub struct FixedOutcomeExecutor {
    kind: MethodKind,
    outcome: MethodOutcome,
    delay: Option<Duration>,
}

impl FixedOutcomeExecutor {
    pub fn new(kind: MethodKind, outcome: MethodOutcome) -> Self {
        Self {
            kind,
            outcome,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl MethodExecutor for FixedOutcomeExecutor {
    fn kind(&self) -> MethodKind {
        self.kind
    }

    async fn execute(
        &self,
        _subject: &SubjectId,
        _context: &VerificationContext,
    ) -> VerifyResult<MethodOutcome> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.outcome.clone())
    }
}
