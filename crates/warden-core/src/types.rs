use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identifier newtypes
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// The agent/principal under continuous verification.
    SubjectId
);
string_id!(
    /// An active session belonging to a subject.
    SessionId
);
string_id!(
    /// The resource an access request targets.
    ResourceId
);
string_id!(
    /// A single access/verification request.
    RequestId
);
string_id!(
    /// A policy rule identifier.
    RuleId
);

// ---------------------------------------------------------------------------
// Timestamp — canonical time representation (seconds + nanoseconds)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds_since_epoch: u64,
    pub nanoseconds: u32,
}

impl Timestamp {
    pub fn now() -> Self {
        let now = chrono::Utc::now();
        Self {
            seconds_since_epoch: now.timestamp() as u64,
            nanoseconds: now.timestamp_subsec_nanos(),
        }
    }

    pub fn from_seconds(seconds: u64) -> Self {
        Self {
            seconds_since_epoch: seconds,
            nanoseconds: 0,
        }
    }

    /// Add a duration, carrying sub-second overflow into the seconds field.
    pub fn plus(&self, duration: std::time::Duration) -> Self {
        let nanos = self.nanoseconds as u64 + duration.subsec_nanos() as u64;
        Self {
            seconds_since_epoch: self.seconds_since_epoch + duration.as_secs() + nanos / 1_000_000_000,
            nanoseconds: (nanos % 1_000_000_000) as u32,
        }
    }

    /// Whole seconds elapsed from `earlier` to `self`; zero if `earlier` is later.
    pub fn seconds_since(&self, earlier: &Timestamp) -> u64 {
        self.seconds_since_epoch
            .saturating_sub(earlier.seconds_since_epoch)
    }

    pub fn to_rfc3339(&self) -> String {
        let dt =
            chrono::DateTime::from_timestamp(self.seconds_since_epoch as i64, self.nanoseconds);
        dt.map(|d| d.to_rfc3339())
            .unwrap_or_else(|| "invalid".to_string())
    }

    pub fn is_past(&self) -> bool {
        *self < Self::now()
    }
}

impl From<chrono::DateTime<chrono::Utc>> for Timestamp {
    fn from(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            seconds_since_epoch: dt.timestamp() as u64,
            nanoseconds: dt.timestamp_subsec_nanos(),
        }
    }
}

// ---------------------------------------------------------------------------
// RiskScore — aggregate trust-risk estimate, always within [0, 1]
// ---------------------------------------------------------------------------

/// Aggregate numeric estimate of a subject's current trust risk.
///
/// Construction clamps to [0, 1]; downstream code may rely on the range
/// invariant without re-checking.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskScore(f64);

impl RiskScore {
    pub const MINIMAL: RiskScore = RiskScore(0.0);
    /// The fail-closed score: maximal risk under uncertainty.
    pub const MAXIMAL: RiskScore = RiskScore(1.0);

    pub fn new(score: f64) -> Self {
        if score.is_nan() {
            return Self::MAXIMAL;
        }
        Self(score.clamp(0.0, 1.0))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn level(&self) -> RiskLevel {
        RiskLevel::from_score(self.0)
    }

    pub fn is_critical(&self) -> bool {
        self.level() == RiskLevel::Critical
    }
}

impl fmt::Display for RiskScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

/// Risk bucket used for downstream text and triggers.
///
/// Boundaries: < 0.3 Low, [0.3, 0.6) Medium, [0.6, 0.8) High, >= 0.8 Critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            RiskLevel::Critical
        } else if score >= 0.6 {
            RiskLevel::High
        } else if score >= 0.3 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}
