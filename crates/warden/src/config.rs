use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use warden_policy::EvaluatorConfig;
use warden_verify::{
    MonitorConfig, PipelineConfig, RiskWeights, ScheduleConfig, StageConfig, VerifierConfig,
};

use crate::error::{WardenError, WardenResult};

// ---------------------------------------------------------------------------
// Verification section
// ---------------------------------------------------------------------------

/// Configuration for the verification pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Stages in execution order.
    #[serde(default = "default_stages")]
    pub stages: Vec<StageConfig>,

    /// Skip remaining stages once a stage produces a failure.
    #[serde(default)]
    pub fail_fast: bool,

    /// Per-method timeout in milliseconds.
    #[serde(default = "default_method_timeout_ms")]
    pub method_timeout_ms: u64,

    /// Result cache bounds.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Per-factor aggregation weights.
    #[serde(default)]
    pub weights: RiskWeights,
}

fn default_stages() -> Vec<StageConfig> {
    PipelineConfig::default().stages
}

fn default_method_timeout_ms() -> u64 {
    1_000
}

fn default_cache_capacity() -> usize {
    1_024
}

fn default_cache_ttl_secs() -> u64 {
    60
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            fail_fast: false,
            method_timeout_ms: default_method_timeout_ms(),
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
            weights: RiskWeights::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler section
// ---------------------------------------------------------------------------

/// Configuration for the adaptive scheduler and its worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_base_interval_secs")]
    pub base_interval_secs: u64,

    /// How often the slow tuning pass runs.
    #[serde(default = "default_tune_interval_secs")]
    pub tune_interval_secs: u64,

    /// Ticker period for the due-subject scan.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    #[serde(default = "default_high_error_rate")]
    pub high_error_rate: f64,

    #[serde(default = "default_low_error_rate")]
    pub low_error_rate: f64,

    #[serde(default = "default_target_latency_ms")]
    pub target_latency_ms: f64,
}

fn default_base_interval_secs() -> u64 {
    300
}

fn default_tune_interval_secs() -> u64 {
    300
}

fn default_tick_secs() -> u64 {
    30
}

fn default_workers() -> usize {
    4
}

fn default_queue_size() -> usize {
    256
}

fn default_high_error_rate() -> f64 {
    0.10
}

fn default_low_error_rate() -> f64 {
    0.02
}

fn default_target_latency_ms() -> f64 {
    500.0
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            base_interval_secs: default_base_interval_secs(),
            tune_interval_secs: default_tune_interval_secs(),
            tick_secs: default_tick_secs(),
            workers: default_workers(),
            queue_size: default_queue_size(),
            high_error_rate: default_high_error_rate(),
            low_error_rate: default_low_error_rate(),
            target_latency_ms: default_target_latency_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Policy section
// ---------------------------------------------------------------------------

/// Configuration for the policy evaluator and decision combiner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Decision when no rule matches.
    #[serde(default = "default_default_deny")]
    pub default_deny: bool,

    /// Priority at or above which a deny short-circuits evaluation.
    #[serde(default = "default_critical_priority")]
    pub critical_priority: i64,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Risk at or above which a policy allow is downgraded to challenge.
    #[serde(default = "default_risk_threshold")]
    pub risk_threshold: f64,

    /// Optional JSON rule file loaded at startup.
    #[serde(default)]
    pub rules_path: Option<PathBuf>,
}

fn default_default_deny() -> bool {
    true
}

fn default_critical_priority() -> i64 {
    1_000
}

fn default_risk_threshold() -> f64 {
    0.7
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default_deny: default_default_deny(),
            critical_priority: default_critical_priority(),
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
            risk_threshold: default_risk_threshold(),
            rules_path: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level configuration
// ---------------------------------------------------------------------------

/// Top-level configuration for the Warden binary.
///
/// Loaded from a TOML file (typically `~/.warden/config.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardenConfig {
    #[serde(default)]
    pub verification: VerificationConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub policy: PolicyConfig,
}

impl WardenConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> WardenResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: WardenConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> WardenResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn default_config_path() -> PathBuf {
        match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(".warden/config.toml"),
            None => PathBuf::from(".warden/config.toml"),
        }
    }

    /// Eager validation of every section.
    pub fn validate(&self) -> WardenResult<()> {
        if self.verification.stages.is_empty() {
            return Err(WardenError::Config(
                "at least one verification stage required".into(),
            ));
        }
        for stage in &self.verification.stages {
            if stage.methods.is_empty() {
                return Err(WardenError::Config(format!(
                    "stage '{}' has no methods",
                    stage.name
                )));
            }
            if stage.timeout_ms == 0 {
                return Err(WardenError::Config(format!(
                    "stage '{}' timeout must be positive",
                    stage.name
                )));
            }
        }
        if self.verification.method_timeout_ms == 0 {
            return Err(WardenError::Config("method timeout must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.policy.risk_threshold) {
            return Err(WardenError::Config(
                "risk threshold must be within [0, 1]".into(),
            ));
        }
        if self.scheduler.workers == 0 {
            return Err(WardenError::Config("worker pool must not be empty".into()));
        }
        if self.scheduler.queue_size == 0 {
            return Err(WardenError::Config("work queue must not be empty".into()));
        }
        if self.scheduler.high_error_rate <= self.scheduler.low_error_rate {
            return Err(WardenError::Config(
                "high error watermark must exceed the low watermark".into(),
            ));
        }
        Ok(())
    }

    pub fn verifier_config(&self) -> VerifierConfig {
        VerifierConfig {
            pipeline: PipelineConfig {
                stages: self.verification.stages.clone(),
                fail_fast: self.verification.fail_fast,
                method_timeout_ms: self.verification.method_timeout_ms,
            },
            schedule: ScheduleConfig {
                base_interval: Duration::from_secs(self.scheduler.base_interval_secs),
                tune_interval: Duration::from_secs(self.scheduler.tune_interval_secs),
                high_error_rate: self.scheduler.high_error_rate,
                low_error_rate: self.scheduler.low_error_rate,
                target_latency_ms: self.scheduler.target_latency_ms,
                ..ScheduleConfig::default()
            },
            weights: self.verification.weights.clone(),
            cache_capacity: self.verification.cache_capacity,
            cache_ttl: Duration::from_secs(self.verification.cache_ttl_secs),
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            tick_interval: Duration::from_secs(self.scheduler.tick_secs),
            queue_size: self.scheduler.queue_size,
            workers: self.scheduler.workers,
        }
    }

    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            default_deny: self.policy.default_deny,
            critical_priority: self.policy.critical_priority,
            cache_capacity: self.policy.cache_capacity,
            cache_ttl: Duration::from_secs(self.policy.cache_ttl_secs),
        }
    }
}
