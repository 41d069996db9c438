//! Pipeline orchestrator.
//!
//! Runs the configured verification stages for a subject. Stages execute
//! strictly in declared order; within a stage all assigned method
//! executors run concurrently, each bounded by the smaller of the method
//! timeout and the stage timeout. A timeout, executor error, or panic
//! becomes a failed method result; the orchestrator always returns a
//! `VerificationResult`, never an internal fault.
//!
//! Per-subject verifications are serialized through a keyed async mutex:
//! at most one pipeline run is in flight per subject, and concurrent
//! callers collapse onto the result it caches.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use warden_core::{
    RiskLevel, Severity, SubjectId, TelemetryEvent, TelemetryKind, TelemetrySink, Timestamp,
    TracingSink, TtlCache,
};

use crate::error::{VerifyError, VerifyResult};
use crate::executor::ExecutorRegistry;
use crate::metrics::MetricsAggregator;
use crate::registry::ContextRegistry;
use crate::risk::RiskWeights;
use crate::schedule::{ScheduleConfig, ScheduleStore};
use crate::types::{
    MethodKind, MethodResult, VerificationContext, VerificationId, VerificationResult,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// A timed group of concurrently executed verification methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,
    pub methods: Vec<MethodKind>,
    #[serde(default = "default_stage_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_stage_timeout_ms() -> u64 {
    2_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub stages: Vec<StageConfig>,
    /// When a stage produces any failure, skip the remaining stages and
    /// score the partial result set.
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default = "default_method_timeout_ms")]
    pub method_timeout_ms: u64,
}

fn default_method_timeout_ms() -> u64 {
    1_000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stages: vec![
                StageConfig {
                    name: "identity".to_string(),
                    methods: vec![MethodKind::Cryptographic],
                    timeout_ms: default_stage_timeout_ms(),
                },
                StageConfig {
                    name: "posture".to_string(),
                    methods: vec![
                        MethodKind::Device,
                        MethodKind::Location,
                        MethodKind::Behavioral,
                    ],
                    timeout_ms: default_stage_timeout_ms(),
                },
            ],
            fail_fast: false,
            method_timeout_ms: default_method_timeout_ms(),
        }
    }
}

/// Everything the orchestrator needs beyond the executors themselves.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub pipeline: PipelineConfig,
    pub schedule: ScheduleConfig,
    pub weights: RiskWeights,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            schedule: ScheduleConfig::default(),
            weights: RiskWeights::default(),
            cache_capacity: 1024,
            cache_ttl: Duration::from_secs(60),
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    executors: ExecutorRegistry,
    contexts: Arc<ContextRegistry>,
    cache: TtlCache<SubjectId, VerificationResult>,
    metrics: Arc<MetricsAggregator>,
    schedules: Arc<ScheduleStore>,
    sink: Arc<dyn TelemetrySink>,
    config: VerifierConfig,
    /// Single-writer-per-key: one lock per subject, created on demand.
    subject_locks: Mutex<HashMap<SubjectId, Arc<tokio::sync::Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(config: VerifierConfig, executors: ExecutorRegistry) -> Self {
        Self::with_sink(config, executors, Arc::new(TracingSink))
    }

    pub fn with_sink(
        config: VerifierConfig,
        executors: ExecutorRegistry,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            executors,
            contexts: Arc::new(ContextRegistry::new()),
            cache: TtlCache::new(config.cache_capacity, config.cache_ttl),
            metrics: Arc::new(MetricsAggregator::new()),
            schedules: Arc::new(ScheduleStore::new(config.schedule.clone())),
            sink,
            config,
            subject_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn contexts(&self) -> &Arc<ContextRegistry> {
        &self.contexts
    }

    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    pub fn schedules(&self) -> &Arc<ScheduleStore> {
        &self.schedules
    }

    pub fn cache_stats(&self) -> warden_core::CacheStats {
        self.cache.stats()
    }

    /// Drop expired cached results. Returns the number removed.
    pub fn sweep_cache(&self) -> usize {
        self.cache.sweep_expired()
    }

    /// Register a subject with a fresh context and schedule. Returns
    /// false when already registered.
    pub fn register_subject(&self, subject: SubjectId) -> bool {
        let created = self.contexts.register(subject.clone());
        self.schedules.ensure(&subject);
        created
    }

    /// Register or replace a fully populated context.
    pub fn register_context(&self, context: VerificationContext) {
        self.schedules.ensure(&context.subject_id);
        self.contexts.insert(context);
    }

    /// Deregister a subject: purges context, cached results, and schedule.
    /// Any in-flight verification for the subject is discarded at
    /// write-back. Returns whether the subject was registered.
    pub fn deregister_subject(&self, subject: &SubjectId) -> bool {
        let existed = self.contexts.deregister(subject);
        self.cache.remove(subject);
        self.schedules.remove(subject);
        let mut locks = self.subject_locks.lock().expect("subject lock map poisoned");
        locks.remove(subject);
        existed
    }

    fn subject_lock(&self, subject: &SubjectId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.subject_locks.lock().expect("subject lock map poisoned");
        locks
            .entry(subject.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Verify a subject now, or return a still-valid cached result.
    pub async fn verify_now(&self, subject: &SubjectId) -> VerifyResult<VerificationResult> {
        if !self.contexts.contains(subject) {
            return Err(VerifyError::UnregisteredSubject(subject.clone()));
        }

        let lock = self.subject_lock(subject);
        let _guard = lock.lock().await;

        // Re-check under the lock: the subject may have been deregistered
        // while we waited, or a concurrent run may have cached a result.
        let context = self
            .contexts
            .get(subject)
            .ok_or_else(|| VerifyError::UnregisteredSubject(subject.clone()))?;
        if let Some(cached) = self.cache.get(subject) {
            self.metrics.record_cache_hit(subject);
            return Ok(cached);
        }

        let started = Instant::now();
        let method_results = self.run_stages(subject, &context).await;

        let risk = self.config.weights.aggregate(&method_results);
        let success = !method_results.is_empty() && risk.level() < RiskLevel::Critical;
        let now = Timestamp::now();
        let next_verification = self.schedules.record_result(subject, risk, now);

        let violations = method_results
            .iter()
            .filter(|r| !r.success)
            .map(|r| {
                let reason = r
                    .metadata
                    .get("error")
                    .map(String::as_str)
                    .unwrap_or("verification failed");
                format!("method {} failed: {}", r.method, reason)
            })
            .collect();

        let result = VerificationResult {
            id: VerificationId::generate(),
            subject_id: subject.clone(),
            timestamp: now,
            success,
            risk_score: risk,
            method_results,
            violations,
            recommendations: recommendations_for(risk.level()),
            latency_ms: started.elapsed().as_millis() as u64,
            next_verification,
        };

        // Write-back, unless the subject was deregistered mid-flight, in
        // which case the result is discarded: not written back, not cached.
        let still_registered = self.contexts.update(subject, |ctx| {
            ctx.risk = risk;
            ctx.last_verified = Some(now);
        });
        if still_registered {
            if result.success {
                self.cache.put(subject.clone(), result.clone());
            }
            self.metrics
                .record_verification(subject, success, risk, result.latency_ms);
            self.sink.emit(&TelemetryEvent::new(
                TelemetryKind::VerificationCompleted,
                if risk.level() >= RiskLevel::High {
                    Severity::Warning
                } else {
                    Severity::Info
                },
                "pipeline",
                format!(
                    "subject={} success={} risk={} level={}",
                    subject,
                    success,
                    risk,
                    risk.level()
                ),
            ));
        }

        Ok(result)
    }

    /// Execute the configured stages in declared order.
    async fn run_stages(
        &self,
        subject: &SubjectId,
        context: &VerificationContext,
    ) -> Vec<MethodResult> {
        let mut method_results = Vec::new();

        for stage in &self.config.pipeline.stages {
            let stage_timeout = Duration::from_millis(stage.timeout_ms);
            // Capping each method at the stage timeout bounds the whole
            // stage: a still-pending executor resolves as a failed result
            // by the stage deadline.
            let method_timeout =
                Duration::from_millis(self.config.pipeline.method_timeout_ms).min(stage_timeout);

            let mut kinds = Vec::new();
            let mut handles = Vec::new();
            for &kind in &stage.methods {
                match self.executors.get(kind) {
                    Some(executor) => {
                        let subject = subject.clone();
                        let context = context.clone();
                        kinds.push(kind);
                        handles.push(tokio::spawn(async move {
                            let t0 = Instant::now();
                            let outcome = tokio::time::timeout(
                                method_timeout,
                                executor.execute(&subject, &context),
                            )
                            .await;
                            let latency_ms = t0.elapsed().as_millis() as u64;
                            match outcome {
                                Ok(Ok(outcome)) => {
                                    MethodResult::from_outcome(kind, outcome, latency_ms)
                                }
                                Ok(Err(e)) => MethodResult::failed(kind, latency_ms, e.to_string()),
                                Err(_) => {
                                    MethodResult::failed(kind, latency_ms, "execution timed out")
                                }
                            }
                        }));
                    }
                    None => {
                        method_results.push(MethodResult::failed(
                            kind,
                            0,
                            "no executor registered",
                        ));
                    }
                }
            }

            let mut stage_failed = method_results.iter().any(|r| !r.success);
            for (kind, joined) in kinds.into_iter().zip(join_all(handles).await) {
                let result = match joined {
                    Ok(result) => result,
                    // A panicking executor is an absorbed internal fault.
                    Err(e) => {
                        tracing::error!(subject = %subject, method = %kind, "executor fault: {}", e);
                        MethodResult::failed(kind, stage_timeout.as_millis() as u64, "executor fault")
                    }
                };
                if !result.success {
                    stage_failed = true;
                }
                method_results.push(result);
            }

            if self.config.pipeline.fail_fast && stage_failed {
                tracing::debug!(
                    subject = %subject,
                    stage = %stage.name,
                    "fail-fast: skipping remaining stages"
                );
                break;
            }
        }

        method_results
    }

    /// Retune every registered subject's cadence from observed metrics.
    pub fn tune_schedules(&self) {
        for subject in self.contexts.subject_ids() {
            if let Some(metrics) = self.metrics.subject(&subject) {
                if let Some(interval) =
                    self.schedules
                        .tune(&subject, metrics.error_rate(), metrics.average_latency_ms())
                {
                    self.sink.emit(&TelemetryEvent::new(
                        TelemetryKind::ScheduleAdjusted,
                        Severity::Info,
                        "scheduler",
                        format!(
                            "subject={} interval={}s",
                            subject,
                            interval.as_secs()
                        ),
                    ));
                }
            }
        }
    }
}

fn recommendations_for(level: RiskLevel) -> Vec<String> {
    match level {
        RiskLevel::Low => Vec::new(),
        RiskLevel::Medium => vec!["monitor subject activity".to_string()],
        RiskLevel::High => vec![
            "require an additional verification factor".to_string(),
            "shorten the re-verification interval".to_string(),
        ],
        RiskLevel::Critical => vec![
            "deny access and require re-authentication".to_string(),
            "review recent activity for this subject".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::FixedOutcomeExecutor;
    use crate::types::MethodOutcome;
    use warden_core::InMemorySink;

    fn good_executor(kind: MethodKind, confidence: f64) -> Arc<FixedOutcomeExecutor> {
        Arc::new(FixedOutcomeExecutor::new(
            kind,
            MethodOutcome::succeeded(confidence),
        ))
    }

    fn single_stage_config(methods: Vec<MethodKind>) -> VerifierConfig {
        VerifierConfig {
            pipeline: PipelineConfig {
                stages: vec![StageConfig {
                    name: "only".to_string(),
                    methods,
                    timeout_ms: 200,
                }],
                fail_fast: false,
                method_timeout_ms: 100,
            },
            ..Default::default()
        }
    }

    fn make_orchestrator(
        config: VerifierConfig,
        executors: ExecutorRegistry,
    ) -> (Orchestrator, Arc<InMemorySink>) {
        let sink = Arc::new(InMemorySink::new());
        (
            Orchestrator::with_sink(config, executors, sink.clone()),
            sink,
        )
    }

    #[tokio::test]
    async fn test_unregistered_subject_fails() {
        let (orchestrator, _) = make_orchestrator(
            single_stage_config(vec![MethodKind::Cryptographic]),
            ExecutorRegistry::new(),
        );
        let err = orchestrator
            .verify_now(&SubjectId::new("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::UnregisteredSubject(_)));
    }

    #[tokio::test]
    async fn test_successful_verification_updates_context_and_cache() {
        let executors = ExecutorRegistry::new()
            .with(good_executor(MethodKind::Cryptographic, 0.95));
        let (orchestrator, sink) =
            make_orchestrator(single_stage_config(vec![MethodKind::Cryptographic]), executors);

        let subject = SubjectId::new("alice");
        orchestrator.register_subject(subject.clone());

        let result = orchestrator.verify_now(&subject).await.unwrap();
        assert!(result.success);
        assert!((result.risk_score.value() - 0.05).abs() < 1e-9);
        assert!(result.violations.is_empty());
        assert!(result.next_verification > result.timestamp);

        let context = orchestrator.contexts().get(&subject).unwrap();
        assert_eq!(context.risk, result.risk_score);
        assert!(context.last_verified.is_some());

        assert!(sink
            .events()
            .iter()
            .any(|e| e.kind == TelemetryKind::VerificationCompleted));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_re_execution() {
        let executors = ExecutorRegistry::new()
            .with(good_executor(MethodKind::Cryptographic, 0.95));
        let (orchestrator, _) =
            make_orchestrator(single_stage_config(vec![MethodKind::Cryptographic]), executors);

        let subject = SubjectId::new("alice");
        orchestrator.register_subject(subject.clone());

        let first = orchestrator.verify_now(&subject).await.unwrap();
        let second = orchestrator.verify_now(&subject).await.unwrap();

        // Same cached result, hit counted, no second execution.
        assert_eq!(first.id, second.id);
        assert_eq!(orchestrator.cache_stats().hits, 1);
        let metrics = orchestrator.metrics().subject(&subject).unwrap();
        assert_eq!(metrics.total_verifications, 1);
        assert_eq!(metrics.cache_hits, 1);
    }

    #[tokio::test]
    async fn test_timeout_becomes_failed_result() {
        let slow = Arc::new(
            FixedOutcomeExecutor::new(MethodKind::Biometric, MethodOutcome::succeeded(0.99))
                .with_delay(Duration::from_secs(5)),
        );
        let executors = ExecutorRegistry::new()
            .with(good_executor(MethodKind::Cryptographic, 0.95))
            .with(slow);
        let (orchestrator, _) = make_orchestrator(
            single_stage_config(vec![MethodKind::Cryptographic, MethodKind::Biometric]),
            executors,
        );

        let subject = SubjectId::new("alice");
        orchestrator.register_subject(subject.clone());

        let result = orchestrator.verify_now(&subject).await.unwrap();
        assert_eq!(result.method_results.len(), 2);
        let biometric = result
            .method_results
            .iter()
            .find(|r| r.method == MethodKind::Biometric)
            .unwrap();
        assert!(!biometric.success);
        assert_eq!(biometric.metadata["error"], "execution timed out");
        assert!(result
            .violations
            .iter()
            .any(|v| v.contains("biometric")));
    }

    #[tokio::test]
    async fn test_missing_executor_becomes_failed_result() {
        let executors = ExecutorRegistry::new()
            .with(good_executor(MethodKind::Cryptographic, 0.95));
        let (orchestrator, _) = make_orchestrator(
            single_stage_config(vec![MethodKind::Cryptographic, MethodKind::Device]),
            executors,
        );

        let subject = SubjectId::new("alice");
        orchestrator.register_subject(subject.clone());

        let result = orchestrator.verify_now(&subject).await.unwrap();
        let device = result
            .method_results
            .iter()
            .find(|r| r.method == MethodKind::Device)
            .unwrap();
        assert!(!device.success);
        assert_eq!(device.metadata["error"], "no executor registered");
    }

    #[tokio::test]
    async fn test_all_methods_failing_is_maximal_risk_not_error() {
        struct FaultyExecutor;
        #[async_trait::async_trait]
        impl crate::executor::MethodExecutor for FaultyExecutor {
            fn kind(&self) -> MethodKind {
                MethodKind::Cryptographic
            }
            async fn execute(
                &self,
                _subject: &SubjectId,
                _context: &VerificationContext,
            ) -> VerifyResult<MethodOutcome> {
                Err(VerifyError::Executor("hsm unavailable".to_string()))
            }
        }

        let executors = ExecutorRegistry::new().with(Arc::new(FaultyExecutor));
        let (orchestrator, _) =
            make_orchestrator(single_stage_config(vec![MethodKind::Cryptographic]), executors);

        let subject = SubjectId::new("alice");
        orchestrator.register_subject(subject.clone());

        let result = orchestrator.verify_now(&subject).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.risk_score, warden_core::RiskScore::MAXIMAL);
        assert_eq!(result.violations.len(), 1);
        // Failed results are not cached.
        assert_eq!(orchestrator.cache_stats().hits, 0);
        let again = orchestrator.verify_now(&subject).await.unwrap();
        assert_ne!(again.id, result.id);
    }

    #[tokio::test]
    async fn test_fail_fast_skips_remaining_stages() {
        let config = VerifierConfig {
            pipeline: PipelineConfig {
                stages: vec![
                    StageConfig {
                        name: "first".to_string(),
                        methods: vec![MethodKind::Device],
                        timeout_ms: 200,
                    },
                    StageConfig {
                        name: "second".to_string(),
                        methods: vec![MethodKind::Cryptographic],
                        timeout_ms: 200,
                    },
                ],
                fail_fast: true,
                method_timeout_ms: 100,
            },
            ..Default::default()
        };

        let failing_device = Arc::new(FixedOutcomeExecutor::new(
            MethodKind::Device,
            MethodOutcome::failed(),
        ));
        let executors = ExecutorRegistry::new()
            .with(failing_device)
            .with(good_executor(MethodKind::Cryptographic, 0.95));
        let (orchestrator, _) = make_orchestrator(config, executors);

        let subject = SubjectId::new("alice");
        orchestrator.register_subject(subject.clone());

        let result = orchestrator.verify_now(&subject).await.unwrap();
        // Only the first stage ran.
        assert_eq!(result.method_results.len(), 1);
        assert_eq!(result.method_results[0].method, MethodKind::Device);
    }

    #[tokio::test]
    async fn test_without_fail_fast_all_stages_run() {
        let config = VerifierConfig {
            pipeline: PipelineConfig {
                stages: vec![
                    StageConfig {
                        name: "first".to_string(),
                        methods: vec![MethodKind::Device],
                        timeout_ms: 200,
                    },
                    StageConfig {
                        name: "second".to_string(),
                        methods: vec![MethodKind::Cryptographic],
                        timeout_ms: 200,
                    },
                ],
                fail_fast: false,
                method_timeout_ms: 100,
            },
            ..Default::default()
        };

        let failing_device = Arc::new(FixedOutcomeExecutor::new(
            MethodKind::Device,
            MethodOutcome::failed(),
        ));
        let executors = ExecutorRegistry::new()
            .with(failing_device)
            .with(good_executor(MethodKind::Cryptographic, 0.95));
        let (orchestrator, _) = make_orchestrator(config, executors);

        let subject = SubjectId::new("alice");
        orchestrator.register_subject(subject.clone());

        let result = orchestrator.verify_now(&subject).await.unwrap();
        assert_eq!(result.method_results.len(), 2);
    }

    #[tokio::test]
    async fn test_deregister_mid_flight_discards_result() {
        let slow = Arc::new(
            FixedOutcomeExecutor::new(
                MethodKind::Cryptographic,
                MethodOutcome::succeeded(0.95),
            )
            .with_delay(Duration::from_millis(80)),
        );
        let executors = ExecutorRegistry::new().with(slow);
        let (orchestrator, _) =
            make_orchestrator(single_stage_config(vec![MethodKind::Cryptographic]), executors);
        let orchestrator = Arc::new(orchestrator);

        let subject = SubjectId::new("alice");
        orchestrator.register_subject(subject.clone());

        let task = {
            let orchestrator = orchestrator.clone();
            let subject = subject.clone();
            tokio::spawn(async move { orchestrator.verify_now(&subject).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        orchestrator.deregister_subject(&subject);

        let result = task.await.unwrap().unwrap();
        assert!(result.success);
        // Discarded: no context, no cached entry, no metrics execution.
        assert!(orchestrator.contexts().get(&subject).is_none());
        orchestrator.register_subject(subject.clone());
        let fresh = orchestrator.verify_now(&subject).await.unwrap();
        assert_ne!(fresh.id, result.id);
    }

    #[tokio::test]
    async fn test_deregister_purges_cache() {
        let executors = ExecutorRegistry::new()
            .with(good_executor(MethodKind::Cryptographic, 0.95));
        let (orchestrator, _) =
            make_orchestrator(single_stage_config(vec![MethodKind::Cryptographic]), executors);

        let subject = SubjectId::new("alice");
        orchestrator.register_subject(subject.clone());
        orchestrator.verify_now(&subject).await.unwrap();

        assert!(orchestrator.deregister_subject(&subject));
        assert!(orchestrator.schedules().get(&subject).is_none());
        let err = orchestrator.verify_now(&subject).await.unwrap_err();
        assert!(matches!(err, VerifyError::UnregisteredSubject(_)));
    }

    #[tokio::test]
    async fn test_tune_schedules_emits_telemetry() {
        let failing = Arc::new(FixedOutcomeExecutor::new(
            MethodKind::Cryptographic,
            MethodOutcome::failed(),
        ));
        let executors = ExecutorRegistry::new().with(failing);
        let (orchestrator, sink) =
            make_orchestrator(single_stage_config(vec![MethodKind::Cryptographic]), executors);

        let subject = SubjectId::new("alice");
        orchestrator.register_subject(subject.clone());
        orchestrator.verify_now(&subject).await.unwrap();

        // 100% error rate shrinks the interval.
        orchestrator.tune_schedules();
        let schedule = orchestrator.schedules().get(&subject).unwrap();
        assert!(schedule.current_interval < schedule.base_interval);
        assert!(sink
            .events()
            .iter()
            .any(|e| e.kind == TelemetryKind::ScheduleAdjusted));
    }
}
