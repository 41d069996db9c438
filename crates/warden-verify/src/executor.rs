//! The method executor contract and registry.
//!
//! Each verification factor is scored by a pluggable executor behind a
//! single contract. The core never implements cryptography, biometrics,
//! or anomaly-detection math itself; external services (HSM, behavioral
//! models) sit behind this trait. The orchestrator imposes the timeout:
//! an executor that overruns is recorded as a failed result, so
//! implementations should still return promptly to free the task.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use warden_core::SubjectId;

use crate::error::VerifyResult;
use crate::types::{MethodKind, MethodOutcome, VerificationContext};

#[async_trait]
pub trait MethodExecutor: Send + Sync {
    /// The factor this executor scores.
    fn kind(&self) -> MethodKind;

    /// Score the subject in the given context.
    ///
    /// An `Err` is absorbed by the orchestrator as a failed method result;
    /// it never aborts the pipeline.
    async fn execute(
        &self,
        subject: &SubjectId,
        context: &VerificationContext,
    ) -> VerifyResult<MethodOutcome>;
}

// ---------------------------------------------------------------------------
// ExecutorRegistry
// ---------------------------------------------------------------------------

/// Maps factor kinds to their executors. Built once at startup and
/// immutable afterwards.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<MethodKind, Arc<dyn MethodExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Register an executor, replacing any previous one for its kind.
    pub fn register(&mut self, executor: Arc<dyn MethodExecutor>) {
        self.executors.insert(executor.kind(), executor);
    }

    /// Builder-style registration.
    pub fn with(mut self, executor: Arc<dyn MethodExecutor>) -> Self {
        self.register(executor);
        self
    }

    pub fn get(&self, kind: MethodKind) -> Option<Arc<dyn MethodExecutor>> {
        self.executors.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<MethodKind> {
        self.executors.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}
