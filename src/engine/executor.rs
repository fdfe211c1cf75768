use std::{path::PathBuf, sync::Arc, time::Instant};

use uuid::Uuid;

use crate::engine::{
    admission::AdmissionGate,
    collector,
    error::EngineError,
    gate::{self, ValidRequest},
    metrics::MetricsRegistry,
    models::{ExecutionRequest, ExecutionResult},
    sandbox::{LanguageRegistry, OutcomeKind, ProcessRunner, Workspace},
};

/// Turns "run this code" into a bounded child process and a structured result.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<LanguageRegistry>,
    runner: Arc<dyn ProcessRunner>,
    admission: AdmissionGate,
    metrics: Arc<MetricsRegistry>,
    workspace_root: PathBuf,
    max_code_bytes: usize,
}

impl Engine {
    pub fn new(
        registry: Arc<LanguageRegistry>,
        runner: Arc<dyn ProcessRunner>,
        admission: AdmissionGate,
        metrics: Arc<MetricsRegistry>,
        workspace_root: PathBuf,
        max_code_bytes: usize,
    ) -> Self {
        Self {
            registry,
            runner,
            admission,
            metrics,
            workspace_root,
            max_code_bytes,
        }
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    pub fn admission(&self) -> &AdmissionGate {
        &self.admission
    }

    pub async fn execute(
        &self,
        execution_id: Uuid,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult, EngineError> {
        self.metrics.submitted();

        let valid = match gate::validate(request, &self.registry, self.max_code_bytes) {
            Ok(valid) => valid,
            Err(err) => {
                self.metrics.rejected();
                tracing::info!(%execution_id, language = %request.language, error = %err, "execution rejected");
                return Err(err);
            }
        };

        let permit = self.admission.admit().await.inspect_err(|_| {
            self.metrics.overloaded();
            tracing::warn!(%execution_id, "execution rejected, capacity exhausted");
        })?;

        // Runs detached so a dropped caller cannot abandon a half-finished execution.
        let engine = self.clone();
        let task = tokio::spawn(async move {
            let _permit = permit;
            engine.metrics.started();
            let outcome = engine.clone().run_pipeline(execution_id, valid).await;
            engine.metrics.finished();
            engine.record_outcome(execution_id, &outcome);
            outcome.map(|(result, _)| result)
        });

        task.await.unwrap_or_else(|err| {
            // The task panicked; its workspace was dropped while unwinding.
            self.metrics.finished();
            let outcome = Err(EngineError::from(err));
            self.record_outcome(execution_id, &outcome);
            outcome.map(|(result, _)| result)
        })
    }

    fn record_outcome(
        &self,
        execution_id: Uuid,
        outcome: &Result<(ExecutionResult, OutcomeKind), EngineError>,
    ) {
        match outcome {
            Ok((_, OutcomeKind::TimedOut)) => self.metrics.timed_out(),
            Ok((result, OutcomeKind::Completed)) if result.exit_code == 0 => {
                self.metrics.succeeded()
            }
            Ok(_) => self.metrics.failed(),
            Err(err) => {
                self.metrics.internal_error();
                tracing::error!(%execution_id, error = %err, "execution pipeline failed");
            }
        }
    }

    async fn run_pipeline(
        self,
        execution_id: Uuid,
        valid: ValidRequest,
    ) -> Result<(ExecutionResult, OutcomeKind), EngineError> {
        let started = Instant::now();

        let root = self.workspace_root.clone();
        let descriptor = valid.descriptor.clone();
        let code = valid.code;
        let workspace = tokio::task::spawn_blocking(move || {
            Workspace::provision(&root, &descriptor, code.as_bytes())
        })
        .await??;

        tracing::debug!(
            %execution_id,
            language = %valid.language,
            workspace = %workspace.path().display(),
            "workspace provisioned"
        );

        let raw = self.runner.run(&valid.descriptor, &workspace).await;
        let (result, kind) = collector::classify(raw, started);

        if let Err(err) = tokio::task::spawn_blocking(move || workspace.close()).await {
            tracing::warn!(%execution_id, error = %err, "workspace cleanup task failed");
        }

        tracing::info!(
            %execution_id,
            language = %valid.language,
            workspace_id = %valid.workspace_id,
            file_id = %valid.file_id,
            outcome = ?kind,
            exit_code = result.exit_code,
            duration_ms = result.execution_time,
            "execution finished"
        );
        Ok((result, kind))
    }
}
