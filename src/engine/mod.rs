pub mod admission;
pub mod api;
pub mod collector;
pub mod error;
pub mod executor;
pub mod gate;
pub mod metrics;
pub mod models;
pub mod sandbox;
pub mod store;

use std::sync::Arc;

use anyhow::Context;
use axum::Router;

use crate::{
    config::ServiceConfig,
    engine::{
        admission::AdmissionGate, api::routes, executor::Engine, metrics::MetricsRegistry,
        sandbox::ProcessSupervisor, store::ExecutionStore,
    },
};

pub fn build_router(config: &ServiceConfig) -> anyhow::Result<Router> {
    let root = &config.execution.workspace_root;
    std::fs::create_dir_all(root)
        .with_context(|| format!("workspace root {} is not usable", root.display()))?;

    let registry = Arc::new(config.execution.registry());
    let metrics = Arc::new(MetricsRegistry::new());
    let admission = AdmissionGate::new(
        config.admission.max_concurrent,
        config.admission.max_queued,
        config.admission.max_wait,
    );
    let engine = Engine::new(
        registry.clone(),
        Arc::new(ProcessSupervisor::new(config.execution.max_output_bytes)),
        admission,
        metrics.clone(),
        root.clone(),
        config.execution.max_code_bytes,
    );
    let store = Arc::new(ExecutionStore::new(config.persistence_path.clone()));

    tracing::info!(
        languages = ?registry.supported(),
        max_concurrent = config.admission.max_concurrent,
        max_queued = config.admission.max_queued,
        workspace_root = %root.display(),
        "execution engine ready"
    );

    Ok(routes(engine, store, metrics, config.max_body_bytes))
}
