use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use uuid::Uuid;

use crate::engine::{
    error::EngineError,
    executor::Engine,
    metrics::MetricsRegistry,
    models::{ExecutionRecord, ExecutionRequest, ExecutionResult, LanguagesResponse},
    store::ResultSink,
};

#[derive(Clone)]
pub struct AppState {
    engine: Engine,
    sink: Arc<dyn ResultSink>,
    metrics: Arc<MetricsRegistry>,
    max_body_bytes: usize,
}

pub fn routes(
    engine: Engine,
    sink: Arc<dyn ResultSink>,
    metrics: Arc<MetricsRegistry>,
    max_body_bytes: usize,
) -> Router {
    let state = AppState {
        engine,
        sink,
        metrics,
        max_body_bytes,
    };
    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(render_metrics))
        .route("/api/languages", get(languages))
        .route("/api/execute", post(execute))
        .route(
            "/api/executions/{workspace_id}/{file_id}",
            get(latest_execution),
        )
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn render_metrics(State(state): State<AppState>) -> (StatusCode, String) {
    let admission = state.engine.admission();
    let mut body = state.metrics.render_prometheus();
    body.push_str(&format!(
        concat!(
            "# TYPE execution_admission_waiting gauge\n",
            "execution_admission_waiting {}\n",
            "# TYPE execution_permits_available gauge\n",
            "execution_permits_available {}\n"
        ),
        admission.waiting(),
        admission.available(),
    ));
    (StatusCode::OK, body)
}

async fn languages(State(state): State<AppState>) -> Json<LanguagesResponse> {
    Json(LanguagesResponse {
        languages: state.engine.registry().supported(),
    })
}

async fn execute(
    State(state): State<AppState>,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> Result<Json<ExecutionResult>, EngineError> {
    // Bodies that never reach the engine still count as submitted and rejected.
    let Json(request) = payload.map_err(|rejection| {
        state.metrics.submitted();
        state.metrics.rejected();
        tracing::info!(status = %rejection.status(), "execution request body rejected");
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            EngineError::PayloadTooLarge {
                limit: state.max_body_bytes,
            }
        } else {
            EngineError::Validation(format!("Invalid request body: {}", rejection.body_text()))
        }
    })?;

    let execution_id = Uuid::new_v4();
    let result = state.engine.execute(execution_id, &request).await?;

    // The caller gets its result even when the sink is down.
    let record = ExecutionRecord::new(execution_id, &request, &result);
    if let Err(err) = state.sink.persist(record).await {
        tracing::warn!(
            %execution_id,
            workspace_id = %request.workspace_id,
            file_id = %request.file_id,
            error = %err,
            "failed to persist execution result"
        );
    }

    Ok(Json(result))
}

async fn latest_execution(
    State(state): State<AppState>,
    Path((workspace_id, file_id)): Path<(String, String)>,
) -> Result<Json<ExecutionRecord>, (StatusCode, Json<serde_json::Value>)> {
    match state.sink.latest(&workspace_id, &file_id).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "no execution recorded for this file" })),
        )),
        Err(err) => {
            tracing::warn!(%workspace_id, %file_id, error = %err, "failed to load execution result");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "failed to load execution result" })),
            ))
        }
    }
}
