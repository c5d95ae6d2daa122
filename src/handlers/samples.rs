use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{Method, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::flush::FlushOutcome;
use crate::samples::DataSample;
use crate::AppState;

use super::AppError;

// ─── Request / response types ────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IngestParams {
    pub project: Option<String>,
    #[serde(default)]
    pub environment: String,
}

#[derive(Debug, Serialize)]
pub struct SamplesSnapshot {
    pub pending_batches: u64,
    pub samples: Vec<DataSample>,
}

// ─── POST /samples/ ──────────────────────────────────────────────

/// Body: `{"<function>": <calls>, ...}`. Answers 201 once the batch is
/// merged, whether or not it triggered a flush.
pub async fn ingest_samples(
    State(state): State<Arc<AppState>>,
    method: Method,
    Query(params): Query<IngestParams>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    if method != Method::POST {
        return Err(AppError::MethodNotAllowed(
            "only POST allowed for /samples/".into(),
        ));
    }

    let project = params
        .project
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::BadRequest("must specify `project` query parameter".into()))?;

    // Counts are u64, so negative or fractional values are rejected here.
    let counts: HashMap<String, u64> = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid json: {e}")))?;

    // Flush failures were already logged; the batch stays accumulated.
    let outcome = state
        .flush
        .ingest(&counts, &project, &params.environment)
        .await;
    if let FlushOutcome::Flushed(report) = outcome {
        tracing::debug!(%project, groups = report.groups, "ingest triggered a flush");
    }

    Ok(StatusCode::CREATED)
}

// ─── GET /api/samples ────────────────────────────────────────────

/// Read-only view of what the next flush would send.
pub async fn get_samples(State(state): State<Arc<AppState>>) -> Json<SamplesSnapshot> {
    Json(SamplesSnapshot {
        pending_batches: state.flush.pending_batches(),
        samples: state.samples.export(),
    })
}
