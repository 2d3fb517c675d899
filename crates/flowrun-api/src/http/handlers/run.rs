//! Cross-workflow run listing, inspection and cancellation.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

use flowrun_core::workflow::RunFilter;
use flowrun_types::workflow::RunStatus;

use super::workflow::parse_run_id;
use crate::http::error::AppError;
use crate::state::AppState;

/// Query parameters for listing runs.
#[derive(Debug, Deserialize, Default)]
pub struct ListRunsQuery {
    /// Only runs of this workflow.
    pub workflow: Option<String>,
    /// Only runs in this status (pending, running, completed, failed).
    pub status: Option<String>,
    /// Maximum number of runs to return (default 50).
    pub limit: Option<usize>,
}

const DEFAULT_RUN_LIMIT: usize = 50;

/// GET /api/runs - List runs, newest first.
pub async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<Value>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<RunStatus>)
        .transpose()
        .map_err(AppError::BadRequest)?;

    let filter = RunFilter {
        workflow: query.workflow,
        status,
        limit: Some(query.limit.unwrap_or(DEFAULT_RUN_LIMIT)),
    };
    let runs = state.executor.list(&filter).await?;

    Ok(Json(json!({
        "success": true,
        "runs": runs,
    })))
}

/// GET /api/runs/{run_id} - Full status view of one run.
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let run_id = parse_run_id(&run_id)?;
    let view = state.executor.status(run_id).await?;
    Ok(Json(json!({
        "success": true,
        "run": view,
    })))
}

/// POST /api/runs/{run_id}/cancel - Cancel a pending or running run.
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let run_id = parse_run_id(&run_id)?;
    state.executor.cancel(run_id).await?;
    let view = state.executor.status(run_id).await?;
    Ok(Json(json!({
        "success": true,
        "runId": run_id,
        "status": view.status,
    })))
}
