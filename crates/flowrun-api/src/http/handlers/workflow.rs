//! Workflow listing, run submission and per-workflow status polling.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::http::error::AppError;
use crate::state::AppState;

/// GET /api/workflows - Describe every registered workflow.
pub async fn list_workflows(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "success": true,
        "workflows": state.catalog.summaries(),
    }))
}

/// POST /api/{workflow}/generate - Validate the trigger input and start a run
/// in the background.
pub async fn generate(
    State(state): State<AppState>,
    Path(workflow): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let workflow = state.catalog.get(&workflow)?;
    let Json(trigger) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let run_id = state.executor.submit(&workflow, trigger).await?;
    tracing::info!(run_id = %run_id, workflow = %workflow.name(), "run submitted over HTTP");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "success": true,
            "runId": run_id,
            "statusUrl": format!("/api/{}/status/{run_id}", workflow.name()),
        })),
    ))
}

/// GET /api/{workflow}/status/{run_id} - Poll one run of a workflow.
pub async fn status(
    State(state): State<AppState>,
    Path((workflow, run_id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let run_id = parse_run_id(&run_id)?;
    let view = state.executor.status(run_id).await?;
    if view.workflow != workflow {
        return Err(AppError::NotFound(format!(
            "run {run_id} not found for workflow '{workflow}'"
        )));
    }

    let mut body = json!({
        "success": true,
        "runId": view.run_id,
        "status": view.status,
        "currentStep": view.current_step,
    });
    if let Some(result) = view.result {
        body["result"] = result;
    }
    if let Some(failure) = view.error {
        body["error"] = json!(failure.to_string());
        body["failure"] = json!(failure);
    }
    Ok(Json(body))
}

/// Parse a run id path segment, mapping garbage to 400.
pub(crate) fn parse_run_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest(format!("invalid run id '{raw}'")))
}
