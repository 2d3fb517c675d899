//! Read-only views of what the in-process tools have recorded.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::state::AppState;

/// GET /api/outbox - Emails accepted by the outbox, oldest first.
pub async fn list_sent_emails(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "success": true,
        "emails": state.outbox.sent().await,
    }))
}

/// GET /api/drafts - Saved note drafts, newest first.
pub async fn list_drafts(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "success": true,
        "drafts": state.notes.drafts(),
    }))
}
