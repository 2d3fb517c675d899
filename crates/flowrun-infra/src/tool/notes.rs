//! Note draft store tool.
//!
//! `NoteStoreTool` saves titled markdown drafts in memory and returns the
//! generated draft id. Clones share the same store, which keeps at most
//! `capacity` drafts and drops the oldest first.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use flowrun_core::collab::Tool;
use flowrun_types::config::ToolsConfig;
use flowrun_types::shape::{FieldKind, Shape};
use flowrun_types::tool::ToolError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

/// Tool id the note store is registered under.
pub const SAVE_NOTE_TOOL: &str = "save-note-draft";

/// Largest accepted draft body.
const MAX_CONTENT_BYTES: usize = 512 * 1024;

/// A saved draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteDraft {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub saved_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct SaveRequest {
    title: String,
    content: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NoteStoreTool {
    drafts: Arc<DashMap<Uuid, NoteDraft>>,
    /// Draft ids in the order they were saved.
    order: Arc<Mutex<VecDeque<Uuid>>>,
    capacity: usize,
}

impl NoteStoreTool {
    pub fn new() -> Self {
        Self::with_capacity(ToolsConfig::default().max_drafts)
    }

    /// Keep at most `capacity` (at least 1) drafts.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            drafts: Arc::new(DashMap::new()),
            order: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<NoteDraft> {
        self.drafts.get(id).map(|entry| entry.value().clone())
    }

    /// All drafts, most recently saved first.
    pub fn drafts(&self) -> Vec<NoteDraft> {
        let mut drafts: Vec<NoteDraft> = self.drafts.iter().map(|e| e.value().clone()).collect();
        drafts.sort_by(|a, b| b.saved_at.cmp(&a.saved_at).then(b.id.cmp(&a.id)));
        drafts
    }
}

impl Tool for NoteStoreTool {
    fn id(&self) -> &str {
        SAVE_NOTE_TOOL
    }

    fn description(&self) -> &str {
        "Save a markdown document as a draft"
    }

    fn input_shape(&self) -> Shape {
        Shape::object()
            .field("title", FieldKind::String, "Draft title")
            .field("content", FieldKind::String, "Markdown body")
            .optional("tags", FieldKind::Array, "Free-form tags")
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let request: SaveRequest = serde_json::from_value(input)
            .map_err(|e| ToolError::Failed(format!("malformed draft: {e}")))?;

        let title = request.title.trim();
        if title.is_empty() {
            return Err(ToolError::Failed("draft title must not be empty".to_string()));
        }
        if request.content.len() > MAX_CONTENT_BYTES {
            return Err(ToolError::Failed(format!(
                "draft is {} bytes, limit is {MAX_CONTENT_BYTES}",
                request.content.len()
            )));
        }

        let draft = NoteDraft {
            id: Uuid::now_v7(),
            title: title.to_string(),
            content: request.content,
            tags: request.tags,
            saved_at: Utc::now(),
        };
        tracing::info!(draft_id = %draft.id, title = %draft.title, "draft saved");

        let receipt = json!({
            "draftId": draft.id,
            "title": draft.title,
            "status": "draft",
            "savedAt": draft.saved_at.to_rfc3339(),
        });
        let draft_id = draft.id;
        self.drafts.insert(draft_id, draft);

        let mut order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        order.push_back(draft_id);
        while order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                self.drafts.remove(&oldest);
                tracing::debug!(draft_id = %oldest, "draft store full, dropped oldest draft");
            }
        }
        Ok(receipt)
    }
}

impl Default for NoteStoreTool {
    fn default() -> Self {
        Self::new()
    }
}
