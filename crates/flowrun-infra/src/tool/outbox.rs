//! Email outbox tool.
//!
//! `OutboxTool` accepts a fully composed email and appends it to an
//! in-memory outbox shared by every clone of the tool. The outbox holds at
//! most `capacity` emails and drops the oldest first.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use flowrun_core::collab::Tool;
use flowrun_types::config::ToolsConfig;
use flowrun_types::shape::{FieldKind, Shape};
use flowrun_types::tool::ToolError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Tool id the outbox is registered under.
pub const SEND_EMAIL_TOOL: &str = "send-email";

/// An email accepted by the outbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentEmail {
    #[serde(default)]
    pub message_id: Option<Uuid>,
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bcc: Option<String>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct OutboxTool {
    sent: Arc<RwLock<VecDeque<SentEmail>>>,
    capacity: usize,
}

impl OutboxTool {
    pub fn new() -> Self {
        Self::with_capacity(ToolsConfig::default().max_sent_emails)
    }

    /// Keep at most `capacity` (at least 1) emails.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sent: Arc::new(RwLock::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    /// Retained emails, oldest first.
    pub async fn sent(&self) -> Vec<SentEmail> {
        self.sent.read().await.iter().cloned().collect()
    }
}

impl Default for OutboxTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for OutboxTool {
    fn id(&self) -> &str {
        SEND_EMAIL_TOOL
    }

    fn description(&self) -> &str {
        "Send an email"
    }

    fn input_shape(&self) -> Shape {
        Shape::object()
            .field("to", FieldKind::String, "Recipient email address")
            .field("from", FieldKind::String, "Sender email address")
            .field("subject", FieldKind::String, "Email subject")
            .field("body", FieldKind::String, "Email body content")
            .optional("cc", FieldKind::String, "CC recipients")
            .optional("bcc", FieldKind::String, "BCC recipients")
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let mut email: SentEmail = serde_json::from_value(input)
            .map_err(|e| ToolError::Failed(format!("malformed email: {e}")))?;

        for (field, address) in [("to", &email.to), ("from", &email.from)] {
            if !looks_like_address(address) {
                return Err(ToolError::Failed(format!(
                    "'{address}' is not a valid '{field}' address"
                )));
            }
        }

        let message_id = Uuid::now_v7();
        let sent_at = Utc::now();
        email.message_id = Some(message_id);
        email.sent_at = Some(sent_at);

        tracing::info!(
            message_id = %message_id,
            to = %email.to,
            subject = %email.subject,
            "email accepted by outbox"
        );
        let mut sent = self.sent.write().await;
        sent.push_back(email);
        while sent.len() > self.capacity {
            if let Some(dropped) = sent.pop_front() {
                tracing::debug!(message_id = ?dropped.message_id, "outbox full, dropped oldest email");
            }
        }
        drop(sent);

        Ok(json!({
            "success": true,
            "message": "Email sent successfully",
            "messageId": message_id,
            "timestamp": sent_at.to_rfc3339(),
        }))
    }
}

fn looks_like_address(address: &str) -> bool {
    let Some((local, domain)) = address.trim().split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}
