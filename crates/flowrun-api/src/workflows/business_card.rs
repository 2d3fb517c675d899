//! `business-card` workflow: send a thank-you email to someone met in person.
//!
//! `extract-contact` -> `generate-thank-you-email` -> `send-thank-you-email`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use flowrun_core::collab::RuntimeHandle;
use flowrun_core::workflow::{Executable, StepContext, StepDefinition, StepError, Workflow, WorkflowError};
use flowrun_infra::agent::ScriptedAgent;
use flowrun_infra::tool::outbox::SEND_EMAIL_TOOL;
use flowrun_types::shape::{FieldKind, Shape};

pub const WORKFLOW_NAME: &str = "business-card";

pub const EXTRACT_CONTACT: &str = "extract-contact";
pub const GENERATE_EMAIL: &str = "generate-thank-you-email";
pub const SEND_EMAIL: &str = "send-thank-you-email";

pub const EMAIL_WRITER_AGENT: &str = "email-writer";

const EMAIL_WRITER_PROMPT: &str = "You write short, warm and professional follow-up emails. \
Write only the body paragraph, without greeting or signature.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CardTrigger {
    sender_name: String,
    sender_company: String,
    sender_email: String,
    recipient_name: String,
    recipient_company: String,
    recipient_email: String,
    recipient_position: Option<String>,
    meeting_context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactCard {
    pub recipient_name: String,
    pub recipient_first_name: String,
    pub recipient_company: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_position: Option<String>,
    pub recipient_email: String,
    pub sender_name: String,
    pub sender_company: String,
    pub sender_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThankYouEmail {
    pub subject: String,
    pub body: String,
    pub to: String,
    pub from: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReceipt {
    pub success: bool,
    pub message: String,
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Step bodies
// ---------------------------------------------------------------------------

struct ExtractContact;

impl Executable for ExtractContact {
    type Output = ContactCard;

    async fn execute(&self, ctx: StepContext, _rt: RuntimeHandle) -> Result<ContactCard, StepError> {
        let card: CardTrigger = ctx.trigger()?;

        let recipient_name = collapse_whitespace(&card.recipient_name);
        let recipient_first_name = recipient_name
            .split_whitespace()
            .next()
            .map(str::to_string)
            .ok_or_else(|| StepError::failed("recipientName must not be blank"))?;

        Ok(ContactCard {
            recipient_first_name,
            recipient_name,
            recipient_company: collapse_whitespace(&card.recipient_company),
            recipient_position: non_blank(card.recipient_position),
            recipient_email: normalize_email("recipientEmail", &card.recipient_email)?,
            sender_name: collapse_whitespace(&card.sender_name),
            sender_company: collapse_whitespace(&card.sender_company),
            sender_email: normalize_email("senderEmail", &card.sender_email)?,
            meeting_context: non_blank(card.meeting_context),
        })
    }
}

struct GenerateThankYouEmail;

impl Executable for GenerateThankYouEmail {
    type Output = ThankYouEmail;

    async fn execute(&self, ctx: StepContext, rt: RuntimeHandle) -> Result<ThankYouEmail, StepError> {
        let contact: ContactCard = ctx.get(EXTRACT_CONTACT)?;

        let mut prompt = format!(
            "Thank {} ({}) at {} for the meeting.",
            contact.recipient_name,
            contact
                .recipient_position
                .as_deref()
                .unwrap_or("no title given"),
            contact.recipient_company,
        );
        if let Some(meeting) = &contact.meeting_context {
            prompt.push_str(&format!(" We talked about {meeting}."));
        }
        let paragraph = rt.agent(EMAIL_WRITER_AGENT)?.ask(EMAIL_WRITER_PROMPT, &prompt).await?;

        let body = format!(
            "Dear {},\n\n{}\n\nBest regards,\n{}\n{}",
            contact.recipient_first_name,
            paragraph.trim(),
            contact.sender_name,
            contact.sender_company,
        );

        Ok(ThankYouEmail {
            subject: format!(
                "Great meeting you, {} | {}",
                contact.recipient_first_name, contact.sender_company
            ),
            body,
            to: contact.recipient_email,
            from: contact.sender_email,
        })
    }
}

struct SendThankYouEmail;

impl Executable for SendThankYouEmail {
    type Output = DeliveryReceipt;

    async fn execute(&self, ctx: StepContext, rt: RuntimeHandle) -> Result<DeliveryReceipt, StepError> {
        let email: ThankYouEmail = ctx.get(GENERATE_EMAIL)?;
        let receipt: DeliveryReceipt = rt.tool(SEND_EMAIL_TOOL)?.call(&email).await?;
        if !receipt.success {
            return Err(StepError::failed(format!("email was not sent: {}", receipt.message)));
        }
        tracing::info!(run_id = %ctx.run_id(), message_id = %receipt.message_id, "thank-you email sent");
        Ok(receipt)
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// Build and commit the `business-card` workflow.
pub fn build() -> Result<Workflow, WorkflowError> {
    let trigger = Shape::object()
        .field("senderName", FieldKind::String, "Your full name")
        .field("senderCompany", FieldKind::String, "Your company")
        .field("senderEmail", FieldKind::String, "Your email address")
        .field("recipientName", FieldKind::String, "Name on the business card")
        .field("recipientCompany", FieldKind::String, "Company on the business card")
        .field("recipientEmail", FieldKind::String, "Email on the business card")
        .optional("recipientPosition", FieldKind::String, "Job title on the business card")
        .optional("meetingContext", FieldKind::String, "What you talked about");

    let mut workflow = Workflow::new(WORKFLOW_NAME, trigger);
    workflow
        .step(
            StepDefinition::new(EXTRACT_CONTACT, ExtractContact)
                .describe("Normalize the business card details"),
        )?
        .step(
            StepDefinition::new(GENERATE_EMAIL, GenerateThankYouEmail)
                .describe("Write a personalised thank-you email")
                .requires([EXTRACT_CONTACT])
                .input(
                    Shape::object()
                        .field("recipientFirstName", FieldKind::String, "Greeting name")
                        .field("recipientEmail", FieldKind::String, "Recipient address")
                        .field("senderEmail", FieldKind::String, "Sender address"),
                ),
        )?
        .step(
            StepDefinition::new(SEND_EMAIL, SendThankYouEmail)
                .describe("Send the email through the outbox")
                .requires([GENERATE_EMAIL])
                .input(
                    Shape::object()
                        .field("to", FieldKind::String, "Recipient address")
                        .field("from", FieldKind::String, "Sender address")
                        .field("subject", FieldKind::String, "Subject line")
                        .field("body", FieldKind::String, "Email body"),
                ),
        )?;
    workflow.commit()?;
    Ok(workflow)
}

pub fn email_writer_agent() -> ScriptedAgent {
    ScriptedAgent::new(EMAIL_WRITER_AGENT).otherwise(
        "It was a pleasure to meet you, and thank you for taking the time to talk. {input} \
         I would be glad to continue the conversation whenever it suits you.",
    )
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| collapse_whitespace(&v))
        .filter(|v| !v.is_empty())
}

fn normalize_email(field: &str, value: &str) -> Result<String, StepError> {
    let email = value.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(StepError::failed(format!(
            "{field} '{}' is not a valid email address",
            value.trim()
        ))),
    }
}
