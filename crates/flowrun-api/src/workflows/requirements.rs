//! `requirements` workflow: turn a free-text product requirement into a
//! technical specification draft.
//!
//! ```text
//! analyze-requirements
//!   └─ when the analysis lists open questions: draft-clarifications
//! generate-technical-spec
//! save-spec
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use flowrun_core::collab::RuntimeHandle;
use flowrun_core::workflow::{
    Context, Executable, StepContext, StepDefinition, StepError, Workflow, WorkflowError,
};
use flowrun_infra::agent::ScriptedAgent;
use flowrun_infra::tool::notes::SAVE_NOTE_TOOL;
use flowrun_types::shape::{FieldKind, Shape};

pub const WORKFLOW_NAME: &str = "requirements";

pub const ANALYZE: &str = "analyze-requirements";
pub const CLARIFY: &str = "draft-clarifications";
pub const GENERATE_SPEC: &str = "generate-technical-spec";
pub const SAVE_SPEC: &str = "save-spec";

pub const ANALYST_AGENT: &str = "requirements-analyst";
pub const SPEC_WRITER_AGENT: &str = "spec-writer";

const ANALYST_PROMPT: &str = "You are a senior business analyst. Restate the request as \
concrete, testable requirements and point out anything that is ambiguous.";

const CLARIFY_PROMPT: &str = "You are a senior business analyst. Write a short, polite \
message to the stakeholder asking the listed clarification questions.";

const SPEC_WRITER_PROMPT: &str = "You are a software architect. Write a one-paragraph \
overview for a technical specification of the request.";

/// Requirements shorter than this many words get a follow-up question.
const MIN_REQUIREMENT_WORDS: usize = 5;

/// Terms that make a requirement untestable, with the question they raise.
const VAGUE_TERMS: &[(&str, &str)] = &[
    ("fast", "What response time or throughput counts as fast?"),
    ("quick", "What response time or throughput counts as fast?"),
    ("quickly", "What response time or throughput counts as fast?"),
    ("scalable", "What load (users, requests per second, data volume) must the system handle?"),
    ("secure", "Which security requirements apply (authentication, encryption, compliance)?"),
    ("easy", "Who are the intended users and which tasks must be easy for them?"),
    ("simple", "Who are the intended users and which tasks must be easy for them?"),
    ("user-friendly", "Who are the intended users and which tasks must be easy for them?"),
    ("intuitive", "Who are the intended users and which tasks must be easy for them?"),
    ("flexible", "Which kinds of change must the design accommodate?"),
    ("robust", "Which failure modes must the system tolerate, and how should it recover?"),
    ("reliable", "What availability target applies?"),
    ("etc", "What else is covered by 'etc.'? Please list the remaining items."),
    ("modern", "Which concrete qualities does 'modern' refer to?"),
];

/// Keyword fragments mapped to the technical area they imply.
const TECHNICAL_AREAS: &[(&[&str], &str)] = &[
    (&["login", "log in", "sign in", "auth", "password"], "Authentication and session management"),
    (&["store", "save", "persist", "database", "history"], "Persistent storage with a versioned schema"),
    (&["api", "endpoint", "integrat", "webhook"], "HTTP API contract and integration tests"),
    (&["email", "notify", "notification", "message"], "Notification delivery with retry"),
    (&["report", "dashboard", "chart", "export"], "Reporting queries and export formats"),
    (&["upload", "file", "image", "pdf"], "File handling with size limits and content validation"),
    (&["search", "filter", "sort"], "Indexed queries for search and filtering"),
    (&["admin", "role", "permission"], "Role-based access control"),
];

// ---------------------------------------------------------------------------
// Step outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalRequirement {
    pub id: String,
    pub description: String,
    pub technical_details: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementsAnalysis {
    pub original_requirement: String,
    pub technical_requirements: Vec<TechnicalRequirement>,
    pub clarification_questions: Vec<String>,
    pub agent_response: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clarifications {
    pub questions: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalSpec {
    pub title: String,
    pub specification: String,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedSpec {
    pub draft_id: Uuid,
    pub title: String,
    pub specification: String,
    pub format: String,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DraftReceipt {
    draft_id: Uuid,
    title: String,
    saved_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Step bodies
// ---------------------------------------------------------------------------

struct AnalyzeRequirements;

impl Executable for AnalyzeRequirements {
    type Output = RequirementsAnalysis;

    async fn execute(
        &self,
        ctx: StepContext,
        rt: RuntimeHandle,
    ) -> Result<RequirementsAnalysis, StepError> {
        let requirement: String = ctx.trigger_field("requirements")?;
        let background: Option<String> = ctx.trigger_field("context")?;

        let requirement = requirement.trim();
        if requirement.is_empty() {
            return Err(StepError::failed("requirements must not be empty"));
        }

        let prompt = match background.as_deref().map(str::trim) {
            Some(background) if !background.is_empty() => {
                format!("{requirement}\n\nBackground: {background}")
            }
            _ => requirement.to_string(),
        };
        let agent_response = rt.agent(ANALYST_AGENT)?.ask(ANALYST_PROMPT, &prompt).await?;

        Ok(RequirementsAnalysis {
            original_requirement: requirement.to_string(),
            technical_requirements: split_requirements(requirement),
            clarification_questions: clarification_questions(requirement),
            agent_response,
        })
    }
}

struct DraftClarifications;

impl Executable for DraftClarifications {
    type Output = Clarifications;

    async fn execute(&self, ctx: StepContext, rt: RuntimeHandle) -> Result<Clarifications, StepError> {
        let analysis: RequirementsAnalysis = ctx.get(ANALYZE)?;

        let mut prompt = format!(
            "Requirement: {}\n\nClarification questions:\n",
            analysis.original_requirement
        );
        for (i, question) in analysis.clarification_questions.iter().enumerate() {
            prompt.push_str(&format!("{}. {question}\n", i + 1));
        }
        let message = rt.agent(ANALYST_AGENT)?.ask(CLARIFY_PROMPT, &prompt).await?;

        Ok(Clarifications {
            questions: analysis.clarification_questions,
            message,
        })
    }
}

struct GenerateTechnicalSpec;

impl Executable for GenerateTechnicalSpec {
    type Output = TechnicalSpec;

    async fn execute(&self, ctx: StepContext, rt: RuntimeHandle) -> Result<TechnicalSpec, StepError> {
        let analysis: RequirementsAnalysis = ctx.get(ANALYZE)?;
        let clarifications: Option<Clarifications> = ctx.get_optional(CLARIFY)?;

        let overview = rt
            .agent(SPEC_WRITER_AGENT)?
            .ask(SPEC_WRITER_PROMPT, &analysis.original_requirement)
            .await?;

        let title = spec_title(&analysis.original_requirement);
        let specification = render_spec(&title, &overview, &analysis, clarifications.as_ref());
        tracing::debug!(
            run_id = %ctx.run_id(),
            requirements = analysis.technical_requirements.len(),
            open_questions = clarifications.as_ref().map_or(0, |c| c.questions.len()),
            "technical spec rendered"
        );

        Ok(TechnicalSpec {
            title,
            specification,
            format: "markdown".to_string(),
        })
    }
}

struct SaveSpec;

impl Executable for SaveSpec {
    type Output = SavedSpec;

    async fn execute(&self, ctx: StepContext, rt: RuntimeHandle) -> Result<SavedSpec, StepError> {
        let spec: TechnicalSpec = ctx.get(GENERATE_SPEC)?;

        let receipt: DraftReceipt = rt
            .tool(SAVE_NOTE_TOOL)?
            .call(&json!({
                "title": spec.title,
                "content": spec.specification,
                "tags": ["specification", WORKFLOW_NAME],
            }))
            .await?;

        Ok(SavedSpec {
            draft_id: receipt.draft_id,
            title: receipt.title,
            specification: spec.specification,
            format: spec.format,
            saved_at: receipt.saved_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// Build and commit the `requirements` workflow.
pub fn build() -> Result<Workflow, WorkflowError> {
    let trigger = Shape::object()
        .field("requirements", FieldKind::String, "Free-text product requirement")
        .optional("context", FieldKind::String, "Background about the product or team");

    let mut workflow = Workflow::new(WORKFLOW_NAME, trigger);
    workflow
        .step(
            StepDefinition::new(ANALYZE, AnalyzeRequirements)
                .describe("Break the request into technical requirements and flag ambiguities")
                .input(Shape::object().field(
                    "requirements",
                    FieldKind::String,
                    "Free-text product requirement",
                )),
        )?
        .when("analysis lists clarification questions", has_open_questions, |branch| {
            branch.step(
                StepDefinition::new(CLARIFY, DraftClarifications)
                    .describe("Draft a message asking the stakeholder the open questions")
                    .requires([ANALYZE])
                    .input(Shape::object().field(
                        "clarificationQuestions",
                        FieldKind::Array,
                        "Questions raised by the analysis",
                    )),
            )
        })?
        .step(
            StepDefinition::new(GENERATE_SPEC, GenerateTechnicalSpec)
                .describe("Render a markdown technical specification")
                .requires([ANALYZE, CLARIFY])
                .input(
                    Shape::object()
                        .field("originalRequirement", FieldKind::String, "Request as analyzed")
                        .field(
                            "technicalRequirements",
                            FieldKind::Array,
                            "Numbered technical requirements",
                        ),
                ),
        )?
        .step(
            StepDefinition::new(SAVE_SPEC, SaveSpec)
                .describe("Save the specification as a note draft")
                .requires([GENERATE_SPEC])
                .input(Shape::object().field(
                    "specification",
                    FieldKind::String,
                    "Markdown specification",
                )),
        )?;
    workflow.commit()?;
    Ok(workflow)
}

pub fn analyst_agent() -> ScriptedAgent {
    ScriptedAgent::new(ANALYST_AGENT)
        .on(
            "clarification questions",
            "Thanks for the request. Before we start on the design we need a few details:\n\n{input}",
        )
        .otherwise("Analysis of the request: {input}")
}

pub fn spec_writer_agent() -> ScriptedAgent {
    ScriptedAgent::new(SPEC_WRITER_AGENT).otherwise(
        "This document describes a system that satisfies the following request: {input} \
         Each requirement below is numbered so that design, implementation and tests can \
         refer to it.",
    )
}

fn has_open_questions(context: &Context) -> bool {
    context
        .get(ANALYZE)
        .and_then(|analysis| analysis.get("clarificationQuestions"))
        .and_then(Value::as_array)
        .is_some_and(|questions| !questions.is_empty())
}

/// One requirement per sentence or line.
pub fn split_requirements(requirement: &str) -> Vec<TechnicalRequirement> {
    requirement
        .split(['.', '!', '?', ';', '\n'])
        .map(str::trim)
        .map(|s| s.trim_start_matches(['-', '*', ' ']))
        .filter(|s| s.split_whitespace().count() > 1)
        .enumerate()
        .map(|(i, sentence)| TechnicalRequirement {
            id: format!("TR-{}", i + 1),
            description: sentence.to_string(),
            technical_details: technical_details(sentence),
        })
        .collect()
}

fn technical_details(sentence: &str) -> String {
    let lowered = sentence.to_lowercase();
    let areas: Vec<&str> = TECHNICAL_AREAS
        .iter()
        .filter(|(keywords, _)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(_, area)| *area)
        .collect();
    if areas.is_empty() {
        "Behaviour to be refined during design".to_string()
    } else {
        areas.join("; ")
    }
}

/// Questions raised by vague wording, in order of first appearance.
pub fn clarification_questions(requirement: &str) -> Vec<String> {
    let mut questions: Vec<String> = Vec::new();
    let lowered = requirement.to_lowercase();
    let words = lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .filter(|w| !w.is_empty());

    for word in words {
        if let Some((_, question)) = VAGUE_TERMS.iter().find(|(term, _)| *term == word) {
            if !questions.iter().any(|q| q == question) {
                questions.push(question.to_string());
            }
        }
    }

    if requirement.split_whitespace().count() < MIN_REQUIREMENT_WORDS {
        questions.push("Can you describe the expected behaviour in more detail?".to_string());
    }
    questions
}

fn spec_title(requirement: &str) -> String {
    const MAX_TITLE_CHARS: usize = 60;
    let first = requirement
        .split(['.', '!', '?', '\n'])
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(requirement);
    let mut title: String = first.chars().take(MAX_TITLE_CHARS).collect();
    if first.chars().count() > MAX_TITLE_CHARS {
        title.push_str("...");
    }
    format!("Technical specification: {title}")
}

fn render_spec(
    title: &str,
    overview: &str,
    analysis: &RequirementsAnalysis,
    clarifications: Option<&Clarifications>,
) -> String {
    let mut doc = format!("# {title}\n\n## Overview\n\n{overview}\n\n## Requirements\n\n");
    for req in &analysis.technical_requirements {
        doc.push_str(&format!(
            "- **{}**: {}\n  - {}\n",
            req.id, req.description, req.technical_details
        ));
    }

    doc.push_str("\n## Open questions\n\n");
    match clarifications {
        Some(c) if !c.questions.is_empty() => {
            for (i, question) in c.questions.iter().enumerate() {
                doc.push_str(&format!("{}. {question}\n", i + 1));
            }
        }
        _ => doc.push_str("None.\n"),
    }
    doc
}
