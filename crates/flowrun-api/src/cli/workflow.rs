//! CLI workflow subcommands: list, describe, and run to completion.

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::Value;
use tokio::sync::broadcast::error::TryRecvError;

use flowrun_types::event::RunEvent;
use flowrun_types::shape::Shape;
use flowrun_types::workflow::{RunStatus, WorkflowSummary};

use crate::state::AppState;

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

pub fn list_workflows(state: &AppState, json: bool) -> Result<()> {
    let summaries = state.catalog.summaries();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!();
        println!("  No workflows registered.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("Steps"),
            Cell::new("Branches"),
            Cell::new("Trigger fields"),
        ]);

    for summary in &summaries {
        table.add_row(vec![
            Cell::new(&summary.name),
            Cell::new(summary.steps.len()),
            Cell::new(summary.branches.len()),
            Cell::new(trigger_fields(&summary.trigger_shape)),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  Run one with: {}",
        style("flowrun run <workflow> --input '<json>'").dim()
    );
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Describe
// ---------------------------------------------------------------------------

pub fn describe_workflow(state: &AppState, name: &str, json: bool) -> Result<()> {
    let summary = state.catalog.get(name)?.summary();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &WorkflowSummary) {
    println!();
    println!("  {} {}", style("Workflow").bold(), style(&summary.name).cyan());
    println!("  Trigger: {}", trigger_fields(&summary.trigger_shape));
    println!();

    for (i, step) in summary.steps.iter().enumerate() {
        println!("  {}. {}", i + 1, style(&step.id).bold());
        if !step.description.is_empty() {
            println!("     {}", style(&step.description).dim());
        }
        if !step.requires.is_empty() {
            println!("     reads: {}", step.requires.join(", "));
        }
        for branch in summary.branches.iter().filter(|b| b.after == step.id) {
            println!("     {} when {}", style("↳").yellow(), branch.condition);
            for branch_step in &branch.steps {
                println!("       - {}", branch_step.id);
            }
        }
    }
    println!();
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

pub async fn run_workflow(state: &AppState, name: &str, input: &str, json: bool) -> Result<()> {
    let workflow = state.catalog.get(name)?;
    let trigger = parse_input(input).await?;

    let mut events = state.executor.event_bus().subscribe();
    let run = state
        .executor
        .execute(&workflow, trigger)
        .await
        .with_context(|| format!("Failed to run workflow '{name}'"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run.view())?);
    } else {
        println!();
        println!(
            "  {} Run {} of '{}'",
            style("*").bold(),
            run.id(),
            style(name).cyan()
        );
        loop {
            match events.try_recv() {
                Ok(event) if event.run_id() == run.id() => print_event(&event),
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        println!();
        if let Some(result) = run.result() {
            println!("  {}", style("Result").bold());
            for line in serde_json::to_string_pretty(result)?.lines() {
                println!("  {line}");
            }
            println!();
        }
    }

    if run.status() == RunStatus::Failed {
        match run.error() {
            Some(failure) => bail!("{failure}"),
            None => bail!("run {} failed", run.id()),
        }
    }
    Ok(())
}

fn print_event(event: &RunEvent) {
    match event {
        RunEvent::StepCompleted {
            step_id,
            duration_ms,
            ..
        } => println!("    {} {step_id} ({duration_ms}ms)", style("✓").green()),
        RunEvent::StepFailed {
            step_id,
            error,
            will_retry,
            ..
        } => {
            let note = if *will_retry { " (retrying)" } else { "" };
            println!("    {} {step_id}: {error}{note}", style("✗").red());
        }
        RunEvent::BranchTaken {
            condition, steps, ..
        } => println!(
            "    {} {condition} -> {}",
            style("↳").yellow(),
            steps.join(", ")
        ),
        _ => {}
    }
}

/// Parse `--input`: inline JSON, or `@path` to a JSON file.
async fn parse_input(input: &str) -> Result<Value> {
    let raw = match input.strip_prefix('@') {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read input file '{path}'"))?,
        None => input.to_string(),
    };
    serde_json::from_str(&raw).with_context(|| "Input is not valid JSON")
}

fn trigger_fields(shape: &Shape) -> String {
    let fields = shape.fields();
    if fields.is_empty() {
        return "any".to_string();
    }
    fields
        .iter()
        .map(|f| {
            if f.required {
                f.name.clone()
            } else {
                format!("{}?", f.name)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use flowrun_types::config::FlowrunConfig;
    use flowrun_types::shape::FieldKind;

    use super::*;

    #[test]
    fn trigger_fields_mark_optional() {
        let shape = Shape::object()
            .field("requirements", FieldKind::String, "")
            .optional("context", FieldKind::String, "");
        assert_eq!(trigger_fields(&shape), "requirements, context?");
        assert_eq!(trigger_fields(&Shape::any()), "any");
    }

    #[tokio::test]
    async fn parse_input_reads_inline_and_file() {
        assert_eq!(parse_input(r#"{"a":1}"#).await.unwrap()["a"], 1);

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("input.json");
        tokio::fs::write(&path, r#"{"b":2}"#).await.unwrap();
        let value = parse_input(&format!("@{}", path.display())).await.unwrap();
        assert_eq!(value["b"], 2);
        assert!(parse_input("@/definitely/not/here.json").await.is_err());

        assert!(parse_input("{nope").await.is_err());
    }

    #[tokio::test]
    async fn run_fails_for_unknown_workflow_and_failed_runs() {
        let state = AppState::init(FlowrunConfig::default()).unwrap();
        assert!(run_workflow(&state, "nope", "{}", true).await.is_err());

        let err = run_workflow(&state, "requirements", r#"{"requirements":" "}"#, true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("analyze-requirements"));

        run_workflow(
            &state,
            "requirements",
            r#"{"requirements":"Users can reset their password by email."}"#,
            true,
        )
        .await
        .unwrap();
        assert_eq!(state.notes.drafts().len(), 1);
    }
}
