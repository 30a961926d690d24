//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - run: Process a single turn
//! - chat: Interactive loop with session control commands
//! - show: Print a session's checkpointed state
//! - templates: List loaded clause files
//! - doctor: Validate configuration and check the completion provider

use anyhow::{Context, Result};
use sdk::{EngineError, LexisErrorExt};
use serde_json::json;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::conductor::{CheckpointStore, Orchestrator, TurnOutcome};
use crate::config::Config;
use crate::db::Database;
use crate::llm::build_provider;
use crate::session::{new_session_id, SessionCommand, SessionManager, HELP_TEXT};
use crate::state::Event;
use crate::tools::ClauseLibrary;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Process one turn and print the reply or the pipeline summary
pub async fn handle_run(
    input: String,
    session: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config).await?;
    let session_id = session.unwrap_or_else(new_session_id);

    match orchestrator.process_turn(&session_id, &input).await {
        Ok(outcome) => print_outcome(&outcome, format),
        Err(e) => {
            print_error(&e, format)?;
            Err(e.into())
        }
    }
}

/// Interactive loop: slash commands switch sessions, anything else is a turn.
///
/// A failed turn is reported and the loop continues.
pub async fn handle_chat(
    session: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config).await?;
    let mut sessions = SessionManager::new(session);

    if matches!(format, OutputFormat::Text) {
        println!("Lexis session {}", sessions.current());
        println!("{}", HELP_TEXT);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if matches!(format, OutputFormat::Text) {
            print!("> ");
            std::io::stdout().flush().ok();
        }

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = SessionCommand::parse(line) {
            match sessions.apply(&command) {
                Some(message) => println!("{}", message),
                None => break,
            }
            continue;
        }

        match orchestrator.process_turn(sessions.current(), line).await {
            Ok(outcome) => print_outcome(&outcome, format)?,
            Err(e) => print_error(&e, format)?,
        }
    }

    Ok(())
}

/// Print the checkpointed state of a session
pub async fn handle_show(session: String, config: &Config, format: OutputFormat) -> Result<()> {
    let store = CheckpointStore::new(config.checkpoint_dir());
    if !store.exists(&session) {
        match format {
            OutputFormat::Text => println!("No checkpoint for session {}", session),
            OutputFormat::Json => println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "session_id": session, "found": false }))?
            ),
        }
        return Ok(());
    }

    let state = store.load(&session);
    match format {
        OutputFormat::Text => {
            println!("Session:    {}", state.session_id);
            println!(
                "Category:   {}",
                state
                    .task_category
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
            println!("Events:     {}", state.messages.len());
            if let Some(at) = state.last_activity() {
                println!("Updated:    {}", at.to_rfc3339());
            }
            println!();

            println!("Versions:");
            for version in &state.versions {
                println!(
                    "  v{:<3} {:<12} {}",
                    version.version_number,
                    version.kind,
                    version.timestamp.to_rfc3339()
                );
            }
            println!();

            println!("Validation:");
            for (key, value) in &state.validation_report {
                if !key.ends_with("_details") {
                    println!("  {:<18} {}", key, value);
                }
            }
            println!();

            println!("Recent turns:");
            for event in state.messages.iter().rev().take(6).rev() {
                match event {
                    Event::User { content, .. } => println!("  user: {}", content),
                    Event::Assistant { content, .. } => println!("  assistant: {}", content),
                    Event::Stage(stage) => println!("  [{}/{}]", stage.stage, stage.step),
                }
            }

            if let Some(draft) = &state.draft_content {
                println!();
                println!("{}", draft);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&state)?),
    }
    Ok(())
}

/// List the clause files the template search ranks over
pub async fn handle_templates(config: &Config, format: OutputFormat) -> Result<()> {
    let library = ClauseLibrary::load(&config.templates.clause_dir)?;

    match format {
        OutputFormat::Text => {
            println!(
                "Clause library: {} ({} clauses)",
                config.templates.clause_dir.display(),
                library.len()
            );
            for clause in library.clauses() {
                let preview: String = clause.text.chars().take(60).collect();
                println!("  {:<28} {}", clause.source, preview.replace('\n', " "));
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "dir": config.templates.clause_dir,
                "clauses": library.clauses().iter().map(|c| c.source.clone()).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Validate configuration, directories, memory database and provider health
pub async fn handle_doctor(config: &Config, format: OutputFormat) -> Result<()> {
    let mut issues = Vec::new();
    let mut checks: Vec<(&str, String)> = Vec::new();

    // Config is already validated when loaded
    checks.push(("Configuration", "Valid".to_string()));

    for (name, dir) in [
        ("Data directory", &config.core.data_dir),
        ("Export directory", &config.core.export_dir),
        ("Clause directory", &config.templates.clause_dir),
    ] {
        if dir.exists() {
            checks.push((name, "Exists".to_string()));
        } else {
            checks.push((name, "Missing".to_string()));
            issues.push(format!("{} does not exist: {}", name, dir.display()));
        }
    }

    match Database::new(&config.memory_db_path()).await {
        Ok(db) => {
            checks.push(("Memory database", "OK".to_string()));
            db.close().await.ok();
        }
        Err(e) => {
            checks.push(("Memory database", "Failed".to_string()));
            issues.push(format!("Cannot open memory database: {:#}", e));
        }
    }

    match ClauseLibrary::load(&config.templates.clause_dir) {
        Ok(library) if library.is_empty() => {
            checks.push(("Clause templates", "None loaded".to_string()));
        }
        Ok(library) => checks.push(("Clause templates", format!("{} loaded", library.len()))),
        Err(e) => {
            checks.push(("Clause templates", "Unreadable".to_string()));
            issues.push(format!("Cannot load clause templates: {:#}", e));
        }
    }

    match build_provider(&config.llm) {
        Ok(provider) => {
            if provider.check_health().await {
                checks.push(("LLM provider", format!("{} available", provider.name())));
            } else {
                checks.push(("LLM provider", format!("{} unavailable", provider.name())));
                issues.push(format!(
                    "{} is not reachable. Check that it is running and configured",
                    provider.name()
                ));
            }
        }
        Err(e) => {
            checks.push(("LLM provider", "Not configured".to_string()));
            issues.push(e.user_hint().to_string());
        }
    }

    match format {
        OutputFormat::Text => {
            println!("Lexis System Diagnostics");
            println!("========================");
            println!();

            println!("System Checks:");
            for (check, status) in &checks {
                println!("  {:<25} {}", format!("{}:", check), status);
            }

            println!();

            if issues.is_empty() {
                println!("✓ All checks passed!");
            } else {
                println!("⚠ Issues found:");
                println!();
                for (i, issue) in issues.iter().enumerate() {
                    println!("  {}. {}", i + 1, issue);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "checks": checks.iter().map(|(name, status)| {
                    json!({
                        "name": name,
                        "status": status
                    })
                }).collect::<Vec<_>>(),
                "issues": issues,
                "healthy": issues.is_empty()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn print_outcome(outcome: &TurnOutcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            if let Some(reply) = &outcome.reply {
                println!("{}", reply);
            }
            if let Some(summary) = &outcome.summary {
                if let Some(draft) = &outcome.state.draft_content {
                    println!("{}", draft);
                    println!();
                }
                print!("{}", summary.render());
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "status": "completed",
                "session_id": outcome.state.session_id,
                "category": outcome.state.task_category,
                "reply": outcome.reply,
                "summary": outcome.summary,
                "draft": outcome.state.draft_content,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn print_error(error: &EngineError, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("✗ Turn failed: {}", error);
            println!("  {}", error.user_hint());
        }
        OutputFormat::Json => {
            let output = json!({
                "status": "failed",
                "error": error.to_string(),
                "hint": error.user_hint(),
                "recoverable": error.is_recoverable(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}
