//! Research workflow subcommands.
//!
//! `start`, `review` and `assess` drive the engine in the foreground; pressing Ctrl+C
//! cancels the workflow and waits for it to settle before exiting.

use std::future::Future;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use scholarflow_core::service::research::ResultsView;
use scholarflow_core::workflow::engine::{CancelOutcome, EngineError};
use scholarflow_types::research::{
    DirectionAssessment, Evaluation, FinalReport, ResearchDirection, ScoredPaper,
};
use scholarflow_types::state::{DIRECTIONS_EVALUATION_REQUIRED, InputPrompt, WorkflowOutcome};
use scholarflow_types::status::WorkflowStatus;

use super::{Output, StartArgs};
use crate::state::AppState;

fn parse_workflow_id(raw: &str) -> Result<Uuid> {
    raw.trim()
        .parse()
        .with_context(|| format!("Invalid workflow ID: '{raw}'"))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run `work` to completion, cancelling the workflow on Ctrl+C.
async fn run_interruptibly<F>(state: &AppState, workflow_id: Uuid, work: F) -> Result<WorkflowStatus>
where
    F: Future<Output = Result<WorkflowStatus, EngineError>>,
{
    tokio::pin!(work);
    tokio::select! {
        biased;
        result = &mut work => Ok(result?),
        Ok(()) = tokio::signal::ctrl_c() => {
            eprintln!(
                "  {} Interrupted, cancelling workflow {workflow_id}...",
                style("!").yellow().bold()
            );
            tracing::info!(workflow_id = %workflow_id, "cancel requested from terminal");
            state.research.cancel(workflow_id).await?;
            Ok(work.await?)
        }
    }
}

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

pub async fn handle_start(state: &AppState, args: StartArgs, out: Output) -> Result<()> {
    if args.query.trim().is_empty() {
        bail!("Research query must not be empty");
    }

    let mut request = state.research.request(args.query);
    request.general_area = args.area;
    request.session_id = args.session;
    let config = &mut request.config;
    config.hitl_shortlist_review_active |= args.hitl;
    config.hitl_evaluation_active |= args.hitl_eval;
    config.cross_check_analysis |= args.cross_check;
    if let Some(threshold) = args.threshold {
        if !(0.0..=1.0).contains(&threshold) {
            bail!("--threshold must be between 0.0 and 1.0 (got {threshold})");
        }
        config.relevance_threshold = threshold;
    }
    if let Some(max_results) = args.max_results {
        config.max_results_per_query = max_results;
    }
    if let Some(timeout) = args.timeout {
        config.collaborator_timeout_secs = timeout;
    }

    let created = state.research.create(request).await?;
    let workflow_id = created.workflow_id;
    if !out.json && !out.quiet {
        println!();
        println!(
            "  {} Started workflow {}",
            style("*").green().bold(),
            style(workflow_id).cyan()
        );
    }

    let status = run_interruptibly(state, workflow_id, state.research.run(workflow_id)).await?;
    report_status(&status, out)
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

pub async fn handle_status(state: &AppState, raw_id: &str, out: Output) -> Result<()> {
    let workflow_id = parse_workflow_id(raw_id)?;
    let status = state.research.get_status(workflow_id).await?;
    report_status(&status, out)
}

fn report_status(status: &WorkflowStatus, out: Output) -> Result<()> {
    if out.json {
        return print_json(status);
    }
    if out.quiet {
        return Ok(());
    }

    println!();
    println!("  Workflow:   {}", style(status.workflow_id).cyan());
    println!("  Query:      {}", status.research_query);
    println!("  Outcome:    {}", styled_outcome(status.outcome));
    if let Some(node) = status.current_node {
        println!("  Node:       {node}");
    }
    println!("  Iterations: {}", status.iteration_count);
    println!("  Messages:   {}", status.message_count);

    let counts = &status.counts;
    let stages = [
        ("queries", counts.formulated_queries),
        ("results", counts.search_results),
        ("scored", counts.scored_results),
        ("shortlist", counts.initial_shortlist),
        ("confirmed", counts.confirmed_shortlist),
        ("ingested", counts.ingested),
        ("gaps", counts.identified_gaps),
        ("directions", counts.directions),
    ];
    let progress: Vec<String> = stages
        .iter()
        .filter_map(|(name, count)| count.map(|n| format!("{name}={n}")))
        .collect();
    if !progress.is_empty() {
        println!("  Progress:   {}", progress.join(" "));
    }

    if let Some(message) = &status.error_message {
        let source = status.error_source_node.as_deref().unwrap_or("unknown");
        println!(
            "  {} {} (from {})",
            style("Error:").red().bold(),
            message,
            style(source).dim()
        );
    }

    if let Some(prompt) = status.input_prompt.as_ref().filter(|_| status.is_waiting_for_input) {
        print_prompt(status.workflow_id, prompt);
    }
    println!();
    Ok(())
}

fn print_prompt(workflow_id: Uuid, prompt: &InputPrompt) {
    println!();
    println!("  {}", style(&prompt.message).yellow());
    println!();
    if prompt.interrupt_type == DIRECTIONS_EVALUATION_REQUIRED {
        if let Some(summary) = &prompt.literature_summary {
            println!("  {}", summary.overall_summary);
            println!();
        }
        println!("{}", directions_table(&prompt.directions));
        println!();
        println!(
            "  Evaluate with: {}",
            style(format!(
                "sflow assess {workflow_id} --score <id>=<0..1>[:critique] | --accept"
            ))
            .dim()
        );
    } else {
        println!("{}", candidates_table(&prompt.candidates));
        println!();
        println!(
            "  Confirm with: {}",
            style(format!("sflow review {workflow_id} --paper <id> | --all | --none")).dim()
        );
    }
}

fn directions_table(directions: &[ResearchDirection]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Direction").fg(Color::Cyan),
            Cell::new("Title"),
            Cell::new("Description"),
        ]);

    for d in directions {
        table.add_row(vec![
            Cell::new(&d.direction_id),
            Cell::new(&d.title),
            Cell::new(&d.description),
        ]);
    }
    table
}

fn candidates_table(candidates: &[ScoredPaper]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Paper").fg(Color::Cyan),
            Cell::new("Score"),
            Cell::new("Title"),
            Cell::new("PDF"),
        ]);

    for c in candidates {
        table.add_row(vec![
            Cell::new(&c.paper.id),
            Cell::new(format!("{:.2}", c.relevance_score)),
            Cell::new(&c.paper.title),
            Cell::new(if c.paper.pdf_url.is_some() { "yes" } else { "-" }),
        ]);
    }
    table
}

// ---------------------------------------------------------------------------
// Review
// ---------------------------------------------------------------------------

/// Which papers the reviewer keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewSelection {
    Papers(Vec<String>),
    AllCandidates,
    Nothing,
    Unspecified,
}

impl ReviewSelection {
    pub fn from_flags(papers: Vec<String>, all: bool, none: bool) -> Self {
        if all {
            Self::AllCandidates
        } else if none {
            Self::Nothing
        } else if papers.is_empty() {
            Self::Unspecified
        } else {
            Self::Papers(papers)
        }
    }
}

pub async fn handle_review(
    state: &AppState,
    raw_id: &str,
    selection: ReviewSelection,
    note: Option<String>,
    out: Output,
) -> Result<()> {
    let workflow_id = parse_workflow_id(raw_id)?;

    let paper_ids = match selection {
        ReviewSelection::Papers(ids) => ids,
        ReviewSelection::Nothing => Vec::new(),
        ReviewSelection::AllCandidates => {
            let status = state.research.get_status(workflow_id).await?;
            status
                .input_prompt
                .filter(|p| {
                    status.is_waiting_for_input
                        && p.interrupt_type != DIRECTIONS_EVALUATION_REQUIRED
                })
                .map(|p| p.candidates.into_iter().map(|c| c.paper.id).collect())
                .with_context(|| {
                    format!(
                        "Workflow {workflow_id} is not waiting for shortlist review (outcome: {})",
                        status.outcome
                    )
                })?
        }
        ReviewSelection::Unspecified => {
            bail!("Specify papers to keep with --paper <id>, or pass --all or --none")
        }
    };

    let status = run_interruptibly(
        state,
        workflow_id,
        state
            .research
            .submit_review_input(workflow_id, &paper_ids, note),
    )
    .await?;
    report_status(&status, out)
}

// ---------------------------------------------------------------------------
// Assess
// ---------------------------------------------------------------------------

/// Parse `ID=SCORE` or `ID=SCORE:CRITIQUE`.
fn parse_assessment(raw: &str) -> Result<DirectionAssessment> {
    let (id, rest) = raw
        .split_once('=')
        .with_context(|| format!("Invalid --score '{raw}': expected ID=SCORE[:CRITIQUE]"))?;
    let (score, critique) = rest.split_once(':').unwrap_or((rest, ""));
    let id = id.trim();
    if id.is_empty() {
        bail!("Invalid --score '{raw}': direction id is empty");
    }
    let score: f64 = score
        .trim()
        .parse()
        .with_context(|| format!("Invalid --score '{raw}': score is not a number"))?;
    if !(0.0..=1.0).contains(&score) {
        bail!("Invalid --score '{raw}': score must be between 0.0 and 1.0");
    }
    Ok(DirectionAssessment {
        direction_id: id.to_string(),
        score,
        critique: critique.trim().to_string(),
    })
}

pub async fn handle_assess(
    state: &AppState,
    raw_id: &str,
    scores: &[String],
    accept: bool,
    note: Option<String>,
    out: Output,
) -> Result<()> {
    let workflow_id = parse_workflow_id(raw_id)?;
    if scores.is_empty() && !accept {
        bail!("Score directions with --score <id>=<score>, or pass --accept");
    }

    let evaluation = Evaluation {
        assessments: scores
            .iter()
            .map(String::as_str)
            .map(parse_assessment)
            .collect::<Result<_>>()?,
        accept_as_is: accept,
        skipped: false,
    };

    let status = run_interruptibly(
        state,
        workflow_id,
        state.research.submit_evaluation(workflow_id, evaluation, note),
    )
    .await?;
    report_status(&status, out)
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

pub async fn handle_results(state: &AppState, raw_id: &str, out: Output) -> Result<()> {
    let workflow_id = parse_workflow_id(raw_id)?;
    let view = state.research.get_results(workflow_id).await?;

    if out.json {
        return print_json(&view);
    }
    match view {
        ResultsView::Final(report) => {
            if !out.quiet {
                print_report(&report);
            }
            Ok(())
        }
        ResultsView::Pending(status) => {
            if !out.quiet {
                println!();
                println!(
                    "  {} Workflow has not finalized yet.",
                    style("!").yellow().bold()
                );
            }
            report_status(&status, out)
        }
    }
}

fn print_report(report: &FinalReport) {
    println!();
    println!("  {}", style(&report.research_query).bold());
    println!("  Outcome:    {}", styled_outcome(report.outcome));
    println!("  Iterations: {}", report.total_iterations);
    println!(
        "  Papers:     {} confirmed, {} ingested, {} failed, {} skipped",
        report.confirmed_shortlist.len(),
        report.ingestion.processed,
        report.ingestion.failed,
        report.ingestion.skipped
    );

    if let Some(summary) = &report.literature_summary {
        println!();
        println!("  {}", style("Literature").cyan().bold());
        println!("  {}", summary.overall_summary);
        if !summary.key_themes.is_empty() {
            println!("  Themes: {}", summary.key_themes.join(", "));
        }
    }

    if !report.identified_gaps.is_empty() {
        println!();
        println!("  {}", style("Gaps").cyan().bold());
        for gap in &report.identified_gaps {
            println!("  - {} ({})", gap.title, style(&gap.gap_id).dim());
        }
    }

    if !report.final_directions.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Direction").fg(Color::Cyan),
                Cell::new("Title"),
                Cell::new("Score"),
            ]);

        for d in &report.final_directions {
            let score = report
                .last_evaluation
                .as_ref()
                .and_then(|e| e.assessments.iter().find(|a| a.direction_id == d.direction_id))
                .map(|a| format!("{:.2}", a.score))
                .unwrap_or_else(|| "-".to_string());
            table.add_row(vec![
                Cell::new(&d.direction_id),
                Cell::new(&d.title),
                Cell::new(score),
            ]);
        }
        println!();
        println!("{table}");
    }
    println!();
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

pub async fn handle_cancel(state: &AppState, raw_id: &str, out: Output) -> Result<()> {
    let workflow_id = parse_workflow_id(raw_id)?;
    let outcome = state.research.cancel(workflow_id).await?;

    let (status, text) = match outcome {
        CancelOutcome::Signalled => ("signalled", "Cancellation signalled to the running workflow"),
        CancelOutcome::Cancelled => ("cancelled", "Workflow cancelled"),
        CancelOutcome::AlreadyTerminal(o) => {
            bail!("Workflow has already finished (outcome: {o}). Cannot cancel.")
        }
    };

    if out.json {
        println!(
            "{}",
            serde_json::json!({"cancelled": workflow_id.to_string(), "status": status})
        );
    } else if !out.quiet {
        println!();
        println!(
            "  {} {} ({})",
            style("*").green().bold(),
            text,
            style(workflow_id).cyan()
        );
        println!();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

pub async fn handle_list(state: &AppState, limit: u32, out: Output) -> Result<()> {
    let workflows = state.research.list(limit).await?;

    if out.json {
        let items: Vec<serde_json::Value> = workflows
            .iter()
            .map(|w| {
                serde_json::json!({
                    "workflow_id": w.workflow_id,
                    "research_query": w.research_query,
                    "outcome": w.outcome,
                    "created_at": w.created_at,
                    "updated_at": w.updated_at,
                })
            })
            .collect();
        return print_json(&items);
    }
    if out.quiet {
        return Ok(());
    }

    if workflows.is_empty() {
        println!();
        println!("  No workflows yet. Start one with {}", style("sflow start <query>").cyan());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Workflow").fg(Color::Cyan),
            Cell::new("Outcome"),
            Cell::new("Query"),
            Cell::new("Updated"),
        ]);

    for w in &workflows {
        table.add_row(vec![
            Cell::new(w.workflow_id.to_string().chars().take(8).collect::<String>()),
            outcome_cell(w.outcome),
            Cell::new(&w.research_query),
            Cell::new(w.updated_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

pub fn handle_graph(state: &AppState, out: Output) -> Result<()> {
    let graph = state.research.graph();

    if out.json {
        let edges: Vec<serde_json::Value> = graph
            .transitions()
            .map(|(node, t)| serde_json::json!({"node": node, "transition": t.to_string()}))
            .collect();
        return print_json(&serde_json::json!({"entry": graph.entry(), "transitions": edges}));
    }

    println!();
    println!("  Entry: {}", style(graph.entry()).cyan());
    for (node, transition) in graph.transitions() {
        println!("  {:<22} {}", node.as_str(), transition);
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

fn outcome_color(outcome: WorkflowOutcome) -> Color {
    match outcome {
        WorkflowOutcome::Running => Color::Blue,
        WorkflowOutcome::WaitingForReview => Color::Yellow,
        WorkflowOutcome::Success => Color::Green,
        WorkflowOutcome::MaxIterationsReached => Color::Cyan,
        WorkflowOutcome::Error | WorkflowOutcome::MaxRetriesReached => Color::Red,
        WorkflowOutcome::Cancelled => Color::DarkGrey,
    }
}

fn outcome_cell(outcome: WorkflowOutcome) -> Cell {
    Cell::new(outcome.as_str()).fg(outcome_color(outcome))
}

fn styled_outcome(outcome: WorkflowOutcome) -> console::StyledObject<&'static str> {
    let styled = style(outcome.as_str());
    match outcome {
        WorkflowOutcome::Running => styled.blue(),
        WorkflowOutcome::WaitingForReview => styled.yellow(),
        WorkflowOutcome::Success => styled.green(),
        WorkflowOutcome::MaxIterationsReached => styled.cyan(),
        WorkflowOutcome::Error | WorkflowOutcome::MaxRetriesReached => styled.red(),
        WorkflowOutcome::Cancelled => styled.dim(),
    }
}
