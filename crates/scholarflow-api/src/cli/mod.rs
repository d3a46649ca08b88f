//! CLI command definitions for the `sflow` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod workflow;

use clap::{Args, Parser, Subcommand};

/// Research assistant workflows: search, shortlist, analyze, propose.
#[derive(Parser)]
#[command(name = "sflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed logs (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a research workflow and run it until it finishes or needs review.
    Start(StartArgs),

    /// Show the status of a workflow.
    Status {
        /// Workflow UUID.
        workflow_id: String,
    },

    /// Confirm shortlisted papers and resume a workflow waiting for review.
    Review {
        /// Workflow UUID.
        workflow_id: String,

        /// Paper id to keep (repeatable).
        #[arg(long = "paper", short = 'p')]
        papers: Vec<String>,

        /// Keep every shortlisted paper.
        #[arg(long, conflicts_with = "papers")]
        all: bool,

        /// Confirm an empty shortlist (skips ingestion).
        #[arg(long, conflicts_with_all = ["papers", "all"])]
        none: bool,

        /// Reviewer note recorded with the decision.
        #[arg(long)]
        note: Option<String>,
    },

    /// Score research directions and resume a workflow waiting for evaluation.
    Assess {
        /// Workflow UUID.
        workflow_id: String,

        /// Direction score as ID=SCORE or ID=SCORE:CRITIQUE (repeatable).
        #[arg(long = "score", short = 's')]
        scores: Vec<String>,

        /// Accept the directions as they are.
        #[arg(long)]
        accept: bool,

        /// Reviewer note recorded with the verdict.
        #[arg(long)]
        note: Option<String>,
    },

    /// Show the final report, or the current status if not finished.
    Results {
        /// Workflow UUID.
        workflow_id: String,
    },

    /// Cancel a workflow.
    Cancel {
        /// Workflow UUID.
        workflow_id: String,
    },

    /// List recent workflows.
    #[command(alias = "ls")]
    List {
        /// Maximum number of workflows to display.
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Print the pipeline transition table.
    Graph,
}

/// Options for `sflow start`. Unset options fall back to `config.toml`.
#[derive(Args)]
pub struct StartArgs {
    /// Research question or topic.
    pub query: String,

    /// Broader research area used to widen search queries.
    #[arg(long)]
    pub area: Option<String>,

    /// Caller-supplied session id.
    #[arg(long)]
    pub session: Option<String>,

    /// Pause for human review of the shortlist.
    #[arg(long)]
    pub hitl: bool,

    /// Pause for a human evaluation of the research directions.
    #[arg(long)]
    pub hitl_eval: bool,

    /// Relevance score a paper needs to be shortlisted (0.0-1.0).
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Maximum results per search query.
    #[arg(long)]
    pub max_results: Option<u32>,

    /// Run two analysis passes and resolve disagreements.
    #[arg(long)]
    pub cross_check: bool,

    /// Per-call collaborator timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Output mode shared by every handler.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}
