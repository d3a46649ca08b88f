//! Workflow state: the single record threaded through every pipeline stage.
//!
//! `WorkflowState` is keyed by `workflow_id` (also the checkpoint key). It is
//! created when a workflow starts, mutated only by merging node deltas in the
//! engine, and persisted after every engine step.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ParseIdError;
use crate::message::MessageLog;
use crate::research::{
    Evaluation, FinalReport, FormulatedQuery, IngestionReport, LiteratureSummary, Paper,
    ResearchDirection, ResearchGap, ScoredPaper,
};

/// Maximum number of re-executions of a single node after a transient failure.
pub const MAX_RETRIES: u32 = 2;

/// Maximum number of evaluate -> refine cycles.
pub const MAX_ITERATIONS_REFINE: u32 = 3;

/// Evaluation quality score at or above which refinement stops.
pub const REFINEMENT_SCORE_THRESHOLD: f64 = 0.85;

/// Current schema version of persisted workflow state.
pub const STATE_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// Identifier of a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    Init,
    FormulateQueries,
    Search,
    ScoreRelevance,
    BuildShortlist,
    ReviewShortlist,
    Ingest,
    AnalyzeLiterature,
    ResolveConflict,
    IdentifyGaps,
    GenerateDirections,
    Evaluate,
    Refine,
    Finalize,
}

impl NodeId {
    pub const ALL: [NodeId; 14] = [
        Self::Init,
        Self::FormulateQueries,
        Self::Search,
        Self::ScoreRelevance,
        Self::BuildShortlist,
        Self::ReviewShortlist,
        Self::Ingest,
        Self::AnalyzeLiterature,
        Self::ResolveConflict,
        Self::IdentifyGaps,
        Self::GenerateDirections,
        Self::Evaluate,
        Self::Refine,
        Self::Finalize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::FormulateQueries => "formulate_queries",
            Self::Search => "search",
            Self::ScoreRelevance => "score_relevance",
            Self::BuildShortlist => "build_shortlist",
            Self::ReviewShortlist => "review_shortlist",
            Self::Ingest => "ingest",
            Self::AnalyzeLiterature => "analyze_literature",
            Self::ResolveConflict => "resolve_conflict",
            Self::IdentifyGaps => "identify_gaps",
            Self::GenerateDirections => "generate_directions",
            Self::Evaluate => "evaluate",
            Self::Refine => "refine",
            Self::Finalize => "finalize",
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| ParseIdError::UnknownNode(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ErrorSource
// ---------------------------------------------------------------------------

/// Where an error originated: a pipeline node, or the engine itself.
///
/// Serialized as a plain string (`"search"`, `"engine"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ErrorSource {
    Node(NodeId),
    Engine,
}

impl ErrorSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Node(id) => id.as_str(),
            Self::Engine => "engine",
        }
    }

    pub fn node(&self) -> Option<NodeId> {
        match self {
            Self::Node(id) => Some(*id),
            Self::Engine => None,
        }
    }
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ErrorSource> for String {
    fn from(source: ErrorSource) -> Self {
        source.as_str().to_string()
    }
}

impl TryFrom<String> for ErrorSource {
    type Error = ParseIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == "engine" {
            return Ok(Self::Engine);
        }
        value.parse().map(Self::Node)
    }
}

// ---------------------------------------------------------------------------
// Outcome and error detail
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowOutcome {
    #[default]
    Running,
    WaitingForReview,
    Success,
    Error,
    MaxIterationsReached,
    MaxRetriesReached,
    Cancelled,
}

impl WorkflowOutcome {
    /// Terminal outcomes end the workflow; the engine performs no further steps.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running | Self::WaitingForReview)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::WaitingForReview => "waiting_for_review",
            Self::Success => "success",
            Self::Error => "error",
            Self::MaxIterationsReached => "max_iterations_reached",
            Self::MaxRetriesReached => "max_retries_reached",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for WorkflowOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a node failure; decides retry vs. immediate termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Timeout, rate limit, connection error. Eligible for retry.
    Transient,
    /// Invalid input. Re-running cannot succeed.
    Validation,
    /// The workflow was cancelled while the node was running.
    Cancelled,
    /// Engine fault (a panicking node, an inconsistent transition). Never retried.
    Internal,
}

/// Internal diagnostic detail for the last error. Never exposed in status projections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: FailureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

// ---------------------------------------------------------------------------
// InputPrompt
// ---------------------------------------------------------------------------

/// Interrupt type used when the shortlist awaits human review.
pub const SHORTLIST_REVIEW_REQUIRED: &str = "shortlist_review_required";

/// Interrupt type used when research directions await a human evaluation.
pub const DIRECTIONS_EVALUATION_REQUIRED: &str = "directions_evaluation_required";

/// Structured description of the external input a suspended workflow needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputPrompt {
    pub interrupt_type: String,
    /// Human-readable instruction.
    pub message: String,
    pub research_query: String,
    /// Papers awaiting shortlist review.
    #[serde(default)]
    pub candidates: Vec<ScoredPaper>,
    /// Directions awaiting evaluation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directions: Vec<ResearchDirection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literature_summary: Option<LiteratureSummary>,
    /// Refinement iteration the evaluation belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    pub requested_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// WorkflowConfig
// ---------------------------------------------------------------------------

/// Named per-workflow options. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Suspend for human review of the shortlist before ingestion.
    #[serde(default)]
    pub hitl_shortlist_review_active: bool,

    /// Suspend for a human evaluation of the research directions instead of
    /// calling the review agent.
    #[serde(default)]
    pub hitl_evaluation_active: bool,

    /// Minimum relevance score for a paper to enter the shortlist.
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,

    #[serde(default = "default_max_results_per_query")]
    pub max_results_per_query: u32,

    #[serde(default = "default_sort_by")]
    pub search_sort_by: String,

    #[serde(default = "default_sort_order")]
    pub search_sort_order: String,

    /// Run a second, independent literature analysis and flag disagreement.
    #[serde(default)]
    pub cross_check_analysis: bool,

    /// Per-call timeout applied to every collaborator request.
    #[serde(default = "default_collaborator_timeout_secs")]
    pub collaborator_timeout_secs: u64,
}

fn default_relevance_threshold() -> f64 {
    0.7
}

fn default_max_results_per_query() -> u32 {
    5
}

fn default_sort_by() -> String {
    "relevance".to_string()
}

fn default_sort_order() -> String {
    "descending".to_string()
}

fn default_collaborator_timeout_secs() -> u64 {
    120
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            hitl_shortlist_review_active: false,
            hitl_evaluation_active: false,
            relevance_threshold: default_relevance_threshold(),
            max_results_per_query: default_max_results_per_query(),
            search_sort_by: default_sort_by(),
            search_sort_order: default_sort_order(),
            cross_check_analysis: false,
            collaborator_timeout_secs: default_collaborator_timeout_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowState
// ---------------------------------------------------------------------------

/// The complete mutable record of one research workflow.
///
/// Every field is always serialized so a persisted snapshot carries the full
/// schema; fields added later default when reading older snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    // Identity
    pub workflow_id: Uuid,
    #[serde(default)]
    pub session_id: Option<String>,

    // Pipeline inputs
    pub research_query: String,
    #[serde(default)]
    pub general_area: Option<String>,
    #[serde(default)]
    pub config: WorkflowConfig,

    // Stage outputs
    #[serde(default)]
    pub formulated_queries: Option<Vec<FormulatedQuery>>,
    #[serde(default)]
    pub search_results: Option<Vec<Paper>>,
    #[serde(default)]
    pub scored_results: Option<Vec<ScoredPaper>>,
    #[serde(default)]
    pub initial_shortlist: Option<Vec<ScoredPaper>>,
    #[serde(default)]
    pub confirmed_shortlist: Option<Vec<ScoredPaper>>,
    #[serde(default)]
    pub ingestion_reports: Option<Vec<IngestionReport>>,
    /// Stable ids of papers already ingested; lets ingestion retries skip them.
    #[serde(default)]
    pub processed_paper_ids: Vec<String>,
    #[serde(default)]
    pub literature_summary: Option<LiteratureSummary>,
    #[serde(default)]
    pub identified_gaps: Option<Vec<ResearchGap>>,
    #[serde(default)]
    pub generated_directions: Option<Vec<ResearchDirection>>,
    #[serde(default)]
    pub evaluation: Option<Evaluation>,
    #[serde(default)]
    pub refined_directions: Option<Vec<ResearchDirection>>,
    #[serde(default)]
    pub final_report: Option<FinalReport>,

    // Loop control
    #[serde(default)]
    pub iteration_count: u32,
    #[serde(default)]
    pub is_waiting_for_input: bool,
    #[serde(default)]
    pub input_prompt: Option<InputPrompt>,

    // Error / retry
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub error_source_node: Option<ErrorSource>,
    #[serde(default)]
    pub error_detail: Option<ErrorDetail>,
    #[serde(default)]
    pub retry_attempts: BTreeMap<NodeId, u32>,

    // Conflict handling
    #[serde(default)]
    pub conflict_detected: bool,
    #[serde(default)]
    pub conflicting_candidates: Vec<LiteratureSummary>,
    #[serde(default)]
    pub resolved_value: Option<LiteratureSummary>,

    // Audit log
    #[serde(default)]
    pub messages: MessageLog,

    // Outcome and cursor
    #[serde(default)]
    pub workflow_outcome: WorkflowOutcome,
    /// Next node the engine will execute; `None` once terminal.
    #[serde(default)]
    pub current_node: Option<NodeId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    /// Build the initial state for a new workflow.
    pub fn new(
        workflow_id: Uuid,
        research_query: impl Into<String>,
        general_area: Option<String>,
        config: WorkflowConfig,
    ) -> Self {
        let now = Utc::now();
        Self {
            workflow_id,
            session_id: None,
            research_query: research_query.into(),
            general_area,
            config,
            formulated_queries: None,
            search_results: None,
            scored_results: None,
            initial_shortlist: None,
            confirmed_shortlist: None,
            ingestion_reports: None,
            processed_paper_ids: Vec::new(),
            literature_summary: None,
            identified_gaps: None,
            generated_directions: None,
            evaluation: None,
            refined_directions: None,
            final_report: None,
            iteration_count: 0,
            is_waiting_for_input: false,
            input_prompt: None,
            error_message: None,
            error_source_node: None,
            error_detail: None,
            retry_attempts: BTreeMap::new(),
            conflict_detected: false,
            conflicting_candidates: Vec::new(),
            resolved_value: None,
            messages: MessageLog::new(),
            workflow_outcome: WorkflowOutcome::Running,
            current_node: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Conversation id used for messages: the session id once assigned.
    pub fn conversation_id(&self) -> String {
        self.session_id
            .clone()
            .unwrap_or_else(|| self.workflow_id.to_string())
    }

    pub fn has_error(&self) -> bool {
        self.error_message.as_deref().is_some_and(|m| !m.is_empty())
    }

    pub fn is_terminal(&self) -> bool {
        self.workflow_outcome.is_terminal()
    }

    pub fn retries_for(&self, node: NodeId) -> u32 {
        self.retry_attempts.get(&node).copied().unwrap_or(0)
    }

    /// Directions under consideration: refined ones once refinement ran, else generated ones.
    pub fn current_directions(&self) -> &[ResearchDirection] {
        self.refined_directions
            .as_deref()
            .or(self.generated_directions.as_deref())
            .unwrap_or_default()
    }

    /// Clear the error triple after a recovery decision.
    pub fn clear_error(&mut self) {
        self.error_message = None;
        self.error_source_node = None;
        self.error_detail = None;
    }
}
