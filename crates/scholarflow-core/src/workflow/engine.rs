//! Workflow engine: drives a workflow from its current node to a terminal
//! outcome or a suspension point.
//!
//! # Step
//!
//! 1. Stop if the state is terminal or waiting for input.
//! 2. Route a persisted, unresolved error through the failure policy.
//! 3. Stop with `cancelled` if the run's cancellation token fired.
//! 4. Execute the current node under an `info_span!("node")`, containing panics.
//! 5. Merge the returned delta.
//! 6. Continue: resolve the successor (static edge or router).
//!    Suspend: keep the cursor on the node and mark the state waiting; the
//!    successor is resolved once the input is applied.
//!    Fail: record the error and take the error edge.
//! 7. Persist the state.
//!
//! Node executions within one workflow are strictly sequential. Different
//! workflows share only the checkpoint store.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use scholarflow_types::message::{AgentMessage, Performative};
use scholarflow_types::state::{
    ErrorDetail, ErrorSource, FailureKind, NodeId, WorkflowConfig, WorkflowOutcome, WorkflowState,
};

use crate::collaborator::Collaborators;
use crate::repository::checkpoint::CheckpointRepository;

use super::checkpoint::{CheckpointError, CheckpointManager, CheckpointSummary};
use super::delta::StateDelta;
use super::graph::{GraphError, WorkflowGraph};
use super::interrupt::{InterruptController, ReviewInput};
use super::node::{NodeContext, NodeOutcome};
use super::retry::ErrorHandler;
use super::router::{Branch, check_for_errors};

/// Sender name for engine-level messages.
pub const ENGINE: &str = "engine";

// ---------------------------------------------------------------------------
// Requests and results
// ---------------------------------------------------------------------------

/// Input for a new workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct StartRequest {
    pub research_query: String,
    pub general_area: Option<String>,
    /// Caller-supplied session id; generated at init when absent.
    pub session_id: Option<String>,
    pub config: WorkflowConfig,
}

impl StartRequest {
    pub fn new(research_query: impl Into<String>) -> Self {
        Self {
            research_query: research_query.into(),
            general_area: None,
            session_id: None,
            config: WorkflowConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// A run was in flight; it stops at its next await point or node boundary.
    Signalled,
    /// The persisted workflow was marked cancelled.
    Cancelled,
    /// Nothing to do.
    AlreadyTerminal(WorkflowOutcome),
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Research workflow engine.
///
/// Generic over `R: CheckpointRepository` so it works with any storage backend.
pub struct Engine<R: CheckpointRepository> {
    graph: WorkflowGraph,
    checkpoint: CheckpointManager<R>,
    collaborators: Collaborators,
    error_handler: ErrorHandler,
    /// Cancellation tokens of in-flight runs, keyed by workflow id.
    cancellation_tokens: DashMap<Uuid, CancellationToken>,
}

/// Removes a run's cancellation token when the run ends.
struct RunGuard<'a> {
    tokens: &'a DashMap<Uuid, CancellationToken>,
    workflow_id: Uuid,
    token: CancellationToken,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.tokens.remove(&self.workflow_id);
    }
}

impl<R: CheckpointRepository> Engine<R> {
    /// Engine over the research pipeline.
    pub fn new(repo: R, collaborators: Collaborators) -> Result<Self, EngineError> {
        Ok(Self::with_graph(
            WorkflowGraph::research_pipeline()?,
            repo,
            collaborators,
        ))
    }

    pub fn with_graph(graph: WorkflowGraph, repo: R, collaborators: Collaborators) -> Self {
        Self {
            graph,
            checkpoint: CheckpointManager::new(repo),
            collaborators,
            error_handler: ErrorHandler::default(),
            cancellation_tokens: DashMap::new(),
        }
    }

    pub fn with_error_handler(mut self, error_handler: ErrorHandler) -> Self {
        self.error_handler = error_handler;
        self
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn is_running(&self, workflow_id: Uuid) -> bool {
        self.cancellation_tokens.contains_key(&workflow_id)
    }

    /// Build and persist the initial state without running it.
    pub async fn create(&self, request: StartRequest) -> Result<WorkflowState, EngineError> {
        let mut state = WorkflowState::new(
            Uuid::now_v7(),
            request.research_query,
            request.general_area,
            request.config,
        );
        state.session_id = request.session_id;
        state.current_node = Some(self.graph.entry());
        self.checkpoint.put(&state).await?;

        tracing::info!(
            workflow_id = %state.workflow_id,
            query = %state.research_query,
            "workflow created"
        );
        Ok(state)
    }

    /// Create a workflow and run it until it suspends or terminates.
    pub async fn start(&self, request: StartRequest) -> Result<Uuid, EngineError> {
        let state = self.create(request).await?;
        self.run(state.workflow_id).await?;
        Ok(state.workflow_id)
    }

    /// Run a persisted workflow until it suspends or terminates.
    ///
    /// Terminal and suspended workflows are returned unchanged.
    pub async fn run(&self, workflow_id: Uuid) -> Result<WorkflowState, EngineError> {
        let guard = self.register(workflow_id)?;
        let mut state = self.checkpoint.get(workflow_id).await?;
        while self.step(&mut state, &guard.token).await? {}
        Ok(state)
    }

    /// Apply review input to a suspended workflow and continue running it.
    pub async fn resume(
        &self,
        workflow_id: Uuid,
        input: ReviewInput,
    ) -> Result<WorkflowState, EngineError> {
        let guard = self.register(workflow_id)?;
        let mut state = self.checkpoint.get(workflow_id).await?;

        let delta = InterruptController::resume_delta(&state, input).map_err(|e| {
            EngineError::InvalidResumeState {
                workflow_id,
                reason: e.to_string(),
            }
        })?;
        let Some(suspended_at) = state.current_node else {
            return Err(EngineError::InvalidResumeState {
                workflow_id,
                reason: "suspended workflow has no current node".to_string(),
            });
        };
        let kind = input_kind(&delta);

        delta.apply(&mut state);
        InterruptController::release(&mut state);
        self.advance(&mut state, suspended_at);
        self.persist(&mut state).await?;

        tracing::info!(
            workflow_id = %workflow_id,
            input = kind,
            from = %suspended_at,
            next = ?state.current_node,
            "workflow resumed"
        );

        while self.step(&mut state, &guard.token).await? {}
        Ok(state)
    }

    pub async fn get_state(&self, workflow_id: Uuid) -> Result<WorkflowState, EngineError> {
        Ok(self.checkpoint.get(workflow_id).await?)
    }

    pub async fn list(&self, limit: u32) -> Result<Vec<CheckpointSummary>, EngineError> {
        Ok(self.checkpoint.list(limit).await?)
    }

    /// Cancel a workflow: signal its in-flight run, or mark the persisted
    /// state cancelled. Terminal workflows are left untouched.
    pub async fn cancel(&self, workflow_id: Uuid) -> Result<CancelOutcome, EngineError> {
        if let Some(token) = self.cancellation_tokens.get(&workflow_id) {
            token.cancel();
            tracing::info!(workflow_id = %workflow_id, "cancellation signalled");
            return Ok(CancelOutcome::Signalled);
        }

        let mut state = self.checkpoint.get(workflow_id).await?;
        if state.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal(state.workflow_outcome));
        }

        Self::mark_cancelled(&mut state);
        self.persist(&mut state).await?;
        Ok(CancelOutcome::Cancelled)
    }

    // -----------------------------------------------------------------------
    // Stepping
    // -----------------------------------------------------------------------

    fn register(&self, workflow_id: Uuid) -> Result<RunGuard<'_>, EngineError> {
        let token = CancellationToken::new();
        match self.cancellation_tokens.entry(workflow_id) {
            Entry::Occupied(_) => return Err(EngineError::AlreadyRunning(workflow_id)),
            Entry::Vacant(slot) => {
                slot.insert(token.clone());
            }
        }
        Ok(RunGuard {
            tokens: &self.cancellation_tokens,
            workflow_id,
            token,
        })
    }

    /// Execute the current node. Returns whether stepping can continue.
    async fn step(
        &self,
        state: &mut WorkflowState,
        cancel: &CancellationToken,
    ) -> Result<bool, EngineError> {
        if state.is_terminal() || state.is_waiting_for_input {
            return Ok(false);
        }

        // A checkpoint written between a failure and its recovery carries
        // the error; it is settled before any node runs.
        if self.route_error(state) {
            tracing::warn!(
                workflow_id = %state.workflow_id,
                outcome = %state.workflow_outcome,
                "settled unresolved error from checkpoint"
            );
            self.persist(state).await?;
            return Ok(!state.is_terminal());
        }

        if cancel.is_cancelled() {
            Self::mark_cancelled(state);
            self.persist(state).await?;
            return Ok(false);
        }

        let Some(node_id) = state.current_node else {
            Self::fail_engine(state, "workflow has no current node".to_string(), None);
            self.persist(state).await?;
            return Ok(false);
        };

        let Some(node) = self.graph.node(node_id) else {
            let err = GraphError::MissingNode(node_id);
            Self::fail_engine(state, err.to_string(), None);
            self.persist(state).await?;
            return Ok(false);
        };

        let ctx = NodeContext {
            workflow_id: state.workflow_id,
            collaborators: &self.collaborators,
            cancel,
            call_timeout: Duration::from_secs(state.config.collaborator_timeout_secs),
        };
        let span = tracing::info_span!("node", workflow_id = %state.workflow_id, node = %node_id);

        let result = AssertUnwindSafe(node.execute_boxed(state, &ctx))
            .catch_unwind()
            .instrument(span)
            .await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                tracing::error!(
                    workflow_id = %state.workflow_id,
                    node = %node_id,
                    panic = %detail,
                    "node panicked"
                );
                Self::fail_engine(
                    state,
                    format!("internal error while executing '{node_id}'"),
                    Some(detail),
                );
                self.persist(state).await?;
                return Ok(false);
            }
        };

        self.apply_outcome(state, node_id, outcome).await?;

        if state.is_terminal() {
            tracing::info!(
                workflow_id = %state.workflow_id,
                outcome = %state.workflow_outcome,
                messages = state.messages.len(),
                "workflow finished"
            );
        }
        Ok(!state.is_terminal() && !state.is_waiting_for_input)
    }

    async fn apply_outcome(
        &self,
        state: &mut WorkflowState,
        node_id: NodeId,
        outcome: NodeOutcome,
    ) -> Result<(), EngineError> {
        match outcome {
            NodeOutcome::Continue(delta) => {
                delta.apply(state);
                self.advance(state, node_id);
            }
            NodeOutcome::Suspend(delta, prompt) => {
                delta.apply(state);
                state.current_node = Some(node_id);
                tracing::info!(
                    workflow_id = %state.workflow_id,
                    node = %node_id,
                    interrupt_type = %prompt.interrupt_type,
                    "workflow suspended for input"
                );
                InterruptController::suspend(state, prompt);
            }
            NodeOutcome::Fail(delta, failure) => {
                delta.apply(state);
                state.error_message = Some(if failure.message.trim().is_empty() {
                    format!("{node_id} failed")
                } else {
                    failure.message.clone()
                });
                state.error_source_node = Some(ErrorSource::Node(node_id));
                state.error_detail = Some(ErrorDetail {
                    kind: failure.kind,
                    detail: failure.detail.clone(),
                });
                if failure.kind == FailureKind::Transient {
                    // Persist the failure itself before the recovery decision.
                    self.persist(state).await?;
                }
                self.route_error(state);
            }
        }

        self.persist(state).await
    }

    /// Error edge: a state carrying an error goes to the error handler
    /// (transient), to the terminal `error` outcome (validation, internal),
    /// or to `cancelled`. Returns false when `check_for_errors` finds none.
    fn route_error(&self, state: &mut WorkflowState) -> bool {
        if check_for_errors(state) == Branch::NoError {
            return false;
        }

        let node = state.error_source_node.and_then(|s| s.node());
        let kind = state
            .error_detail
            .as_ref()
            .map_or(FailureKind::Transient, |d| d.kind);

        match (kind, node) {
            (FailureKind::Transient, Some(node)) => {
                let recovery = self.error_handler.recover(state);
                tracing::debug!(
                    workflow_id = %state.workflow_id,
                    node = %node,
                    strategy = %recovery.strategy,
                    "error handler decision"
                );
            }
            (FailureKind::Cancelled, _) => {
                state.clear_error();
                Self::mark_cancelled(state);
            }
            _ => {
                tracing::warn!(
                    workflow_id = %state.workflow_id,
                    node = ?node,
                    error = ?state.error_message,
                    "non-retryable failure"
                );
                state.workflow_outcome = WorkflowOutcome::Error;
                state.current_node = None;
            }
        }
        true
    }

    /// Move the cursor past `from`.
    fn advance(&self, state: &mut WorkflowState, from: NodeId) {
        match self.graph.next(from, state) {
            Ok(Some(next)) => {
                tracing::debug!(workflow_id = %state.workflow_id, from = %from, to = %next, "transition");
                state.current_node = Some(next);
            }
            Ok(None) => {
                state.current_node = None;
                if !state.is_terminal() {
                    Self::fail_engine(
                        state,
                        format!("pipeline ended at '{from}' without a terminal outcome"),
                        None,
                    );
                }
            }
            Err(err) => Self::fail_engine(state, err.to_string(), None),
        }
    }

    async fn persist(&self, state: &mut WorkflowState) -> Result<(), EngineError> {
        state.updated_at = Utc::now();
        self.checkpoint.put(state).await?;
        Ok(())
    }

    fn fail_engine(state: &mut WorkflowState, message: String, detail: Option<String>) {
        let report = AgentMessage::new(
            state.conversation_id(),
            ENGINE,
            Performative::ErrorReport,
            json!({
                "status": "failed",
                "error_message": message,
                "failed_node": state.current_node.map(|n| n.as_str()),
            }),
        );
        state.messages.append(report);
        state.error_message = Some(message);
        state.error_source_node = Some(ErrorSource::Engine);
        state.error_detail = Some(ErrorDetail {
            kind: FailureKind::Internal,
            detail,
        });
        state.workflow_outcome = WorkflowOutcome::Error;
        state.current_node = None;
    }

    fn mark_cancelled(state: &mut WorkflowState) {
        let notice = AgentMessage::new(
            state.conversation_id(),
            ENGINE,
            Performative::StatusUpdate,
            json!({
                "status": "cancelled",
                "at_node": state.current_node.map(|n| n.as_str()),
            }),
        );
        state.messages.append(notice);
        state.workflow_outcome = WorkflowOutcome::Cancelled;
        state.is_waiting_for_input = false;
        state.input_prompt = None;
        state.current_node = None;
        tracing::info!(workflow_id = %state.workflow_id, "workflow cancelled");
    }
}

fn input_kind(delta: &StateDelta) -> &'static str {
    if delta.evaluation.is_some() {
        "evaluation"
    } else {
        "shortlist"
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("workflow not found: {0}")]
    NotFound(Uuid),

    #[error("workflow {workflow_id} cannot be resumed: {reason}")]
    InvalidResumeState { workflow_id: Uuid, reason: String },

    #[error("invalid review input: {0}")]
    InvalidReviewInput(String),

    #[error("workflow {0} is already running")]
    AlreadyRunning(Uuid),

    #[error(transparent)]
    Checkpoint(CheckpointError),

    #[error("invalid workflow graph: {0}")]
    Graph(#[from] GraphError),
}

impl From<CheckpointError> for EngineError {
    fn from(err: CheckpointError) -> Self {
        match err {
            CheckpointError::NotFound(id) => Self::NotFound(id),
            other => Self::Checkpoint(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::workflow::checkpoint::MemoryCheckpointRepository;
    use crate::workflow::retry::ERROR_HANDLER;
    use crate::workflow::testing::{ScriptedAgent, mock_collaborators};
    use scholarflow_types::research::{DirectionAssessment, Evaluation};
    use scholarflow_types::state::{DIRECTIONS_EVALUATION_REQUIRED, MAX_ITERATIONS_REFINE, MAX_RETRIES};

    type TestEngine = Engine<MemoryCheckpointRepository>;

    fn engine(agent: &ScriptedAgent) -> TestEngine {
        Engine::new(
            MemoryCheckpointRepository::new(),
            mock_collaborators(agent.clone()),
        )
        .unwrap()
    }

    fn request(query: &str) -> StartRequest {
        StartRequest::new(query)
    }

    fn hitl_request(query: &str) -> StartRequest {
        let mut request = StartRequest::new(query);
        request.config.hitl_shortlist_review_active = true;
        request
    }

    fn assert_bounds(state: &WorkflowState) {
        assert!(state.iteration_count <= MAX_ITERATIONS_REFINE);
        for attempts in state.retry_attempts.values() {
            assert!(*attempts <= MAX_RETRIES);
        }
    }

    // --- Scenario A ---

    #[tokio::test]
    async fn empty_query_fails_at_init() {
        let agent = ScriptedAgent::default();
        let engine = engine(&agent);

        let id = engine.start(request("")).await.unwrap();
        let state = engine.get_state(id).await.unwrap();

        assert_eq!(state.workflow_outcome, WorkflowOutcome::Error);
        assert_eq!(state.error_source_node, Some(ErrorSource::Node(NodeId::Init)));
        assert_eq!(state.messages.len(), 1);
        assert!(state.current_node.is_none());
        assert!(state.retry_attempts.is_empty());
        assert_eq!(agent.calls("formulate_queries"), 0);
    }

    // --- Scenario B ---

    #[tokio::test]
    async fn hitl_disabled_auto_confirms_shortlist() {
        let agent = ScriptedAgent::default();
        let engine = engine(&agent);

        let id = engine.start(request("graph neural networks")).await.unwrap();
        let state = engine.get_state(id).await.unwrap();

        assert_eq!(state.workflow_outcome, WorkflowOutcome::Success);
        assert_eq!(state.initial_shortlist.as_ref().unwrap().len(), 3);
        assert_eq!(state.confirmed_shortlist, state.initial_shortlist);
        assert!(!state.is_waiting_for_input);
        assert!(state.input_prompt.is_none());
        assert!(
            state
                .messages
                .iter()
                .all(|m| m.performative != Performative::RequestAction)
        );

        let report = state.final_report.as_ref().unwrap();
        assert_eq!(report.ingestion.processed, 3);
        assert_eq!(report.outcome, WorkflowOutcome::Success);
        assert_eq!(agent.ingested().len(), 3);
        assert_bounds(&state);
    }

    // --- Scenario C ---

    #[tokio::test]
    async fn hitl_suspends_and_resumes_with_confirmed_subset() {
        let agent = ScriptedAgent::default().with_papers(&[
            ("a", 0.95),
            ("b", 0.9),
            ("c", 0.85),
            ("d", 0.8),
            ("e", 0.75),
        ]);
        let engine = engine(&agent);

        let id = engine.start(hitl_request("protein folding")).await.unwrap();
        let suspended = engine.get_state(id).await.unwrap();

        assert_eq!(suspended.workflow_outcome, WorkflowOutcome::WaitingForReview);
        assert!(suspended.is_waiting_for_input);
        assert!(suspended.confirmed_shortlist.unwrap_or_default().is_empty());
        assert_eq!(suspended.input_prompt.as_ref().unwrap().candidates.len(), 5);
        assert_eq!(suspended.current_node, Some(NodeId::ReviewShortlist));
        assert_eq!(agent.calls("process"), 0);

        let keep = suspended.initial_shortlist.clone().unwrap()[..2].to_vec();
        let resumed = engine
            .resume(
                id,
                ReviewInput::shortlist(keep),
            )
            .await
            .unwrap();

        assert_eq!(resumed.confirmed_shortlist.as_ref().unwrap().len(), 2);
        assert!(!resumed.is_waiting_for_input);
        assert_eq!(resumed.workflow_outcome, WorkflowOutcome::Success);
        assert_eq!(agent.ingested(), vec!["doc_a", "doc_b"]);
        assert_eq!(resumed.ingestion_reports.as_ref().unwrap().len(), 2);

        // The log only grew across the resume.
        assert!(resumed.messages.len() > suspended.messages.len());
        assert_eq!(
            &resumed.messages.as_slice()[..suspended.messages.len()],
            suspended.messages.as_slice()
        );
    }

    #[tokio::test]
    async fn second_resume_is_rejected() {
        let agent = ScriptedAgent::default();
        let engine = engine(&agent);
        let id = engine.start(hitl_request("q")).await.unwrap();

        let input = ReviewInput::shortlist(vec![]);
        engine.resume(id, input.clone()).await.unwrap();
        let before = engine.get_state(id).await.unwrap();

        match engine.resume(id, input).await {
            Err(EngineError::InvalidResumeState { workflow_id, .. }) => assert_eq!(workflow_id, id),
            other => panic!("expected InvalidResumeState, got {other:?}"),
        }
        assert_eq!(engine.get_state(id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn resume_on_running_workflow_is_rejected() {
        let agent = ScriptedAgent::default();
        let engine = engine(&agent);
        let id = engine.start(request("q")).await.unwrap();

        let result = engine
            .resume(
                id,
                ReviewInput::shortlist(vec![]),
            )
            .await;
        assert!(matches!(result, Err(EngineError::InvalidResumeState { .. })));
    }

    // --- Scenario D ---

    #[tokio::test]
    async fn transient_failures_within_limit_recover() {
        let agent = ScriptedAgent::default().fail_times("formulate_queries", 2);
        let engine = engine(&agent);

        let id = engine.start(request("q")).await.unwrap();
        let state = engine.get_state(id).await.unwrap();

        assert_eq!(state.workflow_outcome, WorkflowOutcome::Success);
        assert_eq!(state.retries_for(NodeId::FormulateQueries), 2);
        assert!(state.error_message.is_none());
        assert!(state.error_source_node.is_none());
        assert!(state.error_detail.is_none());
        assert_eq!(agent.calls("formulate_queries"), 3);

        let decisions: Vec<_> = state
            .messages
            .iter()
            .filter(|m| m.sender == ERROR_HANDLER)
            .map(|m| m.content["chosen_strategy"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(decisions, vec!["RETRY_NODE", "RETRY_NODE"]);
        assert_bounds(&state);
    }

    // --- Scenario E ---

    #[tokio::test]
    async fn retry_limit_terminates_workflow() {
        let agent = ScriptedAgent::default().fail_times("formulate_queries", 3);
        let engine = engine(&agent);

        let id = engine.start(request("q")).await.unwrap();
        let state = engine.get_state(id).await.unwrap();

        assert_eq!(state.workflow_outcome, WorkflowOutcome::MaxRetriesReached);
        assert_eq!(state.retries_for(NodeId::FormulateQueries), MAX_RETRIES);
        assert!(state.current_node.is_none());
        assert_eq!(agent.calls("formulate_queries"), 3);
        assert_eq!(
            state.messages.last().unwrap().content["chosen_strategy"],
            "TERMINATE"
        );

        // Terminal workflows do not step again.
        let again = engine.run(id).await.unwrap();
        assert_eq!(again, state);
        assert_eq!(agent.calls("formulate_queries"), 3);
        assert_eq!(agent.calls("search"), 0);
    }

    #[tokio::test]
    async fn rejected_call_terminates_without_retry() {
        let agent = ScriptedAgent::default().reject("formulate_queries");
        let engine = engine(&agent);

        let id = engine.start(request("q")).await.unwrap();
        let state = engine.get_state(id).await.unwrap();

        assert_eq!(state.workflow_outcome, WorkflowOutcome::Error);
        assert_eq!(
            state.error_source_node,
            Some(ErrorSource::Node(NodeId::FormulateQueries))
        );
        assert!(state.retry_attempts.is_empty());
        assert_eq!(agent.calls("formulate_queries"), 1);
    }

    // --- Scenario F ---

    #[tokio::test]
    async fn refinement_exits_on_score_threshold() {
        let agent = ScriptedAgent::default().eval_scores(&[0.5, 0.6, 0.9]);
        let engine = engine(&agent);

        let id = engine.start(request("q")).await.unwrap();
        let state = engine.get_state(id).await.unwrap();

        assert_eq!(state.workflow_outcome, WorkflowOutcome::Success);
        assert_eq!(state.iteration_count, 3);
        assert_eq!(agent.calls("evaluate"), 3);
        assert_eq!(agent.calls("refine_directions"), 2);
        assert_eq!(state.final_report.as_ref().unwrap().total_iterations, 3);
        assert_bounds(&state);
    }

    #[tokio::test]
    async fn refinement_stops_at_iteration_cap() {
        let agent = ScriptedAgent::default().eval_scores(&[0.4]);
        let engine = engine(&agent);

        let id = engine.start(request("q")).await.unwrap();
        let state = engine.get_state(id).await.unwrap();

        assert_eq!(state.workflow_outcome, WorkflowOutcome::MaxIterationsReached);
        assert_eq!(state.iteration_count, MAX_ITERATIONS_REFINE);
        assert_eq!(agent.calls("evaluate"), 3);
    }

    #[tokio::test]
    async fn accepted_low_score_finalizes_immediately() {
        let agent = ScriptedAgent::default().eval_scores(&[0.2]).accept_as_is();
        let engine = engine(&agent);

        let id = engine.start(request("q")).await.unwrap();
        let state = engine.get_state(id).await.unwrap();

        assert_eq!(state.workflow_outcome, WorkflowOutcome::Success);
        assert_eq!(state.iteration_count, 1);
        assert_eq!(agent.calls("refine_directions"), 0);
    }

    // --- Conflict ---

    #[tokio::test]
    async fn conflicting_analysis_routes_through_resolution() {
        let agent = ScriptedAgent::default().divergent_analysis();
        let engine = engine(&agent);

        let mut req = request("q");
        req.config.cross_check_analysis = true;
        let id = engine.start(req).await.unwrap();
        let state = engine.get_state(id).await.unwrap();

        assert_eq!(state.workflow_outcome, WorkflowOutcome::Success);
        assert!(!state.conflict_detected);
        assert!(state.resolved_value.is_some());
        assert_eq!(state.literature_summary, state.resolved_value);
        assert!(state.messages.iter().any(|m| m.sender == "resolve_conflict"));
    }

    #[tokio::test]
    async fn no_conflict_skips_resolution() {
        let agent = ScriptedAgent::default();
        let engine = engine(&agent);

        let id = engine.start(request("q")).await.unwrap();
        let state = engine.get_state(id).await.unwrap();
        assert!(!state.messages.iter().any(|m| m.sender == "resolve_conflict"));
    }

    // --- Unresolved errors in checkpoints ---

    /// Persist a created workflow as if it crashed right after `node` failed.
    async fn seed_failure(engine: &TestEngine, node: NodeId, kind: FailureKind) -> Uuid {
        let mut state = engine.create(request("q")).await.unwrap();
        state.session_id = Some(format!("session_{}", state.workflow_id.simple()));
        state.current_node = Some(node);
        state.error_message = Some(format!("{node} failed: connection reset"));
        state.error_source_node = Some(ErrorSource::Node(node));
        state.error_detail = Some(ErrorDetail { kind, detail: None });
        engine.checkpoint.put(&state).await.unwrap();
        state.workflow_id
    }

    #[tokio::test]
    async fn persisted_transient_error_is_retried_through_handler() {
        let agent = ScriptedAgent::default();
        let engine = engine(&agent);
        let id = seed_failure(&engine, NodeId::FormulateQueries, FailureKind::Transient).await;

        let state = engine.run(id).await.unwrap();

        assert_eq!(state.workflow_outcome, WorkflowOutcome::Success);
        assert!(state.error_message.is_none());
        assert!(state.error_source_node.is_none());
        assert!(state.error_detail.is_none());
        assert_eq!(state.retries_for(NodeId::FormulateQueries), 1);
        assert_eq!(agent.calls("formulate_queries"), 1);
        assert!(state.messages.iter().any(|m| m.sender == ERROR_HANDLER
            && m.content["chosen_strategy"] == "RETRY_NODE"));
    }

    #[tokio::test]
    async fn persisted_error_at_retry_limit_terminates_without_running() {
        let agent = ScriptedAgent::default();
        let engine = engine(&agent);
        let id = seed_failure(&engine, NodeId::Search, FailureKind::Transient).await;
        let mut state = engine.get_state(id).await.unwrap();
        state.retry_attempts.insert(NodeId::Search, MAX_RETRIES);
        engine.checkpoint.put(&state).await.unwrap();

        let state = engine.run(id).await.unwrap();

        assert_eq!(state.workflow_outcome, WorkflowOutcome::MaxRetriesReached);
        assert_eq!(agent.calls("search"), 0);
        let stored = engine.get_state(id).await.unwrap();
        assert_eq!(stored.workflow_outcome, WorkflowOutcome::MaxRetriesReached);
        assert!(stored.current_node.is_none());
    }

    #[tokio::test]
    async fn persisted_validation_error_is_terminal() {
        let agent = ScriptedAgent::default();
        let engine = engine(&agent);
        let id = seed_failure(&engine, NodeId::FormulateQueries, FailureKind::Validation).await;

        let state = engine.run(id).await.unwrap();

        assert_eq!(state.workflow_outcome, WorkflowOutcome::Error);
        assert!(state.current_node.is_none());
        assert!(state.retry_attempts.is_empty());
        assert_eq!(agent.calls("formulate_queries"), 0);
    }

    // --- Human evaluation of directions ---

    #[tokio::test]
    async fn hitl_evaluation_suspends_and_routes_on_human_verdict() {
        let agent = ScriptedAgent::default();
        let engine = engine(&agent);
        let mut req = request("q");
        req.config.hitl_evaluation_active = true;

        let id = engine.start(req).await.unwrap();
        let suspended = engine.get_state(id).await.unwrap();

        assert_eq!(suspended.workflow_outcome, WorkflowOutcome::WaitingForReview);
        assert_eq!(suspended.current_node, Some(NodeId::Evaluate));
        assert_eq!(suspended.iteration_count, 1);
        let prompt = suspended.input_prompt.clone().unwrap();
        assert_eq!(prompt.interrupt_type, DIRECTIONS_EVALUATION_REQUIRED);
        assert_eq!(prompt.iteration, Some(1));
        assert!(!prompt.directions.is_empty());
        assert_eq!(agent.calls("evaluate"), 0);

        // Shortlist input does not answer an evaluation prompt.
        assert!(matches!(
            engine.resume(id, ReviewInput::shortlist(vec![])).await,
            Err(EngineError::InvalidResumeState { .. })
        ));

        // A low verdict goes through refinement and asks again.
        let low = Evaluation {
            assessments: prompt
                .directions
                .iter()
                .map(|d| DirectionAssessment {
                    direction_id: d.direction_id.clone(),
                    score: 0.4,
                    critique: "narrow the scope".into(),
                })
                .collect(),
            accept_as_is: false,
            skipped: false,
        };
        let again = engine.resume(id, ReviewInput::evaluation(low)).await.unwrap();
        assert!(again.is_waiting_for_input);
        assert_eq!(again.current_node, Some(NodeId::Evaluate));
        assert_eq!(again.iteration_count, 2);
        assert_eq!(agent.calls("refine_directions"), 1);

        let accept = Evaluation {
            accept_as_is: true,
            ..Default::default()
        };
        let done = engine.resume(id, ReviewInput::evaluation(accept)).await.unwrap();

        assert_eq!(done.workflow_outcome, WorkflowOutcome::Success);
        assert_eq!(done.final_report.as_ref().unwrap().total_iterations, 2);
        assert_eq!(agent.calls("evaluate"), 0);
        assert_eq!(agent.calls("refine_directions"), 1);
        assert!(done.messages.len() > again.messages.len());
    }

    // --- Cancellation, timeouts, panics ---

    #[tokio::test]
    async fn cancel_suspended_workflow() {
        let agent = ScriptedAgent::default();
        let engine = engine(&agent);
        let id = engine.start(hitl_request("q")).await.unwrap();

        assert_eq!(engine.cancel(id).await.unwrap(), CancelOutcome::Cancelled);
        let state = engine.get_state(id).await.unwrap();
        assert_eq!(state.workflow_outcome, WorkflowOutcome::Cancelled);
        assert!(!state.is_waiting_for_input);
        assert_eq!(state.messages.last().unwrap().sender, ENGINE);

        assert!(matches!(
            engine
                .resume(
                    id,
                    ReviewInput::shortlist(vec![])
                )
                .await,
            Err(EngineError::InvalidResumeState { .. })
        ));
        assert_eq!(
            engine.cancel(id).await.unwrap(),
            CancelOutcome::AlreadyTerminal(WorkflowOutcome::Cancelled)
        );
    }

    #[tokio::test]
    async fn cancel_in_flight_run() {
        let agent = ScriptedAgent::default().hang_on("analyze_literature");
        let engine = Arc::new(engine(&agent));
        let created = engine.create(request("q")).await.unwrap();
        let id = created.workflow_id;

        let runner = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.run(id).await })
        };

        while agent.calls("analyze_literature") == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(engine.is_running(id));
        assert!(matches!(engine.run(id).await, Err(EngineError::AlreadyRunning(_))));

        assert_eq!(engine.cancel(id).await.unwrap(), CancelOutcome::Signalled);
        let state = runner.await.unwrap().unwrap();

        assert_eq!(state.workflow_outcome, WorkflowOutcome::Cancelled);
        assert!(state.error_message.is_none());
        assert!(!engine.is_running(id));
        assert_eq!(engine.get_state(id).await.unwrap(), state);
        assert_eq!(agent.calls("identify_gaps"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_collaborator_times_out_and_exhausts_retries() {
        let agent = ScriptedAgent::default().hang_on("identify_gaps");
        let engine = engine(&agent);

        let mut req = request("q");
        req.config.collaborator_timeout_secs = 1;
        let id = engine.start(req).await.unwrap();
        let state = engine.get_state(id).await.unwrap();

        assert_eq!(state.workflow_outcome, WorkflowOutcome::MaxRetriesReached);
        assert_eq!(state.retries_for(NodeId::IdentifyGaps), MAX_RETRIES);
        assert_eq!(agent.calls("identify_gaps"), 3);
        assert!(state.error_message.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn panicking_node_is_an_engine_error() {
        let agent = ScriptedAgent::default().panic_on("generate_directions");
        let engine = engine(&agent);

        let id = engine.start(request("q")).await.unwrap();
        let state = engine.get_state(id).await.unwrap();

        assert_eq!(state.workflow_outcome, WorkflowOutcome::Error);
        assert_eq!(state.error_source_node, Some(ErrorSource::Engine));
        let message = state.error_message.clone().unwrap();
        assert!(message.contains("generate_directions"));
        assert!(!message.contains("scripted panic"));
        let detail = state.error_detail.unwrap();
        assert_eq!(detail.kind, FailureKind::Internal);
        assert!(detail.detail.unwrap().contains("scripted panic"));
        assert!(state.retry_attempts.is_empty());
    }

    // --- Engine API ---

    #[tokio::test]
    async fn unknown_workflow_is_not_found() {
        let engine = engine(&ScriptedAgent::default());
        let id = Uuid::now_v7();
        assert!(matches!(engine.get_state(id).await, Err(EngineError::NotFound(x)) if x == id));
        assert!(matches!(engine.run(id).await, Err(EngineError::NotFound(_))));
        assert!(!engine.is_running(id));
    }

    #[tokio::test]
    async fn get_state_is_idempotent() {
        let engine = engine(&ScriptedAgent::default());
        let id = engine.start(hitl_request("q")).await.unwrap();

        let first = engine.get_state(id).await.unwrap();
        let second = engine.get_state(id).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn concurrent_workflows_are_independent() {
        let agent = ScriptedAgent::default();
        let engine = Arc::new(engine(&agent));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.start(request(&format!("topic {i}"))).await })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }

        for (i, id) in ids.iter().enumerate() {
            let state = engine.get_state(*id).await.unwrap();
            assert_eq!(state.research_query, format!("topic {i}"));
            assert_eq!(state.workflow_outcome, WorkflowOutcome::Success);
            assert!(
                state
                    .messages
                    .iter()
                    .all(|m| m.conversation_id == state.session_id.clone().unwrap()
                        || m.conversation_id == state.workflow_id.to_string())
            );
        }
        assert_eq!(engine.list(10).await.unwrap().len(), 4);
    }
}
