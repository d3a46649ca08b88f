//! Research workflow service: the API the CLI (or any other frontend) drives.
//!
//! Clients never see the raw `WorkflowState`; every read returns the
//! [`WorkflowStatus`] projection or the final report.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use scholarflow_types::research::{Evaluation, FinalReport};
use scholarflow_types::state::{
    DIRECTIONS_EVALUATION_REQUIRED, SHORTLIST_REVIEW_REQUIRED, WorkflowConfig, WorkflowState,
};
use scholarflow_types::status::WorkflowStatus;

use crate::repository::checkpoint::CheckpointRepository;
use crate::workflow::checkpoint::CheckpointSummary;
use crate::workflow::engine::{CancelOutcome, Engine, EngineError, StartRequest};
use crate::workflow::graph::WorkflowGraph;
use crate::workflow::interrupt::ReviewInput;

/// Result of `get_results`: the report once finalized, else the current status.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ResultsView {
    Final(Box<FinalReport>),
    Pending(Box<WorkflowStatus>),
}

/// Service managing research workflows.
///
/// Generic over `R: CheckpointRepository` so the same logic runs against the
/// SQLite store in production and the in-memory store in tests.
pub struct ResearchService<R: CheckpointRepository> {
    engine: Arc<Engine<R>>,
    defaults: WorkflowConfig,
}

impl<R: CheckpointRepository> ResearchService<R> {
    /// - `engine`: shared engine (cloned into background runs)
    /// - `defaults`: config applied to new workflows unless overridden
    pub fn new(engine: Arc<Engine<R>>, defaults: WorkflowConfig) -> Self {
        Self { engine, defaults }
    }

    pub fn engine(&self) -> &Arc<Engine<R>> {
        &self.engine
    }

    pub fn graph(&self) -> &WorkflowGraph {
        self.engine.graph()
    }

    /// A start request for `query` carrying the service defaults.
    pub fn request(&self, query: impl Into<String>) -> StartRequest {
        StartRequest {
            config: self.defaults.clone(),
            ..StartRequest::new(query)
        }
    }

    /// Start a workflow and run it until it suspends or terminates.
    pub async fn start(&self, request: StartRequest) -> Result<WorkflowStatus, EngineError> {
        let workflow_id = self.engine.start(request).await?;
        self.get_status(workflow_id).await
    }

    /// Persist a new workflow without running it.
    pub async fn create(&self, request: StartRequest) -> Result<WorkflowStatus, EngineError> {
        let state = self.engine.create(request).await?;
        Ok(WorkflowStatus::from(&state))
    }

    /// Run a persisted workflow until it suspends or terminates.
    pub async fn run(&self, workflow_id: Uuid) -> Result<WorkflowStatus, EngineError> {
        let state = self.engine.run(workflow_id).await?;
        Ok(WorkflowStatus::from(&state))
    }

    pub async fn get_status(&self, workflow_id: Uuid) -> Result<WorkflowStatus, EngineError> {
        let state = self.engine.get_state(workflow_id).await?;
        Ok(WorkflowStatus::from(&state))
    }

    /// Confirm the papers named by `paper_ids` and resume the workflow.
    ///
    /// Ids are resolved against the workflow's scored results, so a reviewer
    /// may also pull in a paper that fell below the relevance threshold.
    /// Duplicate ids are dropped; an unknown id rejects the whole input.
    pub async fn submit_review_input(
        &self,
        workflow_id: Uuid,
        paper_ids: &[String],
        note: Option<String>,
    ) -> Result<WorkflowStatus, EngineError> {
        let state = self.waiting_state(workflow_id, SHORTLIST_REVIEW_REQUIRED).await?;

        let candidates = state.scored_results.as_deref().unwrap_or_default();
        let mut seen = HashSet::new();
        let mut confirmed = Vec::with_capacity(paper_ids.len());

        for id in paper_ids.iter().map(|id| id.trim()) {
            if !seen.insert(id) {
                continue;
            }
            let paper = candidates
                .iter()
                .find(|p| p.paper.id == id)
                .ok_or_else(|| EngineError::InvalidReviewInput(format!("unknown paper id '{id}'")))?;
            confirmed.push(paper.clone());
        }

        tracing::info!(
            workflow_id = %workflow_id,
            confirmed = confirmed.len(),
            "review input accepted"
        );

        let state = self
            .engine
            .resume(workflow_id, ReviewInput::shortlist(confirmed).with_note(note))
            .await?;
        Ok(WorkflowStatus::from(&state))
    }

    /// Submit a human verdict over the current research directions.
    ///
    /// The engine validates the assessments against the directions it asked
    /// about; the refinement router then decides between refine and finalize.
    pub async fn submit_evaluation(
        &self,
        workflow_id: Uuid,
        evaluation: Evaluation,
        note: Option<String>,
    ) -> Result<WorkflowStatus, EngineError> {
        self.waiting_state(workflow_id, DIRECTIONS_EVALUATION_REQUIRED)
            .await?;

        tracing::info!(
            workflow_id = %workflow_id,
            assessments = evaluation.assessments.len(),
            accept_as_is = evaluation.accept_as_is,
            "evaluation input accepted"
        );

        let state = self
            .engine
            .resume(workflow_id, ReviewInput::evaluation(evaluation).with_note(note))
            .await?;
        Ok(WorkflowStatus::from(&state))
    }

    /// Load a workflow that is suspended on an `interrupt_type` prompt.
    async fn waiting_state(
        &self,
        workflow_id: Uuid,
        interrupt_type: &str,
    ) -> Result<WorkflowState, EngineError> {
        let state = self.engine.get_state(workflow_id).await?;
        if !state.is_waiting_for_input {
            return Err(EngineError::InvalidResumeState {
                workflow_id,
                reason: format!(
                    "workflow is not waiting for input (outcome: {})",
                    state.workflow_outcome
                ),
            });
        }
        let waiting_for = state
            .input_prompt
            .as_ref()
            .map_or(SHORTLIST_REVIEW_REQUIRED, |p| p.interrupt_type.as_str());
        if waiting_for != interrupt_type {
            return Err(EngineError::InvalidResumeState {
                workflow_id,
                reason: format!("workflow is waiting for {waiting_for}, not {interrupt_type}"),
            });
        }
        Ok(state)
    }

    pub async fn get_results(&self, workflow_id: Uuid) -> Result<ResultsView, EngineError> {
        let state = self.engine.get_state(workflow_id).await?;
        Ok(match state.final_report.clone() {
            Some(report) => ResultsView::Final(Box::new(report)),
            None => ResultsView::Pending(Box::new(WorkflowStatus::from(&state))),
        })
    }

    pub async fn cancel(&self, workflow_id: Uuid) -> Result<CancelOutcome, EngineError> {
        self.engine.cancel(workflow_id).await
    }

    pub async fn list(&self, limit: u32) -> Result<Vec<CheckpointSummary>, EngineError> {
        self.engine.list(limit).await
    }
}
