//! Human-in-the-loop interrupts: shortlist review and directions evaluation.
//!
//! The controller decides whether a stage continues on its own or suspends
//! for a human, and validates the external input that resumes a suspended
//! workflow. The engine keeps the cursor on the suspending node and, once the
//! input is applied, resolves that node's outgoing edge; the node itself never
//! re-executes.

use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use scholarflow_types::message::{AgentMessage, Performative};
use scholarflow_types::research::{Evaluation, ScoredPaper};
use scholarflow_types::state::{
    DIRECTIONS_EVALUATION_REQUIRED, InputPrompt, SHORTLIST_REVIEW_REQUIRED, WorkflowOutcome,
    WorkflowState,
};

use super::delta::StateDelta;

/// Sender name for messages recording human review input.
pub const HUMAN_REVIEWER: &str = "human_reviewer";

#[derive(Debug, Clone, PartialEq)]
pub enum ReviewDecision {
    /// Copy the initial shortlist into the confirmed shortlist and continue.
    AutoConfirm { reason: &'static str },
    /// Stop and wait for a reviewer.
    Suspend(InputPrompt),
}

/// External input resuming a suspended workflow.
///
/// Each variant answers one interrupt type; no other state field can be
/// changed through a resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewInput {
    Shortlist {
        confirmed_shortlist: Vec<ScoredPaper>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    Evaluation {
        evaluation: Evaluation,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
}

impl ReviewInput {
    pub fn shortlist(confirmed_shortlist: Vec<ScoredPaper>) -> Self {
        Self::Shortlist {
            confirmed_shortlist,
            note: None,
        }
    }

    pub fn evaluation(evaluation: Evaluation) -> Self {
        Self::Evaluation {
            evaluation,
            note: None,
        }
    }

    pub fn with_note(mut self, text: Option<String>) -> Self {
        match &mut self {
            Self::Shortlist { note, .. } | Self::Evaluation { note, .. } => *note = text,
        }
        self
    }

    /// Interrupt type this input answers.
    pub fn interrupt_type(&self) -> &'static str {
        match self {
            Self::Shortlist { .. } => SHORTLIST_REVIEW_REQUIRED,
            Self::Evaluation { .. } => DIRECTIONS_EVALUATION_REQUIRED,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ResumeError {
    #[error("workflow is not waiting for input (outcome: {0})")]
    NotWaiting(WorkflowOutcome),

    #[error("workflow has no shortlist awaiting review")]
    MissingShortlist,

    #[error("workflow is waiting for '{expected}', got '{got}'")]
    MismatchedInput { expected: String, got: &'static str },

    #[error("invalid evaluation: {0}")]
    InvalidEvaluation(String),
}

pub struct InterruptController;

impl InterruptController {
    /// Decide how to handle the shortlist built for `state`.
    pub fn review_shortlist(state: &WorkflowState) -> ReviewDecision {
        let shortlist = state.initial_shortlist.as_deref().unwrap_or_default();

        if !state.config.hitl_shortlist_review_active {
            return ReviewDecision::AutoConfirm {
                reason: "hitl_disabled",
            };
        }
        if shortlist.is_empty() {
            return ReviewDecision::AutoConfirm {
                reason: "empty_shortlist",
            };
        }

        ReviewDecision::Suspend(InputPrompt {
            interrupt_type: SHORTLIST_REVIEW_REQUIRED.to_string(),
            message: format!(
                "Please review {} papers for '{}'. Confirm the papers to ingest; \
                 papers left out are dropped.",
                shortlist.len(),
                state.research_query
            ),
            research_query: state.research_query.clone(),
            candidates: shortlist.to_vec(),
            directions: Vec::new(),
            literature_summary: None,
            iteration: None,
            requested_at: Utc::now(),
        })
    }

    /// Prompt for a human evaluation of the current directions, or `None`
    /// when the review agent should evaluate them.
    pub fn evaluation_prompt(state: &WorkflowState, iteration: u32) -> Option<InputPrompt> {
        let directions = state.current_directions();
        if !state.config.hitl_evaluation_active || directions.is_empty() {
            return None;
        }

        Some(InputPrompt {
            interrupt_type: DIRECTIONS_EVALUATION_REQUIRED.to_string(),
            message: format!(
                "Please evaluate {} research directions for '{}' (iteration {iteration}). \
                 Score each direction or accept them as they are.",
                directions.len(),
                state.research_query
            ),
            research_query: state.research_query.clone(),
            candidates: Vec::new(),
            directions: directions.to_vec(),
            literature_summary: state.literature_summary.clone(),
            iteration: Some(iteration),
            requested_at: Utc::now(),
        })
    }

    /// Validate resume input and build the delta that records it.
    pub fn resume_delta(
        state: &WorkflowState,
        input: ReviewInput,
    ) -> Result<StateDelta, ResumeError> {
        if !state.is_waiting_for_input || state.workflow_outcome != WorkflowOutcome::WaitingForReview
        {
            return Err(ResumeError::NotWaiting(state.workflow_outcome));
        }

        let expected = state
            .input_prompt
            .as_ref()
            .map_or(SHORTLIST_REVIEW_REQUIRED, |p| p.interrupt_type.as_str());
        if expected != input.interrupt_type() {
            return Err(ResumeError::MismatchedInput {
                expected: expected.to_string(),
                got: input.interrupt_type(),
            });
        }

        match input {
            ReviewInput::Shortlist {
                confirmed_shortlist,
                note,
            } => Self::shortlist_delta(state, confirmed_shortlist, note),
            ReviewInput::Evaluation { evaluation, note } => {
                Self::evaluation_delta(state, evaluation, note)
            }
        }
    }

    fn shortlist_delta(
        state: &WorkflowState,
        confirmed: Vec<ScoredPaper>,
        note: Option<String>,
    ) -> Result<StateDelta, ResumeError> {
        let Some(initial) = state.initial_shortlist.as_ref() else {
            return Err(ResumeError::MissingShortlist);
        };

        let confirmed_ids: Vec<&str> = confirmed.iter().map(|p| p.paper.id.as_str()).collect();
        let message = AgentMessage::new(
            state.conversation_id(),
            HUMAN_REVIEWER,
            Performative::ConfirmAction,
            json!({
                "status": "shortlist_confirmed",
                "reviewed": initial.len(),
                "confirmed": confirmed.len(),
                "confirmed_ids": confirmed_ids,
                "note": note,
            }),
        );

        Ok(StateDelta {
            confirmed_shortlist: Some(confirmed),
            ..Default::default()
        }
        .message(message))
    }

    fn evaluation_delta(
        state: &WorkflowState,
        mut evaluation: Evaluation,
        note: Option<String>,
    ) -> Result<StateDelta, ResumeError> {
        let known: HashSet<&str> = state
            .current_directions()
            .iter()
            .map(|d| d.direction_id.as_str())
            .collect();

        if evaluation.assessments.is_empty() && !evaluation.accept_as_is {
            return Err(ResumeError::InvalidEvaluation(
                "score at least one direction or accept them as they are".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for assessment in &evaluation.assessments {
            let id = assessment.direction_id.as_str();
            if !known.contains(id) {
                return Err(ResumeError::InvalidEvaluation(format!(
                    "unknown direction id '{id}'"
                )));
            }
            if !seen.insert(id) {
                return Err(ResumeError::InvalidEvaluation(format!(
                    "direction '{id}' assessed twice"
                )));
            }
            if !(0.0..=1.0).contains(&assessment.score) {
                return Err(ResumeError::InvalidEvaluation(format!(
                    "score for '{id}' must be within [0, 1], got {}",
                    assessment.score
                )));
            }
        }
        evaluation.skipped = false;

        let message = AgentMessage::new(
            state.conversation_id(),
            HUMAN_REVIEWER,
            Performative::ProvideFeedback,
            json!({
                "status": "directions_evaluated",
                "iteration": state.iteration_count,
                "quality_score": evaluation.quality_score(),
                "accept_as_is": evaluation.accept_as_is,
                "assessed": evaluation.assessments.len(),
                "note": note,
            }),
        );

        Ok(StateDelta {
            evaluation: Some(evaluation),
            ..Default::default()
        }
        .message(message))
    }

    /// Mark `state` as suspended with `prompt`.
    pub fn suspend(state: &mut WorkflowState, prompt: InputPrompt) {
        state.is_waiting_for_input = true;
        state.input_prompt = Some(prompt);
        state.workflow_outcome = WorkflowOutcome::WaitingForReview;
    }

    /// Clear the waiting flag after input has been applied.
    pub fn release(state: &mut WorkflowState) {
        state.is_waiting_for_input = false;
        state.input_prompt = None;
        state.workflow_outcome = WorkflowOutcome::Running;
    }
}
