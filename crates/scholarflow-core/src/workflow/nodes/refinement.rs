//! Gap identification, direction generation, and the evaluate/refine loop.

use serde_json::json;

use scholarflow_types::message::Performative;
use scholarflow_types::research::Evaluation;
use scholarflow_types::state::{
    MAX_ITERATIONS_REFINE, NodeId, REFINEMENT_SCORE_THRESHOLD, WorkflowState,
};

use crate::workflow::delta::StateDelta;
use crate::workflow::interrupt::{HUMAN_REVIEWER, InterruptController};
use crate::workflow::node::{Node, NodeContext, NodeFailure, NodeOutcome, node_message};

use super::{result_message, skipped};

// ---------------------------------------------------------------------------
// IdentifyGaps
// ---------------------------------------------------------------------------

pub struct IdentifyGaps;

impl Node for IdentifyGaps {
    fn id(&self) -> NodeId {
        NodeId::IdentifyGaps
    }

    async fn execute(&self, state: &WorkflowState, ctx: &NodeContext<'_>) -> NodeOutcome {
        let Some(summary) = &state.literature_summary else {
            let delta = StateDelta {
                identified_gaps: Some(Vec::new()),
                ..Default::default()
            };
            return NodeOutcome::Continue(skipped(
                state,
                NodeId::IdentifyGaps,
                delta,
                "skipped_no_literature_summary",
            ));
        };

        let gaps = ctx
            .call(
                "identify_gaps",
                ctx.collaborators
                    .query_agent
                    .identify_gaps(&summary.overall_summary, &summary.key_themes),
            )
            .await;

        match gaps {
            Ok(gaps) => {
                let mut delta = result_message(
                    state,
                    NodeId::IdentifyGaps,
                    json!({ "status": "success", "gap_count": gaps.len() }),
                );
                delta.identified_gaps = Some(gaps);
                NodeOutcome::Continue(delta)
            }
            Err(err) => NodeOutcome::fail(
                state,
                NodeId::IdentifyGaps,
                NodeFailure::from_collaborator("identify_gaps", &err),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// GenerateDirections
// ---------------------------------------------------------------------------

pub struct GenerateDirections;

impl Node for GenerateDirections {
    fn id(&self) -> NodeId {
        NodeId::GenerateDirections
    }

    async fn execute(&self, state: &WorkflowState, ctx: &NodeContext<'_>) -> NodeOutcome {
        let gaps = state.identified_gaps.as_deref().unwrap_or_default();
        if gaps.is_empty() {
            let delta = StateDelta {
                generated_directions: Some(Vec::new()),
                ..Default::default()
            };
            return NodeOutcome::Continue(skipped(
                state,
                NodeId::GenerateDirections,
                delta,
                "skipped_no_gaps",
            ));
        }

        let gaps_summary = gaps
            .iter()
            .map(|g| format!("{}: {}", g.title, g.description))
            .collect::<Vec<_>>()
            .join("\n");

        let directions = ctx
            .call(
                "generate_directions",
                ctx.collaborators
                    .query_agent
                    .generate_directions(&gaps_summary, gaps),
            )
            .await;

        match directions {
            Ok(directions) => {
                let mut delta = result_message(
                    state,
                    NodeId::GenerateDirections,
                    json!({ "status": "success", "direction_count": directions.len() }),
                );
                delta.generated_directions = Some(directions);
                NodeOutcome::Continue(delta)
            }
            Err(err) => NodeOutcome::fail(
                state,
                NodeId::GenerateDirections,
                NodeFailure::from_collaborator("generate_directions", &err),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluate
// ---------------------------------------------------------------------------

/// Scores the current directions and advances the iteration counter.
///
/// The counter saturates at `MAX_ITERATIONS_REFINE` and is only advanced on
/// success, so a retried evaluation does not count twice. With
/// `hitl_evaluation_active` the directions go to a human reviewer instead of
/// the review agent and the workflow suspends until the verdict arrives.
pub struct Evaluate;

impl Node for Evaluate {
    fn id(&self) -> NodeId {
        NodeId::Evaluate
    }

    async fn execute(&self, state: &WorkflowState, ctx: &NodeContext<'_>) -> NodeOutcome {
        let iteration = (state.iteration_count + 1).min(MAX_ITERATIONS_REFINE);
        let directions = state.current_directions();

        if directions.is_empty() {
            let delta = StateDelta {
                evaluation: Some(Evaluation {
                    assessments: Vec::new(),
                    accept_as_is: true,
                    skipped: true,
                }),
                iteration_count: Some(iteration),
                ..Default::default()
            };
            return NodeOutcome::Continue(skipped(
                state,
                NodeId::Evaluate,
                delta,
                "skipped_no_directions",
            ));
        }

        if let Some(prompt) = InterruptController::evaluation_prompt(state, iteration) {
            tracing::info!(
                workflow_id = %state.workflow_id,
                iteration,
                directions = prompt.directions.len(),
                "directions awaiting human evaluation"
            );
            let message = node_message(
                state,
                NodeId::Evaluate,
                Performative::RequestAction,
                json!({
                    "status": "awaiting_evaluation",
                    "interrupt_type": prompt.interrupt_type,
                    "iteration": iteration,
                    "directions": prompt.directions.len(),
                }),
            )
            .to(HUMAN_REVIEWER);
            let delta = StateDelta {
                iteration_count: Some(iteration),
                ..Default::default()
            }
            .message(message);
            return NodeOutcome::Suspend(delta, prompt);
        }

        let evaluation = ctx
            .call(
                "evaluate",
                ctx.collaborators
                    .review_agent
                    .evaluate(directions, state.literature_summary.as_ref()),
            )
            .await;

        let evaluation = match evaluation {
            Ok(e) => e,
            Err(err) => {
                return NodeOutcome::fail(
                    state,
                    NodeId::Evaluate,
                    NodeFailure::from_collaborator("evaluate", &err),
                );
            }
        };

        let score = evaluation.quality_score();
        tracing::info!(
            workflow_id = %state.workflow_id,
            iteration,
            score,
            accept_as_is = evaluation.accept_as_is,
            "directions evaluated"
        );

        let mut delta = result_message(
            state,
            NodeId::Evaluate,
            json!({
                "status": "success",
                "iteration": iteration,
                "quality_score": score,
                "accept_as_is": evaluation.accept_as_is,
                "assessed": evaluation.assessments.len(),
            }),
        );
        delta.evaluation = Some(evaluation);
        delta.iteration_count = Some(iteration);
        NodeOutcome::Continue(delta)
    }
}

// ---------------------------------------------------------------------------
// Refine
// ---------------------------------------------------------------------------

/// Feedback text from assessments scoring below the refinement threshold.
fn feedback(evaluation: Option<&Evaluation>) -> String {
    evaluation
        .map(|e| {
            e.assessments
                .iter()
                .filter(|a| a.score < REFINEMENT_SCORE_THRESHOLD && !a.critique.trim().is_empty())
                .map(|a| format!("- {} ({:.2}): {}", a.direction_id, a.score, a.critique.trim()))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

pub struct Refine;

impl Node for Refine {
    fn id(&self) -> NodeId {
        NodeId::Refine
    }

    async fn execute(&self, state: &WorkflowState, ctx: &NodeContext<'_>) -> NodeOutcome {
        let current = state.current_directions();
        let feedback = feedback(state.evaluation.as_ref());

        if current.is_empty() || feedback.is_empty() {
            let delta = StateDelta {
                refined_directions: Some(current.to_vec()),
                ..Default::default()
            };
            return NodeOutcome::Continue(skipped(
                state,
                NodeId::Refine,
                delta,
                "passthrough_no_feedback",
            ));
        }

        let refined = ctx
            .call(
                "refine_directions",
                ctx.collaborators
                    .query_agent
                    .refine_directions(current, &feedback),
            )
            .await;

        let refined = match refined {
            Ok(r) => r,
            Err(err) => {
                return NodeOutcome::fail(
                    state,
                    NodeId::Refine,
                    NodeFailure::from_collaborator("refine_directions", &err),
                );
            }
        };

        let (directions, status) = if refined.is_empty() {
            tracing::warn!(
                workflow_id = %state.workflow_id,
                "refinement returned no directions, keeping current set"
            );
            (current.to_vec(), "passthrough_empty_refinement")
        } else {
            (refined, "success")
        };

        let mut delta = result_message(
            state,
            NodeId::Refine,
            json!({
                "status": status,
                "iteration": state.iteration_count,
                "direction_count": directions.len(),
            }),
        );
        delta.refined_directions = Some(directions);
        NodeOutcome::Continue(delta)
    }
}
