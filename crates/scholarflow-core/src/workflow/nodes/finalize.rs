//! Terminal stage: build the final report and settle the outcome.

use serde_json::json;

use scholarflow_types::research::{FinalReport, IngestionSummary};
use scholarflow_types::state::{NodeId, WorkflowOutcome, WorkflowState};

use crate::workflow::node::{Node, NodeContext, NodeOutcome};
use crate::workflow::router::{RefinementDecision, refinement_decision};

use super::result_message;

pub struct Finalize;

impl Finalize {
    fn outcome(state: &WorkflowState) -> WorkflowOutcome {
        match refinement_decision(state) {
            RefinementDecision::IterationCap => WorkflowOutcome::MaxIterationsReached,
            RefinementDecision::Accepted
            | RefinementDecision::ScoreThreshold
            | RefinementDecision::Continue => WorkflowOutcome::Success,
        }
    }

    fn report(state: &WorkflowState, outcome: WorkflowOutcome) -> FinalReport {
        FinalReport {
            research_query: state.research_query.clone(),
            formulated_queries: state.formulated_queries.clone().unwrap_or_default(),
            scored_results: state.scored_results.clone().unwrap_or_default(),
            initial_shortlist: state.initial_shortlist.clone().unwrap_or_default(),
            confirmed_shortlist: state.confirmed_shortlist.clone().unwrap_or_default(),
            ingestion: state
                .ingestion_reports
                .as_deref()
                .map(IngestionSummary::from_reports)
                .unwrap_or_default(),
            literature_summary: state.literature_summary.clone(),
            identified_gaps: state.identified_gaps.clone().unwrap_or_default(),
            final_directions: state.current_directions().to_vec(),
            last_evaluation: state.evaluation.clone(),
            total_iterations: state.iteration_count,
            outcome,
        }
    }
}

impl Node for Finalize {
    fn id(&self) -> NodeId {
        NodeId::Finalize
    }

    async fn execute(&self, state: &WorkflowState, _ctx: &NodeContext<'_>) -> NodeOutcome {
        let outcome = Self::outcome(state);
        let report = Self::report(state, outcome);

        let mut delta = result_message(
            state,
            NodeId::Finalize,
            json!({
                "status": outcome.as_str(),
                "total_iterations": report.total_iterations,
                "direction_count": report.final_directions.len(),
                "confirmed_papers": report.confirmed_shortlist.len(),
            }),
        );
        delta.final_report = Some(report);
        delta.workflow_outcome = Some(outcome);
        NodeOutcome::Continue(delta)
    }
}
