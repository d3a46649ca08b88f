//! Shortlist review: auto-confirm or suspend for a human reviewer.

use serde_json::json;

use scholarflow_types::message::Performative;
use scholarflow_types::state::{NodeId, WorkflowState};

use crate::workflow::delta::StateDelta;
use crate::workflow::interrupt::{HUMAN_REVIEWER, InterruptController, ReviewDecision};
use crate::workflow::node::{Node, NodeContext, NodeOutcome, node_message};

pub struct ReviewShortlist;

impl Node for ReviewShortlist {
    fn id(&self) -> NodeId {
        NodeId::ReviewShortlist
    }

    async fn execute(&self, state: &WorkflowState, _ctx: &NodeContext<'_>) -> NodeOutcome {
        let shortlist = state.initial_shortlist.clone().unwrap_or_default();

        match InterruptController::review_shortlist(state) {
            ReviewDecision::AutoConfirm { reason } => {
                let message = node_message(
                    state,
                    NodeId::ReviewShortlist,
                    Performative::InformState,
                    json!({
                        "status": "auto_confirmed",
                        "reason": reason,
                        "confirmed": shortlist.len(),
                    }),
                );
                NodeOutcome::Continue(
                    StateDelta {
                        confirmed_shortlist: Some(shortlist),
                        ..Default::default()
                    }
                    .message(message),
                )
            }
            ReviewDecision::Suspend(prompt) => {
                tracing::info!(
                    workflow_id = %state.workflow_id,
                    candidates = prompt.candidates.len(),
                    "shortlist awaiting human review"
                );
                let message = node_message(
                    state,
                    NodeId::ReviewShortlist,
                    Performative::RequestAction,
                    json!({
                        "status": "awaiting_review",
                        "interrupt_type": prompt.interrupt_type,
                        "candidates": prompt.candidates.len(),
                    }),
                )
                .to(HUMAN_REVIEWER);
                NodeOutcome::Suspend(StateDelta::new().message(message), prompt)
            }
        }
    }
}
