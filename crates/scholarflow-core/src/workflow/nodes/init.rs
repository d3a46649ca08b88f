//! Workflow initialization and query formulation.

use serde_json::json;

use scholarflow_types::message::{AgentMessage, Performative};
use scholarflow_types::research::FormulatedQuery;
use scholarflow_types::state::{NodeId, WorkflowState};

use crate::workflow::delta::StateDelta;
use crate::workflow::node::{Node, NodeContext, NodeFailure, NodeOutcome};

use super::result_message;

/// Validates the request and assigns the session id.
pub struct Init;

impl Init {
    fn validate(state: &WorkflowState) -> Result<(), String> {
        if state.research_query.trim().is_empty() {
            return Err("research query must not be empty".to_string());
        }
        let threshold = state.config.relevance_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(format!(
                "relevance_threshold must be within [0, 1], got {threshold}"
            ));
        }
        if state.config.max_results_per_query == 0 {
            return Err("max_results_per_query must be at least 1".to_string());
        }
        if state.config.collaborator_timeout_secs == 0 {
            return Err("collaborator_timeout_secs must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Node for Init {
    fn id(&self) -> NodeId {
        NodeId::Init
    }

    async fn execute(&self, state: &WorkflowState, _ctx: &NodeContext<'_>) -> NodeOutcome {
        if let Err(reason) = Self::validate(state) {
            return NodeOutcome::fail(state, NodeId::Init, NodeFailure::validation(reason));
        }

        let session_id = state
            .session_id
            .clone()
            .unwrap_or_else(|| format!("session_{}", state.workflow_id.simple()));

        tracing::info!(
            workflow_id = %state.workflow_id,
            session_id = %session_id,
            hitl = state.config.hitl_shortlist_review_active,
            hitl_evaluation = state.config.hitl_evaluation_active,
            "research workflow initialized"
        );

        let message = AgentMessage::new(
            session_id.clone(),
            NodeId::Init.as_str(),
            Performative::InformState,
            json!({
                "status": "initialized",
                "research_query": state.research_query.trim(),
                "general_area": state.general_area,
                "hitl_shortlist_review_active": state.config.hitl_shortlist_review_active,
                "hitl_evaluation_active": state.config.hitl_evaluation_active,
            }),
        );

        NodeOutcome::Continue(
            StateDelta {
                session_id: Some(session_id),
                ..Default::default()
            }
            .message(message),
        )
    }
}

/// Asks the query agent for search queries covering the topic.
pub struct FormulateQueries;

impl Node for FormulateQueries {
    fn id(&self) -> NodeId {
        NodeId::FormulateQueries
    }

    async fn execute(&self, state: &WorkflowState, ctx: &NodeContext<'_>) -> NodeOutcome {
        let topic = state.research_query.trim();
        let formulation = ctx
            .call(
                "formulate_queries",
                ctx.collaborators
                    .query_agent
                    .formulate_queries(topic, state.general_area.as_deref()),
            )
            .await;

        let formulation = match formulation {
            Ok(f) => f,
            Err(err) => {
                return NodeOutcome::fail(
                    state,
                    NodeId::FormulateQueries,
                    NodeFailure::from_collaborator("formulate_queries", &err),
                );
            }
        };

        let queries: Vec<FormulatedQuery> = formulation
            .queries
            .into_iter()
            .filter(|q| !q.query_string.trim().is_empty())
            .collect();

        tracing::debug!(
            workflow_id = %state.workflow_id,
            count = queries.len(),
            "queries formulated"
        );

        let mut delta = result_message(
            state,
            NodeId::FormulateQueries,
            json!({
                "status": "success",
                "query_count": queries.len(),
                "original_topic": formulation.original_topic,
            }),
        );
        delta.formulated_queries = Some(queries);
        NodeOutcome::Continue(delta)
    }
}
