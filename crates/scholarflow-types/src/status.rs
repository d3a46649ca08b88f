//! Client-facing projection of a workflow's state.
//!
//! Polling clients receive a [`WorkflowStatus`], never the raw state: it
//! carries enough to diagnose a failure (`error_source_node`, `error_message`)
//! but omits internal error detail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::AgentMessage;
use crate::state::{InputPrompt, NodeId, WorkflowOutcome, WorkflowState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub workflow_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub research_query: String,
    pub outcome: WorkflowOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_node: Option<NodeId>,
    pub is_waiting_for_input: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_prompt: Option<InputPrompt>,
    pub iteration_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_source_node: Option<String>,
    pub counts: StageCounts,
    pub message_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<AgentMessage>,
    pub updated_at: DateTime<Utc>,
}

/// Item counts per pipeline stage (`None` while the stage has not run).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub formulated_queries: Option<usize>,
    pub search_results: Option<usize>,
    pub scored_results: Option<usize>,
    pub initial_shortlist: Option<usize>,
    pub confirmed_shortlist: Option<usize>,
    pub ingested: Option<usize>,
    pub identified_gaps: Option<usize>,
    pub directions: Option<usize>,
}

impl From<&WorkflowState> for WorkflowStatus {
    fn from(state: &WorkflowState) -> Self {
        let directions = state
            .refined_directions
            .as_ref()
            .or(state.generated_directions.as_ref())
            .map(Vec::len);

        Self {
            workflow_id: state.workflow_id,
            session_id: state.session_id.clone(),
            research_query: state.research_query.clone(),
            outcome: state.workflow_outcome,
            current_node: state.current_node,
            is_waiting_for_input: state.is_waiting_for_input,
            input_prompt: state.input_prompt.clone(),
            iteration_count: state.iteration_count,
            error_message: state.error_message.clone(),
            error_source_node: state.error_source_node.map(String::from),
            counts: StageCounts {
                formulated_queries: state.formulated_queries.as_ref().map(Vec::len),
                search_results: state.search_results.as_ref().map(Vec::len),
                scored_results: state.scored_results.as_ref().map(Vec::len),
                initial_shortlist: state.initial_shortlist.as_ref().map(Vec::len),
                confirmed_shortlist: state.confirmed_shortlist.as_ref().map(Vec::len),
                ingested: state
                    .ingestion_reports
                    .as_ref()
                    .map(|_| state.processed_paper_ids.len()),
                identified_gaps: state.identified_gaps.as_ref().map(Vec::len),
                directions,
            },
            message_count: state.messages.len(),
            last_message: state.messages.last().cloned(),
            updated_at: state.updated_at,
        }
    }
}
