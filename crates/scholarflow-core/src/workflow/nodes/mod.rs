//! The fourteen research pipeline stages.
//!
//! Each stage is a unit struct implementing [`Node`]. Collaborators reach a
//! node only through its `NodeContext`; every execution path appends at least
//! one message describing what happened, including skip paths.

mod analysis;
mod finalize;
mod ingest;
mod init;
mod refinement;
mod review;
mod search;

pub use analysis::{AnalyzeLiterature, ResolveConflict, collection_ref};
pub use finalize::Finalize;
pub use ingest::{Ingest, document_id};
pub use init::{FormulateQueries, Init};
pub use refinement::{Evaluate, GenerateDirections, IdentifyGaps, Refine};
pub use review::ReviewShortlist;
pub use search::{BuildShortlist, ScoreRelevance, Search};

use serde_json::Value;

use scholarflow_types::message::Performative;
use scholarflow_types::state::{NodeId, WorkflowState};

use super::delta::StateDelta;
use super::node::{Node, NodeDyn, node_message};

/// One instance of every pipeline stage, in pipeline order.
pub fn research_nodes() -> Vec<Box<dyn NodeDyn>> {
    vec![
        Box::new(Init),
        Box::new(FormulateQueries),
        Box::new(Search),
        Box::new(ScoreRelevance),
        Box::new(BuildShortlist),
        Box::new(ReviewShortlist),
        Box::new(Ingest),
        Box::new(AnalyzeLiterature),
        Box::new(ResolveConflict),
        Box::new(IdentifyGaps),
        Box::new(GenerateDirections),
        Box::new(Evaluate),
        Box::new(Refine),
        Box::new(Finalize),
    ]
}

/// Delta for a stage that had nothing to do: `delta` carries the stage's
/// empty default output, plus a status message naming why.
fn skipped(state: &WorkflowState, node: NodeId, delta: StateDelta, status: &str) -> StateDelta {
    tracing::info!(workflow_id = %state.workflow_id, node = %node, status, "stage skipped");
    delta.message(node_message(
        state,
        node,
        Performative::StatusUpdate,
        serde_json::json!({ "status": status }),
    ))
}

fn result_message(state: &WorkflowState, node: NodeId, content: Value) -> StateDelta {
    StateDelta::new().message(node_message(state, node, Performative::InformResult, content))
}
