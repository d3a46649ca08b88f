//! Literature analysis and conflict resolution.

use std::collections::BTreeSet;

use serde_json::json;

use scholarflow_types::message::Performative;
use scholarflow_types::research::{IngestionSummary, LiteratureSummary};
use scholarflow_types::state::{NodeId, WorkflowState};

use crate::collaborator::CollaboratorError;
use crate::workflow::delta::StateDelta;
use crate::workflow::node::{Node, NodeContext, NodeFailure, NodeOutcome, node_message};

use super::{result_message, skipped};

/// Collection holding the documents ingested for a session.
pub fn collection_ref(session_id: &str) -> String {
    format!("session_{session_id}_papers")
}

fn theme_set(summary: &LiteratureSummary) -> BTreeSet<String> {
    summary
        .key_themes
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// AnalyzeLiterature
// ---------------------------------------------------------------------------

/// Summarizes the ingested documents.
///
/// With `cross_check_analysis` enabled, two independent passes run
/// concurrently; if their theme sets differ both are kept as conflicting
/// candidates and `conflict_detected` is raised.
pub struct AnalyzeLiterature;

impl Node for AnalyzeLiterature {
    fn id(&self) -> NodeId {
        NodeId::AnalyzeLiterature
    }

    async fn execute(&self, state: &WorkflowState, ctx: &NodeContext<'_>) -> NodeOutcome {
        let ingested = state
            .ingestion_reports
            .as_deref()
            .map_or(0, |r| IngestionSummary::from_reports(r).processed);

        if ingested == 0 {
            let delta = StateDelta {
                conflict_detected: Some(false),
                ..Default::default()
            };
            return NodeOutcome::Continue(skipped(
                state,
                NodeId::AnalyzeLiterature,
                delta,
                "skipped_no_ingested_documents",
            ));
        }

        let Some(session_id) = state.session_id.as_deref() else {
            return NodeOutcome::fail(
                state,
                NodeId::AnalyzeLiterature,
                NodeFailure::validation("session id missing; workflow was not initialized"),
            );
        };

        let topic = state.research_query.trim();
        let collection = collection_ref(session_id);
        let agent = &ctx.collaborators.query_agent;
        let cross_check = state.config.cross_check_analysis;

        let (primary, secondary) = if cross_check {
            let (a, b) = tokio::join!(
                ctx.call("analyze_literature", agent.analyze_literature(topic, &collection)),
                ctx.call("analyze_literature", agent.analyze_literature(topic, &collection)),
            );
            (a, Some(b))
        } else {
            (
                ctx.call("analyze_literature", agent.analyze_literature(topic, &collection))
                    .await,
                None,
            )
        };

        let mut delta = StateDelta::new();
        let summary = match (primary, secondary) {
            (Ok(a), Some(Ok(b))) if theme_set(&a) != theme_set(&b) => {
                tracing::info!(
                    workflow_id = %state.workflow_id,
                    "analysis passes disagree on key themes"
                );
                delta.conflict_detected = Some(true);
                delta.conflicting_candidates = Some(vec![a, b]);
                None
            }
            (Ok(a), _) => Some(a),
            (Err(err), Some(Ok(b))) if !matches!(err, CollaboratorError::Cancelled) => {
                tracing::warn!(
                    workflow_id = %state.workflow_id,
                    error = %err,
                    "primary analysis pass failed, using cross-check pass"
                );
                Some(b)
            }
            (Err(err), _) => {
                return NodeOutcome::fail(
                    state,
                    NodeId::AnalyzeLiterature,
                    NodeFailure::from_collaborator("analyze_literature", &err),
                );
            }
        };

        let conflict = summary.is_none();
        let theme_count = summary.as_ref().map_or(0, |s| s.key_themes.len());
        if let Some(summary) = summary {
            delta.literature_summary = Some(summary);
            delta.conflict_detected = Some(false);
            delta.conflicting_candidates = Some(Vec::new());
        }

        delta.push_message(node_message(
            state,
            NodeId::AnalyzeLiterature,
            Performative::InformResult,
            json!({
                "status": "success",
                "collection_ref": collection,
                "documents": ingested,
                "theme_count": theme_count,
                "cross_checked": cross_check,
                "conflict_detected": conflict,
            }),
        ));
        NodeOutcome::Continue(delta)
    }
}

// ---------------------------------------------------------------------------
// ResolveConflict
// ---------------------------------------------------------------------------

/// Resolution policy: first candidate, else the previously committed summary.
pub const RESOLUTION_STRATEGY: &str = "pick_first_or_fallback";

pub struct ResolveConflict;

impl Node for ResolveConflict {
    fn id(&self) -> NodeId {
        NodeId::ResolveConflict
    }

    async fn execute(&self, state: &WorkflowState, _ctx: &NodeContext<'_>) -> NodeOutcome {
        let (resolved, chosen) = match state.conflicting_candidates.first() {
            Some(first) => (Some(first.clone()), "first_candidate"),
            None => match &state.literature_summary {
                Some(prior) => (Some(prior.clone()), "prior_value"),
                None => (None, "none"),
            },
        };

        let mut delta = result_message(
            state,
            NodeId::ResolveConflict,
            json!({
                "status": "resolved",
                "strategy": RESOLUTION_STRATEGY,
                "chosen": chosen,
                "candidates": state.conflicting_candidates.len(),
            }),
        );
        delta.conflict_detected = Some(false);
        delta.conflicting_candidates = Some(Vec::new());
        delta.literature_summary = resolved.clone();
        delta.resolved_value = resolved;
        NodeOutcome::Continue(delta)
    }
}
