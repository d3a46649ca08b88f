//! Literature search, relevance scoring, and shortlist construction.

use std::collections::HashSet;

use futures_util::future::join_all;
use serde_json::json;

use scholarflow_types::research::{Paper, ScoredPaper};
use scholarflow_types::state::{NodeId, WorkflowState};

use crate::collaborator::{CollaboratorError, SearchRequest};
use crate::workflow::delta::StateDelta;
use crate::workflow::node::{Node, NodeContext, NodeFailure, NodeOutcome};

use super::{result_message, skipped};

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Runs every formulated query against the search service.
///
/// Queries run concurrently. A failing query is logged and recorded; the stage
/// fails only when every query failed.
pub struct Search;

impl Node for Search {
    fn id(&self) -> NodeId {
        NodeId::Search
    }

    async fn execute(&self, state: &WorkflowState, ctx: &NodeContext<'_>) -> NodeOutcome {
        let requests: Vec<SearchRequest> = state
            .formulated_queries
            .iter()
            .flatten()
            .filter(|q| !q.query_string.trim().is_empty())
            .map(|q| SearchRequest {
                query: q.query_string.trim().to_string(),
                max_results: state.config.max_results_per_query,
                sort_by: state.config.search_sort_by.clone(),
                sort_order: state.config.search_sort_order.clone(),
            })
            .collect();

        if requests.is_empty() {
            let delta = StateDelta {
                search_results: Some(Vec::new()),
                ..Default::default()
            };
            return NodeOutcome::Continue(skipped(
                state,
                NodeId::Search,
                delta,
                "skipped_no_valid_queries",
            ));
        }

        let responses = join_all(
            requests
                .iter()
                .map(|r| ctx.call("search", ctx.collaborators.search.search(r))),
        )
        .await;

        let mut seen = HashSet::new();
        let mut papers: Vec<Paper> = Vec::new();
        let mut failed_queries = Vec::new();
        let mut first_error: Option<CollaboratorError> = None;

        for (request, response) in requests.iter().zip(responses) {
            match response {
                Ok(found) => {
                    for paper in found {
                        if seen.insert(paper.id.clone()) {
                            papers.push(paper);
                        }
                    }
                }
                Err(CollaboratorError::Cancelled) => {
                    return NodeOutcome::fail(
                        state,
                        NodeId::Search,
                        NodeFailure::from_collaborator("search", &CollaboratorError::Cancelled),
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        workflow_id = %state.workflow_id,
                        query = %request.query,
                        error = %err,
                        "search query failed"
                    );
                    failed_queries.push(json!({ "query": request.query, "error": err.to_string() }));
                    first_error.get_or_insert(err);
                }
            }
        }

        if failed_queries.len() == requests.len() {
            if let Some(err) = first_error {
                let mut failure = NodeFailure::from_collaborator("search", &err);
                failure.message = format!("all {} search queries failed: {err}", requests.len());
                return NodeOutcome::fail(state, NodeId::Search, failure);
            }
        }

        let status = if papers.is_empty() {
            "success_no_results_found"
        } else {
            "success_found_results"
        };

        tracing::info!(
            workflow_id = %state.workflow_id,
            queries = requests.len(),
            failed = failed_queries.len(),
            papers = papers.len(),
            "search completed"
        );

        let mut delta = result_message(
            state,
            NodeId::Search,
            json!({
                "status": status,
                "query_count": requests.len(),
                "result_count": papers.len(),
                "failed_queries": failed_queries,
            }),
        );
        delta.search_results = Some(papers);
        NodeOutcome::Continue(delta)
    }
}

// ---------------------------------------------------------------------------
// ScoreRelevance
// ---------------------------------------------------------------------------

/// Scores every search result against the research query.
///
/// A paper whose assessment fails, or that the agent did not assess, scores
/// zero. The stage fails only when every assessment failed.
pub struct ScoreRelevance;

impl Node for ScoreRelevance {
    fn id(&self) -> NodeId {
        NodeId::ScoreRelevance
    }

    async fn execute(&self, state: &WorkflowState, ctx: &NodeContext<'_>) -> NodeOutcome {
        let papers = state.search_results.as_deref().unwrap_or_default();
        if papers.is_empty() {
            let delta = StateDelta {
                scored_results: Some(Vec::new()),
                ..Default::default()
            };
            return NodeOutcome::Continue(skipped(
                state,
                NodeId::ScoreRelevance,
                delta,
                "skipped_no_raw_results",
            ));
        }

        let topic = state.research_query.trim();
        let assessments = join_all(papers.iter().map(|paper| {
            ctx.call(
                "assess_relevance",
                ctx.collaborators.query_agent.assess_relevance(paper, topic),
            )
        }))
        .await;

        let mut scored = Vec::with_capacity(papers.len());
        let mut failures = 0usize;
        let mut first_error: Option<CollaboratorError> = None;

        for (paper, assessment) in papers.iter().zip(assessments) {
            let (score, is_relevant) = match assessment {
                Ok(list) => list
                    .into_iter()
                    .find(|a| a.paper_id == paper.id)
                    .map_or((0.0, false), |a| (a.score.clamp(0.0, 1.0), a.is_relevant)),
                Err(CollaboratorError::Cancelled) => {
                    return NodeOutcome::fail(
                        state,
                        NodeId::ScoreRelevance,
                        NodeFailure::from_collaborator(
                            "assess_relevance",
                            &CollaboratorError::Cancelled,
                        ),
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        workflow_id = %state.workflow_id,
                        paper_id = %paper.id,
                        error = %err,
                        "relevance assessment failed, scoring zero"
                    );
                    failures += 1;
                    first_error.get_or_insert(err);
                    (0.0, false)
                }
            };
            scored.push(ScoredPaper {
                paper: paper.clone(),
                relevance_score: score,
                is_relevant,
            });
        }

        if failures == papers.len() {
            if let Some(err) = first_error {
                return NodeOutcome::fail(
                    state,
                    NodeId::ScoreRelevance,
                    NodeFailure::from_collaborator("assess_relevance", &err),
                );
            }
        }

        let relevant = scored.iter().filter(|p| p.is_relevant).count();
        let mut delta = result_message(
            state,
            NodeId::ScoreRelevance,
            json!({
                "status": "success",
                "scored": scored.len(),
                "relevant": relevant,
                "assessment_failures": failures,
            }),
        );
        delta.scored_results = Some(scored);
        NodeOutcome::Continue(delta)
    }
}

// ---------------------------------------------------------------------------
// BuildShortlist
// ---------------------------------------------------------------------------

/// Keeps papers scoring at or above the relevance threshold, best first.
pub struct BuildShortlist;

impl Node for BuildShortlist {
    fn id(&self) -> NodeId {
        NodeId::BuildShortlist
    }

    async fn execute(&self, state: &WorkflowState, _ctx: &NodeContext<'_>) -> NodeOutcome {
        let threshold = state.config.relevance_threshold;
        let scored = state.scored_results.as_deref().unwrap_or_default();

        let mut shortlist: Vec<ScoredPaper> = scored
            .iter()
            .filter(|p| p.relevance_score >= threshold)
            .cloned()
            .collect();
        shortlist.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));

        let mut delta = result_message(
            state,
            NodeId::BuildShortlist,
            json!({
                "status": if scored.is_empty() { "skipped_no_scored_results" } else { "success" },
                "threshold": threshold,
                "considered": scored.len(),
                "shortlisted": shortlist.len(),
            }),
        );
        delta.initial_shortlist = Some(shortlist);
        NodeOutcome::Continue(delta)
    }
}
