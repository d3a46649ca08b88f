//! Document ingestion for the confirmed shortlist.
//!
//! Papers are processed one at a time. Each paper maps to a stable document
//! id, and ids of papers already stored are kept in `processed_paper_ids`, so
//! a retried ingestion only attempts the papers that did not make it.

use serde_json::json;

use scholarflow_types::research::{IngestionReport, IngestionStatus, IngestionSummary, ScoredPaper};
use scholarflow_types::state::{NodeId, WorkflowState};

use crate::collaborator::{CollaboratorError, IngestionReceipt};
use crate::workflow::delta::StateDelta;
use crate::workflow::node::{Node, NodeContext, NodeFailure, NodeOutcome, error_report};

use super::{result_message, skipped};

/// Stable document id for a paper.
pub fn document_id(paper_id: &str) -> String {
    let cleaned: String = paper_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    format!("doc_{cleaned}")
}

pub struct Ingest;

impl Ingest {
    async fn ingest_one(
        ctx: &NodeContext<'_>,
        session_id: &str,
        doc_id: &str,
        scored: &ScoredPaper,
        pdf_url: &str,
    ) -> Result<IngestionReceipt, CollaboratorError> {
        let paper = &scored.paper;
        let document = ctx
            .call("process_document", ctx.collaborators.documents.process(pdf_url))
            .await?;

        if document.cleaned_text.trim().is_empty() {
            return Err(CollaboratorError::Rejected(format!(
                "no text extracted from {pdf_url}"
            )));
        }

        let metadata = json!({
            "paper_id": paper.id,
            "title": paper.title,
            "authors": paper.authors,
            "published": paper.published,
            "pdf_url": pdf_url,
            "relevance_score": scored.relevance_score,
            "structure": document.structure,
        });

        ctx.call(
            "ingest",
            ctx.collaborators
                .ingestion
                .ingest(session_id, doc_id, &document.cleaned_text, &metadata),
        )
        .await
    }
}

impl Node for Ingest {
    fn id(&self) -> NodeId {
        NodeId::Ingest
    }

    async fn execute(&self, state: &WorkflowState, ctx: &NodeContext<'_>) -> NodeOutcome {
        let Some(session_id) = state.session_id.as_deref() else {
            return NodeOutcome::fail(
                state,
                NodeId::Ingest,
                NodeFailure::validation("session id missing; workflow was not initialized"),
            );
        };

        let shortlist = state.confirmed_shortlist.as_deref().unwrap_or_default();
        if shortlist.is_empty() {
            let delta = StateDelta {
                ingestion_reports: Some(Vec::new()),
                ..Default::default()
            };
            return NodeOutcome::Continue(skipped(
                state,
                NodeId::Ingest,
                delta,
                "skipped_empty_shortlist",
            ));
        }

        let mut processed = state.processed_paper_ids.clone();
        let mut reports = Vec::with_capacity(shortlist.len());
        let mut transient: Option<CollaboratorError> = None;

        for scored in shortlist {
            let paper_id = scored.paper.id.trim();
            let pdf_url = scored
                .paper
                .pdf_url
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty());

            let Some(pdf_url) = pdf_url.filter(|_| !paper_id.is_empty()) else {
                reports.push(IngestionReport {
                    paper_id: paper_id.to_string(),
                    document_id: None,
                    status: IngestionStatus::SkippedMissingData,
                    detail: Some("paper id or pdf url missing".to_string()),
                });
                continue;
            };

            let doc_id = document_id(paper_id);
            if processed.iter().any(|p| p == paper_id) {
                reports.push(IngestionReport {
                    paper_id: paper_id.to_string(),
                    document_id: Some(doc_id),
                    status: IngestionStatus::AlreadyIngested,
                    detail: None,
                });
                continue;
            }

            match Self::ingest_one(ctx, session_id, &doc_id, scored, pdf_url).await {
                Ok(receipt) => {
                    if matches!(
                        receipt.status,
                        IngestionStatus::Success | IngestionStatus::AlreadyIngested
                    ) {
                        processed.push(paper_id.to_string());
                    }
                    reports.push(IngestionReport {
                        paper_id: paper_id.to_string(),
                        document_id: Some(doc_id),
                        status: receipt.status,
                        detail: receipt.detail,
                    });
                }
                Err(CollaboratorError::Cancelled) => {
                    let failure =
                        NodeFailure::from_collaborator("ingest", &CollaboratorError::Cancelled);
                    let delta = StateDelta {
                        processed_paper_ids: Some(processed),
                        ..Default::default()
                    }
                    .message(error_report(state, NodeId::Ingest, &failure));
                    return NodeOutcome::Fail(delta, failure);
                }
                Err(err) => {
                    tracing::warn!(
                        workflow_id = %state.workflow_id,
                        paper_id,
                        error = %err,
                        transient = err.is_transient(),
                        "paper ingestion failed"
                    );
                    reports.push(IngestionReport {
                        paper_id: paper_id.to_string(),
                        document_id: Some(doc_id),
                        status: IngestionStatus::Failed,
                        detail: Some(err.to_string()),
                    });
                    if err.is_transient() {
                        transient.get_or_insert(err);
                    }
                }
            }
        }

        if let Some(err) = transient {
            let mut failure = NodeFailure::from_collaborator("ingest", &err);
            failure.message = format!(
                "ingestion incomplete ({} of {} papers stored): {err}",
                processed.len(),
                shortlist.len()
            );
            let delta = StateDelta {
                processed_paper_ids: Some(processed),
                ..Default::default()
            }
            .message(error_report(state, NodeId::Ingest, &failure));
            return NodeOutcome::Fail(delta, failure);
        }

        let summary = IngestionSummary::from_reports(&reports);
        tracing::info!(
            workflow_id = %state.workflow_id,
            processed = summary.processed,
            failed = summary.failed,
            skipped = summary.skipped,
            "ingestion completed"
        );

        let mut delta = result_message(
            state,
            NodeId::Ingest,
            json!({
                "status": "success",
                "processed": summary.processed,
                "failed": summary.failed,
                "skipped": summary.skipped,
            }),
        );
        delta.ingestion_reports = Some(reports);
        delta.processed_paper_ids = Some(processed);
        NodeOutcome::Continue(delta)
    }
}
