//! Research records produced and consumed by the pipeline stages.
//!
//! These are the typed payloads carried in `WorkflowState`: papers found by
//! search, relevance assessments, ingestion reports, the literature summary,
//! research gaps and directions, evaluation results, and the final report.

use serde::{Deserialize, Serialize};

use crate::state::WorkflowOutcome;

// ---------------------------------------------------------------------------
// Queries and papers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulatedQuery {
    pub query_string: String,
    pub source_topic: String,
}

/// A paper returned by the search service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    /// Publication date as reported by the source (free-form, usually RFC 3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
}

/// Relevance verdict for a single paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceAssessment {
    pub paper_id: String,
    pub score: f64,
    pub is_relevant: bool,
}

/// A paper paired with its relevance assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPaper {
    #[serde(flatten)]
    pub paper: Paper,
    pub relevance_score: f64,
    pub is_relevant: bool,
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStatus {
    Success,
    Failed,
    SkippedMissingData,
    AlreadyIngested,
}

/// Outcome of ingesting one shortlisted paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub paper_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    pub status: IngestionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Aggregate counts over a set of ingestion reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionSummary {
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl IngestionSummary {
    pub fn from_reports(reports: &[IngestionReport]) -> Self {
        reports.iter().fold(Self::default(), |mut acc, r| {
            match r.status {
                IngestionStatus::Success | IngestionStatus::AlreadyIngested => acc.processed += 1,
                IngestionStatus::Failed => acc.failed += 1,
                IngestionStatus::SkippedMissingData => acc.skipped += 1,
            }
            acc
        })
    }
}

// ---------------------------------------------------------------------------
// Analysis, gaps, directions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiteratureSummary {
    pub overall_summary: String,
    #[serde(default)]
    pub key_themes: Vec<String>,
    #[serde(default)]
    pub common_methodologies: Vec<String>,
    #[serde(default)]
    pub identified_limitations: Vec<String>,
    #[serde(default)]
    pub future_work_suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchGap {
    pub gap_id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchDirection {
    pub direction_id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub rationale: String,
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionAssessment {
    pub direction_id: String,
    /// Quality score in `[0, 1]`.
    pub score: f64,
    #[serde(default)]
    pub critique: String,
}

/// Reviewer verdict over the current set of research directions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    #[serde(default)]
    pub assessments: Vec<DirectionAssessment>,
    #[serde(default)]
    pub accept_as_is: bool,
    /// True when there was nothing to evaluate.
    #[serde(default)]
    pub skipped: bool,
}

impl Evaluation {
    /// Mean assessment score, `0.0` when no direction was assessed.
    pub fn quality_score(&self) -> f64 {
        if self.assessments.is_empty() {
            return 0.0;
        }
        let total: f64 = self.assessments.iter().map(|a| a.score).sum();
        total / self.assessments.len() as f64
    }
}

// ---------------------------------------------------------------------------
// Final report
// ---------------------------------------------------------------------------

/// Consolidated result of a finished research workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub research_query: String,
    #[serde(default)]
    pub formulated_queries: Vec<FormulatedQuery>,
    #[serde(default)]
    pub scored_results: Vec<ScoredPaper>,
    #[serde(default)]
    pub initial_shortlist: Vec<ScoredPaper>,
    #[serde(default)]
    pub confirmed_shortlist: Vec<ScoredPaper>,
    pub ingestion: IngestionSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literature_summary: Option<LiteratureSummary>,
    #[serde(default)]
    pub identified_gaps: Vec<ResearchGap>,
    #[serde(default)]
    pub final_directions: Vec<ResearchDirection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_evaluation: Option<Evaluation>,
    pub total_iterations: u32,
    pub outcome: WorkflowOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessment(score: f64) -> DirectionAssessment {
        DirectionAssessment {
            direction_id: format!("d-{score}"),
            score,
            critique: String::new(),
        }
    }

    #[test]
    fn quality_score_is_mean_of_assessments() {
        let eval = Evaluation {
            assessments: vec![assessment(0.6), assessment(1.0)],
            accept_as_is: false,
            skipped: false,
        };
        assert!((eval.quality_score() - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn quality_score_empty_is_zero() {
        assert_eq!(Evaluation::default().quality_score(), 0.0);
    }

    #[test]
    fn scored_paper_flattens_paper_fields() {
        let scored = ScoredPaper {
            paper: Paper {
                id: "2401.00001".to_string(),
                title: "Sparse Attention".to_string(),
                authors: vec!["A. Author".to_string()],
                summary: "We study sparse attention.".to_string(),
                pdf_url: None,
                published: None,
            },
            relevance_score: 0.91,
            is_relevant: true,
        };

        let value = serde_json::to_value(&scored).unwrap();
        assert_eq!(value["id"], "2401.00001");
        assert_eq!(value["relevance_score"], 0.91);
        assert!(value.get("paper").is_none());
    }

    #[test]
    fn ingestion_summary_counts_by_status() {
        let report = |status| IngestionReport {
            paper_id: "p".to_string(),
            document_id: None,
            status,
            detail: None,
        };
        let reports = vec![
            report(IngestionStatus::Success),
            report(IngestionStatus::AlreadyIngested),
            report(IngestionStatus::Failed),
            report(IngestionStatus::SkippedMissingData),
        ];

        let summary = IngestionSummary::from_reports(&reports);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn ingestion_status_serde() {
        let json = serde_json::to_string(&IngestionStatus::SkippedMissingData).unwrap();
        assert_eq!(json, "\"skipped_missing_data\"");
    }
}
