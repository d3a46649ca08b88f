//! LLM agent ports: query formulation, relevance, analysis, gaps, directions, review.

use std::future::Future;

use serde::{Deserialize, Serialize};

use scholarflow_types::research::{
    Evaluation, FormulatedQuery, LiteratureSummary, Paper, RelevanceAssessment, ResearchDirection,
    ResearchGap,
};

use super::CollaboratorError;

/// Queries produced for a research topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFormulation {
    pub queries: Vec<FormulatedQuery>,
    pub original_topic: String,
}

/// The research agent driving most pipeline stages.
pub trait QueryAgent: Send + Sync {
    fn formulate_queries(
        &self,
        topic: &str,
        area: Option<&str>,
    ) -> impl Future<Output = Result<QueryFormulation, CollaboratorError>> + Send;

    /// Assess one paper against the topic. Returns the assessments the agent
    /// produced; callers pick the one matching `paper.id`.
    fn assess_relevance(
        &self,
        paper: &Paper,
        topic: &str,
    ) -> impl Future<Output = Result<Vec<RelevanceAssessment>, CollaboratorError>> + Send;

    /// Analyze the documents ingested into `collection_ref`.
    fn analyze_literature(
        &self,
        topic: &str,
        collection_ref: &str,
    ) -> impl Future<Output = Result<LiteratureSummary, CollaboratorError>> + Send;

    fn identify_gaps(
        &self,
        summary: &str,
        themes: &[String],
    ) -> impl Future<Output = Result<Vec<ResearchGap>, CollaboratorError>> + Send;

    fn generate_directions(
        &self,
        gaps_summary: &str,
        gaps: &[ResearchGap],
    ) -> impl Future<Output = Result<Vec<ResearchDirection>, CollaboratorError>> + Send;

    fn refine_directions(
        &self,
        current: &[ResearchDirection],
        feedback: &str,
    ) -> impl Future<Output = Result<Vec<ResearchDirection>, CollaboratorError>> + Send;
}

/// Reviewer agent scoring research directions.
pub trait ReviewAgent: Send + Sync {
    fn evaluate(
        &self,
        directions: &[ResearchDirection],
        literature_summary: Option<&LiteratureSummary>,
    ) -> impl Future<Output = Result<Evaluation, CollaboratorError>> + Send;
}
