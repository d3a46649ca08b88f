//! Object-safe dynamic dispatch wrappers for the collaborator ports.
//!
//! Same blanket-impl pattern for every port:
//! 1. Define an object-safe `XxxDyn` trait with boxed futures
//! 2. Blanket-impl `XxxDyn` for all `T: Xxx`
//! 3. `BoxXxx` wraps `Box<dyn XxxDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use scholarflow_types::research::{
    Evaluation, LiteratureSummary, Paper, RelevanceAssessment, ResearchDirection, ResearchGap,
};

use super::agent::{QueryAgent, QueryFormulation, ReviewAgent};
use super::service::{
    DocumentProcessor, IngestionReceipt, IngestionService, ProcessedDocument, SearchRequest,
    SearchService,
};
use super::CollaboratorError;

type BoxedResult<'a, T> = Pin<Box<dyn Future<Output = Result<T, CollaboratorError>> + Send + 'a>>;

// ---------------------------------------------------------------------------
// QueryAgent
// ---------------------------------------------------------------------------

/// Object-safe version of [`QueryAgent`] with boxed futures.
pub trait QueryAgentDyn: Send + Sync {
    fn formulate_queries_boxed<'a>(
        &'a self,
        topic: &'a str,
        area: Option<&'a str>,
    ) -> BoxedResult<'a, QueryFormulation>;

    fn assess_relevance_boxed<'a>(
        &'a self,
        paper: &'a Paper,
        topic: &'a str,
    ) -> BoxedResult<'a, Vec<RelevanceAssessment>>;

    fn analyze_literature_boxed<'a>(
        &'a self,
        topic: &'a str,
        collection_ref: &'a str,
    ) -> BoxedResult<'a, LiteratureSummary>;

    fn identify_gaps_boxed<'a>(
        &'a self,
        summary: &'a str,
        themes: &'a [String],
    ) -> BoxedResult<'a, Vec<ResearchGap>>;

    fn generate_directions_boxed<'a>(
        &'a self,
        gaps_summary: &'a str,
        gaps: &'a [ResearchGap],
    ) -> BoxedResult<'a, Vec<ResearchDirection>>;

    fn refine_directions_boxed<'a>(
        &'a self,
        current: &'a [ResearchDirection],
        feedback: &'a str,
    ) -> BoxedResult<'a, Vec<ResearchDirection>>;
}

impl<T: QueryAgent> QueryAgentDyn for T {
    fn formulate_queries_boxed<'a>(
        &'a self,
        topic: &'a str,
        area: Option<&'a str>,
    ) -> BoxedResult<'a, QueryFormulation> {
        Box::pin(self.formulate_queries(topic, area))
    }

    fn assess_relevance_boxed<'a>(
        &'a self,
        paper: &'a Paper,
        topic: &'a str,
    ) -> BoxedResult<'a, Vec<RelevanceAssessment>> {
        Box::pin(self.assess_relevance(paper, topic))
    }

    fn analyze_literature_boxed<'a>(
        &'a self,
        topic: &'a str,
        collection_ref: &'a str,
    ) -> BoxedResult<'a, LiteratureSummary> {
        Box::pin(self.analyze_literature(topic, collection_ref))
    }

    fn identify_gaps_boxed<'a>(
        &'a self,
        summary: &'a str,
        themes: &'a [String],
    ) -> BoxedResult<'a, Vec<ResearchGap>> {
        Box::pin(self.identify_gaps(summary, themes))
    }

    fn generate_directions_boxed<'a>(
        &'a self,
        gaps_summary: &'a str,
        gaps: &'a [ResearchGap],
    ) -> BoxedResult<'a, Vec<ResearchDirection>> {
        Box::pin(self.generate_directions(gaps_summary, gaps))
    }

    fn refine_directions_boxed<'a>(
        &'a self,
        current: &'a [ResearchDirection],
        feedback: &'a str,
    ) -> BoxedResult<'a, Vec<ResearchDirection>> {
        Box::pin(self.refine_directions(current, feedback))
    }
}

/// Type-erased query agent.
pub struct BoxQueryAgent {
    inner: Box<dyn QueryAgentDyn + Send + Sync>,
}

impl BoxQueryAgent {
    pub fn new<T: QueryAgent + 'static>(agent: T) -> Self {
        Self {
            inner: Box::new(agent),
        }
    }

    pub async fn formulate_queries(
        &self,
        topic: &str,
        area: Option<&str>,
    ) -> Result<QueryFormulation, CollaboratorError> {
        self.inner.formulate_queries_boxed(topic, area).await
    }

    pub async fn assess_relevance(
        &self,
        paper: &Paper,
        topic: &str,
    ) -> Result<Vec<RelevanceAssessment>, CollaboratorError> {
        self.inner.assess_relevance_boxed(paper, topic).await
    }

    pub async fn analyze_literature(
        &self,
        topic: &str,
        collection_ref: &str,
    ) -> Result<LiteratureSummary, CollaboratorError> {
        self.inner.analyze_literature_boxed(topic, collection_ref).await
    }

    pub async fn identify_gaps(
        &self,
        summary: &str,
        themes: &[String],
    ) -> Result<Vec<ResearchGap>, CollaboratorError> {
        self.inner.identify_gaps_boxed(summary, themes).await
    }

    pub async fn generate_directions(
        &self,
        gaps_summary: &str,
        gaps: &[ResearchGap],
    ) -> Result<Vec<ResearchDirection>, CollaboratorError> {
        self.inner.generate_directions_boxed(gaps_summary, gaps).await
    }

    pub async fn refine_directions(
        &self,
        current: &[ResearchDirection],
        feedback: &str,
    ) -> Result<Vec<ResearchDirection>, CollaboratorError> {
        self.inner.refine_directions_boxed(current, feedback).await
    }
}

// ---------------------------------------------------------------------------
// ReviewAgent
// ---------------------------------------------------------------------------

pub trait ReviewAgentDyn: Send + Sync {
    fn evaluate_boxed<'a>(
        &'a self,
        directions: &'a [ResearchDirection],
        literature_summary: Option<&'a LiteratureSummary>,
    ) -> BoxedResult<'a, Evaluation>;
}

impl<T: ReviewAgent> ReviewAgentDyn for T {
    fn evaluate_boxed<'a>(
        &'a self,
        directions: &'a [ResearchDirection],
        literature_summary: Option<&'a LiteratureSummary>,
    ) -> BoxedResult<'a, Evaluation> {
        Box::pin(self.evaluate(directions, literature_summary))
    }
}

/// Type-erased review agent.
pub struct BoxReviewAgent {
    inner: Box<dyn ReviewAgentDyn + Send + Sync>,
}

impl BoxReviewAgent {
    pub fn new<T: ReviewAgent + 'static>(agent: T) -> Self {
        Self {
            inner: Box::new(agent),
        }
    }

    pub async fn evaluate(
        &self,
        directions: &[ResearchDirection],
        literature_summary: Option<&LiteratureSummary>,
    ) -> Result<Evaluation, CollaboratorError> {
        self.inner.evaluate_boxed(directions, literature_summary).await
    }
}

// ---------------------------------------------------------------------------
// SearchService
// ---------------------------------------------------------------------------

pub trait SearchServiceDyn: Send + Sync {
    fn search_boxed<'a>(&'a self, request: &'a SearchRequest) -> BoxedResult<'a, Vec<Paper>>;
}

impl<T: SearchService> SearchServiceDyn for T {
    fn search_boxed<'a>(&'a self, request: &'a SearchRequest) -> BoxedResult<'a, Vec<Paper>> {
        Box::pin(self.search(request))
    }
}

/// Type-erased search service.
pub struct BoxSearchService {
    inner: Box<dyn SearchServiceDyn + Send + Sync>,
}

impl BoxSearchService {
    pub fn new<T: SearchService + 'static>(service: T) -> Self {
        Self {
            inner: Box::new(service),
        }
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<Paper>, CollaboratorError> {
        self.inner.search_boxed(request).await
    }
}

// ---------------------------------------------------------------------------
// DocumentProcessor
// ---------------------------------------------------------------------------

pub trait DocumentProcessorDyn: Send + Sync {
    fn process_boxed<'a>(&'a self, url_or_path: &'a str) -> BoxedResult<'a, ProcessedDocument>;
}

impl<T: DocumentProcessor> DocumentProcessorDyn for T {
    fn process_boxed<'a>(&'a self, url_or_path: &'a str) -> BoxedResult<'a, ProcessedDocument> {
        Box::pin(self.process(url_or_path))
    }
}

/// Type-erased document processor.
pub struct BoxDocumentProcessor {
    inner: Box<dyn DocumentProcessorDyn + Send + Sync>,
}

impl BoxDocumentProcessor {
    pub fn new<T: DocumentProcessor + 'static>(processor: T) -> Self {
        Self {
            inner: Box::new(processor),
        }
    }

    pub async fn process(&self, url_or_path: &str) -> Result<ProcessedDocument, CollaboratorError> {
        self.inner.process_boxed(url_or_path).await
    }
}

// ---------------------------------------------------------------------------
// IngestionService
// ---------------------------------------------------------------------------

pub trait IngestionServiceDyn: Send + Sync {
    fn ingest_boxed<'a>(
        &'a self,
        session_id: &'a str,
        doc_id: &'a str,
        text: &'a str,
        metadata: &'a Value,
    ) -> BoxedResult<'a, IngestionReceipt>;
}

impl<T: IngestionService> IngestionServiceDyn for T {
    fn ingest_boxed<'a>(
        &'a self,
        session_id: &'a str,
        doc_id: &'a str,
        text: &'a str,
        metadata: &'a Value,
    ) -> BoxedResult<'a, IngestionReceipt> {
        Box::pin(self.ingest(session_id, doc_id, text, metadata))
    }
}

/// Type-erased ingestion service.
pub struct BoxIngestionService {
    inner: Box<dyn IngestionServiceDyn + Send + Sync>,
}

impl BoxIngestionService {
    pub fn new<T: IngestionService + 'static>(service: T) -> Self {
        Self {
            inner: Box::new(service),
        }
    }

    pub async fn ingest(
        &self,
        session_id: &str,
        doc_id: &str,
        text: &str,
        metadata: &Value,
    ) -> Result<IngestionReceipt, CollaboratorError> {
        self.inner
            .ingest_boxed(session_id, doc_id, text, metadata)
            .await
    }
}
