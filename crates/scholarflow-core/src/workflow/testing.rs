//! Scripted in-process collaborators for driving nodes and the engine in tests.
//!
//! A single [`ScriptedAgent`] implements every collaborator port. Clones share
//! state, so a test can keep one handle for assertions and give another to
//! the engine.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use scholarflow_types::research::{
    DirectionAssessment, Evaluation, FormulatedQuery, IngestionStatus, LiteratureSummary, Paper,
    RelevanceAssessment, ResearchDirection, ResearchGap, ScoredPaper,
};
use scholarflow_types::state::{WorkflowConfig, WorkflowState};

use crate::collaborator::{
    CollaboratorError, Collaborators, DocumentProcessor, IngestionReceipt, IngestionService,
    ProcessedDocument, QueryAgent, QueryFormulation, ReviewAgent, SearchRequest, SearchService,
};

use super::node::{Node, NodeContext, NodeOutcome};

pub(crate) fn paper(id: &str) -> Paper {
    Paper {
        id: id.to_string(),
        title: format!("Paper {id}"),
        authors: vec!["A. Author".to_string()],
        summary: format!("Abstract of {id}"),
        pdf_url: Some(format!("file:///corpus/{id}.pdf")),
        published: Some("2025-01-01T00:00:00Z".to_string()),
    }
}

pub(crate) fn scored_paper(id: &str, score: f64) -> ScoredPaper {
    ScoredPaper {
        paper: paper(id),
        relevance_score: score,
        is_relevant: score >= 0.5,
    }
}

pub(crate) fn direction(id: &str) -> ResearchDirection {
    ResearchDirection {
        direction_id: id.to_string(),
        title: format!("Direction {id}"),
        description: "Explore further".to_string(),
        rationale: "Gap in the literature".to_string(),
    }
}

pub(crate) fn summary(themes: &[&str]) -> LiteratureSummary {
    LiteratureSummary {
        overall_summary: format!("Literature covers {}", themes.join(", ")),
        key_themes: themes.iter().map(|t| t.to_string()).collect(),
        ..Default::default()
    }
}

/// A fresh state with a session id, customised by `f`.
pub(crate) fn state_with(f: impl FnOnce(&mut WorkflowState)) -> WorkflowState {
    let mut state = WorkflowState::new(
        Uuid::now_v7(),
        "graph neural networks",
        None,
        WorkflowConfig::default(),
    );
    state.session_id = Some(format!("session_{}", state.workflow_id.simple()));
    f(&mut state);
    state
}

// ---------------------------------------------------------------------------
// ScriptedAgent
// ---------------------------------------------------------------------------

struct Script {
    /// `(paper id, relevance score)` returned by search and assessment.
    papers: Vec<(String, f64)>,
    /// Remaining transient failures per operation.
    failures: HashMap<&'static str, u32>,
    /// Operations that always fail with a validation error.
    rejected: HashSet<&'static str>,
    /// Operation that panics when called.
    panic_on: Option<&'static str>,
    /// Operation that never completes.
    hang_on: Option<&'static str>,
    /// Evaluation scores consumed one per `evaluate` call; the last repeats.
    eval_scores: VecDeque<f64>,
    accept_as_is: bool,
    /// Alternate themes between analysis passes.
    divergent_analysis: bool,
    analysis_passes: u32,
    calls: HashMap<&'static str, u32>,
    ingested: Vec<String>,
    ingested_keys: HashSet<(String, String)>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            papers: vec![
                ("p1".to_string(), 0.95),
                ("p2".to_string(), 0.85),
                ("p3".to_string(), 0.75),
                ("p4".to_string(), 0.2),
            ],
            failures: HashMap::new(),
            rejected: HashSet::new(),
            panic_on: None,
            hang_on: None,
            eval_scores: VecDeque::from([0.9]),
            accept_as_is: false,
            divergent_analysis: false,
            analysis_passes: 0,
            calls: HashMap::new(),
            ingested: Vec::new(),
            ingested_keys: HashSet::new(),
        }
    }
}

#[derive(Clone, Default)]
pub(crate) struct ScriptedAgent {
    script: Arc<Mutex<Script>>,
}

impl ScriptedAgent {
    pub fn with_papers(self, papers: &[(&str, f64)]) -> Self {
        self.script.lock().unwrap().papers =
            papers.iter().map(|(id, s)| (id.to_string(), *s)).collect();
        self
    }

    pub fn fail_times(self, operation: &'static str, times: u32) -> Self {
        self.script.lock().unwrap().failures.insert(operation, times);
        self
    }

    pub fn reject(self, operation: &'static str) -> Self {
        self.script.lock().unwrap().rejected.insert(operation);
        self
    }

    pub fn panic_on(self, operation: &'static str) -> Self {
        self.script.lock().unwrap().panic_on = Some(operation);
        self
    }

    pub fn hang_on(self, operation: &'static str) -> Self {
        self.script.lock().unwrap().hang_on = Some(operation);
        self
    }

    pub fn eval_scores(self, scores: &[f64]) -> Self {
        self.script.lock().unwrap().eval_scores = scores.iter().copied().collect();
        self
    }

    pub fn accept_as_is(self) -> Self {
        self.script.lock().unwrap().accept_as_is = true;
        self
    }

    pub fn divergent_analysis(self) -> Self {
        self.script.lock().unwrap().divergent_analysis = true;
        self
    }

    pub fn calls(&self, operation: &str) -> u32 {
        self.script
            .lock()
            .unwrap()
            .calls
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    /// Document ids stored by the ingestion port, in call order.
    pub fn ingested(&self) -> Vec<String> {
        self.script.lock().unwrap().ingested.clone()
    }

    async fn enter(&self, operation: &'static str) -> Result<(), CollaboratorError> {
        let hang = {
            let mut script = self.script.lock().unwrap();
            *script.calls.entry(operation).or_default() += 1;

            if script.panic_on == Some(operation) {
                drop(script);
                panic!("scripted panic in {operation}");
            }
            if script.rejected.contains(operation) {
                return Err(CollaboratorError::Rejected(format!("{operation} rejected")));
            }
            if let Some(remaining) = script.failures.get_mut(operation) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(CollaboratorError::Connection(format!(
                        "{operation}: connection reset"
                    )));
                }
            }
            script.hang_on == Some(operation)
        };

        if hang {
            tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
        }
        Ok(())
    }

    fn score_for(&self, paper_id: &str) -> f64 {
        self.script
            .lock()
            .unwrap()
            .papers
            .iter()
            .find(|(id, _)| id == paper_id)
            .map_or(0.0, |(_, s)| *s)
    }
}

impl QueryAgent for ScriptedAgent {
    async fn formulate_queries(
        &self,
        topic: &str,
        _area: Option<&str>,
    ) -> Result<QueryFormulation, CollaboratorError> {
        self.enter("formulate_queries").await?;
        Ok(QueryFormulation {
            queries: vec![
                FormulatedQuery {
                    query_string: format!("{topic} survey"),
                    source_topic: topic.to_string(),
                },
                FormulatedQuery {
                    query_string: format!("{topic} benchmarks"),
                    source_topic: topic.to_string(),
                },
            ],
            original_topic: topic.to_string(),
        })
    }

    async fn assess_relevance(
        &self,
        paper: &Paper,
        _topic: &str,
    ) -> Result<Vec<RelevanceAssessment>, CollaboratorError> {
        self.enter("assess_relevance").await?;
        let score = self.score_for(&paper.id);
        Ok(vec![RelevanceAssessment {
            paper_id: paper.id.clone(),
            score,
            is_relevant: score >= 0.5,
        }])
    }

    async fn analyze_literature(
        &self,
        _topic: &str,
        _collection_ref: &str,
    ) -> Result<LiteratureSummary, CollaboratorError> {
        self.enter("analyze_literature").await?;
        let mut script = self.script.lock().unwrap();
        script.analysis_passes += 1;
        if script.divergent_analysis && script.analysis_passes % 2 == 0 {
            return Ok(summary(&["message passing", "scalability"]));
        }
        Ok(summary(&["message passing", "molecular property prediction"]))
    }

    async fn identify_gaps(
        &self,
        _summary: &str,
        themes: &[String],
    ) -> Result<Vec<ResearchGap>, CollaboratorError> {
        self.enter("identify_gaps").await?;
        Ok(themes
            .iter()
            .enumerate()
            .map(|(i, theme)| ResearchGap {
                gap_id: format!("g{}", i + 1),
                title: format!("Open problems in {theme}"),
                description: format!("{theme} lacks rigorous evaluation"),
                keywords: vec![theme.clone()],
            })
            .collect())
    }

    async fn generate_directions(
        &self,
        _gaps_summary: &str,
        gaps: &[ResearchGap],
    ) -> Result<Vec<ResearchDirection>, CollaboratorError> {
        self.enter("generate_directions").await?;
        Ok(gaps
            .iter()
            .enumerate()
            .map(|(i, _)| direction(&format!("d{}", i + 1)))
            .collect())
    }

    async fn refine_directions(
        &self,
        current: &[ResearchDirection],
        _feedback: &str,
    ) -> Result<Vec<ResearchDirection>, CollaboratorError> {
        self.enter("refine_directions").await?;
        Ok(current
            .iter()
            .map(|d| ResearchDirection {
                description: format!("{} (refined)", d.description),
                ..d.clone()
            })
            .collect())
    }
}

impl ReviewAgent for ScriptedAgent {
    async fn evaluate(
        &self,
        directions: &[ResearchDirection],
        _literature_summary: Option<&LiteratureSummary>,
    ) -> Result<Evaluation, CollaboratorError> {
        self.enter("evaluate").await?;
        let mut script = self.script.lock().unwrap();
        let score = if script.eval_scores.len() > 1 {
            script.eval_scores.pop_front().unwrap_or(0.0)
        } else {
            script.eval_scores.front().copied().unwrap_or(0.0)
        };
        Ok(Evaluation {
            assessments: directions
                .iter()
                .map(|d| DirectionAssessment {
                    direction_id: d.direction_id.clone(),
                    score,
                    critique: "needs a clearer evaluation plan".to_string(),
                })
                .collect(),
            accept_as_is: script.accept_as_is,
            skipped: false,
        })
    }
}

impl SearchService for ScriptedAgent {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Paper>, CollaboratorError> {
        self.enter("search").await?;
        let script = self.script.lock().unwrap();
        Ok(script
            .papers
            .iter()
            .take(request.max_results as usize)
            .map(|(id, _)| paper(id))
            .collect())
    }
}

impl DocumentProcessor for ScriptedAgent {
    async fn process(&self, url_or_path: &str) -> Result<ProcessedDocument, CollaboratorError> {
        self.enter("process").await?;
        Ok(ProcessedDocument {
            cleaned_text: format!("full text of {url_or_path}"),
            structure: Value::Null,
        })
    }
}

impl IngestionService for ScriptedAgent {
    async fn ingest(
        &self,
        session_id: &str,
        doc_id: &str,
        _text: &str,
        _metadata: &Value,
    ) -> Result<IngestionReceipt, CollaboratorError> {
        self.enter("ingest").await?;
        let mut script = self.script.lock().unwrap();
        if !script
            .ingested_keys
            .insert((session_id.to_string(), doc_id.to_string()))
        {
            return Ok(IngestionReceipt {
                status: IngestionStatus::AlreadyIngested,
                detail: None,
            });
        }
        script.ingested.push(doc_id.to_string());
        Ok(IngestionReceipt {
            status: IngestionStatus::Success,
            detail: None,
        })
    }
}

pub(crate) fn mock_collaborators(agent: ScriptedAgent) -> Collaborators {
    Collaborators::new(agent.clone(), agent.clone(), agent.clone(), agent.clone(), agent)
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Runs a single node against scripted collaborators.
pub(crate) struct Harness {
    pub agent: ScriptedAgent,
    pub collaborators: Collaborators,
    pub cancel: CancellationToken,
}

impl Harness {
    pub fn new(agent: ScriptedAgent) -> Self {
        Self {
            collaborators: mock_collaborators(agent.clone()),
            agent,
            cancel: CancellationToken::new(),
        }
    }

    pub async fn run(&self, node: &impl Node, state: &WorkflowState) -> NodeOutcome {
        let ctx = NodeContext {
            workflow_id: state.workflow_id,
            collaborators: &self.collaborators,
            cancel: &self.cancel,
            call_timeout: Duration::from_secs(5),
        };
        node.execute(state, &ctx).await
    }
}
