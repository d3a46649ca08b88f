//! Heuristic stand-ins for the LLM agents.
//!
//! Every answer is derived from term statistics of the query, the paper
//! metadata, or the ingested text, so identical inputs always produce
//! identical outputs.

use std::collections::HashSet;

use scholarflow_core::collaborator::{
    CollaboratorError, QueryAgent, QueryFormulation, ReviewAgent,
};
use scholarflow_types::research::{
    DirectionAssessment, Evaluation, FormulatedQuery, LiteratureSummary, Paper,
    RelevanceAssessment, ResearchDirection, ResearchGap,
};

use super::index::MemoryIngestionIndex;
use super::{terms, top_terms};

/// Score at or above which a paper counts as relevant.
const RELEVANT_AT: f64 = 0.5;

const METHOD_CUES: &[&str] = &["method", "approach", "framework", "propose", "model"];
const LIMITATION_CUES: &[&str] = &["limitation", "however", "lack", "fail", "cannot"];
const FUTURE_CUES: &[&str] = &["future", "further", "open question"];

/// Critique attached to directions that fall short.
const CRITIQUE: &str = "Specify the methodology and the evaluation criteria in more detail.";

fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn cue_sentences(texts: &[&str], cues: &[&str], limit: usize) -> Vec<String> {
    texts
        .iter()
        .flat_map(|t| sentences(t))
        .filter(|s| {
            let lower = s.to_lowercase();
            cues.iter().any(|cue| lower.contains(cue))
        })
        .take(limit)
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Query agent
// ---------------------------------------------------------------------------

/// Research agent reading the shared ingestion index.
#[derive(Debug, Clone)]
pub struct HeuristicQueryAgent {
    index: MemoryIngestionIndex,
}

impl HeuristicQueryAgent {
    pub fn new(index: MemoryIngestionIndex) -> Self {
        Self { index }
    }
}

impl QueryAgent for HeuristicQueryAgent {
    async fn formulate_queries(
        &self,
        topic: &str,
        area: Option<&str>,
    ) -> Result<QueryFormulation, CollaboratorError> {
        let topic = topic.trim();
        let mut queries = vec![topic.to_string()];

        let keywords = terms(topic);
        if keywords.len() > 1 {
            queries.push(keywords.join(" "));
        }
        if let Some(area) = area.map(str::trim).filter(|a| !a.is_empty()) {
            queries.push(format!("{topic} {area}"));
        }

        let mut seen = HashSet::new();
        queries.retain(|q| seen.insert(q.to_lowercase()));

        Ok(QueryFormulation {
            queries: queries
                .into_iter()
                .map(|query_string| FormulatedQuery {
                    query_string,
                    source_topic: topic.to_string(),
                })
                .collect(),
            original_topic: topic.to_string(),
        })
    }

    async fn assess_relevance(
        &self,
        paper: &Paper,
        topic: &str,
    ) -> Result<Vec<RelevanceAssessment>, CollaboratorError> {
        let topic_terms: HashSet<String> = terms(topic).into_iter().collect();
        if topic_terms.is_empty() {
            return Err(CollaboratorError::Rejected(format!(
                "topic has no assessable terms: '{topic}'"
            )));
        }

        let paper_terms: HashSet<String> =
            terms(&format!("{} {}", paper.title, paper.summary)).into_iter().collect();
        let shared = topic_terms.intersection(&paper_terms).count();
        let score = shared as f64 / topic_terms.len() as f64;

        Ok(vec![RelevanceAssessment {
            paper_id: paper.id.clone(),
            score,
            is_relevant: score >= RELEVANT_AT,
        }])
    }

    async fn analyze_literature(
        &self,
        topic: &str,
        collection_ref: &str,
    ) -> Result<LiteratureSummary, CollaboratorError> {
        let docs = self.index.collection(collection_ref);
        if docs.is_empty() {
            return Err(CollaboratorError::Rejected(format!(
                "no documents in {collection_ref}"
            )));
        }

        let texts: Vec<&str> = docs.iter().map(|d| d.text.as_str()).collect();
        let key_themes = top_terms(texts.iter().copied(), 5);

        Ok(LiteratureSummary {
            overall_summary: format!(
                "Analysis of {} documents on '{}'. Dominant themes: {}.",
                docs.len(),
                topic.trim(),
                key_themes.join(", ")
            ),
            common_methodologies: cue_sentences(&texts, METHOD_CUES, 3),
            identified_limitations: cue_sentences(&texts, LIMITATION_CUES, 3),
            future_work_suggestions: cue_sentences(&texts, FUTURE_CUES, 3),
            key_themes,
        })
    }

    async fn identify_gaps(
        &self,
        summary: &str,
        themes: &[String],
    ) -> Result<Vec<ResearchGap>, CollaboratorError> {
        let focus: Vec<String> = if themes.is_empty() {
            top_terms([summary], 3)
        } else {
            themes.iter().take(3).cloned().collect()
        };

        Ok(focus
            .into_iter()
            .enumerate()
            .map(|(i, theme)| ResearchGap {
                gap_id: format!("gap_{}", i + 1),
                title: format!("Open problems in {theme}"),
                description: format!(
                    "The reviewed literature discusses {theme} but leaves its limitations and evaluation largely unaddressed."
                ),
                keywords: vec![theme],
            })
            .collect())
    }

    async fn generate_directions(
        &self,
        _gaps_summary: &str,
        gaps: &[ResearchGap],
    ) -> Result<Vec<ResearchDirection>, CollaboratorError> {
        Ok(gaps
            .iter()
            .enumerate()
            .map(|(i, gap)| {
                let focus = gap.keywords.first().map_or(gap.title.as_str(), String::as_str);
                ResearchDirection {
                    direction_id: format!("dir_{}", i + 1),
                    title: format!("Investigate {focus}"),
                    description: format!("Design and evaluate methods targeting: {}", gap.title),
                    rationale: gap.description.clone(),
                }
            })
            .collect())
    }

    async fn refine_directions(
        &self,
        current: &[ResearchDirection],
        feedback: &str,
    ) -> Result<Vec<ResearchDirection>, CollaboratorError> {
        Ok(current
            .iter()
            .map(|direction| {
                let prefix = format!("- {} (", direction.direction_id);
                let critique = feedback
                    .lines()
                    .find(|line| line.starts_with(&prefix))
                    .and_then(|line| line.split_once("): "))
                    .map(|(_, critique)| critique.trim());

                let mut refined = direction.clone();
                if let Some(critique) = critique {
                    refined.description = format!("{} Refinement: {critique}", refined.description);
                }
                refined
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Review agent
// ---------------------------------------------------------------------------

/// Scores directions on completeness and grounding in the summary themes.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicReviewAgent;

impl HeuristicReviewAgent {
    fn score(direction: &ResearchDirection, themes: &[String]) -> f64 {
        let mut score: f64 = 0.5;
        if !direction.rationale.trim().is_empty() {
            score += 0.15;
        }
        if direction.description.chars().count() >= 120 {
            score += 0.15;
        }
        let text = format!("{} {}", direction.title, direction.description).to_lowercase();
        if themes.iter().any(|t| text.contains(&t.to_lowercase())) {
            score += 0.1;
        }
        if direction.description.contains("Refinement:") {
            score += 0.1;
        }
        (score.min(1.0) * 100.0).round() / 100.0
    }
}

impl ReviewAgent for HeuristicReviewAgent {
    async fn evaluate(
        &self,
        directions: &[ResearchDirection],
        literature_summary: Option<&LiteratureSummary>,
    ) -> Result<Evaluation, CollaboratorError> {
        let themes = literature_summary.map_or(&[][..], |s| s.key_themes.as_slice());

        let assessments = directions
            .iter()
            .map(|direction| {
                let score = Self::score(direction, themes);
                DirectionAssessment {
                    direction_id: direction.direction_id.clone(),
                    score,
                    critique: if score < 0.85 {
                        CRITIQUE.to_string()
                    } else {
                        String::new()
                    },
                }
            })
            .collect();

        Ok(Evaluation {
            assessments,
            accept_as_is: false,
            skipped: false,
        })
    }
}
