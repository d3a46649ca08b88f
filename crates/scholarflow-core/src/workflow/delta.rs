//! Partial state updates returned by nodes.
//!
//! A [`StateDelta`] names only the fields a node produced. The engine merges it
//! into `WorkflowState`: present fields overwrite (lists replace), and messages
//! are appended to the log in order.

use scholarflow_types::message::AgentMessage;
use scholarflow_types::research::{
    Evaluation, FinalReport, FormulatedQuery, IngestionReport, LiteratureSummary, Paper,
    ResearchDirection, ResearchGap, ScoredPaper,
};
use scholarflow_types::state::{WorkflowOutcome, WorkflowState};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    pub session_id: Option<String>,
    pub formulated_queries: Option<Vec<FormulatedQuery>>,
    pub search_results: Option<Vec<Paper>>,
    pub scored_results: Option<Vec<ScoredPaper>>,
    pub initial_shortlist: Option<Vec<ScoredPaper>>,
    pub confirmed_shortlist: Option<Vec<ScoredPaper>>,
    pub ingestion_reports: Option<Vec<IngestionReport>>,
    pub processed_paper_ids: Option<Vec<String>>,
    pub literature_summary: Option<LiteratureSummary>,
    pub conflict_detected: Option<bool>,
    pub conflicting_candidates: Option<Vec<LiteratureSummary>>,
    pub resolved_value: Option<LiteratureSummary>,
    pub identified_gaps: Option<Vec<ResearchGap>>,
    pub generated_directions: Option<Vec<ResearchDirection>>,
    pub evaluation: Option<Evaluation>,
    pub refined_directions: Option<Vec<ResearchDirection>>,
    pub final_report: Option<FinalReport>,
    pub iteration_count: Option<u32>,
    pub workflow_outcome: Option<WorkflowOutcome>,
    pub messages: Vec<AgentMessage>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style message append.
    pub fn message(mut self, message: AgentMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn push_message(&mut self, message: AgentMessage) {
        self.messages.push(message);
    }

    /// Merge this delta into `state`.
    pub fn apply(self, state: &mut WorkflowState) {
        fn set<T>(slot: &mut T, value: Option<T>) {
            if let Some(v) = value {
                *slot = v;
            }
        }
        fn set_some<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        set_some(&mut state.session_id, self.session_id);
        set_some(&mut state.formulated_queries, self.formulated_queries);
        set_some(&mut state.search_results, self.search_results);
        set_some(&mut state.scored_results, self.scored_results);
        set_some(&mut state.initial_shortlist, self.initial_shortlist);
        set_some(&mut state.confirmed_shortlist, self.confirmed_shortlist);
        set_some(&mut state.ingestion_reports, self.ingestion_reports);
        set(&mut state.processed_paper_ids, self.processed_paper_ids);
        set_some(&mut state.literature_summary, self.literature_summary);
        set(&mut state.conflict_detected, self.conflict_detected);
        set(&mut state.conflicting_candidates, self.conflicting_candidates);
        set_some(&mut state.resolved_value, self.resolved_value);
        set_some(&mut state.identified_gaps, self.identified_gaps);
        set_some(&mut state.generated_directions, self.generated_directions);
        set_some(&mut state.evaluation, self.evaluation);
        set_some(&mut state.refined_directions, self.refined_directions);
        set_some(&mut state.final_report, self.final_report);
        set(&mut state.workflow_outcome, self.workflow_outcome);

        // Loop counter never moves backwards.
        if let Some(count) = self.iteration_count {
            state.iteration_count = state.iteration_count.max(count);
        }

        for message in self.messages {
            state.messages.append(message);
        }
    }
}
