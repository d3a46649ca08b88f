//! Conditional routing: pure decisions over `WorkflowState`.
//!
//! Routers never mutate state and are deterministic given the state.

use std::fmt;

use scholarflow_types::state::{WorkflowState, MAX_ITERATIONS_REFINE, REFINEMENT_SCORE_THRESHOLD};

/// Label of an outgoing branch chosen by a router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    ErrorFound,
    NoError,
    ConflictFound,
    NoConflict,
    Finalize,
    Refine,
}

impl Branch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ErrorFound => "error_found",
            Self::NoError => "no_error",
            Self::ConflictFound => "conflict_found",
            Self::NoConflict => "no_conflict",
            Self::Finalize => "finalize",
            Self::Refine => "refine",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `ErrorFound` iff `error_message` is non-empty.
pub fn check_for_errors(state: &WorkflowState) -> Branch {
    if state.has_error() {
        Branch::ErrorFound
    } else {
        Branch::NoError
    }
}

pub fn check_for_conflict(state: &WorkflowState) -> Branch {
    if state.conflict_detected {
        Branch::ConflictFound
    } else {
        Branch::NoConflict
    }
}

/// Why the refinement loop stops, or `Continue` when it should not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinementDecision {
    Accepted,
    ScoreThreshold,
    IterationCap,
    Continue,
}

/// Evaluate the stop conditions in precedence order: acceptance flag, then
/// quality score, then iteration cap. First match wins.
pub fn refinement_decision(state: &WorkflowState) -> RefinementDecision {
    if let Some(evaluation) = &state.evaluation {
        if evaluation.accept_as_is {
            return RefinementDecision::Accepted;
        }
        if evaluation.quality_score() >= REFINEMENT_SCORE_THRESHOLD {
            return RefinementDecision::ScoreThreshold;
        }
    }
    if state.iteration_count >= MAX_ITERATIONS_REFINE {
        return RefinementDecision::IterationCap;
    }
    RefinementDecision::Continue
}

pub fn should_refine_further(state: &WorkflowState) -> Branch {
    match refinement_decision(state) {
        RefinementDecision::Continue => Branch::Refine,
        _ => Branch::Finalize,
    }
}

/// Routers that can sit on a transition table edge.
///
/// Error routing is not listed: the engine applies it after every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Router {
    CheckForConflict,
    ShouldRefineFurther,
}

impl Router {
    pub fn route(&self, state: &WorkflowState) -> Branch {
        match self {
            Self::CheckForConflict => check_for_conflict(state),
            Self::ShouldRefineFurther => should_refine_further(state),
        }
    }

    /// Every branch this router can return; each needs a target in the table.
    pub fn branches(&self) -> &'static [Branch] {
        match self {
            Self::CheckForConflict => &[Branch::ConflictFound, Branch::NoConflict],
            Self::ShouldRefineFurther => &[Branch::Finalize, Branch::Refine],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CheckForConflict => "check_for_conflict",
            Self::ShouldRefineFurther => "should_refine_further",
        }
    }
}
