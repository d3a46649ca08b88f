//! Bounded per-node retry policy.
//!
//! The error handler looks only at which node failed and how many times it
//! has been retried, never at the error content. Below the limit it clears the
//! error and routes back to the failed node; at the limit it terminates the
//! workflow with `max_retries_reached`.

use std::fmt;

use serde_json::json;

use scholarflow_types::message::{AgentMessage, Performative};
use scholarflow_types::state::{NodeId, WorkflowOutcome, WorkflowState, MAX_RETRIES};

/// Sender name used for error handler messages.
pub const ERROR_HANDLER: &str = "error_handler";

// ---------------------------------------------------------------------------
// RecoveryStrategy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    RetryNode,
    Terminate,
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RetryNode => "RETRY_NODE",
            Self::Terminate => "TERMINATE",
        })
    }
}

/// What the handler did and where the engine goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recovery {
    pub strategy: RecoveryStrategy,
    /// Node to re-enter; `None` when terminating.
    pub next: Option<NodeId>,
}

// ---------------------------------------------------------------------------
// ErrorHandler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct ErrorHandler {
    max_retries: u32,
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new(MAX_RETRIES)
    }
}

impl ErrorHandler {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decide retry vs. terminate from the attempts already spent on `node`.
    pub fn decide(&self, attempts: u32) -> RecoveryStrategy {
        if attempts < self.max_retries {
            RecoveryStrategy::RetryNode
        } else {
            RecoveryStrategy::Terminate
        }
    }

    /// Apply the retry policy to a state carrying a node error.
    ///
    /// Emits one `error_report` message recording the decision. Errors not
    /// attributed to a node terminate immediately.
    pub fn recover(&self, state: &mut WorkflowState) -> Recovery {
        let failed = state.error_source_node.and_then(|s| s.node());
        let error_message = state.error_message.clone().unwrap_or_default();

        let Some(node) = failed else {
            state.workflow_outcome = WorkflowOutcome::Error;
            state.current_node = None;
            return Recovery {
                strategy: RecoveryStrategy::Terminate,
                next: None,
            };
        };

        let attempts = state.retries_for(node);
        let strategy = self.decide(attempts);

        let recovery = match strategy {
            RecoveryStrategy::RetryNode => {
                let attempt = attempts + 1;
                state.retry_attempts.insert(node, attempt);
                state.clear_error();
                state.current_node = Some(node);
                tracing::warn!(
                    workflow_id = %state.workflow_id,
                    node = %node,
                    attempt,
                    max_retries = self.max_retries,
                    "retrying failed node"
                );
                Recovery {
                    strategy,
                    next: Some(node),
                }
            }
            RecoveryStrategy::Terminate => {
                state.workflow_outcome = WorkflowOutcome::MaxRetriesReached;
                state.current_node = None;
                tracing::warn!(
                    workflow_id = %state.workflow_id,
                    node = %node,
                    attempts,
                    "retry limit reached, terminating workflow"
                );
                Recovery {
                    strategy,
                    next: None,
                }
            }
        };

        let report = AgentMessage::new(
            state.conversation_id(),
            ERROR_HANDLER,
            Performative::ErrorReport,
            json!({
                "failed_node": node.as_str(),
                "error_message": error_message,
                "chosen_strategy": strategy.to_string(),
                "retries_attempted": state.retries_for(node),
            }),
        );
        state.messages.append(report);

        recovery
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scholarflow_types::state::{ErrorSource, WorkflowConfig};
    use uuid::Uuid;

    fn failed_state(node: NodeId) -> WorkflowState {
        let mut state = WorkflowState::new(Uuid::now_v7(), "q", None, WorkflowConfig::default());
        state.error_message = Some("connection reset".into());
        state.error_source_node = Some(ErrorSource::Node(node));
        state
    }

    // --- decide ---

    #[test]
    fn test_decide_within_limit() {
        let handler = ErrorHandler::default();
        assert_eq!(handler.decide(0), RecoveryStrategy::RetryNode);
        assert_eq!(handler.decide(1), RecoveryStrategy::RetryNode);
    }

    #[test]
    fn test_decide_at_limit() {
        let handler = ErrorHandler::default();
        assert_eq!(handler.decide(MAX_RETRIES), RecoveryStrategy::Terminate);
    }

    // --- recover ---

    #[test]
    fn test_recover_retry_clears_error_and_counts() {
        let handler = ErrorHandler::default();
        let mut state = failed_state(NodeId::Search);

        let recovery = handler.recover(&mut state);

        assert_eq!(recovery.strategy, RecoveryStrategy::RetryNode);
        assert_eq!(recovery.next, Some(NodeId::Search));
        assert_eq!(state.retries_for(NodeId::Search), 1);
        assert!(!state.has_error());
        assert!(state.error_source_node.is_none());
        assert_eq!(state.current_node, Some(NodeId::Search));
        assert_eq!(state.workflow_outcome, WorkflowOutcome::Running);

        let report = state.messages.last().unwrap();
        assert_eq!(report.sender, ERROR_HANDLER);
        assert_eq!(report.content["chosen_strategy"], "RETRY_NODE");
        assert_eq!(report.content["failed_node"], "search");
        assert_eq!(report.content["retries_attempted"], 1);
    }

    #[test]
    fn test_recover_terminates_at_limit() {
        let handler = ErrorHandler::default();
        let mut state = failed_state(NodeId::Ingest);
        state.retry_attempts.insert(NodeId::Ingest, MAX_RETRIES);

        let recovery = handler.recover(&mut state);

        assert_eq!(recovery.strategy, RecoveryStrategy::Terminate);
        assert_eq!(recovery.next, None);
        assert_eq!(state.workflow_outcome, WorkflowOutcome::MaxRetriesReached);
        assert_eq!(state.retries_for(NodeId::Ingest), MAX_RETRIES);
        assert!(state.current_node.is_none());
        assert_eq!(state.messages.last().unwrap().content["chosen_strategy"], "TERMINATE");
    }

    #[test]
    fn test_retry_counters_are_node_scoped() {
        let handler = ErrorHandler::default();
        let mut state = failed_state(NodeId::Search);
        state.retry_attempts.insert(NodeId::Ingest, MAX_RETRIES);

        let recovery = handler.recover(&mut state);
        assert_eq!(recovery.strategy, RecoveryStrategy::RetryNode);
    }

    #[test]
    fn test_engine_errors_terminate() {
        let handler = ErrorHandler::default();
        let mut state = failed_state(NodeId::Search);
        state.error_source_node = Some(ErrorSource::Engine);

        let recovery = handler.recover(&mut state);
        assert_eq!(recovery.strategy, RecoveryStrategy::Terminate);
        assert_eq!(state.workflow_outcome, WorkflowOutcome::Error);
    }
}
