//! Node contract and step outcomes.
//!
//! A node is one pipeline stage. It reads the current `WorkflowState`, may call
//! collaborators through its [`NodeContext`], and returns a [`NodeOutcome`]:
//! a delta to merge, optionally tagged as a suspension or a failure. Nodes
//! never call other nodes; control transfer happens only in the engine.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use scholarflow_types::message::{AgentMessage, Performative};
use scholarflow_types::state::{FailureKind, InputPrompt, NodeId, WorkflowState};

use crate::collaborator::{CollaboratorError, Collaborators};

use super::delta::StateDelta;

// ---------------------------------------------------------------------------
// NodeOutcome
// ---------------------------------------------------------------------------

/// Result of executing a node.
#[derive(Debug)]
pub enum NodeOutcome {
    /// Merge the delta and move to the next node.
    Continue(StateDelta),
    /// Merge the delta, record the prompt, and stop until external input arrives.
    Suspend(StateDelta, InputPrompt),
    /// Merge the delta (messages only, plus documented defaults) and record the error.
    Fail(StateDelta, NodeFailure),
}

impl NodeOutcome {
    /// Failure outcome carrying a single `error_report` message.
    pub fn fail(state: &WorkflowState, node: NodeId, failure: NodeFailure) -> Self {
        let delta = StateDelta::new().message(error_report(state, node, &failure));
        Self::Fail(delta, failure)
    }
}

/// A node-reported failure.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFailure {
    pub kind: FailureKind,
    pub message: String,
    pub detail: Option<String>,
}

impl NodeFailure {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Validation,
            message: message.into(),
            detail: None,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
            detail: None,
        }
    }

    /// Classify a collaborator error raised by `operation`.
    pub fn from_collaborator(operation: &str, err: &CollaboratorError) -> Self {
        Self {
            kind: err.failure_kind(),
            message: format!("{operation} failed: {err}"),
            detail: Some(format!("{err:?}")),
        }
    }
}

/// Build a message attributed to `node` in the workflow's conversation.
pub fn node_message(
    state: &WorkflowState,
    node: NodeId,
    performative: Performative,
    content: Value,
) -> AgentMessage {
    AgentMessage::new(state.conversation_id(), node.as_str(), performative, content)
}

pub fn error_report(state: &WorkflowState, node: NodeId, failure: &NodeFailure) -> AgentMessage {
    node_message(
        state,
        node,
        Performative::ErrorReport,
        json!({
            "status": "failed",
            "error_message": failure.message,
            "failure_kind": failure.kind,
        }),
    )
}

// ---------------------------------------------------------------------------
// NodeContext
// ---------------------------------------------------------------------------

/// Per-execution environment handed to a node by the engine.
pub struct NodeContext<'a> {
    pub workflow_id: Uuid,
    pub collaborators: &'a Collaborators,
    pub cancel: &'a CancellationToken,
    /// Applied to each collaborator call individually.
    pub call_timeout: Duration,
}

impl NodeContext<'_> {
    /// Await a collaborator call under the per-call timeout, racing cancellation.
    pub async fn call<T, F>(&self, operation: &'static str, fut: F) -> Result<T, CollaboratorError>
    where
        F: Future<Output = Result<T, CollaboratorError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(CollaboratorError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CollaboratorError::Cancelled),
            result = tokio::time::timeout(self.call_timeout, fut) => match result {
                Ok(inner) => inner,
                Err(_) => {
                    tracing::warn!(
                        workflow_id = %self.workflow_id,
                        operation,
                        timeout_secs = self.call_timeout.as_secs(),
                        "collaborator call timed out"
                    );
                    Err(CollaboratorError::Timeout {
                        operation,
                        secs: self.call_timeout.as_secs(),
                    })
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Node traits
// ---------------------------------------------------------------------------

/// A pipeline stage.
///
/// Implementations must not panic; collaborator failures are returned as
/// [`NodeOutcome::Fail`]. Re-running a node with the same upstream state must
/// be safe.
pub trait Node: Send + Sync {
    fn id(&self) -> NodeId;

    fn execute(
        &self,
        state: &WorkflowState,
        ctx: &NodeContext<'_>,
    ) -> impl Future<Output = NodeOutcome> + Send;
}

/// Object-safe version of [`Node`] with a boxed future, used by the node registry.
pub trait NodeDyn: Send + Sync {
    fn id(&self) -> NodeId;

    fn execute_boxed<'a>(
        &'a self,
        state: &'a WorkflowState,
        ctx: &'a NodeContext<'a>,
    ) -> Pin<Box<dyn Future<Output = NodeOutcome> + Send + 'a>>;
}

impl<T: Node> NodeDyn for T {
    fn id(&self) -> NodeId {
        Node::id(self)
    }

    fn execute_boxed<'a>(
        &'a self,
        state: &'a WorkflowState,
        ctx: &'a NodeContext<'a>,
    ) -> Pin<Box<dyn Future<Output = NodeOutcome> + Send + 'a>> {
        Box::pin(self.execute(state, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::testing::{mock_collaborators, ScriptedAgent};
    use scholarflow_types::state::WorkflowConfig;

    #[tokio::test]
    async fn call_times_out_per_call() {
        let collaborators = mock_collaborators(ScriptedAgent::default());
        let cancel = CancellationToken::new();
        let ctx = NodeContext {
            workflow_id: Uuid::now_v7(),
            collaborators: &collaborators,
            cancel: &cancel,
            call_timeout: Duration::from_millis(20),
        };

        let result: Result<(), _> = ctx
            .call("slow", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        match result {
            Err(CollaboratorError::Timeout { operation, .. }) => assert_eq!(operation, "slow"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn call_observes_cancellation() {
        let collaborators = mock_collaborators(ScriptedAgent::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = NodeContext {
            workflow_id: Uuid::now_v7(),
            collaborators: &collaborators,
            cancel: &cancel,
            call_timeout: Duration::from_secs(5),
        };

        let result: Result<u32, _> = ctx.call("noop", async { Ok(1) }).await;
        assert!(matches!(result, Err(CollaboratorError::Cancelled)));
    }

    #[test]
    fn fail_outcome_carries_error_report() {
        let state = WorkflowState::new(Uuid::now_v7(), "q", None, WorkflowConfig::default());
        let outcome = NodeOutcome::fail(&state, NodeId::Search, NodeFailure::transient("boom"));

        match outcome {
            NodeOutcome::Fail(delta, failure) => {
                assert_eq!(failure.kind, FailureKind::Transient);
                assert_eq!(delta.messages.len(), 1);
                assert_eq!(delta.messages[0].performative, Performative::ErrorReport);
                assert_eq!(delta.messages[0].sender, "search");
                assert_eq!(delta.messages[0].content["error_message"], "boom");
            }
            other => panic!("expected Fail, got {other:?}"),
        }
    }

    #[test]
    fn collaborator_failure_classification() {
        let failure =
            NodeFailure::from_collaborator("search", &CollaboratorError::Connection("reset".into()));
        assert_eq!(failure.kind, FailureKind::Transient);
        assert!(failure.message.contains("search failed"));

        let failure =
            NodeFailure::from_collaborator("ingest", &CollaboratorError::Rejected("bad id".into()));
        assert_eq!(failure.kind, FailureKind::Validation);
    }
}
