//! Agent message types and the append-only audit log.
//!
//! Every pipeline stage records what it did as an [`AgentMessage`]. Messages
//! are collected in a [`MessageLog`] whose only mutator is [`MessageLog::append`],
//! so the log can grow but never be reordered or edited.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Performative
// ---------------------------------------------------------------------------

/// Communicative intent of an agent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Performative {
    InformResult,
    InformState,
    RequestAction,
    RequestInfo,
    QueryData,
    ProvideFeedback,
    ConfirmAction,
    RejectAction,
    ErrorReport,
    StatusUpdate,
}

impl Performative {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InformResult => "inform_result",
            Self::InformState => "inform_state",
            Self::RequestAction => "request_action",
            Self::RequestInfo => "request_info",
            Self::QueryData => "query_data",
            Self::ProvideFeedback => "provide_feedback",
            Self::ConfirmAction => "confirm_action",
            Self::RejectAction => "reject_action",
            Self::ErrorReport => "error_report",
            Self::StatusUpdate => "status_update",
        }
    }
}

impl fmt::Display for Performative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AgentMessage
// ---------------------------------------------------------------------------

/// A single entry in the workflow audit log.
///
/// Messages are immutable once created; the `content` payload is free-form JSON
/// (status, counts, error details) chosen by the emitting stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub message_id: Uuid,
    /// Groups all messages of one research session.
    pub conversation_id: String,
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    pub performative: Performative,
    pub content: Value,
    pub timestamp: DateTime<Utc>,
}

impl AgentMessage {
    /// Create a broadcast message (no explicit receiver) stamped with the current time.
    pub fn new(
        conversation_id: impl Into<String>,
        sender: impl Into<String>,
        performative: Performative,
        content: Value,
    ) -> Self {
        Self {
            message_id: Uuid::now_v7(),
            conversation_id: conversation_id.into(),
            sender: sender.into(),
            receiver: None,
            performative,
            content,
            timestamp: Utc::now(),
        }
    }

    /// Address the message to a specific receiver.
    pub fn to(mut self, receiver: impl Into<String>) -> Self {
        self.receiver = Some(receiver.into());
        self
    }
}

// ---------------------------------------------------------------------------
// MessageLog
// ---------------------------------------------------------------------------

/// Append-only ordered sequence of agent messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageLog(Vec<AgentMessage>);

impl MessageLog {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a message at the end of the log.
    pub fn append(&mut self, message: AgentMessage) {
        self.0.push(message);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&AgentMessage> {
        self.0.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AgentMessage> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[AgentMessage] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a MessageLog {
    type Item = &'a AgentMessage;
    type IntoIter = std::slice::Iter<'a, AgentMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
