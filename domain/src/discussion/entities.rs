//! Discussion entities
//!
//! Core state for a single discussion run: the message log, the participant
//! roster, and the engine-owned [`DiscussionState`] aggregate.

use crate::core::{DomainError, current_timestamp_ms};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reserved sub-conversation key for the optional transcript mirror.
///
/// Not a participant name; kept alongside participant keys in
/// [`DiscussionState::sub_conversation_ids`].
pub const TRANSCRIPT_MIRROR_KEY: &str = "__transcript__";

/// A single utterance produced by an agent during a round.
///
/// Immutable once appended to the log. Within a round, insertion order is
/// completion order of the concurrent agent calls, not speaker-list order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Display name of the speaking participant
    pub agent: String,
    /// Free-text content returned by the agent
    pub content: String,
    /// Round number (1-indexed)
    pub round: u32,
    /// Milliseconds since epoch
    pub timestamp: u64,
}

impl Message {
    pub fn new(agent: impl Into<String>, content: impl Into<String>, round: u32) -> Self {
        Self {
            agent: agent.into(),
            content: content.into(),
            round,
            timestamp: current_timestamp_ms(),
        }
    }
}

/// A discussion participant.
///
/// `name` is the unique display key used in the message log; `agent_kind`
/// routes the call to an externally registered subagent identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    pub agent_kind: String,
    /// Role description injected into the participant's prompt
    pub role: Option<String>,
}

impl Participant {
    pub fn new(name: impl Into<String>, agent_kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agent_kind: agent_kind.into(),
            role: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

/// Lifecycle status of a discussion run.
///
/// `Completed`, `Failed`, and `Cancelled` are terminal: once reached, the
/// status never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscussionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl DiscussionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DiscussionStatus::Completed | DiscussionStatus::Failed | DiscussionStatus::Cancelled
        )
    }
}

impl std::fmt::Display for DiscussionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DiscussionStatus::Pending => "pending",
            DiscussionStatus::Running => "running",
            DiscussionStatus::Paused => "paused",
            DiscussionStatus::Completed => "completed",
            DiscussionStatus::Failed => "failed",
            DiscussionStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// An error recorded against a specific agent/round during a run.
///
/// Append-only: entries are never removed while the discussion runs. A single
/// agent's failure degrades that round but never aborts the discussion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscussionError {
    pub agent: Option<String>,
    pub round: Option<u32>,
    pub message: String,
    pub code: Option<String>,
    pub retry_count: Option<u32>,
}

impl DiscussionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            agent: None,
            round: None,
            message: message.into(),
            code: None,
            retry_count: None,
        }
    }

    pub fn for_agent(mut self, agent: impl Into<String>, round: u32) -> Self {
        self.agent = Some(agent.into());
        self.round = Some(round);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.retry_count = Some(count);
        self
    }
}

/// Mutable aggregate for one discussion run.
///
/// Owned exclusively by the engine and mutated only from its round loop and
/// terminal handlers; sub-components never touch it, so no locking is needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscussionState {
    pub id: String,
    pub topic: String,
    pub status: DiscussionStatus,
    pub current_round: u32,
    pub max_rounds: u32,
    pub messages: Vec<Message>,
    pub participants: Vec<Participant>,
    /// participant name (or reserved key) -> sub-conversation id
    pub sub_conversation_ids: HashMap<String, String>,
    pub errors: Vec<DiscussionError>,
    pub stop_reason: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl DiscussionState {
    pub fn new(
        id: impl Into<String>,
        topic: impl Into<String>,
        participants: Vec<Participant>,
        max_rounds: u32,
    ) -> Self {
        let now = current_timestamp_ms();
        Self {
            id: id.into(),
            topic: topic.into(),
            status: DiscussionStatus::Pending,
            current_round: 0,
            max_rounds,
            messages: Vec::new(),
            participants,
            sub_conversation_ids: HashMap::new(),
            errors: Vec::new(),
            stop_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message to the log.
    ///
    /// The log is append-only and never reordered; a message's round must not
    /// exceed the current round at append time.
    pub fn append_message(&mut self, message: Message) -> Result<(), DomainError> {
        if message.round == 0 || message.round > self.current_round {
            return Err(DomainError::InvalidConfig(format!(
                "message round {} outside current round {}",
                message.round, self.current_round
            )));
        }
        self.messages.push(message);
        self.touch();
        Ok(())
    }

    /// Record an error entry. Entries are never removed during a run.
    pub fn record_error(&mut self, error: DiscussionError) {
        self.errors.push(error);
        self.touch();
    }

    /// Advance to the given round. Rounds only move forward, up to max_rounds.
    pub fn begin_round(&mut self, round: u32) -> Result<(), DomainError> {
        if round < self.current_round || round > self.max_rounds {
            return Err(DomainError::InvalidConfig(format!(
                "round {} out of range (current {}, max {})",
                round, self.current_round, self.max_rounds
            )));
        }
        self.current_round = round;
        self.touch();
        Ok(())
    }

    /// Transition status. Terminal statuses are sticky.
    pub fn set_status(&mut self, status: DiscussionStatus) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.touch();
    }

    pub fn participant(&self, name: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.name == name)
    }

    /// All sub-conversation ids created so far (participants + mirror).
    pub fn created_session_ids(&self) -> Vec<String> {
        self.sub_conversation_ids.values().cloned().collect()
    }

    fn touch(&mut self) {
        self.updated_at = current_timestamp_ms();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> DiscussionState {
        DiscussionState::new(
            "d1",
            "topic",
            vec![
                Participant::new("A", "advocate"),
                Participant::new("B", "critic"),
            ],
            3,
        )
    }

    #[test]
    fn test_append_within_current_round() {
        let mut s = state();
        s.begin_round(1).unwrap();
        s.append_message(Message::new("A", "hello", 1)).unwrap();
        assert_eq!(s.messages.len(), 1);
    }

    #[test]
    fn test_append_beyond_current_round_rejected() {
        let mut s = state();
        s.begin_round(1).unwrap();
        assert!(s.append_message(Message::new("A", "x", 2)).is_err());
        assert!(s.append_message(Message::new("A", "x", 0)).is_err());
    }

    #[test]
    fn test_round_never_exceeds_max() {
        let mut s = state();
        assert!(s.begin_round(4).is_err());
        s.begin_round(3).unwrap();
        assert!(s.begin_round(2).is_err());
    }

    #[test]
    fn test_terminal_status_is_sticky() {
        let mut s = state();
        s.set_status(DiscussionStatus::Running);
        s.set_status(DiscussionStatus::Cancelled);
        s.set_status(DiscussionStatus::Completed);
        assert_eq!(s.status, DiscussionStatus::Cancelled);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(DiscussionStatus::Completed.to_string(), "completed");
        assert_eq!(DiscussionStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_discussion_error_builder() {
        let err = DiscussionError::new("boom")
            .for_agent("A", 2)
            .with_code("timeout")
            .with_retry_count(3);
        assert_eq!(err.agent.as_deref(), Some("A"));
        assert_eq!(err.round, Some(2));
        assert_eq!(err.code.as_deref(), Some("timeout"));
        assert_eq!(err.retry_count, Some(3));
    }
}
