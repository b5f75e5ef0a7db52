//! Discussion result
//!
//! The sole externally consumed artifact of a run. Callers observe early
//! termination and cancellation through `status`/`stop_reason` rather than
//! through errors.

use crate::consensus::ConsensusReport;
use crate::discussion::entities::{DiscussionError, DiscussionStatus, Message};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscussionResult {
    pub topic: String,
    pub messages: Vec<Message>,
    pub conclusion: String,
    /// Overall consensus score of the final report, 0 when unavailable
    pub consensus_score: f64,
    /// Number of rounds actually run
    pub rounds: u32,
    pub duration_ms: u64,
    pub status: DiscussionStatus,
    pub stop_reason: Option<String>,
    pub errors: Vec<DiscussionError>,
    /// Most recent consensus report, if at least one round completed
    pub consensus_report: Option<ConsensusReport>,
    /// Reason supplied by the termination manager, if it stopped the run
    pub termination_reason: Option<String>,
    /// True when the run stopped before exhausting max rounds
    pub early_termination: bool,
    /// Sub-conversation ids created during the run (for callers when
    /// keep_sessions is set)
    pub created_session_ids: Vec<String>,
}

impl DiscussionResult {
    pub fn is_completed(&self) -> bool {
        self.status == DiscussionStatus::Completed
    }
}
