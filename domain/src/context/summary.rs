//! Compaction output types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Category of an extracted key-information item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyInfoKind {
    Agreement,
    Disagreement,
    Decision,
    ActionItem,
    CriticalQuote,
}

impl fmt::Display for KeyInfoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KeyInfoKind::Agreement => "agreement",
            KeyInfoKind::Disagreement => "disagreement",
            KeyInfoKind::Decision => "decision",
            KeyInfoKind::ActionItem => "action_item",
            KeyInfoKind::CriticalQuote => "critical_quote",
        };
        f.write_str(s)
    }
}

/// A single statement worth carrying forward out of compacted rounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub kind: KeyInfoKind,
    pub agent: String,
    pub round: u32,
    pub content: String,
    /// Ranking weight in `[0.1, 1]`
    pub importance: f64,
}

/// Structured summary of the rounds that were folded away
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSummary {
    pub progress_overview: String,
    pub agreements: Vec<String>,
    pub disagreements: Vec<String>,
    pub pending_decisions: Vec<String>,
    /// Inclusive round range that was compacted
    pub compacted_rounds: (u32, u32),
    /// First utterance per participant within the compacted range
    pub participant_stances: HashMap<String, String>,
}

/// What the compactor hands back for one (agent, round) prompt
#[derive(Debug, Clone, PartialEq)]
pub struct CompactedContext {
    /// Text block injected into the agent's prompt
    pub content: String,
    /// Estimated pre-compaction size in chars
    pub original_length: usize,
    /// Actual injected size in chars
    pub compacted_length: usize,
    pub compression_ratio: f64,
    pub was_compacted: bool,
    pub preserved_key_info: Vec<KeyInfo>,
    pub summary: Option<ContextSummary>,
}

/// Running counters kept across calls within one discussion,
/// for observability only
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextState {
    pub total_chars: usize,
    pub estimated_tokens: usize,
    pub compaction_count: u32,
    pub last_compaction_at: Option<u64>,
    pub historical_summaries: Vec<ContextSummary>,
}
