//! Discussion mode strategies
//!
//! A mode decides who speaks each round, how participants are framed, and
//! how the final conclusion is assembled. The kind is resolved once at
//! construction into a concrete strategy; nothing branches on mode identity
//! afterwards.

pub mod collaborative;
pub mod debate;

use crate::consensus::ConsensusOverrides;
use crate::discussion::{Message, Participant};
use crate::termination::TerminationRule;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use collaborative::CollaborativeMode;
pub use debate::DebateMode;

/// Which strategy a discussion runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeKind {
    #[default]
    Debate,
    Collaborative,
}

impl ModeKind {
    pub fn resolve(self) -> Box<dyn DiscussionMode> {
        match self {
            ModeKind::Debate => Box::new(DebateMode),
            ModeKind::Collaborative => Box::new(CollaborativeMode),
        }
    }
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeKind::Debate => f.write_str("debate"),
            ModeKind::Collaborative => f.write_str("collaborative"),
        }
    }
}

pub trait DiscussionMode: Send + Sync {
    fn name(&self) -> &'static str;

    /// Speaker names for one round, in nominal order
    fn speakers(&self, round: u32, max_rounds: u32, participants: &[Participant]) -> Vec<String>;

    /// Role description injected into a participant's prompt
    fn agent_role(&self, participant: &Participant) -> String;

    fn generate_conclusion(&self, messages: &[Message], topic: &str) -> String;

    /// Mode-specific rules, merged ahead of the built-ins
    fn termination_rules(&self) -> Vec<TerminationRule> {
        Vec::new()
    }

    /// Mode-specific consensus tweaks, applied over the caller's config
    fn consensus_overrides(&self) -> ConsensusOverrides {
        ConsensusOverrides::default()
    }
}
