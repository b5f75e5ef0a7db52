//! Domain layer for conclave
//!
//! This crate contains the core discussion logic: entities, consensus
//! scoring, termination rules, context compaction, and mode strategies.
//! It has no dependencies on transport or runtime concerns.
//!
//! # Core Concepts
//!
//! ## Discussion
//!
//! A discussion is a bounded sequence of rounds in which registered agents
//! exchange messages on one topic. Each round every scheduled speaker
//! produces one message; the engine then scores the transcript for
//! consensus and asks the termination rule chain whether to stop early.
//!
//! ## Modes
//!
//! - **Debate**: adversarial rounds, moderator-style participants held
//!   back until the final round
//! - **Collaborative**: everyone speaks every round, conclusion is a
//!   synthesis of the final round

pub mod config;
pub mod consensus;
pub mod context;
pub mod core;
pub mod discussion;
pub mod mode;
pub mod termination;

// Re-export commonly used types
pub use config::{
    DiscussionOverrides, DiscussionSettings, MAX_ROUNDS_LIMIT, SandboxLimits, layer_consensus,
    participant_from_spec,
};
pub use consensus::{
    ConsensusConfig, ConsensusEvaluator, ConsensusOverrides, ConsensusReport, Disagreement,
    Recommendation, Severity,
};
pub use context::{
    CompactedContext, CompactorConfig, CompactorOverrides, ContextBuildOptions, ContextCompactor,
    ContextState, ContextSummary, KeyInfo, KeyInfoKind,
};
pub use core::{current_timestamp_ms, error::DomainError};
pub use discussion::{
    DiscussionError, DiscussionResult, DiscussionState, DiscussionStatus, Message, Participant,
    TRANSCRIPT_MIRROR_KEY,
};
pub use mode::{CollaborativeMode, DebateMode, DiscussionMode, ModeKind};
pub use termination::{
    TerminationConfig, TerminationContext, TerminationManager, TerminationOverrides,
    TerminationRule, TerminationSignal,
};
