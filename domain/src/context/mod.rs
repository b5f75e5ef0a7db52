//! Prompt context construction and compaction

pub mod compactor;
pub mod config;
pub mod summary;

pub use compactor::{ContextBuildOptions, ContextCompactor};
pub use config::{CompactorConfig, CompactorOverrides};
pub use summary::{CompactedContext, ContextState, ContextSummary, KeyInfo, KeyInfoKind};
