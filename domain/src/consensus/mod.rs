//! Consensus scoring over discussion transcripts

pub mod config;
pub mod evaluator;
pub mod report;

pub use config::{ConsensusConfig, ConsensusOverrides};
pub use evaluator::ConsensusEvaluator;
pub use report::{ConsensusReport, Disagreement, Recommendation, Severity};
