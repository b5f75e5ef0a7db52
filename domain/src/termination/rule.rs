//! Termination rule types
//!
//! A rule is a named, prioritized predicate over a [`TerminationContext`].
//! Built-in rules live in the manager; discussion modes may contribute
//! custom rules that shadow built-ins of the same name.

use crate::consensus::ConsensusReport;
use crate::core::DomainError;
use crate::discussion::Message;
use std::fmt;
use std::time::Duration;

/// Snapshot handed to every rule once per round
#[derive(Debug, Clone)]
pub struct TerminationContext {
    pub messages: Vec<Message>,
    pub current_round: u32,
    pub max_rounds: u32,
    pub consensus_report: ConsensusReport,
    pub mode: String,
    pub elapsed: Duration,
}

/// Outcome of a single rule check
#[derive(Debug, Clone, PartialEq)]
pub struct TerminationSignal {
    pub should_stop: bool,
    pub reason: Option<String>,
    pub confidence: f64,
}

impl TerminationSignal {
    pub fn stop(reason: impl Into<String>, confidence: f64) -> Self {
        Self {
            should_stop: true,
            reason: Some(reason.into()),
            confidence,
        }
    }

    pub fn pass() -> Self {
        Self {
            should_stop: false,
            reason: None,
            confidence: 0.0,
        }
    }
}

type CheckFn = dyn Fn(&TerminationContext) -> Result<TerminationSignal, DomainError> + Send + Sync;

/// Named, prioritized termination check. Higher priority runs first.
pub struct TerminationRule {
    name: String,
    priority: i32,
    check: Box<CheckFn>,
}

impl TerminationRule {
    pub fn new<F>(name: impl Into<String>, priority: i32, check: F) -> Self
    where
        F: Fn(&TerminationContext) -> Result<TerminationSignal, DomainError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            priority,
            check: Box::new(check),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn check(&self, ctx: &TerminationContext) -> Result<TerminationSignal, DomainError> {
        (self.check)(ctx)
    }
}

impl fmt::Debug for TerminationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminationRule")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Manager-level knobs
#[derive(Debug, Clone, PartialEq)]
pub struct TerminationConfig {
    /// Signals below this confidence are skipped
    pub min_confidence: f64,
    pub enable_stalemate_detection: bool,
    /// Round count at which a non-converging disagreement counts as a stalemate
    pub stalemate_rounds: u32,
}

impl Default for TerminationConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            enable_stalemate_detection: true,
            stalemate_rounds: 3,
        }
    }
}

/// Per-field overrides applied on top of [`TerminationConfig::default`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerminationOverrides {
    pub min_confidence: Option<f64>,
    pub enable_stalemate_detection: Option<bool>,
    pub stalemate_rounds: Option<u32>,
}

impl TerminationConfig {
    pub fn merged(overrides: &TerminationOverrides) -> Self {
        let base = Self::default();
        Self {
            min_confidence: overrides.min_confidence.unwrap_or(base.min_confidence),
            enable_stalemate_detection: overrides
                .enable_stalemate_detection
                .unwrap_or(base.enable_stalemate_detection),
            stalemate_rounds: overrides.stalemate_rounds.unwrap_or(base.stalemate_rounds),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_constructors() {
        let stop = TerminationSignal::stop("done", 0.9);
        assert!(stop.should_stop);
        assert_eq!(stop.reason.as_deref(), Some("done"));
        assert_eq!(stop.confidence, 0.9);

        let pass = TerminationSignal::pass();
        assert!(!pass.should_stop);
        assert_eq!(pass.confidence, 0.0);
    }

    #[test]
    fn test_config_merge_overrides_scalars() {
        let merged = TerminationConfig::merged(&TerminationOverrides {
            stalemate_rounds: Some(2),
            ..Default::default()
        });
        assert_eq!(merged.stalemate_rounds, 2);
        assert_eq!(merged.min_confidence, 0.7);
        assert!(merged.enable_stalemate_detection);
    }
}
