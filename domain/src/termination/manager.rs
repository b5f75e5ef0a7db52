//! Termination manager
//!
//! Holds an ordered rule chain and answers, once per round, whether the
//! discussion should stop before its round budget runs out. Custom rules
//! shadow built-ins of the same name; evaluation order is priority
//! descending, and the first confident stop signal wins.

use crate::termination::rule::{
    TerminationConfig, TerminationContext, TerminationRule, TerminationSignal,
};
use std::collections::HashSet;
use std::time::Duration;
use tracing::warn;

/// Wall-clock ceiling enforced by the built-in `timeout` rule,
/// independent of any configuration
const MAX_DISCUSSION_TIME: Duration = Duration::from_secs(10 * 60);

pub struct TerminationManager {
    rules: Vec<TerminationRule>,
    config: TerminationConfig,
}

impl TerminationManager {
    /// Custom rules come first in the merge, so a custom rule wins over a
    /// built-in with the same name.
    pub fn new(custom_rules: Vec<TerminationRule>, config: TerminationConfig) -> Self {
        let mut seen = HashSet::new();
        let mut rules = Vec::new();
        for rule in custom_rules
            .into_iter()
            .chain(builtin_rules(&config))
        {
            if seen.insert(rule.name().to_string()) {
                rules.push(rule);
            }
        }
        rules.sort_by(|a, b| b.priority().cmp(&a.priority()));
        Self { rules, config }
    }

    /// First rule, in priority order, whose signal stops with confidence at
    /// or above the configured minimum. A failing rule is logged and skipped.
    pub fn should_terminate(&self, context: &TerminationContext) -> TerminationSignal {
        for rule in &self.rules {
            match rule.check(context) {
                Ok(signal) => {
                    if signal.should_stop && signal.confidence >= self.config.min_confidence {
                        let reason = signal.reason.as_deref().unwrap_or_default();
                        return TerminationSignal {
                            should_stop: true,
                            reason: Some(format!("[{}] {}", rule.name(), reason).trim().to_string()),
                            confidence: signal.confidence,
                        };
                    }
                }
                Err(err) => {
                    warn!(rule = rule.name(), error = %err, "termination rule failed, skipping");
                }
            }
        }
        TerminationSignal::pass()
    }

    /// Adds or replaces a rule by name, re-sorting the chain
    pub fn add_rule(&mut self, rule: TerminationRule) {
        self.rules.retain(|r| r.name() != rule.name());
        self.rules.push(rule);
        self.rules.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    /// Returns true if a rule with that name existed
    pub fn remove_rule(&mut self, name: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.name() != name);
        self.rules.len() < before
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }
}

/// Phrases that count as an explicit consensus declaration in the last
/// message, matched case-insensitively
const EXPLICIT_CONSENSUS_MARKERS: &[&str] = &[
    "consensus reached",
    "consensus_reached",
    "final decision",
    "final_decision",
    "final conclusion",
];

fn builtin_rules(config: &TerminationConfig) -> Vec<TerminationRule> {
    let stalemate_enabled = config.enable_stalemate_detection;
    let stalemate_rounds = config.stalemate_rounds;

    vec![
        TerminationRule::new("explicit_consensus", 100, |ctx| {
            let Some(last) = ctx.messages.last() else {
                return Ok(TerminationSignal::pass());
            };
            let content = last.content.to_lowercase();
            if EXPLICIT_CONSENSUS_MARKERS.iter().any(|m| content.contains(m)) {
                return Ok(TerminationSignal::stop("explicit consensus declared", 1.0));
            }
            Ok(TerminationSignal::pass())
        }),
        TerminationRule::new("high_consensus", 90, |ctx| {
            let score = ctx.consensus_report.overall_score;
            if score >= 0.85 {
                return Ok(TerminationSignal::stop(
                    format!("consensus at {:.0}%", score * 100.0),
                    0.9,
                ));
            }
            Ok(TerminationSignal::pass())
        }),
        TerminationRule::new("convergence_plateau", 80, |ctx| {
            if ctx.current_round >= 2
                && ctx.consensus_report.convergence_rate.abs() < 0.05
                && ctx.consensus_report.overall_score >= 0.6
            {
                return Ok(TerminationSignal::stop(
                    "positions have stabilized, further rounds add little",
                    0.8,
                ));
            }
            Ok(TerminationSignal::pass())
        }),
        TerminationRule::new("collaborative_consensus", 75, |ctx| {
            if ctx.mode == "collaborative" && ctx.consensus_report.overall_score >= 0.75 {
                return Ok(TerminationSignal::stop(
                    "working consensus reached in collaborative mode",
                    0.85,
                ));
            }
            Ok(TerminationSignal::pass())
        }),
        TerminationRule::new("stalemate", 60, move |ctx| {
            if !stalemate_enabled {
                return Ok(TerminationSignal::pass());
            }
            if ctx.current_round >= stalemate_rounds
                && ctx.consensus_report.convergence_rate <= 0.0
                && ctx.consensus_report.has_significant_disagreement()
            {
                return Ok(TerminationSignal::stop(
                    "stalemate detected, disagreement is not resolving",
                    0.7,
                ));
            }
            Ok(TerminationSignal::pass())
        }),
        TerminationRule::new("timeout", 50, |ctx| {
            if ctx.elapsed >= MAX_DISCUSSION_TIME {
                return Ok(TerminationSignal::stop(
                    format!("discussion timed out ({} min)", ctx.elapsed.as_secs() / 60),
                    1.0,
                ));
            }
            Ok(TerminationSignal::pass())
        }),
    ]
}
