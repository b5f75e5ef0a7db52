//! Consensus evaluator
//!
//! Multi-signal scoring of agreement level and trend over the message
//! history. Scoring is heuristic (keywords, reference patterns, round
//! deltas), not semantic. `evaluate` is a pure function: identical input
//! always yields an identical report.

use crate::consensus::config::ConsensusConfig;
use crate::consensus::report::{ConsensusReport, Disagreement, Recommendation, Severity};
use crate::discussion::Message;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Patterns signaling explicit agreement with another participant.
///
/// `\bagree` does not fire inside "disagree" (no word boundary after "dis").
static POSITIVE_REFERENCE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bagree(s|d)? with",
        r"(?i)\bas \w+ (said|mentioned|noted|pointed out)",
        r"(?i)@\w+ (is|was) right",
        r"(?i)\bsecond(s)? (the|that|this)",
        r"(?i)\bconcur with",
        r"(?i)\bbuild(ing)? on \w+'?s? point",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid reference pattern"))
    .collect()
});

/// Patterns signaling explicit disagreement with another participant
static NEGATIVE_REFERENCE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bdisagree(s|d)? with",
        r"(?i)\bcontrary to",
        r"(?i)\bpush(es|ed)? back on",
        r"(?i)\bobject(s|ed)? to",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid reference pattern"))
    .collect()
});

/// Severity-tagged opposition patterns, scanned over the latest round only
static OPPOSITION_PATTERNS: LazyLock<Vec<(Regex, Severity)>> = LazyLock::new(|| {
    [
        (r"(?i)\bstrongly disagree", Severity::Blocking),
        (r"(?i)\bcannot accept", Severity::Blocking),
        (r"(?i)\babsolutely not\b", Severity::Blocking),
        (r"(?i)\bdisagree(s|d)? with", Severity::Major),
        (r"(?i)\bobject(s|ed)? to", Severity::Major),
        (r"(?i)\boppose(s|d)? (the|this)", Severity::Major),
        (r"(?i)\bdisagree\b", Severity::Minor),
        (r"(?i)\bnot convinced", Severity::Minor),
    ]
    .iter()
    .map(|(p, s)| (Regex::new(p).expect("valid opposition pattern"), *s))
    .collect()
});

/// Evaluates consensus over a message history.
///
/// Stateless across calls; holds only configuration and the lowercased
/// keyword table derived from it.
pub struct ConsensusEvaluator {
    config: ConsensusConfig,
    keywords: Vec<(String, f64)>,
}

impl ConsensusEvaluator {
    pub fn new(config: ConsensusConfig) -> Self {
        let keywords = config
            .keyword_weights
            .iter()
            .map(|(k, w)| (k.to_lowercase(), *w))
            .collect();
        Self { config, keywords }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Score the full message history.
    pub fn evaluate(&self, messages: &[Message]) -> ConsensusReport {
        if messages.len() < 2 {
            return ConsensusReport::empty();
        }

        let latest = latest_round_messages(messages);
        let keyword_score = self.latest_keyword_score(&latest);
        let reference_score = reference_score(&latest);
        let convergence_rate = if self.config.enable_convergence_analysis {
            self.convergence_rate(messages)
        } else {
            0.0
        };

        let overall_score = combine_scores(keyword_score, reference_score, convergence_rate);
        let disagreements = identify_disagreements(&latest);
        let recommendation = self.recommendation(overall_score, &disagreements, convergence_rate);

        ConsensusReport {
            overall_score,
            convergence_rate,
            agreement_matrix: agreement_matrix(messages),
            disagreements,
            recommendation,
        }
    }

    /// Keyword score over the latest round.
    ///
    /// A round with zero keyword matches scores a neutral 0.5 rather than 0,
    /// so terse replies do not read as disagreement.
    fn latest_keyword_score(&self, latest: &[&Message]) -> f64 {
        if latest.is_empty() {
            return 0.5;
        }
        let mut total = 0.0;
        let mut matches = 0usize;
        for msg in latest {
            let content = msg.content.to_lowercase();
            for (keyword, weight) in &self.keywords {
                if content.contains(keyword) {
                    total += weight;
                    matches += 1;
                }
            }
        }
        if matches == 0 {
            return 0.5;
        }
        let avg = total / latest.len() as f64;
        ((avg + 1.0) / 2.0).clamp(0.0, 1.0)
    }

    /// Keyword score of one specific round, used for convergence deltas
    fn round_keyword_score(&self, round_messages: &[&Message]) -> f64 {
        if round_messages.is_empty() {
            return 0.5;
        }
        let mut total = 0.0;
        for msg in round_messages {
            let content = msg.content.to_lowercase();
            for (keyword, weight) in &self.keywords {
                if content.contains(keyword) {
                    total += weight;
                }
            }
        }
        ((total / round_messages.len() as f64 + 1.0) / 2.0).clamp(0.0, 1.0)
    }

    /// Keyword score of the latest round minus the round before it.
    /// Positive means movement toward agreement, independent of level.
    fn convergence_rate(&self, messages: &[Message]) -> f64 {
        let mut rounds: Vec<u32> = messages.iter().map(|m| m.round).collect();
        rounds.sort_unstable();
        rounds.dedup();
        if rounds.len() < 2 {
            return 0.0;
        }
        let prev = rounds[rounds.len() - 2];
        let curr = rounds[rounds.len() - 1];
        let prev_msgs: Vec<&Message> = messages.iter().filter(|m| m.round == prev).collect();
        let curr_msgs: Vec<&Message> = messages.iter().filter(|m| m.round == curr).collect();
        self.round_keyword_score(&curr_msgs) - self.round_keyword_score(&prev_msgs)
    }

    fn recommendation(
        &self,
        score: f64,
        disagreements: &[Disagreement],
        convergence: f64,
    ) -> Recommendation {
        let blocking = disagreements.iter().any(|d| d.severity == Severity::Blocking);
        let major = disagreements.iter().any(|d| d.severity == Severity::Major);

        // Stuck on something fundamental and not improving
        if blocking && convergence <= 0.0 {
            return Recommendation::Pivot;
        }
        if score >= self.config.consensus_threshold {
            return Recommendation::Conclude;
        }
        // Softer secondary bar: decent score, nothing major, not regressing
        if score >= 0.7 && !major && convergence >= 0.0 {
            return Recommendation::Conclude;
        }
        Recommendation::Continue
    }
}

fn latest_round_messages(messages: &[Message]) -> Vec<&Message> {
    let last_round = messages.iter().map(|m| m.round).max().unwrap_or(0);
    messages.iter().filter(|m| m.round == last_round).collect()
}

/// Explicit agreement-with vs. disagreement-with over the latest round.
/// Zero matches is neutral 0.5.
fn reference_score(latest: &[&Message]) -> f64 {
    let mut positive = 0usize;
    let mut negative = 0usize;
    for msg in latest {
        for pattern in POSITIVE_REFERENCE_PATTERNS.iter() {
            if pattern.is_match(&msg.content) {
                positive += 1;
            }
        }
        for pattern in NEGATIVE_REFERENCE_PATTERNS.iter() {
            if pattern.is_match(&msg.content) {
                negative += 1;
            }
        }
    }
    let total = positive + negative;
    if total == 0 {
        return 0.5;
    }
    positive as f64 / total as f64
}

/// `0.5*keyword + 0.3*reference + 0.2*max(0, convergence)`.
/// Convergence only ever helps; a regressing round already lowers the
/// per-round scores.
fn combine_scores(keyword: f64, reference: f64, convergence: f64) -> f64 {
    let base = keyword * 0.5 + reference * 0.3;
    let bonus = convergence.max(0.0) * 0.2;
    (base + bonus).clamp(0.0, 1.0)
}

fn identify_disagreements(latest: &[&Message]) -> Vec<Disagreement> {
    let mut disagreements = Vec::new();
    for msg in latest {
        for (pattern, severity) in OPPOSITION_PATTERNS.iter() {
            if let Some(found) = pattern.find(&msg.content) {
                disagreements.push(Disagreement {
                    topic: context_window(&msg.content, found.start(), found.end()),
                    supporters: Vec::new(),
                    opposers: vec![msg.agent.clone()],
                    severity: *severity,
                });
            }
        }
    }
    disagreements
}

/// A short text window around a match, clamped to char boundaries
fn context_window(content: &str, match_start: usize, match_end: usize) -> String {
    let mut start = match_start.saturating_sub(20);
    while !content.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (match_end + 30).min(content.len());
    while !content.is_char_boundary(end) {
        end += 1;
    }
    content[start..end].replace('\n', " ").trim().to_string()
}

/// Diagonal 1.0, every other cell a neutral 0.5. No pairwise computation is
/// performed; callers treat off-diagonal cells as placeholders.
fn agreement_matrix(messages: &[Message]) -> HashMap<String, HashMap<String, f64>> {
    let mut agents: Vec<&str> = messages.iter().map(|m| m.agent.as_str()).collect();
    agents.sort_unstable();
    agents.dedup();

    let mut matrix = HashMap::new();
    for a in &agents {
        let mut row = HashMap::new();
        for b in &agents {
            row.insert(b.to_string(), if a == b { 1.0 } else { 0.5 });
        }
        matrix.insert(a.to_string(), row);
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(agent: &str, content: &str, round: u32) -> Message {
        Message::new(agent, content, round)
    }

    fn evaluator() -> ConsensusEvaluator {
        ConsensusEvaluator::new(ConsensusConfig::default())
    }

    #[test]
    fn test_fewer_than_two_messages_is_neutral() {
        let report = evaluator().evaluate(&[msg("A", "I propose X", 1)]);
        assert_eq!(report.overall_score, 0.0);
        assert_eq!(report.recommendation, Recommendation::Continue);
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let messages = vec![
            msg("A", "I agree with B, sounds good", 1),
            msg("B", "Support, no objection", 1),
        ];
        let ev = evaluator();
        let first = ev.evaluate(&messages);
        let second = ev.evaluate(&messages);
        assert_eq!(first, second);
    }

    #[test]
    fn test_explicit_disagreement_scores_low_with_major_entry() {
        let messages = vec![
            msg("A", "I propose X", 1),
            msg("B", "I disagree with X", 1),
        ];
        let report = evaluator().evaluate(&messages);
        assert!(report.overall_score < 0.5, "score {}", report.overall_score);
        assert!(
            report
                .disagreements
                .iter()
                .any(|d| d.severity.is_significant()),
            "expected a major/blocking disagreement: {:?}",
            report.disagreements
        );
        assert_eq!(report.disagreements[0].opposers, vec!["B".to_string()]);
    }

    #[test]
    fn test_terse_round_scores_neutral_not_zero() {
        let messages = vec![msg("A", "ok.", 1), msg("B", "noted.", 1)];
        let report = evaluator().evaluate(&messages);
        // keyword 0.5, reference 0.5 => 0.4 base
        assert!((report.overall_score - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_strong_agreement_recommends_conclude() {
        let messages = vec![
            msg("A", "I agree with B, lgtm, we are aligned", 1),
            msg("B", "Concur with A. sounds good, no objection", 1),
        ];
        let report = evaluator().evaluate(&messages);
        assert!(report.overall_score >= 0.7, "score {}", report.overall_score);
        assert_eq!(report.recommendation, Recommendation::Conclude);
    }

    #[test]
    fn test_convergence_positive_when_moving_toward_agreement() {
        let messages = vec![
            msg("A", "I disagree, this is a problem", 1),
            msg("B", "strongly disagree with the plan", 1),
            msg("A", "actually I agree with B now, sounds good", 2),
            msg("B", "lgtm, aligned", 2),
        ];
        let report = evaluator().evaluate(&messages);
        assert!(report.convergence_rate > 0.0);
    }

    #[test]
    fn test_blocking_disagreement_without_progress_pivots() {
        let messages = vec![
            msg("A", "we should ship it", 1),
            msg("B", "I strongly disagree, I cannot accept this", 1),
        ];
        let report = evaluator().evaluate(&messages);
        assert!(report.has_blocking_disagreement());
        assert_eq!(report.recommendation, Recommendation::Pivot);
    }

    #[test]
    fn test_convergence_disabled_by_config() {
        let config = ConsensusConfig {
            enable_convergence_analysis: false,
            ..Default::default()
        };
        let messages = vec![
            msg("A", "disagree", 1),
            msg("B", "disagree", 1),
            msg("A", "agree with B", 2),
            msg("B", "lgtm", 2),
        ];
        let report = ConsensusEvaluator::new(config).evaluate(&messages);
        assert_eq!(report.convergence_rate, 0.0);
    }

    #[test]
    fn test_agreement_matrix_diagonal_only() {
        let messages = vec![msg("A", "hello there", 1), msg("B", "hello back", 1)];
        let report = evaluator().evaluate(&messages);
        assert_eq!(report.agreement_matrix["A"]["A"], 1.0);
        assert_eq!(report.agreement_matrix["A"]["B"], 0.5);
        assert_eq!(report.agreement_matrix["B"]["A"], 0.5);
    }

    #[test]
    fn test_only_latest_round_is_scanned_for_disagreements() {
        let messages = vec![
            msg("A", "I strongly disagree", 1),
            msg("B", "noted", 1),
            msg("A", "on reflection, agree with B", 2),
            msg("B", "lgtm", 2),
        ];
        let report = evaluator().evaluate(&messages);
        assert!(report.disagreements.is_empty());
    }

    #[test]
    fn test_context_window_clamps_multibyte_content() {
        let content = "れれれれれれれれれれ I disagree with it れれれれれれれれれれれれれれ";
        let found = Regex::new(r"disagree with").unwrap().find(content).unwrap();
        let window = context_window(content, found.start(), found.end());
        assert!(window.contains("disagree with"));
    }
}
