//! Consensus report types
//!
//! Derived output of the evaluator, recomputed fresh after every round.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How severe a detected disagreement is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Major,
    Blocking,
}

impl Severity {
    /// Major and blocking disagreements gate several termination rules
    pub fn is_significant(&self) -> bool {
        matches!(self, Severity::Major | Severity::Blocking)
    }
}

/// A disagreement detected in the latest round.
///
/// Attribution is deliberately one-sided: the speaker is recorded as the sole
/// opposer and no target is inferred from the text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disagreement {
    /// Short text window around the matched phrase
    pub topic: String,
    pub supporters: Vec<String>,
    pub opposers: Vec<String>,
    pub severity: Severity,
}

/// What the evaluator recommends the caller do next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Continue,
    Conclude,
    Pivot,
}

/// Consensus estimate over the full message history.
///
/// Pure function of history + config; the engine only ever keeps the most
/// recent report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusReport {
    /// Overall agreement level in [0, 1]
    pub overall_score: f64,
    /// Round-over-round movement in [-1, 1]; positive means converging
    pub convergence_rate: f64,
    /// Pairwise matrix. Only the diagonal (1.0) is meaningful; off-diagonal
    /// cells are a neutral 0.5 placeholder.
    pub agreement_matrix: HashMap<String, HashMap<String, f64>>,
    pub disagreements: Vec<Disagreement>,
    pub recommendation: Recommendation,
}

impl ConsensusReport {
    /// Neutral report for histories too short to score
    pub fn empty() -> Self {
        Self {
            overall_score: 0.0,
            convergence_rate: 0.0,
            agreement_matrix: HashMap::new(),
            disagreements: Vec::new(),
            recommendation: Recommendation::Continue,
        }
    }

    pub fn has_blocking_disagreement(&self) -> bool {
        self.disagreements.iter().any(|d| d.severity == Severity::Blocking)
    }

    pub fn has_significant_disagreement(&self) -> bool {
        self.disagreements.iter().any(|d| d.severity.is_significant())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_is_neutral() {
        let report = ConsensusReport::empty();
        assert_eq!(report.overall_score, 0.0);
        assert_eq!(report.recommendation, Recommendation::Continue);
        assert!(!report.has_blocking_disagreement());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Blocking > Severity::Major);
        assert!(Severity::Major > Severity::Minor);
        assert!(Severity::Major.is_significant());
        assert!(!Severity::Minor.is_significant());
    }
}
