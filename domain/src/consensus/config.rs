//! Consensus evaluation configuration
//!
//! Keyword weights are signed: positive entries are agreement vocabulary,
//! negative entries are disagreement/hedging vocabulary, small positive
//! entries mark conditional acceptance. Matching is lowercase substring
//! matching, so "agree" also fires inside "disagree" and the pair cancels —
//! the table is tuned with that in mind.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Overall score at which the evaluator recommends concluding
    pub consensus_threshold: f64,
    /// Whether round-over-round convergence is computed
    pub enable_convergence_analysis: bool,
    /// Rounds without movement before the history counts as a stalemate
    pub stalemate_window: u32,
    /// Signed keyword weights, matched case-insensitively as substrings
    pub keyword_weights: HashMap<String, f64>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            consensus_threshold: 0.8,
            enable_convergence_analysis: true,
            stalemate_window: 2,
            keyword_weights: default_keyword_weights(),
        }
    }
}

/// Partial overrides for [`ConsensusConfig`].
///
/// Merge semantics are explicit per field: scalars override when present,
/// keyword weights merge entry-by-entry (override entries win).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsensusOverrides {
    pub consensus_threshold: Option<f64>,
    pub enable_convergence_analysis: Option<bool>,
    pub stalemate_window: Option<u32>,
    pub keyword_weights: Option<HashMap<String, f64>>,
}

impl ConsensusConfig {
    /// Apply a layer of partial overrides, returning the merged config.
    pub fn merged(mut self, overrides: &ConsensusOverrides) -> Self {
        if let Some(threshold) = overrides.consensus_threshold {
            self.consensus_threshold = threshold;
        }
        if let Some(enabled) = overrides.enable_convergence_analysis {
            self.enable_convergence_analysis = enabled;
        }
        if let Some(window) = overrides.stalemate_window {
            self.stalemate_window = window;
        }
        if let Some(weights) = &overrides.keyword_weights {
            for (keyword, weight) in weights {
                self.keyword_weights.insert(keyword.clone(), *weight);
            }
        }
        self
    }
}

fn default_keyword_weights() -> HashMap<String, f64> {
    let entries: &[(&str, f64)] = &[
        // agreement vocabulary
        ("agree", 0.8),
        ("concur", 0.8),
        ("aligned", 0.9),
        ("consensus", 0.9),
        ("support", 0.7),
        ("sounds good", 0.7),
        ("no objection", 0.7),
        ("works for me", 0.6),
        ("makes sense", 0.5),
        ("confirmed", 0.7),
        ("lgtm", 1.0),
        // disagreement / hedging vocabulary
        ("disagree", -0.8),
        ("oppose", -0.8),
        ("object", -0.5),
        ("however", -0.3),
        ("concern", -0.3),
        ("problem", -0.2),
        ("risk", -0.2),
        // conditional acceptance
        ("provided that", 0.1),
        ("as long as", 0.1),
        ("on the condition", 0.1),
    ];
    entries
        .iter()
        .map(|(k, w)| (k.to_string(), *w))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = ConsensusConfig::default();
        assert_eq!(config.consensus_threshold, 0.8);
        assert!(config.enable_convergence_analysis);
        assert_eq!(config.keyword_weights.get("lgtm"), Some(&1.0));
        assert_eq!(config.keyword_weights.get("disagree"), Some(&-0.8));
    }

    #[test]
    fn test_merged_scalars_override() {
        let overrides = ConsensusOverrides {
            consensus_threshold: Some(0.75),
            enable_convergence_analysis: Some(false),
            ..Default::default()
        };
        let merged = ConsensusConfig::default().merged(&overrides);
        assert_eq!(merged.consensus_threshold, 0.75);
        assert!(!merged.enable_convergence_analysis);
        // untouched fields keep their defaults
        assert_eq!(merged.stalemate_window, 2);
    }

    #[test]
    fn test_merged_keyword_weights_merge_not_replace() {
        let mut weights = HashMap::new();
        weights.insert("agree".to_string(), 0.9);
        weights.insert("ship it".to_string(), 1.0);
        let overrides = ConsensusOverrides {
            keyword_weights: Some(weights),
            ..Default::default()
        };
        let merged = ConsensusConfig::default().merged(&overrides);
        // overridden entry wins, new entry added, defaults preserved
        assert_eq!(merged.keyword_weights.get("agree"), Some(&0.9));
        assert_eq!(merged.keyword_weights.get("ship it"), Some(&1.0));
        assert_eq!(merged.keyword_weights.get("disagree"), Some(&-0.8));
    }
}
