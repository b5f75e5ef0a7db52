//! Context compactor configuration

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct CompactorConfig {
    /// Character budget for one agent's injected context
    pub max_context_chars: usize,
    /// Compaction kicks in at `max_context_chars * compaction_threshold`
    pub compaction_threshold: f64,
    /// Individual messages longer than this are truncated with an ellipsis
    pub max_message_length: usize,
    /// Rounds kept verbatim in front of the summary
    pub preserve_recent_rounds: u32,
    pub enable_key_info_extraction: bool,
    /// Importance weights for ranking extracted key information
    pub keyword_weights: HashMap<String, f64>,
    /// Whether an agent sees its own past messages in its context
    pub include_self_history: bool,
}

impl Default for CompactorConfig {
    fn default() -> Self {
        Self {
            max_context_chars: 32_000,
            compaction_threshold: 0.8,
            max_message_length: 500,
            preserve_recent_rounds: 1,
            enable_key_info_extraction: true,
            keyword_weights: HashMap::new(),
            include_self_history: false,
        }
    }
}

/// Per-field overrides; keyword maps merge entry-wise, scalars replace
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompactorOverrides {
    pub max_context_chars: Option<usize>,
    pub compaction_threshold: Option<f64>,
    pub max_message_length: Option<usize>,
    pub preserve_recent_rounds: Option<u32>,
    pub enable_key_info_extraction: Option<bool>,
    pub keyword_weights: Option<HashMap<String, f64>>,
    pub include_self_history: Option<bool>,
}

impl CompactorConfig {
    pub fn merged(overrides: &CompactorOverrides) -> Self {
        let base = Self::default();
        let mut keyword_weights = base.keyword_weights;
        if let Some(extra) = &overrides.keyword_weights {
            for (k, w) in extra {
                keyword_weights.insert(k.clone(), *w);
            }
        }
        Self {
            max_context_chars: overrides.max_context_chars.unwrap_or(base.max_context_chars),
            compaction_threshold: overrides
                .compaction_threshold
                .unwrap_or(base.compaction_threshold),
            max_message_length: overrides
                .max_message_length
                .unwrap_or(base.max_message_length),
            preserve_recent_rounds: overrides
                .preserve_recent_rounds
                .unwrap_or(base.preserve_recent_rounds),
            enable_key_info_extraction: overrides
                .enable_key_info_extraction
                .unwrap_or(base.enable_key_info_extraction),
            keyword_weights,
            include_self_history: overrides
                .include_self_history
                .unwrap_or(base.include_self_history),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompactorConfig::default();
        assert_eq!(config.max_context_chars, 32_000);
        assert_eq!(config.compaction_threshold, 0.8);
        assert_eq!(config.max_message_length, 500);
        assert_eq!(config.preserve_recent_rounds, 1);
        assert!(!config.include_self_history);
    }

    #[test]
    fn test_merge_keyword_weights_entrywise() {
        let mut extra = HashMap::new();
        extra.insert("deadline".to_string(), 0.9);
        let merged = CompactorConfig::merged(&CompactorOverrides {
            keyword_weights: Some(extra),
            max_message_length: Some(200),
            ..Default::default()
        });
        assert_eq!(merged.keyword_weights["deadline"], 0.9);
        assert_eq!(merged.max_message_length, 200);
        assert_eq!(merged.max_context_chars, 32_000);
    }
}
