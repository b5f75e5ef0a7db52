//! Context compaction
//!
//! Builds the per-agent, per-round text block injected into a prompt,
//! bounded by a character budget. Old rounds are folded into a structured
//! summary once the estimated history size crosses the threshold; the most
//! recent rounds always survive verbatim.

use crate::context::config::CompactorConfig;
use crate::context::summary::{
    CompactedContext, ContextState, ContextSummary, KeyInfo, KeyInfoKind,
};
use crate::core::current_timestamp_ms;
use crate::discussion::Message;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

static AGREEMENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bagree|\bsupport|\bconsensus|\bendorse|\baligned").expect("valid pattern")
});
static DISAGREEMENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bdisagree|\bobject|\bblock|cannot accept|\boppose").expect("valid pattern")
});
static DECISION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bdecision\b|\bwe will\b|\bchoose\b|\badopt|\bfinal plan").expect("valid pattern")
});
static ACTION_ITEM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\btodo\b|action item|follow[- ]?up|\btbd\b|needs confirmation")
        .expect("valid pattern")
});
static MENTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@\w+").expect("valid pattern"));

/// Inputs for one [`ContextCompactor::build_context`] call
#[derive(Debug, Clone)]
pub struct ContextBuildOptions {
    pub current_round: u32,
    /// Excludes this agent's own history unless `include_self_history` is set
    pub agent_name: Option<String>,
    /// Background block prepended to the history (topic, roles, references)
    pub base_context: Option<String>,
    pub topic: String,
}

pub struct ContextCompactor {
    config: CompactorConfig,
    state: ContextState,
    keywords: Vec<(String, f64)>,
}

impl ContextCompactor {
    pub fn new(config: CompactorConfig) -> Self {
        let keywords = config
            .keyword_weights
            .iter()
            .map(|(k, w)| (k.to_lowercase(), *w))
            .collect();
        Self {
            config,
            state: ContextState::default(),
            keywords,
        }
    }

    pub fn state(&self) -> &ContextState {
        &self.state
    }

    pub fn build_context(
        &mut self,
        messages: &[Message],
        options: &ContextBuildOptions,
    ) -> CompactedContext {
        // Round 1 has no history: the base context goes out as-is
        if options.current_round <= 1 {
            let content = options.base_context.clone().unwrap_or_default();
            let len = char_len(&content);
            self.update_state(len);
            return self.finish(content, false, Vec::new(), None, len, None, options);
        }

        let history: Vec<&Message> = messages
            .iter()
            .filter(|m| m.round < options.current_round)
            .filter(|m| match &options.agent_name {
                Some(name) if !self.config.include_self_history => m.agent != *name,
                _ => true,
            })
            .collect();

        let estimated_full = self.estimate_full_history_length(&history);
        let base_len = options
            .base_context
            .as_deref()
            .map(char_len)
            .unwrap_or(0);
        let join_sep = if base_len > 0 && estimated_full > 0 { 2 } else { 0 };
        let history_estimate = base_len + join_sep + estimated_full;
        self.update_state(history_estimate);

        let (recent, older) = self.partition(&history, options.current_round);
        let recent_header = self.recent_header(options.current_round);

        if !self.should_compact(estimated_full) || older.is_empty() {
            let recent_text = self.render_history(&recent, Some(&recent_header));
            let content = join_blocks(&[options.base_context.as_deref(), Some(&recent_text)]);
            let actual = char_len(&content);
            return self.finish(
                content,
                false,
                Vec::new(),
                None,
                history_estimate,
                Some(actual),
                options,
            );
        }

        let summary = self.summarize(&older, options.current_round);
        let key_infos = if self.config.enable_key_info_extraction {
            self.extract_key_info(&older)
        } else {
            Vec::new()
        };

        let summary_text = render_summary(&summary, &key_infos);
        let recent_text = self.render_history(&recent, Some(&recent_header));
        let content = join_blocks(&[
            options.base_context.as_deref(),
            Some(&summary_text),
            Some(&recent_text),
        ]);

        self.state.compaction_count += 1;
        self.state.last_compaction_at = Some(current_timestamp_ms());
        self.state.historical_summaries.push(summary.clone());

        self.finish(
            content,
            true,
            key_infos,
            Some(summary),
            history_estimate,
            None,
            options,
        )
    }

    fn should_compact(&self, length: usize) -> bool {
        length as f64 >= self.config.max_context_chars as f64 * self.config.compaction_threshold
    }

    /// Recent rounds stay verbatim, everything earlier is summary fodder
    fn partition<'a>(
        &self,
        history: &[&'a Message],
        current_round: u32,
    ) -> (Vec<&'a Message>, Vec<&'a Message>) {
        let preserve = self.config.preserve_recent_rounds.max(1);
        let preserve_from = current_round.saturating_sub(preserve).max(1);
        history
            .iter()
            .copied()
            .partition(|m| m.round >= preserve_from)
    }

    fn recent_header(&self, current_round: u32) -> String {
        let preserve = self.config.preserve_recent_rounds.max(1);
        // With self-history enabled the block also carries the agent's own
        // earlier messages, so the label must not claim otherwise
        let whose = if self.config.include_self_history {
            "remarks so far"
        } else {
            "remarks from other participants"
        };
        if preserve == 1 {
            let prev = current_round.saturating_sub(1).max(1);
            format!("[Round {prev} {whose}]")
        } else {
            format!("[Last {preserve} rounds, {whose}]")
        }
    }

    fn render_history(&self, messages: &[&Message], header: Option<&str>) -> String {
        if messages.is_empty() {
            return String::new();
        }
        let mut by_round: BTreeMap<u32, Vec<&Message>> = BTreeMap::new();
        for m in messages {
            by_round.entry(m.round).or_default().push(m);
        }

        let mut parts = Vec::new();
        if let Some(h) = header {
            parts.push(h.to_string());
        }
        for (round, round_messages) in &by_round {
            parts.push(format!("[Round {round}]"));
            for msg in round_messages {
                let content = self.truncate(&msg.content, self.config.max_message_length);
                parts.push(format!("@{}:\n{}", msg.agent, content));
            }
            parts.push(String::new());
        }
        parts.join("\n").trim().to_string()
    }

    /// Predicted size of [`Self::render_history`] output, without building it
    fn estimate_full_history_length(&self, messages: &[&Message]) -> usize {
        if messages.is_empty() {
            return 0;
        }
        let mut by_round: BTreeMap<u32, Vec<&Message>> = BTreeMap::new();
        for m in messages {
            by_round.entry(m.round).or_default().push(m);
        }
        let mut total = 0;
        for (round, round_messages) in &by_round {
            total += char_len(&format!("[Round {round}]\n"));
            for msg in round_messages {
                let content_len =
                    char_len(&self.truncate(&msg.content, self.config.max_message_length));
                total += char_len(&format!("@{}:\n", msg.agent)) + content_len + 1;
            }
            total += 1;
        }
        total
    }

    fn summarize(&self, messages: &[&Message], current_round: u32) -> ContextSummary {
        if messages.is_empty() {
            return ContextSummary {
                progress_overview: "No prior content to compact.".to_string(),
                agreements: Vec::new(),
                disagreements: Vec::new(),
                pending_decisions: Vec::new(),
                compacted_rounds: (0, 0),
                participant_stances: HashMap::new(),
            };
        }

        let mut rounds: Vec<u32> = messages.iter().map(|m| m.round).collect();
        rounds.sort_unstable();
        rounds.dedup();
        let (from, to) = (rounds[0], rounds[rounds.len() - 1]);

        let key_infos = self.extract_key_info(messages);
        let agreements = key_infos
            .iter()
            .filter(|k| matches!(k.kind, KeyInfoKind::Agreement | KeyInfoKind::Decision))
            .map(|k| k.content.clone())
            .collect();
        let disagreements = key_infos
            .iter()
            .filter(|k| k.kind == KeyInfoKind::Disagreement)
            .map(|k| k.content.clone())
            .collect();
        let pending = key_infos
            .iter()
            .filter(|k| k.kind == KeyInfoKind::ActionItem)
            .map(|k| k.content.clone())
            .collect();

        let mut stances = HashMap::new();
        for msg in messages {
            stances.entry(msg.agent.clone()).or_insert_with(|| {
                collapse_whitespace(&self.truncate(&msg.content, 160))
            });
        }

        ContextSummary {
            progress_overview: format!(
                "Rounds {from}-{to} compacted (currently in round {current_round})."
            ),
            agreements: dedup_capped(agreements, 6),
            disagreements: dedup_capped(disagreements, 6),
            pending_decisions: dedup_capped(pending, 6),
            compacted_rounds: (from, to),
            participant_stances: stances,
        }
    }

    /// Regex-family extraction, ranked by keyword importance, top 12 kept
    fn extract_key_info(&self, messages: &[&Message]) -> Vec<KeyInfo> {
        let families: [(&Regex, KeyInfoKind); 4] = [
            (&AGREEMENT_PATTERN, KeyInfoKind::Agreement),
            (&DISAGREEMENT_PATTERN, KeyInfoKind::Disagreement),
            (&DECISION_PATTERN, KeyInfoKind::Decision),
            (&ACTION_ITEM_PATTERN, KeyInfoKind::ActionItem),
        ];

        let mut infos = Vec::new();
        for msg in messages {
            let lower = msg.content.to_lowercase();
            for (pattern, kind) in &families {
                if pattern.is_match(&msg.content) {
                    infos.push(KeyInfo {
                        kind: *kind,
                        agent: msg.agent.clone(),
                        round: msg.round,
                        content: self.truncate(&msg.content, 220),
                        importance: self.score_by_keywords(&lower).clamp(0.1, 1.0),
                    });
                }
            }
            if MENTION_PATTERN.is_match(&msg.content) {
                infos.push(KeyInfo {
                    kind: KeyInfoKind::CriticalQuote,
                    agent: msg.agent.clone(),
                    round: msg.round,
                    content: self.truncate(&msg.content, 220),
                    importance: 0.5,
                });
            }
        }

        infos.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        infos.truncate(12);
        infos
    }

    fn score_by_keywords(&self, content_lower: &str) -> f64 {
        let mut total = 0.0;
        let mut matches = 0usize;
        for (keyword, weight) in &self.keywords {
            if content_lower.contains(keyword) {
                total += weight;
                matches += 1;
            }
        }
        if matches == 0 {
            return 0.5;
        }
        ((total / matches as f64 + 1.0) / 2.0).clamp(0.0, 1.0)
    }

    fn truncate(&self, content: &str, limit: usize) -> String {
        if char_len(content) <= limit {
            return content.trim().to_string();
        }
        let cut: String = content.chars().take(limit).collect();
        format!("{}…", cut.trim())
    }

    fn update_state(&mut self, total_chars: usize) {
        self.state.total_chars = total_chars;
        self.state.estimated_tokens = total_chars.div_ceil(4);
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        content: String,
        was_compacted: bool,
        preserved_key_info: Vec<KeyInfo>,
        summary: Option<ContextSummary>,
        history_estimate: usize,
        actual_original: Option<usize>,
        options: &ContextBuildOptions,
    ) -> CompactedContext {
        // Empty after all filtering still produces a well-formed prompt block
        let content = if content.is_empty() {
            format!("Topic: {}\n(no prior messages yet)", options.topic)
        } else {
            content
        };
        let original_length = actual_original.unwrap_or(history_estimate);
        let compacted_length = char_len(&content);
        CompactedContext {
            content,
            original_length,
            compacted_length,
            compression_ratio: if original_length > 0 {
                compacted_length as f64 / original_length as f64
            } else {
                1.0
            },
            was_compacted,
            preserved_key_info,
            summary,
        }
    }
}

fn render_summary(summary: &ContextSummary, key_infos: &[KeyInfo]) -> String {
    let mut text = String::from("[Discussion summary]\n");
    text.push_str(&format!("Progress: {}\n", summary.progress_overview));
    if !summary.agreements.is_empty() {
        text.push_str(&format!("Agreements: {}\n", summary.agreements.join("; ")));
    }
    if !summary.disagreements.is_empty() {
        text.push_str(&format!(
            "Disagreements: {}\n",
            summary.disagreements.join("; ")
        ));
    }
    if !summary.pending_decisions.is_empty() {
        text.push_str(&format!(
            "Pending: {}\n",
            summary.pending_decisions.join("; ")
        ));
    }
    if !summary.participant_stances.is_empty() {
        text.push_str("Stances:\n");
        let mut stances: Vec<_> = summary.participant_stances.iter().collect();
        stances.sort_by(|a, b| a.0.cmp(b.0));
        for (agent, stance) in stances {
            text.push_str(&format!("- @{agent}: {stance}\n"));
        }
    }
    if !key_infos.is_empty() {
        text.push_str("Key quotes:\n");
        for info in key_infos.iter().take(6) {
            text.push_str(&format!("- [{}] @{}: {}\n", info.kind, info.agent, info.content));
        }
    }
    text.trim().to_string()
}

fn join_blocks(blocks: &[Option<&str>]) -> String {
    blocks
        .iter()
        .filter_map(|b| *b)
        .filter(|b| !b.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
        .trim()
        .to_string()
}

fn dedup_capped(items: Vec<String>, cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let cleaned = item.trim().to_string();
        if cleaned.is_empty() || !seen.insert(cleaned.clone()) {
            continue;
        }
        out.push(cleaned);
        if out.len() == cap {
            break;
        }
    }
    out
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
