//! Discussion settings
//!
//! Resolved options consumed once at engine construction. Settings are
//! assembled by layering override sets over the defaults: scalars override,
//! list fields replace wholesale, keyword-weight maps merge entry-wise.

use crate::consensus::ConsensusOverrides;
use crate::context::CompactorOverrides;
use crate::core::DomainError;
use crate::discussion::Participant;
use crate::mode::ModeKind;
use crate::termination::TerminationOverrides;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

pub const MAX_ROUNDS_LIMIT: u32 = 10;

/// Caps applied to reference files read at init, before any transport call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxLimits {
    pub max_files: usize,
    pub max_file_bytes: u64,
    pub max_total_bytes: u64,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_files: 16,
            max_file_bytes: 256 * 1024,
            max_total_bytes: 1024 * 1024,
        }
    }
}

/// Resolved engine options. The engine never re-reads configuration mid-run.
#[derive(Debug, Clone)]
pub struct DiscussionSettings {
    pub topic: String,
    pub participants: Vec<Participant>,
    pub max_rounds: u32,
    pub mode: ModeKind,
    /// Extra background text appended to every base context
    pub extra_context: Option<String>,
    pub reference_files: Vec<PathBuf>,
    /// Leave created sub-conversations in place after the run
    pub keep_sessions: bool,
    /// Mirror each round into a dedicated transcript sub-conversation
    pub transcript_mirror: bool,
    pub max_retries: u32,
    /// Per agent call, not per round or per run
    pub call_timeout: Duration,
    /// Maximum in-flight agent calls
    pub concurrency: usize,
    pub cleanup_timeout: Duration,
    pub sandbox: SandboxLimits,
    pub consensus: ConsensusOverrides,
    pub termination: TerminationOverrides,
    pub compactor: CompactorOverrides,
}

impl DiscussionSettings {
    pub fn new(topic: impl Into<String>, participants: Vec<Participant>) -> Self {
        Self {
            topic: topic.into(),
            participants,
            max_rounds: 3,
            mode: ModeKind::default(),
            extra_context: None,
            reference_files: Vec::new(),
            keep_sessions: false,
            transcript_mirror: false,
            max_retries: 3,
            call_timeout: Duration::from_secs(10 * 60),
            concurrency: 2,
            cleanup_timeout: Duration::from_secs(30),
            sandbox: SandboxLimits::default(),
            consensus: ConsensusOverrides::default(),
            termination: TerminationOverrides::default(),
            compactor: CompactorOverrides::default(),
        }
    }

    /// Apply one override layer on top of the current values
    pub fn apply(mut self, overrides: &DiscussionOverrides) -> Self {
        if let Some(v) = overrides.max_rounds {
            self.max_rounds = v;
        }
        if let Some(v) = overrides.mode {
            self.mode = v;
        }
        if let Some(v) = &overrides.extra_context {
            self.extra_context = Some(v.clone());
        }
        if let Some(v) = &overrides.reference_files {
            self.reference_files = v.clone();
        }
        if let Some(v) = overrides.keep_sessions {
            self.keep_sessions = v;
        }
        if let Some(v) = overrides.transcript_mirror {
            self.transcript_mirror = v;
        }
        if let Some(v) = overrides.max_retries {
            self.max_retries = v;
        }
        if let Some(v) = overrides.call_timeout {
            self.call_timeout = v;
        }
        if let Some(v) = overrides.concurrency {
            self.concurrency = v;
        }
        if let Some(v) = overrides.cleanup_timeout {
            self.cleanup_timeout = v;
        }
        if let Some(v) = &overrides.consensus {
            layer_consensus(&mut self.consensus, v);
        }
        if let Some(v) = &overrides.termination {
            layer_termination(&mut self.termination, v);
        }
        if let Some(v) = &overrides.compactor {
            layer_compactor(&mut self.compactor, v);
        }
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.topic.trim().is_empty() {
            return Err(DomainError::InvalidConfig("topic must not be empty".into()));
        }
        if self.participants.is_empty() {
            return Err(DomainError::NoParticipants);
        }
        let mut names = HashSet::new();
        for p in &self.participants {
            if p.name.trim().is_empty() {
                return Err(DomainError::InvalidConfig(
                    "participant name must not be empty".into(),
                ));
            }
            if !names.insert(p.name.as_str()) {
                return Err(DomainError::InvalidConfig(format!(
                    "duplicate participant name: {}",
                    p.name
                )));
            }
        }
        if self.max_rounds == 0 || self.max_rounds > MAX_ROUNDS_LIMIT {
            return Err(DomainError::InvalidConfig(format!(
                "max_rounds must be between 1 and {MAX_ROUNDS_LIMIT}"
            )));
        }
        if self.concurrency == 0 {
            return Err(DomainError::InvalidConfig(
                "concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// One override layer; `None` leaves the underlying value untouched
#[derive(Debug, Clone, Default)]
pub struct DiscussionOverrides {
    pub max_rounds: Option<u32>,
    pub mode: Option<ModeKind>,
    pub extra_context: Option<String>,
    /// Replaces the list wholesale
    pub reference_files: Option<Vec<PathBuf>>,
    pub keep_sessions: Option<bool>,
    pub transcript_mirror: Option<bool>,
    pub max_retries: Option<u32>,
    pub call_timeout: Option<Duration>,
    pub concurrency: Option<usize>,
    pub cleanup_timeout: Option<Duration>,
    pub consensus: Option<ConsensusOverrides>,
    pub termination: Option<TerminationOverrides>,
    pub compactor: Option<CompactorOverrides>,
}

/// Parse a `"Name:role description"` participant spec; bare names get no role
pub fn participant_from_spec(spec: &str, agent_kind: impl Into<String>) -> Participant {
    match spec.split_once(':') {
        Some((name, role)) if !role.trim().is_empty() => {
            Participant::new(name.trim(), agent_kind).with_role(role.trim())
        }
        Some((name, _)) => Participant::new(name.trim(), agent_kind),
        None => Participant::new(spec.trim(), agent_kind),
    }
}

/// Layer one consensus override set over another; keyword maps merge
pub fn layer_consensus(base: &mut ConsensusOverrides, over: &ConsensusOverrides) {
    if let Some(v) = over.consensus_threshold {
        base.consensus_threshold = Some(v);
    }
    if let Some(v) = over.enable_convergence_analysis {
        base.enable_convergence_analysis = Some(v);
    }
    if let Some(v) = over.stalemate_window {
        base.stalemate_window = Some(v);
    }
    if let Some(extra) = &over.keyword_weights {
        let merged = base.keyword_weights.get_or_insert_with(Default::default);
        for (k, w) in extra {
            merged.insert(k.clone(), *w);
        }
    }
}

fn layer_termination(base: &mut TerminationOverrides, over: &TerminationOverrides) {
    if let Some(v) = over.min_confidence {
        base.min_confidence = Some(v);
    }
    if let Some(v) = over.enable_stalemate_detection {
        base.enable_stalemate_detection = Some(v);
    }
    if let Some(v) = over.stalemate_rounds {
        base.stalemate_rounds = Some(v);
    }
}

fn layer_compactor(base: &mut CompactorOverrides, over: &CompactorOverrides) {
    if let Some(v) = over.max_context_chars {
        base.max_context_chars = Some(v);
    }
    if let Some(v) = over.compaction_threshold {
        base.compaction_threshold = Some(v);
    }
    if let Some(v) = over.max_message_length {
        base.max_message_length = Some(v);
    }
    if let Some(v) = over.preserve_recent_rounds {
        base.preserve_recent_rounds = Some(v);
    }
    if let Some(v) = over.enable_key_info_extraction {
        base.enable_key_info_extraction = Some(v);
    }
    if let Some(v) = over.include_self_history {
        base.include_self_history = Some(v);
    }
    if let Some(extra) = &over.keyword_weights {
        let merged = base.keyword_weights.get_or_insert_with(Default::default);
        for (k, w) in extra {
            merged.insert(k.clone(), *w);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base() -> DiscussionSettings {
        DiscussionSettings::new(
            "cache eviction policy",
            vec![
                Participant::new("A", "advocate"),
                Participant::new("B", "critic"),
            ],
        )
    }

    #[test]
    fn test_defaults() {
        let s = base();
        assert_eq!(s.max_rounds, 3);
        assert_eq!(s.concurrency, 2);
        assert_eq!(s.max_retries, 3);
        assert_eq!(s.call_timeout, Duration::from_secs(600));
        assert_eq!(s.cleanup_timeout, Duration::from_secs(30));
        assert!(!s.keep_sessions);
        assert_eq!(s.sandbox.max_files, 16);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        assert!(DiscussionSettings::new("  ", vec![Participant::new("A", "k")])
            .validate()
            .is_err());
        assert!(matches!(
            DiscussionSettings::new("t", Vec::new()).validate(),
            Err(DomainError::NoParticipants)
        ));

        let mut dup = base();
        dup.participants.push(Participant::new("A", "another"));
        assert!(dup.validate().is_err());

        let mut rounds = base();
        rounds.max_rounds = 0;
        assert!(rounds.validate().is_err());
        rounds.max_rounds = MAX_ROUNDS_LIMIT + 1;
        assert!(rounds.validate().is_err());

        let mut conc = base();
        conc.concurrency = 0;
        assert!(conc.validate().is_err());
    }

    #[test]
    fn test_layered_apply_scalars_and_lists() {
        let global = DiscussionOverrides {
            max_rounds: Some(5),
            reference_files: Some(vec![PathBuf::from("a.md"), PathBuf::from("b.md")]),
            ..Default::default()
        };
        let call = DiscussionOverrides {
            max_rounds: Some(2),
            reference_files: Some(vec![PathBuf::from("c.md")]),
            keep_sessions: Some(true),
            ..Default::default()
        };
        let s = base().apply(&global).apply(&call);
        assert_eq!(s.max_rounds, 2);
        // lists replace, they do not concatenate
        assert_eq!(s.reference_files, vec![PathBuf::from("c.md")]);
        assert!(s.keep_sessions);
        assert_eq!(s.concurrency, 2);
    }

    #[test]
    fn test_keyword_maps_merge_across_layers() {
        let mut first = HashMap::new();
        first.insert("ship it".to_string(), 0.9);
        first.insert("maybe".to_string(), 0.1);
        let mut second = HashMap::new();
        second.insert("maybe".to_string(), 0.2);

        let s = base()
            .apply(&DiscussionOverrides {
                consensus: Some(ConsensusOverrides {
                    keyword_weights: Some(first),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .apply(&DiscussionOverrides {
                consensus: Some(ConsensusOverrides {
                    keyword_weights: Some(second),
                    ..Default::default()
                }),
                ..Default::default()
            });

        let weights = s.consensus.keyword_weights.unwrap();
        assert_eq!(weights["ship it"], 0.9);
        assert_eq!(weights["maybe"], 0.2);
    }

    #[test]
    fn test_participant_from_spec() {
        let p = participant_from_spec("Security: audits the threat model", "default");
        assert_eq!(p.name, "Security");
        assert_eq!(p.role.as_deref(), Some("audits the threat model"));

        let bare = participant_from_spec("Performance", "default");
        assert_eq!(bare.name, "Performance");
        assert!(bare.role.is_none());
    }
}
