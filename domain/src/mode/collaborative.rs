//! Collaborative mode
//!
//! Every participant speaks every round; the conclusion synthesizes the
//! final round instead of crowning a winner.

use crate::discussion::{Message, Participant};
use crate::mode::DiscussionMode;
use crate::termination::{TerminationRule, TerminationSignal};

const AGREEMENT_KEYWORDS: &[&str] = &[
    "agree",
    "sounds good",
    "works for me",
    "confirmed",
    "lgtm",
    "ready to start",
];

pub struct CollaborativeMode;

impl DiscussionMode for CollaborativeMode {
    fn name(&self) -> &'static str {
        "collaborative"
    }

    fn speakers(&self, _round: u32, _max_rounds: u32, participants: &[Participant]) -> Vec<String> {
        participants.iter().map(|p| p.name.clone()).collect()
    }

    fn agent_role(&self, participant: &Participant) -> String {
        if let Some(role) = &participant.role {
            return role.clone();
        }
        format!(
            "A project team member contributing constructive proposals from the {} angle.",
            participant.name
        )
    }

    fn generate_conclusion(&self, messages: &[Message], topic: &str) -> String {
        if messages.is_empty() {
            return "No workable outcome was reached.".to_string();
        }
        let last_round = messages.iter().map(|m| m.round).max().unwrap_or(0);
        let final_messages: Vec<String> = messages
            .iter()
            .filter(|m| m.round == last_round)
            .map(|m| format!("[@{}]: {}", m.agent, m.content))
            .collect();
        format!(
            "[Collaborative outcome]\nOn the topic \"{}\", the team converged on:\n\n{}",
            topic,
            final_messages.join("\n\n")
        )
    }

    /// Stops once the last three messages all signal agreement, which catches
    /// unanimity earlier than the score-based built-ins.
    fn termination_rules(&self) -> Vec<TerminationRule> {
        vec![TerminationRule::new("unanimous_recent", 85, |ctx| {
            if ctx.messages.len() < 3 {
                return Ok(TerminationSignal::pass());
            }
            let last_three = &ctx.messages[ctx.messages.len() - 3..];
            let unanimous = last_three.iter().all(|m| {
                let content = m.content.to_lowercase();
                AGREEMENT_KEYWORDS.iter().any(|k| content.contains(k))
            });
            if unanimous {
                return Ok(TerminationSignal::stop(
                    "last three messages all signal agreement",
                    0.9,
                ));
            }
            Ok(TerminationSignal::pass())
        })]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::ConsensusReport;
    use crate::termination::{TerminationConfig, TerminationContext, TerminationManager};
    use std::time::Duration;

    #[test]
    fn test_everyone_speaks_every_round() {
        let ps = vec![
            Participant::new("A", "advocate"),
            Participant::new("Moderator", "mod"),
        ];
        assert_eq!(CollaborativeMode.speakers(1, 3, &ps), vec!["A", "Moderator"]);
    }

    #[test]
    fn test_conclusion_synthesizes_final_round() {
        let messages = vec![
            Message::new("A", "earlier idea", 1),
            Message::new("A", "final shape of the plan", 2),
            Message::new("B", "agreed details", 2),
        ];
        let conclusion = CollaborativeMode.generate_conclusion(&messages, "rollout plan");
        assert!(conclusion.contains("rollout plan"));
        assert!(conclusion.contains("[@A]: final shape of the plan"));
        assert!(conclusion.contains("[@B]: agreed details"));
        assert!(!conclusion.contains("earlier idea"));
    }

    #[test]
    fn test_unanimous_recent_rule_fires_via_manager() {
        let manager = TerminationManager::new(
            CollaborativeMode.termination_rules(),
            TerminationConfig::default(),
        );
        let messages = vec![
            Message::new("A", "proposal v2", 1),
            Message::new("B", "works for me", 1),
            Message::new("C", "lgtm", 1),
            Message::new("A", "agree, ready to start", 2),
        ];
        let ctx = TerminationContext {
            current_round: 2,
            max_rounds: 3,
            messages,
            consensus_report: ConsensusReport::empty(),
            mode: "collaborative".to_string(),
            elapsed: Duration::from_secs(10),
        };
        let signal = manager.should_terminate(&ctx);
        assert!(signal.should_stop);
        assert!(signal.reason.unwrap().contains("unanimous_recent"));
    }

    #[test]
    fn test_unanimous_recent_needs_three_messages() {
        let manager = TerminationManager::new(
            CollaborativeMode.termination_rules(),
            TerminationConfig::default(),
        );
        let ctx = TerminationContext {
            current_round: 1,
            max_rounds: 3,
            messages: vec![Message::new("A", "lgtm", 1), Message::new("B", "agree", 1)],
            consensus_report: ConsensusReport::empty(),
            mode: "collaborative".to_string(),
            elapsed: Duration::from_secs(10),
        };
        assert!(!manager.should_terminate(&ctx).should_stop);
    }
}
