//! Debate mode
//!
//! Adversarial rounds with a moderator-style participant, if present,
//! held back until the final round to summarize.

use crate::discussion::{Message, Participant};
use crate::mode::DiscussionMode;

const MODERATOR_HINTS: &[&str] = &["moderator", "judge", "facilitator", "referee"];

fn is_moderator(name: &str) -> bool {
    let lower = name.to_lowercase();
    MODERATOR_HINTS.iter().any(|h| lower.contains(h))
}

pub struct DebateMode;

impl DiscussionMode for DebateMode {
    fn name(&self) -> &'static str {
        "debate"
    }

    fn speakers(&self, round: u32, max_rounds: u32, participants: &[Participant]) -> Vec<String> {
        if round == max_rounds {
            return participants.iter().map(|p| p.name.clone()).collect();
        }
        participants
            .iter()
            .filter(|p| !is_moderator(&p.name))
            .map(|p| p.name.clone())
            .collect()
    }

    fn agent_role(&self, participant: &Participant) -> String {
        if let Some(role) = &participant.role {
            return role.clone();
        }
        format!(
            "A specialist in {}, responsible for deep insight and challenge from that angle.",
            participant.name
        )
    }

    /// Prefer the final-round moderator's message; otherwise the last message
    fn generate_conclusion(&self, messages: &[Message], _topic: &str) -> String {
        let Some(last) = messages.last() else {
            return "The discussion produced no usable content.".to_string();
        };
        let last_round = messages.iter().map(|m| m.round).max().unwrap_or(0);
        messages
            .iter()
            .find(|m| m.round == last_round && is_moderator(&m.agent))
            .map(|m| m.content.clone())
            .unwrap_or_else(|| last.content.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participants(names: &[&str]) -> Vec<Participant> {
        names
            .iter()
            .map(|n| Participant::new(*n, "default"))
            .collect()
    }

    #[test]
    fn test_moderator_held_back_until_final_round() {
        let ps = participants(&["Security", "Performance", "Moderator"]);
        let mid = DebateMode.speakers(1, 3, &ps);
        assert_eq!(mid, vec!["Security", "Performance"]);
        let last = DebateMode.speakers(3, 3, &ps);
        assert_eq!(last, vec!["Security", "Performance", "Moderator"]);
    }

    #[test]
    fn test_conclusion_prefers_final_round_moderator() {
        let messages = vec![
            Message::new("Security", "point one", 1),
            Message::new("Moderator", "verdict: option B", 2),
            Message::new("Security", "closing remark", 2),
        ];
        assert_eq!(
            DebateMode.generate_conclusion(&messages, "t"),
            "verdict: option B"
        );
    }

    #[test]
    fn test_conclusion_falls_back_to_last_message() {
        let messages = vec![
            Message::new("A", "first", 1),
            Message::new("B", "second", 1),
        ];
        assert_eq!(DebateMode.generate_conclusion(&messages, "t"), "second");
    }

    #[test]
    fn test_role_uses_explicit_description_when_set() {
        let p = Participant::new("Security", "default").with_role("audits the threat model");
        assert_eq!(DebateMode.agent_role(&p), "audits the threat model");
        let bare = Participant::new("Security", "default");
        assert!(DebateMode.agent_role(&bare).contains("Security"));
    }
}
