//! Directed, private information from the director to a single agent.
//!
//! A whisper starts active (unrevealed) and can transition to revealed
//! exactly once. Revealed whispers stay in history for review but drop out
//! of every "active secrets" projection.

use crate::state::{AgentId, GameState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A private message to one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Whisper {
    pub id: Uuid,
    pub from_agent: AgentId,
    pub to_agent: AgentId,
    pub content: String,
    pub turn_created: u64,
    #[serde(default)]
    pub revealed: bool,
    #[serde(default)]
    pub turn_revealed: Option<u64>,
}

impl Whisper {
    pub fn new(
        from_agent: AgentId,
        to_agent: AgentId,
        content: impl Into<String>,
        turn_created: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            from_agent,
            to_agent,
            content: content.into(),
            turn_created,
            revealed: false,
            turn_revealed: None,
        }
    }
}

/// Result of looking up a whisper for reveal.
#[derive(Debug, Clone, PartialEq)]
pub enum SecretLookup {
    /// Index of the first matching unrevealed whisper, in list order.
    Unrevealed(usize),
    /// The reference matched a whisper that was already revealed.
    AlreadyRevealed { turn: Option<u64> },
    /// Nothing matched at all.
    NotFound,
}

/// Active (unrevealed) whispers directed at an agent.
pub fn active_for<'a>(state: &'a GameState, agent: &AgentId) -> Vec<&'a Whisper> {
    state
        .agent_secrets
        .get(agent)
        .map(|whispers| whispers.iter().filter(|w| !w.revealed).collect())
        .unwrap_or_default()
}

/// Revealed whispers directed at an agent, for history review.
pub fn revealed_for<'a>(state: &'a GameState, agent: &AgentId) -> Vec<&'a Whisper> {
    state
        .agent_secrets
        .get(agent)
        .map(|whispers| whispers.iter().filter(|w| w.revealed).collect())
        .unwrap_or_default()
}

/// Locate a whisper by exact id or case-insensitive content substring.
///
/// Unrevealed whispers are searched first, in list order; the first match
/// wins. A reference that only matches revealed whispers reports
/// `AlreadyRevealed` so the caller can distinguish it from a true miss.
pub fn find_unrevealed(whispers: &[Whisper], reference: &str) -> SecretLookup {
    let reference = reference.trim();

    if let Ok(id) = Uuid::parse_str(reference) {
        for (index, w) in whispers.iter().enumerate() {
            if w.id == id {
                return if w.revealed {
                    SecretLookup::AlreadyRevealed {
                        turn: w.turn_revealed,
                    }
                } else {
                    SecretLookup::Unrevealed(index)
                };
            }
        }
        return SecretLookup::NotFound;
    }

    let needle = reference.to_lowercase();
    if needle.is_empty() {
        return SecretLookup::NotFound;
    }

    for (index, whisper) in whispers.iter().enumerate() {
        if !whisper.revealed && whisper.content.to_lowercase().contains(&needle) {
            return SecretLookup::Unrevealed(index);
        }
    }

    // Only revealed whispers match the hint; report that specifically.
    if let Some(w) = whispers
        .iter()
        .find(|w| w.revealed && w.content.to_lowercase().contains(&needle))
    {
        return SecretLookup::AlreadyRevealed {
            turn: w.turn_revealed,
        };
    }

    SecretLookup::NotFound
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whisper(content: &str, turn: u64) -> Whisper {
        Whisper::new(
            AgentId::director(),
            AgentId::pc("Mira"),
            content,
            turn,
        )
    }

    #[test]
    fn test_find_by_substring_first_match_wins() {
        let whispers = vec![
            whisper("The innkeeper is a spy", 1),
            whisper("The spy network reaches the palace", 2),
        ];

        match find_unrevealed(&whispers, "SPY") {
            SecretLookup::Unrevealed(index) => assert_eq!(index, 0),
            other => panic!("expected first unrevealed match, got {other:?}"),
        }
    }

    #[test]
    fn test_find_skips_revealed() {
        let mut whispers = vec![
            whisper("The innkeeper is a spy", 1),
            whisper("The spy network reaches the palace", 2),
        ];
        whispers[0].revealed = true;
        whispers[0].turn_revealed = Some(4);

        match find_unrevealed(&whispers, "spy") {
            SecretLookup::Unrevealed(index) => assert_eq!(index, 1),
            other => panic!("expected second whisper, got {other:?}"),
        }
    }

    #[test]
    fn test_find_reports_already_revealed() {
        let mut whispers = vec![whisper("The innkeeper is a spy", 1)];
        whispers[0].revealed = true;
        whispers[0].turn_revealed = Some(4);

        assert_eq!(
            find_unrevealed(&whispers, "spy"),
            SecretLookup::AlreadyRevealed { turn: Some(4) }
        );
    }

    #[test]
    fn test_find_by_exact_id() {
        let whispers = vec![whisper("alpha", 1), whisper("beta", 2)];
        let id = whispers[1].id.to_string();

        assert_eq!(find_unrevealed(&whispers, &id), SecretLookup::Unrevealed(1));
    }

    #[test]
    fn test_find_miss() {
        let whispers = vec![whisper("alpha", 1)];
        assert_eq!(find_unrevealed(&whispers, "omega"), SecretLookup::NotFound);
        assert_eq!(find_unrevealed(&whispers, ""), SecretLookup::NotFound);
        assert_eq!(
            find_unrevealed(&whispers, &Uuid::new_v4().to_string()),
            SecretLookup::NotFound
        );
    }
}
