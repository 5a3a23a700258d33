//! Testing utilities.
//!
//! This module provides tools for integration testing:
//! - `MockAgent` for deterministic turns without model calls
//! - `TestHarness` for scripted multi-agent scenarios
//! - Assertion helpers for verifying session state

use crate::actions::ActionSpec;
use crate::agent::{Agent, AgentError, AgentReply};
use crate::context::ContextBundle;
use crate::dice::DiceRoller;
use crate::session::{Session, SessionConfig, TurnReport};
use crate::state::{AbilityScores, AgentId, CharacterSheet, GameState};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Handle for scripting a [`MockAgent`] after it has been registered.
#[derive(Clone)]
pub struct MockScript {
    queue: Arc<Mutex<VecDeque<AgentReply>>>,
}

impl MockScript {
    /// Queue a reply for the agent's next unanswered turn.
    pub fn push(&self, reply: AgentReply) {
        self.queue
            .lock()
            .expect("script lock poisoned")
            .push_back(reply);
    }

    /// Queue a purely narrative reply.
    pub fn push_narrative(&self, text: impl Into<String>) {
        self.push(AgentReply::narrative(text));
    }
}

/// An agent that returns scripted replies in order, falling back to a
/// fixed placeholder narrative when the script runs dry.
pub struct MockAgent {
    queue: Arc<Mutex<VecDeque<AgentReply>>>,
}

impl MockAgent {
    /// Create an unscripted agent plus the handle used to feed it.
    pub fn new() -> (Self, MockScript) {
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        (
            Self {
                queue: Arc::clone(&queue),
            },
            MockScript { queue },
        )
    }

    /// Create an agent pre-loaded with replies.
    pub fn scripted(replies: Vec<AgentReply>) -> Self {
        Self {
            queue: Arc::new(Mutex::new(replies.into())),
        }
    }
}

#[async_trait]
impl Agent for MockAgent {
    async fn take_turn(
        &mut self,
        _context: &ContextBundle,
        _actions: &[ActionSpec],
    ) -> Result<AgentReply, AgentError> {
        let reply = self
            .queue
            .lock()
            .expect("script lock poisoned")
            .pop_front();
        Ok(reply.unwrap_or_else(|| AgentReply::narrative("(no scripted reply)")))
    }
}

/// A ready-made character sheet for tests: standard array, a bit of gear.
pub fn sample_sheet(name: impl Into<String>, class: impl Into<String>) -> CharacterSheet {
    let mut sheet = CharacterSheet::new(name, class, 24);
    sheet.ability_scores = AbilityScores::standard_array();
    sheet.armor_class = 15;
    sheet.proficiencies = vec!["Athletics".to_string(), "Perception".to_string()];
    sheet.equipment = vec!["Longsword".to_string(), "Traveler's clothes".to_string()];
    sheet
}

/// Test harness: a session wired with a mock director and mock PCs.
pub struct TestHarness {
    pub session: Session,
    pub director: MockScript,
    scripts: HashMap<AgentId, MockScript>,
}

impl TestHarness {
    /// A tactical-combat-enabled session with a mock director and no PCs.
    pub fn new() -> Self {
        Self::with_config(SessionConfig::new("Test Session").with_tactical_combat(true))
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let mut session = Session::new(config);
        let (director, script) = MockAgent::new();
        session.add_director(Box::new(director));
        Self {
            session,
            director: script,
            scripts: HashMap::new(),
        }
    }

    /// Like `new`, but with an injected dice roller.
    pub fn with_roller(roller: Box<dyn DiceRoller>) -> Self {
        let config = SessionConfig::new("Test Session").with_tactical_combat(true);
        let mut session = Session::with_roller(config, roller);
        let (director, script) = MockAgent::new();
        session.add_director(Box::new(director));
        Self {
            session,
            director: script,
            scripts: HashMap::new(),
        }
    }

    /// Add a PC with a sample sheet; returns the script handle for its
    /// mock agent.
    pub fn add_pc(&mut self, name: &str, class: &str) -> MockScript {
        let sheet = sample_sheet(name, class);
        let id = sheet.agent_id();
        let (agent, script) = MockAgent::new();
        self.session.add_player(sheet, Box::new(agent));
        self.scripts.insert(id, script.clone());
        script
    }

    /// Script handle for a PC added earlier.
    pub fn script_for(&self, name: &str) -> Option<&MockScript> {
        self.scripts.get(&AgentId::pc(name))
    }

    /// Run one turn, panicking on session errors.
    pub async fn run_turn(&mut self) -> TurnReport {
        self.session.step().await.expect("turn should succeed")
    }

    pub fn state(&self) -> &GameState {
        self.session.state()
    }

    /// Current HP for a character as (current, maximum).
    pub fn hp(&self, name: &str) -> (i32, i32) {
        let hp = self
            .state()
            .sheet(name)
            .unwrap_or_else(|| panic!("no sheet for '{name}'"))
            .hit_points;
        (hp.current, hp.maximum)
    }

    /// Number of active (unrevealed) secrets held for an agent.
    pub fn active_secret_count(&self, agent: &AgentId) -> usize {
        crate::secrets::active_for(self.state(), agent).len()
    }

    pub fn in_combat(&self) -> bool {
        self.state().combat.active
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert a character's HP is at expected values.
#[track_caller]
pub fn assert_hp(harness: &TestHarness, name: &str, current: i32, max: i32) {
    let (actual_current, actual_max) = harness.hp(name);
    assert_eq!(
        (actual_current, actual_max),
        (current, max),
        "Expected {name} at HP {current}/{max}, got {actual_current}/{actual_max}"
    );
}

/// Assert combat is active.
#[track_caller]
pub fn assert_in_combat(harness: &TestHarness) {
    assert!(harness.in_combat(), "Expected to be in combat");
}

/// Assert combat is not active.
#[track_caller]
pub fn assert_not_in_combat(harness: &TestHarness) {
    assert!(!harness.in_combat(), "Expected to NOT be in combat");
}

/// Assert the exploration turn queue holds exactly these agent ids.
#[track_caller]
pub fn assert_queue(harness: &TestHarness, expected: &[AgentId]) {
    assert_eq!(
        harness.state().turn_queue,
        expected,
        "Turn queue mismatch"
    );
}
