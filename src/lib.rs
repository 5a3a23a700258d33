//! Turn-based orchestration engine for multi-agent tabletop RPG sessions.
//!
//! One director agent narrates and adjudicates; one agent plays each
//! player character. This crate owns the shared session state and
//! advances it one agent-turn at a time:
//! - visibility-filtered context construction (secrets stay private)
//! - tool-call interception with validated, atomic state transitions
//! - a turn router that swaps to initiative order during tactical combat
//!   and restores the original queue afterwards
//! - versioned, backward-compatible persistence with timeline forking
//!
//! The language model itself stays outside: implement [`Agent`] over your
//! provider of choice and register it with a [`Session`].
//!
//! # Quick Start
//!
//! ```ignore
//! use tabletop_core::{Session, SessionConfig, CharacterSheet};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::new("The Sunken Crypt")
//!         .with_tactical_combat(true);
//!
//!     let mut session = Session::new(config);
//!     session.add_director(Box::new(my_director_agent()));
//!     session.add_player(
//!         CharacterSheet::new("Mira", "Wizard", 18),
//!         Box::new(my_player_agent("Mira")),
//!     );
//!
//!     let report = session.step().await?;
//!     println!("{}", report.narrative);
//!
//!     session.save("crypt.json").await?;
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod agent;
pub mod combat;
pub mod context;
pub mod dice;
pub mod persist;
pub mod router;
pub mod secrets;
pub mod session;
pub mod state;
pub mod testing;

// Primary public API
pub use actions::{ActionCatalog, ActionEngine, ActionOutcome, ActionSpec, Effect};
pub use agent::{ActionRequest, Agent, AgentError, AgentReply};
pub use combat::{CombatState, NpcProfile};
pub use context::{
    build_context, combat_summary, log_since, revealed_history, sheet_summary, ContextBundle,
};
pub use dice::{DiceError, DiceExpression, DiceRoller, SequenceRoller, ThreadRngRoller};
pub use persist::{fork_state, PersistError, SavedSession, SaveMetadata};
pub use secrets::Whisper;
pub use session::{Session, SessionConfig, SessionError, TurnReport};
pub use state::{AgentId, CharacterSheet, GameState, HitPoints, LogEntry, LogKind};
pub use testing::{MockAgent, MockScript, TestHarness};
