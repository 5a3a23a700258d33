//! Session orchestration: the turn loop.
//!
//! One agent's turn is resolved at a time. A turn is: route to the actor,
//! build its context, invoke the agent (the single suspension point, under
//! a timeout), log its narrative, apply its requested actions through the
//! interceptor, advance the router, snapshot. Agent failures and timeouts
//! leave the state exactly as it was, so the turn can be retried or
//! skipped but never half-applied.

use crate::actions::{apply_effects, ActionCatalog, ActionEngine, Effect};
use crate::agent::{Agent, AgentError};
use crate::context::build_context;
use crate::dice::{DiceRoller, ThreadRngRoller};
use crate::persist::{self, PersistError, SavedSession};
use crate::router;
use crate::state::{AgentId, CharacterSheet, GameState, LogEntry, LogKind};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no agent registered for '{0}'")]
    UnknownAgent(AgentId),

    #[error("agent '{agent}' timed out")]
    TurnTimeout { agent: AgentId },

    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persistence error: {0}")]
    Persist(#[from] PersistError),
}

/// Configuration for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Display name, also used for save file naming.
    pub session_name: String,

    /// Whether `start_combat` switches to tactical initiative order.
    /// When false the action is a documented no-op.
    pub tactical_combat: bool,

    /// Ceiling on a single agent invocation.
    pub turn_timeout: Duration,

    /// Snapshot the state here after every settled turn, if set.
    pub autosave_dir: Option<PathBuf>,
}

impl SessionConfig {
    pub fn new(session_name: impl Into<String>) -> Self {
        Self {
            session_name: session_name.into(),
            tactical_combat: false,
            turn_timeout: Duration::from_secs(120),
            autosave_dir: None,
        }
    }

    pub fn with_tactical_combat(mut self, enabled: bool) -> Self {
        self.tactical_combat = enabled;
        self
    }

    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    pub fn with_autosave_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.autosave_dir = Some(dir.into());
        self
    }
}

/// What happened on one turn.
#[derive(Debug, Clone)]
pub struct TurnReport {
    /// Who acted (an NPC slot when the director ran an NPC's turn).
    pub actor: AgentId,

    /// The narrative the agent produced.
    pub narrative: String,

    /// One observation string per requested action, in request order.
    /// Validation failures appear here as ordinary observations.
    pub observations: Vec<String>,
}

/// A running session: the live state plus the registered agents.
pub struct Session {
    config: SessionConfig,
    engine: ActionEngine,
    agents: HashMap<AgentId, Box<dyn Agent>>,
    state: GameState,
}

impl Session {
    /// Create a session with the default thread-RNG dice roller.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_roller(config, Box::new(ThreadRngRoller))
    }

    /// Create a session with an injected roller (deterministic tests).
    pub fn with_roller(config: SessionConfig, roller: Box<dyn DiceRoller>) -> Self {
        let state = GameState::new(config.session_name.clone());
        let engine = ActionEngine::new(roller).with_tactical_combat(config.tactical_combat);
        Self {
            config,
            engine,
            agents: HashMap::new(),
            state,
        }
    }

    /// Resume a session around a previously saved state. Agents must be
    /// re-registered by the caller.
    pub fn resume(config: SessionConfig, state: GameState) -> Self {
        let engine = ActionEngine::new(Box::new(ThreadRngRoller))
            .with_tactical_combat(config.tactical_combat);
        Self {
            config,
            engine,
            agents: HashMap::new(),
            state,
        }
    }

    /// Register the director agent.
    pub fn add_director(&mut self, agent: Box<dyn Agent>) {
        self.agents.insert(AgentId::director(), agent);
    }

    /// Register a player character: stores the sheet, appends the PC to
    /// the turn queue, and binds the agent to the PC's identity.
    pub fn add_player(&mut self, sheet: CharacterSheet, agent: Box<dyn Agent>) {
        let id = sheet.agent_id();
        self.state = self.state.clone().with_player(sheet);
        self.agents.insert(id, agent);
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn into_state(self) -> GameState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whose turn comes next.
    pub fn current_actor(&self) -> AgentId {
        router::current_actor(&self.state)
    }

    /// Resolve one turn.
    ///
    /// On timeout or agent error the state is unchanged; call `step` again
    /// to retry the same turn, or `skip_turn` to move past it.
    pub async fn step(&mut self) -> Result<TurnReport, SessionError> {
        let actor = router::current_actor(&self.state);

        // NPC slots are played by the director agent.
        let agent_key = if actor.as_npc_key().is_some() {
            AgentId::director()
        } else {
            actor.clone()
        };
        let agent = self
            .agents
            .get_mut(&agent_key)
            .ok_or_else(|| SessionError::UnknownAgent(agent_key.clone()))?;

        let context = build_context(&self.state, &actor);
        let specs = ActionCatalog::for_actor(&actor);

        tracing::debug!(
            actor = %actor,
            turn = self.state.turn_number,
            mode = ?router::mode(&self.state),
            "turn start"
        );

        let reply = match tokio::time::timeout(
            self.config.turn_timeout,
            agent.take_turn(&context, &specs),
        )
        .await
        {
            Err(_) => {
                tracing::warn!(actor = %actor, "turn timed out");
                return Err(SessionError::TurnTimeout { agent: actor });
            }
            Ok(Err(e)) => {
                tracing::warn!(actor = %actor, error = %e, "agent failed");
                return Err(SessionError::Agent(e));
            }
            Ok(Ok(reply)) => reply,
        };

        // The agent answered; from here every mutation settles before the
        // turn ends.
        let mut state = self.state.clone();

        let narrative = reply.narrative.trim().to_string();
        if !narrative.is_empty() {
            let entry = LogEntry::new(
                state.turn_number,
                LogKind::Narrative,
                state.display_name(&actor),
                narrative.clone(),
            );
            state = apply_effects(&state, &[Effect::LogAppended(entry)]);
        }

        let mut observations = Vec::new();
        for request in &reply.requests {
            let outcome = self
                .engine
                .apply(&state, &actor, &request.name, &request.args);
            observations.push(outcome.reply);
            state = outcome.state;
        }

        state = router::advance(&state);
        self.state = state;

        if let Some(dir) = self.config.autosave_dir.clone() {
            self.autosave(&dir).await?;
        }

        Ok(TurnReport {
            actor,
            narrative,
            observations,
        })
    }

    /// Skip the current actor's turn without invoking it, advancing the
    /// router. Used after repeated timeouts.
    pub fn skip_turn(&mut self) -> AgentId {
        let skipped = router::current_actor(&self.state);
        tracing::info!(actor = %skipped, "turn skipped");
        self.state = router::advance(&self.state);
        skipped
    }

    /// Save the current state to the given path.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        SavedSession::new(self.state.clone()).save_json(path).await?;
        Ok(())
    }

    async fn autosave(&self, dir: &Path) -> Result<(), SessionError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = persist::autosave_path(dir, &self.config.session_name);
        self.save(path).await
    }

    /// Clone the current snapshot into an independently mutable branch.
    /// The running session keeps its own timeline.
    pub fn fork(&self, branch_name: impl Into<String>) -> GameState {
        persist::fork_state(&self.state, branch_name)
    }
}
