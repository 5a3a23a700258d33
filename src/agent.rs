//! The language-model invocation boundary.
//!
//! The core never talks to a model provider. It hands an agent its
//! assembled context plus the actions currently available, and gets back
//! narrative text and zero or more requested actions. Anything that can
//! drive that exchange (an API client, a human at a prompt, a script)
//! implements [`Agent`].

use crate::actions::ActionSpec;
use crate::context::ContextBundle;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors crossing the agent boundary. These are recoverable at the turn
/// level: the orchestration loop retries or skips, state is untouched.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent transport error: {0}")]
    Transport(String),

    #[error("agent returned an empty reply")]
    EmptyReply,
}

/// An action an agent asks the engine to perform on its behalf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub name: String,
    pub args: Value,
}

impl ActionRequest {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// What an agent produced for its turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    /// Narrative text for the shared story log. May be empty when the
    /// turn is purely mechanical.
    pub narrative: String,

    /// Requested actions, applied in order by the interceptor.
    pub requests: Vec<ActionRequest>,
}

impl AgentReply {
    /// A purely narrative reply.
    pub fn narrative(text: impl Into<String>) -> Self {
        Self {
            narrative: text.into(),
            requests: Vec::new(),
        }
    }

    pub fn with_request(mut self, name: impl Into<String>, args: Value) -> Self {
        self.requests.push(ActionRequest::new(name, args));
        self
    }
}

/// An autonomous participant: the director or one player character.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Take one turn given the visibility-filtered context and the actions
    /// this actor may request.
    async fn take_turn(
        &mut self,
        context: &ContextBundle,
        actions: &[ActionSpec],
    ) -> Result<AgentReply, AgentError>;
}
