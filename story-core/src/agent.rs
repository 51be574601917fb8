//! Agents and the registry that owns them.
//!
//! An agent is a named role: a fixed system prompt plus the history of
//! exchanges it has completed. The registry is an ordinary value handed to
//! the story flow by reference; there is no global agent table.

use crate::error::{StoryError, StoryResult};
use crate::prompt::{CHARACTER_MAKER_PROMPT, WORLD_MANAGER_PROMPT};
use openai::Message;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name of the agent that writes the story world.
pub const WORLD_MANAGER: &str = "world_manager";

/// Name of the agent that writes character backstories.
pub const CHARACTER_MAKER: &str = "character_maker";

/// One completed exchange: what the agent was asked and what it answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub instruction: String,
    pub reply: String,
}

/// A named role with a fixed system prompt and an accumulating history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    name: String,
    system_prompt: String,
    history: Vec<Turn>,
}

impl Agent {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            history: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Number of completed exchanges.
    pub fn turn_count(&self) -> usize {
        self.history.len()
    }

    /// The most recent reply, if any.
    pub fn last_reply(&self) -> Option<&str> {
        self.history.last().map(|t| t.reply.as_str())
    }

    /// Append a completed exchange. History is never rewritten.
    pub fn record(&mut self, instruction: impl Into<String>, reply: impl Into<String>) {
        self.history.push(Turn {
            instruction: instruction.into(),
            reply: reply.into(),
        });
    }

    /// Flatten the most recent `window` turns (all of them when `None`)
    /// into alternating user/assistant messages.
    pub fn history_messages(&self, window: Option<usize>) -> Vec<Message> {
        let start = match window {
            Some(n) => self.history.len().saturating_sub(n),
            None => 0,
        };
        self.history[start..]
            .iter()
            .flat_map(|turn| {
                [
                    Message::user(turn.instruction.clone()),
                    Message::assistant(turn.reply.clone()),
                ]
            })
            .collect()
    }
}

/// Mapping from agent name to agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentRegistry {
    agents: HashMap<String, Agent>,
}

impl AgentRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the world manager and character maker.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.add_agent(WORLD_MANAGER, WORLD_MANAGER_PROMPT);
        registry.add_agent(CHARACTER_MAKER, CHARACTER_MAKER_PROMPT);
        registry
    }

    /// Register an agent with an empty history.
    ///
    /// Registering an existing name replaces that agent and its history.
    pub fn add_agent(&mut self, name: impl Into<String>, system_prompt: impl Into<String>) {
        let agent = Agent::new(name, system_prompt);
        self.agents.insert(agent.name.clone(), agent);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn get(&self, name: &str) -> StoryResult<&Agent> {
        self.agents
            .get(name)
            .ok_or_else(|| StoryError::AgentNotFound(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> StoryResult<&mut Agent> {
        self.agents
            .get_mut(name)
            .ok_or_else(|| StoryError::AgentNotFound(name.to_string()))
    }

    /// Registered agent names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.agents.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
