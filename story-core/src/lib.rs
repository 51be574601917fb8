//! Multi-agent interactive story engine.
//!
//! This crate provides:
//! - Named agents, each a system prompt plus the exchanges it has completed
//! - Strict output contracts for world, character and dialogue replies
//! - A bounded retry loop that corrects malformed replies
//! - A story flow that builds a world, its characters and a branching dialogue
//!
//! # Quick Start
//!
//! ```ignore
//! use story_core::{AgentRegistry, BackendConfig, Choice, StoryFlow};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = BackendConfig::from_env()?.build_backend()?;
//!     let flow = StoryFlow::new(backend);
//!
//!     let mut registry = AgentRegistry::with_defaults();
//!     let mut story = flow.safe_story_progression(&mut registry, "Town Suspense").await?;
//!     println!("{}", story.world_overview);
//!
//!     let turn = flow.advance(&mut registry, &mut story, Choice::A).await?;
//!     println!("{}", turn.raw);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod backend;
pub mod config;
pub mod error;
pub mod flow;
pub mod prompt;
pub mod retry;
pub mod story;
pub mod testing;
pub mod validate;

// Primary public API
pub use agent::{Agent, AgentRegistry, Turn, CHARACTER_MAKER, WORLD_MANAGER};
pub use backend::{LlmBackend, OpenAiBackend};
pub use config::{BackendConfig, FlowConfig};
pub use error::{StoryError, StoryResult};
pub use flow::StoryFlow;
pub use prompt::PromptCompiler;
pub use retry::{RetryPolicy, RetryState};
pub use story::{Character, Choice, Story};
pub use testing::{MockBackend, MockReply};
pub use validate::{
    extract_characters_from_story, extract_options_from_dialogue, CallSite, DialogueTurn,
    OutputContract, Verdict, Violation, WorldOverview,
};
