//! Error types for story generation.

use crate::validate::CallSite;
use thiserror::Error;

/// Errors from the story engine.
///
/// `Backend` and `FormatViolation` are what a single attempt can fail with;
/// the retry controller recovers from them locally and only surfaces
/// `ExhaustedRetries` once the budget is spent.
#[derive(Debug, Error)]
pub enum StoryError {
    #[error("LLM backend error: {0}")]
    Backend(#[from] openai::Error),

    #[error("Invalid {call_site} response: {reason}")]
    FormatViolation { call_site: CallSite, reason: String },

    #[error("Failed to get valid {call_site} response after {attempts} attempts. Last error: {last_error}")]
    ExhaustedRetries {
        call_site: CallSite,
        attempts: usize,
        last_error: String,
    },

    #[error("Agent '{0}' not found")]
    AgentNotFound(String),

    #[error("Agent '{0}' has no system prompt")]
    MissingSystemPrompt(String),

    #[error("Invalid choice '{0}'. Please choose A, B, or C")]
    InvalidChoice(String),

    #[error("Story needs at least {needed} characters, found {found}")]
    MissingCharacters { needed: usize, found: usize },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoryError {
    /// Whether a retry controller should spend another attempt on this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoryError::Backend(e) => e.is_retryable(),
            StoryError::FormatViolation { .. } => true,
            _ => false,
        }
    }
}

pub type StoryResult<T> = std::result::Result<T, StoryError>;
