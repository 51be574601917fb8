//! Prompt compilation and the instructions sent to each agent.

use crate::agent::Agent;
use crate::error::{StoryError, StoryResult};
use crate::story::{Character, Choice, Story};
use crate::validate::DialogueTurn;
use openai::Message;

/// System prompt for the agent that writes the story world.
pub const WORLD_MANAGER_PROMPT: &str = include_str!("prompts/world_manager.txt");

/// System prompt for the agent that writes character backstories.
pub const CHARACTER_MAKER_PROMPT: &str = include_str!("prompts/character_maker.txt");

/// The option block every dialogue turn must end with.
pub const DIALOGUE_FORMAT: &str = include_str!("prompts/dialogue_format.txt");

const CHARACTER_AGENT_TEMPLATE: &str = include_str!("prompts/character_agent.txt");

/// Turns an agent and an instruction into the message list sent to the backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptCompiler {
    /// Send only this many of the most recent turns. `None` sends all of them.
    pub history_window: Option<usize>,
}

impl PromptCompiler {
    pub fn new(history_window: Option<usize>) -> Self {
        Self { history_window }
    }

    /// System prompt, then history, then the instruction as a user message.
    pub fn compile(&self, agent: &Agent, instruction: &str) -> StoryResult<Vec<Message>> {
        if agent.system_prompt().trim().is_empty() {
            return Err(StoryError::MissingSystemPrompt(agent.name().to_string()));
        }

        let mut messages = Vec::with_capacity(2 + agent.turn_count() * 2);
        messages.push(Message::system(agent.system_prompt()));
        messages.extend(agent.history_messages(self.history_window));
        messages.push(Message::user(instruction));
        Ok(messages)
    }
}

pub fn world_instruction(theme: &str) -> String {
    format!("Please help me write a story beginning with the theme of '{theme} Story'")
}

pub fn character_instruction(world_overview: &str, name: &str) -> String {
    format!("{world_overview}\n\nHelp me write a Background and Personality for {name}")
}

/// The brief that starts the dialogue between the partner and the protagonist.
pub fn opening_dialogue_instruction(
    world_overview: &str,
    partner: &Character,
    protagonist: &str,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(world_overview);
    prompt.push_str("\n\n");
    prompt.push_str(&partner.profile);
    prompt.push_str(&format!(
        "\n\nNow you will play a dialogue between {} and {}, your task is to develop the story through questions and answers.\n\n",
        partner.name, protagonist
    ));
    prompt.push_str("'Focus on storytelling' by using specific expressions to drive the story forward.\n");
    prompt.push_str("The protagonist and you will take turns speaking. Provide responses and 3 possible replies strictly formatted as follows:\n\n");
    prompt.push_str(DIALOGUE_FORMAT.trim_end());
    prompt.push_str("\n\nThese options should genuinely change the story's direction and be labeled as shown above. ");
    prompt.push_str("I will tell you which answer the protagonist chooses.");
    prompt
}

/// Tell a character agent which option the protagonist picked.
///
/// `previous` is the turn the choice answers; when known its option text is
/// quoted back so the agent does not have to infer it from history.
pub fn choice_instruction(choice: Choice, previous: Option<&DialogueTurn>) -> String {
    let mut prompt = match previous {
        Some(turn) => format!(
            "The protagonist chooses {}: \"{}\"",
            choice,
            turn.option(choice)
        ),
        None => format!("The protagonist chooses {choice}."),
    };
    prompt.push_str("\n\nContinue the dialogue in character, then provide 3 possible replies strictly formatted as follows:\n\n");
    prompt.push_str(DIALOGUE_FORMAT.trim_end());
    prompt
}

/// Ask the world manager to carry the story on from the latest dialogue.
pub fn continuation_instruction(story: &Story) -> String {
    let mut prompt = format!("Continue writing the story of '{} Story'.", story.theme);

    if let Some(chat) = story.latest_chat() {
        let names: Vec<&str> = story.characters.iter().map(|c| c.name.as_str()).collect();
        prompt.push_str(&format!(
            " Here is the latest conversation between {}:\n\n{}",
            names.join(" and "),
            chat
        ));
    }

    prompt.push_str("\n\nWrite the next part in several paragraphs, with the characters speaking to each other in quotation marks. ");
    prompt.push_str("End with an updated Character List in the same format as before, the protagonist first.");
    prompt
}

/// The instruction to resend after a response failed validation.
pub fn correction(instruction: &str, reason: &str) -> String {
    format!(
        "{instruction}\n\nThe previous response was invalid because: {reason}. Please try again and ensure your response includes all required elements."
    )
}

/// System prompt for a character's own agent.
pub fn character_agent_prompt(character: &Character) -> String {
    let mut prompt = CHARACTER_AGENT_TEMPLATE.trim_end().replace("{name}", &character.name);
    prompt.push_str("\n\n## Background\n");
    prompt.push_str(&character.backstory);
    prompt.push_str("\n\n## Personality\n");
    prompt.push_str(&character.personality);
    prompt
}
