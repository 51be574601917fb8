//! The story flow: world, then characters, then dialogue.
//!
//! Every step is one retried agent call. Steps run strictly in order and
//! each awaits the previous one, so an agent only ever sees one request at a
//! time.

use crate::agent::{Agent, AgentRegistry, CHARACTER_MAKER, WORLD_MANAGER};
use crate::backend::LlmBackend;
use crate::config::FlowConfig;
use crate::error::{StoryError, StoryResult};
use crate::prompt::{
    character_agent_prompt, character_instruction, choice_instruction, continuation_instruction,
    opening_dialogue_instruction, world_instruction, PromptCompiler,
};
use crate::retry::{RetryController, RetryPolicy};
use crate::story::{Character, Choice, Story};
use crate::validate::{
    CharacterContract, ContinuationContract, DialogueContract, DialogueTurn, OutputContract,
    WorldContract, WorldOverview, MIN_CHARACTERS,
};
use tracing::{debug, info, instrument};

/// Drives a story against an LLM backend.
pub struct StoryFlow<B: LlmBackend> {
    backend: B,
    policy: RetryPolicy,
    config: FlowConfig,
}

impl<B: LlmBackend> StoryFlow<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            policy: RetryPolicy::default(),
            config: FlowConfig::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_config(mut self, config: FlowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Create the world, elaborate its characters and open the dialogue.
    ///
    /// Each rostered character gets an agent of its own in `registry`. The
    /// second character (the partner) speaks the opening dialogue, which is
    /// the story's first chat.
    #[instrument(skip(self, registry))]
    pub async fn safe_story_progression(
        &self,
        registry: &mut AgentRegistry,
        theme: &str,
    ) -> StoryResult<Story> {
        info!("creating world");
        let contract = WorldContract {
            roster_limit: self.config.roster_limit,
        };
        let world = self
            .call(registry.get_mut(WORLD_MANAGER)?, &world_instruction(theme), &contract)
            .await?;
        info!(characters = ?world.characters, "world created");

        let mut story = Story::new(theme, world.text);

        for name in &world.characters {
            info!(character = %name, "elaborating character");
            let instruction = character_instruction(&story.world_overview, name);
            let maker = registry.get_mut(CHARACTER_MAKER)?;
            let attempted = self
                .controller()
                .run(maker, &instruction, &CharacterContract)
                .await?;

            let character = Character::new(name.as_str(), attempted.output, attempted.raw);
            registry.add_agent(name.as_str(), character_agent_prompt(&character));
            story.characters.push(character);
        }

        let (protagonist, partner) = match (story.protagonist(), story.partner()) {
            (Some(protagonist), Some(partner)) => (protagonist, partner),
            _ => {
                return Err(StoryError::MissingCharacters {
                    needed: MIN_CHARACTERS,
                    found: story.characters.len(),
                })
            }
        };

        info!(partner = %partner.name, "opening dialogue");
        let instruction =
            opening_dialogue_instruction(&story.world_overview, partner, &protagonist.name);
        let partner_name = partner.name.clone();
        let opening = self
            .call(registry.get_mut(&partner_name)?, &instruction, &DialogueContract)
            .await?;
        story.record_chat(&opening);

        Ok(story)
    }

    /// Answer the player's choice with the next dialogue turn.
    ///
    /// Only `agent` is touched: on success it gains exactly one turn.
    #[instrument(skip(self, agent), fields(agent = %agent.name()))]
    pub async fn process_player_choice(
        &self,
        agent: &mut Agent,
        choice: Choice,
    ) -> StoryResult<DialogueTurn> {
        let previous = agent
            .last_reply()
            .and_then(|reply| DialogueContract.validate(reply).ok());
        if previous.is_none() {
            debug!("no previous dialogue turn to quote");
        }

        let instruction = choice_instruction(choice, previous.as_ref());
        self.call(agent, &instruction, &DialogueContract).await
    }

    /// Route a choice to the story's partner and record the reply as a chat.
    pub async fn advance(
        &self,
        registry: &mut AgentRegistry,
        story: &mut Story,
        choice: Choice,
    ) -> StoryResult<DialogueTurn> {
        let partner = story
            .partner()
            .map(|c| c.name.clone())
            .ok_or(StoryError::MissingCharacters {
                needed: MIN_CHARACTERS,
                found: story.characters.len(),
            })?;

        let turn = self
            .process_player_choice(registry.get_mut(&partner)?, choice)
            .await?;
        story.record_chat(&turn);
        Ok(turn)
    }

    /// Have the world manager write the next chapter.
    #[instrument(skip(self, registry, story), fields(theme = %story.theme))]
    pub async fn continue_story(
        &self,
        registry: &mut AgentRegistry,
        story: &mut Story,
    ) -> StoryResult<WorldOverview> {
        let instruction = continuation_instruction(story);
        let chapter = self
            .call(registry.get_mut(WORLD_MANAGER)?, &instruction, &ContinuationContract)
            .await?;
        story.chapters.push(chapter.text.clone());
        info!(chapter = story.chapters.len(), "story continued");
        Ok(chapter)
    }

    async fn call<C: OutputContract>(
        &self,
        agent: &mut Agent,
        instruction: &str,
        contract: &C,
    ) -> StoryResult<C::Output> {
        self.controller()
            .run(agent, instruction, contract)
            .await
            .map(|attempted| attempted.output)
    }

    fn controller(&self) -> RetryController<'_> {
        RetryController::new(
            &self.backend,
            &self.policy,
            PromptCompiler::new(self.config.history_window),
        )
    }
}
