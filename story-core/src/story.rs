//! Story state: the world, its characters, and the dialogue so far.

use crate::error::StoryError;
use crate::validate::{CharacterProfile, DialogueTurn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A player decision at the end of a dialogue turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Choice {
    A,
    B,
    C,
}

impl Choice {
    pub const ALL: [Choice; 3] = [Choice::A, Choice::B, Choice::C];

    pub fn letter(&self) -> char {
        match self {
            Choice::A => 'A',
            Choice::B => 'B',
            Choice::C => 'C',
        }
    }

    /// Position in a dialogue turn's option list.
    pub fn index(&self) -> usize {
        match self {
            Choice::A => 0,
            Choice::B => 1,
            Choice::C => 2,
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for Choice {
    type Err = StoryError;

    /// Accepts `a`, `B`, ` c. ` and similar.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches(['.', ')']);
        match trimmed.to_ascii_uppercase().as_str() {
            "A" => Ok(Choice::A),
            "B" => Ok(Choice::B),
            "C" => Ok(Choice::C),
            _ => Err(StoryError::InvalidChoice(s.trim().to_string())),
        }
    }
}

/// A character elaborated by the character maker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    pub backstory: String,
    pub personality: String,
    /// The character maker's full answer.
    pub profile: String,
}

impl Character {
    pub fn new(name: impl Into<String>, profile: CharacterProfile, raw: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backstory: profile.backstory,
            personality: profile.personality,
            profile: raw.into(),
        }
    }
}

/// One game session's story.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub theme: String,
    pub world_overview: String,
    /// Protagonist first, then the dialogue partner, then anyone else.
    pub characters: Vec<Character>,
    /// Dialogue turns, oldest first.
    pub chats: Vec<String>,
    /// Story continuations written after the opening.
    pub chapters: Vec<String>,
}

impl Story {
    pub fn new(theme: impl Into<String>, world_overview: impl Into<String>) -> Self {
        Self {
            theme: theme.into(),
            world_overview: world_overview.into(),
            characters: Vec::new(),
            chats: Vec::new(),
            chapters: Vec::new(),
        }
    }

    /// The character the player speaks as.
    pub fn protagonist(&self) -> Option<&Character> {
        self.characters.first()
    }

    /// The character whose agent drives the dialogue.
    pub fn partner(&self) -> Option<&Character> {
        self.characters.get(1)
    }

    pub fn record_chat(&mut self, turn: &DialogueTurn) {
        self.chats.push(turn.raw.clone());
    }

    pub fn latest_chat(&self) -> Option<&str> {
        self.chats.last().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_parsing() {
        assert_eq!("a".parse::<Choice>().unwrap(), Choice::A);
        assert_eq!(" B. ".parse::<Choice>().unwrap(), Choice::B);
        assert_eq!("c)".parse::<Choice>().unwrap(), Choice::C);
        assert!(matches!("D".parse::<Choice>(), Err(StoryError::InvalidChoice(c)) if c == "D"));
        assert!("".parse::<Choice>().is_err());
        assert!("AB".parse::<Choice>().is_err());
    }

    #[test]
    fn test_choice_positions() {
        for (i, choice) in Choice::ALL.iter().enumerate() {
            assert_eq!(choice.index(), i);
        }
        assert_eq!(Choice::B.to_string(), "B");
    }

    #[test]
    fn test_story_roles() {
        let mut story = Story::new("Town Suspense", "A quiet town.");
        assert!(story.protagonist().is_none());

        let profile = CharacterProfile {
            backstory: "Raised by wolves.".to_string(),
            personality: "Gruff.".to_string(),
        };
        story.characters.push(Character::new("Ami", profile.clone(), "raw"));
        story.characters.push(Character::new("Qinghe", profile, "raw"));

        assert_eq!(story.protagonist().unwrap().name, "Ami");
        assert_eq!(story.partner().unwrap().name, "Qinghe");
    }
}
