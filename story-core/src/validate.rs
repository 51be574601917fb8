//! Output validation for each kind of agent call.
//!
//! Every call site has a strict parse contract. A response either parses
//! into the call site's structured output or is rejected with a reason that
//! is logged and fed back to the model on the next attempt.

use crate::error::{StoryError, StoryResult};
use crate::story::Choice;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fewest characters a story opening must introduce: protagonist and partner.
pub const MIN_CHARACTERS: usize = 2;

static BLANK_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").expect("valid regex"));

static CHARACTER_LIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)character\s+list\s*\**\s*[:：]\**").expect("valid regex"));

static ROSTER_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\**\s*\d+[.)]\s*(.+)$").expect("valid regex"));

// Letters past C are matched so that a fourth option is reported, not ignored.
static OPTION_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t>]*\**([A-E])\.\**[ \t]+").expect("valid regex"));

static QUOTED_SPEECH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""[^"\n]+"|“[^”]+”|「[^」]+」"#).expect("valid regex"));

/// The kind of call a response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallSite {
    WorldCreation,
    CharacterCreation,
    DialogueTurn,
    StoryContinuation,
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CallSite::WorldCreation => "world creation",
            CallSite::CharacterCreation => "character creation",
            CallSite::DialogueTurn => "dialogue turn",
            CallSite::StoryContinuation => "story continuation",
        };
        f.write_str(label)
    }
}

/// Why a response was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub reason: String,
}

impl Violation {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Pass with the parsed output, or fail with a reason.
pub type Verdict<T> = Result<T, Violation>;

/// A call site's output contract.
pub trait OutputContract {
    /// What a passing response parses into.
    type Output;

    fn call_site(&self) -> CallSite;

    fn validate(&self, response: &str) -> Verdict<Self::Output>;
}

/// A story opening (or continuation) and the characters it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldOverview {
    /// The full response.
    pub text: String,
    /// Everything before the character list.
    pub narrative: String,
    /// Protagonist first.
    pub characters: Vec<String>,
}

/// The two sections of a character maker answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterProfile {
    pub backstory: String,
    pub personality: String,
}

/// A narrative passage followed by the player's three options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueTurn {
    pub narrative: String,
    /// Option text for A, B and C, without markup.
    pub options: [String; 3],
    /// The whole response, trimmed.
    pub raw: String,
}

impl DialogueTurn {
    pub fn option(&self, choice: Choice) -> &str {
        &self.options[choice.index()]
    }
}

/// Contract for the world manager's story opening.
#[derive(Debug, Clone, Copy)]
pub struct WorldContract {
    /// How many named characters to keep, protagonist first.
    pub roster_limit: usize,
}

impl Default for WorldContract {
    fn default() -> Self {
        Self {
            roster_limit: MIN_CHARACTERS,
        }
    }
}

impl OutputContract for WorldContract {
    type Output = WorldOverview;

    fn call_site(&self) -> CallSite {
        CallSite::WorldCreation
    }

    fn validate(&self, response: &str) -> Verdict<WorldOverview> {
        let text = normalize(response);
        let text = text.trim();

        if text.chars().count() < 100 {
            return Err(Violation::new("Response is too short or empty"));
        }
        if paragraph_count(text) < 2 {
            return Err(Violation::new("Response does not contain a proper narrative"));
        }

        let Some((heading_start, mut characters)) = parse_character_list(text) else {
            return Err(Violation::new("Response does not contain a Character List"));
        };
        if characters.len() < MIN_CHARACTERS {
            return Err(Violation::new(
                "Response does not contain at least two character names",
            ));
        }

        let narrative = text[..heading_start].trim().trim_end_matches('*').trim();
        if narrative.is_empty() {
            return Err(Violation::new("Response does not contain a proper narrative"));
        }

        characters.truncate(self.roster_limit.max(MIN_CHARACTERS));
        Ok(WorldOverview {
            text: text.to_string(),
            narrative: narrative.to_string(),
            characters,
        })
    }
}

/// Contract for the character maker's backstory.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharacterContract;

impl OutputContract for CharacterContract {
    type Output = CharacterProfile;

    fn call_site(&self) -> CallSite {
        CallSite::CharacterCreation
    }

    fn validate(&self, response: &str) -> Verdict<CharacterProfile> {
        let text = normalize(response);
        let text = text.trim();

        if text.chars().count() < 100 {
            return Err(Violation::new("Character background is too short or empty"));
        }

        let mut current = None;
        let mut background: Option<Vec<&str>> = None;
        let mut personality: Option<Vec<&str>> = None;

        for line in text.lines() {
            if let Some((section, inline)) = section_heading(line) {
                let lines = match section {
                    Section::Background => background.get_or_insert_with(Vec::new),
                    Section::Personality => personality.get_or_insert_with(Vec::new),
                };
                if !inline.is_empty() {
                    lines.push(inline);
                }
                current = Some(section);
                continue;
            }
            match current {
                Some(Section::Background) => background.get_or_insert_with(Vec::new).push(line),
                Some(Section::Personality) => personality.get_or_insert_with(Vec::new).push(line),
                None => {}
            }
        }

        let Some(background) = background else {
            return Err(Violation::new("Response does not contain a Background section"));
        };
        let Some(personality) = personality else {
            return Err(Violation::new("Response does not contain a Personality section"));
        };

        let backstory = join_section(&background);
        if backstory.is_empty() {
            return Err(Violation::new("Background section is empty"));
        }
        let personality = join_section(&personality);
        if personality.is_empty() {
            return Err(Violation::new("Personality section is empty"));
        }

        Ok(CharacterProfile {
            backstory,
            personality,
        })
    }
}

/// Contract for a character agent's dialogue turn.
#[derive(Debug, Clone, Copy, Default)]
pub struct DialogueContract;

impl OutputContract for DialogueContract {
    type Output = DialogueTurn;

    fn call_site(&self) -> CallSite {
        CallSite::DialogueTurn
    }

    fn validate(&self, response: &str) -> Verdict<DialogueTurn> {
        let text = normalize(response);
        let text = text.trim();

        if text.chars().count() < 50 {
            return Err(Violation::new("Dialogue response is too short or empty"));
        }

        let markers: Vec<(char, usize, usize)> = OPTION_MARKER
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let letter = caps[1].chars().next()?;
                Some((letter, whole.start(), whole.end()))
            })
            .collect();

        let letters: Vec<char> = markers.iter().map(|(letter, _, _)| *letter).collect();
        if letters != ['A', 'B', 'C'] {
            if letters.is_empty() {
                return Err(Violation::new(
                    "Response does not contain the options A, B and C",
                ));
            }
            let found: Vec<String> = letters.iter().map(char::to_string).collect();
            return Err(Violation::new(format!(
                "Response does not contain exactly the options A, B, C in order (found {})",
                found.join(", ")
            )));
        }

        let narrative = text[..markers[0].1].trim();
        if narrative
            .chars()
            .all(|c| c.is_whitespace() || matches!(c, '*' | '#' | '>' | '-' | '_'))
        {
            return Err(Violation::new(
                "Dialogue response has no narrative before the options",
            ));
        }

        let mut options: [String; 3] = Default::default();
        for (i, (letter, _, body_start)) in markers.iter().enumerate() {
            // An option is exactly one line.
            let line_end = text[*body_start..]
                .find('\n')
                .map_or(text.len(), |n| body_start + n);
            let option = clean_option(&text[*body_start..line_end]);
            if option.is_empty() {
                return Err(Violation::new(format!("Option {letter} is empty")));
            }

            let next = markers.get(i + 1).map_or(text.len(), |m| m.1);
            let trailing = &text[line_end..next.max(line_end)];
            if !trailing.trim().is_empty() {
                // Only a sign-off after a blank line may follow option C.
                let signed_off = i == 2 && BLANK_LINE.find(trailing).is_some_and(|m| m.start() == 0);
                if !signed_off {
                    return Err(Violation::new(format!(
                        "Option {letter} is followed by text that is not an option"
                    )));
                }
            }
            options[i] = option;
        }

        let lowered: Vec<String> = options.iter().map(|o| o.to_lowercase()).collect();
        if lowered[0] == lowered[1] || lowered[0] == lowered[2] || lowered[1] == lowered[2] {
            return Err(Violation::new("Options A, B and C must be distinct"));
        }

        Ok(DialogueTurn {
            narrative: narrative.to_string(),
            options,
            raw: text.to_string(),
        })
    }
}

/// Contract for the world manager continuing an existing story.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContinuationContract;

impl OutputContract for ContinuationContract {
    type Output = WorldOverview;

    fn call_site(&self) -> CallSite {
        CallSite::StoryContinuation
    }

    fn validate(&self, response: &str) -> Verdict<WorldOverview> {
        let text = normalize(response);
        let text = text.trim();

        if text.chars().count() < 200 {
            return Err(Violation::new("Story continuation is too short or empty"));
        }
        if paragraph_count(text) < 3 {
            return Err(Violation::new(
                "Story continuation does not have enough paragraphs",
            ));
        }
        if !QUOTED_SPEECH.is_match(text) {
            return Err(Violation::new(
                "Story continuation does not contain any dialogue",
            ));
        }

        let (heading_start, characters) = match parse_character_list(text) {
            Some((start, names)) if !names.is_empty() => (start, names),
            _ => {
                return Err(Violation::new(
                    "Story continuation does not contain an updated Character List",
                ))
            }
        };

        Ok(WorldOverview {
            text: text.to_string(),
            narrative: text[..heading_start].trim().trim_end_matches('*').trim().to_string(),
            characters,
        })
    }
}

/// Character names from a world manager response, protagonist first.
pub fn extract_characters_from_story(response: &str) -> StoryResult<Vec<String>> {
    check(&WorldContract::default(), response).map(|world| world.characters)
}

/// The A, B and C option texts from a dialogue response.
pub fn extract_options_from_dialogue(response: &str) -> StoryResult<[String; 3]> {
    check(&DialogueContract, response).map(|turn| turn.options)
}

/// Validate a response, mapping a violation into a [`StoryError`].
pub fn check<C: OutputContract>(contract: &C, response: &str) -> StoryResult<C::Output> {
    contract
        .validate(response)
        .map_err(|v| StoryError::FormatViolation {
            call_site: contract.call_site(),
            reason: v.reason,
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Background,
    Personality,
}

/// Recognise a `Background` / `Personality` heading line, returning any
/// text that follows a colon on the same line.
fn section_heading(line: &str) -> Option<(Section, &str)> {
    let stripped = line.trim().trim_start_matches(|c: char| {
        c == '#' || c == '*' || c == '-' || c == '.' || c.is_ascii_digit() || c.is_whitespace()
    });

    for (keyword, section) in [
        ("background", Section::Background),
        ("personality", Section::Personality),
    ] {
        let Some(prefix) = stripped.get(..keyword.len()) else {
            continue;
        };
        if !prefix.eq_ignore_ascii_case(keyword) {
            continue;
        }

        let after = &stripped[keyword.len()..];
        let (label, inline, has_colon) = match after.find([':', '：']) {
            Some(idx) => {
                let colon_len = after[idx..].chars().next().map_or(1, char::len_utf8);
                (&after[..idx], &after[idx + colon_len..], true)
            }
            None => (after, "", false),
        };

        // "Background and Personality of Ami" is a title, not a section.
        let label_lower = label.to_lowercase();
        if label_lower.contains("background") || label_lower.contains("personality") {
            return None;
        }
        let label = label.trim_matches(|c: char| c == '*' || c == '#' || c.is_whitespace());
        if (!has_colon && !label.is_empty()) || label.chars().count() > 30 {
            return None;
        }

        let inline = inline.trim_matches(|c: char| c == '*' || c.is_whitespace());
        return Some((section, inline));
    }
    None
}

fn join_section(lines: &[&str]) -> String {
    lines.join("\n").trim().to_string()
}

/// Find the last character list heading and the names numbered under it.
///
/// Returns the byte offset where the heading starts.
fn parse_character_list(text: &str) -> Option<(usize, Vec<String>)> {
    let heading = CHARACTER_LIST.find_iter(text).last()?;

    let mut names = Vec::new();
    for line in text[heading.end()..].lines() {
        if line.trim().is_empty() {
            if names.is_empty() {
                continue;
            }
            break;
        }
        match ROSTER_ENTRY.captures(line) {
            Some(caps) => {
                let name = clean_name(&caps[1]);
                if !name.is_empty() && !names.contains(&name) {
                    names.push(name);
                }
            }
            None if names.is_empty() => continue,
            None => break,
        }
    }

    Some((heading.start(), names))
}

fn clean_name(raw: &str) -> String {
    let mut name = raw;
    for separator in ["(", "（", ":", " - ", " – ", " — ", ","] {
        if let Some(idx) = name.find(separator) {
            name = &name[..idx];
        }
    }
    name.trim_matches(|c: char| {
        c == '*' || c == '_' || c == '"' || c == '\'' || c.is_whitespace()
    })
    .to_string()
}

fn clean_option(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| {
            c == '*' || c == '"' || c == '“' || c == '”' || c.is_whitespace()
        })
        .to_string()
}

fn paragraph_count(text: &str) -> usize {
    BLANK_LINE
        .split(text)
        .filter(|p| !p.trim().is_empty())
        .count()
}

fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORLD: &str = "The rain had not stopped for three days when the lighthouse keeper found the letter wedged beneath his door.\n\n\
        Down in the harbour, a stranger in a grey coat stepped off the ferry and asked for the keeper by name.\n\n\
        **Character List:**\n1. Ami (the keeper)\n2. Qinghe - the stranger\n3. Old Bao\n";

    const PROFILE: &str = "**Background:** Qinghe grew up on the salt flats east of the harbour, the youngest of five.\n\
        She left home at sixteen to apprentice with a cartographer.\n\n\
        **Personality:** Patient, dry-humoured and quietly stubborn; she trusts maps more than people.";

    const DIALOGUE: &str = "Qinghe shakes the rain from her coat and studies you. \"You are the keeper, then. I have come a long way to find you.\"\n\n\
        A. **\"Who sent you here?\"**\n\
        B. **\"I don't talk to strangers after dark.\"**\n\
        C. **\"Come inside before you catch a chill.\"**\n\n\
        I will wait for your answer.";

    #[test]
    fn test_world_contract_parses_roster() {
        let world = WorldContract::default().validate(WORLD).unwrap();
        assert_eq!(world.characters, vec!["Ami", "Qinghe"]);
        assert!(world.narrative.starts_with("The rain"));
        assert!(!world.narrative.contains("Character List"));

        let wide = WorldContract { roster_limit: 5 }.validate(WORLD).unwrap();
        assert_eq!(wide.characters, vec!["Ami", "Qinghe", "Old Bao"]);
    }

    #[test]
    fn test_world_contract_failures() {
        let contract = WorldContract::default();
        assert_eq!(
            contract.validate("short").unwrap_err().reason,
            "Response is too short or empty"
        );

        let one_paragraph = WORLD.replace("\n\n", " ");
        assert_eq!(
            contract.validate(&one_paragraph).unwrap_err().reason,
            "Response does not contain a proper narrative"
        );

        let no_list = WORLD.replace("**Character List:**", "Cast");
        assert_eq!(
            contract.validate(&no_list).unwrap_err().reason,
            "Response does not contain a Character List"
        );

        let single = WORLD.replace("2. Qinghe - the stranger\n3. Old Bao\n", "");
        assert_eq!(
            contract.validate(&single).unwrap_err().reason,
            "Response does not contain at least two character names"
        );
    }

    #[test]
    fn test_extract_characters_from_story() {
        assert_eq!(
            extract_characters_from_story(WORLD).unwrap(),
            vec!["Ami".to_string(), "Qinghe".to_string()]
        );
        assert!(matches!(
            extract_characters_from_story("nothing here"),
            Err(StoryError::FormatViolation {
                call_site: CallSite::WorldCreation,
                ..
            })
        ));
    }

    #[test]
    fn test_character_contract() {
        let profile = CharacterContract.validate(PROFILE).unwrap();
        assert!(profile.backstory.starts_with("Qinghe grew up"));
        assert!(profile.backstory.contains("cartographer"));
        assert!(profile.personality.starts_with("Patient"));
    }

    #[test]
    fn test_character_contract_heading_lines() {
        let text = "### Background and Personality for Qinghe\n\n## Background\n\
            Qinghe grew up on the salt flats east of the harbour, the youngest of five children.\n\n\
            ## Personality\nPatient and quietly stubborn.";
        let profile = CharacterContract.validate(text).unwrap();
        assert!(profile.backstory.contains("salt flats"));
        assert_eq!(profile.personality, "Patient and quietly stubborn.");
    }

    #[test]
    fn test_character_contract_missing_section() {
        let text = PROFILE.replace("**Personality:**", "Also,");
        assert_eq!(
            CharacterContract.validate(&text).unwrap_err().reason,
            "Response does not contain a Personality section"
        );

        let text = format!("{}\n\nPersonality:", PROFILE.split("\n\n").next().unwrap());
        assert_eq!(
            CharacterContract.validate(&text).unwrap_err().reason,
            "Personality section is empty"
        );
    }

    #[test]
    fn test_dialogue_contract() {
        let turn = DialogueContract.validate(DIALOGUE).unwrap();
        assert!(turn.narrative.starts_with("Qinghe shakes"));
        assert_eq!(turn.option(Choice::A), "Who sent you here?");
        assert_eq!(turn.option(Choice::C), "Come inside before you catch a chill.");
        assert_eq!(turn.raw, DIALOGUE);
    }

    #[test]
    fn test_dialogue_missing_option_c() {
        let text = DIALOGUE.replace("C. **\"Come inside before you catch a chill.\"**\n", "");
        assert_eq!(
            DialogueContract.validate(&text).unwrap_err().reason,
            "Response does not contain exactly the options A, B, C in order (found A, B)"
        );
    }

    #[test]
    fn test_dialogue_rejects_extra_and_reordered_options() {
        let extra = DIALOGUE.replace(
            "\n\nI will wait",
            "\nD. **\"Slam the door.\"**\n\nI will wait",
        );
        assert!(DialogueContract
            .validate(&extra)
            .unwrap_err()
            .reason
            .contains("found A, B, C, D"));

        let reordered = DIALOGUE.replace("A. **", "X. **").replace("X. **", "B. **");
        assert!(DialogueContract.validate(&reordered).is_err());
    }

    #[test]
    fn test_dialogue_requires_narrative_and_text() {
        let no_narrative = "A. \"Who sent you here, stranger?\"\nB. \"Go away.\"\nC. \"Come in, then.\"";
        assert_eq!(
            DialogueContract.validate(no_narrative).unwrap_err().reason,
            "Dialogue response has no narrative before the options"
        );

        let empty_b = DIALOGUE.replace("B. **\"I don't talk to strangers after dark.\"**", "B. **");
        assert_eq!(
            DialogueContract.validate(&empty_b).unwrap_err().reason,
            "Option B is empty"
        );

        let duplicate = DIALOGUE.replace("Come inside before you catch a chill.", "Who sent you here?");
        assert_eq!(
            DialogueContract.validate(&duplicate).unwrap_err().reason,
            "Options A, B and C must be distinct"
        );
    }

    #[test]
    fn test_dialogue_rejects_prose_glued_to_options() {
        let glued = DIALOGUE.replace(
            "\n\nI will wait for your answer.",
            "\nShe taps the console impatiently, clearly annoyed.",
        );
        assert_eq!(
            DialogueContract.validate(&glued).unwrap_err().reason,
            "Option C is followed by text that is not an option"
        );

        let wrapped = DIALOGUE.replace(
            "B. **\"I don't talk to strangers after dark.\"**\n",
            "B. **\"I don't talk to strangers\n after dark.\"**\n",
        );
        assert_eq!(
            DialogueContract.validate(&wrapped).unwrap_err().reason,
            "Option B is followed by text that is not an option"
        );
    }

    #[test]
    fn test_dialogue_markup_only_narrative() {
        let text = "**\n\n---\n\nA. \"Who sent you here, stranger?\"\nB. \"Go away.\"\nC. \"Come in, then.\"";
        assert_eq!(
            DialogueContract.validate(text).unwrap_err().reason,
            "Dialogue response has no narrative before the options"
        );
    }

    #[test]
    fn test_extract_options_from_dialogue() {
        let options = extract_options_from_dialogue(DIALOGUE).unwrap();
        assert_eq!(options[1], "I don't talk to strangers after dark.");
        assert!(extract_options_from_dialogue("no options at all, just a long line of prose.").is_err());
    }

    #[test]
    fn test_continuation_contract() {
        let text = "The keeper led Qinghe up the spiral stairs, the lamp swinging between them.\n\n\
            \"The letter was not meant for you,\" Qinghe said at last, unfolding a map across the table.\n\n\
            Outside, a second ferry sounded its horn, though none was due until morning, and both of them went quiet.\n\n\
            Character List:\n1. Ami\n2. Qinghe\n3. The ferryman";
        let chapter = ContinuationContract.validate(text).unwrap();
        assert_eq!(chapter.characters.len(), 3);

        let no_speech = text.replace('"', "");
        assert_eq!(
            ContinuationContract.validate(&no_speech).unwrap_err().reason,
            "Story continuation does not contain any dialogue"
        );

        let no_list = text.replace("Character List:", "Cast:");
        assert_eq!(
            ContinuationContract.validate(&no_list).unwrap_err().reason,
            "Story continuation does not contain an updated Character List"
        );
    }
}
