//! Line-oriented story loop.
//!
//! - `A`, `B` or `C` picks an option
//! - Lines starting with `#` are commands (continue, status, help, quit)

use std::io::{self, BufRead, Write};
use story_core::{AgentRegistry, Choice, DialogueTurn, LlmBackend, Story, StoryError, StoryFlow};

const HELP: &str = "  A, B, C    - Answer with that option
  #continue  - Let the narrator write the next chapter
  #status    - Show the story so far
  #help      - Show this help
  #quit      - Exit";

/// Create a story for `theme` and play it until stdin closes or the player quits.
pub async fn run_story<B: LlmBackend>(flow: &StoryFlow<B>, theme: &str) -> Result<(), StoryError> {
    let mut registry = AgentRegistry::with_defaults();

    println!("=== {theme} ===");
    println!("[GENERATING] Writing the world and its characters...");
    let mut story = flow.safe_story_progression(&mut registry, theme).await?;

    println!();
    println!("{}", story.world_overview);
    println!();
    for character in &story.characters {
        println!("[CHARACTER] {}", character.name);
        println!("  {}", character.personality);
    }
    println!();
    if let Some(opening) = story.latest_chat() {
        println!("{opening}");
    }
    println!();
    println!("Commands:");
    println!("{HELP}");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('#') {
            match command.trim() {
                "quit" | "exit" => {
                    println!("Goodbye!");
                    break;
                }
                "continue" => {
                    println!("[GENERATING]");
                    match flow.continue_story(&mut registry, &mut story).await {
                        Ok(chapter) => {
                            println!("[CHAPTER {}]", story.chapters.len());
                            println!("{}", chapter.text);
                        }
                        Err(e) => println!("[ERROR] {e}"),
                    }
                }
                "status" => print_status(&story, &registry),
                "help" => {
                    println!("[HELP]");
                    println!("{HELP}");
                }
                _ => println!("[ERROR] Unknown command. Type #help for help."),
            }
            stdout.flush().ok();
            continue;
        }

        let choice: Choice = match line.parse() {
            Ok(choice) => choice,
            Err(e) => {
                println!("[ERROR] {e}");
                continue;
            }
        };

        print!("[GENERATING]");
        stdout.flush().ok();

        match flow.advance(&mut registry, &mut story, choice).await {
            Ok(turn) => {
                print!("\r            \r");
                print_turn(&turn);
            }
            Err(e) => {
                println!();
                println!("[ERROR] {e}");
            }
        }
        stdout.flush().ok();
    }

    Ok(())
}

fn print_turn(turn: &DialogueTurn) {
    println!("{}", turn.narrative);
    println!();
    for choice in Choice::ALL {
        println!("{}. {}", choice, turn.option(choice));
    }
    println!();
}

fn print_status(story: &Story, registry: &AgentRegistry) {
    println!("[STATUS]");
    println!("  Theme: {}", story.theme);
    let names: Vec<&str> = story.characters.iter().map(|c| c.name.as_str()).collect();
    println!("  Characters: {}", names.join(", "));
    println!("  Dialogue turns: {}", story.chats.len());
    println!("  Chapters: {}", story.chapters.len());
    for name in registry.names() {
        if let Ok(agent) = registry.get(name) {
            println!("  Agent {name}: {} turns", agent.turn_count());
        }
    }
}
