//! Terminal front end for the story engine.
//!
//! Builds a world for a theme, then reads the player's choices from stdin:
//!
//! ```bash
//! cargo run -p story -- --theme "Space Adventure" --provider deepseek
//! ```

mod play;

use clap::Parser;
use openai::Provider;
use std::time::Duration;
use story_core::{BackendConfig, FlowConfig, RetryPolicy, StoryFlow};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Interactive branching stories written by an LLM.
#[derive(Parser, Debug)]
#[command(name = "story")]
#[command(about = "Interactive branching stories written by an LLM")]
#[command(version)]
struct Args {
    /// Story theme, e.g. "Town Suspense"
    #[arg(short, long, default_value = "Town Suspense")]
    theme: String,

    /// Provider preset: openai, dashscope or deepseek
    #[arg(short, long, env = "STORY_PROVIDER")]
    provider: Option<Provider>,

    /// Model name, overriding the provider default
    #[arg(short, long, env = "STORY_MODEL")]
    model: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[arg(long, env = "STORY_BASE_URL")]
    base_url: Option<String>,

    /// Attempts per agent call before giving up
    #[arg(long, default_value_t = 3)]
    max_attempts: usize,

    /// Total timeout for each request, in seconds
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,

    /// How many characters from the world's roster to bring to life
    #[arg(long, default_value_t = 2)]
    roster: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr so the story stays readable on stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = BackendConfig::from_env()?.with_timeout(Duration::from_secs(args.timeout_secs));
    if let Some(provider) = args.provider {
        config = config.with_provider(provider);
    }
    if let Some(model) = args.model {
        config = config.with_model(model);
    }
    if let Some(base_url) = args.base_url {
        config = config.with_base_url(base_url);
    }

    if config.api_key.is_none() {
        eprintln!("Error: no API key configured.");
        eprintln!("Set STORY_API_KEY (or OPENAI_API_KEY) in a .env file or the environment.");
        std::process::exit(1);
    }

    info!(
        provider = %config.provider,
        model = config.effective_model(),
        theme = %args.theme,
        "starting story"
    );

    let flow = StoryFlow::new(config.build_backend()?)
        .with_policy(RetryPolicy::new(args.max_attempts)?)
        .with_config(FlowConfig::default().with_roster_limit(args.roster));

    play::run_story(&flow, &args.theme).await?;
    Ok(())
}
