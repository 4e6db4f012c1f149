//! CLI command definitions and handlers

pub mod ask;
pub mod serve;

use clap::Parser;
use clap::Subcommand;

const LONG_ABOUT: &str = r#"
Medical question answering gateway.

Each question is sent to a chat model (OpenAI), a research-search model
(Perplexity) and a web search API (Google Custom Search) in parallel. The
answers that arrive in time are merged into one response with a list of
sources. Providers without credentials are skipped.

QUICK START:
    export OPENAI_API_KEY=...        Any subset of providers works
    export PERPLEXITY_API_KEY=...
    export GOOGLE_API_KEY=... GOOGLE_CSE_ID=...
    medquery serve                   Start the HTTP API on 0.0.0.0:8000
    medquery ask "migraine triggers" Answer one question in the terminal

CONFIGURATION:
    Settings are read from --config, $MEDQUERY_CONFIG or the platform
    config directory (config.toml), then overridden by environment
    variables (PORT, MEDQUERY_HOST and the API keys above).
    Log verbosity is controlled with MEDQUERY_LOG (e.g. debug).
"#;

/// Medical question answering gateway
#[derive(Parser, Debug)]
#[command(name = "medquery")]
#[command(author, version)]
#[command(about = "Medical question answering gateway")]
#[command(long_about = LONG_ABOUT)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API server
    #[command(visible_alias = "s")]
    Serve(serve::ServeArgs),

    /// Answer a single question from the terminal
    #[command(visible_alias = "a")]
    Ask(ask::AskArgs),
}
