//! Ask command implementation
//!
//! Runs the same aggregation as `GET /api/instant_answer` without a server.

use clap::Parser;
use std::path::PathBuf;

use crate::ai::build_client;
use crate::answer::{Answer, AnswerService};
use crate::core::config::Config;
use crate::core::error::Result;

/// Arguments for the ask command
#[derive(Parser, Debug)]
#[command(after_help = "EXAMPLES:
    medquery ask \"what causes migraines\"
    medquery ask --json \"symptoms of anemia\"")]
pub struct AskArgs {
    /// The question to ask
    pub question: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Path to a TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub async fn run(args: AskArgs) -> Result<()> {
    let config = Config::load(args.config.as_deref())?;
    let service = AnswerService::from_config(&config, build_client()?);

    let (answer, source) = match service.answer(&args.question).await {
        Answer::Guidance(message) => (message, None),
        Answer::Aggregated(result) => (result.answer, Some(result.source)),
    };

    if args.json {
        let output = serde_json::json!({ "answer": answer, "source": source });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", answer);
    if let Some(source) = source.filter(|s| !s.is_empty()) {
        println!("\n{}", source);
    }
    Ok(())
}
