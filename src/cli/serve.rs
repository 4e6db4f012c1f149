//! Serve command implementation

use clap::Args;
use std::path::PathBuf;

use crate::core::config::Config;
use crate::core::error::Result;

/// Arguments for the serve command
#[derive(Args, Debug)]
#[command(after_help = "EXAMPLES:
    medquery serve                     Listen on 0.0.0.0:8000
    medquery serve --port 8080         Use custom port
    medquery serve -c ./medquery.toml  Use a specific config file")]
pub struct ServeArgs {
    /// Interface to bind (overrides config and MEDQUERY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (overrides config and PORT)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to a TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Run the serve command
pub async fn run(args: ServeArgs) -> Result<()> {
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    crate::web::server::run(config).await
}
