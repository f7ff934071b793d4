//! Prompt gateway.
//!
//! Relays prompts to a remote completion endpoint. Most of the binary is
//! process plumbing: a single coordinator loop fed by the HTTP listener,
//! the OS-signal watcher and a maintenance ticker, with graceful or
//! immediate shutdown and a rotating, self-cleaning log.
//!
//! ```text
//!     SIGINT/SIGTERM ──┐
//!                      ▼
//!   HTTP listener ──▶ sink ──▶ coordinator ──▶ exit mode ──▶ drain / stop
//!                      ▲           │
//!   ticker ────────────┘           └──▶ flush rotating log writer
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use prompt_gateway::config::load_or_default;
use prompt_gateway::lifecycle::{launch, ExitMode};

#[derive(Parser)]
#[command(name = "prompt-gateway", version)]
#[command(about = "Relay prompts to a completion endpoint", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "etc/prompt-gateway.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_or_default(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load config {}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    match launch(config).await {
        Ok(ExitMode::PanicNoWait) => {
            eprintln!("prompt-gateway stopped after a fatal error");
            ExitCode::FAILURE
        }
        Ok(mode) => {
            eprintln!("prompt-gateway stopped ({mode})");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("prompt-gateway failed to start: {e}");
            ExitCode::FAILURE
        }
    }
}
