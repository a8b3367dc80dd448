mod cli;

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use colloquy::config;
use colloquy::replay::{Recording, replay};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Replay {
            recording,
            config: config_path,
            timeout_ms,
        } => {
            let mut processor_config = match config_path {
                Some(path) => config::load_file(&path)?,
                None => config::load(Path::new("."))?,
            };
            if let Some(ms) = timeout_ms {
                processor_config.response_timeout_ms = ms;
            }

            let text = std::fs::read_to_string(&recording)
                .with_context(|| format!("failed to read {}", recording.display()))?;
            let recording = Recording::parse(&text)
                .with_context(|| format!("failed to parse {}", recording.display()))?;

            let transcript = replay(&recording, &processor_config).await;
            let mut stdout = std::io::stdout().lock();
            write!(stdout, "{transcript}")?;
            stdout.flush()?;
        }
    }
    Ok(())
}

/// Log to stderr, filtered by `COLLOQUY_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_env("COLLOQUY_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
