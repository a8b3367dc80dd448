use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "colloquy",
    about = "Reassembly and sequencing engine for streamed conversational backends",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a recorded session and print the resulting transcript.
    Replay {
        /// Recording file (`>` input, `<` frame, `~` wait, `!` cancel, `!!` clear).
        #[arg(value_name = "FILE")]
        recording: PathBuf,

        /// Configuration file. Default: `.colloquy/config.toml` in the current directory.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the response timeout in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}
