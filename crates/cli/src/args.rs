//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

/// echopost: learns a Bluesky account's voice with a local LLM and posts in it
#[derive(Parser, Debug)]
#[command(name = "echopost")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Ollama model used for generation (overrides OLLAMA_MODEL and config)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Generate and validate posts without publishing them
    #[arg(long)]
    pub dry_run: bool,

    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}
