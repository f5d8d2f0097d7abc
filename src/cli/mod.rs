// src/cli/mod.rs — CLI definition (clap derive)

pub mod ask;
pub mod check;
pub mod session;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "talkstream", about = "Talk to a streaming avatar", version)]
pub struct Cli {
    /// Config file path (default: ~/.talkstream/api.json)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open an avatar stream and talk to it from stdin
    Session {
        /// Voice to narrate with (overrides voice_id)
        #[arg(long)]
        voice: Option<String>,
    },
    /// Answer one question without the avatar
    Ask {
        #[arg(required = true, trailing_var_arg = true)]
        question: Vec<String>,
    },
    /// Show remaining streaming credits
    Credits,
    /// Validate the configuration
    Check,
}
