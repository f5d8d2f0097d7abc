// src/main.rs — talkstream entry point

use clap::Parser;

use talkstream::cli::{Cli, Commands};
use talkstream::infra::config::Config;
use talkstream::infra::logger;

#[tokio::main]
async fn main() {
    // Respects RUST_LOG
    logger::init_logging("warn");

    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = if let Some(ref path) = cli.config {
        Config::load_from(std::path::Path::new(path))?
    } else {
        Config::load()?
    };

    match cli.command {
        Commands::Session { voice } => talkstream::cli::session::run_session(&config, voice).await,
        Commands::Ask { question } => talkstream::cli::ask::run_ask(&config, &question.join(" ")).await,
        Commands::Credits => talkstream::cli::ask::run_credits(&config).await,
        Commands::Check => talkstream::cli::check::run_check(&config, cli.config.as_deref()),
    }
}
