// src/cli/ask.rs — One-shot question and credits lookup

use crate::answer;
use crate::infra::config::Config;
use crate::provider::did::DidClient;
use crate::provider::StreamingApi;

pub async fn run_ask(config: &Config, question: &str) -> anyhow::Result<()> {
    let question = question.trim();
    if question.is_empty() {
        anyhow::bail!("question is empty");
    }
    let source = answer::from_config(config)?;
    tracing::debug!(source = source.name(), "asking");
    let reply = source.answer(question).await?;
    println!("{}", reply);
    Ok(())
}

pub async fn run_credits(config: &Config) -> anyhow::Result<()> {
    let client = DidClient::from_config(config);
    client.ensure_credentials()?;
    let credits = client.credits().await?;
    println!("Credits: {} remaining of {}", credits.remaining, credits.total);
    Ok(())
}
