// src/cli/check.rs — Configuration check

use crate::infra::config::{redact, AnswerSourceKind, Config};
use crate::infra::paths;

/// Summary lines for `talkstream check`. Secrets are redacted.
pub fn summary(config: &Config) -> Vec<String> {
    let mut lines = vec![
        format!("D-ID key:       {}", redact(config.key.as_deref())),
        format!("D-ID URL:       {}", config.did_url),
        format!("Answer source:  {}", config.answer_source),
    ];
    match config.answer_source {
        AnswerSourceKind::Backend => {
            lines.push(format!(
                "Backend URL:    {}",
                config.backend_url.as_deref().unwrap_or("(not set)")
            ));
            lines.push(format!("Backend token:  {}", redact(config.backend_token.as_deref())));
            lines.push(format!(
                "Refresh token:  {}",
                redact(config.backend_refresh_token.as_deref())
            ));
            if let Some(ref id) = config.conversation_id {
                lines.push(format!("Conversation:   {}", id));
            }
        }
        AnswerSourceKind::Openai => {
            lines.push(format!("OpenAI key:     {}", redact(config.openai_key.as_deref())));
        }
        AnswerSourceKind::Gemini => {
            lines.push(format!("Gemini key:     {}", redact(config.gemini_key.as_deref())));
        }
    }
    lines.push(format!("Voice:          {}", config.voice_id));
    lines.push(format!(
        "Narrate:        {}",
        if config.narrate { "yes" } else { "no" }
    ));
    lines.push(format!("Stats poll:     {}ms", config.poll_interval_ms));
    lines
}

pub fn run_check(config: &Config, path: Option<&str>) -> anyhow::Result<()> {
    let location = match path {
        Some(p) => p.to_string(),
        None => paths::config_file_path().display().to_string(),
    };
    eprintln!("Config: {}", location);
    for line in summary(config) {
        eprintln!("  {}", line);
    }
    config.validate()?;
    eprintln!("OK");
    Ok(())
}
