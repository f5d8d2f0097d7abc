// src/answer/mod.rs — Answer sources for talk turns
//
// A talk turn asks one of these for the text the avatar should speak. The
// backend chat API is the default; OpenAI and Gemini are called directly when
// configured.

pub mod backend;
pub mod gemini;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;

use crate::infra::config::{AnswerSourceKind, Config};
use crate::infra::errors::AgentError;

#[async_trait]
pub trait AnswerSource: Send + Sync {
    fn name(&self) -> &str;

    /// Produce the answer for one user question. The result is trimmed.
    async fn answer(&self, question: &str) -> Result<String, AgentError>;
}

/// Build the source selected by `answer_source`.
pub fn from_config(config: &Config) -> Result<Arc<dyn AnswerSource>, AgentError> {
    config.validate_answer_source()?;
    let source: Arc<dyn AnswerSource> = match config.answer_source {
        AnswerSourceKind::Backend => Arc::new(backend::BackendChat::from_config(config)?),
        AnswerSourceKind::Openai => Arc::new(openai::OpenAiAnswers::from_config(config)),
        AnswerSourceKind::Gemini => Arc::new(gemini::GeminiAnswers::from_config(config)),
    };
    tracing::debug!("answer source: {}", source.name());
    Ok(source)
}
